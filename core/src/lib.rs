//! Protocol engine for a ScanSnap-class network scanner appliance: UDP
//! discovery, session pairing, and chunked page-image transfer over two TCP
//! channels.
//!
//! [`Scanner`] is the entry point most callers need. The `wire` module and
//! the channel-specific modules (`discovery`, `control_session`,
//! `data_channel`) are public for callers that need to script lower-level
//! protocol interactions directly.

pub mod control_session;
pub mod data_channel;
pub mod discovery;
pub mod error;
pub mod facade;
pub mod identity;
pub mod wire;

pub use error::{Result, ScanError};
pub use facade::Scanner;
pub use identity::{compute_identity, password_from_serial};
pub use wire::{
    ApplianceDescriptor, ApplianceStatus, ColorMode, Identity, Page, PaperSize, Quality,
    ScanJobConfig, SessionToken, Side,
};
