//! Wire protocol: packet layouts for every message exchanged with the
//! appliance, grouped by channel (spec §4.1).

pub mod constants;
pub mod control;
pub mod data;
pub mod scan_config;
pub mod types;
pub mod udp;
pub mod welcome;

pub use constants::*;
pub use types::{
    ApplianceDescriptor, ApplianceStatus, ColorMode, Identity, Page, PaperSize, Quality,
    ScanJobConfig, SessionToken, Side,
};
