//! Error taxonomy for the protocol engine (spec §7).
//!
//! Every failure mode the appliance or transport can produce gets its own
//! variant so callers can `match` instead of parsing strings. Heartbeat
//! send failures and End-scan failures are deliberately *not* represented
//! here — both are logged-and-swallowed at the call site per spec §7.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("no appliance responded to discovery within the timeout")]
    DiscoveryTimeout,

    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("pairing rejected (status={0})")]
    PairingRejected(i32),

    #[error("no paper in feeder")]
    NoPaperInFeeder,

    #[error("wait-for-scan-trigger failed (status={0})")]
    WaitFailed(u32),

    #[error("page transfer error: {0}")]
    PageTransferError(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("password too long: {len} bytes exceeds the {max}-byte identity key")]
    PasswordTooLong { len: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, ScanError>;
