//! 16-byte server→client welcome prologue sent at the start of every TCP
//! connection on either channel (spec §4.1, §6 GLOSSARY).

use super::constants::{MAGIC, WELCOME_SIZE};
use crate::error::ScanError;

pub fn validate(data: &[u8]) -> Result<(), ScanError> {
    if data.len() < WELCOME_SIZE || &data[4..8] != MAGIC {
        return Err(ScanError::MalformedPacket("welcome"));
    }
    Ok(())
}
