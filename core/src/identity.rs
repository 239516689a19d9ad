//! Pairing identity derivation (spec §4.2, §9).
//!
//! The appliance accepts an opaque ASCII "identity" string as its pairing
//! credential instead of a password directly. The identity is a per-character
//! Caesar-style transform of the password against a fixed key, observed
//! verbatim from the reference client and reproduced unchanged here.

use crate::wire::Identity;
use crate::ScanError;

const KEY: &str = "pFusCANsNapFiPfu";
const SHIFT: u32 = 11;

/// Derives the pairing identity sent in a Reserve request from a password.
///
/// Errors if `password` is longer than the fixed key (16 characters) — the
/// transform has no defined behavior past that point.
pub fn compute_identity(password: &str) -> Result<Identity, ScanError> {
    let key_chars: Vec<char> = KEY.chars().collect();
    if password.chars().count() > key_chars.len() {
        return Err(ScanError::PasswordTooLong {
            len: password.chars().count(),
            max: key_chars.len(),
        });
    }

    let digits: String = password
        .chars()
        .enumerate()
        .map(|(i, c)| (c as u32 + key_chars[i] as u32 + SHIFT).to_string())
        .collect();

    Ok(Identity::new(digits))
}

/// Derives the default pairing password from a device serial number: the
/// serial with trailing spaces/NULs stripped, truncated to its last 4
/// characters (e.g. `"iX500-AK6ABB0700"` → `"0700"`).
pub fn password_from_serial(serial: &str) -> String {
    let trimmed = serial.trim_end_matches(|c| c == ' ' || c == '\0');
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() > 4 {
        chars[chars.len() - 4..].iter().collect()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S2 — identity derivation from spec scenario table.
    #[test]
    fn compute_identity_matches_scenario_s2() {
        let identity = compute_identity("0700").unwrap();
        assert_eq!(identity.as_str(), "171136176174");
    }

    /// S3 — password derivation from a real serial, padded with trailing
    /// spaces/NULs as observed on the wire.
    #[test]
    fn password_from_serial_strips_padding_and_takes_last_four() {
        let serial = "iX500-AK6ABB0700 \u{0}\u{0}";
        assert_eq!(password_from_serial(serial), "0700");
    }

    #[test]
    fn password_from_serial_shorter_than_four_is_unchanged() {
        assert_eq!(password_from_serial("ab"), "ab");
    }

    #[test]
    fn compute_identity_rejects_password_longer_than_key() {
        let too_long = "x".repeat(KEY.len() + 1);
        let err = compute_identity(&too_long).unwrap_err();
        assert!(matches!(err, ScanError::PasswordTooLong { .. }));
    }
}
