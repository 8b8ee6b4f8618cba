//! Embedded PowerShell driver script.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

/// Driver source, run by `pwsh` for the lifetime of one runspace.
pub const DRIVER_SCRIPT: &str = include_str!("driver.ps1");

/// The driver encoded for `pwsh -EncodedCommand` (base64 of UTF-16LE).
#[must_use]
pub fn encoded_command() -> String {
    encode_command(DRIVER_SCRIPT)
}

/// Encode arbitrary script text for `-EncodedCommand`.
#[must_use]
pub fn encode_command(script: &str) -> String {
    let utf16: Vec<u8> = script.encode_utf16().flat_map(u16::to_le_bytes).collect();
    BASE64.encode(utf16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command_utf16le() {
        // "ab" -> 61 00 62 00
        assert_eq!(encode_command("ab"), "YQBiAA==");
    }

    #[test]
    fn test_driver_handles_all_ops() {
        for op in ["'invoke'", "'close'", "'progress'", "'completed'", "'fault'", "'closed'"] {
            assert!(DRIVER_SCRIPT.contains(op), "driver is missing {op}");
        }
    }
}
