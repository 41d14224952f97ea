//! Version number formatting.

/// Format a raw version in the `intel-me2` scheme used by CCGx base versions.
///
/// Bits: `[31:29]` major, `[28:24]` minor, `[23:16]` hotfix, `[15:0]` build.
pub fn version_from_u32(value: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        (value >> 29) & 0x07,
        (value >> 24) & 0x1F,
        (value >> 16) & 0xFF,
        value & 0xFFFF
    )
}
