//! Human-friendly byte formatting for move logs.

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

/// Formats a byte count into binary units (`KiB`, `MiB`, ...) with two
/// decimal places, bare bytes below 1 KiB.
#[must_use]
#[allow(clippy::cast_precision_loss)] // display only
pub fn format_bytes(num_bytes: u64) -> String {
    if num_bytes >= TIB {
        format!("{:.2}TiB", num_bytes as f64 / TIB as f64)
    } else if num_bytes >= GIB {
        format!("{:.2}GiB", num_bytes as f64 / GIB as f64)
    } else if num_bytes >= MIB {
        format!("{:.2}MiB", num_bytes as f64 / MIB as f64)
    } else if num_bytes >= KIB {
        format!("{:.2}KiB", num_bytes as f64 / KIB as f64)
    } else {
        format!("{num_bytes}B")
    }
}
