//! Controller status reporting and content hashing.
//!
//! A [`ControllerStatus`] is a point-in-time view of the controller, built
//! under the state lock so that every field describes the same moment.
//!
//! # Change Detection
//!
//! [`compute_content_hash`] gives a cheap fingerprint of raw pixel data.
//! Motion detection compares fingerprints of the same screen region across
//! frames instead of diffing pixels:
//!
//! ```ignore
//! if compute_content_hash(&region) != previous {
//!     // Coordinates changed, the player is moving
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::phase::Phase;

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    /// Whether the controller loop is currently running.
    pub running: bool,
    pub phase: Phase,
    /// When the current phase was entered (RFC 3339).
    pub phase_entered_at: String,
    pub phase_elapsed_ms: u64,
    /// Number of targets in the latest detection update.
    pub target_count: usize,
    /// Dimensions of the latest screenshot, if any was pushed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_size: Option<(u32, u32)>,
    /// Total clicks performed since the daemon started.
    pub clicks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_click: Option<Point>,
}

/// Compute a content hash over raw bytes.
///
/// Uses FNV-1a, a fast non-cryptographic hash suitable for change detection.
#[must_use]
pub fn compute_content_hash(bytes: &[u8]) -> u64 {
    // FNV-1a parameters for 64-bit
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001B3;

    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
