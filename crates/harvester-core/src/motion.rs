//! Motion detection from the in-game coordinate readout.
//!
//! The game prints the player's map coordinates in a small fixed region of
//! the window. While the player walks, those digits change from frame to
//! frame; once the player stops they freeze. [`RegionWatcher`] fingerprints
//! that region on every check and reports whether it differs from the last
//! one seen.

use image::RgbaImage;

use crate::geometry::Rect;
use crate::snapshot::compute_content_hash;

/// Fingerprint of the pixels inside `region`, clipped to the frame.
///
/// Returns `None` if the region lies entirely outside the frame.
pub fn region_hash(frame: &RgbaImage, region: &Rect) -> Option<u64> {
    let clipped = region.clamp_to(frame.width(), frame.height())?;
    let row_len = clipped.width as usize * 4;
    let mut bytes = Vec::with_capacity(row_len * clipped.height as usize);
    for y in clipped.y..clipped.y + clipped.height {
        for x in clipped.x..clipped.x + clipped.width {
            bytes.extend_from_slice(&frame.get_pixel(x, y).0);
        }
    }
    Some(compute_content_hash(&bytes))
}

/// Tracks one screen region across frames.
#[derive(Debug, Clone)]
pub struct RegionWatcher {
    region: Rect,
    last: Option<u64>,
}

impl RegionWatcher {
    pub fn new(region: Rect) -> Self {
        Self { region, last: None }
    }

    pub fn region(&self) -> Rect {
        self.region
    }

    /// Compare `frame` against the previous observation.
    ///
    /// - No frame, or a region outside the frame: `false`.
    /// - First observation: `true`, since there is no baseline yet to prove
    ///   the player is standing still.
    /// - Otherwise: whether the region fingerprint changed.
    pub fn observe(&mut self, frame: Option<&RgbaImage>) -> bool {
        let Some(hash) = frame.and_then(|f| region_hash(f, &self.region)) else {
            return false;
        };
        match self.last.replace(hash) {
            Some(previous) => previous != hash,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn frame_with(pixel: (u32, u32), color: [u8; 4]) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(100, 50, Rgba([0, 0, 0, 255]));
        img.put_pixel(pixel.0, pixel.1, Rgba(color));
        img
    }

    #[test]
    fn first_observation_counts_as_moving() {
        let mut watcher = RegionWatcher::new(Rect::new(25, 0, 75, 20));
        assert!(watcher.observe(Some(&frame_with((30, 5), [255; 4]))));
    }

    #[test]
    fn identical_frames_are_still() {
        let mut watcher = RegionWatcher::new(Rect::new(25, 0, 75, 20));
        let frame = frame_with((30, 5), [255; 4]);
        watcher.observe(Some(&frame));
        assert!(!watcher.observe(Some(&frame)));
        assert!(!watcher.observe(Some(&frame.clone())));
    }

    #[test]
    fn change_inside_region_is_motion() {
        let mut watcher = RegionWatcher::new(Rect::new(25, 0, 75, 20));
        watcher.observe(Some(&frame_with((30, 5), [255; 4])));
        assert!(watcher.observe(Some(&frame_with((31, 5), [255; 4]))));
    }

    #[test]
    fn change_outside_region_is_ignored() {
        let mut watcher = RegionWatcher::new(Rect::new(25, 0, 75, 20));
        watcher.observe(Some(&frame_with((2, 40), [255; 4])));
        assert!(!watcher.observe(Some(&frame_with((3, 40), [255; 4]))));
    }

    #[test]
    fn missing_frame_is_still() {
        let mut watcher = RegionWatcher::new(Rect::new(0, 0, 10, 10));
        assert!(!watcher.observe(None));
    }

    #[test]
    fn region_outside_frame_is_still() {
        let mut watcher = RegionWatcher::new(Rect::new(500, 500, 10, 10));
        assert!(!watcher.observe(Some(&frame_with((0, 0), [1; 4]))));
        assert_eq!(region_hash(&frame_with((0, 0), [1; 4]), &watcher.region()), None);
    }
}
