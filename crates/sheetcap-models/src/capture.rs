//! A warped rectangular image produced by `Rectifier` from one frame.

/// A 64-bit perceptual hash (8x8 DCT-style), used by `Dedup` and `Stitcher`
/// page-mode clustering to measure visual similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash(pub u64);

impl PerceptualHash {
    pub fn hamming_distance(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

/// Axis-aligned content bounding box within a capture's own pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// A rectified, tone-normalized capture: one frame warped into a canonical
/// rectangle.
#[derive(Debug, Clone)]
pub struct RectifiedCapture {
    pub source_frame_index: u64,
    pub hash: PerceptualHash,
    pub content_bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    /// Packed RGB8 pixel buffer.
    pub pixels: Vec<u8>,
}

impl RectifiedCapture {
    pub fn new(
        source_frame_index: u64,
        hash: PerceptualHash,
        content_bbox: BoundingBox,
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    ) -> Self {
        Self { source_frame_index, hash, content_bbox, width, height, pixels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_distance_zero_for_identical_hash() {
        let a = PerceptualHash(0xABCD_EF01_2345_6789);
        assert_eq!(a.hamming_distance(&a), 0);
    }

    #[test]
    fn hamming_distance_counts_differing_bits() {
        let a = PerceptualHash(0b0000);
        let b = PerceptualHash(0b0111);
        assert_eq!(a.hamming_distance(&b), 3);
    }
}
