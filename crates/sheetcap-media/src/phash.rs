//! 64-bit perceptual hashing, shared by `Rectifier` (§4.3), `Dedup` (§4.4)
//! and `Stitcher`'s page-mode clustering (§4.5).

use image::RgbImage;
use img_hash::{HashAlg, HasherConfig};
use sheetcap_models::PerceptualHash;

/// 8x8 mean hash -> exactly 64 bits, matching §4.3's "8x8 DCT-style" hash.
pub fn compute_phash(image: &RgbImage) -> PerceptualHash {
    let hasher = HasherConfig::new()
        .hash_size(8, 8)
        .hash_alg(HashAlg::Mean)
        .to_hasher();
    let dynamic = image::DynamicImage::ImageRgb8(image.clone());
    let hash = hasher.hash_image(&dynamic);
    let bytes = hash.as_bytes();
    let mut value: u64 = 0;
    for &byte in bytes.iter().take(8) {
        value = (value << 8) | byte as u64;
    }
    PerceptualHash(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_images_hash_identically() {
        let img = RgbImage::from_fn(32, 32, |x, y| image::Rgb([(x * 4) as u8, (y * 4) as u8, 128]));
        let a = compute_phash(&img);
        let b = compute_phash(&img);
        assert_eq!(a.hamming_distance(&b), 0);
    }
}
