//! C7 `PageComposer`: crop content, balance margins, split over-tall strips
//! into A4-proportioned pages, and emit PNG/JPG/PDF.

use std::path::{Path, PathBuf};

use image::{imageops, DynamicImage, Rgb, RgbImage};
use printpdf::{Image, ImageTransform, Mm, PdfDocument};
use sheetcap_models::{ExportFormat, PageCandidate};

use crate::error::{MediaError, MediaResult};
use crate::rectifier::{content_bounding_box, luma, INK_LUMA_THRESHOLD};

/// ISO 216 A4 height/width ratio.
const A4_RATIO: f64 = 297.0 / 210.0;
const CONTENT_MARGIN_FRACTION: f64 = 0.04;
const MAX_SPLIT_SEARCH_FRACTION: f64 = 0.1;
const A4_WIDTH_MM: f64 = 210.0;
const A4_HEIGHT_MM: f64 = 297.0;

pub struct PageComposer {
    formats: Vec<ExportFormat>,
}

/// Paths produced by one `compose` call, ready to fold into a `Manifest`.
#[derive(Debug, Default)]
pub struct ComposeOutput {
    pub images: Vec<PathBuf>,
    pub sheet_complete: Option<PathBuf>,
    pub pdf: Option<PathBuf>,
}

impl PageComposer {
    pub fn new(formats: Vec<ExportFormat>) -> Self {
        Self { formats }
    }

    /// `scroll_mode` controls whether a `sheet_complete.png` is emitted when
    /// there are >= 2 final pages (§4.7 step 3).
    pub fn compose(&self, candidates: &[PageCandidate], output_dir: &Path, scroll_mode: bool) -> MediaResult<ComposeOutput> {
        std::fs::create_dir_all(output_dir)?;

        let mut pages = Vec::new();
        for candidate in candidates {
            let image = RgbImage::from_raw(candidate.width, candidate.height, candidate.pixels.clone())
                .ok_or_else(|| MediaError::internal("page candidate buffer dimensions do not match pixel count"))?;
            let trimmed = trim_with_margin(&image);
            pages.extend(maybe_split_vertically(trimmed));
        }

        if pages.is_empty() {
            return Ok(ComposeOutput::default());
        }

        let canonical_width = pages[0].width();
        let pages: Vec<RgbImage> = pages.into_iter().map(|p| normalize_width(p, canonical_width)).collect();

        let mut images = Vec::with_capacity(pages.len());
        for (index, page) in pages.iter().enumerate() {
            if self.formats.contains(&ExportFormat::Png) {
                let path = output_dir.join(format!("page_{:03}.png", index + 1));
                page.save(&path).map_err(|e| MediaError::ExportFailed(e.to_string()))?;
                images.push(path);
            }
            if self.formats.contains(&ExportFormat::Jpg) {
                let path = output_dir.join(format!("page_{:03}.jpg", index + 1));
                DynamicImage::ImageRgb8(page.clone())
                    .save(&path)
                    .map_err(|e| MediaError::ExportFailed(e.to_string()))?;
                images.push(path);
            }
        }

        let sheet_complete = if scroll_mode && pages.len() >= 2 {
            let sheet = concatenate_vertical(&pages);
            let path = output_dir.join("sheet_complete.png");
            sheet.save(&path).map_err(|e| MediaError::ExportFailed(e.to_string()))?;
            Some(path)
        } else {
            None
        };

        let pdf = if self.formats.contains(&ExportFormat::Pdf) {
            let path = output_dir.join("pages.pdf");
            build_pdf(&pages, &path)?;
            Some(path)
        } else {
            None
        };

        Ok(ComposeOutput { images, sheet_complete, pdf })
    }
}

fn trim_with_margin(image: &RgbImage) -> RgbImage {
    let bbox = content_bounding_box(image);
    let margin_x = (bbox.width as f64 * CONTENT_MARGIN_FRACTION).round() as u32;
    let margin_y = (bbox.height as f64 * CONTENT_MARGIN_FRACTION).round() as u32;
    let x0 = bbox.x.saturating_sub(margin_x);
    let y0 = bbox.y.saturating_sub(margin_y);
    let x1 = (bbox.x + bbox.width + margin_x).min(image.width());
    let y1 = (bbox.y + bbox.height + margin_y).min(image.height());
    imageops::crop_imm(image, x0, y0, (x1 - x0).max(1), (y1 - y0).max(1)).to_image()
}

/// If the page is taller than `3 * A4_ratio * width`, split it at low-ink
/// rows near each A4-proportioned boundary (§4.7 step 2).
fn maybe_split_vertically(image: RgbImage) -> Vec<RgbImage> {
    let (w, h) = image.dimensions();
    let max_height = (3.0 * A4_RATIO * w as f64).round() as u32;
    if h <= max_height.max(1) {
        return vec![image];
    }

    let target_page_height = (A4_RATIO * w as f64).max(1.0);
    let num_pages = (h as f64 / target_page_height).ceil() as u32;
    let search_window = (target_page_height * MAX_SPLIT_SEARCH_FRACTION).round() as u32;

    let mut boundaries = Vec::new();
    for i in 1..num_pages {
        let approx = (i as f64 * target_page_height).round() as u32;
        let lo = approx.saturating_sub(search_window);
        let hi = (approx + search_window).min(h.saturating_sub(1));
        let best_row = (lo..=hi.max(lo)).min_by_key(|&y| row_ink_density(&image, y)).unwrap_or(approx);
        boundaries.push(best_row.clamp(1, h.saturating_sub(1)));
    }

    let mut pages = Vec::new();
    let mut start = 0u32;
    for boundary in boundaries {
        if boundary > start {
            pages.push(imageops::crop_imm(&image, 0, start, w, boundary - start).to_image());
            start = boundary;
        }
    }
    pages.push(imageops::crop_imm(&image, 0, start, w, h - start).to_image());
    pages
}

fn row_ink_density(image: &RgbImage, y: u32) -> u32 {
    (0..image.width())
        .filter(|&x| luma(image.get_pixel(x, y)) < INK_LUMA_THRESHOLD)
        .count() as u32
}

/// §4.7 invariant: output page width is constant within a job. Narrower
/// pages are padded with white margin, wider ones cropped, both centered,
/// rather than resampled, to avoid distorting trimmed content.
fn normalize_width(image: RgbImage, canonical_width: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == canonical_width {
        return image;
    }
    let mut out = RgbImage::from_pixel(canonical_width, h, Rgb([255, 255, 255]));
    if w < canonical_width {
        let offset = (canonical_width - w) / 2;
        for y in 0..h {
            for x in 0..w {
                out.put_pixel(x + offset, y, *image.get_pixel(x, y));
            }
        }
    } else {
        let offset = (w - canonical_width) / 2;
        for y in 0..h {
            for x in 0..canonical_width {
                out.put_pixel(x, y, *image.get_pixel(x + offset, y));
            }
        }
    }
    out
}

fn concatenate_vertical(pages: &[RgbImage]) -> RgbImage {
    let width = pages.first().map(|p| p.width()).unwrap_or(0);
    let total_height: u32 = pages.iter().map(|p| p.height()).sum();
    let mut out = RgbImage::new(width, total_height.max(1));
    let mut y_offset = 0u32;
    for page in pages {
        for y in 0..page.height() {
            for x in 0..width {
                out.put_pixel(x, y_offset + y, *page.get_pixel(x, y));
            }
        }
        y_offset += page.height();
    }
    out
}

/// Embed each page losslessly at A4 size, fit-to-width (§4.7 step 4).
fn build_pdf(pages: &[RgbImage], path: &Path) -> MediaResult<()> {
    if pages.is_empty() {
        return Ok(());
    }
    let (doc, first_page, first_layer) = PdfDocument::new("sheet-capture", Mm(A4_WIDTH_MM), Mm(A4_HEIGHT_MM), "pages");
    let mut page_refs = vec![(first_page, first_layer)];
    for _ in 1..pages.len() {
        let (p, l) = doc.add_page(Mm(A4_WIDTH_MM), Mm(A4_HEIGHT_MM), "pages");
        page_refs.push((p, l));
    }

    for (page, (page_idx, layer_idx)) in pages.iter().zip(page_refs) {
        let layer = doc.get_page(page_idx).get_layer(layer_idx);
        let dynamic = DynamicImage::ImageRgb8(page.clone());
        let image = Image::from_dynamic_image(&dynamic);
        let width_in = A4_WIDTH_MM / 25.4;
        let dpi = page.width() as f64 / width_in;
        image.add_to_layer(
            layer,
            ImageTransform {
                dpi: Some(dpi),
                ..Default::default()
            },
        );
    }

    let file = std::fs::File::create(path).map_err(MediaError::Io)?;
    doc.save(&mut std::io::BufWriter::new(file))
        .map_err(|e| MediaError::ExportFailed(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcap_models::PageOrigin;

    fn candidate_with_ink(width: u32, height: u32) -> PageCandidate {
        let mut pixels = vec![245u8; (width * height * 3) as usize];
        let cx = width / 2;
        let cy = height / 2;
        for dy in 0..height.min(10) {
            for dx in 0..width.min(10) {
                let x = (cx + dx).min(width - 1);
                let y = (cy + dy).min(height - 1);
                let idx = ((y * width + x) * 3) as usize;
                pixels[idx] = 10;
                pixels[idx + 1] = 10;
                pixels[idx + 2] = 10;
            }
        }
        PageCandidate::new(PageOrigin::Stitched { frame_indices: vec![0] }, width, height, pixels)
    }

    #[test]
    fn compose_writes_zero_padded_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let composer = PageComposer::new(vec![ExportFormat::Png]);
        let candidates = vec![candidate_with_ink(200, 280), candidate_with_ink(200, 280)];
        let output = composer.compose(&candidates, dir.path(), false).unwrap();
        assert_eq!(output.images.len(), 2);
        assert!(output.images[0].file_name().unwrap().to_str().unwrap().starts_with("page_001"));
        assert!(output.images[1].file_name().unwrap().to_str().unwrap().starts_with("page_002"));
    }

    #[test]
    fn scroll_mode_with_multiple_pages_emits_sheet_complete() {
        let dir = tempfile::tempdir().unwrap();
        let composer = PageComposer::new(vec![ExportFormat::Png]);
        let candidates = vec![candidate_with_ink(200, 280), candidate_with_ink(200, 280)];
        let output = composer.compose(&candidates, dir.path(), true).unwrap();
        assert!(output.sheet_complete.is_some());
    }

    #[test]
    fn jpg_only_format_does_not_write_or_list_png() {
        let dir = tempfile::tempdir().unwrap();
        let composer = PageComposer::new(vec![ExportFormat::Jpg]);
        let candidates = vec![candidate_with_ink(200, 280)];
        let output = composer.compose(&candidates, dir.path(), false).unwrap();
        assert_eq!(output.images.len(), 1);
        assert!(output.images[0].extension().unwrap() == "jpg");
        assert!(!dir.path().join("page_001.png").exists());
    }

    #[test]
    fn single_page_scroll_mode_has_no_sheet_complete() {
        let dir = tempfile::tempdir().unwrap();
        let composer = PageComposer::new(vec![ExportFormat::Png]);
        let candidates = vec![candidate_with_ink(200, 280)];
        let output = composer.compose(&candidates, dir.path(), true).unwrap();
        assert!(output.sheet_complete.is_none());
    }
}
