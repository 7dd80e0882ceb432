use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma};
use imageproc::contrast::{otsu_level, threshold};
use imageproc::distance_transform::Norm;
use imageproc::filter::{bilateral_filter, gaussian_blur_f32};
use imageproc::morphology::close;
use log::debug;

use crate::models::PreprocessMethod;
use crate::utils::{CertificateError, Result};

/// One filtered rendering of a page, tagged with the method that produced it.
#[derive(Debug, Clone)]
pub struct PreprocessedCandidate {
    pub method: PreprocessMethod,
    pub image: GrayImage,
}

/// ImageProcessor renders the preprocessing variants fed to the recognizer.
pub struct ImageProcessor;

impl ImageProcessor {
    pub fn load_grayscale(image_bytes: &[u8]) -> Result<GrayImage> {
        let image = image::load_from_memory(image_bytes).map_err(|e| {
            CertificateError::ImageProcessing(format!("Failed to load image: {}", e))
        })?;
        debug!("Loaded image {}x{}", image.width(), image.height());
        Ok(image.to_luma8())
    }

    /// Render one preprocessing variant of a page.
    pub fn candidate(gray: &GrayImage, method: PreprocessMethod) -> PreprocessedCandidate {
        PreprocessedCandidate {
            method,
            image: Self::preprocess(gray, method),
        }
    }

    pub fn preprocess(gray: &GrayImage, method: PreprocessMethod) -> GrayImage {
        match method {
            PreprocessMethod::Original | PreprocessMethod::Fallback => gray.clone(),
            PreprocessMethod::GaussianThreshold => Self::gaussian_threshold(gray),
            PreprocessMethod::AdaptiveThreshold => Self::adaptive_threshold(gray, 5, 2),
            PreprocessMethod::Morphological => {
                close(&Self::gaussian_threshold(gray), Norm::LInf, 1)
            }
            PreprocessMethod::EnhancedContrast => Self::enhance_local_contrast(gray, 2.0, 8),
            PreprocessMethod::BilateralFilter => bilateral_filter(gray, 9, 75.0, 75.0),
        }
    }

    /// 5x5 gaussian blur followed by a global Otsu threshold.
    fn gaussian_threshold(gray: &GrayImage) -> GrayImage {
        let blurred = gaussian_blur_f32(gray, 1.1);
        let level = otsu_level(&blurred);
        threshold(&blurred, level)
    }

    /// Mean-window adaptive threshold over a row-sum table.
    pub fn adaptive_threshold(gray: &GrayImage, block_radius: u32, bias: i32) -> GrayImage {
        let (width, height) = gray.dimensions();
        let mut result = ImageBuffer::new(width, height);
        if width == 0 || height == 0 {
            return result;
        }

        let mut row_sums = vec![vec![0u32; width as usize + 1]; height as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                row_sums[y][x + 1] = row_sums[y][x] + gray.get_pixel(x as u32, y as u32).0[0] as u32;
            }
        }

        for y in 0..height {
            for x in 0..width {
                let start_x = x.saturating_sub(block_radius) as usize;
                let end_x = (x + block_radius).min(width - 1) as usize;
                let start_y = y.saturating_sub(block_radius) as usize;
                let end_y = (y + block_radius).min(height - 1) as usize;

                let mut sum = 0u32;
                for row in &row_sums[start_y..=end_y] {
                    sum += row[end_x + 1] - row[start_x];
                }
                let count = ((end_x - start_x + 1) * (end_y - start_y + 1)) as u32;
                let threshold = (sum / count) as i32 - bias;

                let value = gray.get_pixel(x, y).0[0] as i32;
                result.put_pixel(x, y, Luma([if value > threshold { 255u8 } else { 0 }]));
            }
        }
        result
    }

    /// Tile-based clipped histogram equalization with bilinear blending between tiles.
    pub fn enhance_local_contrast(gray: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return gray.clone();
        }

        let tile_w = (width + grid - 1) / grid;
        let tile_h = (height + grid - 1) / grid;
        let tiles_x = (width + tile_w - 1) / tile_w;
        let tiles_y = (height + tile_h - 1) / tile_h;

        let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let (x0, y0) = (tx * tile_w, ty * tile_h);
                let (x1, y1) = ((x0 + tile_w).min(width), (y0 + tile_h).min(height));
                luts.push(Self::clipped_equalization(gray, (x0, y0, x1, y1), clip_limit));
            }
        }

        let axis = |pos: u32, tile: u32, tiles: u32| -> (usize, usize, f32) {
            let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
            let lo = f.floor().max(0.0) as u32;
            let lo = lo.min(tiles - 1);
            let hi = (lo + 1).min(tiles - 1);
            (lo as usize, hi as usize, (f - lo as f32).clamp(0.0, 1.0))
        };

        let mut result = ImageBuffer::new(width, height);
        for y in 0..height {
            let (ty0, ty1, ay) = axis(y, tile_h, tiles_y);
            for x in 0..width {
                let (tx0, tx1, ax) = axis(x, tile_w, tiles_x);
                let v = gray.get_pixel(x, y).0[0] as usize;
                let at = |ty: usize, tx: usize| luts[ty * tiles_x as usize + tx][v] as f32;
                let top = (1.0 - ax) * at(ty0, tx0) + ax * at(ty0, tx1);
                let bottom = (1.0 - ax) * at(ty1, tx0) + ax * at(ty1, tx1);
                let value = (1.0 - ay) * top + ay * bottom;
                result.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
            }
        }
        result
    }

    fn clipped_equalization(
        gray: &GrayImage,
        (x0, y0, x1, y1): (u32, u32, u32, u32),
        clip_limit: f32,
    ) -> [u8; 256] {
        let mut hist = [0u32; 256];
        for y in y0..y1 {
            for x in x0..x1 {
                hist[gray.get_pixel(x, y).0[0] as usize] += 1;
            }
        }
        let area = ((x1 - x0) * (y1 - y0)) as f32;
        let limit = ((clip_limit * area / 256.0) as u32).max(1);

        let mut excess = 0u32;
        for h in hist.iter_mut() {
            if *h > limit {
                excess += *h - limit;
                *h = limit;
            }
        }
        let spread = excess / 256;
        let mut remainder = excess % 256;
        for h in hist.iter_mut() {
            *h += spread;
            if remainder > 0 {
                *h += 1;
                remainder -= 1;
            }
        }

        let mut lut = [0u8; 256];
        let mut cdf = 0u32;
        for (value, count) in hist.iter().enumerate() {
            cdf += count;
            lut[value] = (cdf as f32 * 255.0 / area).round().min(255.0) as u8;
        }
        lut
    }

    pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        DynamicImage::ImageLuma8(image.clone())
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| {
                CertificateError::ImageProcessing(format!("Failed to encode image: {}", e))
            })?;
        Ok(buffer)
    }
}
