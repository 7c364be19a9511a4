//! Page quality analysis from grayscale pixel statistics.
//!
//! Brightness is the mean luma (0–255); contrast is its population standard
//! deviation. A page is blank only when it is both very dark *and* flat, so
//! dark-but-textured scans (heavy toner, inverted headers) are not discarded.

use crate::error::TriageError;
use crate::taxonomy::PageQuality;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Analyzer constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Mean luma below which a flat page counts as blank.
    pub blank_brightness: f64,
    /// Std-dev below which a dark page counts as blank.
    pub blank_contrast: f64,
    pub good_contrast: f64,
    pub fair_contrast: f64,
    /// Inclusive mid-range band a "good" page's brightness must sit in.
    pub good_brightness_min: f64,
    pub good_brightness_max: f64,
    /// Scan DPI the minimum resolution is derived from.
    pub target_dpi: u32,
    /// Fraction of a letter page at `target_dpi` a raster must reach.
    pub min_resolution_ratio: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            blank_brightness: 15.0,
            blank_contrast: 10.0,
            good_contrast: 50.0,
            fair_contrast: 25.0,
            good_brightness_min: 30.0,
            good_brightness_max: 220.0,
            target_dpi: 300,
            min_resolution_ratio: 0.8,
        }
    }
}

impl QualityThresholds {
    /// Minimum (width, height) for a US-letter page (8.5 × 11 in).
    pub fn min_resolution(&self) -> (u32, u32) {
        let dpi = self.target_dpi as f64 * self.min_resolution_ratio;
        ((8.5 * dpi).round() as u32, (11.0 * dpi).round() as u32)
    }
}

/// Per-page statistics and the ratings derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub quality: PageQuality,
    pub is_blank: bool,
    pub brightness: f64,
    pub contrast: f64,
    /// (width, height) in pixels.
    pub resolution: (u32, u32),
}

impl PageAnalysis {
    /// True when the raster is below the minimum letter-size resolution.
    ///
    /// Either orientation is accepted. This is a warning, never an error.
    pub fn resolution_inadequate(&self, thresholds: &QualityThresholds) -> bool {
        let (min_w, min_h) = thresholds.min_resolution();
        let (w, h) = self.resolution;
        let portrait = w >= min_w && h >= min_h;
        let landscape = w >= min_h && h >= min_w;
        !(portrait || landscape)
    }
}

/// Mean and population standard deviation of the luma channel.
fn luma_stats(img: &DynamicImage) -> (f64, f64) {
    let gray = img.to_luma8();
    let n = gray.as_raw().len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let (sum, sum_sq) = gray.as_raw().iter().fold((0u64, 0u64), |(s, sq), &p| {
        let p = p as u64;
        (s + p, sq + p * p)
    });
    let mean = sum as f64 / n as f64;
    let variance = (sum_sq as f64 / n as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

pub fn rate_quality(brightness: f64, contrast: f64, t: &QualityThresholds) -> PageQuality {
    let mid_range = (t.good_brightness_min..=t.good_brightness_max).contains(&brightness);
    if contrast > t.good_contrast && mid_range {
        PageQuality::Good
    } else if contrast > t.fair_contrast {
        PageQuality::Fair
    } else {
        PageQuality::Poor
    }
}

pub fn is_blank(brightness: f64, contrast: f64, t: &QualityThresholds) -> bool {
    brightness < t.blank_brightness && contrast < t.blank_contrast
}

/// Analyze a decoded page raster.
pub fn analyze_page(img: &DynamicImage, thresholds: &QualityThresholds) -> PageAnalysis {
    let (brightness, contrast) = luma_stats(img);
    PageAnalysis {
        quality: rate_quality(brightness, contrast, thresholds),
        is_blank: is_blank(brightness, contrast, thresholds),
        brightness,
        contrast,
        resolution: (img.width(), img.height()),
    }
}

/// Analyze an encoded image (PNG, JPEG).
pub fn analyze_encoded(
    bytes: &[u8],
    thresholds: &QualityThresholds,
) -> Result<PageAnalysis, TriageError> {
    let img = image::load_from_memory(bytes).map_err(|e| TriageError::ImageDecode {
        detail: e.to_string(),
    })?;
    Ok(analyze_page(&img, thresholds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn flat(value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([value])))
    }

    /// Left half `a`, right half `b`: mean (a+b)/2, std-dev |a−b|/2.
    fn split(a: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(40, 40, |x, _| {
            if x < 20 {
                Luma([a])
            } else {
                Luma([b])
            }
        }))
    }

    #[test]
    fn black_page_is_blank_and_poor() {
        let a = analyze_page(&flat(0), &QualityThresholds::default());
        assert!(a.is_blank);
        assert_eq!(a.quality, PageQuality::Poor);
        assert_eq!(a.brightness, 0.0);
        assert_eq!(a.contrast, 0.0);
    }

    #[test]
    fn dark_textured_page_is_not_blank() {
        // mean 12.5, std-dev 12.5: dark but has structure
        let a = analyze_page(&split(0, 25), &QualityThresholds::default());
        assert!(a.brightness < 15.0);
        assert!(!a.is_blank);
    }

    #[test]
    fn white_page_is_poor_but_not_blank() {
        let a = analyze_page(&flat(255), &QualityThresholds::default());
        assert!(!a.is_blank);
        assert_eq!(a.quality, PageQuality::Poor);
    }

    #[test]
    fn typical_text_page_is_good() {
        // mean 127.5, std-dev 127.5
        let a = analyze_page(&split(0, 255), &QualityThresholds::default());
        assert_eq!(a.quality, PageQuality::Good);
        assert!((a.contrast - 127.5).abs() < 1e-9);
    }

    #[test]
    fn moderate_contrast_is_fair() {
        // mean 100, std-dev 30
        let a = analyze_page(&split(70, 130), &QualityThresholds::default());
        assert_eq!(a.quality, PageQuality::Fair);
    }

    #[test]
    fn high_contrast_outside_band_is_fair() {
        let t = QualityThresholds::default();
        assert_eq!(rate_quality(230.0, 80.0, &t), PageQuality::Fair);
        assert_eq!(rate_quality(220.0, 80.0, &t), PageQuality::Good);
    }

    #[test]
    fn minimum_resolution_is_eighty_percent_of_letter() {
        assert_eq!(QualityThresholds::default().min_resolution(), (2040, 2640));
    }

    #[test]
    fn small_raster_is_flagged_low_resolution() {
        let t = QualityThresholds::default();
        let a = analyze_page(&flat(128), &t);
        assert!(a.resolution_inadequate(&t));

        let full = PageAnalysis {
            resolution: (2550, 3300),
            ..a.clone()
        };
        assert!(!full.resolution_inadequate(&t));
        let landscape = PageAnalysis {
            resolution: (3300, 2550),
            ..a
        };
        assert!(!landscape.resolution_inadequate(&t));
    }

    #[test]
    fn undecodable_bytes_are_image_decode_error() {
        let err = analyze_encoded(b"not an image", &QualityThresholds::default()).unwrap_err();
        assert!(matches!(err, TriageError::ImageDecode { .. }));
    }
}
