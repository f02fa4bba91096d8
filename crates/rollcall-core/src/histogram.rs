//! Intensity histograms — correlation scoring and global equalization.

use image::GrayImage;

/// One bin per 8-bit intensity, spanning [0, 256).
pub const HIST_BINS: usize = 256;

/// Pixel count per intensity level of a grayscale image.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bins: [f64; HIST_BINS],
}

impl Histogram {
    pub fn of(image: &GrayImage) -> Self {
        let mut bins = [0f64; HIST_BINS];
        for pixel in image.pixels() {
            bins[pixel[0] as usize] += 1.0;
        }
        Self { bins }
    }

    pub fn total(&self) -> f64 {
        self.bins.iter().sum()
    }

    /// Pearson correlation between the two bin vectors.
    ///
    /// Returns a value in [-1, 1]; identical histograms give 1.0. When either
    /// histogram has zero variance the result is 1.0.
    pub fn correlation(&self, other: &Histogram) -> f64 {
        let n = HIST_BINS as f64;
        let (mut s1, mut s2, mut s11, mut s22, mut s12) = (0.0, 0.0, 0.0, 0.0, 0.0);

        for (&a, &b) in self.bins.iter().zip(other.bins.iter()) {
            s1 += a;
            s2 += b;
            s11 += a * a;
            s22 += b * b;
            s12 += a * b;
        }

        let num = s12 - s1 * s2 / n;
        let denom2 = (s11 - s1 * s1 / n) * (s22 - s2 * s2 / n);

        if denom2.abs() > f64::EPSILON {
            num / denom2.sqrt()
        } else {
            1.0
        }
    }
}

/// Spread intensities over the full 0–255 range in-place.
///
/// Maps each level through the normalized cumulative histogram, with the
/// darkest occupied level sent to 0. A single-level image is left as is.
pub fn equalize(image: &mut GrayImage) {
    let total = image.width() as u64 * image.height() as u64;
    if total == 0 {
        return;
    }

    let mut hist = [0u64; HIST_BINS];
    for pixel in image.pixels() {
        hist[pixel[0] as usize] += 1;
    }

    let Some(first) = hist.iter().position(|&count| count > 0) else {
        return;
    };
    if hist[first] == total {
        return;
    }

    let scale = 255.0 / (total - hist[first]) as f64;
    let mut lut = [0u8; HIST_BINS];
    let mut sum = 0u64;
    for level in first + 1..HIST_BINS {
        sum += hist[level];
        lut[level] = (sum as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }

    for pixel in image.pixels_mut() {
        pixel[0] = lut[pixel[0] as usize];
    }
}
