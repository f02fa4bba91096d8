use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Side length of a normalized face template, in pixels.
pub const TEMPLATE_SIZE: u32 = 100;

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBox {
    /// A box covering a whole `width`×`height` frame.
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            confidence: 0.0,
        }
    }

    /// Integer pixel rectangle of this box clipped to the frame.
    ///
    /// Returns `None` when no pixel of the box lies inside the frame.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<PixelRect> {
        let x0 = self.x.floor().max(0.0);
        let y0 = self.y.floor().max(0.0);
        let x1 = (self.x + self.width).ceil().min(width as f32);
        let y1 = (self.y + self.height).ceil().min(height as f32);

        if !(x1 > x0 && y1 > y0) {
            return None;
        }

        Some(PixelRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

/// Axis-aligned rectangle in whole pixels, always inside its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Copy this rectangle out of `frame`.
    pub fn crop(&self, frame: &GrayImage) -> GrayImage {
        imageops::crop_imm(frame, self.x, self.y, self.width, self.height).to_image()
    }
}

/// A 100×100 single-channel image used as the comparison basis for a face.
#[derive(Debug, Clone, PartialEq)]
pub struct Template(GrayImage);

impl Template {
    /// Normalize a grayscale image of any size to the template size.
    ///
    /// Uses bilinear sampling. An empty image yields an all-black template.
    pub fn from_image(image: &GrayImage) -> Self {
        let (w, h) = image.dimensions();
        if (w, h) == (TEMPLATE_SIZE, TEMPLATE_SIZE) {
            return Self(image.clone());
        }
        if w == 0 || h == 0 {
            return Self(GrayImage::new(TEMPLATE_SIZE, TEMPLATE_SIZE));
        }
        Self(imageops::resize(image, TEMPLATE_SIZE, TEMPLATE_SIZE, FilterType::Triangle))
    }

    pub fn image(&self) -> &GrayImage {
        &self.0
    }
}

/// A registered face: identity name, ordinal id and its template.
#[derive(Debug, Clone)]
pub struct FaceRecord {
    /// 1-based, assigned in load/insert order, never reused within a run.
    pub id: u32,
    pub name: String,
    pub template: Template,
}

/// Outcome of matching one face region against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    Known { id: u32, name: String, score: f64 },
    /// `best_score` is `None` when the store was empty.
    Unknown { best_score: Option<f64> },
}

impl Recognition {
    /// Text drawn next to the region.
    pub fn label(&self) -> &str {
        match self {
            Recognition::Known { name, .. } => name,
            Recognition::Unknown { .. } => "Unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Recognition::Known { .. })
    }
}
