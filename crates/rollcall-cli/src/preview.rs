//! Preview sinks for the capture loops.

use image::{GrayImage, Luma};
use rollcall_core::{BoundingBox, Overlay, Preview};
use std::path::{Path, PathBuf};

const OUTLINE: Luma<u8> = Luma([255]);
const OUTLINE_THICKNESS: u32 = 2;

/// Build the preview sink for this run.
pub fn from_path(path: Option<&Path>) -> Box<dyn Preview> {
    match path {
        Some(path) => Box::new(FilePreview::new(path)),
        None => Box::new(LogPreview::default()),
    }
}

/// Logs the set of labels in view whenever it changes.
#[derive(Default)]
pub struct LogPreview {
    last: Vec<String>,
}

impl Preview for LogPreview {
    fn show(&mut self, _frame: &GrayImage, overlays: &[Overlay]) {
        let labels: Vec<String> = overlays.iter().map(|o| o.label.clone()).collect();
        if labels != self.last {
            tracing::info!(?labels, "faces in view");
            self.last = labels;
        }
    }
}

/// Writes each frame, with region outlines, to a JPEG file.
///
/// The image is written next to the target and renamed over it, so a viewer
/// polling the file never reads a half-written frame.
pub struct FilePreview {
    path: PathBuf,
    staging: PathBuf,
    labels: LogPreview,
    failing: bool,
}

impl FilePreview {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            staging: path.with_extension("partial.jpg"),
            labels: LogPreview::default(),
            failing: false,
        }
    }

    fn write(&self, canvas: &GrayImage) -> Result<(), String> {
        canvas.save(&self.staging).map_err(|e| e.to_string())?;
        std::fs::rename(&self.staging, &self.path).map_err(|e| e.to_string())
    }
}

impl Preview for FilePreview {
    fn show(&mut self, frame: &GrayImage, overlays: &[Overlay]) {
        self.labels.show(frame, overlays);

        let mut canvas = frame.clone();
        for overlay in overlays {
            draw_outline(&mut canvas, &overlay.region, OUTLINE_THICKNESS);
        }

        match self.write(&canvas) {
            Ok(()) => self.failing = false,
            Err(e) => {
                // Warn once per failure streak.
                if !self.failing {
                    tracing::warn!(path = %self.path.display(), error = %e, "preview write failed");
                }
                self.failing = true;
            }
        }
    }
}

/// Draw a rectangle outline for `region`, clipped to the canvas.
pub fn draw_outline(canvas: &mut GrayImage, region: &BoundingBox, thickness: u32) {
    let Some(rect) = region.clip_to(canvas.width(), canvas.height()) else {
        return;
    };
    let t = thickness.min(rect.width).min(rect.height);
    let right = rect.x + rect.width;
    let bottom = rect.y + rect.height;

    for y in rect.y..bottom {
        for x in rect.x..right {
            let edge = x < rect.x + t || x >= right - t || y < rect.y + t || y >= bottom - t;
            if edge {
                canvas.put_pixel(x, y, OUTLINE);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 0.9,
        }
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_log_preview_visible_at_default_level() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(crate::DEFAULT_LOG_FILTER))
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let mut preview = LogPreview::default();
        let frame = GrayImage::new(8, 8);
        let overlays = [Overlay {
            region: region(0.0, 0.0, 4.0, 4.0),
            label: "alice".to_string(),
        }];
        tracing::subscriber::with_default(subscriber, || {
            preview.show(&frame, &overlays);
            preview.show(&frame, &overlays);
        });

        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(out.matches("faces in view").count(), 1);
        assert!(out.contains("alice"));
    }

    #[test]
    fn test_draw_outline_edges_only() {
        let mut canvas = GrayImage::new(20, 20);
        draw_outline(&mut canvas, &region(5.0, 5.0, 10.0, 10.0), 2);

        assert_eq!(canvas.get_pixel(5, 5)[0], 255);
        assert_eq!(canvas.get_pixel(6, 10)[0], 255);
        assert_eq!(canvas.get_pixel(14, 14)[0], 255);
        assert_eq!(canvas.get_pixel(10, 10)[0], 0);
        assert_eq!(canvas.get_pixel(4, 4)[0], 0);
        assert_eq!(canvas.get_pixel(15, 15)[0], 0);
    }

    #[test]
    fn test_draw_outline_clipped() {
        let mut canvas = GrayImage::new(10, 10);
        draw_outline(&mut canvas, &region(-5.0, -5.0, 10.0, 10.0), 1);
        assert_eq!(canvas.get_pixel(4, 0)[0], 255);
        assert_eq!(canvas.get_pixel(0, 4)[0], 255);

        let mut untouched = GrayImage::new(10, 10);
        draw_outline(&mut untouched, &region(50.0, 50.0, 5.0, 5.0), 1);
        assert!(untouched.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_file_preview_writes_annotated_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("preview.jpg");
        let mut preview = FilePreview::new(&path);

        let frame = GrayImage::new(64, 48);
        let overlays = [Overlay {
            region: region(10.0, 10.0, 20.0, 20.0),
            label: "alice".to_string(),
        }];
        preview.show(&frame, &overlays);

        let written = image::open(&path).unwrap().to_luma8();
        assert_eq!(written.dimensions(), (64, 48));
        assert!(written.get_pixel(10, 20)[0] > 100);
        assert!(written.get_pixel(20, 20)[0] < 50);
        assert!(!tmp.path().join("preview.partial.jpg").exists());
    }

    #[test]
    fn test_file_preview_bad_directory_does_not_panic() {
        let tmp = tempfile::tempdir().unwrap();
        let mut preview = FilePreview::new(&tmp.path().join("missing/preview.jpg"));
        preview.show(&GrayImage::new(8, 8), &[]);
        preview.show(&GrayImage::new(8, 8), &[]);
        assert!(preview.failing);
    }
}
