//! Startup and the two camera-driven modes.

use crate::config::Config;
use crate::console::KeyChannel;
use crate::preview;
use anyhow::{Context, Result};
use image::GrayImage;
use rollcall_core::{
    AttendanceLog, AttendanceSummary, CaptureError, CaptureKind, DetectorOptions, Devices,
    EnrollmentOutcome, FaceStore, FrameSource, Recognizer, ScrfdDetector, SessionError, Station,
    StopReason,
};
use rollcall_hw::{Camera, CameraStream};
use std::time::Duration;

/// Adapts a V4L2 stream to the session's frame source.
pub struct CameraSource<'a> {
    stream: CameraStream<'a>,
    last_sequence: Option<u32>,
}

impl<'a> CameraSource<'a> {
    pub fn new(stream: CameraStream<'a>) -> Self {
        Self {
            stream,
            last_sequence: None,
        }
    }
}

impl FrameSource for CameraSource<'_> {
    fn next_frame(&mut self) -> Result<Option<GrayImage>, CaptureError> {
        let frame = self
            .stream
            .next_frame()
            .map_err(|e| CaptureError(e.to_string()))?;

        let dropped = frames_dropped(self.last_sequence, frame.sequence);
        if dropped > 0 {
            tracing::debug!(dropped, sequence = frame.sequence, "driver dropped frames");
        }
        tracing::trace!(sequence = frame.sequence, "frame captured");
        self.last_sequence = Some(frame.sequence);

        frame
            .into_image()
            .map(Some)
            .map_err(|e| CaptureError(e.to_string()))
    }
}

/// Everything the capture modes need, opened up front.
pub struct App {
    config: Config,
    station: Station,
    detector: ScrfdDetector,
    camera: Camera,
}

impl App {
    /// Load the detector, the face store and the camera. Any failure here is fatal.
    pub fn start(config: Config) -> Result<Self> {
        let model_path = config.scrfd_model_path();
        let options = DetectorOptions {
            confidence_threshold: config.detection_confidence,
            min_face_size: config.min_face_size as f32,
        };
        let detector = ScrfdDetector::load(&model_path, options)
            .with_context(|| format!("loading face detector from {}", model_path.display()))?;

        let store = FaceStore::load(&config.faces_dir)
            .with_context(|| format!("loading faces from {}", config.faces_dir.display()))?;
        println!("Loaded {} faces from {}.", store.len(), store.dir().display());

        let camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)
            .with_context(|| format!("could not open camera {}", config.camera_device))?;

        let station = Station::new(
            store,
            Recognizer::new(config.similarity_threshold),
            AttendanceLog::new(&config.attendance_log),
        );

        tracing::info!(
            faces = station.store().len(),
            camera = %config.camera_device,
            threshold = station.recognizer().threshold(),
            log = %station.log().path().display(),
            "station ready"
        );

        Ok(Self {
            config,
            station,
            detector,
            camera,
        })
    }

    fn key_poll(&self) -> Duration {
        Duration::from_millis(self.config.key_poll_ms)
    }

    /// Run the recognition loop and print a summary.
    pub fn take_attendance(&mut self) -> Result<()> {
        if self.station.store().is_empty() {
            println!("No registered faces found! Please register at least one face first.");
            return Ok(());
        }

        let mut source = CameraSource::new(self.camera.stream()?);
        let mut input = KeyChannel::stdin(self.key_poll())?;
        let mut preview = preview::from_path(self.config.preview_path.as_deref());

        println!("Starting attendance capture... type 'q' and press Enter to quit.");
        let mut devices = Devices {
            source: &mut source,
            detector: &mut self.detector,
            input: &mut input,
            preview: preview.as_mut(),
        };

        match self.station.take_attendance(&mut devices) {
            Ok(summary) => {
                print_summary(&summary);
                Ok(())
            }
            Err(SessionError::NoFacesRegistered) => {
                println!("No registered faces found! Please register at least one face first.");
                Ok(())
            }
            Err(e) => Err(e).context("attendance capture failed"),
        }
    }

    /// Run the enrollment loop for `name`.
    pub fn register_face(&mut self, name: &str) -> Result<()> {
        let mut source = CameraSource::new(self.camera.stream()?);
        let mut input = KeyChannel::stdin(self.key_poll())?;
        let mut preview = preview::from_path(self.config.preview_path.as_deref());

        println!("Capturing new face for '{name}'. Type 'c' and press Enter to capture, 'q' to quit.");
        let mut devices = Devices {
            source: &mut source,
            detector: &mut self.detector,
            input: &mut input,
            preview: preview.as_mut(),
        };

        let outcome = self
            .station
            .enroll(name, &mut devices)
            .with_context(|| format!("registering '{name}'"))?;

        match outcome {
            EnrollmentOutcome::Enrolled {
                id,
                name,
                capture,
                image_path,
            } => {
                if capture == CaptureKind::WholeFrameFallback {
                    println!("No face clearly detected. Using whole frame as face.");
                }
                println!("Saved face image: {}", image_path.display());
                println!("Person '{name}' added to database (id {id}).");
            }
            EnrollmentOutcome::Cancelled => println!("Cancelled capture."),
            EnrollmentOutcome::StreamEnded => println!("Camera stream ended before capture."),
        }
        Ok(())
    }
}

/// Frames skipped between two driver sequence numbers.
fn frames_dropped(last: Option<u32>, current: u32) -> u32 {
    match last {
        Some(last) => current.wrapping_sub(last).saturating_sub(1),
        None => 0,
    }
}

fn print_summary(summary: &AttendanceSummary) {
    let reason = match summary.stop {
        StopReason::Quit => "stopped by operator",
        StopReason::EndOfStream => "camera stream ended",
    };
    println!(
        "Attendance capture {reason} after {} frames; {} records written.",
        summary.frames, summary.records_written
    );
    if summary.marked.is_empty() {
        println!("Nobody was recognized.");
    } else {
        println!("Present: {}", summary.marked.join(", "));
    }
}
