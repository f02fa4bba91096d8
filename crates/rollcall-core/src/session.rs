//! Recognition and enrollment loops.
//!
//! A [`Station`] owns the face store, recognizer and attendance log. The
//! loops pull frames through [`FrameSource`], find faces with a
//! [`FaceDetector`], poll [`OperatorInput`] once per iteration and hand every
//! frame to a [`Preview`]. Everything runs on the caller's thread; one frame
//! is fully processed before the next is pulled.

use crate::attendance::AttendanceLog;
use crate::detector::{DetectorError, FaceDetector};
use crate::histogram;
use crate::recognizer::Recognizer;
use crate::store::{FaceStore, StoreError};
use crate::tracker::SessionTracker;
use crate::types::{BoundingBox, Recognition, Template};
use image::GrayImage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("frame capture failed: {0}")]
pub struct CaptureError(pub String);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no faces registered; register at least one face first")]
    NoFacesRegistered,
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("face store error: {0}")]
    Store(#[from] StoreError),
}

/// Pulls grayscale frames, one at a time.
pub trait FrameSource {
    /// The next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<GrayImage>, CaptureError>;
}

/// Operator key signal during a capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Capture,
    Quit,
}

impl Signal {
    /// `c` captures, `q` quits; case-insensitive.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'c' => Some(Signal::Capture),
            'q' => Some(Signal::Quit),
            _ => None,
        }
    }
}

/// Non-blocking (or briefly blocking) source of operator signals.
pub trait OperatorInput {
    fn poll(&mut self) -> Option<Signal>;
}

/// A labelled region drawn over a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub region: BoundingBox,
    pub label: String,
}

/// Shows each processed frame to the operator.
pub trait Preview {
    fn show(&mut self, frame: &GrayImage, overlays: &[Overlay]);
}

/// The hardware-facing collaborators of a capture loop.
pub struct Devices<'a> {
    pub source: &'a mut dyn FrameSource,
    pub detector: &'a mut dyn FaceDetector,
    pub input: &'a mut dyn OperatorInput,
    pub preview: &'a mut dyn Preview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Quit,
    EndOfStream,
}

/// What an attendance session did before it stopped.
#[derive(Debug, Clone)]
pub struct AttendanceSummary {
    pub frames: usize,
    pub records_written: usize,
    /// Identities marked this session, sorted.
    pub marked: Vec<String>,
    pub stop: StopReason,
}

/// How the enrolled template was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    RegionDetected,
    /// No face was found, so the whole frame became the template.
    WholeFrameFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentOutcome {
    Enrolled {
        id: u32,
        name: String,
        capture: CaptureKind,
        image_path: PathBuf,
    },
    /// Quit before capture; the store is untouched.
    Cancelled,
    /// The source ran dry before capture; the store is untouched.
    StreamEnded,
}

/// Process-wide state for taking attendance and enrolling faces.
pub struct Station {
    store: FaceStore,
    recognizer: Recognizer,
    log: AttendanceLog,
}

impl Station {
    pub fn new(store: FaceStore, recognizer: Recognizer, log: AttendanceLog) -> Self {
        Self {
            store,
            recognizer,
            log,
        }
    }

    pub fn store(&self) -> &FaceStore {
        &self.store
    }

    pub fn recognizer(&self) -> &Recognizer {
        &self.recognizer
    }

    pub fn log(&self) -> &AttendanceLog {
        &self.log
    }

    /// Run the recognition loop until the operator quits or the stream ends.
    ///
    /// Refuses to start (pulling no frames) when the store is empty.
    pub fn take_attendance(
        &self,
        devices: &mut Devices<'_>,
    ) -> Result<AttendanceSummary, SessionError> {
        if self.store.is_empty() {
            return Err(SessionError::NoFacesRegistered);
        }

        tracing::info!(faces = self.store.len(), "starting attendance capture");
        let mut tracker = SessionTracker::new();
        let mut frames = 0usize;
        let mut records_written = 0usize;

        let stop = loop {
            let Some(frame) = devices.source.next_frame()? else {
                break StopReason::EndOfStream;
            };
            frames += 1;

            let recognitions = self.recognize_frame(&frame, devices.detector)?;
            let mut overlays = Vec::with_capacity(recognitions.len());
            for (region, recognition) in recognitions {
                if let Recognition::Known { name, .. } = &recognition {
                    if self.record_sighting(name, &mut tracker) {
                        records_written += 1;
                    }
                }
                overlays.push(Overlay {
                    region,
                    label: recognition.label().to_string(),
                });
            }

            devices.preview.show(&frame, &overlays);

            if devices.input.poll() == Some(Signal::Quit) {
                break StopReason::Quit;
            }
        };

        tracing::info!(frames, records_written, ?stop, "attendance capture stopped");
        Ok(AttendanceSummary {
            frames,
            records_written,
            marked: tracker.names(),
            stop,
        })
    }

    /// Detect faces in one frame and recognize each region independently.
    ///
    /// Detection and cropping run on a histogram-equalized copy of the frame.
    pub fn recognize_frame(
        &self,
        frame: &GrayImage,
        detector: &mut dyn FaceDetector,
    ) -> Result<Vec<(BoundingBox, Recognition)>, DetectorError> {
        let mut equalized = frame.clone();
        histogram::equalize(&mut equalized);

        let regions = detector.detect(&equalized)?;
        let (width, height) = equalized.dimensions();

        Ok(regions
            .into_iter()
            .filter_map(|region| {
                let rect = region.clip_to(width, height)?;
                let face = rect.crop(&equalized);
                Some((region, self.recognizer.recognize(&face, &self.store)))
            })
            .collect())
    }

    /// Log a first sighting of `name` this session.
    ///
    /// Returns `true` when a record was written. A failed write is reported and
    /// dropped; the identity is marked regardless so it is not retried.
    fn record_sighting(&self, name: &str, tracker: &mut SessionTracker) -> bool {
        if tracker.already_marked(name) {
            return false;
        }
        tracing::info!(name, "detected (first time in this session)");

        let now = chrono::Local::now().naive_local();
        let written = match self.log.append(name, now) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(name, error = %e, "attendance event dropped");
                false
            }
        };
        tracker.mark(name);
        written
    }

    /// Run the enrollment loop for `name` until capture, quit or end of stream.
    pub fn enroll(
        &mut self,
        name: &str,
        devices: &mut Devices<'_>,
    ) -> Result<EnrollmentOutcome, SessionError> {
        tracing::info!(name, "capturing new face");

        loop {
            let Some(frame) = devices.source.next_frame()? else {
                return Ok(EnrollmentOutcome::StreamEnded);
            };

            devices.preview.show(&frame, &[]);

            match devices.input.poll() {
                Some(Signal::Capture) => return self.capture(name, &frame, devices.detector),
                Some(Signal::Quit) => {
                    tracing::info!("capture cancelled");
                    return Ok(EnrollmentOutcome::Cancelled);
                }
                None => {}
            }
        }
    }

    /// Turn the captured frame into a template and store it under `name`.
    fn capture(
        &mut self,
        name: &str,
        frame: &GrayImage,
        detector: &mut dyn FaceDetector,
    ) -> Result<EnrollmentOutcome, SessionError> {
        let (width, height) = frame.dimensions();
        let detected = detector
            .detect(frame)?
            .into_iter()
            .find_map(|region| region.clip_to(width, height));

        let (face, capture) = match detected {
            Some(rect) => (rect.crop(frame), CaptureKind::RegionDetected),
            None => {
                tracing::warn!("no face clearly detected, using whole frame as face");
                (frame.clone(), CaptureKind::WholeFrameFallback)
            }
        };

        let (record, image_path) = self.store.add(name, Template::from_image(&face), frame)?;
        Ok(EnrollmentOutcome::Enrolled {
            id: record.id,
            name: record.name.clone(),
            capture,
            image_path,
        })
    }
}
