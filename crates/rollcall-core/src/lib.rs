//! rollcall-core — Face store, histogram recognition and attendance logging.
//!
//! Faces are compared by correlating 256-bin intensity histograms of
//! 100×100 grayscale templates. Detection runs SCRFD via ONNX Runtime
//! behind the [`FaceDetector`] trait so the capture loops can be driven
//! by any frame source.

pub mod attendance;
pub mod detector;
pub mod histogram;
pub mod recognizer;
pub mod session;
pub mod store;
pub mod tracker;
pub mod types;

pub use attendance::{AttendanceLog, AttendanceRecord, LogError};
pub use detector::{DetectorError, DetectorOptions, FaceDetector, ScrfdDetector};
pub use histogram::Histogram;
pub use recognizer::{HistogramCorrelation, Recognizer, Similarity, DEFAULT_SIMILARITY_THRESHOLD};
pub use session::{
    AttendanceSummary, CaptureError, CaptureKind, Devices, EnrollmentOutcome, FrameSource,
    OperatorInput, Overlay, Preview, SessionError, Signal, Station, StopReason,
};
pub use store::{FaceStore, StoreError};
pub use tracker::SessionTracker;
pub use types::{BoundingBox, FaceRecord, PixelRect, Recognition, Template, TEMPLATE_SIZE};
