//! facetag-core — Face tagging engine for the photo marketplace.
//!
//! Simulates provider-backed face detection, keeps an in-memory database of
//! known persons and matches detected faces against it by cosine similarity.

pub mod database;
pub mod detector;
pub mod downloads;
pub mod matcher;
pub mod providers;
pub mod seed;
pub mod types;

pub use database::{DatabaseError, DatabaseStats, FaceDatabase, NewPerson, PersonUpdate};
pub use detector::{DetectionRequest, DetectorError, FaceDetector};
pub use downloads::{DownloadError, DownloadHistory, DownloadRecord, LicenseType};
pub use matcher::{BlendedMatcher, PersonMatch, PersonMatcher};
pub use providers::{lookup_provider, ProviderError, ProviderProfile};
pub use types::{
    DetectedFace, Embedding, FaceAttributes, FaceCoordinates, FaceDetectionResult, FaceQuality,
    Person, PersonCategory, RecognitionResult, RecognizedFace, TrainingStatus,
};
