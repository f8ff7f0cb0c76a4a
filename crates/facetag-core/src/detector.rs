//! Simulated face detector.
//!
//! Stands in for remote detection APIs. Detections are fabricated from an RNG
//! seeded with a SHA-256 digest of `(image_id, provider)`, so the same image
//! always yields the same faces and embeddings for a given provider.

use crate::providers::ProviderProfile;
use crate::types::{
    DetectedFace, Embedding, Emotion, FaceAttributes, FaceCoordinates, FaceDetectionResult,
    FaceQuality, Gender,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use thiserror::Error;

const DEFAULT_IMAGE_WIDTH: u32 = 1920;
const DEFAULT_IMAGE_HEIGHT: u32 = 1280;
/// Smallest face edge, as a fraction of the shorter image side.
const MIN_FACE_FRACTION: f32 = 0.08;
/// Largest face edge, as a fraction of the shorter image side.
const MAX_FACE_FRACTION: f32 = 0.35;

#[derive(Error, Debug, PartialEq)]
pub enum DetectorError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// An image submitted for detection.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    pub image_url: String,
    /// Stable identifier; a fresh UUID when not given.
    pub image_id: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl DetectionRequest {
    pub fn new(image_url: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            image_id: None,
            width: DEFAULT_IMAGE_WIDTH,
            height: DEFAULT_IMAGE_HEIGHT,
        }
    }

    pub fn with_image_id(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// The caller's image id, or a fresh UUID.
    fn resolved_image_id(&self) -> String {
        self.image_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    fn validate(&self) -> Result<(), DetectorError> {
        if self.image_url.trim().is_empty() {
            return Err(DetectorError::InvalidImage("empty image URL".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(DetectorError::InvalidImage(format!(
                "zero-sized image {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Provider-simulating face detector.
#[derive(Debug, Clone)]
pub struct FaceDetector {
    /// Multiplier applied to each provider's simulated latency (0 disables it).
    latency_scale: f32,
}

impl Default for FaceDetector {
    fn default() -> Self {
        Self { latency_scale: 1.0 }
    }
}

impl FaceDetector {
    pub fn new(latency_scale: f32) -> Self {
        Self {
            latency_scale: latency_scale.max(0.0),
        }
    }

    /// Detect faces in an image, returning them sorted by confidence.
    pub fn detect(
        &self,
        request: &DetectionRequest,
        provider: &ProviderProfile,
    ) -> Result<FaceDetectionResult, DetectorError> {
        let start = Instant::now();
        let image_id = request.resolved_image_id();
        request.validate()?;

        let latency = Duration::from_millis(provider.latency_ms).mul_f32(self.latency_scale);
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let mut rng = seeded_rng(&image_id, &provider.name);
        let count = rng.gen_range(1..=provider.max_faces.max(1));

        let mut faces: Vec<DetectedFace> = (0..count)
            .map(|_| fabricate_face(&mut rng, request, provider))
            .collect();
        faces.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let confidence = faces.iter().map(|f| f.confidence).sum::<f32>() / faces.len() as f32;

        tracing::debug!(
            image_id = %image_id,
            provider = %provider.name,
            faces = faces.len(),
            "detection complete"
        );

        Ok(FaceDetectionResult {
            total_faces: faces.len(),
            faces,
            processing_time_ms: start.elapsed().as_millis() as u64,
            image_id,
            api_provider: provider.name.clone(),
            confidence,
        })
    }

    /// Like [`detect`](Self::detect), but failures are logged and turned into
    /// an empty result with zero confidence.
    pub fn detect_or_empty(
        &self,
        request: &DetectionRequest,
        provider: &ProviderProfile,
    ) -> FaceDetectionResult {
        let image_id = request.resolved_image_id();
        let request = request.clone().with_image_id(image_id.clone());
        match self.detect(&request, provider) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    image_id = %image_id,
                    image_url = %request.image_url,
                    provider = %provider.name,
                    "detection failed; returning empty result"
                );
                FaceDetectionResult::empty(image_id, provider.name.clone())
            }
        }
    }
}

fn seeded_rng(image_id: &str, provider: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(image_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(provider.as_bytes());
    let seed: [u8; 32] = hasher.finalize().into();
    StdRng::from_seed(seed)
}

/// Random unit-length embedding of the given dimension.
pub fn random_embedding(rng: &mut impl Rng, dim: usize, provider: &str) -> Embedding {
    let mut embedding = Embedding {
        values: (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect(),
        model_version: Some(provider.to_string()),
    };
    embedding.normalize();
    embedding
}

/// Random UUID v4 drawn from `rng`, so seeded detections get stable face ids.
pub(crate) fn random_id(rng: &mut impl Rng) -> String {
    uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string()
}

fn fabricate_face(
    rng: &mut StdRng,
    request: &DetectionRequest,
    provider: &ProviderProfile,
) -> DetectedFace {
    let (w, h) = (request.width as f32, request.height as f32);
    let short_side = w.min(h);
    let size = short_side * rng.gen_range(MIN_FACE_FRACTION..=MAX_FACE_FRACTION);
    let coordinates = FaceCoordinates {
        x: rng.gen_range(0.0..=(w - size)).floor(),
        y: rng.gen_range(0.0..=(h - size)).floor(),
        width: size.floor().max(1.0),
        height: (size * rng.gen_range(1.0..=1.25)).min(h).floor().max(1.0),
    };
    // Height may grow past the bottom edge; pull the box back inside.
    let coordinates = FaceCoordinates {
        y: coordinates.y.min(h - coordinates.height).max(0.0),
        ..coordinates
    };

    let confidence = rng.gen_range(provider.min_confidence..=provider.max_confidence);

    let sharpness = rng.gen_range(0.6f32..1.0);
    let brightness = rng.gen_range(0.5f32..1.0);
    let pose = rng.gen_range(0.4f32..1.0);
    let quality = FaceQuality {
        overall: (sharpness + brightness + pose) / 3.0,
        sharpness,
        brightness,
        pose,
    };

    let attributes = FaceAttributes {
        age: Some(rng.gen_range(18..=70)),
        gender: [Gender::Female, Gender::Male].choose(rng).copied(),
        emotion: [
            Emotion::Neutral,
            Emotion::Happy,
            Emotion::Surprised,
            Emotion::Sad,
            Emotion::Angry,
        ]
        .choose(rng)
        .copied(),
        glasses: rng.gen_bool(0.2),
        smile: rng.gen_range(0.0f32..1.0),
    };

    let cropped_face_url = Some(format!(
        "{}?crop={},{},{},{}",
        request.image_url, coordinates.x, coordinates.y, coordinates.width, coordinates.height
    ));

    DetectedFace {
        id: random_id(rng),
        coordinates,
        confidence,
        features: random_embedding(rng, provider.embedding_dim, &provider.name),
        image_url: request.image_url.clone(),
        cropped_face_url,
        quality,
        attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::lookup_provider;

    fn detector() -> FaceDetector {
        FaceDetector::new(0.0)
    }

    #[test]
    fn test_detection_is_deterministic_per_image() {
        let provider = lookup_provider("local").unwrap();
        let request = DetectionRequest::new("https://img.example/beach.jpg").with_image_id("img-1");

        let a = detector().detect(&request, provider).unwrap();
        let b = detector().detect(&request, provider).unwrap();
        assert_eq!(a.faces, b.faces);
        assert_eq!(a.image_id, "img-1");
    }

    #[test]
    fn test_different_providers_differ() {
        let request = DetectionRequest::new("https://img.example/beach.jpg").with_image_id("img-1");
        let a = detector().detect(&request, lookup_provider("local").unwrap()).unwrap();
        let b = detector().detect(&request, lookup_provider("aws").unwrap()).unwrap();
        assert_ne!(a.faces[0].features, b.faces[0].features);
        assert_eq!(b.api_provider, "aws");
    }

    #[test]
    fn test_faces_respect_provider_profile() {
        for provider in crate::providers::list_providers() {
            for i in 0..20 {
                let request = DetectionRequest::new("https://img.example/x.jpg")
                    .with_image_id(format!("img-{i}"))
                    .with_dimensions(800, 600);
                let result = detector().detect(&request, provider).unwrap();

                assert!(result.total_faces >= 1 && result.total_faces <= provider.max_faces);
                assert_eq!(result.total_faces, result.faces.len());
                for face in &result.faces {
                    let c = face.coordinates;
                    assert!(c.x >= 0.0 && c.y >= 0.0);
                    assert!(c.x + c.width <= 800.0, "{c:?}");
                    assert!(c.y + c.height <= 600.0, "{c:?}");
                    assert!(face.confidence >= provider.min_confidence);
                    assert!(face.confidence <= provider.max_confidence);
                    assert_eq!(face.features.values.len(), provider.embedding_dim);
                    let norm: f32 = face.features.values.iter().map(|v| v * v).sum::<f32>().sqrt();
                    assert!((norm - 1.0).abs() < 1e-4);
                }
            }
        }
    }

    #[test]
    fn test_faces_sorted_and_mean_confidence() {
        let provider = lookup_provider("aws").unwrap();
        let request = DetectionRequest::new("https://img.example/group.jpg").with_image_id("group");
        let result = detector().detect(&request, provider).unwrap();

        for pair in result.faces.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
        let mean = result.faces.iter().map(|f| f.confidence).sum::<f32>() / result.faces.len() as f32;
        assert!((result.confidence - mean).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_image_rejected() {
        let provider = lookup_provider("local").unwrap();
        let err = detector().detect(&DetectionRequest::new("  "), provider).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidImage(_)));

        let zero = DetectionRequest::new("https://img.example/a.jpg").with_dimensions(0, 10);
        assert!(detector().detect(&zero, provider).is_err());
    }

    #[test]
    fn test_detect_or_empty_swallows_errors() {
        let provider = lookup_provider("azure").unwrap();
        let request = DetectionRequest::new("").with_image_id("broken");
        let result = detector().detect_or_empty(&request, provider);
        assert!(result.faces.is_empty());
        assert_eq!(result.total_faces, 0);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.image_id, "broken");
        assert_eq!(result.api_provider, "azure");
    }

    #[test]
    fn test_detect_or_empty_assigns_image_id_on_failure() {
        let provider = lookup_provider("local").unwrap();
        let failed = detector().detect_or_empty(&DetectionRequest::new(""), provider);
        assert!(failed.faces.is_empty());
        assert!(uuid::Uuid::parse_str(&failed.image_id).is_ok(), "{}", failed.image_id);

        let ok = detector().detect_or_empty(&DetectionRequest::new("https://img.example/a.jpg"), provider);
        assert!(uuid::Uuid::parse_str(&ok.image_id).is_ok());
    }

    #[test]
    fn test_cropped_url_encodes_box() {
        let provider = lookup_provider("local").unwrap();
        let request = DetectionRequest::new("https://img.example/a.jpg").with_image_id("a");
        let face = &detector().detect(&request, provider).unwrap().faces[0];
        let url = face.cropped_face_url.as_deref().unwrap();
        assert!(url.starts_with("https://img.example/a.jpg?crop="));
    }
}
