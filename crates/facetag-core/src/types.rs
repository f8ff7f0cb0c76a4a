use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Face embedding vector (128-dimensional for most simulated providers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Provider that produced this embedding (e.g., "aws").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. A zero vector has
    /// similarity 0 with everything.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine similarity rescaled into [0, 1], plus a provider bonus, clamped.
    ///
    /// Embeddings of different lengths (or empty ones) score exactly 0.
    pub fn match_score(&self, other: &Embedding, bonus: f32) -> f32 {
        if self.values.len() != other.values.len() || self.values.is_empty() {
            return 0.0;
        }
        ((self.similarity(other) + 1.0) / 2.0 + bonus).clamp(0.0, 1.0)
    }

    /// L2-normalize the embedding in place. Zero vectors are left untouched.
    pub fn normalize(&mut self) {
        let norm: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in self.values.iter_mut() {
                *v /= norm;
            }
        }
    }
}

/// Pixel-space bounding box of a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceCoordinates {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Per-face image quality estimates, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceQuality {
    pub overall: f32,
    pub sharpness: f32,
    pub brightness: f32,
    /// 1.0 = frontal.
    pub pose: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Female,
    Male,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Neutral,
    Happy,
    Surprised,
    Sad,
    Angry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAttributes {
    pub age: Option<u8>,
    pub gender: Option<Gender>,
    pub emotion: Option<Emotion>,
    pub glasses: bool,
    /// Smile intensity in [0, 1].
    pub smile: f32,
}

/// A face found in an image by a detection provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub id: String,
    pub coordinates: FaceCoordinates,
    pub confidence: f32,
    pub features: Embedding,
    pub image_url: String,
    pub cropped_face_url: Option<String>,
    pub quality: FaceQuality,
    pub attributes: FaceAttributes,
}

/// Response of a single detection call. Never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceDetectionResult {
    pub faces: Vec<DetectedFace>,
    pub total_faces: usize,
    pub processing_time_ms: u64,
    pub image_id: String,
    pub api_provider: String,
    /// Mean face confidence; 0 when nothing was detected.
    pub confidence: f32,
}

impl FaceDetectionResult {
    /// Result returned when detection failed or the image held no faces.
    pub fn empty(image_id: impl Into<String>, api_provider: impl Into<String>) -> Self {
        Self {
            faces: Vec::new(),
            total_faces: 0,
            processing_time_ms: 0,
            image_id: image_id.into(),
            api_provider: api_provider.into(),
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonCategory {
    Model,
    Celebrity,
    PublicFigure,
    Photographer,
    Other,
}

impl std::str::FromStr for PersonCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "model" => Ok(Self::Model),
            "celebrity" => Ok(Self::Celebrity),
            "public_figure" | "public-figure" => Ok(Self::PublicFigure),
            "photographer" => Ok(Self::Photographer),
            "other" | "" => Ok(Self::Other),
            other => Err(format!("unknown person category: {other}")),
        }
    }
}

/// Simulated recognition-model training state of a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Pending,
    Training,
    Completed,
    Failed,
}

/// A named identity aggregating confirmed faces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub aliases: Vec<String>,
    pub faces: Vec<DetectedFace>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub verified: bool,
    pub category: PersonCategory,
    pub training_status: TrainingStatus,
    /// Recognition accuracy from the last completed training, if any.
    pub accuracy: Option<f32>,
}

impl Person {
    /// Case-insensitive substring match on the name and every alias.
    /// `needle` must already be lowercase.
    pub(crate) fn matches_query(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.aliases.iter().any(|a| a.to_lowercase().contains(needle))
    }

    /// True when all confirmed faces share one embedding length, i.e. they
    /// came from compatible providers and can be trained on together.
    pub fn has_uniform_embeddings(&self) -> bool {
        self.faces
            .windows(2)
            .all(|w| w[0].features.values.len() == w[1].features.values.len())
    }
}

/// A detected face together with the person it was matched to, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedFace {
    pub face: DetectedFace,
    pub person_id: Option<String>,
    pub person_name: Option<String>,
    /// Blended confidence of the best candidate, in [0, 1].
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub image_id: String,
    pub api_provider: String,
    pub processing_time_ms: u64,
    pub faces: Vec<RecognizedFace>,
    /// Number of faces matched to a known person.
    pub recognized: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: Vec<f32>) -> Embedding {
        Embedding { values, model_version: None }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = emb(vec![1.0, 0.0, 0.0]);
        let b = emb(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = emb(vec![1.0, 0.0]);
        let b = emb(vec![-1.0, 0.0]);
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = emb(vec![0.0, 0.0]);
        let b = emb(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_match_score_self_is_max_for_bonus() {
        let a = emb(vec![0.3, -0.4, 0.5, 0.1]);
        assert!((a.match_score(&a, 0.0) - 1.0).abs() < 1e-6);
        // A positive bonus cannot push past 1.0.
        assert_eq!(a.match_score(&a, 0.05), 1.0);
        // A negative bonus lowers the ceiling.
        assert!((a.match_score(&a, -0.1) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_match_score_rescales_orthogonal_and_opposite() {
        let a = emb(vec![1.0, 0.0]);
        assert!((a.match_score(&emb(vec![0.0, 1.0]), 0.0) - 0.5).abs() < 1e-6);
        assert!(a.match_score(&emb(vec![-1.0, 0.0]), 0.0).abs() < 1e-6);
        assert!((a.match_score(&emb(vec![-1.0, 0.0]), 0.02) - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_match_score_mismatched_lengths_is_zero() {
        let a = emb(vec![1.0, 0.0, 0.0]);
        let b = emb(vec![1.0, 0.0]);
        assert_eq!(a.match_score(&b, 0.0), 0.0);
        assert_eq!(a.match_score(&b, 0.5), 0.0);
        assert_eq!(emb(vec![]).match_score(&emb(vec![]), 0.1), 0.0);
    }

    #[test]
    fn test_match_score_bounded() {
        let a = emb(vec![0.9, -0.2, 0.1]);
        let b = emb(vec![-0.5, 0.7, 0.3]);
        for bonus in [-2.0, -0.1, 0.0, 0.03, 2.0] {
            let s = a.match_score(&b, bonus);
            assert!((0.0..=1.0).contains(&s), "bonus {bonus} gave {s}");
        }
    }

    #[test]
    fn test_normalize() {
        let mut a = emb(vec![3.0, 4.0]);
        a.normalize();
        assert!((a.values[0] - 0.6).abs() < 1e-6);
        assert!((a.values[1] - 0.8).abs() < 1e-6);

        let mut zero = emb(vec![0.0, 0.0]);
        zero.normalize();
        assert_eq!(zero.values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("Model".parse::<PersonCategory>(), Ok(PersonCategory::Model));
        assert_eq!("public-figure".parse::<PersonCategory>(), Ok(PersonCategory::PublicFigure));
        assert!("astronaut".parse::<PersonCategory>().is_err());
    }

    #[test]
    fn test_training_status_serializes_snake_case() {
        let json = serde_json::to_string(&TrainingStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
