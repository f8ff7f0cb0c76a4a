//! Matching a query embedding against the known persons.

use crate::types::{Embedding, Person};

/// Weight of the best single-face score in the blended confidence.
const MAX_WEIGHT: f32 = 0.7;
/// Weight of the mean score across all of a person's faces.
const MEAN_WEIGHT: f32 = 0.3;
/// Accuracy assumed for persons that have never completed training.
pub const DEFAULT_ACCURACY: f32 = 0.8;

/// Result of matching a query embedding against the person database.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonMatch {
    pub matched: bool,
    /// Blended confidence of the best candidate [0, 1]; 0 if there was none.
    pub confidence: f32,
    pub person_id: Option<String>,
    pub person_name: Option<String>,
}

impl PersonMatch {
    pub fn none() -> Self {
        Self {
            matched: false,
            confidence: 0.0,
            person_id: None,
            person_name: None,
        }
    }
}

/// Strategy for comparing a query embedding against enrolled persons.
pub trait PersonMatcher {
    /// `min_confidence` is a percentage in [0, 100].
    fn best_match(&self, query: &Embedding, persons: &[Person], min_confidence: f32) -> PersonMatch;
}

/// Blends best and mean per-person face scores, scaled by the person's accuracy.
///
/// Ties keep the earliest person in slice order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlendedMatcher {
    /// Provider-specific constant added to every face score.
    pub bonus: f32,
}

impl BlendedMatcher {
    pub fn new(bonus: f32) -> Self {
        Self { bonus }
    }

    /// Blended confidence for one person, or `None` if they have no faces.
    pub fn person_confidence(&self, query: &Embedding, person: &Person) -> Option<f32> {
        if person.faces.is_empty() {
            return None;
        }

        let mut max = 0.0f32;
        let mut sum = 0.0f32;
        for face in &person.faces {
            let score = query.match_score(&face.features, self.bonus);
            max = max.max(score);
            sum += score;
        }
        let mean = sum / person.faces.len() as f32;

        let blended = MAX_WEIGHT * max + MEAN_WEIGHT * mean;
        Some(blended * person.accuracy.unwrap_or(DEFAULT_ACCURACY))
    }
}

impl PersonMatcher for BlendedMatcher {
    fn best_match(&self, query: &Embedding, persons: &[Person], min_confidence: f32) -> PersonMatch {
        let mut best: Option<(usize, f32)> = None;

        for (i, person) in persons.iter().enumerate() {
            let Some(confidence) = self.person_confidence(query, person) else {
                continue;
            };
            if best.map_or(true, |(_, c)| confidence > c) {
                best = Some((i, confidence));
            }
        }

        let threshold = min_confidence / 100.0;
        match best {
            Some((idx, confidence)) if confidence > threshold => PersonMatch {
                matched: true,
                confidence,
                person_id: Some(persons[idx].id.clone()),
                person_name: Some(persons[idx].name.clone()),
            },
            Some((_, confidence)) => PersonMatch {
                confidence,
                ..PersonMatch::none()
            },
            None => PersonMatch::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use chrono::Utc;

    fn emb(values: Vec<f32>) -> Embedding {
        Embedding { values, model_version: None }
    }

    fn face(values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            id: "f".into(),
            coordinates: FaceCoordinates { x: 0.0, y: 0.0, width: 10.0, height: 10.0 },
            confidence: 0.9,
            features: emb(values),
            image_url: "https://img.example/a.jpg".into(),
            cropped_face_url: None,
            quality: FaceQuality { overall: 0.9, sharpness: 0.9, brightness: 0.9, pose: 0.9 },
            attributes: FaceAttributes { age: None, gender: None, emotion: None, glasses: false, smile: 0.0 },
        }
    }

    fn person(id: &str, faces: Vec<DetectedFace>, accuracy: Option<f32>) -> Person {
        Person {
            id: id.into(),
            name: format!("name-{id}"),
            aliases: vec![],
            faces,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            verified: false,
            category: PersonCategory::Model,
            training_status: TrainingStatus::Completed,
            accuracy,
        }
    }

    #[test]
    fn test_blended_confidence() {
        // Scores: identical = 1.0, orthogonal = 0.5 → max 1.0, mean 0.75.
        let p = person("1", vec![face(vec![1.0, 0.0]), face(vec![0.0, 1.0])], Some(1.0));
        let c = BlendedMatcher::new(0.0)
            .person_confidence(&emb(vec![1.0, 0.0]), &p)
            .unwrap();
        assert!((c - (0.7 * 1.0 + 0.3 * 0.75)).abs() < 1e-6, "got {c}");
    }

    #[test]
    fn test_missing_accuracy_defaults() {
        let p = person("1", vec![face(vec![1.0, 0.0])], None);
        let c = BlendedMatcher::new(0.0)
            .person_confidence(&emb(vec![1.0, 0.0]), &p)
            .unwrap();
        assert!((c - DEFAULT_ACCURACY).abs() < 1e-6);
    }

    #[test]
    fn test_person_without_faces_never_matches() {
        let persons = vec![person("empty", vec![], Some(1.0))];
        let result = BlendedMatcher::new(0.0).best_match(&emb(vec![1.0, 0.0]), &persons, 0.0);
        assert!(!result.matched);
        assert_eq!(result, PersonMatch::none());
    }

    #[test]
    fn test_best_candidate_above_threshold_wins() {
        let persons = vec![
            person("decoy", vec![face(vec![0.0, 1.0, 0.0])], Some(0.95)),
            person("empty", vec![], Some(1.0)),
            person("match", vec![face(vec![1.0, 0.0, 0.0])], Some(0.95)),
        ];

        let result = BlendedMatcher::new(0.0).best_match(&emb(vec![1.0, 0.0, 0.0]), &persons, 70.0);
        assert!(result.matched);
        assert_eq!(result.person_id.as_deref(), Some("match"));
        assert_eq!(result.person_name.as_deref(), Some("name-match"));
        assert!((result.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_is_strict() {
        // Confidence is exactly 0.8 with the default accuracy.
        let persons = vec![person("1", vec![face(vec![1.0, 0.0])], None)];
        let matcher = BlendedMatcher::new(0.0);

        let at = matcher.best_match(&emb(vec![1.0, 0.0]), &persons, 80.0);
        assert!(!at.matched);
        assert!((at.confidence - 0.8).abs() < 1e-6);
        assert!(at.person_id.is_none());

        let below = matcher.best_match(&emb(vec![1.0, 0.0]), &persons, 79.0);
        assert!(below.matched);
    }

    #[test]
    fn test_tie_keeps_first_person() {
        let persons = vec![
            person("first", vec![face(vec![1.0, 0.0])], Some(0.9)),
            person("second", vec![face(vec![1.0, 0.0])], Some(0.9)),
        ];
        let result = BlendedMatcher::new(0.0).best_match(&emb(vec![1.0, 0.0]), &persons, 50.0);
        assert_eq!(result.person_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_mismatched_dimensions_score_zero() {
        let persons = vec![person("1", vec![face(vec![1.0, 0.0, 0.0])], Some(1.0))];
        let result = BlendedMatcher::new(0.03).best_match(&emb(vec![1.0, 0.0]), &persons, 0.0);
        assert!(!result.matched);
        assert_eq!(result.confidence, 0.0);
    }
}
