//! In-memory person/face database.
//!
//! Owned by a single thread; nothing here is persisted. Persons are kept in
//! insertion order, which is also the order used to break matcher ties.

use crate::matcher::PersonMatcher;
use crate::types::{
    DetectedFace, FaceDetectionResult, Person, PersonCategory, RecognitionResult, RecognizedFace,
    TrainingStatus,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DatabaseError {
    #[error("person not found: {0}")]
    PersonNotFound(String),
    #[error("face {face_id} not found on person {person_id}")]
    FaceNotFound { person_id: String, face_id: String },
    #[error("person name must not be empty")]
    EmptyName,
    #[error("cannot merge person {0} into itself")]
    SelfMerge(String),
    #[error("person {0} has no faces to train on")]
    NoFaces(String),
    #[error("person {0} is already training")]
    AlreadyTraining(String),
    #[error("person {0} is not training")]
    NotTraining(String),
}

/// Fields for a new person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPerson {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub category: PersonCategory,
    #[serde(default)]
    pub verified: bool,
}

impl NewPerson {
    pub fn new(name: impl Into<String>, category: PersonCategory) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            category,
            verified: false,
        }
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonUpdate {
    pub name: Option<String>,
    pub aliases: Option<Vec<String>>,
    pub category: Option<PersonCategory>,
    pub verified: Option<bool>,
}

/// Counts reported by [`FaceDatabase::stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub persons: usize,
    pub faces: usize,
    pub verified: usize,
    pub pending: usize,
    pub training: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct FaceDatabase {
    persons: Vec<Person>,
}

impl FaceDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database pre-populated with the given persons, in order.
    pub fn with_persons(persons: Vec<Person>) -> Self {
        Self { persons }
    }

    pub fn add_person(&mut self, new: NewPerson) -> Result<Person, DatabaseError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(DatabaseError::EmptyName);
        }

        let now = Utc::now();
        let person = Person {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            aliases: dedup_aliases(new.aliases, name),
            faces: Vec::new(),
            created_at: now,
            updated_at: now,
            verified: new.verified,
            category: new.category,
            training_status: TrainingStatus::Pending,
            accuracy: None,
        };
        tracing::info!(person_id = %person.id, name = %person.name, "person added");
        self.persons.push(person.clone());
        Ok(person)
    }

    pub fn get_person(&self, id: &str) -> Option<&Person> {
        self.persons.iter().find(|p| p.id == id)
    }

    pub fn persons(&self) -> &[Person] {
        &self.persons
    }

    /// Case-insensitive substring search over names and aliases.
    pub fn search_persons(&self, query: &str) -> Vec<&Person> {
        let needle = query.trim().to_lowercase();
        self.persons
            .iter()
            .filter(|p| p.matches_query(&needle))
            .collect()
    }

    pub fn persons_by_category(&self, category: PersonCategory) -> Vec<&Person> {
        self.persons.iter().filter(|p| p.category == category).collect()
    }

    pub fn update_person(&mut self, id: &str, update: PersonUpdate) -> Result<Person, DatabaseError> {
        let person = self.person_mut(id)?;

        if let Some(name) = update.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DatabaseError::EmptyName);
            }
            person.name = name.to_string();
        }
        if let Some(aliases) = update.aliases {
            person.aliases = dedup_aliases(aliases, &person.name);
        }
        if let Some(category) = update.category {
            person.category = category;
        }
        if let Some(verified) = update.verified {
            person.verified = verified;
        }
        person.updated_at = Utc::now();

        Ok(person.clone())
    }

    /// Confirm a detected face as belonging to a person.
    ///
    /// The person's recognition model becomes stale, so training goes back to
    /// `pending`.
    pub fn add_face(&mut self, person_id: &str, face: DetectedFace) -> Result<(), DatabaseError> {
        let person = self.person_mut(person_id)?;
        tracing::debug!(person_id, face_id = %face.id, "face confirmed");
        person.faces.push(face);
        person.training_status = TrainingStatus::Pending;
        person.updated_at = Utc::now();
        Ok(())
    }

    pub fn remove_face(&mut self, person_id: &str, face_id: &str) -> Result<DetectedFace, DatabaseError> {
        let person = self.person_mut(person_id)?;
        let idx = person
            .faces
            .iter()
            .position(|f| f.id == face_id)
            .ok_or_else(|| DatabaseError::FaceNotFound {
                person_id: person_id.to_string(),
                face_id: face_id.to_string(),
            })?;
        let face = person.faces.remove(idx);
        person.training_status = TrainingStatus::Pending;
        person.updated_at = Utc::now();
        Ok(face)
    }

    /// Merge `source` into `target` and delete `source`.
    ///
    /// Faces are appended, the source name and aliases become target aliases,
    /// and the target is verified if either side was.
    pub fn merge_persons(&mut self, target_id: &str, source_id: &str) -> Result<Person, DatabaseError> {
        if target_id == source_id {
            return Err(DatabaseError::SelfMerge(target_id.to_string()));
        }
        if self.get_person(target_id).is_none() {
            return Err(DatabaseError::PersonNotFound(target_id.to_string()));
        }
        let source = self.delete_person(source_id)?;

        let target = self.person_mut(target_id)?;
        let mut aliases = std::mem::take(&mut target.aliases);
        aliases.push(source.name.clone());
        aliases.extend(source.aliases);
        target.aliases = dedup_aliases(aliases, &target.name);
        target.faces.extend(source.faces);
        target.verified |= source.verified;
        target.training_status = TrainingStatus::Pending;
        target.updated_at = Utc::now();

        tracing::info!(target_id, source_id, faces = target.faces.len(), "persons merged");
        Ok(target.clone())
    }

    pub fn delete_person(&mut self, id: &str) -> Result<Person, DatabaseError> {
        let idx = self
            .persons
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| DatabaseError::PersonNotFound(id.to_string()))?;
        let person = self.persons.remove(idx);
        tracing::info!(person_id = id, name = %person.name, "person deleted");
        Ok(person)
    }

    /// Match every detected face against the known persons.
    pub fn recognize(
        &self,
        detection: FaceDetectionResult,
        min_confidence: f32,
        matcher: &dyn PersonMatcher,
    ) -> RecognitionResult {
        let faces: Vec<RecognizedFace> = detection
            .faces
            .into_iter()
            .map(|face| {
                let m = matcher.best_match(&face.features, &self.persons, min_confidence);
                RecognizedFace {
                    face,
                    person_id: m.person_id,
                    person_name: m.person_name,
                    confidence: m.confidence,
                }
            })
            .collect();
        let recognized = faces.iter().filter(|f| f.person_id.is_some()).count();

        tracing::debug!(
            image_id = %detection.image_id,
            faces = faces.len(),
            recognized,
            "recognition complete"
        );

        RecognitionResult {
            image_id: detection.image_id,
            api_provider: detection.api_provider,
            processing_time_ms: detection.processing_time_ms,
            faces,
            recognized,
        }
    }

    /// Move a person into `training`.
    pub fn start_training(&mut self, id: &str) -> Result<(), DatabaseError> {
        let person = self.person_mut(id)?;
        if person.faces.is_empty() {
            return Err(DatabaseError::NoFaces(id.to_string()));
        }
        if person.training_status == TrainingStatus::Training {
            return Err(DatabaseError::AlreadyTraining(id.to_string()));
        }
        person.training_status = TrainingStatus::Training;
        person.updated_at = Utc::now();
        tracing::info!(person_id = id, faces = person.faces.len(), "training started");
        Ok(())
    }

    /// Finish a training run. Fails if the person left `training` meanwhile
    /// (e.g. a face was added), so stale completions are dropped.
    pub fn complete_training(&mut self, id: &str, accuracy: f32) -> Result<(), DatabaseError> {
        let person = self.training_person_mut(id)?;
        person.training_status = TrainingStatus::Completed;
        person.accuracy = Some(accuracy.clamp(0.0, 1.0));
        person.updated_at = Utc::now();
        tracing::info!(person_id = id, accuracy, "training completed");
        Ok(())
    }

    pub fn fail_training(&mut self, id: &str) -> Result<(), DatabaseError> {
        let person = self.training_person_mut(id)?;
        person.training_status = TrainingStatus::Failed;
        person.updated_at = Utc::now();
        tracing::warn!(person_id = id, "training failed");
        Ok(())
    }

    pub fn stats(&self) -> DatabaseStats {
        let mut stats = DatabaseStats {
            persons: self.persons.len(),
            ..DatabaseStats::default()
        };
        for p in &self.persons {
            stats.faces += p.faces.len();
            if p.verified {
                stats.verified += 1;
            }
            match p.training_status {
                TrainingStatus::Pending => stats.pending += 1,
                TrainingStatus::Training => stats.training += 1,
                TrainingStatus::Completed => stats.completed += 1,
                TrainingStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    fn person_mut(&mut self, id: &str) -> Result<&mut Person, DatabaseError> {
        self.persons
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| DatabaseError::PersonNotFound(id.to_string()))
    }

    fn training_person_mut(&mut self, id: &str) -> Result<&mut Person, DatabaseError> {
        let person = self.person_mut(id)?;
        if person.training_status != TrainingStatus::Training {
            return Err(DatabaseError::NotTraining(id.to_string()));
        }
        Ok(person)
    }
}

/// Trim, drop empties and duplicates (case-insensitive), and drop the name itself.
fn dedup_aliases(aliases: Vec<String>, name: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(aliases.len());
    for alias in aliases {
        let alias = alias.trim();
        if alias.is_empty()
            || alias.eq_ignore_ascii_case(name)
            || out.iter().any(|a| a.eq_ignore_ascii_case(alias))
        {
            continue;
        }
        out.push(alias.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DetectionRequest, FaceDetector};
    use crate::matcher::BlendedMatcher;
    use crate::providers::lookup_provider;

    fn detect(image: &str) -> FaceDetectionResult {
        let request = DetectionRequest::new(format!("https://img.example/{image}.jpg"))
            .with_image_id(image);
        FaceDetector::new(0.0)
            .detect(&request, lookup_provider("local").unwrap())
            .unwrap()
    }

    fn db_with(names: &[&str]) -> (FaceDatabase, Vec<String>) {
        let mut db = FaceDatabase::new();
        let ids = names
            .iter()
            .map(|n| db.add_person(NewPerson::new(*n, PersonCategory::Model)).unwrap().id)
            .collect();
        (db, ids)
    }

    #[test]
    fn test_add_person_defaults() {
        let (db, ids) = db_with(&["Ada"]);
        let p = db.get_person(&ids[0]).unwrap();
        assert_eq!(p.training_status, TrainingStatus::Pending);
        assert!(p.faces.is_empty());
        assert!(p.accuracy.is_none());
        assert!(!p.verified);
    }

    #[test]
    fn test_add_person_rejects_blank_name() {
        let mut db = FaceDatabase::new();
        let err = db.add_person(NewPerson::new("   ", PersonCategory::Other)).unwrap_err();
        assert_eq!(err, DatabaseError::EmptyName);
    }

    #[test]
    fn test_search_matches_name_and_alias() {
        let mut db = FaceDatabase::new();
        let mut new = NewPerson::new("Sofia Marquez", PersonCategory::Celebrity);
        new.aliases = vec!["Sofi".into()];
        db.add_person(new).unwrap();
        db.add_person(NewPerson::new("Lucas Bennett", PersonCategory::Photographer)).unwrap();

        assert_eq!(db.search_persons("marq").len(), 1);
        assert_eq!(db.search_persons("SOFI").len(), 1);
        assert_eq!(db.search_persons("e").len(), 2);
        assert!(db.search_persons("zzz").is_empty());
        assert_eq!(db.persons_by_category(PersonCategory::Photographer).len(), 1);
    }

    #[test]
    fn test_update_person() {
        let (mut db, ids) = db_with(&["Ada"]);
        let updated = db
            .update_person(
                &ids[0],
                PersonUpdate {
                    name: Some("Ada Lovelace".into()),
                    aliases: Some(vec!["Ada".into(), "ada".into(), " ".into()]),
                    verified: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Ada Lovelace");
        assert_eq!(updated.aliases, vec!["Ada"]);
        assert!(updated.verified);

        assert_eq!(
            db.update_person("missing", PersonUpdate::default()).unwrap_err(),
            DatabaseError::PersonNotFound("missing".into())
        );
    }

    #[test]
    fn test_confirmed_face_is_recognized() {
        let (mut db, ids) = db_with(&["Ada", "Grace"]);
        let first = detect("portrait");
        db.add_face(&ids[0], first.faces[0].clone()).unwrap();

        // Re-detecting the same image yields the same embedding.
        let result = db.recognize(detect("portrait"), 70.0, &BlendedMatcher::new(0.0));
        let face = &result.faces[0];
        assert_eq!(face.person_id.as_deref(), Some(ids[0].as_str()));
        assert_eq!(face.person_name.as_deref(), Some("Ada"));
        assert!((face.confidence - 0.8).abs() < 1e-4);
        assert!(result.recognized >= 1);
    }

    #[test]
    fn test_recognize_without_faces_matches_nobody() {
        let (db, _) = db_with(&["Ada"]);
        let result = db.recognize(detect("crowd"), 0.0, &BlendedMatcher::new(0.0));
        assert_eq!(result.recognized, 0);
        assert!(result.faces.iter().all(|f| f.person_id.is_none() && f.person_name.is_none()));
    }

    #[test]
    fn test_merge_persons() {
        let (mut db, ids) = db_with(&["Ada", "A. Lovelace"]);
        let faces = detect("merge").faces;
        db.add_face(&ids[0], faces[0].clone()).unwrap();
        db.add_face(&ids[1], faces[0].clone()).unwrap();
        db.update_person(&ids[1], PersonUpdate { verified: Some(true), ..Default::default() })
            .unwrap();

        let merged = db.merge_persons(&ids[0], &ids[1]).unwrap();
        assert_eq!(merged.faces.len(), 2);
        assert_eq!(merged.aliases, vec!["A. Lovelace"]);
        assert!(merged.verified);
        assert_eq!(merged.training_status, TrainingStatus::Pending);
        assert!(db.get_person(&ids[1]).is_none());
        assert_eq!(db.stats().persons, 1);
    }

    #[test]
    fn test_merge_errors() {
        let (mut db, ids) = db_with(&["Ada"]);
        assert_eq!(
            db.merge_persons(&ids[0], &ids[0]).unwrap_err(),
            DatabaseError::SelfMerge(ids[0].clone())
        );
        assert!(matches!(
            db.merge_persons("nope", &ids[0]),
            Err(DatabaseError::PersonNotFound(_))
        ));
        // A failed merge must not delete the source.
        assert!(db.get_person(&ids[0]).is_some());
    }

    #[test]
    fn test_remove_face() {
        let (mut db, ids) = db_with(&["Ada"]);
        let face = detect("remove").faces[0].clone();
        let face_id = face.id.clone();
        db.add_face(&ids[0], face).unwrap();

        assert_eq!(db.remove_face(&ids[0], &face_id).unwrap().id, face_id);
        assert!(matches!(
            db.remove_face(&ids[0], &face_id),
            Err(DatabaseError::FaceNotFound { .. })
        ));
    }

    #[test]
    fn test_training_transitions() {
        let (mut db, ids) = db_with(&["Ada"]);
        let id = &ids[0];

        assert_eq!(db.start_training(id).unwrap_err(), DatabaseError::NoFaces(id.clone()));

        db.add_face(id, detect("train").faces[0].clone()).unwrap();
        db.start_training(id).unwrap();
        assert_eq!(db.start_training(id).unwrap_err(), DatabaseError::AlreadyTraining(id.clone()));
        assert_eq!(db.stats().training, 1);

        db.complete_training(id, 0.93).unwrap();
        let p = db.get_person(id).unwrap();
        assert_eq!(p.training_status, TrainingStatus::Completed);
        assert_eq!(p.accuracy, Some(0.93));

        assert_eq!(db.complete_training(id, 0.9).unwrap_err(), DatabaseError::NotTraining(id.clone()));
    }

    #[test]
    fn test_stale_training_completion_is_rejected() {
        let (mut db, ids) = db_with(&["Ada"]);
        let id = &ids[0];
        let faces = detect("stale").faces;
        db.add_face(id, faces[0].clone()).unwrap();
        db.start_training(id).unwrap();

        // New face arrives mid-training.
        db.add_face(id, faces[0].clone()).unwrap();
        assert!(db.complete_training(id, 0.9).is_err());
        assert_eq!(db.get_person(id).unwrap().training_status, TrainingStatus::Pending);
    }

    #[test]
    fn test_fail_training() {
        let (mut db, ids) = db_with(&["Ada"]);
        db.add_face(&ids[0], detect("fail").faces[0].clone()).unwrap();
        db.start_training(&ids[0]).unwrap();
        db.fail_training(&ids[0]).unwrap();
        assert_eq!(db.stats().failed, 1);
    }
}
