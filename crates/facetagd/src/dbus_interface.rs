use crate::engine::{EngineError, EngineHandle};
use facetag_core::{DetectionRequest, DownloadRecord, NewPerson, PersonCategory, PersonUpdate};
use serde::Serialize;
use std::time::Duration;
use zbus::interface;

pub const BUS_NAME: &str = "io.facetag.FaceTag1";
pub const OBJECT_PATH: &str = "/io/facetag/FaceTag1";

/// D-Bus interface for the facetag daemon.
///
/// Bus name: io.facetag.FaceTag1
/// Object path: /io/facetag/FaceTag1
///
/// Structured results are returned as JSON strings.
pub struct FaceTagService {
    engine: EngineHandle,
    /// Used when a caller passes a negative `min_confidence`.
    min_confidence: f32,
    training_delay: Duration,
}

impl FaceTagService {
    pub fn new(engine: EngineHandle, min_confidence: f32, training_delay: Duration) -> Self {
        Self {
            engine,
            min_confidence,
            training_delay,
        }
    }
}

fn fdo_error(e: EngineError) -> zbus::fdo::Error {
    if e.is_invalid_input() {
        zbus::fdo::Error::InvalidArgs(e.to_string())
    } else {
        tracing::error!(error = %e, "request failed");
        zbus::fdo::Error::Failed(e.to_string())
    }
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(format!("serialize: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(what: &str, json: &str) -> zbus::fdo::Result<T> {
    serde_json::from_str(json).map_err(|e| zbus::fdo::Error::InvalidArgs(format!("{what}: {e}")))
}

/// Requests keyed by URL, so the same image always yields the same faces.
fn image_request(image_url: &str) -> DetectionRequest {
    DetectionRequest::new(image_url).with_image_id(image_url)
}

#[interface(name = "io.facetag.FaceTag1")]
impl FaceTagService {
    /// Detect faces in an image. An empty provider selects the default.
    async fn detect_faces(&self, image_url: &str, provider: &str) -> zbus::fdo::Result<String> {
        tracing::info!(image_url, provider, "detect_faces requested");
        let result = self
            .engine
            .detect(image_request(image_url), provider.to_string())
            .await
            .map_err(fdo_error)?;
        to_json(&result)
    }

    /// Detect faces and match them against known persons.
    /// `min_confidence` is a percentage in `0..=100`; negative selects the
    /// daemon default.
    async fn recognize(
        &self,
        image_url: &str,
        provider: &str,
        min_confidence: f64,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(image_url, provider, min_confidence, "recognize requested");
        if min_confidence.is_nan() || min_confidence > 100.0 {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "min_confidence must be within 0..=100, got {min_confidence}"
            )));
        }
        let min_confidence = if min_confidence < 0.0 {
            self.min_confidence
        } else {
            min_confidence as f32
        };
        let result = self
            .engine
            .recognize(image_request(image_url), provider.to_string(), min_confidence)
            .await
            .map_err(fdo_error)?;
        to_json(&result)
    }

    async fn add_person(&self, name: &str, category: &str) -> zbus::fdo::Result<String> {
        tracing::info!(name, category, "add_person requested");
        let category: PersonCategory = category.parse().map_err(zbus::fdo::Error::InvalidArgs)?;
        let person = self
            .engine
            .add_person(NewPerson::new(name, category))
            .await
            .map_err(fdo_error)?;
        to_json(&person)
    }

    /// Apply a JSON-encoded partial update (`name`, `aliases`, `category`, `verified`).
    async fn update_person(&self, id: &str, update_json: &str) -> zbus::fdo::Result<String> {
        tracing::info!(id, "update_person requested");
        let update: PersonUpdate = from_json("update", update_json)?;
        let person = self
            .engine
            .update_person(id.to_string(), update)
            .await
            .map_err(fdo_error)?;
        to_json(&person)
    }

    async fn get_person(&self, id: &str) -> zbus::fdo::Result<String> {
        let person = self.engine.get_person(id.to_string()).await.map_err(fdo_error)?;
        to_json(&person)
    }

    async fn list_persons(&self) -> zbus::fdo::Result<String> {
        let persons = self.engine.list_persons().await.map_err(fdo_error)?;
        to_json(&persons)
    }

    async fn search_persons(&self, query: &str) -> zbus::fdo::Result<String> {
        let persons = self
            .engine
            .search_persons(query.to_string())
            .await
            .map_err(fdo_error)?;
        to_json(&persons)
    }

    /// Attach face number `face_index` of an image to a person.
    async fn confirm_face(
        &self,
        person_id: &str,
        image_url: &str,
        provider: &str,
        face_index: u32,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(person_id, image_url, face_index, "confirm_face requested");
        let face = self
            .engine
            .confirm_face(
                person_id.to_string(),
                image_request(image_url),
                provider.to_string(),
                face_index as usize,
            )
            .await
            .map_err(fdo_error)?;
        to_json(&face)
    }

    async fn remove_face(&self, person_id: &str, face_id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(person_id, face_id, "remove_face requested");
        self.engine
            .remove_face(person_id.to_string(), face_id.to_string())
            .await
            .map_err(fdo_error)?;
        Ok(true)
    }

    async fn merge_persons(&self, target_id: &str, source_id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(target_id, source_id, "merge_persons requested");
        let person = self
            .engine
            .merge_persons(target_id.to_string(), source_id.to_string())
            .await
            .map_err(fdo_error)?;
        to_json(&person)
    }

    async fn delete_person(&self, id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(id, "delete_person requested");
        self.engine.delete_person(id.to_string()).await.map_err(fdo_error)?;
        Ok(true)
    }

    /// Start a simulated training run; returns once training has begun.
    async fn train(&self, id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(id, delay_ms = self.training_delay.as_millis() as u64, "train requested");
        self.engine
            .train(id.to_string(), self.training_delay)
            .await
            .map_err(fdo_error)?;
        Ok(true)
    }

    /// Append a JSON-encoded download record to the history.
    async fn record_download(&self, record_json: &str) -> zbus::fdo::Result<bool> {
        let record: DownloadRecord = from_json("download record", record_json)?;
        self.engine.record_download(record).await.map_err(fdo_error)?;
        Ok(true)
    }

    async fn list_downloads(&self, user_id: &str) -> zbus::fdo::Result<String> {
        let records = self
            .engine
            .list_downloads(user_id.to_string())
            .await
            .map_err(fdo_error)?;
        to_json(&records)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let stats = self.engine.stats().await.map_err(fdo_error)?;
        let providers: Vec<&str> = facetag_core::providers::list_providers()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "providers": providers,
            "min_confidence": self.min_confidence,
            "training_delay_ms": self.training_delay.as_millis() as u64,
            "database": stats,
        })
        .to_string())
    }
}
