//! Detection provider profiles.
//!
//! Each simulated provider is described by a TOML profile embedded at compile
//! time from `contrib/providers/*.toml`. Profiles carry the provider's
//! similarity bonus, embedding size, latency and confidence range.

use serde::Deserialize;
use std::sync::OnceLock;
use thiserror::Error;

const PROFILE_LOCAL: &str = include_str!("../../../contrib/providers/local.toml");
const PROFILE_AWS: &str = include_str!("../../../contrib/providers/aws.toml");
const PROFILE_AZURE: &str = include_str!("../../../contrib/providers/azure.toml");
const PROFILE_GOOGLE: &str = include_str!("../../../contrib/providers/google.toml");

/// Provider used when a caller does not name one.
pub const DEFAULT_PROVIDER: &str = "local";

static PROVIDER_DB: OnceLock<Vec<ProviderProfile>> = OnceLock::new();

#[derive(Error, Debug, PartialEq)]
pub enum ProviderError {
    #[error("unknown detection provider: {0}")]
    Unknown(String),
}

/// Top-level profile file structure (one per `contrib/providers/*.toml`).
#[derive(Debug, Clone, Deserialize)]
struct ProfileFile {
    provider: ProviderProfile,
}

/// Parameters of one simulated detection provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderProfile {
    pub name: String,
    /// Added to every rescaled cosine similarity before clamping.
    pub similarity_bonus: f32,
    pub embedding_dim: usize,
    /// Simulated network latency per detection call.
    pub latency_ms: u64,
    pub min_confidence: f32,
    pub max_confidence: f32,
    pub max_faces: usize,
}

fn provider_db() -> &'static Vec<ProviderProfile> {
    PROVIDER_DB.get_or_init(|| {
        let mut db = Vec::new();
        for src in [PROFILE_LOCAL, PROFILE_AWS, PROFILE_AZURE, PROFILE_GOOGLE] {
            match toml::from_str::<ProfileFile>(src) {
                Ok(p) => db.push(p.provider),
                Err(e) => tracing::error!(error = %e, "bad provider profile TOML"),
            }
        }
        db
    })
}

/// Look up a provider profile by name (case-insensitive).
/// An empty name selects [`DEFAULT_PROVIDER`].
pub fn lookup_provider(name: &str) -> Result<&'static ProviderProfile, ProviderError> {
    let name = if name.is_empty() { DEFAULT_PROVIDER } else { name };
    provider_db()
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| ProviderError::Unknown(name.to_string()))
}

/// List all known provider profiles.
pub fn list_providers() -> &'static [ProviderProfile] {
    provider_db()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_profiles_parse() {
        let names: Vec<&str> = list_providers().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["local", "aws", "azure", "google"]);
    }

    #[test]
    fn test_profiles_are_sane() {
        for p in list_providers() {
            assert!(p.embedding_dim > 0, "{}", p.name);
            assert!(p.max_faces >= 1, "{}", p.name);
            assert!(p.min_confidence <= p.max_confidence, "{}", p.name);
            assert!((0.0..=1.0).contains(&p.max_confidence), "{}", p.name);
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup_provider("AWS").unwrap().similarity_bonus, 0.03);
        assert_eq!(lookup_provider("").unwrap().name, DEFAULT_PROVIDER);
        assert_eq!(
            lookup_provider("clearview"),
            Err(ProviderError::Unknown("clearview".into()))
        );
    }
}
