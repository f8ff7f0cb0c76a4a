use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Session,
    System,
}

/// Daemon configuration.
///
/// Values come from `FACETAG_*` environment variables, falling back to the
/// optional TOML file named by `FACETAG_CONFIG`, then to built-in defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `user_downloads.json`.
    pub data_dir: PathBuf,
    /// Provider used when a request names none.
    pub default_provider: String,
    /// Minimum recognition confidence, as a percentage.
    pub min_confidence: f32,
    /// Simulated duration of a training run.
    pub training_delay_ms: u64,
    /// Multiplier on each provider's simulated latency (0 = no sleep).
    pub latency_scale: f32,
    /// Load the demo persons at startup.
    pub seed_demo_data: bool,
    /// Seed for the engine RNG; random when unset.
    pub rng_seed: Option<u64>,
    pub bus: BusKind,
}

/// Optional TOML overlay; every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub default_provider: Option<String>,
    pub min_confidence: Option<f32>,
    pub training_delay_ms: Option<u64>,
    pub latency_scale: Option<f32>,
    pub seed_demo_data: Option<bool>,
    pub rng_seed: Option<u64>,
    pub bus: Option<BusKind>,
}

impl FileConfig {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

impl Config {
    /// Load the TOML overlay (if `FACETAG_CONFIG` is set) and the environment.
    pub fn load() -> anyhow::Result<Self> {
        let file = match std::env::var("FACETAG_CONFIG") {
            Ok(path) => {
                tracing::info!(path = %path, "reading config file");
                FileConfig::read(Path::new(&path))?
            }
            Err(_) => FileConfig::default(),
        };
        Ok(Self::from_env(file))
    }

    /// Resolve every setting from the environment, then `file`, then defaults.
    pub fn from_env(file: FileConfig) -> Self {
        let default_data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facetag");

        let data_dir = std::env::var("FACETAG_DATA_DIR")
            .map(PathBuf::from)
            .ok()
            .or(file.data_dir)
            .unwrap_or(default_data_dir);

        let bus = match std::env::var("FACETAG_BUS").as_deref() {
            Ok("system") => BusKind::System,
            Ok("session") => BusKind::Session,
            _ => file.bus.unwrap_or(BusKind::Session),
        };

        Self {
            data_dir,
            default_provider: std::env::var("FACETAG_DEFAULT_PROVIDER")
                .ok()
                .or(file.default_provider)
                .unwrap_or_else(|| facetag_core::providers::DEFAULT_PROVIDER.to_string()),
            min_confidence: env_parse("FACETAG_MIN_CONFIDENCE")
                .or(file.min_confidence)
                .unwrap_or(70.0)
                .clamp(0.0, 100.0),
            training_delay_ms: env_parse("FACETAG_TRAINING_DELAY_MS")
                .or(file.training_delay_ms)
                .unwrap_or(3000),
            latency_scale: env_parse("FACETAG_LATENCY_SCALE")
                .or(file.latency_scale)
                .unwrap_or(1.0),
            seed_demo_data: std::env::var("FACETAG_SEED_DEMO_DATA")
                .ok()
                .map(|v| v != "0")
                .or(file.seed_demo_data)
                .unwrap_or(true),
            rng_seed: env_parse("FACETAG_RNG_SEED").or(file.rng_seed),
            bus,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
