//! `arborsync-config` — explicit run configuration.
//!
//! Everything the pipeline needs to know about its input and its two
//! inventories comes in through [`SyncConfig`], loaded from a TOML file.
//! Nothing is read from ambient process state except the API token
//! override, so unit tests can construct arbitrary configurations.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable that overrides `[remote] token`, so the secret can
/// stay out of the config file.
pub const TOKEN_ENV: &str = "ARBORSYNC_API_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Read(String),

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("config validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Actor recorded on audit batches.
    #[serde(default = "default_actor")]
    pub imported_by: String,

    #[serde(default)]
    pub columns: ColumnLayout,

    pub geo: GeoConfig,

    #[serde(default)]
    pub recon: ReconOptions,

    pub store: StoreConfig,

    pub remote: RemoteConfig,
}

fn default_actor() -> String {
    "csv-import".into()
}

// ---------------------------------------------------------------------------
// Column layout
// ---------------------------------------------------------------------------

/// Expected CSV column names, in file order. The header row must match
/// `expected_headers()` exactly: same count, names, and order.
///
/// Defaults are the layout of the municipal export the importer was built
/// for; Hochwert/Rechtswert are the planar northing/easting pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColumnLayout {
    pub area: String,
    pub street: String,
    pub number: String,
    pub species: String,
    pub northing: String,
    pub easting: String,
    pub planting_year: String,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            area: "Gebiet".into(),
            street: "Strasse".into(),
            number: "Baumnummer".into(),
            species: "Gattung".into(),
            northing: "Hochwert".into(),
            easting: "Rechtswert".into(),
            planting_year: "Pflanzjahr".into(),
        }
    }
}

impl ColumnLayout {
    /// Header row this layout requires, in order.
    pub fn expected_headers(&self) -> [&str; 7] {
        [
            &self.area,
            &self.street,
            &self.number,
            &self.species,
            &self.northing,
            &self.easting,
            &self.planting_year,
        ]
    }
}

// ---------------------------------------------------------------------------
// Reference systems
// ---------------------------------------------------------------------------

/// EPSG code of the canonical geographic system (WGS84).
pub const WGS84: u32 = 4326;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GeoConfig {
    /// Reference system of the raw coordinate pairs in the input file.
    pub source_epsg: u32,

    /// Canonical system records are stored in.
    #[serde(default = "default_target_epsg")]
    pub target_epsg: u32,
}

fn default_target_epsg() -> u32 {
    WGS84
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct ReconOptions {
    /// Decimal places coordinates are rounded to before comparison.
    /// Absent = exact floating-point equality (the historical behavior).
    pub match_precision: Option<u8>,
}

// ---------------------------------------------------------------------------
// Store + remote endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the inventory API, without a trailing slash.
    pub api_base: String,

    /// Bearer token. Usually left empty in the file and supplied through
    /// the `ARBORSYNC_API_TOKEN` environment variable.
    #[serde(default)]
    pub token: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl SyncConfig {
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let mut config: SyncConfig =
            toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Read a config file and apply the token environment override.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml(&contents)?;
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.is_empty() {
                config.remote.token = token;
            }
        }
        Ok(config)
    }

    fn normalize(&mut self) {
        while self.remote.api_base.ends_with('/') {
            self.remote.api_base.pop();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.geo.source_epsg == 0 {
            return Err(ConfigError::Validation("geo.source_epsg must be set".into()));
        }
        if self.geo.target_epsg == 0 {
            return Err(ConfigError::Validation("geo.target_epsg must be set".into()));
        }
        if self.remote.api_base.is_empty() {
            return Err(ConfigError::Validation("remote.api_base must be set".into()));
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation("store.path must be set".into()));
        }
        let headers = self.columns.expected_headers();
        for (i, a) in headers.iter().enumerate() {
            if a.is_empty() {
                return Err(ConfigError::Validation("column names must be non-empty".into()));
            }
            if headers[i + 1..].contains(a) {
                return Err(ConfigError::Validation(format!("duplicate column name '{a}'")));
            }
        }
        Ok(())
    }
}
