use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::core::{InputParameters, YearOverrides};

pub const DEFAULT_FILE_NAME: &str = "simulation-data.json";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to parse saved state: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to encode saved state: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PersistenceError {
    pub fn is_parse_error(&self) -> bool {
        matches!(self, PersistenceError::Parse(_))
    }
}

/// Everything needed to rebuild a projection: base parameters plus the
/// sparse per-year overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedState {
    pub input_params: InputParameters,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub yearly_inputs: YearOverrides,
}

impl SavedState {
    pub fn from_json(json: &str) -> Result<Self, PersistenceError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, PersistenceError> {
        serde_json::to_string_pretty(self).map_err(PersistenceError::Encode)
    }

    /// Reads a saved state. On any failure nothing is returned, so callers
    /// holding a previous state keep it untouched.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| PersistenceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let state = Self::from_json(&json)?;
        log::info!(
            "loaded {} with {} override year(s)",
            path.display(),
            state.yearly_inputs.len()
        );
        Ok(state)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        fs::write(path, json).map_err(|source| PersistenceError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("saved state to {}", path.display());
        Ok(())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<YearOverrides, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<YearOverrides>::deserialize(deserializer)?.unwrap_or_default())
}
