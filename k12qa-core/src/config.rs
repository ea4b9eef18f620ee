//! Pipeline configuration file.
//!
//! A single JSON document with optional `input`, `quality`, and `metrics`
//! sections. Missing sections and fields take their defaults.
//!
//! ```json
//! {
//!   "input": {
//!     "default_school_year": 2025,
//!     "column_mappings": { "educators": { "EDUC_ID": "educator_id" } }
//!   },
//!   "quality": { "staffing_ratio": { "min": 10, "max": 25 } },
//!   "metrics": { "terms": ["fall", "spring"] }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::decode::InputConfig;
use crate::error::{K12QaError, Result};
use crate::metrics::MetricConfig;
use crate::quality::QaConfig;

/// Configuration for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Input decoding options
    pub input: InputConfig,
    /// Quality rule configuration
    pub quality: QaConfig,
    /// KPI configuration
    pub metrics: MetricConfig,
}

impl PipelineConfig {
    /// Reads and validates a configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| K12QaError::io(format!("Failed to read config {}", path.display()), e))?;
        let config = Self::from_json(&text).map_err(|e| match e {
            K12QaError::Serialization { source, .. } => K12QaError::serialization(
                format!("Failed to parse config {}", path.display()),
                source,
            ),
            other => other,
        })?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a configuration document.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| K12QaError::serialization("Failed to parse config", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.quality.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}
