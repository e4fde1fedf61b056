//! Player configuration.
//!
//! Everything here ends up in the register file on reset, except `strict`,
//! which picks the IFO strictness policy, and `random_seed`.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ifo::{Lenient, Strict, StrictnessPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field} must be a two letter code, got {value:?}")]
    BadCode { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Fail on the first IFO anomaly instead of logging it.
    pub strict: bool,
    /// ISO 639 code used to pick the menu language unit.
    pub menu_language: String,
    pub audio_language: String,
    pub spu_language: String,
    /// ISO 3166 code for parental management.
    pub country_code: String,
    /// 1..=8, 15 disables parental control.
    pub parental_level: u16,
    /// Player region mask (SPRM 20).
    pub region_mask: u16,
    /// Seed for the `Set RND` operator. `None` seeds from the OS.
    pub random_seed: Option<u64>,
    /// Prefer pan&scan over letterbox on 4:3 output.
    pub pan_scan: bool,
    /// Run the PCI/DSI diagnostic checks on every NAV packet.
    pub check_nav_packets: bool,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            strict: cfg!(feature = "strict"),
            menu_language: "en".to_string(),
            audio_language: "en".to_string(),
            spu_language: "en".to_string(),
            country_code: "US".to_string(),
            parental_level: 15,
            region_mask: 0x01,
            random_seed: None,
            pan_scan: true,
            check_nav_packets: cfg!(debug_assertions),
        }
    }
}

impl NavConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("menu_language", &self.menu_language),
            ("audio_language", &self.audio_language),
            ("spu_language", &self.spu_language),
            ("country_code", &self.country_code),
        ] {
            if value.len() != 2 || !value.is_ascii() {
                return Err(ConfigError::BadCode {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> Arc<dyn StrictnessPolicy> {
        if self.strict {
            Arc::new(Strict)
        } else {
            Arc::new(Lenient)
        }
    }
}
