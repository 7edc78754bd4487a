//! Reconciliation tuning
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, or the override in the data dir
//!    (~/.local/share/leasesync/config/reconcile.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Keys missing from an override keep their default values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/reconcile.toml");

/// What a known transmission/drivetrain difference means for algorithmic matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowertrainPolicy {
    /// Still matchable; the difference shows up as a field update
    #[default]
    Merge,
    /// Never matched; yields a create plus a delete
    Separate,
}

impl PowertrainPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Separate => "separate",
        }
    }
}

impl std::str::FromStr for PowertrainPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "separate" => Ok(Self::Separate),
            _ => Err(format!("Unknown powertrain policy: {}", s)),
        }
    }
}

/// Relative weight of each similarity factor; always sums to 1.0 after `normalized`
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub model: f64,
    pub price: f64,
    pub horsepower: f64,
    pub transmission: f64,
    pub fuel_type: f64,
    pub body_type: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            model: 0.30,
            price: 0.20,
            horsepower: 0.20,
            transmission: 0.10,
            fuel_type: 0.10,
            body_type: 0.10,
        }
    }
}

impl ScoringWeights {
    fn sum(&self) -> f64 {
        self.model
            + self.price
            + self.horsepower
            + self.transmission
            + self.fuel_type
            + self.body_type
    }

    /// Scale so the weights sum to 1.0
    pub fn normalized(self) -> Result<Self> {
        let all = [
            self.model,
            self.price,
            self.horsepower,
            self.transmission,
            self.fuel_type,
            self.body_type,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config("Scoring weights must be non-negative".into()));
        }
        let sum = self.sum();
        if sum <= 0.0 {
            return Err(Error::Config("Scoring weights sum to zero".into()));
        }
        Ok(Self {
            model: self.model / sum,
            price: self.price / sum,
            horsepower: self.horsepower / sum,
            transmission: self.transmission / sum,
            fuel_type: self.fuel_type / sum,
            body_type: self.body_type / sum,
        })
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Minimum score for an algorithmic match
    pub min_confidence: f64,
    /// Confidence reported for composite-key matches
    pub composite_confidence: f64,
    pub powertrain_policy: PowertrainPolicy,
    pub weights: ScoringWeights,
    /// Relative price difference at or below which price scores 1.0
    pub price_full_score_ratio: f64,
    /// Relative price difference at or above which price scores 0.0
    pub price_zero_score_ratio: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.80,
            composite_confidence: 0.95,
            powertrain_policy: PowertrainPolicy::Merge,
            weights: ScoringWeights::default(),
            price_full_score_ratio: 0.05,
            price_zero_score_ratio: 0.30,
        }
    }
}

impl ReconcileConfig {
    /// Load from the default override location, else the embedded defaults
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit file
    pub fn from_path(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("leasesync").join("config").join("reconcile.toml"))
}

fn load_config(explicit: Option<&Path>) -> Result<ReconcileConfig> {
    let content = match explicit {
        // An explicit path must exist
        Some(path) => fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?,
        None => match default_config_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading reconcile config override from {}", path.display());
                fs::read_to_string(&path)
                    .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
            }
            _ => DEFAULT_CONFIG.to_string(),
        },
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    matching: Option<RawMatching>,
    weights: Option<RawWeights>,
    price: Option<RawPrice>,
}

#[derive(Debug, Deserialize)]
struct RawMatching {
    min_confidence: Option<f64>,
    composite_confidence: Option<f64>,
    powertrain_policy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWeights {
    model: Option<f64>,
    price: Option<f64>,
    horsepower: Option<f64>,
    transmission: Option<f64>,
    fuel_type: Option<f64>,
    body_type: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    full_score_ratio: Option<f64>,
    zero_score_ratio: Option<f64>,
}

fn unit_interval(name: &str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::Config(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )))
    }
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<ReconcileConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = ReconcileConfig::default();

    if let Some(matching) = raw.matching {
        if let Some(v) = matching.min_confidence {
            config.min_confidence = unit_interval("min_confidence", v)?;
        }
        if let Some(v) = matching.composite_confidence {
            config.composite_confidence = unit_interval("composite_confidence", v)?;
        }
        if let Some(policy) = matching.powertrain_policy {
            config.powertrain_policy = policy.parse().map_err(Error::Config)?;
        }
    }

    if let Some(weights) = raw.weights {
        let defaults = ScoringWeights::default();
        config.weights = ScoringWeights {
            model: weights.model.unwrap_or(defaults.model),
            price: weights.price.unwrap_or(defaults.price),
            horsepower: weights.horsepower.unwrap_or(defaults.horsepower),
            transmission: weights.transmission.unwrap_or(defaults.transmission),
            fuel_type: weights.fuel_type.unwrap_or(defaults.fuel_type),
            body_type: weights.body_type.unwrap_or(defaults.body_type),
        };
    }
    config.weights = config.weights.normalized()?;

    if let Some(price) = raw.price {
        if let Some(v) = price.full_score_ratio {
            config.price_full_score_ratio = v;
        }
        if let Some(v) = price.zero_score_ratio {
            config.price_zero_score_ratio = v;
        }
    }
    if config.price_full_score_ratio < 0.0
        || config.price_zero_score_ratio <= config.price_full_score_ratio
    {
        return Err(Error::Config(
            "price.zero_score_ratio must exceed price.full_score_ratio".into(),
        ));
    }

    Ok(config)
}
