//! Matching keys
//!
//! The exact key identifies a vehicle by its printed name only. The composite
//! key replaces the free-text variant with its base form plus structured
//! powertrain specs, so `"Active 72 HK Automatik"` and `"Active"` (72 hp,
//! automatic) land on the same key.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Drivetrain, Transmission, VehicleRecord};

fn horsepower_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(\d{2,4})\s*(hk|hp|ps)\b").expect("valid regex"))
}

/// Trim, lowercase, collapse internal whitespace
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Powertrain specs of a record, plus its variant with spec tokens removed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariantSpecs {
    pub base_variant: String,
    pub horsepower: Option<i64>,
    pub transmission: Transmission,
    pub drivetrain: Drivetrain,
}

/// Pull horsepower/transmission/drivetrain tokens out of a variant string
pub fn parse_variant(variant: &str) -> VariantSpecs {
    let normalized = normalize_text(variant);
    let mut specs = VariantSpecs::default();

    if let Some(caps) = horsepower_regex().captures(&normalized) {
        specs.horsepower = caps.get(1).and_then(|m| m.as_str().parse().ok());
    }
    let without_hp = horsepower_regex().replace_all(&normalized, " ");

    let mut base = Vec::new();
    for word in without_hp.split_whitespace() {
        let token = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
        if token.is_empty() {
            continue;
        }
        let transmission = Transmission::from_token(token);
        let drivetrain = Drivetrain::from_token(token);
        if transmission.is_known() {
            specs.transmission = transmission;
        } else if drivetrain.is_known() {
            specs.drivetrain = drivetrain;
        } else {
            base.push(token);
        }
    }
    specs.base_variant = base.join(" ");
    specs
}

/// Specs used for keys and diffs: structured fields win over variant tokens
pub fn effective_specs(record: &VehicleRecord) -> VariantSpecs {
    let parsed = parse_variant(&record.variant);
    VariantSpecs {
        horsepower: record.horsepower.or(parsed.horsepower),
        transmission: record
            .transmission
            .filter(Transmission::is_known)
            .unwrap_or(parsed.transmission),
        drivetrain: record
            .drivetrain
            .filter(Drivetrain::is_known)
            .unwrap_or(parsed.drivetrain),
        base_variant: parsed.base_variant,
    }
}

/// Round to the nearest multiple of 5, saturating at the `i64` bounds.
///
/// Nearby figures share a bucket: 71 hp and 72 hp both key as `hp:70`.
pub fn round_horsepower(hp: i64) -> i64 {
    hp.saturating_add(2).div_euclid(5).saturating_mul(5)
}

/// `make|model|variant`, normalized
pub fn exact_key(record: &VehicleRecord) -> String {
    format!(
        "{}|{}|{}",
        normalize_text(&record.make),
        normalize_text(&record.model),
        normalize_text(&record.variant)
    )
}

/// `make|model|base_variant|hp:N|tx:T|dt:D`
pub fn composite_key(record: &VehicleRecord) -> String {
    let specs = effective_specs(record);
    let hp = specs
        .horsepower
        .map(|hp| round_horsepower(hp).to_string())
        .unwrap_or_else(|| "?".to_string());
    format!(
        "{}|{}|{}|hp:{}|tx:{}|dt:{}",
        normalize_text(&record.make),
        normalize_text(&record.model),
        specs.base_variant,
        hp,
        specs.transmission,
        specs.drivetrain
    )
}
