//! Field-by-field comparison of a matched pair
//!
//! A field the extraction did not provide carries no information and never
//! produces a change. Offers are the exception: a missing collection on
//! either side is always a change.

use serde_json::{json, Value};

use crate::models::{FieldChange, FieldChanges, VehicleRecord};
use crate::reconcile::keys::{effective_specs, normalize_text};
use crate::reconcile::offers::{canonical_offers, offers_equal};

/// Tolerance for fuel consumption figures (l/100km)
const CONSUMPTION_EPSILON: f64 = 0.05;

pub const FIELD_VARIANT: &str = "variant";
pub const FIELD_YEAR: &str = "year";
pub const FIELD_HORSEPOWER: &str = "horsepower";
pub const FIELD_TRANSMISSION: &str = "transmission";
pub const FIELD_DRIVETRAIN: &str = "drivetrain";
pub const FIELD_FUEL_TYPE: &str = "fuel_type";
pub const FIELD_BODY_TYPE: &str = "body_type";
pub const FIELD_CO2_EMISSION: &str = "co2_emission";
pub const FIELD_WLTP_RANGE: &str = "wltp_range";
pub const FIELD_CONSUMPTION: &str = "consumption_l_100km";
pub const FIELD_OFFERS: &str = "offers";

/// Changes needed to turn `existing` into `extracted`; empty means unchanged
pub fn diff_records(existing: &VehicleRecord, extracted: &VehicleRecord) -> FieldChanges {
    let mut changes = FieldChanges::new();
    let mut record = |field: &str, old: Value, new: Value| {
        changes.insert(field.to_string(), FieldChange { old, new });
    };

    let ext_specs = effective_specs(extracted);
    let inv_specs = effective_specs(existing);

    if !extracted.variant.trim().is_empty() && ext_specs.base_variant != inv_specs.base_variant {
        record(
            FIELD_VARIANT,
            json!(existing.variant),
            json!(extracted.variant.trim()),
        );
    }

    if let Some(year) = extracted.year {
        if existing.year != Some(year) {
            record(FIELD_YEAR, json!(existing.year), json!(year));
        }
    }

    if let Some(hp) = ext_specs.horsepower {
        if inv_specs.horsepower != Some(hp) {
            record(FIELD_HORSEPOWER, json!(inv_specs.horsepower), json!(hp));
        }
    }

    if ext_specs.transmission.is_known() && ext_specs.transmission != inv_specs.transmission {
        record(
            FIELD_TRANSMISSION,
            known_or_null(inv_specs.transmission.is_known(), inv_specs.transmission.as_str()),
            json!(ext_specs.transmission.as_str()),
        );
    }

    if ext_specs.drivetrain.is_known() && ext_specs.drivetrain != inv_specs.drivetrain {
        record(
            FIELD_DRIVETRAIN,
            known_or_null(inv_specs.drivetrain.is_known(), inv_specs.drivetrain.as_str()),
            json!(ext_specs.drivetrain.as_str()),
        );
    }

    for (field, old, new) in [
        (FIELD_FUEL_TYPE, &existing.fuel_type, &extracted.fuel_type),
        (FIELD_BODY_TYPE, &existing.body_type, &extracted.body_type),
    ] {
        if let Some(new) = new.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let same = old
                .as_deref()
                .is_some_and(|old| normalize_text(old) == normalize_text(new));
            if !same {
                record(field, json!(old), json!(new));
            }
        }
    }

    for (field, old, new) in [
        (FIELD_CO2_EMISSION, existing.co2_emission, extracted.co2_emission),
        (FIELD_WLTP_RANGE, existing.wltp_range, extracted.wltp_range),
    ] {
        if let Some(new) = new {
            if old != Some(new) {
                record(field, json!(old), json!(new));
            }
        }
    }

    if let Some(new) = extracted.consumption_l_100km.filter(|v| v.is_finite()) {
        let same = existing
            .consumption_l_100km
            .is_some_and(|old| (old - new).abs() < CONSUMPTION_EPSILON);
        if !same {
            record(FIELD_CONSUMPTION, json!(existing.consumption_l_100km), json!(new));
        }
    }

    if !offers_equal(existing.offers.as_deref(), extracted.offers.as_deref()) {
        record(
            FIELD_OFFERS,
            json!(existing.offers.as_deref().map(canonical_offers)),
            json!(extracted.offers.as_deref().map(canonical_offers)),
        );
    }

    changes
}

fn known_or_null(known: bool, value: &str) -> Value {
    if known {
        json!(value)
    } else {
        Value::Null
    }
}
