//! Offer normalization and comparison
//!
//! Offers arrive from extraction either as positional tuples
//! `[monthly_price, first_payment, period_months, mileage_per_year]` or as
//! labeled objects with a handful of spellings. Both become [`Offer`].

use serde::Deserialize;
use serde_json::Value;

use crate::models::Offer;

/// Offer as it appears on the wire, before normalization
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawOffer {
    Positional(Vec<Value>),
    Labeled(LabeledOffer),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabeledOffer {
    #[serde(default, alias = "monthlyPrice", alias = "monthly", alias = "price")]
    monthly_price: Option<Value>,
    #[serde(
        default,
        alias = "firstPayment",
        alias = "upfront",
        alias = "down_payment",
        alias = "downPayment"
    )]
    first_payment: Option<Value>,
    #[serde(default, alias = "periodMonths", alias = "term", alias = "months")]
    period_months: Option<Value>,
    #[serde(
        default,
        alias = "mileagePerYear",
        alias = "mileage",
        alias = "km_per_year",
        alias = "kmPerYear"
    )]
    mileage_per_year: Option<Value>,
}

impl From<RawOffer> for Offer {
    fn from(raw: RawOffer) -> Self {
        match raw {
            RawOffer::Positional(values) => {
                let at = |i: usize| values.get(i).map(coerce_int).unwrap_or(0);
                Offer {
                    monthly_price: at(0),
                    first_payment: at(1),
                    period_months: at(2),
                    mileage_per_year: at(3),
                }
            }
            RawOffer::Labeled(l) => {
                let get = |v: &Option<Value>| v.as_ref().map(coerce_int).unwrap_or(0);
                Offer {
                    monthly_price: get(&l.monthly_price),
                    first_payment: get(&l.first_payment),
                    period_months: get(&l.period_months),
                    mileage_per_year: get(&l.mileage_per_year),
                }
            }
        }
    }
}

/// Numbers round, numeric strings parse, everything else is 0
fn coerce_int(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
            cleaned
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    cleaned
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.round() as i64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Deterministic comparison order: price, then mileage, then term, then upfront
fn sort_key(offer: &Offer) -> (i64, i64, i64, i64) {
    (
        offer.monthly_price,
        offer.mileage_per_year,
        offer.period_months,
        offer.first_payment,
    )
}

/// Sorted copy of an offer multiset
pub fn canonical_offers(offers: &[Offer]) -> Vec<Offer> {
    let mut sorted = offers.to_vec();
    sorted.sort_by_key(sort_key);
    sorted
}

/// Offer collections are equal iff they hold the same multiset of offers.
///
/// A missing collection on either side always counts as changed.
pub fn offers_equal(existing: Option<&[Offer]>, extracted: Option<&[Offer]>) -> bool {
    match (existing, extracted) {
        (Some(a), Some(b)) => a.len() == b.len() && canonical_offers(a) == canonical_offers(b),
        _ => false,
    }
}
