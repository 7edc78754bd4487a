//! Tiered matching of extracted records against indexed inventory
//!
//! Claims are committed tier by tier across the whole batch: every exact
//! match first, then composite, then algorithmic. Within a tier records are
//! processed in input order. A listing is claimed at most once per run.

use std::collections::HashSet;

use crate::config::{PowertrainPolicy, ReconcileConfig};
use crate::models::{MatchFactors, MatchMethod, MatchResult, VehicleRecord};
use crate::reconcile::index::InventoryIndex;
use crate::reconcile::keys::{composite_key, effective_specs, exact_key, normalize_text};

/// Score given to a factor when either side lacks the data
const NEUTRAL_SCORE: f64 = 0.5;

/// Score for one model name containing the other
const MODEL_CONTAINMENT_SCORE: f64 = 0.8;

/// Algorithmic candidate for one extracted record
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Position in the inventory index
    pub position: usize,
    pub score: f64,
    pub factors: MatchFactors,
}

pub struct Matcher<'a> {
    index: &'a InventoryIndex,
    config: &'a ReconcileConfig,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a InventoryIndex, config: &'a ReconcileConfig) -> Self {
        Self { index, config }
    }

    /// Match every extracted record; output is parallel to `extracted`
    pub fn match_all(&self, extracted: &[VehicleRecord]) -> Vec<MatchResult> {
        let mut results: Vec<Option<MatchResult>> = vec![None; extracted.len()];
        let mut claimed: HashSet<usize> = HashSet::new();

        // Pass 1: exact key
        for (i, record) in extracted.iter().enumerate() {
            if let Some(pos) = self.index.lookup_exact(&exact_key(record)) {
                if self.keyed_hit_allowed(record, pos) && claimed.insert(pos) {
                    results[i] = Some(self.keyed_result(MatchMethod::Exact, 1.0, pos));
                }
            }
        }

        // Pass 2: composite key
        for (i, record) in extracted.iter().enumerate() {
            if results[i].is_some() {
                continue;
            }
            if let Some(pos) = self.index.lookup_composite(&composite_key(record)) {
                if self.keyed_hit_allowed(record, pos) && claimed.insert(pos) {
                    results[i] = Some(self.keyed_result(
                        MatchMethod::Composite,
                        self.config.composite_confidence,
                        pos,
                    ));
                }
            }
        }

        // Pass 3: rank candidates against the fixed key claims, then commit in order
        let ranked: Vec<Vec<Candidate>> = extracted
            .iter()
            .enumerate()
            .map(|(i, record)| {
                if results[i].is_some() {
                    Vec::new()
                } else {
                    self.rank_candidates(record, &claimed)
                }
            })
            .collect();

        for (i, candidates) in ranked.into_iter().enumerate() {
            if results[i].is_some() {
                continue;
            }
            let best = candidates.into_iter().find(|c| !claimed.contains(&c.position));
            if let Some(candidate) = best {
                claimed.insert(candidate.position);
                results[i] = Some(MatchResult {
                    method: MatchMethod::Algorithmic,
                    confidence: candidate.score,
                    matched_listing_id: self
                        .index
                        .record(candidate.position)
                        .and_then(|r| r.listing_id),
                    factors: Some(candidate.factors),
                });
            }
        }

        results
            .into_iter()
            .zip(extracted)
            .map(|(result, record)| {
                let result = result.unwrap_or_else(MatchResult::unmatched);
                tracing::debug!(
                    "Match {} -> {} ({:.2})",
                    record.label(),
                    result.method,
                    result.confidence
                );
                result
            })
            .collect()
    }

    /// A key hit that the powertrain policy rules out falls through to the next tier
    fn keyed_hit_allowed(&self, record: &VehicleRecord, pos: usize) -> bool {
        self.index
            .record(pos)
            .is_some_and(|existing| self.powertrain_compatible(record, existing))
    }

    fn keyed_result(&self, method: MatchMethod, confidence: f64, pos: usize) -> MatchResult {
        MatchResult {
            method,
            confidence,
            matched_listing_id: self.index.record(pos).and_then(|r| r.listing_id),
            factors: None,
        }
    }

    /// Candidates above the confidence floor, best first, ties in inventory order
    pub fn rank_candidates(
        &self,
        extracted: &VehicleRecord,
        excluded: &HashSet<usize>,
    ) -> Vec<Candidate> {
        let make = normalize_text(&extracted.make);
        let mut candidates: Vec<Candidate> = self
            .index
            .records()
            .iter()
            .enumerate()
            .filter(|(pos, existing)| {
                !excluded.contains(pos) && normalize_text(&existing.make) == make
            })
            .filter(|(_, existing)| self.powertrain_compatible(extracted, existing))
            .filter_map(|(position, existing)| {
                let factors = self.compute_match_factors(extracted, existing);
                let score = self.compute_match_score(&factors);
                (score >= self.config.min_confidence).then_some(Candidate {
                    position,
                    score,
                    factors,
                })
            })
            .collect();

        // Stable sort keeps inventory order among equal scores
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates
    }

    /// Under the `separate` policy a known powertrain difference rules a pair out
    fn powertrain_compatible(&self, extracted: &VehicleRecord, existing: &VehicleRecord) -> bool {
        if self.config.powertrain_policy == PowertrainPolicy::Merge {
            return true;
        }
        let a = effective_specs(extracted);
        let b = effective_specs(existing);
        let tx_differs = a.transmission.is_known()
            && b.transmission.is_known()
            && a.transmission != b.transmission;
        let dt_differs =
            a.drivetrain.is_known() && b.drivetrain.is_known() && a.drivetrain != b.drivetrain;
        !(tx_differs || dt_differs)
    }

    /// Per-factor similarity of a pair
    pub fn compute_match_factors(
        &self,
        extracted: &VehicleRecord,
        existing: &VehicleRecord,
    ) -> MatchFactors {
        let ext_specs = effective_specs(extracted);
        let inv_specs = effective_specs(existing);

        let model_score = {
            let a = normalize_text(&extracted.model);
            let b = normalize_text(&existing.model);
            if a == b {
                1.0
            } else if !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a)) {
                MODEL_CONTAINMENT_SCORE
            } else {
                0.0
            }
        };

        let price_score = match (
            extracted.lowest_monthly_price(),
            existing.lowest_monthly_price(),
        ) {
            (Some(a), Some(b)) => self.price_proximity(a, b),
            _ => NEUTRAL_SCORE,
        };

        let horsepower_score = match (ext_specs.horsepower, inv_specs.horsepower) {
            (Some(a), Some(b)) => horsepower_closeness(a, b),
            _ => NEUTRAL_SCORE,
        };

        let transmission_score =
            if ext_specs.transmission.is_known() && inv_specs.transmission.is_known() {
                if ext_specs.transmission == inv_specs.transmission {
                    1.0
                } else {
                    0.0
                }
            } else {
                NEUTRAL_SCORE
            };

        MatchFactors {
            model_score,
            price_score,
            horsepower_score,
            transmission_score,
            fuel_type_score: text_equality(&extracted.fuel_type, &existing.fuel_type),
            body_type_score: text_equality(&extracted.body_type, &existing.body_type),
        }
    }

    /// Weighted sum of the factors (weights are normalized at config load)
    pub fn compute_match_score(&self, factors: &MatchFactors) -> f64 {
        let w = &self.config.weights;
        let score = factors.model_score * w.model
            + factors.price_score * w.price
            + factors.horsepower_score * w.horsepower
            + factors.transmission_score * w.transmission
            + factors.fuel_type_score * w.fuel_type
            + factors.body_type_score * w.body_type;
        score.clamp(0.0, 1.0)
    }

    fn price_proximity(&self, a: i64, b: i64) -> f64 {
        let larger = a.max(b) as f64;
        if larger <= 0.0 {
            return NEUTRAL_SCORE;
        }
        let ratio = a.abs_diff(b) as f64 / larger;
        let full = self.config.price_full_score_ratio;
        let zero = self.config.price_zero_score_ratio;
        if ratio <= full {
            1.0
        } else if ratio >= zero {
            0.0
        } else {
            1.0 - (ratio - full) / (zero - full)
        }
    }
}

/// Graceful degradation as horsepower figures drift apart
fn horsepower_closeness(a: i64, b: i64) -> f64 {
    match a.abs_diff(b) {
        0..=5 => 1.0,
        6..=15 => 0.8,
        16..=30 => 0.5,
        31..=50 => 0.2,
        _ => 0.0,
    }
}

fn text_equality(a: &Option<String>, b: &Option<String>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if !a.trim().is_empty() && !b.trim().is_empty() => {
            if normalize_text(a) == normalize_text(b) {
                1.0
            } else {
                0.0
            }
        }
        _ => NEUTRAL_SCORE,
    }
}
