//! Domain models for leasesync

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::reconcile::offers::RawOffer;

// ========== Vehicle Records ==========

// Spec words shared by structured fields and variant text (lowercase)
const AUTOMATIC_TOKENS: &[&str] = &[
    "automatik",
    "automatic",
    "automatisk",
    "automatgear",
    "aut",
    "auto",
    "dct",
    "dsg",
    "cvt",
    "e-cvt",
];
const MANUAL_TOKENS: &[&str] = &["manuel", "manual", "manuelt", "man"];
const AWD_TOKENS: &[&str] = &[
    "awd",
    "4wd",
    "4x4",
    "xdrive",
    "quattro",
    "4motion",
    "all4",
    "firehjulstræk",
];
const FWD_TOKENS: &[&str] = &["fwd", "2wd", "forhjulstræk"];

/// Gearbox of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Transmission {
    Manual,
    Automatic,
    #[default]
    Unknown,
}

impl Transmission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Automatic => "automatic",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Gearbox named by a single lowercase word
    pub fn from_token(token: &str) -> Self {
        if AUTOMATIC_TOKENS.contains(&token) {
            Self::Automatic
        } else if MANUAL_TOKENS.contains(&token) {
            Self::Manual
        } else {
            Self::Unknown
        }
    }

    /// Lenient parse: dealer sheets use Danish and English spellings.
    /// Structured fields also accept the one-letter codes.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "m" => Self::Manual,
            "a" => Self::Automatic,
            other => Self::from_token(other),
        }
    }
}

impl From<String> for Transmission {
    fn from(s: String) -> Self {
        Self::parse_lenient(&s)
    }
}

impl std::fmt::Display for Transmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Driven wheels of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Drivetrain {
    Fwd,
    Awd,
    #[default]
    Unknown,
}

impl Drivetrain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fwd => "fwd",
            Self::Awd => "awd",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Driven wheels named by a single lowercase word
    pub fn from_token(token: &str) -> Self {
        if AWD_TOKENS.contains(&token) {
            Self::Awd
        } else if FWD_TOKENS.contains(&token) {
            Self::Fwd
        } else {
            Self::Unknown
        }
    }

    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "front" => Self::Fwd,
            "all" => Self::Awd,
            other => Self::from_token(other),
        }
    }
}

impl From<String> for Drivetrain {
    fn from(s: String) -> Self {
        Self::parse_lenient(&s)
    }
}

impl std::fmt::Display for Drivetrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One lease offer in canonical form
///
/// Deserializes from either a positional `[price, upfront, term, mileage]`
/// array or a labeled object; missing numbers become 0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(from = "RawOffer")]
pub struct Offer {
    pub monthly_price: i64,
    pub first_payment: i64,
    pub period_months: i64,
    pub mileage_per_year: i64,
}

/// A vehicle, either freshly extracted from a price list or loaded from inventory
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleRecord {
    /// Set for existing inventory, absent for extracted records
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "listingId")]
    pub listing_id: Option<Uuid>,
    pub make: String,
    pub model: String,
    /// Free-text trim string as printed by the dealer
    #[serde(default)]
    pub variant: String,
    #[serde(default, alias = "hp", alias = "horsePower")]
    pub horsepower: Option<i64>,
    #[serde(default)]
    pub transmission: Option<Transmission>,
    #[serde(default)]
    pub drivetrain: Option<Drivetrain>,
    #[serde(default, alias = "fuelType")]
    pub fuel_type: Option<String>,
    #[serde(default, alias = "bodyType")]
    pub body_type: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    /// g/km
    #[serde(default, alias = "co2Emission")]
    pub co2_emission: Option<i64>,
    /// km, electric vehicles
    #[serde(default, alias = "wltpRange", alias = "range_km")]
    pub wltp_range: Option<i64>,
    #[serde(default, alias = "consumptionL100km")]
    pub consumption_l_100km: Option<f64>,
    /// `None` means the extraction produced no offer list at all
    #[serde(default)]
    pub offers: Option<Vec<Offer>>,
}

impl VehicleRecord {
    /// Cheapest monthly price across the offers, if any
    pub fn lowest_monthly_price(&self) -> Option<i64> {
        self.offers
            .as_ref()?
            .iter()
            .map(|o| o.monthly_price)
            .filter(|p| *p > 0)
            .min()
    }

    /// Human label used in logs and CLI tables
    pub fn label(&self) -> String {
        let label = format!("{} {} {}", self.make, self.model, self.variant);
        label.trim().to_string()
    }
}

// ========== Matching ==========

/// Which matcher tier resolved an extracted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Exact,
    Composite,
    Algorithmic,
    Unmatched,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Composite => "composite",
            Self::Algorithmic => "algorithmic",
            Self::Unmatched => "unmatched",
        }
    }
}

impl std::str::FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "composite" => Ok(Self::Composite),
            "algorithmic" => Ok(Self::Algorithmic),
            "unmatched" => Ok(Self::Unmatched),
            _ => Err(format!("Unknown match method: {}", s)),
        }
    }
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Individual factors contributing to an algorithmic match score
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchFactors {
    /// 1.0 = same model name, lower for containment, 0.0 = different
    pub model_score: f64,
    /// How close the cheapest monthly prices are
    pub price_score: f64,
    /// How close the horsepower figures are
    pub horsepower_score: f64,
    pub transmission_score: f64,
    pub fuel_type_score: f64,
    pub body_type_score: f64,
}

/// Outcome of matching one extracted record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub method: MatchMethod,
    /// 0.0-1.0
    pub confidence: f64,
    pub matched_listing_id: Option<Uuid>,
    /// Only present for algorithmic matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factors: Option<MatchFactors>,
}

impl MatchResult {
    pub fn unmatched() -> Self {
        Self {
            method: MatchMethod::Unmatched,
            confidence: 0.0,
            matched_listing_id: None,
            factors: None,
        }
    }
}

// ========== Changes ==========

/// Old and new value of one changed field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

/// Changed fields keyed by field name (sorted for stable output)
pub type FieldChanges = BTreeMap<String, FieldChange>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    Unchanged,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Unchanged => "unchanged",
        }
    }
}

impl std::str::FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "unchanged" => Ok(Self::Unchanged),
            _ => Err(format!("Unknown change type: {}", s)),
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Review/apply state of a single change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    #[default]
    Pending,
    Selected,
    Applied,
    Discarded,
    Failed,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Selected => "selected",
            Self::Applied => "applied",
            Self::Discarded => "discarded",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ChangeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "selected" => Ok(Self::Selected),
            "applied" => Ok(Self::Applied),
            "discarded" => Ok(Self::Discarded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown change status: {}", s)),
        }
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Shape of a proposed change; each variant carries exactly the fields it needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change_type", rename_all = "lowercase")]
pub enum ChangeKind {
    Create {
        extracted: VehicleRecord,
    },
    Update {
        existing_listing_id: Uuid,
        extracted: VehicleRecord,
        field_changes: FieldChanges,
    },
    Delete {
        existing_listing_id: Uuid,
    },
    Unchanged {
        existing_listing_id: Uuid,
        extracted: VehicleRecord,
    },
}

impl ChangeKind {
    pub fn change_type(&self) -> ChangeType {
        match self {
            Self::Create { .. } => ChangeType::Create,
            Self::Update { .. } => ChangeType::Update,
            Self::Delete { .. } => ChangeType::Delete,
            Self::Unchanged { .. } => ChangeType::Unchanged,
        }
    }

    pub fn existing_listing_id(&self) -> Option<Uuid> {
        match self {
            Self::Create { .. } => None,
            Self::Update {
                existing_listing_id,
                ..
            }
            | Self::Delete {
                existing_listing_id,
            }
            | Self::Unchanged {
                existing_listing_id,
                ..
            } => Some(*existing_listing_id),
        }
    }

    pub fn extracted(&self) -> Option<&VehicleRecord> {
        match self {
            Self::Create { extracted }
            | Self::Update { extracted, .. }
            | Self::Unchanged { extracted, .. } => Some(extracted),
            Self::Delete { .. } => None,
        }
    }

    pub fn field_changes(&self) -> Option<&FieldChanges> {
        match self {
            Self::Update { field_changes, .. } => Some(field_changes),
            _ => None,
        }
    }

    /// Rebuild a change from its stored columns, enforcing the shape invariants
    pub fn from_parts(
        change_type: ChangeType,
        existing_listing_id: Option<Uuid>,
        extracted: Option<VehicleRecord>,
        field_changes: Option<FieldChanges>,
    ) -> Result<Self> {
        let missing = |what: &str| {
            Error::InvalidData(format!("{} change is missing its {}", change_type, what))
        };
        Ok(match change_type {
            ChangeType::Create => Self::Create {
                extracted: extracted.ok_or_else(|| missing("extracted payload"))?,
            },
            ChangeType::Update => Self::Update {
                existing_listing_id: existing_listing_id
                    .ok_or_else(|| missing("existing listing id"))?,
                extracted: extracted.ok_or_else(|| missing("extracted payload"))?,
                field_changes: field_changes.unwrap_or_default(),
            },
            ChangeType::Delete => Self::Delete {
                existing_listing_id: existing_listing_id
                    .ok_or_else(|| missing("existing listing id"))?,
            },
            ChangeType::Unchanged => Self::Unchanged {
                existing_listing_id: existing_listing_id
                    .ok_or_else(|| missing("existing listing id"))?,
                extracted: extracted.ok_or_else(|| missing("extracted payload"))?,
            },
        })
    }
}

/// A change computed by the classifier, not yet persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposedChange {
    #[serde(flatten)]
    pub kind: ChangeKind,
    #[serde(rename = "match")]
    pub match_result: MatchResult,
}

/// A persisted change row belonging to an extraction session
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionChange {
    pub id: Uuid,
    pub session_id: Uuid,
    #[serde(flatten)]
    pub kind: ChangeKind,
    pub change_status: ChangeStatus,
    pub match_method: MatchMethod,
    pub confidence: f64,
    pub match_factors: Option<MatchFactors>,
    /// Listing produced by an applied create
    pub applied_listing_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    pub applied_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filter for paginated change listings
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    pub change_type: Option<ChangeType>,
    pub status: Option<ChangeStatus>,
}

// ========== Sessions ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    ChangesComputed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ChangesComputed => "changes_computed",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "changes_computed" => Ok(Self::ChangesComputed),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

/// Change counts by type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub creates: i64,
    pub updates: i64,
    pub deletes: i64,
    pub unchanged: i64,
}

impl ChangeCounts {
    pub fn tally<'a>(changes: impl IntoIterator<Item = &'a ChangeKind>) -> Self {
        let mut counts = Self::default();
        for kind in changes {
            match kind.change_type() {
                ChangeType::Create => counts.creates += 1,
                ChangeType::Update => counts.updates += 1,
                ChangeType::Delete => counts.deletes += 1,
                ChangeType::Unchanged => counts.unchanged += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> i64 {
        self.creates + self.updates + self.deletes + self.unchanged
    }
}

/// One batch-reconciliation run for a dealer upload
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSession {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub status: SessionStatus,
    /// SHA-256 of the normalized extracted batch
    pub batch_hash: String,
    pub total_extracted: i64,
    pub counts: ChangeCounts,
    // Apply summary counters
    pub applied_creates: i64,
    pub applied_updates: i64,
    pub applied_deletes: i64,
    pub discarded_count: i64,
    pub error_count: i64,
    pub applied_at: Option<DateTime<Utc>>,
    pub applied_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of reconciling a batch into a new session
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationSummary {
    pub session_id: Uuid,
    pub seller_id: Uuid,
    pub total_extracted: i64,
    pub total_existing: i64,
    pub counts: ChangeCounts,
    pub exact_matches: i64,
    pub composite_matches: i64,
    pub algorithmic_matches: i64,
    pub batch_hash: String,
}

// ========== Apply ==========

/// A validated apply request
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub session_id: Uuid,
    pub change_ids: Vec<Uuid>,
    pub applied_by: String,
}

impl ApplyRequest {
    /// Validate raw identifiers before any processing starts
    pub fn parse(session_id: &str, change_ids: &[String], applied_by: &str) -> Result<Self> {
        let session_id = Uuid::parse_str(session_id.trim())
            .map_err(|_| Error::InvalidSessionId(session_id.to_string()))?;

        if change_ids.is_empty() {
            return Err(Error::InvalidChangeIds(vec![]));
        }

        let mut parsed = Vec::with_capacity(change_ids.len());
        let mut invalid = Vec::new();
        for raw in change_ids {
            match Uuid::parse_str(raw.trim()) {
                Ok(id) => {
                    if !parsed.contains(&id) {
                        parsed.push(id);
                    }
                }
                Err(_) => invalid.push(raw.clone()),
            }
        }
        if !invalid.is_empty() {
            return Err(Error::InvalidChangeIds(invalid));
        }

        let applied_by = applied_by.trim();
        Ok(Self {
            session_id,
            change_ids: parsed,
            applied_by: if applied_by.is_empty() {
                "unknown".to_string()
            } else {
                applied_by.to_string()
            },
        })
    }
}

/// One change that could not be applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyErrorEntry {
    pub change_id: String,
    pub change_type: Option<ChangeType>,
    pub error: String,
}

/// Summary of an apply invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    pub applied_creates: i64,
    pub applied_updates: i64,
    pub applied_deletes: i64,
    pub discarded_count: i64,
    pub total_processed: i64,
    pub error_count: i64,
    pub errors: Vec<ApplyErrorEntry>,
    pub session_id: Uuid,
    pub applied_by: String,
    pub applied_at: DateTime<Utc>,
}

// ========== Inventory ==========

/// A dealer whose inventory is reconciled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seller {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Reference make
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Make {
    pub id: i64,
    pub name: String,
}

/// One row of the denormalized inventory view (one per price row)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryRow {
    pub listing_id: Uuid,
    pub seller_id: Uuid,
    pub make: String,
    pub model: String,
    pub variant: String,
    pub horsepower: Option<i64>,
    pub transmission: Option<Transmission>,
    pub drivetrain: Option<Drivetrain>,
    pub fuel_type: Option<String>,
    pub body_type: Option<String>,
    pub year: Option<i32>,
    pub co2_emission: Option<i64>,
    pub wltp_range: Option<i64>,
    pub consumption_l_100km: Option<f64>,
    /// `None` when the listing has no pricing rows
    pub offer: Option<Offer>,
}
