use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::price_status::PriceStatus;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

impl std::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed extension-field value. Stored quote documents carry scalars, lists
/// (multi-select form fields) and booleans, so the variant set mirrors that.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Bool(bool),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Numeric view of the value: numbers pass through, booleans become 1/0,
    /// numeric text parses. Lists and non-numeric text have no scalar view.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            Self::Text(value) => value.trim().replace(',', ".").parse().ok(),
            Self::List(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// The earlier ad-hoc staleness scheme, kept only so the migrator can read
/// and (on rollback) reconstruct it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyFlags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_price_update: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_calculated_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub price_update_reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_structure_changed: Option<bool>,
}

impl LegacyFlags {
    pub fn is_empty(&self) -> bool {
        self.needs_price_update.is_none()
            && self.pending_calculated_price.is_none()
            && self.price_update_reasons.is_empty()
            && self.form_structure_changed.is_none()
    }
}

/// Preserved copy of the legacy flags written during migration, for audit
/// and emergency rollback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacyBackup {
    pub flags: LegacyFlags,
    pub migrated: bool,
    pub migration_date: DateTime<Utc>,
}

/// A price-request record. Known business fields are named; everything else
/// lives in the two extension bags (`fields` is the older top-level shape,
/// `custom_fields` the nested one; both are still read).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Displayed price. Written only by the apply operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_status: Option<PriceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy: Option<LegacyFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_backup: Option<LegacyBackup>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(id: impl Into<String>, settings_version: i64, version_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: QuoteId(id.into()),
            reference: None,
            qty: None,
            thickness: None,
            length: None,
            width: None,
            unit_price: None,
            price_updated_at: None,
            fields: BTreeMap::new(),
            custom_fields: BTreeMap::new(),
            price_status: Some(PriceStatus::initial(settings_version, version_id)),
            legacy: None,
            legacy_backup: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reads an extension field, top-level bag first, then the nested
    /// custom-fields map.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).or_else(|| self.custom_fields.get(name))
    }

    /// Numeric view of a field by name, covering the dedicated columns as
    /// well as both extension bags.
    pub fn numeric_field(&self, name: &str) -> Option<f64> {
        match name {
            "qty" => self.qty,
            "thickness" => self.thickness,
            "length" => self.length,
            "width" => self.width,
            _ => None,
        }
        .or_else(|| self.field(name).and_then(FieldValue::as_number))
    }
}
