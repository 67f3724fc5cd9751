use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable formula + parameters snapshot. A settings document is never
/// edited in place; saving produces a new `version` (and usually a new
/// canonical `version_id`), which is what staleness tracking keys on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceSettings {
    pub formula: String,
    pub parameters: Vec<ParameterDef>,
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl PriceSettings {
    pub fn parameter(&self, id: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|parameter| parameter.id == id)
    }
}

/// A declared formula parameter. The `id` is the identifier the formula text
/// references; `name` is the operator-facing label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub source: ParameterSource,
}

/// Where a parameter's numeric value comes from. Wire names (`type`,
/// `formField`, `lookupTable`) match the stored settings documents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParameterSource {
    Fixed {
        value: String,
    },
    Form {
        #[serde(rename = "formField")]
        field: String,
        #[serde(rename = "lookupTable", default, skip_serializing_if = "Option::is_none")]
        lookup: Option<BTreeMap<String, f64>>,
    },
}

impl ParameterDef {
    pub fn fixed(id: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source: ParameterSource::Fixed { value: value.into() },
        }
    }

    pub fn form(id: impl Into<String>, name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source: ParameterSource::Form { field: field.into(), lookup: None },
        }
    }

    pub fn form_with_lookup(
        id: impl Into<String>,
        name: impl Into<String>,
        field: impl Into<String>,
        lookup: BTreeMap<String, f64>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source: ParameterSource::Form { field: field.into(), lookup: Some(lookup) },
        }
    }
}
