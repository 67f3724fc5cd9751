use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Largest applied/calculated gap that still counts as "settled".
pub fn one_cent() -> Decimal {
    Decimal::new(1, 2)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceState {
    Unknown,
    Outdated,
    Calculating,
    Current,
    Error,
    PriceDrift,
    ContentDrift,
}

impl PriceState {
    /// States that demand operator or recalculation attention.
    pub fn needs_attention(self) -> bool {
        matches!(
            self,
            Self::Unknown | Self::Outdated | Self::Error | Self::PriceDrift | Self::ContentDrift
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Outdated => "outdated",
            Self::Calculating => "calculating",
            Self::Current => "current",
            Self::Error => "error",
            Self::PriceDrift => "price-drift",
            Self::ContentDrift => "content-drift",
        }
    }
}

/// One resolved parameter binding, kept in the breakdown so an operator can
/// see exactly which inputs produced a price.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundParameter {
    pub id: String,
    pub name: String,
    /// `fixed` or `form:<field>`.
    pub source: String,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalculationBreakdown {
    pub formula: String,
    pub bindings: Vec<BoundParameter>,
    pub raw_result: f64,
    pub price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifferenceSummary {
    pub previous_price: Option<Decimal>,
    pub new_price: Decimal,
    pub delta: Option<Decimal>,
    pub previous_version: i64,
    pub new_version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DifferenceSummary {
    pub fn between(
        previous_price: Option<Decimal>,
        new_price: Decimal,
        previous_version: i64,
        new_version: i64,
    ) -> Self {
        Self {
            previous_price,
            new_price,
            delta: previous_price.map(|previous| new_price - previous),
            previous_version,
            new_version,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Extra fields attached to a successful calculation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationExtras {
    pub settings_version_id: Option<String>,
    pub form_version_id: Option<String>,
    pub difference_summary: Option<DifferenceSummary>,
}

/// Per-quote staleness state machine. Mutated only by the price update
/// manager after quote creation; `applied_price` changes only through
/// [`PriceStatus::apply_price`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceStatus {
    pub settings_version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_version_id: Option<String>,
    pub calculated_price: Option<Decimal>,
    pub applied_price: Option<Decimal>,
    pub state: PriceState,
    pub last_calculated: Option<DateTime<Utc>>,
    pub last_applied: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculation_details: Option<CalculationBreakdown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difference_summary: Option<DifferenceSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PriceStatus {
    /// The status a quote is born with, pinned to the settings version active
    /// at creation time.
    pub fn initial(settings_version: i64, settings_version_id: Option<String>) -> Self {
        Self {
            settings_version,
            settings_version_id,
            form_version_id: None,
            calculated_price: None,
            applied_price: None,
            state: PriceState::Unknown,
            last_calculated: None,
            last_applied: None,
            calculation_details: None,
            difference_summary: None,
            status_reason: None,
            error_message: None,
        }
    }

    pub fn mark_outdated(&mut self, reason: impl Into<String>) {
        self.state = PriceState::Outdated;
        self.status_reason = Some(reason.into());
    }

    pub fn mark_calculating(&mut self) {
        self.state = PriceState::Calculating;
        self.status_reason = None;
        self.error_message = None;
    }

    /// Records a successful calculation and lands in `Current`.
    pub fn update_calculation(
        &mut self,
        price: Decimal,
        settings_version: i64,
        breakdown: CalculationBreakdown,
        extras: CalculationExtras,
    ) {
        self.settings_version = settings_version;
        self.settings_version_id = extras.settings_version_id;
        if extras.form_version_id.is_some() {
            self.form_version_id = extras.form_version_id;
        }
        self.calculated_price = Some(price);
        self.state = PriceState::Current;
        self.last_calculated = Some(Utc::now());
        self.calculation_details = Some(breakdown);
        self.difference_summary = extras.difference_summary;
        self.status_reason = None;
        self.error_message = None;
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.state = PriceState::Error;
        self.error_message = Some(message.into());
    }

    pub fn mark_price_drift(&mut self, summary: DifferenceSummary) {
        self.state = PriceState::PriceDrift;
        self.status_reason = Some("recalculation produced a different price".to_string());
        self.difference_summary = Some(summary);
    }

    pub fn mark_content_drift(&mut self, summary: DifferenceSummary) {
        self.state = PriceState::ContentDrift;
        self.status_reason = Some("recalculation inputs changed, price unchanged".to_string());
        self.difference_summary = Some(summary);
    }

    /// Commits the calculated price. The state is left untouched: applying is
    /// an operator confirmation, not a recalculation.
    pub fn apply_price(&mut self) -> Option<Decimal> {
        let price = self.calculated_price?;
        self.applied_price = Some(price);
        self.last_applied = Some(Utc::now());
        Some(price)
    }

    /// True when the stored version no longer matches the caller-supplied
    /// active version, or the state itself demands attention.
    pub fn needs_update(&self, active_version: i64, active_version_id: Option<&str>) -> bool {
        if self.settings_version != active_version {
            return true;
        }
        if let Some(active_id) = active_version_id {
            if self.settings_version_id.as_deref() != Some(active_id) {
                return true;
            }
        }
        self.state.needs_attention()
    }

    /// True when anything is waiting on an operator: a state that demands
    /// attention, a calculated price never applied, or applied and calculated
    /// prices more than a cent apart.
    pub fn has_pending_update(&self) -> bool {
        if self.state.needs_attention() {
            return true;
        }
        match (self.calculated_price, self.applied_price) {
            (Some(_), None) => true,
            (Some(calculated), Some(applied)) => (calculated - applied).abs() > one_cent(),
            _ => false,
        }
    }
}
