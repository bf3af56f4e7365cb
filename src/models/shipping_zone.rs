use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Inclusive range of business days a parcel spends in transit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDays {
    pub min: u32,
    pub max: u32,
}

impl DeliveryDays {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Display form, e.g. `"2-4 days"` or `"3 days"`.
    pub fn label(&self) -> String {
        if self.min == self.max {
            format!("{} days", self.min)
        } else {
            format!("{}-{} days", self.min, self.max)
        }
    }
}

/// A group of states sharing one flat fee and one delivery band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShippingZone {
    pub id: String,
    pub name: String,
    /// State codes covered by this zone.
    #[serde(default)]
    pub states: Vec<String>,
    pub delivery_days: DeliveryDays,
    pub fee: Decimal,
    /// Orders at or above this subtotal ship free.
    #[serde(default)]
    pub free_shipping_threshold: Option<Decimal>,
}

impl ShippingZone {
    pub fn covers(&self, state: &str) -> bool {
        self.states.iter().any(|s| s.eq_ignore_ascii_case(state))
    }

    pub fn ships_free(&self, subtotal: Decimal) -> bool {
        self.free_shipping_threshold
            .map_or(false, |threshold| subtotal >= threshold)
    }
}

/// Maps the first three digits of a postal code to a state code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionPrefix {
    pub prefix: String,
    pub state: String,
}

impl RegionPrefix {
    pub fn new(prefix: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            state: state.into(),
        }
    }
}

/// Shipping quote for one postal code and subtotal, computed against a given day.
///
/// Never cached across requests: the date range moves with the calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryEstimate {
    pub zone_id: String,
    pub zone_name: String,
    /// e.g. `"2-4 days"`
    pub days_label: String,
    pub shipping_fee: Decimal,
    pub free_shipping: bool,
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

impl DeliveryEstimate {
    /// e.g. `"Oct 21 - Oct 23"`, or a single date when both ends agree.
    pub fn date_range_label(&self) -> String {
        if self.earliest == self.latest {
            self.earliest.format("%b %-d").to_string()
        } else {
            format!(
                "{} - {}",
                self.earliest.format("%b %-d"),
                self.latest.format("%b %-d")
            )
        }
    }
}
