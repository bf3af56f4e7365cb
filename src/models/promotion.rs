use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
    FreeShipping,
}

/// A redeemable discount rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromoCode {
    /// Matched case-insensitively.
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    /// Percent for `Percentage`, an amount for `Fixed`, ignored for `FreeShipping`.
    #[serde(default)]
    pub value: Decimal,
    #[serde(default)]
    pub min_order_value: Option<Decimal>,
    /// Only applies to `Percentage` promos.
    #[serde(default)]
    pub max_discount: Option<Decimal>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub used_count: u32,
    #[serde(default)]
    pub first_order_only: bool,
    /// Empty means every product qualifies.
    #[serde(default)]
    pub applicable_products: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PromoCode {
    pub fn matches(&self, code: &str) -> bool {
        self.code.eq_ignore_ascii_case(code.trim())
    }

    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_until
    }

    pub fn has_remaining_uses(&self) -> bool {
        self.usage_limit.map_or(true, |limit| self.used_count < limit)
    }

    pub fn applies_to_any<S: AsRef<str>>(&self, product_ids: &[S]) -> bool {
        self.applicable_products.is_empty()
            || product_ids
                .iter()
                .any(|id| self.applicable_products.iter().any(|p| p == id.as_ref()))
    }
}
