use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethodKind {
    Online,
    CashOnDelivery,
    DirectTransfer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentMethod {
    pub id: String,
    pub display_name: String,
    pub kind: PaymentMethodKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PaymentMethod {
    pub fn is_cod(&self) -> bool {
        self.kind == PaymentMethodKind::CashOnDelivery
    }
}

/// Cash-on-delivery rules. Amount bounds are inclusive at both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodConfig {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    /// The only COD surcharge setting; payment methods carry no fee of their own.
    pub fee_percent: Decimal,
    /// Empty means COD is offered everywhere.
    #[serde(default)]
    pub allowed_postal_codes: Vec<String>,
}

impl CodConfig {
    pub fn amount_in_bounds(&self, amount: Decimal) -> bool {
        self.min_amount <= amount && amount <= self.max_amount
    }

    pub fn serves_postal_code(&self, postal_code: &str) -> bool {
        self.allowed_postal_codes.is_empty()
            || self
                .allowed_postal_codes
                .iter()
                .any(|code| code == postal_code.trim())
    }
}
