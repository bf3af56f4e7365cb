use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::{Address, CartItem, DeliveryEstimate, PaymentMethodKind};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    /// Created, awaiting online payment.
    PaymentPending,
    /// Cash on delivery, payable to the courier.
    CodPending,
    Paid,
    Failed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    CodPending,
    Paid,
    Failed,
}

impl From<PaymentStatus> for OrderStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => OrderStatus::PaymentPending,
            PaymentStatus::CodPending => OrderStatus::CodPending,
            PaymentStatus::Paid => OrderStatus::Paid,
            PaymentStatus::Failed => OrderStatus::Failed,
        }
    }
}

/// Price breakdown for an order. `total` is not floored at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_fee: Decimal,
    pub cod_fee: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    /// Amount in the currency's smallest unit (paise), as hosted checkouts expect it.
    pub fn total_minor_units(&self) -> Option<i64> {
        use rust_decimal::prelude::ToPrimitive;

        (self.total * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }
}

/// Payload handed to the order backend on confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSubmission {
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_method: String,
    pub payment_kind: PaymentMethodKind,
    pub currency: String,
    pub items: Vec<CartItem>,
    pub totals: OrderTotals,
    pub promo_code: Option<String>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub shipping_zone: Option<String>,
    pub delivery_estimate: Option<DeliveryEstimate>,
    pub created_at: DateTime<Utc>,
}

impl OrderSubmission {
    pub fn generate_order_number() -> String {
        format!(
            "ORD-{}",
            Uuid::new_v4().simple().to_string()[..8].to_uppercase()
        )
    }

    pub fn is_cod(&self) -> bool {
        self.payment_kind == PaymentMethodKind::CashOnDelivery
    }
}

/// Result of a completed checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_id: Option<String>,
    pub totals: OrderTotals,
}
