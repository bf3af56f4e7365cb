use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    common::{format_amount, percent_of},
    errors::ServiceError,
    models::{DiscountType, PromoCode},
};

/// Why a promo code was turned down. The `Display` text is shown to shoppers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PromoRejection {
    #[error("Invalid promo code")]
    InvalidCode,
    #[error("This promo code is no longer active")]
    Inactive,
    #[error("This promo code has expired")]
    Expired,
    #[error("This promo code has reached its usage limit")]
    LimitReached,
    #[error("This promo code is valid for first-time customers only")]
    FirstOrderOnly,
    #[error("Minimum order value of {} required for this code", format_amount(.symbol, *.minimum))]
    MinimumNotMet { minimum: Decimal, symbol: String },
    #[error("This promo code is not applicable to items in your cart")]
    NotApplicable,
}

impl From<PromoRejection> for ServiceError {
    fn from(rejection: PromoRejection) -> Self {
        ServiceError::ValidationError(rejection.to_string())
    }
}

/// Order facts a promo is checked against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromoContext {
    pub subtotal: Decimal,
    pub is_first_order: bool,
    pub product_ids: Vec<String>,
}

impl PromoContext {
    pub fn new(subtotal: Decimal, is_first_order: bool, product_ids: Vec<String>) -> Self {
        Self {
            subtotal,
            is_first_order,
            product_ids,
        }
    }
}

/// A promo that passed every check, with its effect on the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedPromo {
    pub code: String,
    pub discount: Decimal,
    pub free_shipping: bool,
    pub message: String,
    pub promo: PromoCode,
}

#[derive(Debug, Clone)]
pub struct PromoEngine {
    promotions: Vec<PromoCode>,
    currency_symbol: String,
}

impl PromoEngine {
    pub fn new(promotions: Vec<PromoCode>, currency_symbol: impl Into<String>) -> Self {
        Self {
            promotions,
            currency_symbol: currency_symbol.into(),
        }
    }

    pub fn find(&self, code: &str) -> Option<&PromoCode> {
        self.promotions.iter().find(|promo| promo.matches(code))
    }

    pub fn validate(&self, code: &str, ctx: &PromoContext) -> Result<AppliedPromo, PromoRejection> {
        self.validate_at(code, ctx, Utc::now())
    }

    /// Runs the checks in order and stops at the first failure.
    pub fn validate_at(
        &self,
        code: &str,
        ctx: &PromoContext,
        now: DateTime<Utc>,
    ) -> Result<AppliedPromo, PromoRejection> {
        let result = self.check(code, ctx, now);
        if let Err(ref rejection) = result {
            debug!(code, %rejection, "promo code rejected");
        }
        result
    }

    fn check(
        &self,
        code: &str,
        ctx: &PromoContext,
        now: DateTime<Utc>,
    ) -> Result<AppliedPromo, PromoRejection> {
        let promo = self.find(code).ok_or(PromoRejection::InvalidCode)?;

        if !promo.enabled {
            return Err(PromoRejection::Inactive);
        }
        if !promo.is_within_window(now) {
            return Err(PromoRejection::Expired);
        }
        if !promo.has_remaining_uses() {
            return Err(PromoRejection::LimitReached);
        }
        if promo.first_order_only && !ctx.is_first_order {
            return Err(PromoRejection::FirstOrderOnly);
        }
        if let Some(minimum) = promo.min_order_value {
            if ctx.subtotal < minimum {
                return Err(PromoRejection::MinimumNotMet {
                    minimum,
                    symbol: self.currency_symbol.clone(),
                });
            }
        }
        if !promo.applies_to_any(ctx.product_ids.as_slice()) {
            return Err(PromoRejection::NotApplicable);
        }

        let (discount, free_shipping) = Self::compute_discount(promo, ctx.subtotal);
        let message = if free_shipping {
            "Free shipping applied!".to_string()
        } else {
            format!(
                "Promo applied! You save {}",
                format_amount(&self.currency_symbol, discount)
            )
        };

        Ok(AppliedPromo {
            code: promo.code.clone(),
            discount,
            free_shipping,
            message,
            promo: promo.clone(),
        })
    }

    /// Discount amount and free-shipping flag for a promo that already passed validation.
    pub fn compute_discount(promo: &PromoCode, subtotal: Decimal) -> (Decimal, bool) {
        match promo.discount_type {
            DiscountType::FreeShipping => (Decimal::ZERO, true),
            DiscountType::Percentage => {
                let discount = percent_of(subtotal, promo.value);
                let discount = match promo.max_discount {
                    Some(cap) => discount.min(cap),
                    None => discount,
                };
                (discount, false)
            }
            DiscountType::Fixed => (promo.value, false),
        }
    }
}

/// Shared redemption counter. `redeem` must check and increment atomically.
#[async_trait]
pub trait PromoUsageStore: Send + Sync {
    /// Records one use; `Conflict` when the promo's limit has been reached.
    async fn redeem(&self, promo: &PromoCode) -> Result<u32, ServiceError>;
    /// Gives back a use taken for an order that was not placed.
    async fn release(&self, promo: &PromoCode) -> Result<(), ServiceError>;
    async fn used_count(&self, promo: &PromoCode) -> Result<u32, ServiceError>;
}

/// Process-local counters, seeded from the catalogue's `used_count`.
#[derive(Debug, Default)]
pub struct InMemoryPromoUsage {
    counts: DashMap<String, u32>,
}

impl InMemoryPromoUsage {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(promo: &PromoCode) -> String {
        promo.code.to_ascii_uppercase()
    }
}

#[async_trait]
impl PromoUsageStore for InMemoryPromoUsage {
    async fn redeem(&self, promo: &PromoCode) -> Result<u32, ServiceError> {
        // the entry guard holds the shard lock for the check and the increment
        let mut count = self
            .counts
            .entry(Self::key(promo))
            .or_insert(promo.used_count);

        if let Some(limit) = promo.usage_limit {
            if *count >= limit {
                warn!(code = %promo.code, limit, "promotion usage limit reached");
                return Err(ServiceError::Conflict(
                    PromoRejection::LimitReached.to_string(),
                ));
            }
        }

        *count += 1;
        info!(code = %promo.code, used = *count, "promotion redeemed");
        Ok(*count)
    }

    async fn release(&self, promo: &PromoCode) -> Result<(), ServiceError> {
        if let Some(mut count) = self.counts.get_mut(&Self::key(promo)) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }

    async fn used_count(&self, promo: &PromoCode) -> Result<u32, ServiceError> {
        Ok(self
            .counts
            .get(&Self::key(promo))
            .map(|count| *count)
            .unwrap_or(promo.used_count))
    }
}
