use chrono::{DateTime, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::{
    config::{CheckoutConfig, CurrencyConfig},
    errors::ServiceError,
    models::{DeliveryEstimate, OrderTotals, PaymentMethod},
};

use super::{
    payment_service::PaymentCalculator,
    promotion_service::{AppliedPromo, PromoContext, PromoEngine, PromoRejection},
    shipping_service::ShippingResolver,
};

/// `subtotal - discount + shipping_fee + cod_fee`, not floored at zero.
pub fn aggregate_totals(
    subtotal: Decimal,
    discount: Decimal,
    shipping_fee: Decimal,
    cod_fee: Decimal,
) -> OrderTotals {
    let total = subtotal - discount + shipping_fee + cod_fee;
    if total.is_sign_negative() && !total.is_zero() {
        warn!(%subtotal, %discount, %total, "order total is negative");
    }
    OrderTotals {
        subtotal,
        discount,
        shipping_fee,
        cod_fee,
        total,
    }
}

/// Everything the storefront shows on a price breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub totals: OrderTotals,
    pub delivery_estimate: Option<DeliveryEstimate>,
    pub applied_promo: Option<AppliedPromo>,
    pub promo_rejection: Option<PromoRejection>,
    pub available_methods: Vec<PaymentMethod>,
}

#[derive(Debug, Clone, Default)]
pub struct QuoteRequest {
    pub subtotal: Decimal,
    pub postal_code: String,
    pub promo_code: Option<String>,
    pub payment_method: Option<String>,
    pub is_first_order: bool,
    pub product_ids: Vec<String>,
}

/// Pricing policy for checkout: shipping, promotions, payment fees and totals.
/// Performs no I/O.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    shipping: ShippingResolver,
    promotions: PromoEngine,
    payments: PaymentCalculator,
    currency: CurrencyConfig,
}

impl PricingEngine {
    pub fn new(config: &CheckoutConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            shipping: ShippingResolver::new(&config.shipping)?,
            promotions: PromoEngine::new(config.promotions.clone(), &config.currency.symbol),
            payments: PaymentCalculator::new(&config.payments),
            currency: config.currency.clone(),
        })
    }

    pub fn shipping(&self) -> &ShippingResolver {
        &self.shipping
    }

    pub fn promotions(&self) -> &PromoEngine {
        &self.promotions
    }

    pub fn payments(&self) -> &PaymentCalculator {
        &self.payments
    }

    pub fn currency(&self) -> &CurrencyConfig {
        &self.currency
    }

    /// Applies the precedence rules: a free-shipping promo zeroes shipping,
    /// and the COD fee is taken off the undiscounted subtotal.
    pub fn calculate_totals(
        &self,
        subtotal: Decimal,
        postal_code: &str,
        applied_promo: Option<&AppliedPromo>,
        payment_method: Option<&str>,
    ) -> OrderTotals {
        let discount = applied_promo.map_or(Decimal::ZERO, |promo| promo.discount);
        let cod_fee = match payment_method {
            Some(method) if self.payments.is_cod(method) => self.payments.cod_fee(subtotal),
            _ => Decimal::ZERO,
        };
        let shipping_fee = if applied_promo.map_or(false, |promo| promo.free_shipping) {
            Decimal::ZERO
        } else {
            self.shipping.fee(postal_code, subtotal)
        };

        aggregate_totals(subtotal, discount, shipping_fee, cod_fee)
    }

    pub fn quote(&self, request: &QuoteRequest) -> Quote {
        self.quote_at(request, Utc::now(), Local::now().date_naive())
    }

    pub fn quote_at(&self, request: &QuoteRequest, now: DateTime<Utc>, today: NaiveDate) -> Quote {
        let (applied_promo, promo_rejection) = match request.promo_code.as_deref() {
            Some(code) if !code.trim().is_empty() => {
                let ctx = PromoContext::new(
                    request.subtotal,
                    request.is_first_order,
                    request.product_ids.clone(),
                );
                match self.promotions.validate_at(code, &ctx, now) {
                    Ok(applied) => (Some(applied), None),
                    Err(rejection) => (None, Some(rejection)),
                }
            }
            _ => (None, None),
        };

        let totals = self.calculate_totals(
            request.subtotal,
            &request.postal_code,
            applied_promo.as_ref(),
            request.payment_method.as_deref(),
        );

        Quote {
            totals,
            delivery_estimate: self
                .shipping
                .estimate_on(&request.postal_code, request.subtotal, today),
            applied_promo,
            promo_rejection,
            available_methods: self
                .payments
                .available_methods(request.subtotal, &request.postal_code)
                .into_iter()
                .cloned()
                .collect(),
        }
    }
}
