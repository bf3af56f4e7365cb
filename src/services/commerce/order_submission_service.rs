use std::{future::Future, sync::Arc, time::Duration};

use tracing::{error, info, instrument, warn};

use crate::{
    config::GatewayConfig,
    errors::ServiceError,
    models::{OrderStatus, OrderSubmission, PaymentStatus, PlacedOrder, PromoCode},
    services::gateway::{HostedCheckout, OrderGateway, PaymentSessionGateway, SignatureVerifier},
};

use super::promotion_service::{PromoRejection, PromoUsageStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionTimeouts {
    /// Order creation, status updates and payment-session creation.
    pub request: Duration,
    pub verification: Duration,
    /// How long the shopper gets inside the hosted checkout.
    pub hosted_checkout: Duration,
}

impl From<&GatewayConfig> for SubmissionTimeouts {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            request: config.request_timeout(),
            verification: config.verification_timeout(),
            hosted_checkout: config.hosted_checkout_timeout(),
        }
    }
}

async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!(what, timeout_secs = limit.as_secs(), "gateway call timed out");
            Err(ServiceError::Timeout(format!(
                "{what} did not complete within {}s",
                limit.as_secs()
            )))
        }
    }
}

/// A promo use taken for an order that is not placed yet.
///
/// Dropping it without [`Redemption::keep`] gives the use back, which covers
/// a submission future that is cancelled mid-flight.
struct Redemption {
    usage: Arc<dyn PromoUsageStore>,
    promo: Option<PromoCode>,
}

impl Redemption {
    fn keep(mut self) {
        self.promo = None;
    }

    async fn release(mut self) {
        if let Some(promo) = self.promo.take() {
            release_logged(self.usage.as_ref(), &promo).await;
        }
    }
}

impl Drop for Redemption {
    fn drop(&mut self) {
        let Some(promo) = self.promo.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(code = %promo.code, "submission abandoned; giving the promo use back");
                let usage = Arc::clone(&self.usage);
                handle.spawn(async move { release_logged(usage.as_ref(), &promo).await });
            }
            Err(_) => {
                error!(code = %promo.code, "no runtime to release an abandoned promo redemption")
            }
        }
    }
}

async fn release_logged(usage: &dyn PromoUsageStore, promo: &PromoCode) {
    if let Err(err) = usage.release(promo).await {
        error!(code = %promo.code, error = %err, "failed to release promo redemption");
    }
}

/// Places an order with the backend and drives it through payment.
///
/// An order counts as placed only when creation succeeds and it is either
/// cash on delivery or its payment signature verifies.
pub struct OrderSubmissionService {
    orders: Arc<dyn OrderGateway>,
    sessions: Arc<dyn PaymentSessionGateway>,
    hosted_checkout: Arc<dyn HostedCheckout>,
    verifier: Arc<dyn SignatureVerifier>,
    promo_usage: Arc<dyn PromoUsageStore>,
    timeouts: SubmissionTimeouts,
}

impl OrderSubmissionService {
    pub fn new(
        orders: Arc<dyn OrderGateway>,
        sessions: Arc<dyn PaymentSessionGateway>,
        hosted_checkout: Arc<dyn HostedCheckout>,
        verifier: Arc<dyn SignatureVerifier>,
        promo_usage: Arc<dyn PromoUsageStore>,
        timeouts: SubmissionTimeouts,
    ) -> Self {
        Self {
            orders,
            sessions,
            hosted_checkout,
            verifier,
            promo_usage,
            timeouts,
        }
    }

    /// `promo` is the catalogue record of the applied promo code, if any;
    /// limited promos are redeemed before the order is created. An exhausted
    /// promo fails with a non-retryable `ValidationError`.
    #[instrument(skip(self, order, promo), fields(order_number = %order.order_number))]
    pub async fn submit(
        &self,
        order: &OrderSubmission,
        promo: Option<&PromoCode>,
    ) -> Result<PlacedOrder, ServiceError> {
        let amount_minor = if order.is_cod() {
            None
        } else {
            match order.totals.total_minor_units() {
                Some(amount) if amount > 0 => Some(amount),
                _ => {
                    return Err(ServiceError::InvalidInput(format!(
                        "cannot charge an order total of {}",
                        order.totals.total
                    )))
                }
            }
        };

        let redemption = match promo {
            Some(promo) if promo.usage_limit.is_some() => {
                self.promo_usage
                    .redeem(promo)
                    .await
                    .map_err(|err| match err {
                        ServiceError::Conflict(_) => PromoRejection::LimitReached.into(),
                        other => other,
                    })?;
                Some(Redemption {
                    usage: Arc::clone(&self.promo_usage),
                    promo: Some(promo.clone()),
                })
            }
            _ => None,
        };

        let result = self.place(order, amount_minor).await;
        if let Some(redemption) = redemption {
            if result.is_ok() {
                redemption.keep();
            } else {
                redemption.release().await;
            }
        }
        result
    }

    pub fn promo_usage(&self) -> &Arc<dyn PromoUsageStore> {
        &self.promo_usage
    }

    async fn place(
        &self,
        order: &OrderSubmission,
        amount_minor: Option<i64>,
    ) -> Result<PlacedOrder, ServiceError> {
        let created = with_timeout(
            self.timeouts.request,
            "order creation",
            self.orders.create_order(order),
        )
        .await
        .map_err(|err| {
            error!(error = %err, "order creation failed");
            err
        })?;
        let order_id = created.order_id;

        let Some(amount_minor) = amount_minor else {
            if let Err(err) = self.mark(&order_id, PaymentStatus::CodPending, None).await {
                error!(%order_id, error = %err, "failed to mark order as cash on delivery");
            }
            info!(%order_id, "cash-on-delivery order placed");
            return Ok(PlacedOrder {
                order_id,
                order_number: order.order_number.clone(),
                status: OrderStatus::CodPending,
                payment_id: None,
                totals: order.totals,
            });
        };

        match self.collect_payment(&order_id, order, amount_minor).await {
            Ok(payment_id) => {
                if let Err(err) = self
                    .mark(&order_id, PaymentStatus::Paid, Some(&payment_id))
                    .await
                {
                    // payment is captured and verified; the status catches up on reconciliation
                    error!(
                        %order_id,
                        %payment_id,
                        error = %err,
                        "failed to mark verified order as paid"
                    );
                }
                info!(%order_id, %payment_id, "online payment verified");
                Ok(PlacedOrder {
                    order_id,
                    order_number: order.order_number.clone(),
                    status: OrderStatus::Paid,
                    payment_id: Some(payment_id),
                    totals: order.totals,
                })
            }
            Err(err) => {
                warn!(%order_id, error = %err, "online payment did not complete");
                if let Err(mark_err) = self.mark(&order_id, PaymentStatus::Failed, None).await {
                    error!(%order_id, error = %mark_err, "failed to mark order as failed");
                }
                Err(err)
            }
        }
    }

    async fn collect_payment(
        &self,
        order_id: &str,
        order: &OrderSubmission,
        amount_minor: i64,
    ) -> Result<String, ServiceError> {
        let session = with_timeout(
            self.timeouts.request,
            "payment session creation",
            self.sessions
                .create_session(order_id, amount_minor, &order.currency),
        )
        .await?;

        let authorization = with_timeout(
            self.timeouts.hosted_checkout,
            "hosted checkout",
            self.hosted_checkout.open(&session),
        )
        .await?;

        let verified = with_timeout(
            self.timeouts.verification,
            "payment verification",
            self.verifier.verify(
                &session.session_id,
                &authorization.payment_id,
                &authorization.signature,
            ),
        )
        .await?;

        if !verified {
            return Err(ServiceError::PaymentFailed(
                "payment signature could not be verified".to_string(),
            ));
        }
        Ok(authorization.payment_id)
    }

    async fn mark(
        &self,
        order_id: &str,
        status: PaymentStatus,
        payment_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        with_timeout(
            self.timeouts.request,
            "payment status update",
            self.orders.update_payment_status(order_id, status, payment_id),
        )
        .await
    }
}
