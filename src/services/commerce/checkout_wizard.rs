use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::{
    errors::ServiceError,
    models::{
        Address, Cart, OrderStatus, OrderSubmission, OrderTotals, PaymentMethod, PlacedOrder,
        PromoCode,
    },
    storage::CheckoutStore,
};

use super::{
    checkout_state::{
        transition, validate_step, CheckoutEvent, CheckoutSnapshot, CheckoutState, CheckoutStep,
        Direction, StepContext, StepValidationError,
    },
    order_submission_service::OrderSubmissionService,
    pricing_service::PricingEngine,
    promotion_service::{AppliedPromo, PromoContext, PromoRejection},
};

/// Source of "now" for promo windows and order timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Shared collaborators every wizard instance needs.
#[derive(Clone)]
pub struct WizardServices {
    pub pricing: Arc<PricingEngine>,
    pub store: Arc<dyn CheckoutStore>,
    pub submission: Arc<OrderSubmissionService>,
    pub key_prefix: String,
    pub clock: Clock,
}

/// Keeps the `processing` flag raised until dropped, including when the
/// submission future is cancelled.
struct ProcessingGuard<'a>(&'a mut bool);

impl<'a> ProcessingGuard<'a> {
    fn engage(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

/// One shopper's pass through Shipping → Payment → Review → Confirm.
///
/// Every mutation is written to the checkout store straight away so an
/// interrupted checkout can be resumed with [`CheckoutWizard::restore`].
/// Storage failures are logged and never block the shopper.
pub struct CheckoutWizard {
    services: WizardServices,
    storage_key: String,
    cart: Cart,
    is_first_order: bool,
    state: CheckoutState,
}

impl CheckoutWizard {
    /// Picks up the persisted snapshot for `session_key`, or starts fresh.
    #[instrument(skip(services, cart))]
    pub async fn restore(
        services: WizardServices,
        session_key: &str,
        cart: Cart,
        is_first_order: bool,
    ) -> Self {
        let storage_key = format!("{}:{}", services.key_prefix, session_key);

        let state = match services.store.get(&storage_key).await {
            Ok(Some(raw)) => match CheckoutSnapshot::from_json(&raw) {
                Some(snapshot) => {
                    info!(step = snapshot.state.step.number(), "resuming checkout");
                    snapshot.state
                }
                None => {
                    warn!(%storage_key, "ignoring unusable checkout snapshot");
                    CheckoutState::default()
                }
            },
            Ok(None) => CheckoutState::default(),
            Err(err) => {
                warn!(%storage_key, error = %err, "could not read checkout snapshot");
                CheckoutState::default()
            }
        };

        let mut wizard = Self {
            services,
            storage_key,
            cart,
            is_first_order,
            state,
        };
        wizard.state.processing = false;
        wizard.refresh_shipping_quote();
        wizard.revalidate_promo().await;
        wizard
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    pub fn step(&self) -> CheckoutStep {
        self.state.step
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    pub fn is_processing(&self) -> bool {
        self.state.processing
    }

    pub async fn update_shipping(&mut self, address: Address) {
        self.state.shipping_address = address;
        self.refresh_shipping_quote();
        self.persist().await;
    }

    pub async fn update_billing(&mut self, address: Address) {
        self.state.billing_address = address;
        self.persist().await;
    }

    pub async fn set_billing_same_as_shipping(&mut self, same: bool) {
        self.state.billing_same_as_shipping = same;
        self.persist().await;
    }

    pub async fn select_payment_method(&mut self, method_id: impl Into<String>) {
        self.state.payment_method = Some(method_id.into());
        self.persist().await;
    }

    pub async fn set_promo_input(&mut self, code: impl Into<String>) {
        self.state.promo_input = code.into();
        self.persist().await;
    }

    /// Validates the promo input against the current cart and the shared
    /// usage counter. A rejection leaves any previously applied promo in place.
    pub async fn apply_promo(&mut self) -> Result<AppliedPromo, PromoRejection> {
        let applied = self.services.pricing.promotions().validate_at(
            &self.state.promo_input,
            &self.promo_context(),
            self.now(),
        )?;
        self.ensure_uses_left(&applied.promo).await?;

        info!(code = %applied.code, discount = %applied.discount, "promo applied");
        self.state.applied_promo = Some(applied.clone());
        self.persist().await;
        Ok(applied)
    }

    pub async fn remove_promo(&mut self) {
        self.state.applied_promo = None;
        self.state.promo_input.clear();
        self.persist().await;
    }

    /// Swaps in the latest cart; the shipping quote is recomputed and an
    /// applied promo that no longer qualifies is dropped.
    pub async fn set_cart(&mut self, cart: Cart) {
        self.cart = cart;
        self.refresh_shipping_quote();
        self.revalidate_promo().await;
        self.persist().await;
    }

    pub async fn next(&mut self) -> Result<CheckoutStep, StepValidationError> {
        self.apply_event(CheckoutEvent::Next).await
    }

    pub async fn back(&mut self) -> Result<CheckoutStep, StepValidationError> {
        self.apply_event(CheckoutEvent::Back).await
    }

    pub async fn go_to(
        &mut self,
        step: CheckoutStep,
    ) -> Result<CheckoutStep, StepValidationError> {
        self.apply_event(CheckoutEvent::GoTo(step)).await
    }

    async fn apply_event(
        &mut self,
        event: CheckoutEvent,
    ) -> Result<CheckoutStep, StepValidationError> {
        let pricing = Arc::clone(&self.services.pricing);
        let ctx = self.step_context(&pricing);

        match transition(&self.state, event, &ctx) {
            Ok(next) => {
                self.state = next;
                self.persist().await;
                Ok(self.state.step)
            }
            Err(err) => {
                warn!(
                    step = self.state.step.number(),
                    ?event,
                    error = %err,
                    "checkout step blocked"
                );
                Err(err)
            }
        }
    }

    pub fn totals(&self) -> OrderTotals {
        self.services.pricing.calculate_totals(
            self.cart.subtotal(),
            &self.state.shipping_address.postal_code,
            self.state.applied_promo.as_ref(),
            self.state.payment_method.as_deref(),
        )
    }

    pub fn available_payment_methods(&self) -> Vec<&PaymentMethod> {
        self.services.pricing.payments().available_methods(
            self.cart.subtotal(),
            self.state.shipping_address.postal_code.trim(),
        )
    }

    /// Submits the order from Review or Confirm.
    ///
    /// Shipping and payment are validated again first; a failure sends the
    /// shopper back to the offending step. A promo that has run out of uses is
    /// dropped and the shopper is sent back to Review. The snapshot is cleared
    /// only once the order is placed.
    #[instrument(skip(self), fields(storage_key = %self.storage_key))]
    pub async fn place_order(&mut self) -> Result<PlacedOrder, ServiceError> {
        if self.state.processing {
            return Err(ServiceError::Conflict(
                "An order submission is already in progress".to_string(),
            ));
        }
        if self.state.step < CheckoutStep::Review {
            return Err(ServiceError::InvalidOperation(
                "Please review your order before placing it".to_string(),
            ));
        }
        if self.cart.is_empty() {
            return Err(ServiceError::InvalidOperation("Your cart is empty".to_string()));
        }

        self.state.step = CheckoutStep::Confirm;
        self.state.direction = Direction::Forward;

        if let Err(err) = self.revalidate_before_submit() {
            let bounce_to = err.step().unwrap_or(CheckoutStep::Shipping);
            warn!(
                error = %err,
                step = bounce_to.number(),
                "checkout bounced back before submission"
            );
            self.bounce_to(bounce_to).await;
            return Err(err.into());
        }
        if let Some(rejection) = self.drop_exhausted_promo().await {
            self.bounce_to(CheckoutStep::Review).await;
            return Err(rejection.into());
        }

        let order = self.build_submission()?;
        let promo = self
            .state
            .applied_promo
            .as_ref()
            .map(|applied| applied.promo.clone());

        let submission = Arc::clone(&self.services.submission);
        let result = {
            let _processing = ProcessingGuard::engage(&mut self.state.processing);
            submission.submit(&order, promo.as_ref()).await
        };

        match result {
            Ok(placed) => {
                info!(
                    order_number = %placed.order_number,
                    status = %placed.status,
                    "order placed"
                );
                self.clear_snapshot().await;
                self.state = CheckoutState::default();
                self.refresh_shipping_quote();
                Ok(placed)
            }
            Err(err) => {
                warn!(error = %err, retryable = err.is_retryable(), "order submission failed");
                // another checkout may have taken the last use while this one was in flight
                if let Some(rejection) = self.drop_exhausted_promo().await {
                    self.bounce_to(CheckoutStep::Review).await;
                    return Err(rejection.into());
                }
                self.persist().await;
                Err(err)
            }
        }
    }

    /// Throws away the in-progress checkout.
    pub async fn abandon(&mut self) {
        info!(storage_key = %self.storage_key, "checkout abandoned");
        self.clear_snapshot().await;
        self.state = CheckoutState::default();
        self.refresh_shipping_quote();
    }

    async fn bounce_to(&mut self, step: CheckoutStep) {
        self.state.step = step;
        self.state.direction = Direction::Backward;
        self.persist().await;
    }

    fn revalidate_before_submit(&self) -> Result<(), StepValidationError> {
        let ctx = self.step_context(&self.services.pricing);
        validate_step(&self.state, CheckoutStep::Shipping, &ctx)?;
        validate_step(&self.state, CheckoutStep::Payment, &ctx)
    }

    fn build_submission(&self) -> Result<OrderSubmission, ServiceError> {
        let method_id = self.state.payment_method.clone().unwrap_or_default();
        let method = self
            .services
            .pricing
            .payments()
            .method(&method_id)
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!("unknown payment method '{method_id}'"))
            })?;

        let status = if method.is_cod() {
            OrderStatus::CodPending
        } else {
            OrderStatus::PaymentPending
        };

        Ok(OrderSubmission {
            order_number: OrderSubmission::generate_order_number(),
            status,
            payment_method: method.id.clone(),
            payment_kind: method.kind,
            currency: self.services.pricing.currency().code.clone(),
            items: self.cart.items.clone(),
            totals: self.totals(),
            promo_code: self
                .state
                .applied_promo
                .as_ref()
                .map(|applied| applied.code.clone()),
            shipping_address: self.state.shipping_address.clone(),
            billing_address: self.state.effective_billing_address().clone(),
            shipping_zone: self
                .state
                .shipping_quote
                .as_ref()
                .map(|quote| quote.zone_id.clone()),
            delivery_estimate: self.state.shipping_quote.clone(),
            created_at: self.now(),
        })
    }

    fn now(&self) -> DateTime<Utc> {
        (self.services.clock)()
    }

    fn step_context<'a>(&self, pricing: &'a PricingEngine) -> StepContext<'a> {
        StepContext {
            payments: pricing.payments(),
            order_amount: self.cart.subtotal(),
        }
    }

    fn promo_context(&self) -> PromoContext {
        PromoContext::new(
            self.cart.subtotal(),
            self.is_first_order,
            self.cart
                .product_ids()
                .into_iter()
                .map(str::to_string)
                .collect(),
        )
    }

    fn refresh_shipping_quote(&mut self) {
        self.state.shipping_quote = self
            .services
            .pricing
            .shipping()
            .estimate(&self.state.shipping_address.postal_code, self.cart.subtotal());
    }

    async fn revalidate_promo(&mut self) {
        let Some(code) = self
            .state
            .applied_promo
            .as_ref()
            .map(|applied| applied.code.clone())
        else {
            return;
        };

        let checked = self.services.pricing.promotions().validate_at(
            &code,
            &self.promo_context(),
            self.now(),
        );
        let checked = match checked {
            Ok(applied) => self.ensure_uses_left(&applied.promo).await.map(|()| applied),
            Err(rejection) => Err(rejection),
        };
        match checked {
            Ok(applied) => self.state.applied_promo = Some(applied),
            Err(rejection) => {
                info!(%code, %rejection, "dropping promo that no longer applies");
                self.state.applied_promo = None;
            }
        }
    }

    /// The catalogue's `used_count` is a seed; the submission service's
    /// usage store holds the live count.
    async fn ensure_uses_left(&self, promo: &PromoCode) -> Result<(), PromoRejection> {
        let Some(limit) = promo.usage_limit else {
            return Ok(());
        };
        match self.services.submission.promo_usage().used_count(promo).await {
            Ok(used) if used >= limit => {
                debug!(code = %promo.code, used, limit, "promo has no uses left");
                Err(PromoRejection::LimitReached)
            }
            Ok(_) => Ok(()),
            Err(err) => {
                // redemption at submission still enforces the limit
                warn!(code = %promo.code, error = %err, "could not read promo usage");
                Ok(())
            }
        }
    }

    /// Drops the applied promo if its uses have run out.
    async fn drop_exhausted_promo(&mut self) -> Option<PromoRejection> {
        let promo = self.state.applied_promo.as_ref()?.promo.clone();
        match self.ensure_uses_left(&promo).await {
            Ok(()) => None,
            Err(rejection) => {
                info!(code = %promo.code, %rejection, "dropping exhausted promo");
                self.state.applied_promo = None;
                Some(rejection)
            }
        }
    }

    async fn persist(&self) {
        let raw = match CheckoutSnapshot::new(self.state.clone()).to_json() {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "could not serialize checkout snapshot");
                return;
            }
        };
        match self.services.store.set(&self.storage_key, &raw).await {
            Ok(()) => debug!(storage_key = %self.storage_key, "checkout snapshot saved"),
            Err(err) => warn!(
                storage_key = %self.storage_key,
                error = %err,
                "could not save checkout snapshot"
            ),
        }
    }

    async fn clear_snapshot(&self) {
        if let Err(err) = self.services.store.delete(&self.storage_key).await {
            warn!(
                storage_key = %self.storage_key,
                error = %err,
                "could not clear checkout snapshot"
            );
        }
    }
}
