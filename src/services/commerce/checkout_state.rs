use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum::Display;
use thiserror::Error;
use tracing::debug;

use crate::{
    common::is_valid_postal_code,
    errors::ServiceError,
    models::{Address, DeliveryEstimate},
};

use super::{payment_service::PaymentCalculator, promotion_service::AppliedPromo};

/// Bumped whenever `CheckoutState` changes shape; older snapshots are discarded.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Wizard steps, strictly linear. Serialized as their number (1-4).
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum CheckoutStep {
    #[default]
    Shipping = 1,
    Payment = 2,
    Review = 3,
    Confirm = 4,
}

impl CheckoutStep {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Shipping),
            2 => Some(Self::Payment),
            3 => Some(Self::Review),
            4 => Some(Self::Confirm),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.number().checked_sub(1).and_then(Self::from_number)
    }
}

impl From<CheckoutStep> for u8 {
    fn from(step: CheckoutStep) -> Self {
        step.number()
    }
}

impl TryFrom<u8> for CheckoutStep {
    type Error = String;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        Self::from_number(number).ok_or_else(|| format!("no checkout step {number}"))
    }
}

/// Which way the last transition went; drives the UI slide animation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// The wizard's working memory.
///
/// `shipping_quote` and `processing` are runtime-only and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutState {
    pub step: CheckoutStep,
    pub direction: Direction,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub billing_same_as_shipping: bool,
    pub payment_method: Option<String>,
    pub promo_input: String,
    pub applied_promo: Option<AppliedPromo>,
    #[serde(skip)]
    pub shipping_quote: Option<DeliveryEstimate>,
    #[serde(skip)]
    pub processing: bool,
}

impl Default for CheckoutState {
    fn default() -> Self {
        Self {
            step: CheckoutStep::Shipping,
            direction: Direction::Forward,
            shipping_address: Address::default(),
            billing_address: Address::default(),
            billing_same_as_shipping: true,
            payment_method: None,
            promo_input: String::new(),
            applied_promo: None,
            shipping_quote: None,
            processing: false,
        }
    }
}

impl CheckoutState {
    /// Billing address that will go on the order.
    pub fn effective_billing_address(&self) -> &Address {
        if self.billing_same_as_shipping {
            &self.shipping_address
        } else {
            &self.billing_address
        }
    }

    /// Shipping fee as last derived for display; zero before a postal code resolves.
    pub fn shipping_fee(&self) -> Decimal {
        self.shipping_quote
            .as_ref()
            .map_or(Decimal::ZERO, |quote| quote.shipping_fee)
    }
}

/// Persisted envelope around a `CheckoutState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSnapshot {
    pub version: u32,
    pub state: CheckoutState,
}

impl CheckoutSnapshot {
    pub fn new(state: CheckoutState) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            state,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// `None` for anything unreadable or written by another snapshot version.
    pub fn from_json(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Self>(raw) {
            Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => Some(snapshot),
            Ok(snapshot) => {
                debug!(
                    version = snapshot.version,
                    "discarding checkout snapshot from another version"
                );
                None
            }
            Err(err) => {
                debug!(error = %err, "discarding unreadable checkout snapshot");
                None
            }
        }
    }
}

/// Why the wizard refused to move. The `Display` text is shown to shoppers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepValidationError {
    #[error("Please fill in: {}", .0.join(", "))]
    MissingShippingFields(Vec<String>),
    #[error("Please enter a valid 6-digit PIN code")]
    InvalidPostalCode,
    #[error("Please complete the billing address: {}", .0.join(", "))]
    MissingBillingFields(Vec<String>),
    #[error("Please select a payment method")]
    NoPaymentMethod,
    #[error("Payment method '{0}' is not available for this order")]
    PaymentMethodUnavailable(String),
    #[error("Cash on delivery is not available for this order")]
    CodNotEligible,
    #[error("Cannot move from step {from} to step {to}")]
    InvalidTransition { from: u8, to: u8 },
}

impl StepValidationError {
    /// Step the shopper must go back to in order to fix this.
    pub fn step(&self) -> Option<CheckoutStep> {
        match self {
            Self::MissingShippingFields(_)
            | Self::InvalidPostalCode
            | Self::MissingBillingFields(_) => Some(CheckoutStep::Shipping),
            Self::NoPaymentMethod
            | Self::PaymentMethodUnavailable(_)
            | Self::CodNotEligible => Some(CheckoutStep::Payment),
            Self::InvalidTransition { .. } => None,
        }
    }
}

impl From<StepValidationError> for ServiceError {
    fn from(err: StepValidationError) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutEvent {
    Next,
    Back,
    GoTo(CheckoutStep),
}

/// What step validation needs beyond the state itself.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub payments: &'a PaymentCalculator,
    /// Amount COD eligibility is judged on.
    pub order_amount: Decimal,
}

pub fn validate_step(
    state: &CheckoutState,
    step: CheckoutStep,
    ctx: &StepContext<'_>,
) -> Result<(), StepValidationError> {
    match step {
        CheckoutStep::Shipping => validate_shipping(state),
        CheckoutStep::Payment => validate_payment(state, ctx),
        CheckoutStep::Review | CheckoutStep::Confirm => Ok(()),
    }
}

fn validate_shipping(state: &CheckoutState) -> Result<(), StepValidationError> {
    let address = &state.shipping_address;
    let missing = address.missing_fields();
    if !missing.is_empty() {
        return Err(StepValidationError::MissingShippingFields(
            missing.into_iter().map(str::to_string).collect(),
        ));
    }
    if !is_valid_postal_code(address.postal_code.trim()) {
        return Err(StepValidationError::InvalidPostalCode);
    }
    if !state.billing_same_as_shipping {
        let missing = state.billing_address.missing_fields();
        if !missing.is_empty() {
            return Err(StepValidationError::MissingBillingFields(
                missing.into_iter().map(str::to_string).collect(),
            ));
        }
    }
    Ok(())
}

fn validate_payment(
    state: &CheckoutState,
    ctx: &StepContext<'_>,
) -> Result<(), StepValidationError> {
    let method_id = match state.payment_method.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => return Err(StepValidationError::NoPaymentMethod),
    };

    let postal_code = state.shipping_address.postal_code.trim();
    match ctx.payments.method(method_id) {
        Some(method) if method.is_cod() => {
            if ctx.payments.is_cod_eligible(ctx.order_amount, postal_code) && method.enabled {
                Ok(())
            } else {
                Err(StepValidationError::CodNotEligible)
            }
        }
        _ if ctx.payments.is_available(method_id, ctx.order_amount, postal_code) => Ok(()),
        _ => Err(StepValidationError::PaymentMethodUnavailable(
            method_id.to_string(),
        )),
    }
}

/// Pure step transition. Moving forward validates every step being left
/// behind; moving backward is unconditional.
pub fn transition(
    state: &CheckoutState,
    event: CheckoutEvent,
    ctx: &StepContext<'_>,
) -> Result<CheckoutState, StepValidationError> {
    let from = state.step;
    let invalid = |to: u8| StepValidationError::InvalidTransition {
        from: from.number(),
        to,
    };

    let to = match event {
        CheckoutEvent::Next => from.next().ok_or_else(|| invalid(from.number() + 1))?,
        CheckoutEvent::Back => from.previous().ok_or_else(|| invalid(0))?,
        CheckoutEvent::GoTo(to) => to,
    };

    let direction = match to.cmp(&from) {
        Ordering::Greater => {
            let mut step = from;
            while step < to {
                validate_step(state, step, ctx)?;
                step = step.next().ok_or_else(|| invalid(to.number()))?;
            }
            Direction::Forward
        }
        Ordering::Less => Direction::Backward,
        Ordering::Equal => state.direction,
    };

    debug!(from = from.number(), to = to.number(), ?direction, "checkout step transition");

    Ok(CheckoutState {
        step: to,
        direction,
        ..state.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaymentConfig;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn complete_address() -> Address {
        Address {
            name: "Asha Rao".into(),
            line1: "12 MG Road".into(),
            city: "Bengaluru".into(),
            state: "KA".into(),
            postal_code: "560001".into(),
            phone: "9876543210".into(),
            ..Default::default()
        }
    }

    fn ready_state() -> CheckoutState {
        CheckoutState {
            shipping_address: complete_address(),
            payment_method: Some("online".into()),
            ..Default::default()
        }
    }

    fn with_ctx<T>(amount: Decimal, f: impl FnOnce(&StepContext<'_>) -> T) -> T {
        let payments = PaymentCalculator::new(&PaymentConfig::default());
        f(&StepContext {
            payments: &payments,
            order_amount: amount,
        })
    }

    #[test]
    fn steps_serialize_as_numbers() {
        assert_eq!(serde_json::to_string(&CheckoutStep::Review).unwrap(), "3");
        assert_eq!(
            serde_json::from_str::<CheckoutStep>("2").unwrap(),
            CheckoutStep::Payment
        );
        assert!(serde_json::from_str::<CheckoutStep>("5").is_err());
    }

    #[test]
    fn next_rejected_with_empty_phone() {
        let mut state = ready_state();
        state.shipping_address.phone.clear();

        let err =
            with_ctx(dec!(500), |ctx| transition(&state, CheckoutEvent::Next, ctx)).unwrap_err();
        assert_eq!(
            err,
            StepValidationError::MissingShippingFields(vec!["phone".into()])
        );
        assert_eq!(err.step(), Some(CheckoutStep::Shipping));
        assert_eq!(state.step, CheckoutStep::Shipping);
    }

    #[test]
    fn next_advances_with_complete_address() {
        let state = ready_state();
        let next = with_ctx(dec!(500), |ctx| transition(&state, CheckoutEvent::Next, ctx)).unwrap();
        assert_eq!(next.step, CheckoutStep::Payment);
        assert_eq!(next.direction, Direction::Forward);
    }

    #[test]
    fn leading_zero_postal_code_blocks_shipping() {
        let mut state = ready_state();
        state.shipping_address.postal_code = "056001".into();
        assert_matches!(
            with_ctx(dec!(500), |ctx| transition(&state, CheckoutEvent::Next, ctx)),
            Err(StepValidationError::InvalidPostalCode)
        );
    }

    #[test]
    fn separate_billing_address_must_be_complete() {
        let mut state = ready_state();
        state.billing_same_as_shipping = false;
        assert_matches!(
            with_ctx(dec!(500), |ctx| validate_step(&state, CheckoutStep::Shipping, ctx)),
            Err(StepValidationError::MissingBillingFields(_))
        );

        state.billing_address = complete_address();
        assert!(
            with_ctx(dec!(500), |ctx| validate_step(&state, CheckoutStep::Shipping, ctx)).is_ok()
        );
    }

    #[test]
    fn cod_step_respects_eligibility() {
        let mut state = ready_state();
        state.step = CheckoutStep::Payment;
        state.payment_method = Some("cod".into());

        assert_matches!(
            with_ctx(dec!(50), |ctx| transition(&state, CheckoutEvent::Next, ctx)),
            Err(StepValidationError::CodNotEligible)
        );
        let next = with_ctx(dec!(500), |ctx| transition(&state, CheckoutEvent::Next, ctx)).unwrap();
        assert_eq!(next.step, CheckoutStep::Review);
    }

    #[test]
    fn payment_step_needs_a_known_enabled_method() {
        let mut state = ready_state();
        state.payment_method = None;
        assert_matches!(
            with_ctx(dec!(500), |ctx| validate_step(&state, CheckoutStep::Payment, ctx)),
            Err(StepValidationError::NoPaymentMethod)
        );

        state.payment_method = Some("bank_transfer".into());
        assert_matches!(
            with_ctx(dec!(500), |ctx| validate_step(&state, CheckoutStep::Payment, ctx)),
            Err(StepValidationError::PaymentMethodUnavailable(id)) if id == "bank_transfer"
        );
    }

    #[test]
    fn back_is_unconditional_but_not_below_first_step() {
        let mut state = CheckoutState::default();
        state.step = CheckoutStep::Review;
        let back = with_ctx(dec!(0), |ctx| transition(&state, CheckoutEvent::Back, ctx)).unwrap();
        assert_eq!(back.step, CheckoutStep::Payment);
        assert_eq!(back.direction, Direction::Backward);

        let first = CheckoutState::default();
        assert_matches!(
            with_ctx(dec!(0), |ctx| transition(&first, CheckoutEvent::Back, ctx)),
            Err(StepValidationError::InvalidTransition { from: 1, to: 0 })
        );
    }

    #[test]
    fn go_to_forward_validates_each_intermediate_step() {
        let mut state = ready_state();
        state.payment_method = None;
        assert_matches!(
            with_ctx(dec!(500), |ctx| transition(
                &state,
                CheckoutEvent::GoTo(CheckoutStep::Review),
                ctx
            )),
            Err(StepValidationError::NoPaymentMethod)
        );

        state.payment_method = Some("online".into());
        let jumped = with_ctx(dec!(500), |ctx| {
            transition(&state, CheckoutEvent::GoTo(CheckoutStep::Review), ctx)
        })
        .unwrap();
        assert_eq!(jumped.step, CheckoutStep::Review);
    }

    #[test]
    fn go_to_backward_skips_validation() {
        let mut state = CheckoutState::default();
        state.step = CheckoutStep::Review;
        let edited = with_ctx(dec!(0), |ctx| {
            transition(&state, CheckoutEvent::GoTo(CheckoutStep::Shipping), ctx)
        })
        .unwrap();
        assert_eq!(edited.step, CheckoutStep::Shipping);
        assert_eq!(edited.direction, Direction::Backward);
    }

    #[test]
    fn next_from_confirm_is_invalid() {
        let mut state = ready_state();
        state.step = CheckoutStep::Confirm;
        assert_matches!(
            with_ctx(dec!(500), |ctx| transition(&state, CheckoutEvent::Next, ctx)),
            Err(StepValidationError::InvalidTransition { from: 4, to: 5 })
        );
    }

    #[test]
    fn snapshot_skips_runtime_fields() {
        let mut state = ready_state();
        state.processing = true;
        state.shipping_quote = None;
        let json = CheckoutSnapshot::new(state.clone()).to_json().unwrap();
        assert!(!json.contains("processing"));

        let restored = CheckoutSnapshot::from_json(&json).unwrap();
        assert!(!restored.state.processing);
        assert_eq!(restored.state.shipping_address, state.shipping_address);
    }

    #[test]
    fn foreign_snapshots_are_discarded() {
        let mut snapshot = CheckoutSnapshot::new(ready_state());
        snapshot.version = SNAPSHOT_VERSION + 1;
        let json = snapshot.to_json().unwrap();
        assert!(CheckoutSnapshot::from_json(&json).is_none());
        assert!(CheckoutSnapshot::from_json("{not json").is_none());
    }
}
