//! Checkout pricing, eligibility and the step-by-step checkout wizard.

pub mod checkout_state;
pub mod checkout_wizard;
pub mod order_submission_service;
pub mod payment_service;
pub mod pricing_service;
pub mod promotion_service;
pub mod shipping_service;

pub use checkout_state::{
    transition, validate_step, CheckoutEvent, CheckoutSnapshot, CheckoutState, CheckoutStep,
    Direction, StepContext, StepValidationError,
};
pub use checkout_wizard::{system_clock, CheckoutWizard, Clock, WizardServices};
pub use order_submission_service::{OrderSubmissionService, SubmissionTimeouts};
pub use payment_service::PaymentCalculator;
pub use pricing_service::{aggregate_totals, PricingEngine, Quote, QuoteRequest};
pub use promotion_service::{
    AppliedPromo, InMemoryPromoUsage, PromoContext, PromoEngine, PromoRejection, PromoUsageStore,
};
pub use shipping_service::ShippingResolver;
