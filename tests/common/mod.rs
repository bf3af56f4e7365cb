#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal_macros::dec;
use snackstore_checkout::{
    config::CheckoutConfig,
    errors::ServiceError,
    models::{Address, Cart, CartItem, OrderSubmission, PaymentStatus},
    services::{
        commerce::{
            Clock, InMemoryPromoUsage, OrderSubmissionService, PricingEngine, PromoUsageStore,
            SubmissionTimeouts, WizardServices,
        },
        gateway::{
            CreatedOrder, HmacSignatureVerifier, HostedCheckout, OrderGateway,
            PaymentAuthorization, PaymentSession, PaymentSessionGateway,
        },
    },
    storage::{CheckoutStore, InMemoryStore},
};

pub const SIGNATURE_SECRET: &str = "test_signature_secret";

/// Order backend that keeps everything in memory.
#[derive(Default)]
pub struct FakeOrderGateway {
    pub created: Mutex<Vec<OrderSubmission>>,
    pub status_updates: Mutex<Vec<(String, PaymentStatus, Option<String>)>>,
    pub fail_creation: bool,
    next_id: AtomicUsize,
}

impl FakeOrderGateway {
    pub fn failing() -> Self {
        Self {
            fail_creation: true,
            ..Default::default()
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn last_status(&self) -> Option<PaymentStatus> {
        self.status_updates
            .lock()
            .unwrap()
            .last()
            .map(|(_, status, _)| *status)
    }
}

#[async_trait]
impl OrderGateway for FakeOrderGateway {
    async fn create_order(&self, order: &OrderSubmission) -> Result<CreatedOrder, ServiceError> {
        if self.fail_creation {
            return Err(ServiceError::ExternalServiceError(
                "orders table unavailable".to_string(),
            ));
        }
        self.created.lock().unwrap().push(order.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedOrder {
            order_id: format!("order_{id}"),
        })
    }

    async fn update_payment_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
        payment_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.status_updates.lock().unwrap().push((
            order_id.to_string(),
            status,
            payment_id.map(str::to_string),
        ));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePaymentSessions;

#[async_trait]
impl PaymentSessionGateway for FakePaymentSessions {
    async fn create_session(
        &self,
        order_id: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentSession, ServiceError> {
        Ok(PaymentSession {
            session_id: format!("sess_{order_id}"),
            order_id: order_id.to_string(),
            amount_minor,
            currency: currency.to_string(),
            key_id: Some("key_test".to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShopperAction {
    /// Pays and returns a correctly signed authorization.
    Pay,
    /// Pays but the signature does not match.
    PayWithBadSignature,
    /// Closes the modal.
    Dismiss,
    /// Never comes back.
    Walk,
}

pub struct FakeHostedCheckout {
    pub action: ShopperAction,
    pub opened: Mutex<Vec<PaymentSession>>,
    signer: HmacSignatureVerifier,
}

impl FakeHostedCheckout {
    pub fn new(action: ShopperAction) -> Self {
        Self {
            action,
            opened: Mutex::new(Vec::new()),
            signer: HmacSignatureVerifier::new(SIGNATURE_SECRET),
        }
    }

    pub fn last_session(&self) -> Option<PaymentSession> {
        self.opened.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl HostedCheckout for FakeHostedCheckout {
    async fn open(&self, session: &PaymentSession) -> Result<PaymentAuthorization, ServiceError> {
        self.opened.lock().unwrap().push(session.clone());
        let payment_id = format!("pay_{}", session.order_id);
        match self.action {
            ShopperAction::Pay => Ok(PaymentAuthorization {
                signature: self.signer.sign(&session.session_id, &payment_id)?,
                payment_id,
            }),
            ShopperAction::PayWithBadSignature => Ok(PaymentAuthorization {
                payment_id,
                signature: "0".repeat(64),
            }),
            ShopperAction::Dismiss => Err(ServiceError::PaymentCancelled(
                "checkout closed by shopper".to_string(),
            )),
            ShopperAction::Walk => std::future::pending().await,
        }
    }
}

pub struct Harness {
    pub config: Arc<CheckoutConfig>,
    pub pricing: Arc<PricingEngine>,
    pub orders: Arc<FakeOrderGateway>,
    pub hosted: Arc<FakeHostedCheckout>,
    pub promo_usage: Arc<InMemoryPromoUsage>,
    pub store: Arc<InMemoryStore>,
    pub submission: Arc<OrderSubmissionService>,
    pub now: DateTime<Utc>,
}

impl Harness {
    pub fn new(action: ShopperAction) -> Self {
        Self::with_orders(action, FakeOrderGateway::default())
    }

    pub fn with_orders(action: ShopperAction, orders: FakeOrderGateway) -> Self {
        let config = Arc::new(CheckoutConfig::default());
        let pricing = Arc::new(PricingEngine::new(&config).expect("default config is valid"));
        let orders = Arc::new(orders);
        let hosted = Arc::new(FakeHostedCheckout::new(action));
        let promo_usage = Arc::new(InMemoryPromoUsage::new());
        let submission = Arc::new(OrderSubmissionService::new(
            orders.clone(),
            Arc::new(FakePaymentSessions),
            hosted.clone(),
            Arc::new(HmacSignatureVerifier::new(SIGNATURE_SECRET)),
            promo_usage.clone() as Arc<dyn PromoUsageStore>,
            test_timeouts(),
        ));

        Self {
            config,
            pricing,
            orders,
            hosted,
            promo_usage,
            store: Arc::new(InMemoryStore::new()),
            submission,
            now: checkout_time(),
        }
    }

    /// Runs the wizards this harness builds at `now` instead of `checkout_time()`.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn wizard_services(&self) -> WizardServices {
        WizardServices {
            pricing: self.pricing.clone(),
            store: self.store.clone() as Arc<dyn CheckoutStore>,
            submission: self.submission.clone(),
            key_prefix: self.config.storage.key_prefix.clone(),
            clock: fixed_clock(self.now),
        }
    }
}

/// Inside every default promo window.
pub fn checkout_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

pub fn fixed_clock(now: DateTime<Utc>) -> Clock {
    Arc::new(move || now)
}

pub fn test_timeouts() -> SubmissionTimeouts {
    SubmissionTimeouts {
        request: Duration::from_secs(2),
        verification: Duration::from_secs(2),
        hosted_checkout: Duration::from_millis(100),
    }
}

pub fn complete_address() -> Address {
    Address {
        name: "Asha Rao".to_string(),
        line1: "12 MG Road".to_string(),
        line2: Some("Near Metro Station".to_string()),
        city: "Bengaluru".to_string(),
        state: "KA".to_string(),
        postal_code: "560001".to_string(),
        phone: "9876543210".to_string(),
        email: Some("asha@example.com".to_string()),
    }
}

/// ₹799 of snacks, including a CRUNCH20-eligible product.
pub fn snack_cart() -> Cart {
    Cart::new(vec![
        CartItem::new("masala-crunch", "Masala Crunch", dec!(199), 2),
        CartItem::new("banana-chips", "Kerala Banana Chips", dec!(401), 1),
    ])
}

pub fn small_cart() -> Cart {
    Cart::new(vec![CartItem::new(
        "banana-chips",
        "Kerala Banana Chips",
        dec!(50),
        1,
    )])
}
