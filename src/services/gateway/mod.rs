//! Boundaries to the services checkout depends on but does not own: the
//! order backend, the payment provider's session API, its hosted checkout
//! and the signature check that proves a payment happened.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    errors::ServiceError,
    models::{OrderSubmission, PaymentStatus},
};

pub mod rest;
pub mod signature;

pub use rest::{RestOrderGateway, RestPaymentSessionGateway};
pub use signature::HmacSignatureVerifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub order_id: String,
}

/// Server-issued handle the hosted checkout is opened with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub session_id: String,
    pub order_id: String,
    /// Smallest currency unit.
    pub amount_minor: i64,
    pub currency: String,
    /// Public key id the hosted checkout is opened with.
    pub key_id: Option<String>,
}

/// What the hosted checkout hands back once the shopper has paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAuthorization {
    pub payment_id: String,
    pub signature: String,
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn create_order(&self, order: &OrderSubmission) -> Result<CreatedOrder, ServiceError>;

    async fn update_payment_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
        payment_id: Option<&str>,
    ) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait PaymentSessionGateway: Send + Sync {
    async fn create_session(
        &self,
        order_id: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentSession, ServiceError>;
}

/// The provider's hosted payment UI.
///
/// Resolves once the shopper finishes; a dismissed modal is
/// `ServiceError::PaymentCancelled`, a declined payment `PaymentFailed`.
#[async_trait]
pub trait HostedCheckout: Send + Sync {
    async fn open(&self, session: &PaymentSession) -> Result<PaymentAuthorization, ServiceError>;
}

#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(
        &self,
        session_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, ServiceError>;
}
