use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::{
    config::GatewayConfig,
    errors::ServiceError,
    models::{OrderStatus, OrderSubmission, PaymentStatus},
};

use super::{CreatedOrder, OrderGateway, PaymentSession, PaymentSessionGateway};

fn build_client(timeout: Duration) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::ConfigError(format!("failed to build HTTP client: {e}")))
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ServiceError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::ConfigError(format!("gateway.{name} is not set")))
}

async fn ensure_success(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(%status, what, "gateway request rejected");
    Err(ServiceError::ExternalServiceError(format!(
        "{what} failed with status {status}: {body}"
    )))
}

#[derive(Serialize)]
struct OrderRow<'a> {
    #[serde(flatten)]
    order: &'a OrderSubmission,
    payment_status: PaymentStatus,
}

#[derive(Serialize)]
struct PaymentStatusPatch<'a> {
    status: OrderStatus,
    payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct InsertedRow {
    id: Value,
}

/// Order table of the hosted backend, reached through its REST interface.
#[derive(Debug, Clone)]
pub struct RestOrderGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestOrderGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, ServiceError> {
        Self::new(
            required(&config.order_api_url, "order_api_url")?,
            required(&config.api_key, "api_key")?,
            config.request_timeout(),
        )
    }

    fn orders_url(&self) -> String {
        format!("{}/rest/v1/orders", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

#[async_trait]
impl OrderGateway for RestOrderGateway {
    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn create_order(&self, order: &OrderSubmission) -> Result<CreatedOrder, ServiceError> {
        let payment_status = if order.is_cod() {
            PaymentStatus::CodPending
        } else {
            PaymentStatus::Pending
        };
        let response = self
            .authorized(self.client.post(self.orders_url()))
            .header("Prefer", "return=representation")
            .json(&OrderRow {
                order,
                payment_status,
            })
            .send()
            .await?;

        let rows: Vec<InsertedRow> = ensure_success(response, "order creation")
            .await?
            .json()
            .await?;
        let order_id = match rows.into_iter().next().map(|row| row.id) {
            Some(Value::String(id)) => id,
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(ServiceError::ExternalServiceError(
                    "order creation returned no id".to_string(),
                ))
            }
        };

        info!(%order_id, "order created");
        Ok(CreatedOrder { order_id })
    }

    #[instrument(skip(self))]
    async fn update_payment_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
        payment_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        let response = self
            .authorized(self.client.patch(self.orders_url()))
            .query(&[("id", format!("eq.{order_id}"))])
            .json(&PaymentStatusPatch {
                status: status.into(),
                payment_status: status,
                payment_id,
            })
            .send()
            .await?;

        ensure_success(response, "payment status update").await?;
        info!(order_id, %status, "order payment status updated");
        Ok(())
    }
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    order_id: &'a str,
    amount: i64,
    currency: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(alias = "id")]
    session_id: String,
}

/// Server function that opens a payment-provider order for a placed order.
#[derive(Debug, Clone)]
pub struct RestPaymentSessionGateway {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    key_id: Option<String>,
}

impl RestPaymentSessionGateway {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        key_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
            api_key,
            key_id,
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, ServiceError> {
        Self::new(
            required(&config.payment_session_url, "payment_session_url")?,
            config.api_key.clone(),
            config.payment_key_id.clone(),
            config.request_timeout(),
        )
    }
}

#[async_trait]
impl PaymentSessionGateway for RestPaymentSessionGateway {
    #[instrument(skip(self))]
    async fn create_session(
        &self,
        order_id: &str,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentSession, ServiceError> {
        let mut request = self.client.post(&self.url).json(&SessionRequest {
            order_id,
            amount: amount_minor,
            currency,
        });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = ensure_success(request.send().await?, "payment session creation").await?;
        let SessionResponse { session_id } = response.json().await?;

        info!(order_id, %session_id, "payment session created");
        Ok(PaymentSession {
            session_id,
            order_id: order_id.to_string(),
            amount_minor,
            currency: currency.to_string(),
            key_id: self.key_id.clone(),
        })
    }
}
