use std::sync::Arc;

use crate::{
    config::CheckoutConfig,
    errors::ServiceError,
    services::{
        commerce::{
            system_clock, InMemoryPromoUsage, OrderSubmissionService, PricingEngine,
            PromoUsageStore, SubmissionTimeouts, WizardServices,
        },
        gateway::{
            HmacSignatureVerifier, HostedCheckout, RestOrderGateway, RestPaymentSessionGateway,
        },
    },
    storage::{self, CheckoutStore},
};

/// Builds the checkout services from one configuration.
pub struct ServiceFactory {
    config: Arc<CheckoutConfig>,
    pricing: Arc<PricingEngine>,
    promo_usage: Arc<dyn PromoUsageStore>,
}

impl ServiceFactory {
    pub fn new(config: Arc<CheckoutConfig>) -> Result<Self, ServiceError> {
        let pricing = Arc::new(PricingEngine::new(&config)?);
        Ok(Self {
            config,
            pricing,
            promo_usage: Arc::new(InMemoryPromoUsage::new()),
        })
    }

    /// Replaces the process-local promo counter with a shared one.
    pub fn with_promo_usage(mut self, promo_usage: Arc<dyn PromoUsageStore>) -> Self {
        self.promo_usage = promo_usage;
        self
    }

    pub fn config(&self) -> &Arc<CheckoutConfig> {
        &self.config
    }

    pub fn pricing_engine(&self) -> Arc<PricingEngine> {
        self.pricing.clone()
    }

    pub fn checkout_store(&self) -> Result<Arc<dyn CheckoutStore>, ServiceError> {
        Ok(storage::from_config(&self.config.storage)?)
    }

    /// Submission service backed by the REST gateways and local signature checks.
    pub fn submission_service(
        &self,
        hosted_checkout: Arc<dyn HostedCheckout>,
    ) -> Result<OrderSubmissionService, ServiceError> {
        let gateway = &self.config.gateway;
        Ok(OrderSubmissionService::new(
            Arc::new(RestOrderGateway::from_config(gateway)?),
            Arc::new(RestPaymentSessionGateway::from_config(gateway)?),
            hosted_checkout,
            Arc::new(HmacSignatureVerifier::from_config(gateway)?),
            self.promo_usage.clone(),
            SubmissionTimeouts::from(gateway),
        ))
    }

    pub fn wizard_services(
        &self,
        hosted_checkout: Arc<dyn HostedCheckout>,
    ) -> Result<WizardServices, ServiceError> {
        Ok(WizardServices {
            pricing: self.pricing_engine(),
            store: self.checkout_store()?,
            submission: Arc::new(self.submission_service(hosted_checkout)?),
            key_prefix: self.config.storage.key_prefix.clone(),
            clock: system_clock(),
        })
    }
}
