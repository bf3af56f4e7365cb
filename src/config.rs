use chrono::{DateTime, NaiveDate, Utc};
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::common::is_valid_postal_code;
use crate::models::{
    CodConfig, DeliveryDays, DiscountType, PaymentMethod, PaymentMethodKind, PromoCode,
    RegionPrefix, ShippingZone,
};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_STORAGE_BACKEND: &str = "in-memory";
const DEFAULT_STORAGE_PATH: &str = ".checkout";
const DEFAULT_STORAGE_PREFIX: &str = "checkout";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_VERIFICATION_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HOSTED_CHECKOUT_TIMEOUT_SECS: u64 = 900;

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Checkout configuration, constructed once at process entry and handed to
/// the pricing services by reference.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct CheckoutConfig {
    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    pub log_json: bool,

    #[validate]
    pub currency: CurrencyConfig,

    #[validate]
    pub shipping: ShippingConfig,

    /// Promotion catalogue
    pub promotions: Vec<PromoCode>,

    #[validate]
    pub payments: PaymentConfig,

    #[validate]
    pub gateway: GatewayConfig,

    #[validate]
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct CurrencyConfig {
    /// ISO 4217 code sent to the payment gateway
    #[validate(length(equal = 3))]
    pub code: String,
    /// Prefix used in shopper-facing messages
    #[validate(length(min = 1))]
    pub symbol: String,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            code: "INR".to_string(),
            symbol: "₹".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct ShippingConfig {
    #[validate(length(min = 1))]
    pub zones: Vec<ShippingZone>,
    /// Three-digit postal prefix to state code
    pub regions: Vec<RegionPrefix>,
    /// Zone used when a prefix or state is not mapped
    #[validate(length(min = 1))]
    pub fallback_zone: String,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            zones: vec![
                ShippingZone {
                    id: "metro".to_string(),
                    name: "Metro Cities".to_string(),
                    states: ["DL", "MH", "KA", "TN", "WB", "TG"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    delivery_days: DeliveryDays::new(2, 4),
                    fee: dec!(40),
                    free_shipping_threshold: Some(dec!(499)),
                },
                ShippingZone {
                    id: "standard".to_string(),
                    name: "Rest of India".to_string(),
                    states: ["GJ", "RJ", "UP", "MP", "KL", "PB", "HR", "AP", "OR", "BR"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    delivery_days: DeliveryDays::new(4, 6),
                    fee: dec!(60),
                    free_shipping_threshold: Some(dec!(799)),
                },
                ShippingZone {
                    id: "remote".to_string(),
                    name: "North East & Remote Areas".to_string(),
                    states: ["AS", "ML", "MN", "NL", "TR", "AR", "MZ", "SK", "JK", "LA", "AN"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    delivery_days: DeliveryDays::new(6, 10),
                    fee: dec!(100),
                    free_shipping_threshold: Some(dec!(1499)),
                },
            ],
            regions: [
                ("110", "DL"),
                ("400", "MH"),
                ("411", "MH"),
                ("560", "KA"),
                ("600", "TN"),
                ("700", "WB"),
                ("500", "TG"),
                ("380", "GJ"),
                ("302", "RJ"),
                ("226", "UP"),
                ("462", "MP"),
                ("682", "KL"),
                ("160", "PB"),
                ("751", "OR"),
                ("800", "BR"),
                ("781", "AS"),
                ("793", "ML"),
                ("190", "JK"),
                ("744", "AN"),
            ]
            .iter()
            .map(|(prefix, state)| RegionPrefix::new(*prefix, *state))
            .collect(),
            fallback_zone: "remote".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct PaymentConfig {
    #[validate(length(min = 1))]
    pub methods: Vec<PaymentMethod>,
    pub cod: CodConfig,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            methods: vec![
                PaymentMethod {
                    id: "online".to_string(),
                    display_name: "Pay Online".to_string(),
                    kind: PaymentMethodKind::Online,
                    description: Some("UPI, cards, net banking and wallets".to_string()),
                    enabled: true,
                },
                PaymentMethod {
                    id: "cod".to_string(),
                    display_name: "Cash on Delivery".to_string(),
                    kind: PaymentMethodKind::CashOnDelivery,
                    description: Some("Pay when your snacks arrive".to_string()),
                    enabled: true,
                },
                PaymentMethod {
                    id: "bank_transfer".to_string(),
                    display_name: "Bank Transfer".to_string(),
                    kind: PaymentMethodKind::DirectTransfer,
                    description: None,
                    enabled: false,
                },
            ],
            cod: CodConfig {
                min_amount: dec!(99),
                max_amount: dec!(10000),
                fee_percent: dec!(2),
                allowed_postal_codes: Vec::new(),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Base URL of the hosted backend's REST API
    #[validate(url)]
    pub order_api_url: Option<String>,
    /// Public API key for the hosted backend
    pub api_key: Option<String>,
    /// Endpoint that issues payment-gateway order ids
    #[validate(url)]
    pub payment_session_url: Option<String>,
    /// Publishable key passed to the hosted checkout
    pub payment_key_id: Option<String>,
    /// Shared secret for payment signatures; server-side deployments only
    pub signature_secret: Option<String>,
    #[validate(range(min = 1, max = 120))]
    pub request_timeout_secs: u64,
    #[validate(range(min = 1, max = 120))]
    pub verification_timeout_secs: u64,
    #[validate(range(min = 30, max = 3600))]
    pub hosted_checkout_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            order_api_url: None,
            api_key: None,
            payment_session_url: None,
            payment_key_id: None,
            signature_secret: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            verification_timeout_secs: DEFAULT_VERIFICATION_TIMEOUT_SECS,
            hosted_checkout_timeout_secs: DEFAULT_HOSTED_CHECKOUT_TIMEOUT_SECS,
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.verification_timeout_secs)
    }

    pub fn hosted_checkout_timeout(&self) -> Duration {
        Duration::from_secs(self.hosted_checkout_timeout_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// "in-memory" or "file"
    #[validate(custom = "validate_storage_backend")]
    pub backend: String,
    /// Directory for the file backend
    pub path: String,
    #[validate(length(min = 1))]
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_STORAGE_BACKEND.to_string(),
            path: DEFAULT_STORAGE_PATH.to_string(),
            key_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
        }
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENV.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            currency: CurrencyConfig::default(),
            shipping: ShippingConfig::default(),
            promotions: default_promotions(),
            payments: PaymentConfig::default(),
            gateway: GatewayConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

fn utc_midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn default_promotions() -> Vec<PromoCode> {
    let valid_from = utc_midnight(2025, 1, 1);
    let valid_until = utc_midnight(2027, 12, 31);

    vec![
        PromoCode {
            code: "WELCOME10".to_string(),
            description: Some("10% off your first order".to_string()),
            discount_type: DiscountType::Percentage,
            value: dec!(10),
            min_order_value: Some(dec!(299)),
            max_discount: Some(dec!(150)),
            valid_from,
            valid_until,
            usage_limit: None,
            used_count: 0,
            first_order_only: true,
            applicable_products: Vec::new(),
            enabled: true,
        },
        PromoCode {
            code: "SNACK50".to_string(),
            description: Some("Flat ₹50 off".to_string()),
            discount_type: DiscountType::Fixed,
            value: dec!(50),
            min_order_value: Some(dec!(499)),
            max_discount: None,
            valid_from,
            valid_until,
            usage_limit: None,
            used_count: 0,
            first_order_only: false,
            applicable_products: Vec::new(),
            enabled: true,
        },
        PromoCode {
            code: "FREESHIP".to_string(),
            description: Some("Free delivery".to_string()),
            discount_type: DiscountType::FreeShipping,
            value: Decimal::ZERO,
            min_order_value: Some(dec!(299)),
            max_discount: None,
            valid_from,
            valid_until,
            usage_limit: None,
            used_count: 0,
            first_order_only: false,
            applicable_products: Vec::new(),
            enabled: true,
        },
        PromoCode {
            code: "CRUNCH20".to_string(),
            description: Some("20% off the crunch range".to_string()),
            discount_type: DiscountType::Percentage,
            value: dec!(20),
            min_order_value: None,
            max_discount: Some(dec!(200)),
            valid_from,
            valid_until,
            usage_limit: Some(500),
            used_count: 0,
            first_order_only: false,
            applicable_products: vec![
                "masala-crunch".to_string(),
                "peri-peri-crunch".to_string(),
            ],
            enabled: true,
        },
    ]
}

impl CheckoutConfig {
    /// Full validation: field rules plus catalogue consistency.
    pub fn validate_all(&self) -> Result<(), ValidationErrors> {
        self.validate()?;
        self.validate_additional_constraints()
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(err) = validate_shipping_catalogue(&self.shipping) {
            errors.add("shipping", err);
        }
        if let Err(err) = validate_promotions(&self.promotions) {
            errors.add("promotions", err);
        }
        if let Err(err) = validate_payments(&self.payments) {
            errors.add("payments", err);
        }
        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn config_error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn validate_shipping_catalogue(shipping: &ShippingConfig) -> Result<(), ValidationError> {
    if !shipping.zones.iter().any(|z| z.id == shipping.fallback_zone) {
        return Err(config_error(
            "fallback_zone",
            format!("fallback zone '{}' is not defined", shipping.fallback_zone),
        ));
    }

    let mut zone_ids = HashSet::new();
    let mut owner: HashMap<String, &str> = HashMap::new();
    for zone in &shipping.zones {
        if !zone_ids.insert(zone.id.as_str()) {
            return Err(config_error(
                "zones",
                format!("zone id '{}' is defined twice", zone.id),
            ));
        }
        if zone.delivery_days.min > zone.delivery_days.max {
            return Err(config_error(
                "delivery_days",
                format!("zone '{}' has min delivery days above max", zone.id),
            ));
        }
        if zone.fee.is_sign_negative() {
            return Err(config_error(
                "fee",
                format!("zone '{}' has a negative fee", zone.id),
            ));
        }
        for state in &zone.states {
            if let Some(other) = owner.insert(state.to_ascii_uppercase(), zone.id.as_str()) {
                return Err(config_error(
                    "states",
                    format!(
                        "state '{}' is mapped to both '{}' and '{}'",
                        state, other, zone.id
                    ),
                ));
            }
        }
    }

    let mut prefixes = HashSet::new();
    for region in &shipping.regions {
        if region.prefix.len() != 3 || !is_valid_postal_code(&format!("{}000", region.prefix)) {
            return Err(config_error(
                "regions",
                format!("'{}' is not a three-digit postal prefix", region.prefix),
            ));
        }
        if !prefixes.insert(region.prefix.as_str()) {
            return Err(config_error(
                "regions",
                format!("prefix '{}' is mapped twice", region.prefix),
            ));
        }
        if region.state.trim().is_empty() {
            return Err(config_error(
                "regions",
                format!("prefix '{}' has no state", region.prefix),
            ));
        }
    }

    Ok(())
}

fn validate_promotions(promotions: &[PromoCode]) -> Result<(), ValidationError> {
    let mut codes = HashSet::new();
    for promo in promotions {
        if promo.code.trim().is_empty() {
            return Err(config_error("code", "promo code cannot be blank".to_string()));
        }
        if !codes.insert(promo.code.to_ascii_uppercase()) {
            return Err(config_error(
                "code",
                format!("promo code '{}' is defined twice", promo.code),
            ));
        }
        if promo.valid_from > promo.valid_until {
            return Err(config_error(
                "validity",
                format!("promo '{}' ends before it starts", promo.code),
            ));
        }
        if promo.value.is_sign_negative() {
            return Err(config_error(
                "value",
                format!("promo '{}' has a negative value", promo.code),
            ));
        }
        if promo.discount_type == DiscountType::Percentage && promo.value > Decimal::ONE_HUNDRED
        {
            return Err(config_error(
                "value",
                format!("promo '{}' discounts more than 100%", promo.code),
            ));
        }
    }
    Ok(())
}

fn validate_payments(payments: &PaymentConfig) -> Result<(), ValidationError> {
    let mut ids = HashSet::new();
    for method in &payments.methods {
        if !ids.insert(method.id.as_str()) {
            return Err(config_error(
                "methods",
                format!("payment method '{}' is defined twice", method.id),
            ));
        }
    }
    let cod_methods = payments.methods.iter().filter(|m| m.is_cod()).count();
    if cod_methods > 1 {
        return Err(config_error(
            "methods",
            "only one cash-on-delivery method may be configured".to_string(),
        ));
    }
    if payments.cod.min_amount > payments.cod.max_amount {
        return Err(config_error(
            "cod",
            "COD minimum amount is above the maximum".to_string(),
        ));
    }
    if payments.cod.fee_percent.is_sign_negative() {
        return Err(config_error("cod", "COD fee cannot be negative".to_string()));
    }
    Ok(())
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_storage_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "in-memory" | "file" => Ok(()),
        _ => {
            let mut err = ValidationError::new("backend");
            err.message = Some("Must be one of: in-memory, file".into());
            Err(err)
        }
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("snackstore_checkout={},checkout_quote={}", level, level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads checkout configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults (`CheckoutConfig::default()`)
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<CheckoutConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; using built-in defaults and environment",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let checkout_config: CheckoutConfig = config.try_deserialize()?;

    checkout_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    checkout_config
        .validate_additional_constraints()
        .map_err(|e| {
            error!("Catalogue validation failed: {:?}", e);
            AppConfigError::Validation(e)
        })?;

    info!(
        zones = checkout_config.shipping.zones.len(),
        promotions = checkout_config.promotions.len(),
        "Configuration loaded successfully"
    );
    Ok(checkout_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalogue_is_valid() {
        let cfg = CheckoutConfig::default();
        assert!(cfg.validate_all().is_ok());
    }

    #[test]
    fn missing_fallback_zone_is_rejected() {
        let mut cfg = CheckoutConfig::default();
        cfg.shipping.fallback_zone = "moon".to_string();
        let errors = cfg.validate_all().unwrap_err();
        assert!(errors.field_errors().contains_key("shipping"));
    }

    #[test]
    fn state_in_two_zones_is_rejected() {
        let mut cfg = CheckoutConfig::default();
        cfg.shipping.zones[1].states.push("KA".to_string());
        assert!(cfg.validate_all().is_err());
    }

    #[test]
    fn inverted_delivery_days_are_rejected() {
        let mut cfg = CheckoutConfig::default();
        cfg.shipping.zones[0].delivery_days = DeliveryDays::new(5, 2);
        assert!(cfg.validate_all().is_err());
    }

    #[test]
    fn prefix_with_leading_zero_is_rejected() {
        let mut cfg = CheckoutConfig::default();
        cfg.shipping.regions.push(RegionPrefix::new("012", "KA"));
        assert!(cfg.validate_all().is_err());
    }

    #[test]
    fn duplicate_promo_codes_ignore_case() {
        let mut cfg = CheckoutConfig::default();
        let mut dup = cfg.promotions[0].clone();
        dup.code = dup.code.to_lowercase();
        cfg.promotions.push(dup);
        let errors = cfg.validate_all().unwrap_err();
        assert!(errors.field_errors().contains_key("promotions"));
    }

    #[test]
    fn inverted_cod_bounds_are_rejected() {
        let mut cfg = CheckoutConfig::default();
        cfg.payments.cod.min_amount = dec!(20000);
        assert!(cfg.validate_all().is_err());
    }

    #[test]
    fn unknown_storage_backend_is_rejected() {
        let mut cfg = CheckoutConfig::default();
        cfg.storage.backend = "redis".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let mut cfg = CheckoutConfig::default();
        cfg.log_level = "verbose".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_sections_fall_back_to_defaults() {
        let cfg: CheckoutConfig = Config::builder()
            .add_source(config::File::from_str(
                r#"
                    environment = "staging"

                    [storage]
                    backend = "file"

                    [payments.cod]
                    min_amount = 149
                    max_amount = 5000
                    fee_percent = 3
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.environment, "staging");
        assert_eq!(cfg.storage.backend, "file");
        assert_eq!(cfg.storage.key_prefix, DEFAULT_STORAGE_PREFIX);
        assert_eq!(cfg.payments.cod.min_amount, dec!(149));
        assert_eq!(cfg.payments.methods.len(), 3);
        assert_eq!(cfg.shipping.fallback_zone, "remote");
        assert!(cfg.validate_all().is_ok());
    }
}
