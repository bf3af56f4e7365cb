use rust_decimal::Decimal;

use crate::{
    common::percent_of,
    config::PaymentConfig,
    models::{CodConfig, PaymentMethod, PaymentMethodKind},
};

/// Decides which payment methods an order may use and what COD costs.
#[derive(Debug, Clone)]
pub struct PaymentCalculator {
    methods: Vec<PaymentMethod>,
    cod: CodConfig,
}

impl PaymentCalculator {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            methods: config.methods.clone(),
            cod: config.cod.clone(),
        }
    }

    pub fn method(&self, method_id: &str) -> Option<&PaymentMethod> {
        self.methods.iter().find(|method| method.id == method_id)
    }

    pub fn is_cod(&self, method_id: &str) -> bool {
        self.method(method_id)
            .map_or(false, |method| method.kind == PaymentMethodKind::CashOnDelivery)
    }

    /// Amount within the inclusive COD bounds and, when an allow-list is set,
    /// the postal code on it.
    pub fn is_cod_eligible(&self, amount: Decimal, postal_code: &str) -> bool {
        self.cod.amount_in_bounds(amount) && self.cod.serves_postal_code(postal_code)
    }

    /// COD surcharge. Zero whenever the amount is outside the COD bounds.
    pub fn cod_fee(&self, amount: Decimal) -> Decimal {
        if self.cod.amount_in_bounds(amount) {
            percent_of(amount, self.cod.fee_percent)
        } else {
            Decimal::ZERO
        }
    }

    pub fn is_available(&self, method_id: &str, amount: Decimal, postal_code: &str) -> bool {
        match self.method(method_id) {
            Some(method) if !method.enabled => false,
            Some(method) if method.is_cod() => self.is_cod_eligible(amount, postal_code),
            Some(_) => true,
            None => false,
        }
    }

    /// Enabled methods usable for this amount and destination, in catalogue order.
    pub fn available_methods(&self, amount: Decimal, postal_code: &str) -> Vec<&PaymentMethod> {
        self.methods
            .iter()
            .filter(|method| self.is_available(&method.id, amount, postal_code))
            .collect()
    }
}
