use chrono::{Days, Local, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use crate::{
    common::is_valid_postal_code,
    config::ShippingConfig,
    errors::ServiceError,
    models::{DeliveryEstimate, ShippingZone},
};

/// Resolves postal codes to shipping zones and prices delivery.
///
/// Lookup is prefix → state → zone. Anything that misses either table lands in
/// the fallback zone, so every well-formed postal code gets a quote.
#[derive(Debug, Clone)]
pub struct ShippingResolver {
    zones: Vec<ShippingZone>,
    zone_by_state: HashMap<String, usize>,
    state_by_prefix: HashMap<String, String>,
    fallback: usize,
}

impl ShippingResolver {
    pub fn new(config: &ShippingConfig) -> Result<Self, ServiceError> {
        let fallback = config
            .zones
            .iter()
            .position(|zone| zone.id == config.fallback_zone)
            .ok_or_else(|| {
                ServiceError::ConfigError(format!(
                    "fallback zone '{}' is not defined",
                    config.fallback_zone
                ))
            })?;

        let mut zone_by_state = HashMap::new();
        for (index, zone) in config.zones.iter().enumerate() {
            for state in &zone.states {
                zone_by_state.insert(state.to_ascii_uppercase(), index);
            }
        }

        let state_by_prefix = config
            .regions
            .iter()
            .map(|region| (region.prefix.clone(), region.state.to_ascii_uppercase()))
            .collect();

        Ok(Self {
            zones: config.zones.clone(),
            zone_by_state,
            state_by_prefix,
            fallback,
        })
    }

    pub fn fallback_zone(&self) -> &ShippingZone {
        &self.zones[self.fallback]
    }

    /// Zone for a postal code, or `None` when the code is malformed.
    pub fn resolve_zone(&self, postal_code: &str) -> Option<&ShippingZone> {
        let postal_code = postal_code.trim();
        if !is_valid_postal_code(postal_code) {
            return None;
        }

        let prefix = &postal_code[..3];
        let zone = self
            .state_by_prefix
            .get(prefix)
            .and_then(|state| self.zone_by_state.get(state))
            .map(|&index| &self.zones[index]);

        match zone {
            Some(zone) => Some(zone),
            None => {
                debug!(prefix, "postal prefix not mapped, using fallback zone");
                Some(self.fallback_zone())
            }
        }
    }

    /// Shipping fee; zero for malformed codes and for subtotals over the zone's threshold.
    pub fn fee(&self, postal_code: &str, subtotal: Decimal) -> Decimal {
        match self.resolve_zone(postal_code) {
            Some(zone) if zone.ships_free(subtotal) => Decimal::ZERO,
            Some(zone) => zone.fee,
            None => Decimal::ZERO,
        }
    }

    /// Delivery estimate counted from today's local date.
    pub fn estimate(&self, postal_code: &str, subtotal: Decimal) -> Option<DeliveryEstimate> {
        self.estimate_on(postal_code, subtotal, Local::now().date_naive())
    }

    pub fn estimate_on(
        &self,
        postal_code: &str,
        subtotal: Decimal,
        today: NaiveDate,
    ) -> Option<DeliveryEstimate> {
        let zone = self.resolve_zone(postal_code)?;
        let free_shipping = zone.ships_free(subtotal);
        let add_days = |days: u32| {
            today
                .checked_add_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MAX)
        };

        Some(DeliveryEstimate {
            zone_id: zone.id.clone(),
            zone_name: zone.name.clone(),
            days_label: zone.delivery_days.label(),
            shipping_fee: if free_shipping { Decimal::ZERO } else { zone.fee },
            free_shipping,
            earliest: add_days(zone.delivery_days.min),
            latest: add_days(zone.delivery_days.max),
        })
    }
}
