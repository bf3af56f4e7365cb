//! Snack Store checkout
//!
//! Pricing and eligibility rules for the storefront checkout (shipping zones,
//! promo codes, cash-on-delivery), the four-step checkout wizard that
//! persists its progress, and the hand-off to the order backend and payment
//! provider.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod common;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;
pub mod storage;

pub use config::CheckoutConfig;
pub use errors::ServiceError;
pub use services::commerce::{CheckoutWizard, PricingEngine};
