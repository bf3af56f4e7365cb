mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use common::{complete_address, small_cart, snack_cart, Harness, ShopperAction};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use snackstore_checkout::{
    errors::ServiceError,
    models::{Address, OrderStatus, PaymentStatus},
    services::commerce::{
        CheckoutSnapshot, CheckoutStep, CheckoutWizard, Direction, PromoRejection,
        PromoUsageStore, StepValidationError,
    },
    storage::CheckoutStore,
};

async fn open_wizard(harness: &Harness, session: &str) -> CheckoutWizard {
    CheckoutWizard::restore(harness.wizard_services(), session, snack_cart(), false).await
}

/// Walks a fresh checkout up to the Review step.
async fn wizard_at_review(harness: &Harness, session: &str, method: &str) -> CheckoutWizard {
    let mut wizard = open_wizard(harness, session).await;
    wizard.update_shipping(complete_address()).await;
    wizard.next().await.expect("shipping step is complete");
    wizard.select_payment_method(method).await;
    wizard.next().await.expect("payment step is complete");
    assert_eq!(wizard.step(), CheckoutStep::Review);
    wizard
}

#[tokio::test]
async fn empty_phone_blocks_shipping_step() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = open_wizard(&harness, "sess-phone").await;

    wizard
        .update_shipping(Address {
            phone: String::new(),
            ..complete_address()
        })
        .await;
    let err = wizard.next().await.unwrap_err();
    assert_eq!(
        err,
        StepValidationError::MissingShippingFields(vec!["phone".to_string()])
    );
    assert_eq!(wizard.step(), CheckoutStep::Shipping);

    wizard.update_shipping(complete_address()).await;
    assert_eq!(wizard.next().await.unwrap(), CheckoutStep::Payment);
    assert_eq!(wizard.state().direction, Direction::Forward);
}

#[tokio::test]
async fn shipping_quote_follows_postal_code_and_cart() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard =
        CheckoutWizard::restore(harness.wizard_services(), "sess-quote", small_cart(), false)
            .await;
    assert!(wizard.state().shipping_quote.is_none());

    wizard
        .update_shipping(Address {
            postal_code: "781001".to_string(),
            ..complete_address()
        })
        .await;
    let quote = wizard.state().shipping_quote.clone().unwrap();
    assert_eq!(quote.zone_id, "remote");
    assert_eq!(wizard.state().shipping_fee(), dec!(100));

    // over the remote zone's free-shipping threshold
    let mut big = snack_cart();
    big.items[0].quantity = 10;
    wizard.set_cart(big).await;
    assert_eq!(wizard.state().shipping_fee(), Decimal::ZERO);
    assert_eq!(wizard.totals().shipping_fee, Decimal::ZERO);
}

#[tokio::test]
async fn progress_survives_a_reload() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = open_wizard(&harness, "sess-reload").await;

    let shipping = complete_address();
    let billing = Address {
        name: "Rao Traders".to_string(),
        city: "Mysuru".to_string(),
        postal_code: "570001".to_string(),
        ..complete_address()
    };
    wizard.update_shipping(shipping.clone()).await;
    wizard.set_billing_same_as_shipping(false).await;
    wizard.update_billing(billing.clone()).await;
    wizard.next().await.unwrap();
    wizard.select_payment_method("online").await;
    wizard.set_promo_input("snack50").await;
    let applied = wizard.apply_promo().await.unwrap();
    assert_eq!(applied.discount, dec!(50));
    let before = wizard.state().clone();
    let totals_before = wizard.totals();
    drop(wizard);

    let restored = open_wizard(&harness, "sess-reload").await;
    let after = restored.state();
    assert_eq!(after.step, CheckoutStep::Payment);
    assert_eq!(after.shipping_address, shipping);
    assert_eq!(after.billing_address, billing);
    assert!(!after.billing_same_as_shipping);
    assert_eq!(after.payment_method.as_deref(), Some("online"));
    assert_eq!(after.promo_input, "snack50");
    assert_eq!(after.applied_promo, before.applied_promo);
    // derived again on restore, not read back from storage
    assert_eq!(after.shipping_quote, before.shipping_quote);
    assert_eq!(restored.totals(), totals_before);
}

#[tokio::test]
async fn unreadable_snapshot_starts_fresh() {
    let harness = Harness::new(ShopperAction::Pay);
    harness
        .store
        .set("checkout:sess-corrupt", "{\"version\": 1, \"state\": 42}")
        .await
        .unwrap();

    let wizard = open_wizard(&harness, "sess-corrupt").await;
    assert_eq!(wizard.step(), CheckoutStep::Shipping);
    assert_eq!(wizard.state().shipping_address, Address::default());
}

#[tokio::test]
async fn every_change_is_persisted() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = open_wizard(&harness, "sess-persist").await;
    wizard.set_promo_input("FREESHIP").await;

    let raw = harness
        .store
        .get(wizard.storage_key())
        .await
        .unwrap()
        .expect("snapshot written");
    let snapshot = CheckoutSnapshot::from_json(&raw).unwrap();
    assert_eq!(snapshot.state.promo_input, "FREESHIP");
    assert_eq!(wizard.storage_key(), "checkout:sess-persist");
}

#[tokio::test]
async fn cart_change_drops_promo_that_no_longer_applies() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = open_wizard(&harness, "sess-cart").await;
    wizard.update_shipping(complete_address()).await;
    wizard.set_promo_input("SNACK50").await;
    wizard.apply_promo().await.unwrap();
    assert_eq!(wizard.totals().discount, dec!(50));

    wizard.set_cart(small_cart()).await;
    assert!(wizard.state().applied_promo.is_none());
    assert_eq!(wizard.totals().discount, Decimal::ZERO);
}

#[tokio::test]
async fn rejected_promo_keeps_previous_one() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = open_wizard(&harness, "sess-promo").await;
    wizard.set_promo_input("FREESHIP").await;
    wizard.apply_promo().await.unwrap();

    wizard.set_promo_input("WELCOME10").await;
    assert_eq!(
        wizard.apply_promo().await.unwrap_err(),
        PromoRejection::FirstOrderOnly
    );
    assert_eq!(
        wizard.state().applied_promo.as_ref().map(|p| p.code.as_str()),
        Some("FREESHIP")
    );

    wizard.remove_promo().await;
    assert!(wizard.state().applied_promo.is_none());
    assert!(wizard.state().promo_input.is_empty());
}

#[tokio::test]
async fn promo_window_follows_the_checkout_clock() {
    let after_window = Utc.with_ymd_and_hms(2028, 1, 2, 9, 0, 0).unwrap();
    let harness = Harness::new(ShopperAction::Pay).at(after_window);
    let mut wizard = open_wizard(&harness, "sess-clock").await;

    wizard.set_promo_input("FREESHIP").await;
    assert_eq!(wizard.apply_promo().await.unwrap_err(), PromoRejection::Expired);
    assert!(wizard.state().applied_promo.is_none());
}

#[tokio::test]
async fn exhausted_promo_cannot_be_applied() {
    let harness = Harness::new(ShopperAction::Pay);
    let promo = harness
        .pricing
        .promotions()
        .find("CRUNCH20")
        .cloned()
        .unwrap();
    while harness.promo_usage.redeem(&promo).await.is_ok() {}

    let mut wizard = open_wizard(&harness, "sess-exhausted").await;
    wizard.set_promo_input("CRUNCH20").await;
    assert_eq!(
        wizard.apply_promo().await.unwrap_err(),
        PromoRejection::LimitReached
    );
    assert!(wizard.state().applied_promo.is_none());
}

#[tokio::test]
async fn promo_used_up_before_submission_sends_shopper_back_to_review() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = wizard_at_review(&harness, "sess-last-use", "online").await;
    wizard.set_promo_input("CRUNCH20").await;
    wizard.apply_promo().await.unwrap();

    // other shoppers take the remaining uses
    let promo = wizard.state().applied_promo.clone().unwrap().promo;
    while harness.promo_usage.redeem(&promo).await.is_ok() {}

    let err = wizard.place_order().await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(ref msg) if msg.contains("usage limit"));
    assert!(!err.is_retryable());
    assert_eq!(wizard.step(), CheckoutStep::Review);
    assert!(wizard.state().applied_promo.is_none());
    assert_eq!(harness.orders.created_count(), 0);

    let placed = wizard.place_order().await.unwrap();
    assert_eq!(placed.totals.discount, Decimal::ZERO);
    assert_eq!(placed.status, OrderStatus::Paid);
}

#[tokio::test]
async fn cancelled_order_placement_can_be_retried() {
    let harness = Harness::new(ShopperAction::Walk);
    let mut wizard = wizard_at_review(&harness, "sess-cancel", "online").await;
    wizard.set_promo_input("CRUNCH20").await;
    let promo = wizard.apply_promo().await.unwrap().promo;

    let cancelled =
        tokio::time::timeout(Duration::from_millis(20), wizard.place_order()).await;
    assert!(cancelled.is_err());
    assert!(!wizard.is_processing());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.promo_usage.used_count(&promo).await.unwrap(), 0);

    // runs into the hosted checkout timeout instead of a stuck submission
    assert_matches!(wizard.place_order().await, Err(ServiceError::Timeout(_)));
    assert!(!wizard.is_processing());
    assert_eq!(harness.promo_usage.used_count(&promo).await.unwrap(), 0);
}

#[tokio::test]
async fn edit_links_jump_back_and_return() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = wizard_at_review(&harness, "sess-edit", "online").await;

    assert_eq!(
        wizard.go_to(CheckoutStep::Shipping).await.unwrap(),
        CheckoutStep::Shipping
    );
    assert_eq!(wizard.state().direction, Direction::Backward);

    assert_eq!(
        wizard.go_to(CheckoutStep::Review).await.unwrap(),
        CheckoutStep::Review
    );
    assert_eq!(wizard.back().await.unwrap(), CheckoutStep::Payment);
}

#[tokio::test]
async fn cod_order_is_placed_and_snapshot_cleared() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = wizard_at_review(&harness, "sess-cod", "cod").await;

    let totals = wizard.totals();
    assert_eq!(totals.shipping_fee, Decimal::ZERO);
    assert_eq!(totals.cod_fee, dec!(16));
    assert_eq!(totals.total, dec!(815));

    let placed = wizard.place_order().await.unwrap();
    assert_eq!(placed.status, OrderStatus::CodPending);
    assert_eq!(placed.totals.total, dec!(815));
    assert!(placed.payment_id.is_none());
    assert!(placed.order_number.starts_with("ORD-"));

    assert!(harness.store.is_empty());
    assert_eq!(wizard.step(), CheckoutStep::Shipping);
    assert!(!wizard.is_processing());
    assert_eq!(harness.orders.last_status(), Some(PaymentStatus::CodPending));
    assert!(harness.hosted.last_session().is_none());

    let created = harness.orders.created.lock().unwrap();
    assert_eq!(created[0].shipping_zone.as_deref(), Some("metro"));
    assert_eq!(created[0].billing_address, complete_address());
    assert_eq!(created[0].items.len(), 2);
}

#[tokio::test]
async fn online_order_is_paid_after_verification() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = wizard_at_review(&harness, "sess-online", "online").await;
    wizard.set_promo_input("crunch20").await;
    assert_eq!(wizard.apply_promo().await.unwrap().discount, dec!(160));

    let placed = wizard.place_order().await.unwrap();
    assert_eq!(placed.status, OrderStatus::Paid);
    assert_eq!(placed.totals.total, dec!(639));
    assert_eq!(placed.payment_id.as_deref(), Some("pay_order_1"));

    let session = harness.hosted.last_session().unwrap();
    assert_eq!(session.amount_minor, 63900);
    assert_eq!(session.currency, "INR");
    assert_eq!(harness.orders.last_status(), Some(PaymentStatus::Paid));
    assert!(harness.store.is_empty());

    let promo = harness.pricing.promotions().find("CRUNCH20").unwrap();
    assert_eq!(harness.promo_usage.used_count(promo).await.unwrap(), 1);
}

#[tokio::test]
async fn dismissed_payment_can_be_retried() {
    let harness = Harness::new(ShopperAction::Dismiss);
    let mut wizard = wizard_at_review(&harness, "sess-dismiss", "online").await;

    let err = wizard.place_order().await.unwrap_err();
    assert_matches!(err, ServiceError::PaymentCancelled(_));
    assert!(err.is_retryable());
    assert!(!wizard.is_processing());
    assert_eq!(wizard.step(), CheckoutStep::Confirm);
    assert_eq!(harness.orders.last_status(), Some(PaymentStatus::Failed));
    // still resumable
    assert!(!harness.store.is_empty());

    // a retry submits again instead of reporting a conflict
    assert_matches!(
        wizard.place_order().await,
        Err(ServiceError::PaymentCancelled(_))
    );
    assert_eq!(harness.orders.created_count(), 2);
}

#[tokio::test]
async fn unverified_signature_is_a_payment_failure() {
    let harness = Harness::new(ShopperAction::PayWithBadSignature);
    let mut wizard = wizard_at_review(&harness, "sess-forged", "online").await;

    assert_matches!(
        wizard.place_order().await,
        Err(ServiceError::PaymentFailed(_))
    );
    assert!(!wizard.is_processing());
    assert_eq!(harness.orders.last_status(), Some(PaymentStatus::Failed));
}

#[tokio::test]
async fn order_cannot_be_placed_before_review() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = open_wizard(&harness, "sess-early").await;
    wizard.update_shipping(complete_address()).await;

    assert_matches!(
        wizard.place_order().await,
        Err(ServiceError::InvalidOperation(_))
    );
    assert_eq!(harness.orders.created_count(), 0);
}

#[tokio::test]
async fn stale_cod_choice_bounces_back_to_payment() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = wizard_at_review(&harness, "sess-bounce", "cod").await;

    // ₹50 is below the COD minimum
    wizard.set_cart(small_cart()).await;
    assert_matches!(
        wizard.place_order().await,
        Err(ServiceError::ValidationError(msg)) if msg.contains("Cash on delivery")
    );
    assert_eq!(wizard.step(), CheckoutStep::Payment);
    assert_eq!(wizard.state().direction, Direction::Backward);
    assert_eq!(harness.orders.created_count(), 0);
}

#[tokio::test]
async fn abandon_clears_progress() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = wizard_at_review(&harness, "sess-abandon", "online").await;
    assert!(!harness.store.is_empty());

    wizard.abandon().await;
    assert!(harness.store.is_empty());
    assert_eq!(wizard.step(), CheckoutStep::Shipping);

    let fresh = open_wizard(&harness, "sess-abandon").await;
    assert_eq!(fresh.state().payment_method, None);
}

#[tokio::test]
async fn cod_is_listed_only_when_eligible() {
    let harness = Harness::new(ShopperAction::Pay);
    let mut wizard = open_wizard(&harness, "sess-methods").await;
    wizard.update_shipping(complete_address()).await;

    let ids: Vec<_> = wizard
        .available_payment_methods()
        .into_iter()
        .map(|m| m.id.clone())
        .collect();
    assert_eq!(ids, vec!["online", "cod"]);

    wizard.set_cart(small_cart()).await;
    let ids: Vec<_> = wizard
        .available_payment_methods()
        .into_iter()
        .map(|m| m.id.clone())
        .collect();
    assert_eq!(ids, vec!["online"]);
}
