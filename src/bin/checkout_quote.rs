use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use rust_decimal::Decimal;
use serde::Serialize;
use snackstore_checkout::{
    common::format_amount,
    config,
    services::commerce::{PricingEngine, Quote, QuoteRequest},
};
use tracing::debug;

/// Prints the checkout price breakdown for a destination and cart value.
#[derive(Parser, Debug)]
#[command(name = "checkout-quote", version, about)]
struct Cli {
    /// Six-digit destination PIN code
    #[arg(long)]
    postal_code: String,
    /// Cart subtotal in major currency units
    #[arg(long)]
    subtotal: Decimal,
    /// Promo code to apply
    #[arg(long)]
    promo: Option<String>,
    /// Payment method id (e.g. online, cod)
    #[arg(long)]
    payment_method: Option<String>,
    /// Treat the shopper as placing their first order
    #[arg(long, action = ArgAction::SetTrue)]
    first_order: bool,
    /// Product id in the cart; repeat for several
    #[arg(long = "product")]
    products: Vec<String>,
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Render the quote as pretty JSON"
    )]
    json: bool,
}

#[derive(Serialize)]
struct QuoteOutput<'a> {
    postal_code: &'a str,
    currency: &'a str,
    #[serde(flatten)]
    quote: &'a Quote,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config().context("failed to load checkout config")?;
    config::init_tracing(&config.log_level, config.log_json);

    let engine = PricingEngine::new(&config).context("invalid pricing configuration")?;
    let request = QuoteRequest {
        subtotal: cli.subtotal,
        postal_code: cli.postal_code.trim().to_string(),
        promo_code: cli.promo.clone(),
        payment_method: cli.payment_method.clone(),
        is_first_order: cli.first_order,
        product_ids: cli.products.clone(),
    };
    debug!(?request, "computing quote");
    let quote = engine.quote(&request);

    if cli.json {
        let output = QuoteOutput {
            postal_code: &request.postal_code,
            currency: &engine.currency().code,
            quote: &quote,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_quote(&engine.currency().symbol, &request, &quote);
    Ok(())
}

fn print_quote(symbol: &str, request: &QuoteRequest, quote: &Quote) {
    let money = |amount: Decimal| format_amount(symbol, amount);

    match &quote.delivery_estimate {
        Some(estimate) => {
            println!("Zone:      {} ({})", estimate.zone_name, estimate.zone_id);
            println!(
                "Delivery:  {} ({})",
                estimate.days_label,
                estimate.date_range_label()
            );
        }
        None => println!("Zone:      invalid PIN code '{}'", request.postal_code),
    }

    if let Some(applied) = &quote.applied_promo {
        println!("Promo:     {} - {}", applied.code, applied.message);
    }
    if let Some(rejection) = &quote.promo_rejection {
        println!("Promo:     rejected - {rejection}");
    }

    let totals = &quote.totals;
    println!("Subtotal:  {}", money(totals.subtotal));
    println!("Discount: -{}", money(totals.discount));
    println!("Shipping:  {}", money(totals.shipping_fee));
    println!("COD fee:   {}", money(totals.cod_fee));
    println!("Total:     {}", money(totals.total));

    let methods: Vec<_> = quote
        .available_methods
        .iter()
        .map(|method| method.display_name.as_str())
        .collect();
    println!("Payment:   {}", methods.join(", "));
}
