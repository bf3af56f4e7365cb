/// Money helpers shared by the pricing services
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

/// Six digits, no leading zero.
static POSTAL_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9][0-9]{5}$").expect("postal code pattern compiles"));

/// Rounds to whole currency units, halves away from zero.
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount * percent / 100`, rounded to whole units.
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    round_amount(amount * percent / Decimal::ONE_HUNDRED)
}

/// Formats an amount for display, e.g. `₹499` or `₹149.5`.
pub fn format_amount(symbol: &str, amount: Decimal) -> String {
    format!("{}{}", symbol, amount.normalize())
}

pub fn is_valid_postal_code(postal_code: &str) -> bool {
    POSTAL_CODE_RE.is_match(postal_code)
}
