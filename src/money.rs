//! Fixed-point money helpers. `rust_decimal::Decimal` is used everywhere a
//! monetary amount is computed or compared; binary floating point never
//! appears in this crate.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round to 2 fractional digits using banker's rounding (round-half-to-even),
/// the strategy every settlement and commission computation uses.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_to_even() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.00));
        assert_eq!(round_money(dec!(1.015)), dec!(1.02));
    }
}
