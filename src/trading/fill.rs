//! Fill simulation: stochastic execution with adverse slippage.

use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Highest price a simulated fill can reach.
pub const MAX_EFFECTIVE_PRICE: Decimal = dec!(0.99);

/// Decides whether a sized BUY executes and at what price.
#[derive(Debug, Clone)]
pub struct FillSimulator {
    fill_rate: f64,
    slippage_pct: Decimal,
}

impl FillSimulator {
    pub fn new(fill_rate: f64, slippage_pct: Decimal) -> Self {
        Self {
            fill_rate: fill_rate.clamp(0.0, 1.0),
            slippage_pct,
        }
    }

    /// Slippage-adjusted BUY price, capped at `MAX_EFFECTIVE_PRICE`.
    pub fn effective_price(&self, entry_price: Decimal) -> Decimal {
        (entry_price * (Decimal::ONE + self.slippage_pct)).min(MAX_EFFECTIVE_PRICE)
    }

    /// Draw a fill. Returns the effective price, or `None` if the order
    /// would not have executed.
    pub fn simulate<R: Rng>(&self, entry_price: Decimal, rng: &mut R) -> Option<Decimal> {
        rng.gen_bool(self.fill_rate)
            .then(|| self.effective_price(entry_price))
    }
}
