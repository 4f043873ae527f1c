//! Per-model token pricing and cost estimation.
//!
//! Rates are held as integer nano-dollars per token so that the estimate for
//! a given `(tokens, model)` pair is exact and reproducible. The table is
//! built once from configuration and only read afterwards.

use std::collections::BTreeMap;

/// Nano-dollars per US dollar.
const NANOS_PER_USD: u64 = 1_000_000_000;

/// Default price of the reference model (`gpt-4o-mini`): 1.50 USD per
/// million tokens, i.e. 1 500 nano-dollars per token.
pub const DEFAULT_NANO_USD_PER_TOKEN: u64 = 1_500;

/// Read-only mapping from model identifier to per-token price.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTable {
    rates: BTreeMap<String, u64>,
    default_rate: u64,
}

impl Default for RateTable {
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert("gpt-4o-mini".to_string(), DEFAULT_NANO_USD_PER_TOKEN);
        Self {
            rates,
            default_rate: DEFAULT_NANO_USD_PER_TOKEN,
        }
    }
}

impl RateTable {
    /// Build a table from USD-per-million-token prices.
    ///
    /// # Arguments
    ///
    /// * `default_usd_per_million`: Price applied to models not in `models`.
    /// * `models`: Model identifier (or prefix) to price.
    pub fn from_usd_per_million<'a>(
        default_usd_per_million: f64,
        models: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Self {
        Self {
            rates: models
                .into_iter()
                .map(|(model, usd)| (model.to_string(), usd_per_million_to_nano(usd)))
                .collect(),
            default_rate: usd_per_million_to_nano(default_usd_per_million),
        }
    }

    /// Per-token rate for `model`, in nano-dollars.
    ///
    /// Exact match first, then the longest configured prefix (providers
    /// report dated variants such as `gpt-4o-mini-2024-07-18`), then the
    /// default rate.
    pub fn rate_for(&self, model: &str) -> u64 {
        if let Some(rate) = self.rates.get(model) {
            return *rate;
        }
        self.rates
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(self.default_rate, |(_, rate)| *rate)
    }

    /// Estimated cost of `tokens` on `model`, in nano-dollars.
    pub fn estimate_nanos(&self, tokens: u64, model: &str) -> u128 {
        u128::from(tokens) * u128::from(self.rate_for(model))
    }

    /// Estimated cost formatted as a dollar string with six decimals.
    pub fn estimate(&self, tokens: u64, model: &str) -> String {
        format_usd(self.estimate_nanos(tokens, model))
    }
}

/// Format nano-dollars as `"$X.XXXXXX"`, rounding half up at the sixth decimal.
pub fn format_usd(nanos: u128) -> String {
    let micros = (nanos + 500) / 1_000;
    let whole = micros / 1_000_000;
    let frac = micros % 1_000_000;
    format!("${whole}.{frac:06}")
}

/// Convert a USD-per-million-tokens price into nano-dollars per token.
fn usd_per_million_to_nano(usd: f64) -> u64 {
    if !usd.is_finite() || usd <= 0.0 {
        return 0;
    }
    // usd / 1e6 tokens * 1e9 nanos
    (usd * (NANOS_PER_USD as f64) / 1_000_000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_prices_reference_model() {
        let table = RateTable::default();
        assert_eq!(table.rate_for("gpt-4o-mini"), 1_500);
    }

    #[test]
    fn test_estimate_120_tokens_matches_reference_rate() {
        let table = RateTable::default();
        // 120 * 0.0000015 = 0.00018
        assert_eq!(table.estimate(120, "gpt-4o-mini"), "$0.000180");
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let table = RateTable::default();
        let a = table.estimate(987, "gpt-4o-mini");
        let b = table.estimate(987, "gpt-4o-mini");
        assert_eq!(a, b);
    }

    #[test]
    fn test_dated_model_variant_uses_prefix_rate() {
        let table = RateTable::from_usd_per_million(10.0, [("gpt-4o-mini", 1.5), ("gpt-4o", 5.0)]);
        assert_eq!(table.rate_for("gpt-4o-mini-2024-07-18"), 1_500);
        assert_eq!(table.rate_for("gpt-4o-2024-08-06"), 5_000);
    }

    #[test]
    fn test_unknown_model_uses_default_rate() {
        let table = RateTable::from_usd_per_million(3.0, [("gpt-4o-mini", 1.5)]);
        assert_eq!(table.rate_for("claude-3-5-haiku"), 3_000);
    }

    #[test]
    fn test_zero_tokens_costs_nothing() {
        assert_eq!(RateTable::default().estimate(0, "gpt-4o-mini"), "$0.000000");
    }

    #[test]
    fn test_format_usd_rounds_half_up() {
        assert_eq!(format_usd(1_499), "$0.000001");
        assert_eq!(format_usd(499), "$0.000000");
        assert_eq!(format_usd(500), "$0.000001");
        assert_eq!(format_usd(2_345_678_900), "$2.345679");
    }

    #[test]
    fn test_non_finite_price_collapses_to_zero() {
        let table = RateTable::from_usd_per_million(f64::NAN, Vec::<(&str, f64)>::new());
        assert_eq!(table.rate_for("anything"), 0);
    }
}
