//! Model-keyed token pricing, resolved by longest prefix match so dated
//! model suffixes (`claude-sonnet-4-5-20250929`) fall back to their family
//! entry (`claude-sonnet-4-5`) without needing an update per release.

/// Default price per input token when no model-specific entry matches.
const DEFAULT_PRICE_IN: f64 = 3.0 / 1_000_000.0;
/// Default price per output token when no model-specific entry matches.
const DEFAULT_PRICE_OUT: f64 = 15.0 / 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Price {
    pub input_per_token: f64,
    pub output_per_token: f64,
}

const MODEL_PRICES: &[(&str, Price)] = &[
    (
        "claude-opus",
        Price {
            input_per_token: 15.0 / 1_000_000.0,
            output_per_token: 75.0 / 1_000_000.0,
        },
    ),
    (
        "claude-sonnet",
        Price {
            input_per_token: 3.0 / 1_000_000.0,
            output_per_token: 15.0 / 1_000_000.0,
        },
    ),
    (
        "claude-haiku",
        Price {
            input_per_token: 0.8 / 1_000_000.0,
            output_per_token: 4.0 / 1_000_000.0,
        },
    ),
];

/// Resolves a price for `model_name` using longest-prefix matching over
/// [`MODEL_PRICES`], falling back to the documented default ($3/$15 per
/// million input/output tokens) for unknown or absent model names.
pub fn resolve_price(model_name: Option<&str>) -> Price {
    let default = Price {
        input_per_token: DEFAULT_PRICE_IN,
        output_per_token: DEFAULT_PRICE_OUT,
    };

    let Some(name) = model_name else {
        return default;
    };

    let mut best: Option<Price> = None;
    let mut best_len = 0;
    for (prefix, price) in MODEL_PRICES {
        if name.starts_with(prefix) && prefix.len() > best_len {
            best = Some(*price);
            best_len = prefix.len();
        }
    }
    best.unwrap_or(default)
}

/// Computes cost in USD for a token usage event lacking an explicit
/// `cost_usd`, using `resolve_price`.
pub fn estimate_cost(input_tokens: u64, output_tokens: u64, model_name: Option<&str>) -> f64 {
    let price = resolve_price(model_name);
    input_tokens as f64 * price.input_per_token + output_tokens as f64 * price.output_per_token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_uses_default_price() {
        let price = resolve_price(Some("some-future-model"));
        assert_eq!(price.input_per_token, DEFAULT_PRICE_IN);
        assert_eq!(price.output_per_token, DEFAULT_PRICE_OUT);
    }

    #[test]
    fn none_model_uses_default_price() {
        let price = resolve_price(None);
        assert_eq!(price.input_per_token, DEFAULT_PRICE_IN);
    }

    #[test]
    fn dated_suffix_matches_family_prefix() {
        let price = resolve_price(Some("claude-sonnet-4-5-20250929"));
        assert_eq!(price.input_per_token, 3.0 / 1_000_000.0);
        assert_eq!(price.output_per_token, 15.0 / 1_000_000.0);
    }

    #[test]
    fn opus_prices_higher_than_sonnet() {
        let opus = resolve_price(Some("claude-opus-4-1"));
        let sonnet = resolve_price(Some("claude-sonnet-4-5"));
        assert!(opus.input_per_token > sonnet.input_per_token);
    }

    #[test]
    fn estimate_cost_scales_with_tokens() {
        let cost = estimate_cost(1_000_000, 0, Some("claude-sonnet-4-5"));
        assert!((cost - 3.0).abs() < 1e-9);
    }
}
