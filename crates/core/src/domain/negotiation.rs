use serde::{Deserialize, Serialize};

/// The three fixed negotiation postures. The set is closed: callers cannot
/// extend it, and every generation call produces exactly one proposal per
/// variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Polite,
    Firm,
    TermSwap,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Polite, Strategy::Firm, Strategy::TermSwap];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Polite => "polite",
            Self::Firm => "firm",
            Self::TermSwap => "term_swap",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "polite" => Ok(Self::Polite),
            "firm" => Ok(Self::Firm),
            "term_swap" | "term-swap" => Ok(Self::TermSwap),
            other => Err(format!("unknown strategy `{other}` (expected polite|firm|term_swap)")),
        }
    }
}

/// Structured negotiation facts for one turn. Constructed by the caller,
/// passed by reference into the pipeline, and never mutated there.
///
/// `target_price` should be at or below `past_price`, but that is a caller
/// expectation rather than an enforced invariant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegotiationContext {
    pub vendor_message: String,
    pub past_price: f64,
    pub target_price: f64,
    pub service_type: String,
    pub relationship: String,
}

impl NegotiationContext {
    /// The monthly discount the user is asking for.
    pub fn requested_discount(&self) -> f64 {
        self.past_price - self.target_price
    }
}

/// One generated counter-offer message, tied to the strategy that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub strategy: Strategy,
    pub content: String,
    pub reasoning: String,
    pub expected_outcome: String,
}

/// A simulated vendor reply to a selected proposal. `accepted_price` is
/// `None` when the vendor declines to state a figure; `success` records
/// whether the reply represents any concession at all.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VendorReply {
    pub content: String,
    pub accepted_price: Option<f64>,
    pub reasoning: String,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::{NegotiationContext, Strategy};

    #[test]
    fn strategy_round_trips_through_str() {
        for strategy in Strategy::ALL {
            let parsed: Strategy = strategy.as_str().parse().expect("parse");
            assert_eq!(parsed, strategy);
        }
    }

    #[test]
    fn strategy_rejects_unknown_label() {
        let result = "aggressive".parse::<Strategy>();
        assert!(result.is_err());
        assert!(result.err().expect("error").contains("aggressive"));
    }

    #[test]
    fn strategy_serializes_snake_case() {
        let json = serde_json::to_string(&Strategy::TermSwap).expect("serialize");
        assert_eq!(json, "\"term_swap\"");
    }

    #[test]
    fn requested_discount_is_price_delta() {
        let context = NegotiationContext {
            vendor_message: "Renewal at $1000/month.".to_string(),
            past_price: 1000.0,
            target_price: 800.0,
            service_type: "SaaS Subscription".to_string(),
            relationship: "1-3 Years".to_string(),
        };
        assert_eq!(context.requested_discount(), 200.0);
    }
}
