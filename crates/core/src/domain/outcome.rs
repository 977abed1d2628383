use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::negotiation::Strategy;

/// Opaque identifier tying a persisted context blob to a mail thread.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger record for one completed negotiation, persisted by `haggler-db`.
/// Savings are monthly; the annualized figure is derived, not entered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegotiationOutcome {
    pub date: DateTime<Utc>,
    pub service_type: String,
    pub vendor_message: String,
    pub original_price: f64,
    pub target_price: f64,
    pub final_price: f64,
    pub strategy: Strategy,
    pub proposal_content: String,
    pub vendor_response: String,
    pub success: bool,
}

impl NegotiationOutcome {
    pub fn savings(&self) -> f64 {
        self.original_price - self.final_price
    }

    pub fn annual_savings(&self) -> f64 {
        self.savings() * 12.0
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::NegotiationOutcome;
    use crate::domain::negotiation::Strategy;

    #[test]
    fn savings_are_derived_from_prices() {
        let outcome = NegotiationOutcome {
            date: Utc::now(),
            service_type: "SaaS Subscription".to_string(),
            vendor_message: "Renewal at $500/month.".to_string(),
            original_price: 500.0,
            target_price: 400.0,
            final_price: 450.0,
            strategy: Strategy::Polite,
            proposal_content: "We'd like to renew at $400/month.".to_string(),
            vendor_response: "We can do $450/month.".to_string(),
            success: true,
        };

        assert_eq!(outcome.savings(), 50.0);
        assert_eq!(outcome.annual_savings(), 600.0);
    }
}
