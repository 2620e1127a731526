//! Economy snapshots for `ECONOMY_SNAPSHOT` pushes.

use serde_json::{json, Value};

use super::TelemetrySource;
use crate::protocol::PushKind;

const TOP_BALANCES: usize = 10;

/// Read access to the host's economy, when it has one.
pub trait BalanceProvider: Send + 'static {
    /// Accounts to include, usually the online players
    fn accounts(&self) -> Vec<String>;

    fn balance(&self, account: &str) -> Option<f64>;
}

/// Totals and top balances; silent when no provider is installed.
pub struct EconomyTracker {
    provider: Option<Box<dyn BalanceProvider>>,
}

impl EconomyTracker {
    pub fn new(provider: Option<Box<dyn BalanceProvider>>) -> Self {
        Self { provider }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }
}

impl TelemetrySource for EconomyTracker {
    fn kind(&self) -> PushKind {
        PushKind::Economy
    }

    fn sample(&mut self) -> Option<Value> {
        let provider = self.provider.as_ref()?;

        let mut balances: Vec<(String, f64)> = provider
            .accounts()
            .into_iter()
            .filter_map(|name| provider.balance(&name).map(|balance| (name, balance)))
            .collect();
        let total: f64 = balances.iter().map(|(_, balance)| balance).sum();

        balances.sort_by(|a, b| b.1.total_cmp(&a.1));
        balances.truncate(TOP_BALANCES);
        let top: Vec<Value> = balances
            .into_iter()
            .map(|(name, balance)| json!({ "name": name, "balance": balance }))
            .collect();

        Some(json!({
            "totalMoney": total,
            "topBalances": top,
            "transactionCount": 0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Fixed(HashMap<String, f64>);

    impl BalanceProvider for Fixed {
        fn accounts(&self) -> Vec<String> {
            let mut names: Vec<String> = self.0.keys().cloned().collect();
            names.push("ghost".to_string());
            names
        }

        fn balance(&self, account: &str) -> Option<f64> {
            self.0.get(account).copied()
        }
    }

    #[test]
    fn test_no_provider_no_snapshot() {
        let mut tracker = EconomyTracker::new(None);
        assert!(!tracker.has_provider());
        assert!(tracker.sample().is_none());
    }

    #[test]
    fn test_top_ten_descending() {
        let balances = (0..15)
            .map(|i| (format!("player{}", i), i as f64 * 10.0))
            .collect();
        let mut tracker = EconomyTracker::new(Some(Box::new(Fixed(balances))));

        let snapshot = tracker.sample().unwrap();
        assert_eq!(snapshot["totalMoney"], 1050.0);
        assert_eq!(snapshot["transactionCount"], 0);

        let top = snapshot["topBalances"].as_array().unwrap();
        assert_eq!(top.len(), 10);
        assert_eq!(top[0]["name"], "player14");
        assert_eq!(top[0]["balance"], 140.0);
        assert_eq!(top[9]["name"], "player5");
    }
}
