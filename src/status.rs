//! Account snapshot for the status view

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local};
use log::warn;

use crate::exchange::Exchange;
use crate::types::{Balance, OpenOrder, Position};

/// Balances, positions and open orders captured at one point in time
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub symbol: String,
    pub taken_at: DateTime<Local>,
    /// None if the balance query failed
    pub balances: Option<BTreeMap<String, Balance>>,
    pub positions: Vec<Position>,
    pub open_orders: Vec<OpenOrder>,
}

impl AccountSnapshot {
    /// Query everything the status view shows for `symbol`
    pub async fn fetch<E: Exchange + ?Sized>(exchange: &E, symbol: &str) -> Self {
        let balances = match exchange.get_balances().await {
            Ok(balances) => Some(balances),
            Err(e) => {
                warn!("Balance query failed: {e}");
                None
            }
        };
        let positions = exchange.get_positions(Some(symbol)).await;
        let open_orders = exchange.get_open_orders(Some(symbol)).await;

        Self {
            symbol: symbol.to_string(),
            taken_at: Local::now(),
            balances,
            positions,
            open_orders,
        }
    }
}

impl fmt::Display for AccountSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== {} status @ {} ===",
            self.symbol,
            self.taken_at.format("%H:%M:%S")
        )?;

        writeln!(f, "Balances:")?;
        match &self.balances {
            None => writeln!(f, "  query failed")?,
            Some(balances) => {
                let mut shown = 0;
                for (asset, balance) in balances.iter().filter(|(_, b)| b.is_non_zero()) {
                    writeln!(
                        f,
                        "  {asset:<8} available {:<16} locked {}",
                        balance.available, balance.locked
                    )?;
                    shown += 1;
                }
                if shown == 0 {
                    writeln!(f, "  none")?;
                }
            }
        }

        writeln!(f, "Positions:")?;
        if self.positions.is_empty() {
            writeln!(f, "  none")?;
        }
        for p in &self.positions {
            let entry = p
                .entry_price
                .map(|e| e.to_string())
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "  {} size {} entry {} uPnL {:.4}",
                p.symbol, p.net_size, entry, p.unrealized_pnl
            )?;
        }

        writeln!(f, "Open orders:")?;
        if self.open_orders.is_empty() {
            writeln!(f, "  none")?;
        }
        for o in &self.open_orders {
            writeln!(
                f,
                "  {} {} {} @ {} [{}]",
                o.short_id(),
                o.side,
                o.quantity,
                o.price.as_deref().unwrap_or("market"),
                o.status
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BackpackClient;
    use crate::exchange::mock::{MockCall, MockExchange};

    fn snapshot() -> AccountSnapshot {
        AccountSnapshot {
            symbol: "SOL".into(),
            taken_at: Local::now(),
            balances: None,
            positions: Vec::new(),
            open_orders: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_fetch_queries_symbol() {
        let exchange = MockExchange::new();
        let snap = AccountSnapshot::fetch(&exchange, "SOL").await;

        assert_eq!(
            exchange.calls().await,
            vec![
                MockCall::Balances,
                MockCall::Positions(Some("SOL".into())),
                MockCall::OpenOrders(Some("SOL".into())),
            ]
        );
        assert!(snap.balances.unwrap().contains_key("USDC"));
    }

    #[tokio::test]
    async fn test_simulated_snapshot_renders_balances() {
        let client = BackpackClient::simulated();
        let text = AccountSnapshot::fetch(&client, "SOL").await.to_string();

        assert!(text.contains("USDC"));
        assert!(text.contains("1000.00"));
        assert!(text.contains("Positions:\n  none"));
        assert!(text.contains("Open orders:\n  none"));
    }

    #[test]
    fn test_render_failures_and_market_orders() {
        let mut snap = snapshot();
        snap.open_orders.push(OpenOrder {
            id: "abcdef123456".into(),
            side: "Bid".into(),
            quantity: "0.5".into(),
            price: None,
            status: "New".into(),
            ..Default::default()
        });
        snap.positions.push(Position {
            symbol: "SOL_USDC_PERP".into(),
            net_size: -1.5,
            entry_price: Some(140.0),
            unrealized_pnl: 2.0,
        });

        let text = snap.to_string();
        assert!(text.contains("Balances:\n  query failed"));
        assert!(text.contains("abcdef12 Bid 0.5 @ market [New]"));
        assert!(text.contains("SOL_USDC_PERP size -1.5 entry 140 uPnL 2.0000"));
    }

    #[test]
    fn test_render_hides_zero_balances() {
        let mut snap = snapshot();
        let mut balances = BTreeMap::new();
        balances.insert(
            "BTC".to_string(),
            Balance {
                available: "0".into(),
                locked: "0".into(),
                staked: "0".into(),
            },
        );
        snap.balances = Some(balances);

        let text = snap.to_string();
        assert!(!text.contains("BTC"));
        assert!(text.contains("Balances:\n  none"));
    }
}
