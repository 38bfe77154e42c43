//! Order operations trait - the seam between the volume loop and the exchange

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::{info, warn};
use serde_json::Value;

use crate::consts::FLATTEN_EPSILON;
use crate::errors::Result;
use crate::types::{Balance, OpenOrder, OrderRecord, OrderType, Position, Side};

/// One market order sent while flattening
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenOrder {
    pub side: Side,
    pub quantity: f64,
    pub succeeded: bool,
}

/// Outcome of [`Exchange::close_all_positions`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenReport {
    /// Whether the cancel-all request succeeded
    pub orders_cancelled: bool,
    pub orders: Vec<FlattenOrder>,
}

impl FlattenReport {
    /// True if there was nothing to flatten
    pub fn nothing_to_close(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Exchange operations - can be mocked for testing
///
/// Symbols are base assets ("SOL"); implementations add the market suffix.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Balances keyed by asset
    async fn get_balances(&self) -> Result<BTreeMap<String, Balance>>;

    /// Open perp positions. Failures yield an empty list.
    async fn get_positions(&self, symbol: Option<&str>) -> Vec<Position>;

    /// Open spot orders. Failures yield an empty list.
    async fn get_open_orders(&self, symbol: Option<&str>) -> Vec<OpenOrder>;

    /// Place an order. A price is only sent for limit orders.
    async fn execute_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
        order_type: OrderType,
        price: Option<f64>,
    ) -> Result<OrderRecord>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<Value>;

    async fn cancel_all_orders(&self, symbol: &str) -> Result<Value>;

    /// Cancel all open orders, then flatten every position with a market
    /// order on the opposite side.
    ///
    /// Best effort: failures are logged and processing continues.
    async fn close_all_positions(&self, symbol: &str) -> FlattenReport {
        info!("Closing {symbol} positions...");
        let mut report = FlattenReport::default();

        match self.cancel_all_orders(symbol).await {
            Ok(_) => report.orders_cancelled = true,
            Err(e) => warn!("Cancel all orders for {symbol} failed: {e}"),
        }

        for position in self.get_positions(Some(symbol)).await {
            let size = position.net_size;
            if size.abs() < FLATTEN_EPSILON {
                continue;
            }

            let side = Side::closing(size);
            let quantity = size.abs();
            let succeeded = match self
                .execute_order(symbol, side, quantity, OrderType::Market, None)
                .await
            {
                Ok(_) => {
                    info!("Position closed: {side} {quantity} {symbol}");
                    true
                }
                Err(e) => {
                    warn!("Failed to close position {side} {quantity} {symbol}: {e}");
                    false
                }
            };
            report.orders.push(FlattenOrder {
                side,
                quantity,
                succeeded,
            });
        }

        if report.nothing_to_close() {
            info!("No positions to close");
        }
        report
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// Recording exchange for tests
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use crate::errors::Error;

    /// A call made against the mock, in order
    #[derive(Debug, Clone, PartialEq)]
    pub enum MockCall {
        Balances,
        Positions(Option<String>),
        OpenOrders(Option<String>),
        Execute {
            symbol: String,
            side: Side,
            quantity: f64,
            order_type: OrderType,
            price: Option<f64>,
        },
        Cancel { symbol: String, order_id: String },
        CancelAll(String),
    }

    type OrderHook = Box<dyn Fn(usize) + Send + Sync>;

    /// Mock exchange for testing
    #[derive(Default)]
    pub struct MockExchange {
        pub calls: Arc<Mutex<Vec<MockCall>>>,
        pub positions: Arc<Mutex<Vec<Position>>>,
        pub fail_orders: Arc<Mutex<bool>>,
        pub fail_cancel_all: Arc<Mutex<bool>>,
        orders_placed: AtomicUsize,
        on_order: Option<OrderHook>,
    }

    impl MockExchange {
        pub fn new() -> Self {
            Self::default()
        }

        /// Run `hook` with the 1-based order number while each order is in flight
        pub fn with_order_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
            self.on_order = Some(Box::new(hook));
            self
        }

        pub async fn set_positions(&self, positions: Vec<Position>) {
            *self.positions.lock().await = positions;
        }

        pub async fn set_fail_orders(&self, fail: bool) {
            *self.fail_orders.lock().await = fail;
        }

        pub async fn set_fail_cancel_all(&self, fail: bool) {
            *self.fail_cancel_all.lock().await = fail;
        }

        pub async fn calls(&self) -> Vec<MockCall> {
            self.calls.lock().await.clone()
        }

        /// Sides of all executed orders, in submission order
        pub async fn order_sides(&self) -> Vec<Side> {
            self.calls
                .lock()
                .await
                .iter()
                .filter_map(|c| match c {
                    MockCall::Execute { side, .. } => Some(*side),
                    _ => None,
                })
                .collect()
        }

        pub fn orders_placed(&self) -> usize {
            self.orders_placed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Exchange for MockExchange {
        async fn get_balances(&self) -> Result<BTreeMap<String, Balance>> {
            self.calls.lock().await.push(MockCall::Balances);
            let mut balances = BTreeMap::new();
            balances.insert(
                "USDC".to_string(),
                Balance {
                    available: "100".into(),
                    locked: "0".into(),
                    staked: "0".into(),
                },
            );
            Ok(balances)
        }

        async fn get_positions(&self, symbol: Option<&str>) -> Vec<Position> {
            self.calls
                .lock()
                .await
                .push(MockCall::Positions(symbol.map(str::to_string)));
            self.positions.lock().await.clone()
        }

        async fn get_open_orders(&self, symbol: Option<&str>) -> Vec<OpenOrder> {
            self.calls
                .lock()
                .await
                .push(MockCall::OpenOrders(symbol.map(str::to_string)));
            Vec::new()
        }

        async fn execute_order(
            &self,
            symbol: &str,
            side: Side,
            quantity: f64,
            order_type: OrderType,
            price: Option<f64>,
        ) -> Result<OrderRecord> {
            self.calls.lock().await.push(MockCall::Execute {
                symbol: symbol.to_string(),
                side,
                quantity,
                order_type,
                price,
            });
            let n = self.orders_placed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(hook) = &self.on_order {
                hook(n);
            }

            if *self.fail_orders.lock().await {
                return Err(Error::Api {
                    status: 400,
                    body: "Mock failure".into(),
                });
            }

            Ok(OrderRecord {
                id: format!("mock_{n}"),
                symbol: symbol.to_string(),
                side: side.to_string(),
                status: "Filled".into(),
                quantity: quantity.to_string(),
            })
        }

        async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<Value> {
            self.calls.lock().await.push(MockCall::Cancel {
                symbol: symbol.to_string(),
                order_id: order_id.to_string(),
            });
            Ok(serde_json::json!({ "status": "Cancelled" }))
        }

        async fn cancel_all_orders(&self, symbol: &str) -> Result<Value> {
            self.calls
                .lock()
                .await
                .push(MockCall::CancelAll(symbol.to_string()));
            if *self.fail_cancel_all.lock().await {
                return Err(Error::Transport("Mock failure".into()));
            }
            Ok(serde_json::json!({ "cancelled": 0 }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockCall, MockExchange};
    use super::*;

    fn position(net_size: f64) -> Position {
        Position {
            symbol: "SOL_USDC_PERP".into(),
            net_size,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_flatten_cancels_before_querying_positions() {
        let exchange = MockExchange::new();
        exchange.set_positions(vec![position(1.5), position(-0.25)]).await;

        let report = exchange.close_all_positions("SOL").await;

        let calls = exchange.calls().await;
        assert_eq!(calls[0], MockCall::CancelAll("SOL".into()));
        assert_eq!(calls[1], MockCall::Positions(Some("SOL".into())));
        assert_eq!(
            calls[2],
            MockCall::Execute {
                symbol: "SOL".into(),
                side: Side::Ask,
                quantity: 1.5,
                order_type: OrderType::Market,
                price: None,
            }
        );
        assert_eq!(
            calls[3],
            MockCall::Execute {
                symbol: "SOL".into(),
                side: Side::Bid,
                quantity: 0.25,
                order_type: OrderType::Market,
                price: None,
            }
        );
        assert!(report.orders_cancelled);
        assert_eq!(report.orders.len(), 2);
        assert!(report.orders.iter().all(|o| o.succeeded));
    }

    #[tokio::test]
    async fn test_flatten_skips_dust_positions() {
        let exchange = MockExchange::new();
        exchange.set_positions(vec![position(-0.00005)]).await;

        let report = exchange.close_all_positions("SOL").await;

        assert!(report.nothing_to_close());
        assert!(exchange.order_sides().await.is_empty());
    }

    #[tokio::test]
    async fn test_flatten_threshold_is_inclusive() {
        let exchange = MockExchange::new();
        exchange.set_positions(vec![position(0.0001)]).await;

        let report = exchange.close_all_positions("SOL").await;
        assert_eq!(report.orders.len(), 1);
        assert_eq!(report.orders[0].side, Side::Ask);
    }

    #[tokio::test]
    async fn test_flatten_continues_after_failures() {
        let exchange = MockExchange::new();
        exchange.set_fail_cancel_all(true).await;
        exchange.set_fail_orders(true).await;
        exchange
            .set_positions(vec![position(2.0), position(-3.0), position(0.5)])
            .await;

        let report = exchange.close_all_positions("SOL").await;

        assert!(!report.orders_cancelled);
        assert_eq!(report.orders.len(), 3);
        assert!(report.orders.iter().all(|o| !o.succeeded));
        assert_eq!(
            exchange.order_sides().await,
            vec![Side::Ask, Side::Bid, Side::Ask]
        );
    }

    #[tokio::test]
    async fn test_flatten_no_positions() {
        let exchange = MockExchange::new();
        let report = exchange.close_all_positions("SOL").await;
        assert!(report.nothing_to_close());
        assert!(report.orders_cancelled);
    }
}
