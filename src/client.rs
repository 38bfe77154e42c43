//! Backpack REST client built on [`Dispatcher`]

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::warn;
use serde_json::{json, Value};

use crate::config::{Credentials, NetworkConfig};
use crate::errors::Result;
use crate::exchange::Exchange;
use crate::req::{Dispatcher, HttpMethod};
use crate::types::{
    perp_symbol, spot_symbol, Balance, Instruction, OpenOrder, OrderRecord, OrderType, Params,
    Position, Side,
};

/// Backpack exchange client. Mode (live or simulated) is fixed at construction.
#[derive(Debug)]
pub struct BackpackClient {
    dispatcher: Dispatcher,
}

impl BackpackClient {
    pub fn new(credentials: &Credentials, network: &NetworkConfig) -> Self {
        Self::with_dispatcher(Dispatcher::new(credentials, network))
    }

    /// Client that never touches the network
    pub fn simulated() -> Self {
        Self::with_dispatcher(Dispatcher::simulated())
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn is_simulated(&self) -> bool {
        self.dispatcher.is_simulated()
    }
}

fn symbol_params(symbol: Option<String>) -> Option<Params> {
    symbol.map(|s| {
        let mut params = Params::new();
        params.insert("symbol".into(), Value::String(s));
        params
    })
}

/// Normalize a list-shaped response: null or failure -> empty, single object -> one item
fn into_list(result: Result<Value>) -> Vec<Value> {
    match result {
        Ok(Value::Array(items)) => items,
        Ok(Value::Object(obj)) if !obj.is_empty() => vec![Value::Object(obj)],
        Ok(_) | Err(_) => Vec::new(),
    }
}

pub(crate) fn order_body(
    symbol: &str,
    side: Side,
    quantity: f64,
    order_type: OrderType,
    price: Option<f64>,
) -> Value {
    let mut body = json!({
        "symbol": spot_symbol(symbol),
        "side": side.as_str(),
        "orderType": order_type.as_str(),
        "quantity": quantity.to_string(),
    });

    if let (OrderType::Limit, Some(price)) = (order_type, price) {
        body["price"] = Value::String(price.to_string());
        body["timeInForce"] = Value::String("GTC".into());
    }
    body
}

#[async_trait]
impl Exchange for BackpackClient {
    async fn get_balances(&self) -> Result<BTreeMap<String, Balance>> {
        let result = self
            .dispatcher
            .dispatch(
                HttpMethod::Get,
                "/api/v1/capital",
                Instruction::BalanceQuery,
                None,
                None,
            )
            .await?;

        let balances: BTreeMap<String, Balance> = match result {
            Value::Object(map) => map
                .into_iter()
                .filter(|(_, v)| v.is_object())
                .map(|(asset, v)| (asset, serde_json::from_value(v).unwrap_or_default()))
                .collect(),
            _ => BTreeMap::new(),
        };
        Ok(balances)
    }

    async fn get_positions(&self, symbol: Option<&str>) -> Vec<Position> {
        let params = symbol_params(symbol.map(perp_symbol));
        let result = self
            .dispatcher
            .dispatch(
                HttpMethod::Get,
                "/api/v1/position",
                Instruction::PositionQuery,
                params.as_ref(),
                None,
            )
            .await;
        if result.is_err() {
            warn!("Position query failed, treating as no positions");
        }

        into_list(result).iter().map(Position::from_value).collect()
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> Vec<OpenOrder> {
        let params = symbol_params(symbol.map(spot_symbol));
        let result = self
            .dispatcher
            .dispatch(
                HttpMethod::Get,
                "/api/v1/orders",
                Instruction::OrderQueryAll,
                params.as_ref(),
                None,
            )
            .await;

        match result {
            Ok(Value::Array(items)) => items.iter().map(OpenOrder::from_value).collect(),
            _ => Vec::new(),
        }
    }

    async fn execute_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: f64,
        order_type: OrderType,
        price: Option<f64>,
    ) -> Result<OrderRecord> {
        let body = order_body(symbol, side, quantity, order_type, price);
        let result = self
            .dispatcher
            .dispatch(
                HttpMethod::Post,
                "/api/v1/order",
                Instruction::OrderExecute,
                None,
                Some(&body),
            )
            .await?;
        Ok(OrderRecord::from_value(result))
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<Value> {
        let mut params = Params::new();
        params.insert("symbol".into(), Value::String(spot_symbol(symbol)));
        params.insert("orderId".into(), Value::String(order_id.to_string()));
        self.dispatcher
            .dispatch(
                HttpMethod::Delete,
                "/api/v1/order",
                Instruction::OrderCancel,
                Some(&params),
                None,
            )
            .await
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<Value> {
        let params = symbol_params(Some(spot_symbol(symbol)));
        self.dispatcher
            .dispatch(
                HttpMethod::Delete,
                "/api/v1/orders",
                Instruction::OrderCancelAll,
                params.as_ref(),
                None,
            )
            .await
    }
}
