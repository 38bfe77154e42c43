//! Canned responses used when the client has no usable credentials

use serde_json::{json, Value};

use crate::types::{Instruction, Params};

/// Offline stand-in for the exchange.
///
/// Answers purely from the instruction and the request payload, never fails,
/// and falls back to defaults when the payload is missing pieces.
#[derive(Debug, Clone, Default)]
pub struct Simulator;

impl Simulator {
    pub fn new() -> Self {
        Self
    }

    pub fn respond(
        &self,
        instruction: Instruction,
        _params: Option<&Params>,
        body: Option<&Value>,
    ) -> Value {
        match instruction {
            Instruction::BalanceQuery => json!({
                "USDC": { "available": "1000.00", "locked": "0.00", "staked": "0.00" },
                "SOL": { "available": "10.00", "locked": "0.00", "staked": "0.00" },
            }),
            Instruction::PositionQuery => json!([]),
            Instruction::OrderExecute => {
                let field = |key: &str, default: &str| -> Value {
                    body.and_then(|b| b.get(key))
                        .filter(|v| !v.is_null())
                        .cloned()
                        .unwrap_or_else(|| Value::from(default))
                };
                json!({
                    "id": format!("sim_{}", chrono::Utc::now().timestamp_millis()),
                    "symbol": field("symbol", "SOL_USDC"),
                    "side": field("side", "Bid"),
                    "status": "Filled",
                    "quantity": field("quantity", "0.01"),
                })
            }
            Instruction::OrderCancel => json!({ "status": "Cancelled" }),
            Instruction::OrderCancelAll => json!({ "cancelled": 0 }),
            Instruction::OrderQueryAll => json!({}),
        }
    }
}
