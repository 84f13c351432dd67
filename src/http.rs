//! Thin HTTP ingress for order instructions.
//!
//! Validation here mirrors what the dispatcher enforces, so a caller
//! learns about a malformed instruction synchronously instead of via
//! the error sink.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::{new_order_id, MsgType, Order, Side, Symbol, TimeInForce};

const BASE_PATH: &str = "/v1/orders";

#[derive(Clone)]
struct Ingress {
    instructions: mpsc::Sender<Order>,
    default_symbol: Symbol,
    /// Definitions of orders accepted through this ingress, so a
    /// follow-up replace or cancel carries the matching side and
    /// symbol.
    live: Arc<Mutex<HashMap<String, Order>>>,
}

/// The instruction routes, bound to the given instruction channel.
pub fn router(instructions: mpsc::Sender<Order>, default_symbol: Symbol) -> Router {
    let ingress = Ingress {
        instructions,
        default_symbol,
        live: Arc::new(Mutex::new(HashMap::new())),
    };
    Router::new()
        .route(BASE_PATH, post(post_order))
        .route(
            &format!("{BASE_PATH}/:id"),
            axum::routing::put(put_order).delete(delete_order),
        )
        .with_state(ingress)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostOrder {
    side: String,
    #[serde(default)]
    symbol: Option<String>,
    order_qty: String,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    time_in_force: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutOrder {
    #[serde(default)]
    order_qty: Option<String>,
    #[serde(default)]
    price: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Accepted {
    order_id: String,
}

#[derive(Debug, Serialize)]
struct Fault {
    error: String,
}

type Reply = std::result::Result<(StatusCode, Json<Accepted>), (StatusCode, Json<Fault>)>;

fn bad_request(reason: impl Into<String>) -> (StatusCode, Json<Fault>) {
    (
        StatusCode::BAD_REQUEST,
        Json(Fault {
            error: reason.into(),
        }),
    )
}

fn parse_side(value: &str) -> Option<Side> {
    match value.to_uppercase().as_str() {
        "BUY" => Some(Side::Buy),
        "SELL" => Some(Side::Sell),
        _ => None,
    }
}

fn parse_time_in_force(value: Option<&str>) -> Option<TimeInForce> {
    match value.map(str::to_uppercase).as_deref() {
        None | Some("GTC") => Some(TimeInForce::Gtc),
        Some("IOC") => Some(TimeInForce::Ioc),
        _ => None,
    }
}

fn positive_decimal(field: &str, value: &str) -> std::result::Result<Decimal, String> {
    let value = Decimal::from_str(value).map_err(|_| field.to_string())?;
    if value <= Decimal::ZERO {
        return Err(field.to_string());
    }
    Ok(value)
}

async fn post_order(State(ingress): State<Ingress>, Json(body): Json<PostOrder>) -> Reply {
    let Some(side) = parse_side(&body.side) else {
        return Err(bad_request("Unrecognised side"));
    };
    let Some(time_in_force) = parse_time_in_force(body.time_in_force.as_deref()) else {
        return Err(bad_request("Unrecognised timeInForce"));
    };
    let order_qty = positive_decimal("orderQty", &body.order_qty).map_err(bad_request)?;
    let price = match body.price.as_deref() {
        Some(value) => Some(positive_decimal("price", value).map_err(bad_request)?),
        None => None,
    };
    let symbol = match body.symbol {
        Some(symbol) if !symbol.is_empty() => Symbol::new(symbol),
        _ => ingress.default_symbol.clone(),
    };

    let order = Order {
        msg_type: MsgType::New,
        order_id: new_order_id(),
        side,
        symbol,
        order_qty: Some(order_qty),
        price,
        time_in_force,
    };
    ingress
        .live
        .lock()
        .insert(order.order_id.clone(), order.clone());
    let order_id = order.order_id.clone();
    if ingress.instructions.send(order).await.is_err() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Fault {
                error: "shutting down".into(),
            }),
        ));
    }
    Ok((StatusCode::ACCEPTED, Json(Accepted { order_id })))
}

async fn put_order(
    State(ingress): State<Ingress>,
    Path(order_id): Path<String>,
    Json(body): Json<PutOrder>,
) -> Reply {
    if body.order_qty.is_none() && body.price.is_none() {
        return Err(bad_request("Nothing to replace"));
    }
    let order_qty = match body.order_qty.as_deref() {
        Some(value) => Some(positive_decimal("orderQty", value).map_err(bad_request)?),
        None => None,
    };
    let price = match body.price.as_deref() {
        Some(value) => Some(positive_decimal("price", value).map_err(bad_request)?),
        None => None,
    };

    let replace = {
        let live = ingress.live.lock();
        let Some(order) = live.get(&order_id) else {
            return Err((
                StatusCode::NOT_FOUND,
                Json(Fault {
                    error: "unknown order".into(),
                }),
            ));
        };
        Order {
            msg_type: MsgType::Replace,
            order_id: order.order_id.clone(),
            side: order.side,
            symbol: order.symbol.clone(),
            order_qty,
            price,
            time_in_force: order.time_in_force,
        }
    };
    let _ = ingress.instructions.send(replace).await;
    Ok((StatusCode::ACCEPTED, Json(Accepted { order_id })))
}

async fn delete_order(State(ingress): State<Ingress>, Path(order_id): Path<String>) -> Reply {
    let cancel = {
        let mut live = ingress.live.lock();
        let Some(order) = live.remove(&order_id) else {
            return Err((
                StatusCode::NOT_FOUND,
                Json(Fault {
                    error: "unknown order".into(),
                }),
            ));
        };
        Order {
            msg_type: MsgType::Cancel,
            order_id: order.order_id,
            side: order.side,
            symbol: order.symbol,
            order_qty: None,
            price: None,
            time_in_force: order.time_in_force,
        }
    };
    let _ = ingress.instructions.send(cancel).await;
    Ok((StatusCode::ACCEPTED, Json(Accepted { order_id })))
}
