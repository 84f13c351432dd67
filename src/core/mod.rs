//! Core types, errors and configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{
    new_order_id, MsgType, OrdStatus, Order, Quote, Report, Side, Symbol, TimeInForce, Trade,
    EXEC_INST_ACTIONABLE,
};
