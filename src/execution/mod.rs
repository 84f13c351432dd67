//! Order execution against the counterparty: the open-order state
//! machine, the FIX-style message surface and the application adapter
//! that connects the two.

pub mod application;
pub mod messages;
pub mod order;

pub use application::Application;
pub use messages::{
    CxlRejResponseTo, ExecType, ExecutionReport, FixSender, Inbound, OrderCancelReject, Outbound,
    SessionReject,
};
pub use order::{CancelRequest, NewRequest, OpenOrder, PendingRequest, ReplaceRequest};
