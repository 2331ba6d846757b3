pub mod database;
pub mod error;
pub mod events;
pub mod handlers;
pub mod ledger;
pub mod message_broker;
pub mod negotiation;
pub mod reaper;
pub mod sidecar;
pub mod stock_lock;
