pub mod auction;
pub mod bidding;
pub mod config;
pub mod database;
pub mod deposit;
pub mod error;
pub mod event_store;
pub mod handlers;
pub mod live;
pub mod message_broker;
pub mod query;
pub mod realtime;
pub mod routes;
pub mod scheduler;
pub mod state;
