pub mod allocation;
pub mod app;
pub mod auction;
pub mod bidding;
pub mod coding;
pub mod config;
pub mod confirmation;
pub mod database;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod judge;
pub mod message_broker;
pub mod query;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod timer;
