//! Infrastructure layer: document store, penalty enforcement, notifications, config.

pub mod config;
pub mod document_store;
pub mod notifications;
pub mod penalties;
