//! HTTP gateway: the REST surface over the core contracts.
//!
//! Every route is JSON except the CSV export. Handlers stay thin; all
//! behavior lives in the store, session, inbound, and dispatch crates.

pub mod contacts;
pub mod dashboard;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod media;
pub mod messages;
pub mod reminders;
pub mod replies;
pub mod server;
pub mod session_routes;
pub mod state;

pub use {
    error::ApiError,
    server::{router, serve},
    state::AppState,
};
