//! HTTP control API
//!
//! - `server`: router and listener
//! - `handlers`: JSON endpoints over [`crate::Player`]
//! - `sse`: `GET /events` stream of `PlayerEvent`s

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
