//! HTTP handlers.
//!
//! Handlers validate the request, build a per-request pipeline from
//! [`AppState`](crate::state::AppState) and map its outcome to a status code.

pub mod analysis;
pub mod compile;
pub mod generate;
pub mod health;
