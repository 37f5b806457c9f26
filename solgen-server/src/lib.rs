//! HTTP/JSON API for contract generation, compilation and analysis.
//!
//! Thin axum layer over `solgen-core`: request schema, error mapping, shared
//! state and route definitions.

pub mod error;
pub mod handlers;
pub mod router;
pub mod schema;
pub mod state;
