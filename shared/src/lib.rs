//! Shared types and engine logic for the inventory service
//!
//! This crate holds everything that does not touch storage: the domain
//! models, ledger arithmetic, log replay and bulk-import planning. It is
//! used by the backend and, through WASM, by the admin web client.

pub mod import;
pub mod models;
pub mod replay;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
