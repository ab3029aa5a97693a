//! Domain models for the inventory service

mod dashboard;
mod ledger;
mod product;
mod sku;
mod stock_log;

pub use dashboard::*;
pub use ledger::*;
pub use product::*;
pub use sku::*;
pub use stock_log::*;
