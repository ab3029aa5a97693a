//! HTTP handlers for the inventory API

pub mod dashboard;
pub mod health;
pub mod history;
pub mod import;
pub mod inventory;
pub mod products;
pub mod stock;

pub use dashboard::*;
pub use health::*;
pub use history::*;
pub use import::*;
pub use inventory::*;
pub use products::*;
pub use stock::*;
