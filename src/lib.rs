//! Storefront checkout and order-fulfillment engine.
//!
//! ## Features
//! - Guest and user carts, merged at login
//! - Voucher validation and order pricing (16% VAT)
//! - Atomic stock reservation at checkout
//! - Order delivery/payment state machine with a fulfilment timeline
//! - Signed, idempotent payment webhook reconciliation

pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod notify;
pub mod services;
pub mod store;

pub use config::{CartClearPolicy, Config};
pub use error::{AppError, Result};
pub use services::Services;
