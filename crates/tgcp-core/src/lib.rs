//! Core domain + application logic for the Telegram chat parser.
//!
//! This crate is framework-agnostic. MTProto / Bot API access lives behind
//! ports (traits) implemented in adapter crates.

pub mod auth;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod errors;
#[cfg(test)]
mod fakes;
pub mod formatting;
pub mod keywords;
pub mod ledger;
pub mod logging;
pub mod monitor;
pub mod ports;
pub mod scheduler;

pub use errors::{Error, Result};
