//! Delivery helpers shared by every backend.

pub mod throttled;
