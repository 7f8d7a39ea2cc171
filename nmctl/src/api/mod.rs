//! Public API module.
//!
//! This module contains the high-level user-facing API for the `nmctl` crate.

pub mod builders;
pub mod config;
pub mod manager;
pub mod models;
