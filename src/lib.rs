// SPDX-License-Identifier: Apache-2.0

#![recursion_limit = "256"]

#[macro_use]
extern crate diesel;

pub use config::CollectorConfig;

pub mod config;
pub mod counters;
pub mod db;
pub mod decoder;
pub mod errors;
pub mod gateway;
pub mod handler;
pub mod listener;
pub mod reconciliation;
pub mod runtime;
pub mod schema;
pub mod snapshot;
pub mod triggers;
pub mod util;
pub mod weight;
