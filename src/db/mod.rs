// SPDX-License-Identifier: Apache-2.0

pub mod models;
pub mod pool;

pub use pool::{MyDbConnection, PgDbPool, PgPool};
