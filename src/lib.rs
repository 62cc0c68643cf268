pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod metering;

use crate::config::Config;
use crate::generator::MemeGenerator;
use crate::metering::Meter;

use std::sync::Arc;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub meter: Arc<Meter>,
    pub generator: Arc<MemeGenerator>,
}
