pub mod adapters;
pub mod api;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{LocalStorage, MemoryStore};
pub use api::{router, serve, AppState};
pub use config::AppConfig;
pub use crate::core::engine::SaleEngine;
pub use utils::error::{MarktError, Result};
