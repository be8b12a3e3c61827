pub mod config;
pub mod error;
pub mod models;
pub mod proto;
pub mod services;
pub mod session;
pub mod sheets;
pub mod sync;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use sync::SyncEngine;
