pub mod config;
pub mod extractor;
pub mod models;
pub mod monitor;
pub mod notifier;
pub mod renderer;
pub mod scheduler;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::{AppError, CheckError};

pub type Result<T> = std::result::Result<T, AppError>;
