pub mod config;
pub mod error;
pub mod text;
pub mod types;

pub use config::AppConfig;
pub use error::AuditError;
pub use text::truncate_chars;
pub use types::*;
