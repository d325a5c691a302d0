//! codepad-config — TOML configuration for the codepad language client.
pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod validate;

pub use config::{
    Config, FormattingConfig, LogConfig, LogLevel, LspConfig, LspServerEntry, SessionConfig,
    SyncConfig,
};
pub use error::ConfigError;
pub use load::{load_config, load_file, load_from_str};
