//! Layered configuration
//!
//! Built-in defaults, then an optional TOML file, then programmatic
//! overrides; merged as JSON values and deserialized into a typed
//! [`DistributionConfig`].

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
pub use settings::{
    CclConfig, DistributionConfig, KeyDistributionConfig, LoggingConfig, RetentionConfig,
    SigningConfig, StoreConfig,
};
