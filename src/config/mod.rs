pub mod configs;
pub mod defaults;
pub mod envconfig;
pub mod validate;

pub use configs::{
    AppConfig, CookieConfig, DatabaseConfig, EnvSettings, GeneralConfig, LoggingConfig, SameSite,
    SessionConfig,
};
pub use envconfig::EnvConfig;
