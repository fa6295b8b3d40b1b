//! Runtime settings for the binaries.
//!
//! There is no config file. Defaults can be overridden with `HTTPWIRE_`-prefixed environment
//! variables, e.g. `HTTPWIRE_PORT=8080`.
use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Where to listen and how much to log.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// The interface to bind.
    pub host: String,
    /// The port to bind.
    pub port: u16,
    /// The log filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl ServerConfig {
    /// Loads the settings from the defaults and the environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if an override cannot be converted, e.g. a non-numeric port.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::with_prefix("HTTPWIRE"))
    }

    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("host", "127.0.0.1")?
            .set_default("port", 42069)?
            .set_default("log_level", "info")?
            .add_source(environment.try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
