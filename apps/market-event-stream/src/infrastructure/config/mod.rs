//! Configuration Module
//!
//! Configuration loading for the event-stream client.

mod settings;

pub use settings::{
    ClientConfig, ConfigError, Credentials, StreamSettings, load_dotenv, load_dotenv_from,
};
