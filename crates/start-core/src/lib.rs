//! Shared data model and error classification for the start launcher.

pub mod error;
pub mod keys;
pub mod types;

pub use error::StartError;
pub use types::{
    Agent, AssetKind, Base, Config, Context, Role, Settings, Task, Utd, DEFAULT_TIMEOUT_SECS,
    MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS,
};
