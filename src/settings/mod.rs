//! Backend endpoint settings
//!
//! Holds the single backend URL the client talks to:
//! - Durable key-value storage (JSON file or in-memory)
//! - Derived `configured` flag
//! - `GET <url>/ping` liveness check

mod endpoint;
mod store;

pub use endpoint::{EndpointSettings, SettingsStore, BACKEND_URL_KEY};
pub use store::{FileStore, KeyValueStore, MemoryStore};
