//! A small persistence gateway for local-first browser apps.
//!
//! Everything that wants to remember something goes through [`KeyValueStore`]:
//! `get`, `set` and `remove` by string key. In the browser that is
//! `localStorage`; natively (and in tests) it is [`MemoryStore`].
//!
//! On top of that sit:
//! 1. lenient JSON reads and all-or-nothing JSON writes ([`json`]),
//! 2. retry with exponential backoff for transient write failures ([`retry`]),
//! 3. a typed listener registry so owners can tell the UI what changed ([`notify`]).

pub mod json;
pub mod notify;
pub mod retry;
mod store;

#[cfg(all(target_arch = "wasm32", feature = "web-storage"))]
pub mod local_storage;

pub use json::{WriteError, read_json, try_read_json, write_json};
pub use notify::{ListenerKey, Listeners};
pub use retry::{Immediate, Pause, RetryPolicy, retry};
pub use store::{KeyValueStore, MemoryStore, StoreError};

#[cfg(all(target_arch = "wasm32", feature = "web-storage"))]
pub use local_storage::LocalStorage;
#[cfg(all(target_arch = "wasm32", feature = "web-storage"))]
pub use retry::BrowserTimeout;
