//! Config scope store.
//!
//! Typed key/value configuration held at Global, Socket and Connection
//! scope, including the handler references the event dispatcher resolves
//! at dispatch time.

mod key;
mod store;

pub use key::{Applicability, ConfigKey, ConfigValue, ScopeKind, ValueType};
pub use store::{ConfigScope, ConfigStore};
