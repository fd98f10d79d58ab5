//! Hierarchical config scope store.
//!
//! Values live at Global, Socket or Connection scope. Reads resolve
//! Connection -> owning Socket -> Global -> declared default, under a read
//! lock, so a reader always sees a whole value and never a half-applied
//! write.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

use super::key::{ConfigKey, ConfigValue, ScopeKind, ValueType};
use crate::core::{ConfigError, ConnectionHandle, ListenSocketHandle};
use crate::events::EventHandler;

/// Where a config value is stored or resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigScope {
    /// Process-wide defaults.
    Global,
    /// A listen socket.
    Socket(ListenSocketHandle),
    /// A single connection.
    Connection(ConnectionHandle),
}

impl ConfigScope {
    /// Kind of this scope.
    pub fn kind(&self) -> ScopeKind {
        match self {
            ConfigScope::Global => ScopeKind::Global,
            ConfigScope::Socket(_) => ScopeKind::Socket,
            ConfigScope::Connection(_) => ScopeKind::Connection,
        }
    }
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigScope::Global => write!(f, "global"),
            ConfigScope::Socket(h) => write!(f, "socket({h})"),
            ConfigScope::Connection(h) => write!(f, "connection({h})"),
        }
    }
}

type Entries = HashMap<ConfigKey, ConfigValue>;

#[derive(Debug, Default)]
struct ConnectionEntries {
    parent: Option<ListenSocketHandle>,
    values: Entries,
}

#[derive(Debug, Default)]
struct StoreInner {
    global: Entries,
    sockets: HashMap<ListenSocketHandle, Entries>,
    connections: HashMap<ConnectionHandle, ConnectionEntries>,
}

impl StoreInner {
    /// Explicitly stored value for `key` as seen from `scope`, with the scope it came from.
    fn lookup(
        &self,
        scope: ConfigScope,
        key: ConfigKey,
    ) -> Result<Option<(ScopeKind, &ConfigValue)>, ConfigError> {
        match scope {
            ConfigScope::Global => Ok(self.global.get(&key).map(|v| (ScopeKind::Global, v))),
            ConfigScope::Socket(h) => {
                let entries = self
                    .sockets
                    .get(&h)
                    .ok_or(ConfigError::UnknownScope(scope))?;
                match entries.get(&key) {
                    Some(v) => Ok(Some((ScopeKind::Socket, v))),
                    None => self.lookup(ConfigScope::Global, key),
                }
            }
            ConfigScope::Connection(h) => {
                let entries = self
                    .connections
                    .get(&h)
                    .ok_or(ConfigError::UnknownScope(scope))?;
                if let Some(v) = entries.values.get(&key) {
                    return Ok(Some((ScopeKind::Connection, v)));
                }
                match entries.parent {
                    // A parent that is already gone falls through to global.
                    Some(parent) if self.sockets.contains_key(&parent) => {
                        self.lookup(ConfigScope::Socket(parent), key)
                    }
                    _ => self.lookup(ConfigScope::Global, key),
                }
            }
        }
    }

    fn entries_mut(&mut self, scope: ConfigScope) -> Result<&mut Entries, ConfigError> {
        match scope {
            ConfigScope::Global => Ok(&mut self.global),
            ConfigScope::Socket(h) => self
                .sockets
                .get_mut(&h)
                .ok_or(ConfigError::UnknownScope(scope)),
            ConfigScope::Connection(h) => self
                .connections
                .get_mut(&h)
                .map(|c| &mut c.values)
                .ok_or(ConfigError::UnknownScope(scope)),
        }
    }
}

/// Shared, thread-safe store of typed config values.
#[derive(Debug, Default)]
pub struct ConfigStore {
    inner: RwLock<StoreInner>,
}

impl ConfigStore {
    /// Create an empty store holding only the global scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` for `key` at `scope`.
    pub fn set(
        &self,
        scope: ConfigScope,
        key: ConfigKey,
        value: impl Into<ConfigValue>,
    ) -> Result<(), ConfigError> {
        let value = value.into();
        if !key.applicability().allows(scope.kind()) {
            return Err(ConfigError::ScopeNotApplicable {
                key,
                scope: scope.kind(),
            });
        }
        key.validate(&value)?;

        let mut inner = self.inner.write();
        inner.entries_mut(scope)?.insert(key, value);
        Ok(())
    }

    /// Remove an explicit entry so the scope inherits again.
    ///
    /// Returns whether an entry was removed.
    pub fn clear(&self, scope: ConfigScope, key: ConfigKey) -> Result<bool, ConfigError> {
        let mut inner = self.inner.write();
        Ok(inner.entries_mut(scope)?.remove(&key).is_some())
    }

    /// Resolve `key` for `scope` through the inheritance chain, falling back to
    /// the declared default. `None` only for handler keys nobody registered.
    pub fn get(&self, scope: ConfigScope, key: ConfigKey) -> Result<Option<ConfigValue>, ConfigError> {
        let inner = self.inner.read();
        match inner.lookup(scope, key)? {
            Some((_, value)) => Ok(Some(value.clone())),
            None => Ok(key.default_value()),
        }
    }

    /// Like [`ConfigStore::get`] but ignores defaults and reports which scope
    /// the value came from.
    pub fn lookup(
        &self,
        scope: ConfigScope,
        key: ConfigKey,
    ) -> Result<Option<(ScopeKind, ConfigValue)>, ConfigError> {
        let inner = self.inner.read();
        Ok(inner
            .lookup(scope, key)?
            .map(|(origin, value)| (origin, value.clone())))
    }

    /// Resolve an `Int32` key.
    pub fn get_i32(&self, scope: ConfigScope, key: ConfigKey) -> Result<i32, ConfigError> {
        self.typed(scope, key, ValueType::Int32, |v| v.as_i32())
    }

    /// Resolve a `Float` key.
    pub fn get_f32(&self, scope: ConfigScope, key: ConfigKey) -> Result<f32, ConfigError> {
        self.typed(scope, key, ValueType::Float, |v| v.as_f32())
    }

    /// Resolve an `Int64` key.
    pub fn get_i64(&self, scope: ConfigScope, key: ConfigKey) -> Result<i64, ConfigError> {
        self.typed(scope, key, ValueType::Int64, |v| v.as_i64())
    }

    /// Resolve a `String` key.
    pub fn get_string(&self, scope: ConfigScope, key: ConfigKey) -> Result<String, ConfigError> {
        self.typed(scope, key, ValueType::String, |v| v.as_str().map(str::to_owned))
    }

    /// Resolve a handler key. `Ok(None)` when no scope in the chain registered one.
    pub fn get_handler(
        &self,
        scope: ConfigScope,
        key: ConfigKey,
    ) -> Result<Option<EventHandler>, ConfigError> {
        if key.value_type() != ValueType::Handler {
            return Err(ConfigError::TypeMismatch {
                key,
                expected: key.value_type(),
                actual: ValueType::Handler,
            });
        }
        Ok(self
            .get(scope, key)?
            .and_then(|v| v.as_handler().cloned()))
    }

    /// Whether `scope` currently exists.
    pub fn contains_scope(&self, scope: ConfigScope) -> bool {
        let inner = self.inner.read();
        match scope {
            ConfigScope::Global => true,
            ConfigScope::Socket(h) => inner.sockets.contains_key(&h),
            ConfigScope::Connection(h) => inner.connections.contains_key(&h),
        }
    }

    pub(crate) fn create_socket_scope(&self, socket: ListenSocketHandle) {
        self.inner.write().sockets.entry(socket).or_default();
    }

    /// Create a connection scope under `parent`, pinning every snapshot key to
    /// the value it resolves to right now.
    pub(crate) fn create_connection_scope(
        &self,
        connection: ConnectionHandle,
        parent: Option<ListenSocketHandle>,
    ) {
        let mut inner = self.inner.write();
        let from = match parent {
            Some(socket) if inner.sockets.contains_key(&socket) => ConfigScope::Socket(socket),
            _ => ConfigScope::Global,
        };

        let mut values = Entries::new();
        for key in ConfigKey::ALL.iter().copied().filter(|k| k.snapshot_on_create()) {
            let resolved = inner
                .lookup(from, key)
                .ok()
                .flatten()
                .map(|(_, v)| v.clone())
                .or_else(|| key.default_value());
            if let Some(value) = resolved {
                values.insert(key, value);
            }
        }

        inner
            .connections
            .insert(connection, ConnectionEntries { parent, values });
    }

    /// Tear down a socket or connection scope. The global scope is permanent.
    pub(crate) fn remove_scope(&self, scope: ConfigScope) -> bool {
        let mut inner = self.inner.write();
        match scope {
            ConfigScope::Global => false,
            ConfigScope::Socket(h) => inner.sockets.remove(&h).is_some(),
            ConfigScope::Connection(h) => inner.connections.remove(&h).is_some(),
        }
    }

    fn typed<T>(
        &self,
        scope: ConfigScope,
        key: ConfigKey,
        wanted: ValueType,
        extract: impl FnOnce(ConfigValue) -> Option<T>,
    ) -> Result<T, ConfigError> {
        let mismatch = ConfigError::TypeMismatch {
            key,
            expected: key.value_type(),
            actual: wanted,
        };
        if key.value_type() != wanted {
            return Err(mismatch);
        }
        self.get(scope, key)?.and_then(extract).ok_or(mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RawHandle;

    fn socket(n: u64) -> ListenSocketHandle {
        ListenSocketHandle::from(RawHandle::from_u64((1 << 32) | n))
    }

    fn conn(n: u64) -> ConnectionHandle {
        ConnectionHandle::from(RawHandle::from_u64((1 << 32) | n))
    }

    #[test]
    fn test_defaults() {
        let store = ConfigStore::new();
        assert_eq!(
            store
                .get_i32(ConfigScope::Global, ConfigKey::SendBufferSize)
                .unwrap(),
            512 * 1024
        );
        assert!(
            store
                .get_handler(ConfigScope::Global, ConfigKey::ConnectionStatusChanged)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_inheritance_chain() {
        let store = ConfigStore::new();
        store.create_socket_scope(socket(0));
        store.create_connection_scope(conn(0), Some(socket(0)));

        store
            .set(ConfigScope::Global, ConfigKey::NagleTime, 100)
            .unwrap();
        assert_eq!(
            store
                .get_i32(ConfigScope::Connection(conn(0)), ConfigKey::NagleTime)
                .unwrap(),
            100
        );

        store
            .set(ConfigScope::Socket(socket(0)), ConfigKey::NagleTime, 200)
            .unwrap();
        assert_eq!(
            store
                .lookup(ConfigScope::Connection(conn(0)), ConfigKey::NagleTime)
                .unwrap(),
            Some((ScopeKind::Socket, ConfigValue::Int32(200)))
        );

        store
            .set(ConfigScope::Connection(conn(0)), ConfigKey::NagleTime, 300)
            .unwrap();
        assert_eq!(
            store
                .get_i32(ConfigScope::Connection(conn(0)), ConfigKey::NagleTime)
                .unwrap(),
            300
        );

        assert!(
            store
                .clear(ConfigScope::Connection(conn(0)), ConfigKey::NagleTime)
                .unwrap()
        );
        assert_eq!(
            store
                .get_i32(ConfigScope::Connection(conn(0)), ConfigKey::NagleTime)
                .unwrap(),
            200
        );
    }

    #[test]
    fn test_snapshot_keys_are_pinned_at_creation() {
        let store = ConfigStore::new();
        store.create_socket_scope(socket(1));
        store
            .set(ConfigScope::Socket(socket(1)), ConfigKey::SendBufferSize, 4096)
            .unwrap();
        store.create_connection_scope(conn(1), Some(socket(1)));

        store
            .set(ConfigScope::Socket(socket(1)), ConfigKey::SendBufferSize, 8192)
            .unwrap();
        assert_eq!(
            store
                .get_i32(ConfigScope::Connection(conn(1)), ConfigKey::SendBufferSize)
                .unwrap(),
            4096
        );
    }

    #[test]
    fn test_scope_applicability() {
        let store = ConfigStore::new();
        store.create_connection_scope(conn(2), None);

        let err = store
            .set(ConfigScope::Connection(conn(2)), ConfigKey::ServiceInterval, 5)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ScopeNotApplicable {
                key: ConfigKey::ServiceInterval,
                scope: ScopeKind::Connection,
            }
        );

        assert!(
            store
                .set(ConfigScope::Global, ConfigKey::ConnectionUserData, 7i64)
                .is_err()
        );
        assert!(
            store
                .set(ConfigScope::Connection(conn(2)), ConfigKey::ConnectionUserData, 7i64)
                .is_ok()
        );
    }

    #[test]
    fn test_unknown_scope() {
        let store = ConfigStore::new();
        let scope = ConfigScope::Connection(conn(3));
        assert_eq!(
            store.get(scope, ConfigKey::NagleTime).unwrap_err(),
            ConfigError::UnknownScope(scope)
        );

        store.create_connection_scope(conn(3), None);
        assert!(store.contains_scope(scope));
        assert!(store.remove_scope(scope));
        assert!(!store.contains_scope(scope));
        assert!(store.set(scope, ConfigKey::NagleTime, 1).is_err());
        assert!(!store.remove_scope(ConfigScope::Global));
    }

    #[test]
    fn test_typed_getter_rejects_wrong_type() {
        let store = ConfigStore::new();
        assert!(
            store
                .get_f32(ConfigScope::Global, ConfigKey::SendBufferSize)
                .is_err()
        );
        assert!(
            store
                .get_handler(ConfigScope::Global, ConfigKey::NagleTime)
                .is_err()
        );
        assert_eq!(
            store
                .get_string(ConfigScope::Global, ConfigKey::P2PStunServerList)
                .unwrap(),
            ""
        );
    }

    #[test]
    fn test_orphaned_connection_falls_back_to_global() {
        let store = ConfigStore::new();
        store.create_socket_scope(socket(4));
        store.create_connection_scope(conn(4), Some(socket(4)));
        store
            .set(ConfigScope::Socket(socket(4)), ConfigKey::RecvBufferMessages, 3)
            .unwrap();
        store.remove_scope(ConfigScope::Socket(socket(4)));

        assert_eq!(
            store
                .get_i32(ConfigScope::Connection(conn(4)), ConfigKey::RecvBufferMessages)
                .unwrap(),
            1000
        );
    }

    #[test]
    fn test_concurrent_readers_see_whole_values() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(ConfigStore::new());
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..1000 {
                    let s = if i % 2 == 0 { "a,a,a,a" } else { "b,b,b,b" };
                    store
                        .set(ConfigScope::Global, ConfigKey::P2PStunServerList, s)
                        .unwrap();
                }
            })
        };

        for _ in 0..1000 {
            let v = store
                .get_string(ConfigScope::Global, ConfigKey::P2PStunServerList)
                .unwrap();
            assert!(v.is_empty() || v == "a,a,a,a" || v == "b,b,b,b");
        }
        writer.join().unwrap();
    }
}
