//! Method registry: maps a concrete type to the methods it exposes for dispatch.

use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::Value;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// TypeKey
// ---------------------------------------------------------------------------

/// Identity of a concrete Rust type, with a short display name for messages.
///
/// Equality and hashing use only the `TypeId`; the name is informational.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for the type `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name(std::any::type_name::<T>()),
        }
    }

    /// Key for the type `T`, displayed as `name`.
    #[must_use]
    pub fn named<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name,
        }
    }

    /// Unqualified type name without generic arguments (e.g. `"WizardBlock"`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ---------------------------------------------------------------------------
// Introspect
// ---------------------------------------------------------------------------

/// Static description of the methods a type exposes to the router.
///
/// Implemented by every type that can be declared as a base type of a
/// `Router`. The method list is what `Router::get_methods_for_type` reports.
pub trait Introspect: 'static {
    /// Names of the public methods of this type.
    fn public_methods() -> &'static [&'static str];

    /// Name used in messages. Defaults to the unqualified type name.
    fn type_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

const SEQUENCE_METHODS: &[&str] = &[
    "clear", "extend", "get", "insert", "is_empty", "len", "pop", "push", "remove", "retain",
    "sort", "truncate",
];

const MAP_METHODS: &[&str] = &[
    "clear",
    "contains_key",
    "entry",
    "get",
    "get_mut",
    "insert",
    "is_empty",
    "keys",
    "len",
    "remove",
    "retain",
    "values",
];

impl<T: 'static> Introspect for Vec<T> {
    fn public_methods() -> &'static [&'static str] {
        SEQUENCE_METHODS
    }
}

impl<K: 'static, V: 'static, S: 'static> Introspect for HashMap<K, V, S> {
    fn public_methods() -> &'static [&'static str] {
        MAP_METHODS
    }
}

impl<K: 'static, V: 'static> Introspect for BTreeMap<K, V> {
    fn public_methods() -> &'static [&'static str] {
        MAP_METHODS
    }
}

impl Introspect for serde_json::Map<String, Value> {
    fn public_methods() -> &'static [&'static str] {
        MAP_METHODS
    }
}

// ---------------------------------------------------------------------------
// BaseType
// ---------------------------------------------------------------------------

/// A type declared to the router together with its method list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseType {
    pub key: TypeKey,
    pub methods: &'static [&'static str],
}

impl BaseType {
    /// Describe `T` through its `Introspect` impl.
    #[must_use]
    pub fn of<T: Introspect>() -> Self {
        Self {
            key: TypeKey::named::<T>(T::type_name()),
            methods: T::public_methods(),
        }
    }
}

// ---------------------------------------------------------------------------
// MethodRegistry
// ---------------------------------------------------------------------------

/// Sorted set of method names registered for one type.
pub type MethodSet = BTreeSet<&'static str>;

/// Errors from registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("No methods registered for type {type_name}")]
    NotFound { type_name: &'static str },
}

/// Lookup table from concrete type to its dispatchable methods.
///
/// A registry is a pure function of the handlers and base types it was built
/// from. It is never patched in place: the owner rebuilds it whenever either
/// input changes.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    entries: HashMap<TypeKey, MethodSet>,
}

impl MethodRegistry {
    /// Build a registry from handler descriptions and declared base types.
    ///
    /// Every handler gets an entry that always contains `execute`. A base
    /// type with no methods is skipped with a warning.
    pub fn build<I>(handlers: I, base_types: &[BaseType]) -> Self
    where
        I: IntoIterator<Item = (TypeKey, &'static [&'static str])>,
    {
        let mut entries: HashMap<TypeKey, MethodSet> = HashMap::new();

        for (key, methods) in handlers {
            let set: MethodSet = std::iter::once("execute")
                .chain(methods.iter().copied())
                .collect();
            debug!(type_name = key.name(), count = set.len(), "registered handler methods");
            entries.insert(key, set);
        }

        for base in base_types {
            if base.methods.is_empty() {
                warn!(type_name = base.key.name(), "no public methods found for base type");
                continue;
            }
            let set: MethodSet = base.methods.iter().copied().collect();
            debug!(type_name = base.key.name(), count = set.len(), "registered base type methods");
            entries.insert(base.key, set);
        }

        Self { entries }
    }

    /// Whether `key` has an entry.
    #[must_use]
    pub fn contains(&self, key: &TypeKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Methods registered for `key`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the type has no entry.
    pub fn methods_for(&self, key: &TypeKey) -> Result<&MethodSet, RegistryError> {
        self.entries
            .get(key)
            .ok_or(RegistryError::NotFound { type_name: key.name() })
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&TypeKey, &MethodSet)> {
        self.entries.iter()
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().map(TypeKey::name).collect();
        names.sort_unstable();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;

    impl Introspect for Widget {
        fn public_methods() -> &'static [&'static str] {
            &["resize", "paint"]
        }
    }

    struct Opaque;

    impl Introspect for Opaque {
        fn public_methods() -> &'static [&'static str] {
            &[]
        }
    }

    struct SomeHandler;

    const DESCRIBE: &[&str] = &["describe"];
    const NO_METHODS: &[&str] = &[];

    #[test]
    fn type_key_uses_short_name() {
        assert_eq!(TypeKey::of::<Widget>().name(), "Widget");
        assert_eq!(TypeKey::of::<Vec<Value>>().name(), "Vec");
        assert_eq!(TypeKey::of::<Widget>(), TypeKey::of::<Widget>());
        assert_ne!(TypeKey::of::<Widget>(), TypeKey::of::<Opaque>());
    }

    #[test]
    fn introspect_can_rename_a_type() {
        struct Inner;
        struct Wrapper<T>(T);

        impl Introspect for Wrapper<Inner> {
            fn public_methods() -> &'static [&'static str] {
                DESCRIBE
            }

            fn type_name() -> &'static str {
                "InnerWrapper"
            }
        }

        let base = BaseType::of::<Wrapper<Inner>>();
        assert_eq!(base.key.name(), "InnerWrapper");
        assert_eq!(base.key, TypeKey::of::<Wrapper<Inner>>());
    }

    #[test]
    fn build_collects_base_type_methods() {
        let registry = MethodRegistry::build(Vec::new(), &[BaseType::of::<Widget>()]);
        let methods = registry.methods_for(&TypeKey::of::<Widget>()).unwrap();
        assert_eq!(methods.iter().copied().collect::<Vec<_>>(), vec!["paint", "resize"]);
    }

    #[test]
    fn handler_entries_always_contain_execute() {
        let registry = MethodRegistry::build(
            vec![(TypeKey::of::<SomeHandler>(), DESCRIBE)],
            &[],
        );
        let methods = registry.methods_for(&TypeKey::of::<SomeHandler>()).unwrap();
        assert!(methods.contains("execute"));
        assert!(methods.contains("describe"));
    }

    #[test]
    fn base_type_without_methods_is_skipped() {
        let registry = MethodRegistry::build(Vec::new(), &[BaseType::of::<Opaque>()]);
        assert!(!registry.contains(&TypeKey::of::<Opaque>()));
        assert!(registry.is_empty());
    }

    #[test]
    fn builtin_containers_expose_standard_methods() {
        let registry = MethodRegistry::build(
            Vec::new(),
            &[
                BaseType::of::<Vec<Value>>(),
                BaseType::of::<serde_json::Map<String, Value>>(),
            ],
        );
        let seq = registry.methods_for(&TypeKey::of::<Vec<Value>>()).unwrap();
        assert!(seq.contains("push") && seq.contains("pop"));
        let map = registry
            .methods_for(&TypeKey::of::<serde_json::Map<String, Value>>())
            .unwrap();
        assert!(map.contains("insert") && map.contains("remove"));
    }

    #[test]
    fn unknown_type_returns_not_found() {
        let registry = MethodRegistry::default();
        let err = registry.methods_for(&TypeKey::of::<Widget>()).unwrap_err();
        assert_eq!(err, RegistryError::NotFound { type_name: "Widget" });
        assert_eq!(err.to_string(), "No methods registered for type Widget");
    }

    #[test]
    fn type_names_are_sorted() {
        let registry = MethodRegistry::build(
            vec![(TypeKey::of::<SomeHandler>(), NO_METHODS)],
            &[BaseType::of::<Widget>()],
        );
        assert_eq!(registry.type_names(), vec!["SomeHandler", "Widget"]);
    }
}
