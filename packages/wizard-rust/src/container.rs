//! Insertion-ordered collections of named items.

use std::fmt;
use std::marker::PhantomData;

use msbwizard_core::Introspect;
use serde::de::{self, Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, warn};

use crate::entity::{CodeTemplate, Named, WizardBlock};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    #[error("Cannot add item with no name")]
    EmptyName,

    #[error("Item with name '{0}' already exists")]
    Duplicate(String),

    #[error("Item name '{item}' does not match key '{key}'")]
    NameMismatch { key: String, item: String },

    #[error("Name '{0}' not found")]
    NotFound(String),
}

/// Named items kept in insertion order. Names are unique.
///
/// Serialized as a JSON object mapping each name to its item.
#[derive(Debug, Clone, PartialEq)]
pub struct Container<T> {
    items: Vec<T>,
}

/// Blocks of a project.
pub type WizardContainer = Container<WizardBlock>;

/// Code templates of a project.
pub type TemplateContainer = Container<CodeTemplate>;

impl<T> Default for Container<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Named> Container<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a container from `items`, in order.
    ///
    /// # Errors
    ///
    /// Fails on the first empty or duplicate name.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Result<Self, ContainerError> {
        let mut container = Self::new();
        for item in items {
            container.add(item)?;
        }
        Ok(container)
    }

    /// Append `item`.
    ///
    /// # Errors
    ///
    /// Returns `EmptyName` or `Duplicate`; the container is unchanged.
    pub fn add(&mut self, item: T) -> Result<(), ContainerError> {
        if item.name().trim().is_empty() {
            return Err(ContainerError::EmptyName);
        }
        if self.has_item(item.name()) {
            return Err(ContainerError::Duplicate(item.name().to_owned()));
        }
        debug!(name = item.name(), "added item");
        self.items.push(item);
        Ok(())
    }

    /// Insert or replace the item stored under `name`, keeping its position.
    ///
    /// # Errors
    ///
    /// Returns `NameMismatch` if `item` is not named `name`.
    pub fn set_item(&mut self, name: &str, item: T) -> Result<(), ContainerError> {
        if item.name() != name {
            return Err(ContainerError::NameMismatch {
                key: name.to_owned(),
                item: item.name().to_owned(),
            });
        }
        match self.position(name) {
            Some(index) => self.items[index] = item,
            None => self.add(item)?,
        }
        debug!(name, "set item");
        Ok(())
    }

    /// Remove and return the item named `name`.
    pub fn remove(&mut self, name: &str) -> Option<T> {
        let Some(index) = self.position(name) else {
            warn!(name, "name not found");
            return None;
        };
        debug!(name, "removed item");
        Some(self.items.remove(index))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&T> {
        self.items.iter().find(|item| item.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.items.iter_mut().find(|item| item.name() == name)
    }

    #[must_use]
    pub fn has_item(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn items_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(Named::name)
    }

    pub fn active_items(&self) -> impl Iterator<Item = &T> {
        self.items.iter().filter(|item| item.is_active())
    }

    pub fn inactive_items(&self) -> impl Iterator<Item = &T> {
        self.items.iter().filter(|item| !item.is_active())
    }

    /// # Errors
    ///
    /// Returns `NotFound` if no item is named `name`.
    pub fn activate_item(&mut self, name: &str) -> Result<(), ContainerError> {
        self.set_item_active(name, true)
    }

    /// # Errors
    ///
    /// Returns `NotFound` if no item is named `name`.
    pub fn deactivate_item(&mut self, name: &str) -> Result<(), ContainerError> {
        self.set_item_active(name, false)
    }

    pub fn activate_all(&mut self) {
        self.items.iter_mut().for_each(|item| item.set_active(true));
    }

    pub fn deactivate_all(&mut self) {
        self.items.iter_mut().for_each(|item| item.set_active(false));
    }

    /// Remove every active item, returning how many were dropped.
    pub fn drop_active(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !item.is_active());
        before - self.items.len()
    }

    /// Remove every inactive item, returning how many were dropped.
    pub fn drop_inactive(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(Named::is_active);
        before - self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| item.name() == name)
    }

    fn set_item_active(&mut self, name: &str, active: bool) -> Result<(), ContainerError> {
        let item = self
            .get_mut(name)
            .ok_or_else(|| ContainerError::NotFound(name.to_owned()))?;
        item.set_active(active);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serde
// ---------------------------------------------------------------------------

impl<T: Named + Serialize> Serialize for Container<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.items.len()))?;
        for item in &self.items {
            map.serialize_entry(item.name(), item)?;
        }
        map.end()
    }
}

impl<'de, T: Named + Deserialize<'de>> Deserialize<'de> for Container<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ContainerVisitor<T>(PhantomData<T>);

        impl<'de, T: Named + Deserialize<'de>> Visitor<'de> for ContainerVisitor<T> {
            type Value = Container<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of item name to item")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut container = Container::new();
                while let Some((key, item)) = map.next_entry::<String, T>()? {
                    if key != item.name() {
                        return Err(de::Error::custom(ContainerError::NameMismatch {
                            key,
                            item: item.name().to_owned(),
                        }));
                    }
                    item.validate().map_err(de::Error::custom)?;
                    container.add(item).map_err(de::Error::custom)?;
                }
                Ok(container)
            }
        }

        deserializer.deserialize_map(ContainerVisitor(PhantomData))
    }
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

const CONTAINER_METHODS: &[&str] = &[
    "activate_all",
    "activate_item",
    "active_items",
    "add",
    "clear",
    "deactivate_all",
    "deactivate_item",
    "drop_active",
    "drop_inactive",
    "get",
    "has_item",
    "inactive_items",
    "remove",
    "set_item",
];

impl Introspect for WizardContainer {
    fn public_methods() -> &'static [&'static str] {
        CONTAINER_METHODS
    }

    fn type_name() -> &'static str {
        "WizardContainer"
    }
}

impl Introspect for TemplateContainer {
    fn public_methods() -> &'static [&'static str] {
        CONTAINER_METHODS
    }

    fn type_name() -> &'static str {
        "TemplateContainer"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::entity::BlockType;

    fn blocks(names: &[&str]) -> WizardContainer {
        Container::from_items(names.iter().map(|n| WizardBlock::new(*n, BlockType::Entity)))
            .unwrap()
    }

    #[test]
    fn add_rejects_duplicates_and_empty_names() {
        let mut container = blocks(&["a", "b"]);
        assert_eq!(
            container.add(WizardBlock::new("a", BlockType::Entity)),
            Err(ContainerError::Duplicate("a".into()))
        );
        assert_eq!(
            container.add(WizardBlock::new("", BlockType::Entity)),
            Err(ContainerError::EmptyName)
        );
        assert_eq!(container.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn set_item_replaces_in_place() {
        let mut container = blocks(&["a", "b", "c"]);
        let moved = WizardBlock::new("b", BlockType::Operation).with_position((5, 5));
        container.set_item("b", moved.clone()).unwrap();
        assert_eq!(container.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(container.get("b"), Some(&moved));

        let err = container
            .set_item("a", WizardBlock::new("z", BlockType::Entity))
            .unwrap_err();
        assert_eq!(err.to_string(), "Item name 'z' does not match key 'a'");

        container.set_item("d", WizardBlock::new("d", BlockType::Entity)).unwrap();
        assert_eq!(container.len(), 4);
    }

    #[test]
    fn activation_and_dropping() {
        let mut container = blocks(&["a", "b", "c"]);
        container.deactivate_item("b").unwrap();
        assert_eq!(
            container.activate_item("zz"),
            Err(ContainerError::NotFound("zz".into()))
        );
        assert_eq!(container.inactive_items().count(), 1);
        assert_eq!(container.drop_inactive(), 1);
        assert_eq!(container.names().collect::<Vec<_>>(), vec!["a", "c"]);

        container.deactivate_all();
        assert_eq!(container.active_items().count(), 0);
        container.activate_all();
        assert_eq!(container.drop_active(), 2);
        assert!(container.is_empty());
    }

    #[test]
    fn remove_returns_item() {
        let mut container = blocks(&["a", "b"]);
        assert_eq!(container.remove("a").map(|b| b.name), Some("a".to_owned()));
        assert!(container.remove("a").is_none());
        assert!(!container.has_item("a"));
        container.clear();
        assert!(container.is_empty());
    }

    #[test]
    fn serializes_as_name_keyed_map() {
        let container = blocks(&["b", "a"]);
        let value = serde_json::to_value(&container).unwrap();
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);

        let back: WizardContainer = serde_json::from_value(value).unwrap();
        assert_eq!(back, container);
    }

    #[test]
    fn deserialize_checks_keys_and_items() {
        let err = serde_json::from_value::<WizardContainer>(json!({
            "a": {"name": "b", "block_type": "entity"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("does not match key 'a'"), "{err}");

        let err = serde_json::from_value::<TemplateContainer>(json!({
            "t": {"name": "t", "template": "", "block_type": "entity"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("Template content cannot be empty"), "{err}");
    }

    #[test]
    fn container_types_have_distinct_names() {
        use msbwizard_core::BaseType;
        assert_eq!(BaseType::of::<WizardContainer>().key.name(), "WizardContainer");
        assert_eq!(BaseType::of::<TemplateContainer>().key.name(), "TemplateContainer");
        assert_ne!(
            BaseType::of::<WizardContainer>().key,
            BaseType::of::<TemplateContainer>().key
        );
    }
}
