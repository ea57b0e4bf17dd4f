//! Name → capability registries
//!
//! Filters and post-processors are looked up by the names stacks use in
//! their configuration. A registry is populated once through a
//! [`RegistryBuilder`] during wiring and is immutable afterwards, so
//! concurrent lookups need no locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} '{name}' is already registered")]
    Duplicate { kind: &'static str, name: String },

    #[error("{kind} name must not be empty")]
    EmptyName { kind: &'static str },
}

/// Immutable mapping from name to a shared capability
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Registry<T> {
    pub fn builder(kind: &'static str) -> RegistryBuilder<T> {
        RegistryBuilder {
            kind,
            entries: HashMap::new(),
        }
    }

    /// What this registry holds ("filter", "post-processor")
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn get(&self, name: &str) -> Option<&Arc<T>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Every name in `requested` that is not registered, in request order
    pub fn missing<'a>(&self, requested: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        requested
            .into_iter()
            .filter(|name| !self.contains(name))
            .map(str::to_string)
            .collect()
    }
}

impl<T: ?Sized> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            entries: self.entries.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

/// Collects registrations before freezing them into a [`Registry`]
pub struct RegistryBuilder<T: ?Sized> {
    kind: &'static str,
    entries: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> RegistryBuilder<T> {
    pub fn register(
        mut self,
        name: impl Into<String>,
        entry: Arc<T>,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName { kind: self.kind });
        }
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate {
                kind: self.kind,
                name,
            });
        }
        self.entries.insert(name, entry);
        Ok(self)
    }

    pub fn build(self) -> Registry<T> {
        Registry {
            kind: self.kind,
            entries: self.entries,
        }
    }
}
