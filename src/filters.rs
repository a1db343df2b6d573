use anyhow::{Result, anyhow};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A physical filter definition: the canonical name, the abstract band it
/// belongs to, and any legacy aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDefinition {
    pub name: String,
    pub band: String,
    pub aliases: BTreeSet<String>,
}

impl FilterDefinition {
    pub fn new(name: impl Into<String>, band: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            band: band.into(),
            aliases: BTreeSet::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }
}

/// Process-wide filter name registry.
///
/// Lifecycle: the registry starts empty; instruments register their filter
/// sets during setup, and tests call `reset` between cases. Re-registering
/// an identical definition is a no-op; redefining a name with a different
/// band or alias set is a collision and fails.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    by_name: BTreeMap<String, FilterDefinition>,
}

impl FilterRegistry {
    pub const fn new() -> Self {
        Self {
            by_name: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, definition: FilterDefinition) -> Result<()> {
        if let Some(existing) = self.by_name.get(&definition.name) {
            if existing == &definition {
                return Ok(());
            }
            return Err(anyhow!(
                "filter {} is already registered with a different definition",
                definition.name
            ));
        }
        for other in self.by_name.values() {
            if other.aliases.contains(&definition.name)
                || definition.aliases.contains(&other.name)
                || other.aliases.intersection(&definition.aliases).next().is_some()
            {
                return Err(anyhow!(
                    "filter {} collides with already-registered filter {}",
                    definition.name,
                    other.name
                ));
            }
        }
        self.by_name.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Look a filter up by canonical name or alias.
    pub fn find(&self, name: &str) -> Option<&FilterDefinition> {
        if let Some(def) = self.by_name.get(name) {
            return Some(def);
        }
        self.by_name
            .values()
            .find(|def| def.aliases.contains(name))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn reset(&mut self) {
        self.by_name.clear();
    }
}

static GLOBAL: Mutex<FilterRegistry> = Mutex::new(FilterRegistry::new());

/// Access the process-wide registry. A poisoned lock is recovered rather
/// than propagated: the registry's state is a plain map and stays coherent
/// across a panicking registration.
pub fn global() -> MutexGuard<'static, FilterRegistry> {
    GLOBAL.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_reregistration_is_idempotent() {
        let mut registry = FilterRegistry::new();
        let g = FilterDefinition::new("g", "g").with_aliases(["g2"]);
        registry.register(g.clone()).expect("first");
        registry.register(g).expect("second");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn conflicting_redefinition_is_rejected() {
        let mut registry = FilterRegistry::new();
        registry
            .register(FilterDefinition::new("g", "g"))
            .expect("first");
        let err = registry
            .register(FilterDefinition::new("g", "r"))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn alias_collisions_are_detected() {
        let mut registry = FilterRegistry::new();
        registry
            .register(FilterDefinition::new("g", "g").with_aliases(["green"]))
            .expect("first");
        assert!(
            registry
                .register(FilterDefinition::new("green", "r"))
                .is_err()
        );
        assert!(
            registry
                .register(FilterDefinition::new("r", "r").with_aliases(["green"]))
                .is_err()
        );
    }

    #[test]
    fn lookup_resolves_aliases_and_reset_clears() {
        let mut registry = FilterRegistry::new();
        registry
            .register(FilterDefinition::new("HSC-G", "g").with_aliases(["g"]))
            .expect("register");
        assert_eq!(registry.find("g").map(|d| d.name.as_str()), Some("HSC-G"));
        registry.reset();
        assert!(registry.is_empty());
        assert!(registry.find("g").is_none());
    }
}
