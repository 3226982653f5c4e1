//! Value store: field name → current value, partitioned by lifetime.

use crate::field::{FieldDef, Lifetime};
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A read-only snapshot of current values, handed to derivation closures.
pub type Snapshot = BTreeMap<Arc<str>, Value>;

/// Current values of one component instance.
///
/// Partitioned into three lifetime buckets so the reconnection layer can
/// persist the durable ones; reads and writes address fields by name and
/// are routed to the owning partition.
#[derive(Debug, Default)]
pub struct ValueStore {
    shareable: IndexMap<Arc<str>, Value>,
    private: IndexMap<Arc<str>, Value>,
    transient: IndexMap<Arc<str>, Value>,
    partition_of: BTreeMap<Arc<str>, Lifetime>,
}

impl ValueStore {
    /// Instantiate from field declarations: every field starts at its
    /// default. Derived node values live in the transient partition.
    pub fn from_fields<'a>(
        fields: impl IntoIterator<Item = &'a FieldDef>,
        derived_names: impl IntoIterator<Item = Arc<str>>,
    ) -> Self {
        let mut store = Self::default();
        for field in fields {
            store.declare(field.name.clone(), field.lifetime, field.default.clone());
        }
        for name in derived_names {
            store.declare(name, Lifetime::Transient, Value::Unit);
        }
        store
    }

    fn declare(&mut self, name: Arc<str>, lifetime: Lifetime, value: Value) {
        self.partition_of.insert(name.clone(), lifetime);
        self.partition_mut(lifetime).insert(name, value);
    }

    fn partition_mut(&mut self, lifetime: Lifetime) -> &mut IndexMap<Arc<str>, Value> {
        match lifetime {
            Lifetime::Shareable => &mut self.shareable,
            Lifetime::Private => &mut self.private,
            Lifetime::Transient => &mut self.transient,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let lifetime = self.partition_of.get(name)?;
        match lifetime {
            Lifetime::Shareable => self.shareable.get(name),
            Lifetime::Private => self.private.get(name),
            Lifetime::Transient => self.transient.get(name),
        }
    }

    /// Write a value. Returns the previous value, or None when the name is
    /// not declared (the write is dropped).
    pub fn set(&mut self, name: &str, value: Value) -> Option<Value> {
        let lifetime = *self.partition_of.get(name)?;
        let name = self
            .partition_of
            .get_key_value(name)
            .map(|(key, _)| key.clone())?;
        self.partition_mut(lifetime).insert(name, value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.partition_of.contains_key(name)
    }

    /// Overlay hydrated initial values on top of the defaults. Unknown
    /// names are ignored (hydration sources can carry extra keys).
    pub fn hydrate(&mut self, initial: &Snapshot) {
        for (name, value) in initial {
            if self.contains(name) {
                self.set(name, value.clone());
            }
        }
    }

    /// Snapshot of all current values, for derivation evaluation.
    pub fn snapshot(&self) -> Snapshot {
        self.shareable
            .iter()
            .chain(self.private.iter())
            .chain(self.transient.iter())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Values in the durable partitions, for the persistence layer.
    pub fn durable_values(&self) -> Snapshot {
        self.shareable
            .iter()
            .chain(self.private.iter())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;

    fn store() -> ValueStore {
        let fields = [
            FieldDef::new("count", FieldType::Primitive, Value::number(0.0))
                .lifetime(Lifetime::Shareable),
            FieldDef::new("draft", FieldType::Primitive, Value::text(""))
                .lifetime(Lifetime::Private),
            FieldDef::new("open", FieldType::Primitive, Value::bool(false)),
        ];
        ValueStore::from_fields(fields.iter(), [Arc::from("doubled")])
    }

    #[test]
    fn defaults_and_partitions() {
        let store = store();
        assert_eq!(store.get("count"), Some(&Value::number(0.0)));
        assert_eq!(store.get("doubled"), Some(&Value::Unit));
        let durable = store.durable_values();
        assert!(durable.contains_key("count"));
        assert!(durable.contains_key("draft"));
        assert!(!durable.contains_key("open"));
        assert!(!durable.contains_key("doubled"));
    }

    #[test]
    fn set_returns_previous_and_rejects_unknown() {
        let mut store = store();
        assert_eq!(
            store.set("count", Value::number(3.0)),
            Some(Value::number(0.0))
        );
        assert_eq!(store.set("missing", Value::number(1.0)), None);
    }

    #[test]
    fn hydrate_overlays_known_names_only() {
        let mut store = store();
        let initial = Snapshot::from([
            (Arc::from("count"), Value::number(7.0)),
            (Arc::from("junk"), Value::text("ignored")),
        ]);
        store.hydrate(&initial);
        assert_eq!(store.get("count"), Some(&Value::number(7.0)));
        assert!(!store.contains("junk"));
    }
}
