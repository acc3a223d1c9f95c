//! Append-only state log and point-in-time reconstruction.
//!
//! Every accepted turn becomes a [`StateDelta`]: the statements as decoded
//! plus the flat [`Change`]s they produced. The store keeps a head snapshot
//! up to date on append; [`StateStore::reconstruct`] replays the log from an
//! empty snapshot instead, so it never depends on the head.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::path::Path;
use crate::codec::{Statement, encode};
use crate::error::{CodecError, Result};
use crate::registry::SymbolRegistry;
use crate::value::{Attributes, Entity, Value};

/// One materialized effect of a statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    Symbol { alias: String, canonical: String },
    /// Field-level merge into the named entity, creating it if needed.
    Upsert(Entity),
    Global { key: String, value: Value },
    /// Define or replace a delta base.
    Base { name: String, attributes: Attributes },
}

/// Full logical state at a point in the log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entities: BTreeMap<String, Entity>,
    #[serde(default)]
    pub globals: Attributes,
    #[serde(default)]
    pub bases: BTreeMap<String, Attributes>,
    /// Alias → canonical name.
    #[serde(default)]
    pub symbols: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn apply(&mut self, change: &Change) {
        match change {
            Change::Symbol { alias, canonical } => {
                self.symbols.retain(|a, n| a == alias || n != canonical);
                self.symbols.insert(alias.clone(), canonical.clone());
            }
            Change::Upsert(entity) => {
                self.entities
                    .entry(entity.name.clone())
                    .or_insert_with(|| Entity::new(entity.name.clone()))
                    .merge(entity);
            }
            Change::Global { key, value } => {
                self.globals.insert(key.clone(), value.clone());
            }
            Change::Base { name, attributes } => {
                self.bases.insert(name.clone(), attributes.clone());
            }
        }
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Look up a dotted path.
    ///
    /// A single segment names a global. Longer paths start at the root
    /// entity; each intermediate segment follows a `Ref` stored under that
    /// key, or else the entity named by the dotted prefix so far.
    pub fn resolve(&self, path: &Path) -> Result<&Value> {
        StateView::resolve(self, path)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
            && self.globals.is_empty()
            && self.bases.is_empty()
            && self.symbols.is_empty()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.symbols.is_empty() {
            let pairs: Vec<String> = self
                .symbols
                .iter()
                .map(|(a, n)| format!("{a}={n}"))
                .collect();
            writeln!(f, "symbols: {}", pairs.join(", "))?;
        }
        for (key, value) in &self.globals {
            writeln!(f, "{key} = {value}")?;
        }
        for (name, attrs) in &self.bases {
            let body: Vec<String> = attrs.iter().map(|(k, v)| format!("{k}:{v}")).collect();
            writeln!(f, "@{name}{{{}}}", body.join(", "))?;
        }
        for entity in self.entities.values() {
            writeln!(f, "{entity}")?;
        }
        Ok(())
    }
}

/// Read access shared by [`Snapshot`] and [`Overlay`].
pub(crate) trait StateView {
    fn entity(&self, name: &str) -> Option<&Entity>;
    fn global(&self, key: &str) -> Option<&Value>;
    fn base(&self, name: &str) -> Option<&Attributes>;

    fn resolve(&self, path: &Path) -> Result<&Value> {
        let unresolved = || CodecError::UnresolvedPath(path.to_string());
        let segments = path.segments();

        if segments.len() == 1 {
            return self.global(path.root()).ok_or_else(unresolved);
        }

        let mut entity = self.entity(path.root()).ok_or_else(unresolved)?;
        for (i, segment) in segments.iter().enumerate().take(segments.len() - 1).skip(1) {
            entity = match entity.get(segment) {
                Some(Value::Ref(target)) => self.entity(target),
                _ => self.entity(&path.prefix_name(i + 1)),
            }
            .ok_or_else(unresolved)?;
        }
        entity.get(path.leaf()).ok_or_else(unresolved)
    }
}

impl StateView for Snapshot {
    fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    fn global(&self, key: &str) -> Option<&Value> {
        self.globals.get(key)
    }

    fn base(&self, name: &str) -> Option<&Attributes> {
        self.bases.get(name)
    }
}

/// Uncommitted changes layered over a snapshot.
///
/// Holds only what the pending turn touched; every other read falls through
/// to the head. Symbol changes are not staged here, the registry journals
/// those.
#[derive(Debug)]
pub(crate) struct Overlay<'a> {
    head: &'a Snapshot,
    entities: BTreeMap<String, Entity>,
    globals: Attributes,
    bases: BTreeMap<String, Attributes>,
}

impl<'a> Overlay<'a> {
    pub(crate) fn new(head: &'a Snapshot) -> Self {
        Self {
            head,
            entities: BTreeMap::new(),
            globals: Attributes::new(),
            bases: BTreeMap::new(),
        }
    }

    pub(crate) fn apply(&mut self, change: &Change) {
        match change {
            Change::Symbol { .. } => {}
            Change::Upsert(entity) => {
                let head = self.head;
                self.entities
                    .entry(entity.name.clone())
                    .or_insert_with(|| {
                        head.entity(&entity.name)
                            .cloned()
                            .unwrap_or_else(|| Entity::new(entity.name.clone()))
                    })
                    .merge(entity);
            }
            Change::Global { key, value } => {
                self.globals.insert(key.clone(), value.clone());
            }
            Change::Base { name, attributes } => {
                self.bases.insert(name.clone(), attributes.clone());
            }
        }
    }

    /// Number of entities copied out of the head so far.
    #[cfg(test)]
    pub(crate) fn staged_entities(&self) -> usize {
        self.entities.len()
    }
}

impl StateView for Overlay<'_> {
    fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name).or_else(|| self.head.entity(name))
    }

    fn global(&self, key: &str) -> Option<&Value> {
        self.globals.get(key).or_else(|| self.head.globals.get(key))
    }

    fn base(&self, name: &str) -> Option<&Attributes> {
        self.bases.get(name).or_else(|| self.head.bases.get(name))
    }
}

/// One accepted turn. Immutable once appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateDelta {
    pub statements: Vec<Statement>,
    pub changes: Vec<Change>,
}

#[derive(Clone, Debug, Default)]
pub struct StateStore {
    deltas: Vec<StateDelta>,
    head: Snapshot,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return its index.
    pub fn append(&mut self, delta: StateDelta) -> usize {
        for change in &delta.changes {
            self.head.apply(change);
        }
        self.deltas.push(delta);
        self.deltas.len() - 1
    }

    /// Replay turns `0..=index` onto an empty snapshot.
    pub fn reconstruct(&self, index: usize) -> Result<Snapshot> {
        if index >= self.deltas.len() {
            return Err(CodecError::UnknownTurn {
                index,
                len: self.deltas.len(),
            });
        }
        let mut snapshot = Snapshot::default();
        for delta in &self.deltas[..=index] {
            for change in &delta.changes {
                snapshot.apply(change);
            }
        }
        Ok(snapshot)
    }

    pub fn head(&self) -> &Snapshot {
        &self.head
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StateDelta> {
        self.deltas.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StateDelta> {
        self.deltas.iter()
    }

    /// Re-encode each turn in literal syntax. Symbol maps are replayed in
    /// log order so every turn is quoted against the aliases it was decoded
    /// with.
    pub fn export_turns(&self) -> Result<Vec<String>> {
        let mut registry = SymbolRegistry::new();
        self.deltas
            .iter()
            .map(|delta| encode(&delta.statements, &mut registry))
            .collect()
    }

    /// The whole log, one turn per line.
    pub fn export(&self) -> Result<String> {
        Ok(self.export_turns()?.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Path {
        Path::new(s.split('.').map(String::from).collect()).unwrap()
    }

    fn upsert(name: &str, pairs: &[(&str, Value)]) -> Change {
        Change::Upsert(Entity::with_attributes(
            name,
            pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        ))
    }

    fn delta(changes: Vec<Change>) -> StateDelta {
        StateDelta {
            statements: Vec::new(),
            changes,
        }
    }

    #[test]
    fn test_field_level_merge_across_deltas() {
        let mut store = StateStore::new();
        store.append(delta(vec![upsert("A", &[("x", 1.into()), ("y", 2.into())])]));
        store.append(delta(vec![upsert("A", &[("y", 3.into())])]));

        let a = store.head().entity("A").unwrap();
        assert_eq!(a.get("x"), Some(&Value::Int(1)));
        assert_eq!(a.get("y"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_reconstruct_is_point_in_time() {
        let mut store = StateStore::new();
        store.append(delta(vec![upsert("A", &[("x", 1.into())])]));
        store.append(delta(vec![upsert("A", &[("x", 2.into())])]));

        let first = store.reconstruct(0).unwrap();
        assert_eq!(first.entity("A").unwrap().get("x"), Some(&Value::Int(1)));
        assert_eq!(&store.reconstruct(1).unwrap(), store.head());
        assert_eq!(
            store.reconstruct(2).unwrap_err(),
            CodecError::UnknownTurn { index: 2, len: 2 }
        );
    }

    #[test]
    fn test_symbol_change_supersedes_old_alias() {
        let mut snap = Snapshot::default();
        snap.apply(&Change::Symbol {
            alias: "U".into(),
            canonical: "User".into(),
        });
        snap.apply(&Change::Symbol {
            alias: "Usr".into(),
            canonical: "User".into(),
        });
        assert_eq!(snap.symbols.len(), 1);
        assert_eq!(snap.symbols.get("Usr").map(String::as_str), Some("User"));
    }

    #[test]
    fn test_resolve_global_and_nested() {
        let mut snap = Snapshot::default();
        snap.apply(&Change::Global {
            key: "Mode".into(),
            value: Value::text("fast"),
        });
        snap.apply(&upsert("Cfg", &[("Net", Value::Ref("Cfg.Net".into()))]));
        snap.apply(&upsert("Cfg.Net", &[("Port", 80.into())]));

        assert_eq!(snap.resolve(&path("Mode")).unwrap(), &Value::text("fast"));
        assert_eq!(snap.resolve(&path("Cfg.Net.Port")).unwrap(), &Value::Int(80));
    }

    #[test]
    fn test_resolve_follows_refs_to_other_entities() {
        let mut snap = Snapshot::default();
        snap.apply(&upsert("John", &[("Team", Value::Ref("Core".into()))]));
        snap.apply(&upsert("Core", &[("Lead", Value::text("Ada"))]));
        assert_eq!(
            snap.resolve(&path("John.Team.Lead")).unwrap(),
            &Value::text("Ada")
        );
    }

    #[test]
    fn test_resolve_missing_root() {
        let snap = Snapshot::default();
        assert_eq!(
            snap.resolve(&path("Cfg.Debug")).unwrap_err(),
            CodecError::UnresolvedPath("Cfg.Debug".into())
        );
        assert!(snap.resolve(&path("Debug")).is_err());
    }

    #[test]
    fn test_overlay_reads_through_and_stages_touched_only() {
        let mut head = Snapshot::default();
        for i in 0..100 {
            head.apply(&upsert(&format!("E{i}"), &[("n", Value::Int(i))]));
        }
        head.apply(&Change::Global {
            key: "Mode".into(),
            value: Value::text("fast"),
        });

        let mut overlay = Overlay::new(&head);
        overlay.apply(&upsert("E7", &[("extra", true.into())]));
        overlay.apply(&Change::Global {
            key: "Mode".into(),
            value: Value::text("slow"),
        });

        assert_eq!(overlay.staged_entities(), 1);
        let e7 = StateView::entity(&overlay, "E7").unwrap();
        assert_eq!(e7.get("n"), Some(&Value::Int(7)));
        assert_eq!(e7.get("extra"), Some(&Value::Bool(true)));
        assert_eq!(
            StateView::resolve(&overlay, &path("E42.n")).unwrap(),
            &Value::Int(42)
        );
        assert_eq!(
            StateView::resolve(&overlay, &path("Mode")).unwrap(),
            &Value::text("slow")
        );
        assert!(head.entity("E7").unwrap().get("extra").is_none());
    }

    #[test]
    fn test_snapshot_display() {
        let mut snap = Snapshot::default();
        snap.apply(&upsert("A", &[("IP", "1.1.1.1".into())]));
        assert_eq!(snap.to_string(), "A{IP:1.1.1.1}\n");
    }
}
