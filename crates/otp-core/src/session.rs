//! A session: one symbol registry plus one state log.
//!
//! Sessions are plain values. Nothing is global, so independent sessions can
//! live on different threads without sharing anything.

use serde::Serialize;

use crate::codec::delta::DeltaBlock;
use crate::codec::path::{Branch, Path, decode_path};
use crate::codec::{Statement, decode};
use crate::error::{CodecError, Result};
use crate::registry::SymbolRegistry;
use crate::state::{Change, Overlay, Snapshot, StateDelta, StateStore, StateView};
use crate::value::{Attributes, Entity, Value};

/// Which branch a ternary took.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub condition: String,
    pub value: bool,
    pub branch: String,
}

/// Summary of an accepted turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    pub index: usize,
    pub statements: usize,
    /// Entities touched by the turn, in first-touch order.
    pub entities: Vec<String>,
    pub resolutions: Vec<Resolution>,
}

#[derive(Clone, Debug, Default)]
pub struct Session {
    registry: SymbolRegistry,
    store: StateStore,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a session by appending each turn in order.
    pub fn replay<I, S>(turns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut session = Self::new();
        for turn in turns {
            session.append(turn.as_ref())?;
        }
        Ok(session)
    }

    /// Decode one message and append it as a single turn.
    ///
    /// The turn is all-or-nothing. New aliases are journaled in the registry
    /// and state changes are staged in an [`Overlay`] over the head; both are
    /// committed only once every statement succeeded.
    pub fn append(&mut self, raw: &str) -> Result<AppendOutcome> {
        self.registry.begin();
        let staged = stage_turn(raw, &mut self.registry, self.store.head());
        let (statements, changes, resolutions) = match staged {
            Ok(staged) => {
                self.registry.commit();
                staged
            }
            Err(e) => {
                self.registry.rollback();
                return Err(e);
            }
        };

        let mut entities: Vec<String> = Vec::new();
        for change in &changes {
            if let Change::Upsert(e) = change
                && !entities.contains(&e.name)
            {
                entities.push(e.name.clone());
            }
        }

        let count = statements.len();
        let index = self.store.append(StateDelta {
            statements,
            changes,
        });
        Ok(AppendOutcome {
            index,
            statements: count,
            entities,
            resolutions,
        })
    }

    /// The whole log in literal syntax, one turn per line.
    pub fn export_state(&self) -> Result<String> {
        self.store.export()
    }

    pub fn export_turns(&self) -> Result<Vec<String>> {
        self.store.export_turns()
    }

    pub fn reconstruct(&self, turn: usize) -> Result<Snapshot> {
        self.store.reconstruct(turn)
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.store.head()
    }

    /// Resolve a dotted path (aliases allowed) against the current state.
    pub fn resolve(&self, path: &str) -> Result<Value> {
        let path = decode_path(path.trim(), &self.registry)?;
        self.store.head().resolve(&path).cloned()
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn turns(&self) -> usize {
        self.store.len()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Session boundary: drop every alias and every turn.
    pub fn reset(&mut self) {
        self.registry.reset();
        self.store = StateStore::new();
    }
}

type Staged = (Vec<Statement>, Vec<Change>, Vec<Resolution>);

fn stage_turn(raw: &str, registry: &mut SymbolRegistry, head: &Snapshot) -> Result<Staged> {
    let statements = decode(raw, registry)?;
    if statements.is_empty() {
        return Err(CodecError::syntax(0, "message contains no statements"));
    }

    let mut overlay = Overlay::new(head);
    let mut changes = Vec::new();
    let mut resolutions = Vec::new();
    for statement in &statements {
        let produced = materialize(statement, &overlay, &mut resolutions)?;
        for change in &produced {
            overlay.apply(change);
        }
        changes.extend(produced);
    }
    Ok((statements, changes, resolutions))
}

fn materialize(
    statement: &Statement,
    state: &impl StateView,
    resolutions: &mut Vec<Resolution>,
) -> Result<Vec<Change>> {
    match statement {
        Statement::Map(map) => Ok(map
            .entries
            .iter()
            .map(|(alias, canonical)| Change::Symbol {
                alias: alias.clone(),
                canonical: canonical.clone(),
            })
            .collect()),
        Statement::Table(table) => Ok(table.entities().into_iter().map(Change::Upsert).collect()),
        Statement::Delta(block) => materialize_delta(block, state),
        Statement::Entity(literal) => Ok(vec![Change::Upsert(literal.to_entity())]),
        Statement::Assign(assignment) => Ok(assign(&assignment.path, &assignment.value, state)),
        Statement::Ternary(ternary) => {
            let found = state.resolve(&ternary.condition)?;
            let condition = found.as_bool().ok_or_else(|| CodecError::NotBoolean {
                path: ternary.condition.to_string(),
                found: found.to_string(),
            })?;
            let branch = ternary.select(condition);
            resolutions.push(Resolution {
                condition: ternary.condition.to_string(),
                value: condition,
                branch: branch.to_string(),
            });
            Ok(match branch {
                Branch::Assign(a) => assign(&a.path, &a.value, state),
                Branch::Value(_) => Vec::new(),
            })
        }
    }
}

fn materialize_delta(block: &DeltaBlock, state: &impl StateView) -> Result<Vec<Change>> {
    let mut changes = Vec::with_capacity(block.variants.len() + 1);
    let base: Attributes = match &block.base_attributes {
        Some(attributes) => {
            changes.push(Change::Base {
                name: block.base.clone(),
                attributes: attributes.clone(),
            });
            attributes.clone()
        }
        None => state
            .base(&block.base)
            .cloned()
            .ok_or_else(|| CodecError::UnknownBase(block.base.clone()))?,
    };
    changes.extend(block.materialize(&base).into_iter().map(Change::Upsert));
    Ok(changes)
}

/// Flatten `A.B.C:v` into `A{B:&A.B}` and `A.B{C:v}`, following refs that
/// already exist. A one-segment path sets a global.
fn assign(path: &Path, value: &Value, state: &impl StateView) -> Vec<Change> {
    let segments = path.segments();
    if segments.len() == 1 {
        return vec![Change::Global {
            key: path.root().to_string(),
            value: value.clone(),
        }];
    }

    let mut changes = Vec::with_capacity(segments.len());
    let mut current = path.root().to_string();
    for (i, segment) in segments.iter().enumerate().take(segments.len() - 1).skip(1) {
        let existing = state.entity(&current).and_then(|e| e.get(segment));
        let target = match existing {
            Some(Value::Ref(target)) => target.clone(),
            _ => {
                let target = path.prefix_name(i + 1);
                let mut link = Entity::new(current.clone());
                link.attributes
                    .insert(segment.clone(), Value::Ref(target.clone()));
                changes.push(Change::Upsert(link));
                target
            }
        };
        current = target;
    }

    let mut leaf = Entity::new(current);
    leaf.attributes
        .insert(path.leaf().to_string(), value.clone());
    changes.push(Change::Upsert(leaf));
    changes
}
