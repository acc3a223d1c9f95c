use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CodecError, Result};

static ALIAS_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Outcome of [`SymbolRegistry::define`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Binding {
    /// Alias was new.
    Bound,
    /// Alias was already bound to the same name.
    Unchanged,
    /// Canonical name moved from the contained old alias to the new one.
    Superseded(String),
}

/// Bidirectional alias ↔ canonical name map for one session.
///
/// Each alias maps to one name and each name has at most one active alias.
/// The registry is only cleared by an explicit [`reset`](Self::reset).
///
/// Definitions made between [`begin`](Self::begin) and
/// [`commit`](Self::commit) are journaled so [`rollback`](Self::rollback)
/// can undo exactly those, without copying the maps.
#[derive(Clone, Debug, Default)]
pub struct SymbolRegistry {
    by_alias: HashMap<String, String>,
    by_name: HashMap<String, String>,
    journal: Option<Vec<Undo>>,
}

/// A new binding plus the alias it displaced, if any.
#[derive(Clone, Debug)]
struct Undo {
    alias: String,
    canonical: String,
    displaced: Option<String>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid_alias(alias: &str) -> bool {
        ALIAS_SHAPE.is_match(alias)
    }

    pub fn define(&mut self, alias: &str, canonical: &str) -> Result<Binding> {
        if !Self::is_valid_alias(alias) {
            return Err(CodecError::InvalidAlias(alias.to_string()));
        }

        if let Some(existing) = self.by_alias.get(alias) {
            if existing == canonical {
                return Ok(Binding::Unchanged);
            }
            return Err(CodecError::DuplicateAlias {
                alias: alias.to_string(),
                existing: existing.clone(),
                attempted: canonical.to_string(),
            });
        }

        let previous = self
            .by_name
            .insert(canonical.to_string(), alias.to_string());
        self.by_alias
            .insert(alias.to_string(), canonical.to_string());

        if let Some(old) = &previous {
            self.by_alias.remove(old);
        }
        if let Some(journal) = &mut self.journal {
            journal.push(Undo {
                alias: alias.to_string(),
                canonical: canonical.to_string(),
                displaced: previous.clone(),
            });
        }

        match previous {
            Some(old) => Ok(Binding::Superseded(old)),
            None => Ok(Binding::Bound),
        }
    }

    /// Start journaling definitions. A pending journal is discarded.
    pub fn begin(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Keep everything defined since [`begin`](Self::begin).
    pub fn commit(&mut self) {
        self.journal = None;
    }

    /// Undo everything defined since [`begin`](Self::begin), newest first.
    pub fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for undo in journal.into_iter().rev() {
            self.by_alias.remove(&undo.alias);
            match undo.displaced {
                Some(old) => {
                    self.by_alias.insert(old.clone(), undo.canonical.clone());
                    self.by_name.insert(undo.canonical, old);
                }
                None => {
                    self.by_name.remove(&undo.canonical);
                }
            }
        }
    }

    pub fn resolve(&self, alias: &str) -> Result<&str> {
        self.by_alias
            .get(alias)
            .map(String::as_str)
            .ok_or_else(|| CodecError::UnknownAlias(alias.to_string()))
    }

    /// Canonical name for `token` if it is an alias, else the token itself.
    pub fn expand<'a>(&'a self, token: &'a str) -> &'a str {
        self.by_alias.get(token).map_or(token, String::as_str)
    }

    pub fn alias_of(&self, canonical: &str) -> Option<&str> {
        self.by_name.get(canonical).map(String::as_str)
    }

    pub fn is_alias(&self, token: &str) -> bool {
        self.by_alias.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.by_alias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_alias.is_empty()
    }

    /// Alias → canonical, ordered by alias.
    pub fn symbols(&self) -> BTreeMap<String, String> {
        self.by_alias
            .iter()
            .map(|(a, n)| (a.clone(), n.clone()))
            .collect()
    }

    pub fn reset(&mut self) {
        self.by_alias.clear();
        self.by_name.clear();
        self.journal = None;
    }
}
