//! Normalized entity repositories.
//!
//! Each of the four collections is a key-value map of records keyed by id and
//! mirrored to one remote key (`mathModules`, `mathProblems`, ...). The remote
//! snapshot shape is `{ "<field>": { "<id>": record, ... } }`.
//!
//! Every structural change bumps the repository revision; the composition cache
//! keys on those revisions.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::{Concept, Misconception, Module, Problem};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
  Modules,
  Problems,
  Concepts,
  Misconceptions,
}

impl Collection {
  pub const ALL: [Collection; 4] = [
    Collection::Modules,
    Collection::Problems,
    Collection::Concepts,
    Collection::Misconceptions,
  ];

  /// Remote state key.
  pub fn key(self) -> &'static str {
    match self {
      Collection::Modules => "mathModules",
      Collection::Problems => "mathProblems",
      Collection::Concepts => "mathConcepts",
      Collection::Misconceptions => "mathMisconceptions",
    }
  }

  /// Top-level field of the remote snapshot that holds the records.
  pub fn field(self) -> &'static str {
    match self {
      Collection::Modules => "modules",
      Collection::Problems => "problems",
      Collection::Concepts => "concepts",
      Collection::Misconceptions => "misconceptions",
    }
  }

  /// Modules and problems feed the composed view.
  pub fn feeds_composition(self) -> bool {
    matches!(self, Collection::Modules | Collection::Problems)
  }
}

impl Display for Collection {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.key())
  }
}

/// A record stored in one of the repositories.
pub trait Entity: Clone + PartialEq + Serialize + DeserializeOwned {
  const COLLECTION: Collection;
  fn id(&self) -> &str;
}

impl Entity for Module {
  const COLLECTION: Collection = Collection::Modules;
  fn id(&self) -> &str { &self.id }
}

impl Entity for Problem {
  const COLLECTION: Collection = Collection::Problems;
  fn id(&self) -> &str { &self.id }
}

impl Entity for Concept {
  const COLLECTION: Collection = Collection::Concepts;
  fn id(&self) -> &str { &self.id }
}

impl Entity for Misconception {
  const COLLECTION: Collection = Collection::Misconceptions;
  fn id(&self) -> &str { &self.id }
}

#[derive(Clone, Debug)]
pub struct Repository<T> {
  records: BTreeMap<String, T>,
  revision: u64,
}

impl<T: Entity> Default for Repository<T> {
  fn default() -> Self {
    Self { records: BTreeMap::new(), revision: 0 }
  }
}

impl<T: Entity> Repository<T> {
  pub fn new() -> Self { Self::default() }

  pub fn from_records(records: BTreeMap<String, T>) -> Self {
    Self { records, revision: 0 }
  }

  pub fn revision(&self) -> u64 { self.revision }

  pub fn get(&self, id: &str) -> Option<&T> { self.records.get(id) }

  pub fn contains(&self, id: &str) -> bool { self.records.contains_key(id) }

  pub fn records(&self) -> &BTreeMap<String, T> { &self.records }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  /// Inserts or overwrites the record stored under its own id.
  pub fn insert(&mut self, record: T) -> Option<T> {
    self.revision += 1;
    self.records.insert(record.id().to_string(), record)
  }

  /// Applies `f` to the record with `id`. Returns `None` (and leaves the
  /// revision untouched) when the record is absent.
  pub fn update<R>(&mut self, id: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
    let record = self.records.get_mut(id)?;
    let out = f(record);
    self.revision += 1;
    Some(out)
  }

  pub fn remove(&mut self, id: &str) -> Option<T> {
    let removed = self.records.remove(id);
    if removed.is_some() {
      self.revision += 1;
    }
    removed
  }

  /// Replaces the whole collection. Returns `false` and keeps the revision when
  /// the incoming records equal the current ones.
  pub fn replace_all(&mut self, records: BTreeMap<String, T>) -> bool {
    if records == self.records {
      return false;
    }
    self.records = records;
    self.revision += 1;
    true
  }

  /// Remote snapshot `{ field: { id: record } }`.
  pub fn snapshot(&self) -> Result<Value, serde_json::Error> {
    let mut map = Map::new();
    for (id, record) in &self.records {
      map.insert(id.clone(), serde_json::to_value(record)?);
    }
    let mut root = Map::new();
    root.insert(T::COLLECTION.field().to_string(), Value::Object(map));
    Ok(Value::Object(root))
  }
}

/// Result of decoding a raw remote snapshot.
#[derive(Debug)]
pub struct DecodedSnapshot<T> {
  pub records: BTreeMap<String, T>,
  /// Set when the top-level field was missing; holds the snapshot with the
  /// field initialized to an empty mapping.
  pub healed: Option<Value>,
}

/// Decodes `{ field: { id: record } }`. A missing (or null) top-level field
/// decodes to an empty collection and is reported as healed.
pub fn decode_snapshot<T: Entity>(raw: Value) -> Result<DecodedSnapshot<T>, String> {
  let field = T::COLLECTION.field();
  let mut root = match raw {
    Value::Object(map) => map,
    Value::Null => Map::new(),
    other => return Err(format!("expected an object, got {}", json_type(&other))),
  };

  match root.get(field) {
    None | Some(Value::Null) => {
      root.insert(field.to_string(), Value::Object(Map::new()));
      Ok(DecodedSnapshot { records: BTreeMap::new(), healed: Some(Value::Object(root)) })
    }
    Some(value) => {
      let records = serde_json::from_value::<BTreeMap<String, T>>(value.clone())
        .map_err(|e| format!("field `{field}`: {e}"))?;
      Ok(DecodedSnapshot { records, healed: None })
    }
  }
}

fn json_type(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
