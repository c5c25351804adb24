use serde::de::Error as _;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::agency::snapshot::normalize;
use crate::error::{Result, SupervisionError};

/// Mutation applied to one path.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Set(Value),
    Delete,
}

/// Assertion about the value held at one path before a transaction applies.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// The path must hold exactly this value.
    Old(Value),
    /// `true`: the path must be absent. `false`: it must be present.
    OldEmpty(bool),
}

impl Precondition {
    pub fn holds(&self, current: Option<&Value>) -> bool {
        match self {
            Precondition::Old(expected) => current == Some(expected),
            Precondition::OldEmpty(empty) => current.is_none() == *empty,
        }
    }
}

/// One all-or-nothing write: operations plus the preconditions guarding them.
///
/// Paths keep their insertion order, which is the order operations are
/// applied in. Adding the same path twice replaces the earlier entry.
///
/// On the wire a transaction is `[operations]` or
/// `[operations, preconditions]`, where operations map a path to a literal
/// value or `{"op": "delete"}` and preconditions map a path to
/// `{"old": value}` or `{"oldEmpty": bool}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    operations: Vec<(String, Operation)>,
    preconditions: Vec<(String, Precondition)>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: &str, value: Value) -> &mut Self {
        upsert(&mut self.operations, path, Operation::Set(value));
        self
    }

    pub fn delete(&mut self, path: &str) -> &mut Self {
        upsert(&mut self.operations, path, Operation::Delete);
        self
    }

    pub fn expect_old(&mut self, path: &str, value: Value) -> &mut Self {
        upsert(&mut self.preconditions, path, Precondition::Old(value));
        self
    }

    pub fn expect_empty(&mut self, path: &str) -> &mut Self {
        upsert(&mut self.preconditions, path, Precondition::OldEmpty(true));
        self
    }

    pub fn expect_present(&mut self, path: &str) -> &mut Self {
        upsert(&mut self.preconditions, path, Precondition::OldEmpty(false));
        self
    }

    /// Folds `other` into this transaction so both commit together.
    pub fn merge(&mut self, other: &Transaction) -> &mut Self {
        for (path, operation) in &other.operations {
            upsert(&mut self.operations, path, operation.clone());
        }
        for (path, precondition) in &other.preconditions {
            upsert(&mut self.preconditions, path, precondition.clone());
        }
        self
    }

    pub fn operations(&self) -> &[(String, Operation)] {
        &self.operations
    }

    pub fn preconditions(&self) -> &[(String, Precondition)] {
        &self.preconditions
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Parses the wire form of a single transaction.
    pub fn from_wire(wire: &Value) -> Result<Self> {
        let parts = wire
            .as_array()
            .filter(|parts| (1..=2).contains(&parts.len()))
            .ok_or_else(|| SupervisionError::malformed("transaction", "array of 1 or 2 objects"))?;

        let mut trx = Transaction::new();
        let operations = parts[0]
            .as_object()
            .ok_or_else(|| SupervisionError::malformed("transaction[0]", "object"))?;
        for (path, value) in operations {
            match parse_operation(value) {
                Some(Operation::Delete) => trx.delete(path),
                Some(Operation::Set(value)) => trx.set(path, value),
                None => return Err(SupervisionError::malformed(path.clone(), "supported operation")),
            };
        }

        if let Some(preconditions) = parts.get(1) {
            let preconditions = preconditions
                .as_object()
                .ok_or_else(|| SupervisionError::malformed("transaction[1]", "object"))?;
            for (path, value) in preconditions {
                let precondition = parse_precondition(value)
                    .ok_or_else(|| SupervisionError::malformed(path.clone(), "precondition"))?;
                upsert(&mut trx.preconditions, path, precondition);
            }
        }

        Ok(trx)
    }

    /// Wire form as a JSON value.
    pub fn to_wire(&self) -> Value {
        // Serializing plain JSON values cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn upsert<T>(entries: &mut Vec<(String, T)>, path: &str, item: T) {
    let path = normalize(path);
    match entries.iter_mut().find(|(existing, _)| *existing == path) {
        Some(entry) => entry.1 = item,
        None => entries.push((path, item)),
    }
}

fn parse_operation(value: &Value) -> Option<Operation> {
    match value.as_object().and_then(|obj| obj.get("op")) {
        Some(Value::String(op)) if op == "delete" => Some(Operation::Delete),
        Some(_) => None,
        None => Some(Operation::Set(value.clone())),
    }
}

fn parse_precondition(value: &Value) -> Option<Precondition> {
    let obj = value.as_object()?;
    if let Some(old) = obj.get("old") {
        return Some(Precondition::Old(old.clone()));
    }
    obj.get("oldEmpty")
        .and_then(Value::as_bool)
        .map(Precondition::OldEmpty)
}

struct Ordered<'a, T>(&'a [(String, T)]);

impl<T: Serialize> Serialize for Ordered<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (path, item) in self.0 {
            map.serialize_entry(path, item)?;
        }
        map.end()
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Operation::Set(value) => value.serialize(serializer),
            Operation::Delete => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("op", "delete")?;
                map.end()
            }
        }
    }
}

impl Serialize for Precondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Precondition::Old(value) => map.serialize_entry("old", value)?,
            Precondition::OldEmpty(empty) => map.serialize_entry("oldEmpty", empty)?,
        }
        map.end()
    }
}

impl Serialize for Transaction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = if self.preconditions.is_empty() { 1 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&Ordered(&self.operations))?;
        if !self.preconditions.is_empty() {
            seq.serialize_element(&Ordered(&self.preconditions))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Transaction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = Value::deserialize(deserializer)?;
        Transaction::from_wire(&wire).map_err(D::Error::custom)
    }
}

/// Outcome of a transaction batch: one log index per transaction, `0` for
/// each one whose preconditions failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub accepted: bool,
    pub indices: Vec<u64>,
}

impl WriteResult {
    /// A single-transaction batch that was applied.
    pub fn successful(&self) -> bool {
        self.accepted && self.indices.len() == 1 && self.indices[0] != 0
    }

    pub fn applied(&self, position: usize) -> bool {
        self.indices.get(position).is_some_and(|&index| index != 0)
    }

    /// Turns a batch that did not fully apply into
    /// [`SupervisionError::TransactionRejected`].
    pub fn ensure_accepted(self) -> Result<Self> {
        if self.accepted {
            Ok(self)
        } else {
            Err(SupervisionError::TransactionRejected)
        }
    }
}
