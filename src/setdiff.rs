//! Keyed set reconciliation.
//!
//! Sub-resources such as logging endpoints are stored as unordered sets of
//! records, and the remote API identifies them only by a key field (their
//! `name`). [`SetDiff`] partitions an old and a new set by that key so a
//! handler knows which records to create, delete, or update in place.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_fastly::setdiff::{name_key, SetDiff};
//! use serde_json::json;
//!
//! let old = vec![
//!     json!({"name": "a", "topic": "one"}),
//!     json!({"name": "b", "topic": "two"}),
//! ];
//! let new = vec![
//!     json!({"name": "b", "topic": "changed"}),
//!     json!({"name": "c", "topic": "three"}),
//! ];
//!
//! let diff = SetDiff::new(name_key);
//! let result = diff.diff(&old, &new).unwrap();
//!
//! assert_eq!(result.added, vec![&new[1]]);
//! assert_eq!(result.deleted, vec![&old[0]]);
//! assert_eq!(result.modified, vec![&new[0]]);
//! ```

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while diffing two sets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    /// The key extractor rejected a record.
    #[error("Failed to extract key: {0}")]
    KeyExtraction(String),

    /// Two records in the same set share a key.
    #[error("Duplicate key {key} in {side} set")]
    DuplicateKey {
        /// The repeated key, rendered for display.
        key: String,
        /// Which input carried the duplicate (`old` or `new`).
        side: &'static str,
    },

    /// A modified record has no counterpart in the old set.
    #[error("No record with key {0} in old set")]
    MissingOldRecord(String),
}

/// The partitions produced by [`SetDiff::diff`].
///
/// Records are borrowed from the inputs. `deleted` follows the order of the
/// old set; the other partitions follow the order of the new set.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffResult<'a, T> {
    /// Records whose key exists only in the new set.
    pub added: Vec<&'a T>,
    /// Records whose key exists only in the old set.
    pub deleted: Vec<&'a T>,
    /// New versions of records whose key exists in both sets but whose content differs.
    pub modified: Vec<&'a T>,
    /// Records present, unchanged, in both sets.
    pub unchanged: Vec<&'a T>,
}

impl<T> DiffResult<'_, T> {
    /// Returns `true` when the two sets were equivalent.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }
}

/// Diffs sets of records using a caller-supplied key extractor.
///
/// The extractor must be deterministic and total; any error it returns
/// aborts the diff.
#[derive(Debug, Clone, Copy)]
pub struct SetDiff<F> {
    key_of: F,
}

impl<F> SetDiff<F> {
    /// Create a diff keyed by `key_of`.
    pub fn new(key_of: F) -> Self {
        Self { key_of }
    }

    /// Partition `old` and `new` into added, deleted, modified and unchanged records.
    pub fn diff<'a, T, K>(&self, old: &'a [T], new: &'a [T]) -> Result<DiffResult<'a, T>, DiffError>
    where
        F: Fn(&T) -> Result<K, DiffError>,
        T: PartialEq,
        K: Eq + Hash + std::fmt::Debug,
    {
        let old_by_key = self.index(old, "old")?;

        let mut result = DiffResult {
            added: Vec::new(),
            deleted: Vec::new(),
            modified: Vec::new(),
            unchanged: Vec::new(),
        };
        let mut new_keys = HashSet::with_capacity(new.len());

        for record in new {
            let key = (self.key_of)(record)?;
            if new_keys.contains(&key) {
                return Err(DiffError::DuplicateKey {
                    key: format!("{:?}", key),
                    side: "new",
                });
            }
            match old_by_key.get(&key) {
                None => result.added.push(record),
                Some(previous) if *previous == record => result.unchanged.push(record),
                Some(_) => result.modified.push(record),
            }
            new_keys.insert(key);
        }

        for record in old {
            let key = (self.key_of)(record)?;
            if !new_keys.contains(&key) {
                result.deleted.push(record);
            }
        }

        Ok(result)
    }

    /// Return only the fields of `modified` that differ from its counterpart in `old`.
    ///
    /// Fields that exist in the old record but not in `modified` are reported
    /// as `null`, meaning the value was cleared.
    pub fn filter<K>(&self, modified: &Value, old: &[Value]) -> Result<Map<String, Value>, DiffError>
    where
        F: Fn(&Value) -> Result<K, DiffError>,
        K: Eq + Hash + std::fmt::Debug,
    {
        let key = (self.key_of)(modified)?;
        let mut previous = None;
        for record in old {
            if (self.key_of)(record)? == key {
                previous = Some(record);
                break;
            }
        }
        let previous = previous.ok_or_else(|| DiffError::MissingOldRecord(format!("{:?}", key)))?;

        let empty = Map::new();
        let new_fields = modified.as_object().unwrap_or(&empty);
        let old_fields = previous.as_object().unwrap_or(&empty);

        let mut changed: Map<String, Value> = new_fields
            .iter()
            .filter(|(field, value)| old_fields.get(*field) != Some(*value))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();

        for field in old_fields.keys() {
            if !new_fields.contains_key(field) {
                changed.insert(field.clone(), Value::Null);
            }
        }

        Ok(changed)
    }

    fn index<'a, T, K>(&self, records: &'a [T], side: &'static str) -> Result<HashMap<K, &'a T>, DiffError>
    where
        F: Fn(&T) -> Result<K, DiffError>,
        K: Eq + Hash + std::fmt::Debug,
    {
        let mut by_key = HashMap::with_capacity(records.len());
        for record in records {
            let key = (self.key_of)(record)?;
            if by_key.contains_key(&key) {
                return Err(DiffError::DuplicateKey {
                    key: format!("{:?}", key),
                    side,
                });
            }
            by_key.insert(key, record);
        }
        Ok(by_key)
    }
}

/// Key extractor for records identified by a string `name` field.
pub fn name_key(record: &Value) -> Result<String, DiffError> {
    match record.get("name") {
        Some(Value::String(name)) => Ok(name.clone()),
        Some(other) => Err(DiffError::KeyExtraction(format!(
            "expected string name, got {}",
            other
        ))),
        None => Err(DiffError::KeyExtraction(format!(
            "record has no name: {}",
            record
        ))),
    }
}
