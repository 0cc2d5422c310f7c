//! Staged writes for a single store transaction.

use crate::error::{CoreError, CoreResult};
use crate::journal::WriteOp;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub(crate) type Tables = BTreeMap<String, BTreeMap<String, Value>>;

/// A transaction in progress.
///
/// Reads see the committed state overlaid with this transaction's own
/// staged writes. Nothing becomes visible to other readers until the
/// closure passed to [`crate::LocalStore::transaction`] returns `Ok`.
pub struct Transaction<'a> {
    base: &'a Tables,
    staged: BTreeMap<(String, String), Option<Value>>,
    ops: Vec<WriteOp>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(base: &'a Tables) -> Self {
        Self {
            base,
            staged: BTreeMap::new(),
            ops: Vec::new(),
        }
    }

    /// Returns the record body, if present.
    #[must_use]
    pub fn get(&self, table: &str, id: &str) -> Option<Value> {
        match self.staged.get(&(table.to_string(), id.to_string())) {
            Some(staged) => staged.clone(),
            None => self.base.get(table).and_then(|t| t.get(id)).cloned(),
        }
    }

    /// Returns the record decoded as `T`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RecordShape`] if the body does not decode.
    pub fn get_as<T: DeserializeOwned>(&self, table: &str, id: &str) -> CoreResult<Option<T>> {
        self.get(table, id)
            .map(|value| {
                serde_json::from_value(value).map_err(|source| CoreError::RecordShape {
                    table: table.to_string(),
                    id: id.to_string(),
                    source,
                })
            })
            .transpose()
    }

    /// Returns true if the record exists.
    #[must_use]
    pub fn contains(&self, table: &str, id: &str) -> bool {
        self.get(table, id).is_some()
    }

    /// Returns every record of `table`, ordered by id.
    #[must_use]
    pub fn scan(&self, table: &str) -> Vec<(String, Value)> {
        let mut merged: BTreeMap<String, Value> = self.base.get(table).cloned().unwrap_or_default();
        for ((staged_table, id), value) in &self.staged {
            if staged_table != table {
                continue;
            }
            match value {
                Some(value) => {
                    merged.insert(id.clone(), value.clone());
                }
                None => {
                    merged.remove(id);
                }
            }
        }
        merged.into_iter().collect()
    }

    /// Inserts or replaces a record.
    pub fn put(&mut self, table: &str, id: &str, value: Value) {
        self.staged
            .insert((table.to_string(), id.to_string()), Some(value.clone()));
        self.ops.push(WriteOp::Put {
            table: table.to_string(),
            id: id.to_string(),
            value,
        });
    }

    /// Serializes `value` and stores it.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    pub fn put_as<T: Serialize>(&mut self, table: &str, id: &str, value: &T) -> CoreResult<()> {
        let value = serde_json::to_value(value)?;
        self.put(table, id, value);
        Ok(())
    }

    /// Removes a record. Removing a missing record is not an error.
    pub fn delete(&mut self, table: &str, id: &str) {
        self.staged.insert((table.to_string(), id.to_string()), None);
        self.ops.push(WriteOp::Delete {
            table: table.to_string(),
            id: id.to_string(),
        });
    }

    /// Returns true if nothing has been staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Tables {
        let mut tables = Tables::new();
        let mut items = BTreeMap::new();
        items.insert("a".to_string(), json!({ "qty": 1 }));
        items.insert("b".to_string(), json!({ "qty": 2 }));
        tables.insert("item".to_string(), items);
        tables
    }

    #[test]
    fn reads_see_own_writes() {
        let tables = base();
        let mut txn = Transaction::new(&tables);

        txn.put("item", "a", json!({ "qty": 10 }));
        txn.delete("item", "b");
        txn.put("item", "c", json!({ "qty": 3 }));

        assert_eq!(txn.get("item", "a"), Some(json!({ "qty": 10 })));
        assert!(!txn.contains("item", "b"));
        let ids: Vec<_> = txn.scan("item").into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "c"]);

        // base is untouched
        assert_eq!(tables["item"]["a"], json!({ "qty": 1 }));
    }

    #[test]
    fn get_as_reports_shape_errors() {
        let tables = base();
        let txn = Transaction::new(&tables);
        let bad: CoreResult<Option<String>> = txn.get_as("item", "a");
        assert!(matches!(bad, Err(CoreError::RecordShape { .. })));
        let missing: Option<u32> = txn.get_as("item", "zzz").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn ops_recorded_in_order() {
        let tables = Tables::new();
        let mut txn = Transaction::new(&tables);
        assert!(txn.is_empty());
        txn.put("photo", "p1", json!(1));
        txn.delete("photo", "p1");
        let ops = txn.into_ops();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[1], WriteOp::Delete { .. }));
    }
}
