//! Merged path-to-operation batches with ancestor/descendant cleanup.
//!
//! Every phase of battle resolution returns an [`UpdateBatch`]; the caller
//! merges them and hands the result to [`crate::WorldStore::commit`]. Before
//! committing, [`UpdateBatch::into_plan`] removes writes that would be
//! ambiguous against the store's hierarchical semantics:
//!
//! - any operation strictly below a `Delete` is dropped,
//! - a `Set` strictly below another `Set` is folded into the ancestor value.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::StoreError;
use crate::path::Path;
use crate::tree;

/// A single write in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Replace the node with this value.
    Set(Value),
    /// Remove the node and everything below it.
    Delete,
}

/// One battle's worth of pending writes, keyed by path.
///
/// Later writes to the same path replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateBatch {
    ops: BTreeMap<Path, Op>,
}

/// The conflict-free form of a batch, ready to commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitPlan {
    /// Surviving operations in path order (ancestors first).
    pub ops: BTreeMap<Path, Op>,
    /// Operations discarded because an ancestor was deleted.
    pub dropped: usize,
}

impl UpdateBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `value` and record a `Set` at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if `value` cannot be converted
    /// to JSON.
    pub fn set<T: Serialize + ?Sized>(&mut self, path: Path, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.set_value(path, value);
        Ok(())
    }

    /// Record a `Set` of a raw JSON value. `null` is recorded as a `Delete`.
    pub fn set_value(&mut self, path: Path, value: Value) {
        let op = if value.is_null() {
            Op::Delete
        } else {
            Op::Set(value)
        };
        self.ops.insert(path, op);
    }

    /// Record a `Delete` at `path`.
    pub fn delete(&mut self, path: Path) {
        self.ops.insert(path, Op::Delete);
    }

    /// Fold `other` into this batch; `other` wins on identical paths.
    pub fn merge(&mut self, other: Self) {
        self.ops.extend(other.ops);
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The operation recorded at exactly `path`.
    pub fn get(&self, path: &Path) -> Option<&Op> {
        self.ops.get(path)
    }

    /// Iterate over recorded operations in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Op)> {
        self.ops.iter()
    }

    /// Run the conflict pass and produce the plan to commit.
    pub fn into_plan(self) -> CommitPlan {
        let mut ops: BTreeMap<Path, Op> = BTreeMap::new();
        let mut dropped = 0_usize;

        // Path order visits an ancestor before any of its descendants, so the
        // nearest surviving ancestor is always already in `ops`.
        for (path, op) in self.ops {
            let ancestor = ops
                .iter_mut()
                .rev()
                .find(|(candidate, _)| path.is_strict_descendant_of(candidate));
            match ancestor {
                None => {
                    ops.insert(path, op);
                }
                Some((_, Op::Delete)) => {
                    dropped = dropped.saturating_add(1);
                }
                Some((ancestor_path, Op::Set(value))) => {
                    let relative = path.strip(ancestor_path.len());
                    match op {
                        Op::Set(inner) => tree::set_at(value, &relative, inner),
                        Op::Delete => {
                            tree::delete_at(value, &relative);
                        }
                    }
                }
            }
        }

        CommitPlan { ops, dropped }
    }
}

impl FromIterator<(Path, Op)> for UpdateBatch {
    fn from_iter<I: IntoIterator<Item = (Path, Op)>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for UpdateBatch {
    type Item = (Path, Op);
    type IntoIter = std::collections::btree_map::IntoIter<Path, Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl CommitPlan {
    /// Number of surviving operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing survives the conflict pass.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every operation to an in-memory tree, ancestors first.
    pub fn apply_to(&self, root: &mut Value) {
        for (path, op) in &self.ops {
            match op {
                Op::Set(value) => tree::set_at(root, path, value.clone()),
                Op::Delete => {
                    tree::delete_at(root, path);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn p(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    #[test]
    fn descendants_of_delete_are_dropped() {
        let mut batch = UpdateBatch::new();
        batch.delete(p("chunks/0,0/1,1/groups/g1"));
        batch.set_value(p("chunks/0,0/1,1/groups/g1/status"), json!("idle"));
        batch.delete(p("chunks/0,0/1,1/groups/g1/units/u1"));
        batch.set_value(p("chunks/0,0/1,1/groups/g10/status"), json!("idle"));

        let plan = batch.into_plan();
        assert_eq!(plan.dropped, 2);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.ops.get(&p("chunks/0,0/1,1/groups/g1")), Some(&Op::Delete));
    }

    #[test]
    fn nested_set_folds_into_ancestor() {
        let mut batch = UpdateBatch::new();
        batch.set_value(p("battles/b1"), json!({"tickCount": 1, "side1": {"casualties": 0}}));
        batch.set_value(p("battles/b1/side1/casualties"), json!(3));
        batch.delete(p("battles/b1/tickCount"));

        let plan = batch.into_plan();
        assert_eq!(plan.dropped, 0);
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.ops.get(&p("battles/b1")),
            Some(&Op::Set(json!({"side1": {"casualties": 3}})))
        );
    }

    #[test]
    fn later_write_wins_on_merge() {
        let mut first = UpdateBatch::new();
        first.set_value(p("players/p1/alive"), json!(true));
        let mut second = UpdateBatch::new();
        second.set_value(p("players/p1/alive"), json!(false));
        first.merge(second);
        assert_eq!(first.get(&p("players/p1/alive")), Some(&Op::Set(json!(false))));
    }

    #[test]
    fn null_set_is_delete() {
        let mut batch = UpdateBatch::new();
        batch.set(p("players/p1/inGroup"), &Option::<String>::None).unwrap();
        assert_eq!(batch.get(&p("players/p1/inGroup")), Some(&Op::Delete));
    }

    #[test]
    fn plan_applies_in_order() {
        let mut root = json!({"players": {"p1": {"alive": true, "inGroup": "g1"}}});
        let mut batch = UpdateBatch::new();
        batch.set_value(p("players/p1/alive"), json!(false));
        batch.delete(p("players/p1/inGroup"));
        batch.set_value(p("events/e1"), json!({"text": "hi"}));
        batch.into_plan().apply_to(&mut root);
        assert_eq!(
            root,
            json!({"players": {"p1": {"alive": false}}, "events": {"e1": {"text": "hi"}}})
        );
    }
}
