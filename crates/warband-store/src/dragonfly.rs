//! `Dragonfly` (Redis-compatible) world store.
//!
//! The world tree is split into JSON documents, one per key. Document
//! boundaries follow the layout the engine writes at:
//!
//! | Document | Key |
//! |----------|-----|
//! | one tile | `{ns}:chunks/{cx,cy}/{x,y}` |
//! | one player record | `{ns}:players/{playerId}` |
//! | one world event | `{ns}:events/{eventId}` |
//! | any other top-level node | `{ns}:{name}` |
//!
//! A set at `{ns}:__docs` indexes every live document so the whole world can
//! be loaded without `SCAN`. Commits `WATCH` the documents they touch and
//! the index, read them, apply the plan locally, then write every changed
//! document and the index in one `MULTI`/`EXEC` transaction. If another
//! writer changes a watched key in between, `EXEC` aborts and the commit is
//! staged again from fresh reads, so writes to fields the batch never
//! touched are kept.

use std::collections::{BTreeMap, BTreeSet};

use fred::prelude::*;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::batch::{Op, UpdateBatch};
use crate::error::StoreError;
use crate::path::Path;
use crate::{CommitStats, WorldStore, tree};

/// Number of leading path segments that form a document key.
fn doc_depth(path: &Path) -> usize {
    match path.segments().first().map(String::as_str) {
        Some(crate::layout::CHUNKS) => 3,
        Some(crate::layout::PLAYERS | crate::layout::EVENTS) => 2,
        _ => 1,
    }
}

/// Attempts at one commit before concurrent writers make it give up.
const COMMIT_ATTEMPTS: usize = 5;

/// Documents whose current content a commit of `ops` depends on.
fn read_set(ops: &BTreeMap<Path, Op>) -> BTreeSet<Path> {
    ops.keys()
        .filter(|path| path.len() > doc_depth(path))
        .map(|path| path.prefix(doc_depth(path)))
        .collect()
}

/// Connection handle to a `Dragonfly` instance holding one world.
#[derive(Clone)]
pub struct DragonflyStore {
    client: Client,
    namespace: String,
}

impl DragonflyStore {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`. All keys are prefixed
    /// with `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed.
    /// Returns [`StoreError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str, namespace: &str) -> Result<Self, StoreError> {
        let config = Config::from_url(url)
            .map_err(|e| StoreError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        info!(namespace, "Connected to Dragonfly");
        Ok(Self {
            client,
            namespace: namespace.to_owned(),
        })
    }

    fn key(&self, doc: &Path) -> String {
        format!("{}:{doc}", self.namespace)
    }

    fn index_key(&self) -> String {
        format!("{}:__docs", self.namespace)
    }

    /// Every indexed document path.
    async fn doc_paths(&self) -> Result<Vec<Path>, StoreError> {
        let members: Vec<String> = self.client.smembers(self.index_key()).await?;
        let mut docs = Vec::with_capacity(members.len());
        for member in members {
            match Path::parse(&member) {
                Ok(doc) => docs.push(doc),
                Err(err) => warn!(member, error = %err, "Unparseable document index entry"),
            }
        }
        docs.sort();
        Ok(docs)
    }

    /// Read one document. A missing key reads as `None`.
    async fn read_doc(&self, doc: &Path) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = self.client.get(self.key(doc)).await?;
        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Seed the store from a whole world tree, replacing what is there.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any read or the transaction fails.
    pub async fn import(&self, world: Value) -> Result<CommitStats, StoreError> {
        let mut batch = UpdateBatch::new();
        batch.set_value(Path::root(), world);
        self.commit(batch).await
    }

    /// Resolve the plan into the final content of every touched document.
    async fn stage(
        &self,
        ops: BTreeMap<Path, Op>,
    ) -> Result<BTreeMap<Path, Option<Value>>, StoreError> {
        let mut staged: BTreeMap<Path, Option<Value>> = BTreeMap::new();
        let mut index: Option<Vec<Path>> = None;

        for (path, op) in ops {
            let depth = doc_depth(&path);
            if path.len() < depth {
                // Shallower than a document: replaces every document below.
                if index.is_none() {
                    index = Some(self.doc_paths().await?);
                }
                for doc in index.iter().flatten().filter(|d| d.starts_with(&path)) {
                    staged.insert(doc.clone(), None);
                }
                for doc in staged.keys().filter(|d| d.starts_with(&path)).cloned().collect::<Vec<_>>() {
                    staged.insert(doc, None);
                }
                if let Op::Set(value) = op {
                    split_docs(path, value, &mut staged);
                }
                continue;
            }

            let doc = path.prefix(depth);
            let relative = path.strip(depth);
            if relative.is_root() {
                let content = match op {
                    Op::Set(value) => Some(value),
                    Op::Delete => None,
                };
                staged.insert(doc, content);
                continue;
            }

            if !staged.contains_key(&doc) {
                let current = self.read_doc(&doc).await?;
                staged.insert(doc.clone(), current);
            }
            let Some(slot) = staged.get_mut(&doc) else {
                continue;
            };
            match op {
                Op::Set(value) => {
                    let content = slot.get_or_insert_with(|| Value::Object(Map::new()));
                    tree::set_at(content, &relative, value);
                }
                Op::Delete => {
                    if let Some(content) = slot.as_mut() {
                        tree::delete_at(content, &relative);
                    }
                }
            }
        }
        Ok(staged)
    }

    /// Stage `ops` and run the transaction. `None` when `EXEC` aborted
    /// because a watched key changed.
    async fn try_commit(&self, ops: BTreeMap<Path, Op>) -> Result<Option<usize>, StoreError> {
        let staged = self.stage(ops).await?;
        let index_key = self.index_key();

        let trx = self.client.multi();
        for (doc, content) in &staged {
            let key = self.key(doc);
            let member = doc.to_string();
            match content {
                Some(value) if !value.is_null() => {
                    let json = serde_json::to_string(value)?;
                    let _: () = trx.set(key.as_str(), json.as_str(), None, None, false).await?;
                    let _: () = trx.sadd(index_key.as_str(), member.as_str()).await?;
                }
                _ => {
                    let _: () = trx.del(key.as_str()).await?;
                    let _: () = trx.srem(index_key.as_str(), member.as_str()).await?;
                }
            }
        }
        let reply: fred::types::Value = trx.exec(true).await?;
        Ok((!reply.is_null()).then_some(staged.len()))
    }
}

/// Split a value written above document depth into whole documents.
fn split_docs(path: Path, value: Value, staged: &mut BTreeMap<Path, Option<Value>>) {
    if path.len() >= doc_depth(&path) && !path.is_root() {
        staged.insert(path, Some(value));
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if !child.is_null() {
                    split_docs(path.child(&key), child, staged);
                }
            }
        }
        Value::Null => {}
        other => warn!(%path, found = %other, "Scalar above document depth, not stored"),
    }
}

impl WorldStore for DragonflyStore {
    async fn load_world(&self) -> Result<Value, StoreError> {
        let mut world = Value::Object(Map::new());
        for doc in self.doc_paths().await? {
            match self.read_doc(&doc).await? {
                Some(content) => tree::set_at(&mut world, &doc, content),
                None => warn!(%doc, "Indexed document is missing"),
            }
        }
        Ok(world)
    }

    async fn commit(&self, batch: UpdateBatch) -> Result<CommitStats, StoreError> {
        let plan = batch.into_plan();
        let stats = CommitStats {
            applied: plan.len(),
            dropped: plan.dropped,
        };
        if plan.is_empty() {
            return Ok(stats);
        }

        let mut watched: Vec<String> = read_set(&plan.ops).iter().map(|doc| self.key(doc)).collect();
        watched.push(self.index_key());

        for attempt in 1..=COMMIT_ATTEMPTS {
            let _: () = self.client.watch(watched.clone()).await?;
            match self.try_commit(plan.ops.clone()).await {
                Ok(Some(docs)) => {
                    debug!(
                        docs,
                        attempt,
                        applied = stats.applied,
                        dropped = stats.dropped,
                        "Committed batch to Dragonfly"
                    );
                    return Ok(stats);
                }
                Ok(None) => {
                    warn!(attempt, "Watched document changed during commit, restaging");
                }
                Err(err) => {
                    let unwatched: Result<(), _> = self.client.unwatch().await;
                    if let Err(unwatch) = unwatched {
                        warn!(error = %unwatch, "UNWATCH failed after commit error");
                    }
                    return Err(err);
                }
            }
        }
        Err(StoreError::CommitRejected(format!(
            "documents kept changing across {COMMIT_ATTEMPTS} attempts"
        )))
    }
}
