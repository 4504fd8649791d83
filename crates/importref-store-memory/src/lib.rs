//! in-memory data store for importref, served from a snapshot document.
//!
//! the store evaluates resolver queries over plain json rows and records
//! every query it runs, so callers can observe batching behaviour.

mod filter;
mod snapshot;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use importref_core::{Condition, EntityKind, Id, Query, Row, Rows, TriggerRecord};
use importref_engine::{DataStore, ExpressionResolver};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub use snapshot::{columns, load_snapshot, Snapshot, StoreError};

pub struct MemoryStore {
    snapshot: Mutex<Snapshot>,
    log: Mutex<Vec<Query>>,
}

impl MemoryStore {
    pub fn new(snapshot: Snapshot) -> Result<Self, StoreError> {
        snapshot.validate()?;
        Ok(Self {
            snapshot: Mutex::new(snapshot),
            log: Mutex::new(Vec::new()),
        })
    }

    /// load a snapshot file (yaml or json) into a new store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load_snapshot(path)?)?)
    }

    fn snapshot_guard(&self) -> Result<MutexGuard<'_, Snapshot>> {
        self.snapshot
            .lock()
            .map_err(|_| anyhow!("snapshot lock poisoned"))
    }

    fn log_guard(&self) -> Result<MutexGuard<'_, Vec<Query>>> {
        self.log.lock().map_err(|_| anyhow!("query log lock poisoned"))
    }

    /// write a row, replacing any row with the same id.
    pub fn insert(&self, kind: EntityKind, id: Id, row: Row) -> Result<()> {
        snapshot::check_row(kind, &row)?;
        self.snapshot_guard()?
            .tables
            .entry(kind)
            .or_default()
            .insert(id, row);
        Ok(())
    }

    /// every query executed so far, in order.
    pub fn queries(&self) -> Result<Vec<Query>> {
        Ok(self.log_guard()?.clone())
    }

    pub fn query_count(&self, kind: EntityKind) -> Result<usize> {
        Ok(self
            .log_guard()?
            .iter()
            .filter(|query| query.kind == kind)
            .count())
    }
}

fn check_query(query: &Query) -> Result<(), StoreError> {
    for field in &query.output {
        snapshot::check_field(query.kind, field)?;
    }
    check_condition(query.kind, &query.filter)
}

fn check_condition(kind: EntityKind, condition: &Condition) -> Result<(), StoreError> {
    match condition {
        Condition::Eq { field, .. } | Condition::In { field, .. } => {
            snapshot::check_field(kind, field)
        }
        Condition::And(branches) | Condition::Or(branches) => branches
            .iter()
            .try_for_each(|branch| check_condition(kind, branch)),
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select(&self, query: &Query) -> Result<Rows> {
        check_query(query)?;
        self.log_guard()?.push(query.clone());

        let kind = query.kind;
        let snapshot = self.snapshot_guard()?;
        let rows: Rows = snapshot
            .tables
            .get(&kind)
            .map(|table| {
                table
                    .iter()
                    .filter(|(_, row)| filter::matches(row, &query.filter))
                    .map(|(id, row)| (*id, filter::project(row, &query.output)))
                    .collect()
            })
            .unwrap_or_default();
        debug!(%kind, rows = rows.len(), "memory store select");
        Ok(rows)
    }
}

#[async_trait]
impl ExpressionResolver for MemoryStore {
    async fn resolve_trigger_expressions(
        &self,
        triggers: BTreeMap<Id, TriggerRecord>,
    ) -> Result<BTreeMap<Id, TriggerRecord>> {
        let placeholder = Regex::new(r"\{(\d+)\}")?;
        let snapshot = self.snapshot_guard()?;
        let functions = &snapshot.functions;

        let mut resolved = BTreeMap::new();
        for (triggerid, mut trigger) in triggers {
            trigger.expression = expand(&placeholder, functions, triggerid, &trigger.expression)?;
            trigger.recovery_expression = expand(
                &placeholder,
                functions,
                triggerid,
                &trigger.recovery_expression,
            )?;
            resolved.insert(triggerid, trigger);
        }
        Ok(resolved)
    }
}

/// replace `{functionid}` placeholders with the function text.
fn expand(
    placeholder: &Regex,
    functions: &BTreeMap<Id, String>,
    triggerid: Id,
    expression: &str,
) -> Result<String, StoreError> {
    let mut expanded = String::with_capacity(expression.len());
    let mut last = 0;
    for captures in placeholder.captures_iter(expression) {
        let (Some(whole), Some(digits)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        // too large for an id: not a function reference
        let Ok(functionid) = digits.as_str().parse::<Id>() else {
            continue;
        };
        let function = functions
            .get(&functionid)
            .ok_or(StoreError::UnknownFunction {
                triggerid,
                functionid,
            })?;
        expanded.push_str(&expression[last..whole.start()]);
        expanded.push_str(function);
        last = whole.end();
    }
    expanded.push_str(&expression[last..]);
    Ok(expanded)
}
