//! snapshot documents: the persisted rows a memory store serves.

use anyhow::{Context, Result};
use importref_core::{EntityKind, Id, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// rows per kind plus the trigger function table used for expression expansion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    #[serde(default)]
    pub tables: BTreeMap<EntityKind, BTreeMap<Id, Row>>,
    /// function id -> canonical function text, referenced as `{id}` in
    /// stored trigger expressions.
    #[serde(default)]
    pub functions: BTreeMap<Id, String>,
}

/// errors raised by the memory store itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown {kind} field: {field}")]
    UnknownField { kind: EntityKind, field: String },
    #[error("trigger {triggerid} references unknown function {{{functionid}}}")]
    UnknownFunction { triggerid: Id, functionid: Id },
}

/// columns a kind's rows may carry.
pub fn columns(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Group => &["uuid", "name"],
        EntityKind::Template => &["uuid", "host"],
        EntityKind::Host => &["host", "status"],
        EntityKind::Item => &["hostid", "key_", "uuid", "flags"],
        EntityKind::Valuemap => &["hostid", "name"],
        EntityKind::Trigger => &["uuid", "description", "expression", "recovery_expression", "flags"],
        EntityKind::Graph => &["uuid", "name", "hosts", "flags"],
        EntityKind::Iconmap | EntityKind::Image | EntityKind::Map => &["name"],
        EntityKind::TemplateDashboard => &["templateid", "name"],
        EntityKind::Macro => &["hostid", "macro"],
        EntityKind::Proxy => &["host"],
        EntityKind::HostPrototype => &["uuid", "host", "parent_hostid", "discovery_ruleid"],
        EntityKind::HttpTest => &["uuid", "name", "hostid"],
        EntityKind::HttpStep => &["name", "hostid", "httptestid"],
    }
}

pub(crate) fn check_field(kind: EntityKind, field: &str) -> Result<(), StoreError> {
    if columns(kind).contains(&field) {
        Ok(())
    } else {
        Err(StoreError::UnknownField {
            kind,
            field: field.to_string(),
        })
    }
}

pub(crate) fn check_row(kind: EntityKind, row: &Row) -> Result<(), StoreError> {
    row.keys().try_for_each(|field| check_field(kind, field))
}

impl Snapshot {
    /// reject rows carrying columns their kind does not have.
    pub fn validate(&self) -> Result<(), StoreError> {
        for (kind, rows) in &self.tables {
            for row in rows.values() {
                check_row(*kind, row)?;
            }
        }
        Ok(())
    }
}

/// load a snapshot file; `.json` is parsed as json, everything else as yaml.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("read snapshot: {}", path.display()))?;
    let snapshot: Snapshot = if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::from_str(&content)
            .with_context(|| format!("parse json: {}", path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("parse yaml: {}", path.display()))?
    };
    snapshot
        .validate()
        .with_context(|| format!("invalid snapshot: {}", path.display()))?;
    Ok(snapshot)
}
