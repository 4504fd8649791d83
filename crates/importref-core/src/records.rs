//! identity records cached by the resolver, decoded from store rows.

use crate::kind::{EntityKind, Id};
use crate::query::{Row, Rows};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// a store row that could not be decoded into an identity record.
#[derive(Debug, Error)]
#[error("malformed {kind} row {id}: {source}")]
pub struct RowError {
    pub kind: EntityKind,
    pub id: Id,
    #[source]
    pub source: serde_json::Error,
}

/// decode every row of a query result into identity records.
pub fn decode_rows<R: DeserializeOwned>(
    kind: EntityKind,
    rows: Rows,
) -> Result<BTreeMap<Id, R>, RowError> {
    rows.into_iter()
        .map(|(id, row)| decode_row(kind, id, row).map(|record| (id, record)))
        .collect()
}

fn decode_row<R: DeserializeOwned>(kind: EntityKind, id: Id, row: Row) -> Result<R, RowError> {
    serde_json::from_value(serde_json::Value::Object(row)).map_err(|source| RowError {
        kind,
        id,
        source,
    })
}

/// ids arrive either as json numbers or as numeric strings.
pub mod id_format {
    use crate::kind::Id;
    use serde::de::{self, Deserializer};
    use serde::Deserialize;
    use serde_json::Value;

    pub fn parse(value: &Value) -> Option<Id> {
        match value {
            Value::Number(number) => number.as_u64(),
            Value::String(raw) => raw.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Id, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parse(&value).ok_or_else(|| de::Error::custom(format!("invalid id: {value}")))
    }

    pub fn deserialize_many<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Id>, D::Error> {
        let values = Vec::<Value>::deserialize(deserializer)?;
        values
            .iter()
            .map(|value| {
                // graph hosts may come back as `{ "hostid": .. }` objects
                let raw = value.get("hostid").unwrap_or(value);
                parse(raw).ok_or_else(|| de::Error::custom(format!("invalid id: {value}")))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    #[serde(default)]
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    #[serde(default)]
    pub uuid: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub hostid: Id,
    #[serde(default)]
    pub uuid: String,
    #[serde(rename = "key_")]
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuemapRecord {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub hostid: Id,
    pub name: String,
}

/// trigger identity; expressions are held in resolved (macro-expanded) form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    #[serde(default)]
    pub uuid: String,
    pub description: String,
    pub expression: String,
    #[serde(default)]
    pub recovery_expression: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRecord {
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    /// ids of every host or template the graph draws items from.
    #[serde(default, deserialize_with = "id_format::deserialize_many")]
    pub hosts: Vec<Id>,
}

/// identity for kinds keyed by a single name (icon maps, images, maps).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRecord {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDashboardRecord {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub templateid: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroRecord {
    #[serde(deserialize_with = "id_format::deserialize")]
    pub hostid: Id,
    #[serde(rename = "macro")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPrototypeRecord {
    #[serde(default)]
    pub uuid: String,
    pub host: String,
    #[serde(deserialize_with = "id_format::deserialize")]
    pub parent_hostid: Id,
    #[serde(deserialize_with = "id_format::deserialize")]
    pub discovery_ruleid: Id,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTestRecord {
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    #[serde(deserialize_with = "id_format::deserialize")]
    pub hostid: Id,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpStepRecord {
    pub name: String,
    #[serde(deserialize_with = "id_format::deserialize")]
    pub hostid: Id,
    #[serde(deserialize_with = "id_format::deserialize")]
    pub httptestid: Id,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(entries: Vec<(Id, serde_json::Value)>) -> Rows {
        entries
            .into_iter()
            .map(|(id, value)| (id, value.as_object().unwrap().clone()))
            .collect()
    }

    #[test]
    fn decode_accepts_string_and_numeric_ids() {
        let decoded: BTreeMap<Id, ItemRecord> = decode_rows(
            EntityKind::Item,
            rows(vec![
                (1, json!({ "hostid": "10100", "key_": "agent.ping", "uuid": "u1" })),
                (2, json!({ "hostid": 10101, "key_": "system.uptime" })),
            ]),
        )
        .unwrap();
        assert_eq!(decoded[&1].hostid, 10100);
        assert_eq!(decoded[&1].key, "agent.ping");
        assert_eq!(decoded[&2].hostid, 10101);
        assert_eq!(decoded[&2].uuid, "");
    }

    #[test]
    fn decode_reports_kind_and_id_on_missing_field() {
        let err = decode_rows::<GroupRecord>(EntityKind::Group, rows(vec![(7, json!({ "uuid": "x" }))]))
            .unwrap_err();
        assert_eq!(err.kind, EntityKind::Group);
        assert_eq!(err.id, 7);
        assert!(err.to_string().starts_with("malformed group row 7"));
    }

    #[test]
    fn decode_rejects_non_numeric_id() {
        let err = decode_rows::<MacroRecord>(
            EntityKind::Macro,
            rows(vec![(3, json!({ "hostid": "abc", "macro": "{$PORT}" }))]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid id"));
    }

    #[test]
    fn graph_hosts_accept_plain_ids_and_objects() {
        let decoded: BTreeMap<Id, GraphRecord> = decode_rows(
            EntityKind::Graph,
            rows(vec![
                (5, json!({ "name": "CPU", "hosts": [10100, "10101"] })),
                (6, json!({ "name": "Memory", "hosts": [{ "hostid": "10102" }] })),
            ]),
        )
        .unwrap();
        assert_eq!(decoded[&5].hosts, vec![10100, 10101]);
        assert_eq!(decoded[&6].hosts, vec![10102]);
    }
}
