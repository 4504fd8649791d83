//! filtered query model shared by the resolver and data stores.

use crate::kind::{EntityKind, Id};
use serde_json::Value;
use std::collections::BTreeMap;

/// one persisted row, restricted to the requested output fields.
pub type Row = serde_json::Map<String, Value>;

/// query result keyed by database id.
pub type Rows = BTreeMap<Id, Row>;

/// discovery-state flags carried by triggers.
pub mod flags {
    /// plain entity.
    pub const DISCOVERY_NORMAL: u64 = 0;
    /// prototype owned by a discovery rule.
    pub const DISCOVERY_PROTOTYPE: u64 = 2;
    /// entity created from a prototype.
    pub const DISCOVERY_CREATED: u64 = 4;
}

/// filter tree evaluated by a data store.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// field equals a single value.
    Eq { field: String, value: Value },
    /// field is one of a set of values. an empty set matches nothing.
    In { field: String, values: Vec<Value> },
    /// every branch matches.
    And(Vec<Condition>),
    /// at least one branch matches.
    Or(Vec<Condition>),
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn one_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Condition::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn all(branches: Vec<Condition>) -> Self {
        Condition::And(branches)
    }

    pub fn any(branches: Vec<Condition>) -> Self {
        Condition::Or(branches)
    }

    /// true when no row can ever match, so the query need not be issued.
    pub fn is_unsatisfiable(&self) -> bool {
        match self {
            Condition::Eq { .. } => false,
            Condition::In { values, .. } => values.is_empty(),
            Condition::And(branches) => branches.iter().any(Condition::is_unsatisfiable),
            Condition::Or(branches) => branches.iter().all(Condition::is_unsatisfiable),
        }
    }

    /// drop unsatisfiable `Or` branches, keeping the condition's meaning.
    pub fn pruned(self) -> Self {
        match self {
            Condition::And(branches) => {
                Condition::And(branches.into_iter().map(Condition::pruned).collect())
            }
            Condition::Or(branches) => Condition::Or(
                branches
                    .into_iter()
                    .map(Condition::pruned)
                    .filter(|branch| !branch.is_unsatisfiable())
                    .collect(),
            ),
            leaf => leaf,
        }
    }
}

/// a filtered select against one entity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// entity kind (table or join) to read.
    pub kind: EntityKind,
    /// fields to return for each row; the id is always the map key.
    pub output: Vec<String>,
    /// row filter.
    pub filter: Condition,
}

impl Query {
    pub fn new(kind: EntityKind, output: &[&str], filter: Condition) -> Self {
        Self {
            kind,
            output: output.iter().map(|field| field.to_string()).collect(),
            filter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_set_is_unsatisfiable() {
        let empty: Vec<String> = Vec::new();
        assert!(Condition::one_of("name", empty).is_unsatisfiable());
        assert!(!Condition::one_of("name", ["a"]).is_unsatisfiable());
    }

    #[test]
    fn or_is_unsatisfiable_only_when_every_branch_is() {
        let empty: Vec<String> = Vec::new();
        let cond = Condition::any(vec![
            Condition::one_of("uuid", empty.clone()),
            Condition::one_of("name", ["Templates"]),
        ]);
        assert!(!cond.is_unsatisfiable());

        let cond = Condition::any(vec![
            Condition::one_of("uuid", empty.clone()),
            Condition::one_of("name", empty),
        ]);
        assert!(cond.is_unsatisfiable());
        assert!(Condition::any(Vec::new()).is_unsatisfiable());
    }

    #[test]
    fn and_is_unsatisfiable_when_any_branch_is() {
        let empty: Vec<String> = Vec::new();
        let cond = Condition::all(vec![
            Condition::eq("hostid", 10100u64),
            Condition::one_of("key_", empty),
        ]);
        assert!(cond.is_unsatisfiable());
    }

    #[test]
    fn pruned_drops_empty_or_branches() {
        let empty: Vec<String> = Vec::new();
        let cond = Condition::all(vec![
            Condition::eq("hostid", 1u64),
            Condition::any(vec![
                Condition::one_of("key_", ["agent.ping"]),
                Condition::one_of("uuid", empty),
            ]),
        ])
        .pruned();
        assert_eq!(
            cond,
            Condition::And(vec![
                Condition::Eq {
                    field: "hostid".to_string(),
                    value: json!(1)
                },
                Condition::Or(vec![Condition::In {
                    field: "key_".to_string(),
                    values: vec![json!("agent.ping")]
                }]),
            ])
        );
    }

    #[test]
    fn query_new_copies_output_fields() {
        let query = Query::new(
            EntityKind::Group,
            &["uuid", "name"],
            Condition::one_of("name", ["Linux servers"]),
        );
        assert_eq!(query.output, vec!["uuid".to_string(), "name".to_string()]);
        assert_eq!(query.kind, EntityKind::Group);
    }
}
