//! collaborator contracts for persisted-entity access.

use async_trait::async_trait;
use importref_core::{Id, Query, Rows, TriggerRecord};
use std::collections::BTreeMap;

/// filtered query capability over persisted entities.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// run one filtered select and return matching rows keyed by id.
    async fn select(&self, query: &Query) -> anyhow::Result<Rows>;
}

/// rewrites trigger expressions to their canonical, macro-expanded text.
#[async_trait]
pub trait ExpressionResolver: Send + Sync {
    /// resolve `expression` and `recovery_expression` of every trigger,
    /// returning the same ids.
    async fn resolve_trigger_expressions(
        &self,
        triggers: BTreeMap<Id, TriggerRecord>,
    ) -> anyhow::Result<BTreeMap<Id, TriggerRecord>>;
}

/// expression resolver for stores that already hold canonical text.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerbatimExpressions;

#[async_trait]
impl ExpressionResolver for VerbatimExpressions {
    async fn resolve_trigger_expressions(
        &self,
        triggers: BTreeMap<Id, TriggerRecord>,
    ) -> anyhow::Result<BTreeMap<Id, TriggerRecord>> {
        Ok(triggers)
    }
}
