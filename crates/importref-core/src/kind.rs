//! entity kinds and their resolution dependencies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// database identifier of a persisted entity.
pub type Id = u64;

/// category of importable configuration object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Group,
    Template,
    Host,
    Item,
    Valuemap,
    Trigger,
    Graph,
    Iconmap,
    Image,
    Map,
    TemplateDashboard,
    Macro,
    Proxy,
    HostPrototype,
    HttpTest,
    HttpStep,
}

impl EntityKind {
    /// every kind, in declaration order.
    pub const ALL: [EntityKind; 16] = [
        EntityKind::Group,
        EntityKind::Template,
        EntityKind::Host,
        EntityKind::Item,
        EntityKind::Valuemap,
        EntityKind::Trigger,
        EntityKind::Graph,
        EntityKind::Iconmap,
        EntityKind::Image,
        EntityKind::Map,
        EntityKind::TemplateDashboard,
        EntityKind::Macro,
        EntityKind::Proxy,
        EntityKind::HostPrototype,
        EntityKind::HttpTest,
        EntityKind::HttpStep,
    ];

    /// return the canonical string form used in serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Group => "group",
            EntityKind::Template => "template",
            EntityKind::Host => "host",
            EntityKind::Item => "item",
            EntityKind::Valuemap => "valuemap",
            EntityKind::Trigger => "trigger",
            EntityKind::Graph => "graph",
            EntityKind::Iconmap => "iconmap",
            EntityKind::Image => "image",
            EntityKind::Map => "map",
            EntityKind::TemplateDashboard => "template_dashboard",
            EntityKind::Macro => "macro",
            EntityKind::Proxy => "proxy",
            EntityKind::HostPrototype => "host_prototype",
            EntityKind::HttpTest => "http_test",
            EntityKind::HttpStep => "http_step",
        }
    }

    /// kinds whose caches must be loaded before this kind's batch query can be built.
    ///
    /// host-scoped kinds need their owner names resolved (templates first, then
    /// hosts); host prototypes additionally need their discovery rules, which
    /// are items.
    pub fn dependencies(&self) -> &'static [EntityKind] {
        match self {
            EntityKind::Item
            | EntityKind::Valuemap
            | EntityKind::Macro
            | EntityKind::HttpTest
            | EntityKind::HttpStep => &[EntityKind::Template, EntityKind::Host],
            EntityKind::TemplateDashboard => &[EntityKind::Template],
            EntityKind::HostPrototype => &[EntityKind::Template, EntityKind::Host, EntityKind::Item],
            EntityKind::Group
            | EntityKind::Template
            | EntityKind::Host
            | EntityKind::Trigger
            | EntityKind::Graph
            | EntityKind::Iconmap
            | EntityKind::Image
            | EntityKind::Map
            | EntityKind::Proxy => &[],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// error returned when parsing an unknown kind name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown entity kind: {0}")]
pub struct KindParseError(pub String);

impl FromStr for EntityKind {
    type Err = KindParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().replace('-', "_");
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| KindParseError(value.to_string()))
    }
}

/// expand `kinds` with their dependencies and order them so every kind
/// follows everything it depends on. duplicates are removed.
pub fn resolution_order(kinds: &[EntityKind]) -> Vec<EntityKind> {
    let mut ordered = Vec::new();
    let mut seen = BTreeSet::new();
    for kind in kinds {
        visit(*kind, &mut seen, &mut ordered);
    }
    ordered
}

fn visit(kind: EntityKind, seen: &mut BTreeSet<EntityKind>, ordered: &mut Vec<EntityKind>) {
    if !seen.insert(kind) {
        return;
    }
    for dependency in kind.dependencies() {
        visit(*dependency, seen, ordered);
    }
    ordered.push(kind);
}
