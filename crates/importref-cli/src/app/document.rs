//! import reference documents: what to register and which lookups to run.

use anyhow::{Context, Result};
use importref_core::{EntityKind, Id, Registrations};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// raw on-disk representation of an import reference document.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ReferenceDocument {
    #[serde(default)]
    pub(crate) register: Registrations,
    #[serde(default)]
    pub(crate) interfaces: Vec<InterfaceRef>,
    /// kinds to load up front, before any lookup runs.
    #[serde(default)]
    pub(crate) prime: Vec<EntityKind>,
    #[serde(default)]
    pub(crate) lookups: Vec<LookupEntry>,
}

/// interface reference known to the import pipeline.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InterfaceRef {
    pub(crate) hostid: Id,
    #[serde(rename = "ref")]
    pub(crate) reference: String,
    pub(crate) interfaceid: Id,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LookupEntry {
    #[serde(flatten)]
    pub(crate) lookup: Lookup,
    /// refresh the lookup's kind first, as after a write.
    #[serde(default)]
    pub(crate) refresh_before: bool,
}

/// a lookup and its answer; `result` is null when nothing matched.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct LookupResult {
    #[serde(flatten)]
    pub(crate) lookup: Lookup,
    pub(crate) result: Value,
}

/// one resolver lookup with its key fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "lookup", rename_all = "snake_case")]
pub(crate) enum Lookup {
    GroupIdByUuid {
        uuid: String,
    },
    GroupIdByName {
        name: String,
    },
    TemplateIdByUuid {
        uuid: String,
    },
    TemplateIdByHost {
        host: String,
    },
    HostIdByHost {
        host: String,
    },
    TemplateOrHostIdByHost {
        host: String,
    },
    InterfaceIdByRef {
        hostid: Id,
        #[serde(rename = "ref")]
        reference: String,
    },
    ItemIdByUuid {
        uuid: String,
    },
    ItemIdByKey {
        hostid: Id,
        key: String,
    },
    ValuemapIdByName {
        hostid: Id,
        name: String,
    },
    TriggerById {
        triggerid: Id,
    },
    TriggerIdByUuid {
        uuid: String,
    },
    TriggerIdByName {
        description: String,
        expression: String,
        #[serde(default)]
        recovery_expression: String,
    },
    GraphIdByUuid {
        uuid: String,
    },
    GraphIdByName {
        hostid: Id,
        name: String,
    },
    IconmapIdByName {
        name: String,
    },
    ImageIdByName {
        name: String,
    },
    MapIdByName {
        name: String,
    },
    TemplateDashboardId {
        templateid: Id,
        name: String,
    },
    MacroId {
        hostid: Id,
        #[serde(rename = "macro")]
        name: String,
    },
    ProxyIdByHost {
        host: String,
    },
    HostPrototypeIdByUuid {
        uuid: String,
    },
    HostPrototypeIdByHost {
        parent_hostid: Id,
        discovery_ruleid: Id,
        host: String,
    },
    HttpTestIdByUuid {
        uuid: String,
    },
    HttpTestIdByName {
        hostid: Id,
        name: String,
    },
    HttpStepIdByName {
        hostid: Id,
        httptestid: Id,
        name: String,
    },
}

impl Lookup {
    /// kind whose cache answers this lookup. interface refs are never cached
    /// from the store and report `None`.
    pub(crate) fn kind(&self) -> Option<EntityKind> {
        let kind = match self {
            Lookup::GroupIdByUuid { .. } | Lookup::GroupIdByName { .. } => EntityKind::Group,
            Lookup::TemplateIdByUuid { .. } | Lookup::TemplateIdByHost { .. } => {
                EntityKind::Template
            }
            Lookup::HostIdByHost { .. } | Lookup::TemplateOrHostIdByHost { .. } => EntityKind::Host,
            Lookup::InterfaceIdByRef { .. } => return None,
            Lookup::ItemIdByUuid { .. } | Lookup::ItemIdByKey { .. } => EntityKind::Item,
            Lookup::ValuemapIdByName { .. } => EntityKind::Valuemap,
            Lookup::TriggerById { .. }
            | Lookup::TriggerIdByUuid { .. }
            | Lookup::TriggerIdByName { .. } => EntityKind::Trigger,
            Lookup::GraphIdByUuid { .. } | Lookup::GraphIdByName { .. } => EntityKind::Graph,
            Lookup::IconmapIdByName { .. } => EntityKind::Iconmap,
            Lookup::ImageIdByName { .. } => EntityKind::Image,
            Lookup::MapIdByName { .. } => EntityKind::Map,
            Lookup::TemplateDashboardId { .. } => EntityKind::TemplateDashboard,
            Lookup::MacroId { .. } => EntityKind::Macro,
            Lookup::ProxyIdByHost { .. } => EntityKind::Proxy,
            Lookup::HostPrototypeIdByUuid { .. } | Lookup::HostPrototypeIdByHost { .. } => {
                EntityKind::HostPrototype
            }
            Lookup::HttpTestIdByUuid { .. } | Lookup::HttpTestIdByName { .. } => {
                EntityKind::HttpTest
            }
            Lookup::HttpStepIdByName { .. } => EntityKind::HttpStep,
        };
        Some(kind)
    }
}

/// load a reference document (yaml or json).
pub(crate) fn load_document(path: &Path) -> Result<ReferenceDocument> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read document: {}", path.display()))?;
    if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::from_str(&raw).with_context(|| format!("parse json: {}", path.display()))
    } else {
        serde_yaml::from_str(&raw).with_context(|| format!("parse yaml: {}", path.display()))
    }
}
