//! pending registration shapes collected from an import document.
//!
//! every shape is keyed by the natural name the document uses; host-scoped
//! shapes nest under the owning host or template name.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// optional uuid carried next to a name reference. empty means absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UuidRef {
    #[serde(default)]
    pub uuid: String,
}

impl UuidRef {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self { uuid: uuid.into() }
    }
}

/// name -> uuid (groups, templates).
pub type NamedRefs = BTreeMap<String, UuidRef>;
/// plain names (hosts, icon maps, images, maps, proxies).
pub type NameSet = BTreeSet<String>;
/// owner host -> local name or key -> uuid (items, graphs, http tests).
pub type HostScopedRefs = BTreeMap<String, BTreeMap<String, UuidRef>>;
/// owner host -> local names (value maps, macros, template dashboards).
pub type HostScopedNames = BTreeMap<String, BTreeSet<String>>;
/// description -> expression -> recovery expression -> uuid.
pub type TriggerRefs = BTreeMap<String, BTreeMap<String, BTreeMap<String, UuidRef>>>;
/// owner host -> http test name -> step names.
pub type HttpStepRefs = BTreeMap<String, BTreeMap<String, BTreeSet<String>>>;
/// owner host -> discovery rule key -> prototypes.
pub type HostPrototypeRefs = BTreeMap<String, BTreeMap<String, Vec<HostPrototypeRef>>>;

/// host prototype reference under one discovery rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPrototypeRef {
    /// prototype host name.
    pub host: String,
    #[serde(default)]
    pub uuid: String,
    /// uuid of the owning discovery rule, when the document carries one.
    #[serde(default)]
    pub discovery_rule_uuid: String,
}

/// a pending registration set for one kind.
pub trait Pending: Clone + Default + Send + Sync + 'static {
    /// number of top-level references; zero means nothing to resolve.
    fn key_count(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.key_count() == 0
    }
}

impl<V> Pending for BTreeMap<String, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn key_count(&self) -> usize {
        self.len()
    }
}

impl Pending for BTreeSet<String> {
    fn key_count(&self) -> usize {
        self.len()
    }
}

/// every registration an import document needs, one optional set per kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Registrations {
    pub group: Option<NamedRefs>,
    pub template: Option<NamedRefs>,
    pub host: Option<NameSet>,
    pub item: Option<HostScopedRefs>,
    pub valuemap: Option<HostScopedNames>,
    pub trigger: Option<TriggerRefs>,
    pub graph: Option<HostScopedRefs>,
    pub iconmap: Option<NameSet>,
    pub image: Option<NameSet>,
    pub map: Option<NameSet>,
    pub template_dashboard: Option<HostScopedNames>,
    #[serde(rename = "macro")]
    pub macros: Option<HostScopedNames>,
    pub proxy: Option<NameSet>,
    pub host_prototype: Option<HostPrototypeRefs>,
    pub http_test: Option<HostScopedRefs>,
    pub http_step: Option<HttpStepRefs>,
}

/// non-empty uuids out of a set of references.
pub fn uuids<'a>(refs: impl IntoIterator<Item = &'a UuidRef>) -> BTreeSet<String> {
    refs.into_iter()
        .filter(|entry| !entry.uuid.is_empty())
        .map(|entry| entry.uuid.clone())
        .collect()
}
