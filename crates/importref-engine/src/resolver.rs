//! import reference resolver: name/uuid -> database id, one batch per kind.
//!
//! a resolver lives for one import operation. the pipeline registers every
//! reference it will need for a kind *before* the first lookup of that kind;
//! the first lookup runs a single batched query covering the whole pending
//! set and caches the result. registering again before that lookup replaces
//! the earlier set, it never merges. lookups that miss return `Ok(None)`.
//! after writes, call [`Resolver::refresh`] so the next lookup queries again.

use crate::batch::{
    BatchLookup, Graphs, Groups, HostPrototypes, Hosts, HttpSteps, HttpTests, Iconmaps, Images,
    Items, KindSlot, Macros, Maps, Proxies, Templates, TemplateDashboards, Triggers, Valuemaps,
};
use crate::slot::Slot;
use crate::store::{DataStore, ExpressionResolver};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use importref_core::{
    resolution_order, EntityKind, GraphRecord, GroupRecord, HostPrototypeRecord,
    HostPrototypeRefs, HostRecord, HostScopedNames, HostScopedRefs, HttpStepRecord, HttpStepRefs,
    HttpTestRecord, Id, ItemRecord, MacroRecord, NameSet, NamedRecord, NamedRefs, Pending,
    ProxyRecord, Registrations, TemplateDashboardRecord, TemplateRecord, TriggerRecord,
    TriggerRefs, ValuemapRecord,
};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// run `$body` with `$k` bound to the marker type of `$kind`.
macro_rules! with_kind {
    ($kind:expr, $k:ident => $body:expr) => {
        match $kind {
            EntityKind::Group => {
                type $k = Groups;
                $body
            }
            EntityKind::Template => {
                type $k = Templates;
                $body
            }
            EntityKind::Host => {
                type $k = Hosts;
                $body
            }
            EntityKind::Item => {
                type $k = Items;
                $body
            }
            EntityKind::Valuemap => {
                type $k = Valuemaps;
                $body
            }
            EntityKind::Trigger => {
                type $k = Triggers;
                $body
            }
            EntityKind::Graph => {
                type $k = Graphs;
                $body
            }
            EntityKind::Iconmap => {
                type $k = Iconmaps;
                $body
            }
            EntityKind::Image => {
                type $k = Images;
                $body
            }
            EntityKind::Map => {
                type $k = Maps;
                $body
            }
            EntityKind::TemplateDashboard => {
                type $k = TemplateDashboards;
                $body
            }
            EntityKind::Macro => {
                type $k = Macros;
                $body
            }
            EntityKind::Proxy => {
                type $k = Proxies;
                $body
            }
            EntityKind::HostPrototype => {
                type $k = HostPrototypes;
                $body
            }
            EntityKind::HttpTest => {
                type $k = HttpTests;
                $body
            }
            EntityKind::HttpStep => {
                type $k = HttpSteps;
                $body
            }
        }
    };
}

/// one cache slot per kind.
#[derive(Default)]
pub(crate) struct Slots {
    pub(crate) groups: Slot<NamedRefs, GroupRecord>,
    pub(crate) templates: Slot<NamedRefs, TemplateRecord>,
    pub(crate) hosts: Slot<NameSet, HostRecord>,
    pub(crate) items: Slot<HostScopedRefs, ItemRecord>,
    pub(crate) valuemaps: Slot<HostScopedNames, ValuemapRecord>,
    pub(crate) triggers: Slot<TriggerRefs, TriggerRecord>,
    pub(crate) graphs: Slot<HostScopedRefs, GraphRecord>,
    pub(crate) iconmaps: Slot<NameSet, NamedRecord>,
    pub(crate) images: Slot<NameSet, NamedRecord>,
    pub(crate) maps: Slot<NameSet, NamedRecord>,
    pub(crate) template_dashboards: Slot<HostScopedNames, TemplateDashboardRecord>,
    pub(crate) macros: Slot<HostScopedNames, MacroRecord>,
    pub(crate) proxies: Slot<NameSet, ProxyRecord>,
    pub(crate) host_prototypes: Slot<HostPrototypeRefs, HostPrototypeRecord>,
    pub(crate) http_tests: Slot<HostScopedRefs, HttpTestRecord>,
    pub(crate) http_steps: Slot<HttpStepRefs, HttpStepRecord>,
}

/// per-import reference resolver over a data store.
pub struct Resolver<'a> {
    store: &'a dyn DataStore,
    expressions: &'a dyn ExpressionResolver,
    slots: Slots,
    interfaces: BTreeMap<Id, BTreeMap<String, Id>>,
}

impl<'a> Resolver<'a> {
    /// create a resolver for one import operation.
    pub fn new(store: &'a dyn DataStore, expressions: &'a dyn ExpressionResolver) -> Self {
        Self {
            store,
            expressions,
            slots: Slots::default(),
            interfaces: BTreeMap::new(),
        }
    }

    /// create a resolver over a backend that also resolves trigger expressions.
    pub fn with_backend<B>(backend: &'a B) -> Self
    where
        B: DataStore + ExpressionResolver,
    {
        Self::new(backend, backend)
    }

    pub(crate) fn store(&self) -> &dyn DataStore {
        self.store
    }

    pub(crate) fn expressions(&self) -> &dyn ExpressionResolver {
        self.expressions
    }

    // registration

    pub fn register_groups(&mut self, groups: NamedRefs) {
        self.slots.groups.register(groups);
    }

    pub fn register_templates(&mut self, templates: NamedRefs) {
        self.slots.templates.register(templates);
    }

    pub fn register_hosts(&mut self, hosts: NameSet) {
        self.slots.hosts.register(hosts);
    }

    /// register item keys per owning host or template name.
    pub fn register_items(&mut self, items: HostScopedRefs) {
        self.slots.items.register(items);
    }

    pub fn register_valuemaps(&mut self, valuemaps: HostScopedNames) {
        self.slots.valuemaps.register(valuemaps);
    }

    /// register triggers by description, expression and recovery expression,
    /// all in resolved form.
    pub fn register_triggers(&mut self, triggers: TriggerRefs) {
        self.slots.triggers.register(triggers);
    }

    pub fn register_graphs(&mut self, graphs: HostScopedRefs) {
        self.slots.graphs.register(graphs);
    }

    pub fn register_iconmaps(&mut self, iconmaps: NameSet) {
        self.slots.iconmaps.register(iconmaps);
    }

    pub fn register_images(&mut self, images: NameSet) {
        self.slots.images.register(images);
    }

    pub fn register_maps(&mut self, maps: NameSet) {
        self.slots.maps.register(maps);
    }

    /// register dashboard names per owning template name.
    pub fn register_template_dashboards(&mut self, dashboards: HostScopedNames) {
        self.slots.template_dashboards.register(dashboards);
    }

    pub fn register_macros(&mut self, macros: HostScopedNames) {
        self.slots.macros.register(macros);
    }

    pub fn register_proxies(&mut self, proxies: NameSet) {
        self.slots.proxies.register(proxies);
    }

    /// register host prototypes per owner host and discovery rule key.
    ///
    /// discovery rules are resolved through the item cache, so the rules must
    /// be part of the item registration as well.
    pub fn register_host_prototypes(&mut self, host_prototypes: HostPrototypeRefs) {
        self.slots.host_prototypes.register(host_prototypes);
    }

    pub fn register_http_tests(&mut self, http_tests: HostScopedRefs) {
        self.slots.http_tests.register(http_tests);
    }

    pub fn register_http_steps(&mut self, http_steps: HttpStepRefs) {
        self.slots.http_steps.register(http_steps);
    }

    /// register every set present in `registrations`; absent kinds are untouched.
    pub fn register_all(&mut self, registrations: Registrations) {
        let Registrations {
            group,
            template,
            host,
            item,
            valuemap,
            trigger,
            graph,
            iconmap,
            image,
            map,
            template_dashboard,
            macros,
            proxy,
            host_prototype,
            http_test,
            http_step,
        } = registrations;

        if let Some(set) = group {
            self.register_groups(set);
        }
        if let Some(set) = template {
            self.register_templates(set);
        }
        if let Some(set) = host {
            self.register_hosts(set);
        }
        if let Some(set) = item {
            self.register_items(set);
        }
        if let Some(set) = valuemap {
            self.register_valuemaps(set);
        }
        if let Some(set) = trigger {
            self.register_triggers(set);
        }
        if let Some(set) = graph {
            self.register_graphs(set);
        }
        if let Some(set) = iconmap {
            self.register_iconmaps(set);
        }
        if let Some(set) = image {
            self.register_images(set);
        }
        if let Some(set) = map {
            self.register_maps(set);
        }
        if let Some(set) = template_dashboard {
            self.register_template_dashboards(set);
        }
        if let Some(set) = macros {
            self.register_macros(set);
        }
        if let Some(set) = proxy {
            self.register_proxies(set);
        }
        if let Some(set) = host_prototype {
            self.register_host_prototypes(set);
        }
        if let Some(set) = http_test {
            self.register_http_tests(set);
        }
        if let Some(set) = http_step {
            self.register_http_steps(set);
        }
    }

    // cache control

    /// true once the kind's batch has run and until it is refreshed.
    pub fn is_loaded(&self, kind: EntityKind) -> bool {
        with_kind!(kind, K => K::slot(&self.slots).is_loaded())
    }

    /// discard the kind's cached records so the next lookup queries again.
    /// registrations made after the refresh are used for that query;
    /// otherwise the previous working set is queried again.
    pub fn refresh(&mut self, kind: EntityKind) {
        trace!(%kind, "refreshing reference cache");
        with_kind!(kind, K => K::slot_mut(&mut self.slots).refresh())
    }

    /// load the given kinds and everything they depend on, dependencies first.
    pub async fn prime(&mut self, kinds: &[EntityKind]) -> Result<()> {
        for kind in resolution_order(kinds) {
            self.load_kind(kind).await?;
        }
        Ok(())
    }

    fn load_kind(&mut self, kind: EntityKind) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { with_kind!(kind, K => self.load::<K>().await) })
    }

    async fn load<K: BatchLookup>(&mut self) -> Result<()> {
        let kind = K::KIND;
        if K::slot(&self.slots).is_loaded() {
            return Ok(());
        }
        for dependency in kind.dependencies() {
            self.load_kind(*dependency).await?;
        }

        let slot = K::slot_mut(&mut self.slots);
        if !slot.has_pending() {
            trace!(%kind, "no new registrations, reusing previous batch");
        }
        let batch = slot.take_batch();
        let result = if batch.is_empty() {
            trace!(%kind, "nothing registered, caching empty set");
            Ok(BTreeMap::new())
        } else {
            K::select(self, &batch)
                .await
                .with_context(|| format!("resolve {kind} references"))
        };

        match result {
            Ok(records) => {
                debug!(
                    %kind,
                    pending = batch.key_count(),
                    resolved = records.len(),
                    "resolved reference batch"
                );
                K::slot_mut(&mut self.slots).populate(batch, records);
                Ok(())
            }
            Err(err) => {
                K::slot_mut(&mut self.slots).restore(batch);
                Err(err)
            }
        }
    }

    fn find_loaded<K: KindSlot>(&self, matches: impl Fn(&K::Record) -> bool) -> Option<Id> {
        K::slot(&self.slots)
            .records()
            .find(|&(_, record)| matches(record))
            .map(|(id, _)| *id)
    }

    async fn find<K: BatchLookup>(
        &mut self,
        matches: impl Fn(&K::Record) -> bool,
    ) -> Result<Option<Id>> {
        self.load::<K>().await?;
        Ok(self.find_loaded::<K>(matches))
    }

    pub(crate) fn loaded_template_id(&self, host: &str) -> Option<Id> {
        self.find_loaded::<Templates>(|template| template.host == host)
    }

    pub(crate) fn loaded_template_or_host_id(&self, host: &str) -> Option<Id> {
        self.loaded_template_id(host)
            .or_else(|| self.find_loaded::<Hosts>(|record| record.host == host))
    }

    pub(crate) fn loaded_item_id_by_uuid(&self, uuid: &str) -> Option<Id> {
        if uuid.is_empty() {
            return None;
        }
        self.find_loaded::<Items>(|item| item.uuid == uuid)
    }

    pub(crate) fn loaded_item_id_by_key(&self, hostid: Id, key: &str) -> Option<Id> {
        self.find_loaded::<Items>(|item| item.hostid == hostid && item.key == key)
    }

    // lookups

    pub async fn find_group_id_by_uuid(&mut self, uuid: &str) -> Result<Option<Id>> {
        if uuid.is_empty() {
            return Ok(None);
        }
        self.find::<Groups>(|group| group.uuid == uuid).await
    }

    pub async fn find_group_id_by_name(&mut self, name: &str) -> Result<Option<Id>> {
        self.find::<Groups>(|group| group.name == name).await
    }

    pub async fn find_template_id_by_uuid(&mut self, uuid: &str) -> Result<Option<Id>> {
        if uuid.is_empty() {
            return Ok(None);
        }
        self.find::<Templates>(|template| template.uuid == uuid).await
    }

    pub async fn find_template_id_by_host(&mut self, host: &str) -> Result<Option<Id>> {
        self.find::<Templates>(|template| template.host == host).await
    }

    pub async fn find_host_id_by_host(&mut self, host: &str) -> Result<Option<Id>> {
        self.find::<Hosts>(|record| record.host == host).await
    }

    /// resolve an owner name: templates first, then hosts.
    pub async fn find_template_or_host_id_by_host(&mut self, host: &str) -> Result<Option<Id>> {
        if let Some(templateid) = self.find_template_id_by_host(host).await? {
            return Ok(Some(templateid));
        }
        self.find_host_id_by_host(host).await
    }

    pub async fn find_item_id_by_uuid(&mut self, uuid: &str) -> Result<Option<Id>> {
        self.load::<Items>().await?;
        Ok(self.loaded_item_id_by_uuid(uuid))
    }

    pub async fn find_item_id_by_key(&mut self, hostid: Id, key: &str) -> Result<Option<Id>> {
        self.load::<Items>().await?;
        Ok(self.loaded_item_id_by_key(hostid, key))
    }

    pub async fn find_valuemap_id_by_name(&mut self, hostid: Id, name: &str) -> Result<Option<Id>> {
        self.find::<Valuemaps>(|valuemap| valuemap.hostid == hostid && valuemap.name == name)
            .await
    }

    /// full cached trigger record, expressions in resolved form.
    pub async fn find_trigger_by_id(&mut self, triggerid: Id) -> Result<Option<TriggerRecord>> {
        self.load::<Triggers>().await?;
        Ok(Triggers::slot(&self.slots).get(triggerid).cloned())
    }

    pub async fn find_trigger_id_by_uuid(&mut self, uuid: &str) -> Result<Option<Id>> {
        if uuid.is_empty() {
            return Ok(None);
        }
        self.find::<Triggers>(|trigger| trigger.uuid == uuid).await
    }

    /// match on description, expression and recovery expression together.
    pub async fn find_trigger_id_by_name(
        &mut self,
        description: &str,
        expression: &str,
        recovery_expression: &str,
    ) -> Result<Option<Id>> {
        self.find::<Triggers>(|trigger| {
            trigger.description == description
                && trigger.expression == expression
                && trigger.recovery_expression == recovery_expression
        })
        .await
    }

    pub async fn find_graph_id_by_uuid(&mut self, uuid: &str) -> Result<Option<Id>> {
        if uuid.is_empty() {
            return Ok(None);
        }
        self.find::<Graphs>(|graph| graph.uuid == uuid).await
    }

    /// graph with `name` drawing from `hostid`.
    pub async fn find_graph_id_by_name(&mut self, hostid: Id, name: &str) -> Result<Option<Id>> {
        self.find::<Graphs>(|graph| graph.name == name && graph.hosts.contains(&hostid))
            .await
    }

    pub async fn find_iconmap_id_by_name(&mut self, name: &str) -> Result<Option<Id>> {
        self.find::<Iconmaps>(|iconmap| iconmap.name == name).await
    }

    pub async fn find_image_id_by_name(&mut self, name: &str) -> Result<Option<Id>> {
        self.find::<Images>(|image| image.name == name).await
    }

    pub async fn find_map_id_by_name(&mut self, name: &str) -> Result<Option<Id>> {
        self.find::<Maps>(|map| map.name == name).await
    }

    pub async fn find_template_dashboard_id(
        &mut self,
        templateid: Id,
        name: &str,
    ) -> Result<Option<Id>> {
        self.find::<TemplateDashboards>(|dashboard| {
            dashboard.templateid == templateid && dashboard.name == name
        })
        .await
    }

    pub async fn find_macro_id(&mut self, hostid: Id, name: &str) -> Result<Option<Id>> {
        self.find::<Macros>(|record| record.hostid == hostid && record.name == name)
            .await
    }

    pub async fn find_proxy_id_by_host(&mut self, host: &str) -> Result<Option<Id>> {
        self.find::<Proxies>(|proxy| proxy.host == host).await
    }

    pub async fn find_host_prototype_id_by_uuid(&mut self, uuid: &str) -> Result<Option<Id>> {
        if uuid.is_empty() {
            return Ok(None);
        }
        self.find::<HostPrototypes>(|prototype| prototype.uuid == uuid)
            .await
    }

    pub async fn find_host_prototype_id_by_host(
        &mut self,
        parent_hostid: Id,
        discovery_ruleid: Id,
        host: &str,
    ) -> Result<Option<Id>> {
        self.find::<HostPrototypes>(|prototype| {
            prototype.parent_hostid == parent_hostid
                && prototype.discovery_ruleid == discovery_ruleid
                && prototype.host == host
        })
        .await
    }

    pub async fn find_http_test_id_by_uuid(&mut self, uuid: &str) -> Result<Option<Id>> {
        if uuid.is_empty() {
            return Ok(None);
        }
        self.find::<HttpTests>(|test| test.uuid == uuid).await
    }

    pub async fn find_http_test_id_by_name(&mut self, hostid: Id, name: &str) -> Result<Option<Id>> {
        self.find::<HttpTests>(|test| test.hostid == hostid && test.name == name)
            .await
    }

    pub async fn find_http_step_id_by_name(
        &mut self,
        hostid: Id,
        httptestid: Id,
        name: &str,
    ) -> Result<Option<Id>> {
        self.find::<HttpSteps>(|step| {
            step.hostid == hostid && step.httptestid == httptestid && step.name == name
        })
        .await
    }

    // interface references

    /// map an interface reference of `hostid` to its interface id.
    pub fn set_interface_ref(&mut self, hostid: Id, reference: impl Into<String>, interfaceid: Id) {
        self.interfaces
            .entry(hostid)
            .or_default()
            .insert(reference.into(), interfaceid);
    }

    pub fn find_interface_id_by_ref(&self, hostid: Id, reference: &str) -> Option<Id> {
        self.interfaces
            .get(&hostid)
            .and_then(|refs| refs.get(reference))
            .copied()
    }

    // rows created during the import

    pub fn remember_group(&mut self, groupid: Id, group: GroupRecord) {
        self.slots.groups.remember(groupid, group);
    }

    pub fn remember_template(&mut self, templateid: Id, template: TemplateRecord) {
        self.slots.templates.remember(templateid, template);
    }

    pub fn remember_host(&mut self, hostid: Id, host: HostRecord) {
        self.slots.hosts.remember(hostid, host);
    }

    pub fn remember_item(&mut self, itemid: Id, item: ItemRecord) {
        self.slots.items.remember(itemid, item);
    }

    pub fn remember_trigger(&mut self, triggerid: Id, trigger: TriggerRecord) {
        self.slots.triggers.remember(triggerid, trigger);
    }

    pub fn remember_image(&mut self, imageid: Id, image: NamedRecord) {
        self.slots.images.remember(imageid, image);
    }

    pub fn remember_map(&mut self, mapid: Id, map: NamedRecord) {
        self.slots.maps.remember(mapid, map);
    }

    pub fn remember_template_dashboard(
        &mut self,
        dashboardid: Id,
        dashboard: TemplateDashboardRecord,
    ) {
        self.slots.template_dashboards.remember(dashboardid, dashboard);
    }
}
