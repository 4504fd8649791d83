//! per-kind batch query adapters.
//!
//! each kind turns its pending registration set into one filtered query
//! (two for triggers and graphs) and decodes the rows into identity records.
//! host-scoped kinds read their owners from already loaded template/host
//! caches; `EntityKind::dependencies` guarantees those are loaded first.

use crate::resolver::{Resolver, Slots};
use crate::slot::Slot;
use anyhow::Result;
use async_trait::async_trait;
use importref_core::{
    decode_rows, flags, uuids, Condition, EntityKind, GraphRecord, GroupRecord,
    HostPrototypeRecord, HostPrototypeRefs, HostRecord, HostScopedNames, HostScopedRefs,
    HttpStepRecord, HttpStepRefs, HttpTestRecord, Id, ItemRecord, MacroRecord, NameSet,
    NamedRecord, NamedRefs, Pending, ProxyRecord, Query, TemplateDashboardRecord, TemplateRecord,
    TriggerRecord, TriggerRefs, ValuemapRecord,
};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// static description of one kind's cache slot.
pub(crate) trait KindSlot: Send + Sync + 'static {
    const KIND: EntityKind;
    type Pending: Pending;
    type Record: Clone + Send + Sync + DeserializeOwned + 'static;

    fn slot(slots: &Slots) -> &Slot<Self::Pending, Self::Record>;
    fn slot_mut(slots: &mut Slots) -> &mut Slot<Self::Pending, Self::Record>;
}

/// batch query strategy for one kind.
#[async_trait]
pub(crate) trait BatchLookup: KindSlot {
    async fn select(
        resolver: &Resolver<'_>,
        pending: &Self::Pending,
    ) -> Result<BTreeMap<Id, Self::Record>>;
}

macro_rules! kind_slot {
    ($marker:ident, $kind:ident, $field:ident, $pending:ty, $record:ty) => {
        pub(crate) struct $marker;

        impl KindSlot for $marker {
            const KIND: EntityKind = EntityKind::$kind;
            type Pending = $pending;
            type Record = $record;

            fn slot(slots: &Slots) -> &Slot<$pending, $record> {
                &slots.$field
            }

            fn slot_mut(slots: &mut Slots) -> &mut Slot<$pending, $record> {
                &mut slots.$field
            }
        }
    };
}

kind_slot!(Groups, Group, groups, NamedRefs, GroupRecord);
kind_slot!(Templates, Template, templates, NamedRefs, TemplateRecord);
kind_slot!(Hosts, Host, hosts, NameSet, HostRecord);
kind_slot!(Items, Item, items, HostScopedRefs, ItemRecord);
kind_slot!(Valuemaps, Valuemap, valuemaps, HostScopedNames, ValuemapRecord);
kind_slot!(Triggers, Trigger, triggers, TriggerRefs, TriggerRecord);
kind_slot!(Graphs, Graph, graphs, HostScopedRefs, GraphRecord);
kind_slot!(Iconmaps, Iconmap, iconmaps, NameSet, NamedRecord);
kind_slot!(Images, Image, images, NameSet, NamedRecord);
kind_slot!(Maps, Map, maps, NameSet, NamedRecord);
kind_slot!(
    TemplateDashboards,
    TemplateDashboard,
    template_dashboards,
    HostScopedNames,
    TemplateDashboardRecord
);
kind_slot!(Macros, Macro, macros, HostScopedNames, MacroRecord);
kind_slot!(Proxies, Proxy, proxies, NameSet, ProxyRecord);
kind_slot!(
    HostPrototypes,
    HostPrototype,
    host_prototypes,
    HostPrototypeRefs,
    HostPrototypeRecord
);
kind_slot!(HttpTests, HttpTest, http_tests, HostScopedRefs, HttpTestRecord);
kind_slot!(HttpSteps, HttpStep, http_steps, HttpStepRefs, HttpStepRecord);

/// run one query unless its filter can never match.
async fn fetch<R: DeserializeOwned>(
    resolver: &Resolver<'_>,
    kind: EntityKind,
    output: &[&str],
    filter: Condition,
) -> Result<BTreeMap<Id, R>> {
    let filter = filter.pruned();
    if filter.is_unsatisfiable() {
        trace!(%kind, "skipping query with empty filter");
        return Ok(BTreeMap::new());
    }
    let query = Query::new(kind, output, filter);
    let rows = resolver.store().select(&query).await?;
    Ok(decode_rows(kind, rows)?)
}

/// OR of one clause per owner; owners that do not resolve are dropped.
fn per_owner<'p, V>(
    kind: EntityKind,
    pending: &'p BTreeMap<String, V>,
    owner_id: impl Fn(&str) -> Option<Id>,
    clause: impl Fn(Id, &'p V) -> Condition,
) -> Condition {
    let mut branches = Vec::new();
    for (owner, entries) in pending {
        match owner_id(owner.as_str()) {
            Some(id) => branches.push(clause(id, entries)),
            None => trace!(%kind, %owner, "skipping unresolved owner"),
        }
    }
    Condition::any(branches)
}

fn by_uuid_or_name(name_field: &str, pending: &NamedRefs) -> Condition {
    Condition::any(vec![
        Condition::one_of("uuid", uuids(pending.values())),
        Condition::one_of(name_field, pending.keys().cloned()),
    ])
}

fn discovery_flags() -> Condition {
    Condition::one_of(
        "flags",
        [
            flags::DISCOVERY_NORMAL,
            flags::DISCOVERY_PROTOTYPE,
            flags::DISCOVERY_CREATED,
        ],
    )
}

#[async_trait]
impl BatchLookup for Groups {
    async fn select(
        resolver: &Resolver<'_>,
        pending: &NamedRefs,
    ) -> Result<BTreeMap<Id, GroupRecord>> {
        let filter = by_uuid_or_name("name", pending);
        fetch(resolver, Self::KIND, &["uuid", "name"], filter).await
    }
}

#[async_trait]
impl BatchLookup for Templates {
    async fn select(
        resolver: &Resolver<'_>,
        pending: &NamedRefs,
    ) -> Result<BTreeMap<Id, TemplateRecord>> {
        let filter = by_uuid_or_name("host", pending);
        fetch(resolver, Self::KIND, &["uuid", "host"], filter).await
    }
}

#[async_trait]
impl BatchLookup for Hosts {
    async fn select(resolver: &Resolver<'_>, pending: &NameSet) -> Result<BTreeMap<Id, HostRecord>> {
        let filter = Condition::one_of("host", pending.iter().cloned());
        fetch(resolver, Self::KIND, &["host"], filter).await
    }
}

#[async_trait]
impl BatchLookup for Items {
    async fn select(
        resolver: &Resolver<'_>,
        pending: &HostScopedRefs,
    ) -> Result<BTreeMap<Id, ItemRecord>> {
        let filter = per_owner(
            Self::KIND,
            pending,
            |host| resolver.loaded_template_or_host_id(host),
            |hostid, items| {
                Condition::all(vec![
                    Condition::eq("hostid", hostid),
                    Condition::any(vec![
                        Condition::one_of("key_", items.keys().cloned()),
                        Condition::one_of("uuid", uuids(items.values())),
                    ]),
                ])
            },
        );
        fetch(resolver, Self::KIND, &["hostid", "key_", "uuid"], filter).await
    }
}

#[async_trait]
impl BatchLookup for Valuemaps {
    async fn select(
        resolver: &Resolver<'_>,
        pending: &HostScopedNames,
    ) -> Result<BTreeMap<Id, ValuemapRecord>> {
        let filter = per_owner(
            Self::KIND,
            pending,
            |host| resolver.loaded_template_or_host_id(host),
            |hostid, names| {
                Condition::all(vec![
                    Condition::eq("hostid", hostid),
                    Condition::one_of("name", names.iter().cloned()),
                ])
            },
        );
        fetch(resolver, Self::KIND, &["hostid", "name"], filter).await
    }
}

#[async_trait]
impl BatchLookup for Triggers {
    async fn select(
        resolver: &Resolver<'_>,
        pending: &TriggerRefs,
    ) -> Result<BTreeMap<Id, TriggerRecord>> {
        const OUTPUT: &[&str] = &["uuid", "description", "expression", "recovery_expression"];

        let wanted_uuids = uuids(
            pending
                .values()
                .flat_map(|by_expression| by_expression.values())
                .flat_map(|by_recovery| by_recovery.values()),
        );

        let by_uuid: BTreeMap<Id, TriggerRecord> = fetch(
            resolver,
            Self::KIND,
            OUTPUT,
            Condition::all(vec![
                Condition::one_of("uuid", wanted_uuids.iter().cloned()),
                discovery_flags(),
            ]),
        )
        .await?;
        let mut candidates: BTreeMap<Id, TriggerRecord> = fetch(
            resolver,
            Self::KIND,
            OUTPUT,
            Condition::all(vec![
                Condition::one_of("description", pending.keys().cloned()),
                discovery_flags(),
            ]),
        )
        .await?;
        candidates.extend(by_uuid);

        if candidates.is_empty() {
            return Ok(candidates);
        }

        let mut resolved = resolver
            .expressions()
            .resolve_trigger_expressions(candidates)
            .await?;
        resolved.retain(|_, trigger| {
            (!trigger.uuid.is_empty() && wanted_uuids.contains(&trigger.uuid))
                || pending
                    .get(&trigger.description)
                    .and_then(|by_expression| by_expression.get(&trigger.expression))
                    .is_some_and(|by_recovery| by_recovery.contains_key(&trigger.recovery_expression))
        });
        Ok(resolved)
    }
}

#[async_trait]
impl BatchLookup for Graphs {
    async fn select(
        resolver: &Resolver<'_>,
        pending: &HostScopedRefs,
    ) -> Result<BTreeMap<Id, GraphRecord>> {
        const OUTPUT: &[&str] = &["uuid", "name", "hosts"];

        let names: BTreeSet<String> = pending
            .values()
            .flat_map(|graphs| graphs.keys().cloned())
            .collect();
        let wanted_uuids = uuids(pending.values().flat_map(|graphs| graphs.values()));

        let by_uuid: BTreeMap<Id, GraphRecord> = fetch(
            resolver,
            Self::KIND,
            OUTPUT,
            Condition::one_of("uuid", wanted_uuids),
        )
        .await?;
        let mut graphs: BTreeMap<Id, GraphRecord> =
            fetch(resolver, Self::KIND, OUTPUT, Condition::one_of("name", names)).await?;
        graphs.extend(by_uuid);
        Ok(graphs)
    }
}

#[async_trait]
impl BatchLookup for Iconmaps {
    async fn select(resolver: &Resolver<'_>, pending: &NameSet) -> Result<BTreeMap<Id, NamedRecord>> {
        let filter = Condition::one_of("name", pending.iter().cloned());
        fetch(resolver, Self::KIND, &["name"], filter).await
    }
}

#[async_trait]
impl BatchLookup for Images {
    async fn select(resolver: &Resolver<'_>, pending: &NameSet) -> Result<BTreeMap<Id, NamedRecord>> {
        let filter = Condition::one_of("name", pending.iter().cloned());
        fetch(resolver, Self::KIND, &["name"], filter).await
    }
}

#[async_trait]
impl BatchLookup for Maps {
    async fn select(resolver: &Resolver<'_>, pending: &NameSet) -> Result<BTreeMap<Id, NamedRecord>> {
        let filter = Condition::one_of("name", pending.iter().cloned());
        fetch(resolver, Self::KIND, &["name"], filter).await
    }
}

#[async_trait]
impl BatchLookup for TemplateDashboards {
    async fn select(
        resolver: &Resolver<'_>,
        pending: &HostScopedNames,
    ) -> Result<BTreeMap<Id, TemplateDashboardRecord>> {
        let filter = per_owner(
            Self::KIND,
            pending,
            |template| resolver.loaded_template_id(template),
            |templateid, names| {
                Condition::all(vec![
                    Condition::eq("templateid", templateid),
                    Condition::one_of("name", names.iter().cloned()),
                ])
            },
        );
        fetch(resolver, Self::KIND, &["templateid", "name"], filter).await
    }
}

#[async_trait]
impl BatchLookup for Macros {
    async fn select(
        resolver: &Resolver<'_>,
        pending: &HostScopedNames,
    ) -> Result<BTreeMap<Id, MacroRecord>> {
        let filter = per_owner(
            Self::KIND,
            pending,
            |host| resolver.loaded_template_or_host_id(host),
            |hostid, macros| {
                Condition::all(vec![
                    Condition::eq("hostid", hostid),
                    Condition::one_of("macro", macros.iter().cloned()),
                ])
            },
        );
        fetch(resolver, Self::KIND, &["hostid", "macro"], filter).await
    }
}

#[async_trait]
impl BatchLookup for Proxies {
    async fn select(resolver: &Resolver<'_>, pending: &NameSet) -> Result<BTreeMap<Id, ProxyRecord>> {
        let filter = Condition::one_of("host", pending.iter().cloned());
        fetch(resolver, Self::KIND, &["host"], filter).await
    }
}

#[async_trait]
impl BatchLookup for HostPrototypes {
    async fn select(
        resolver: &Resolver<'_>,
        pending: &HostPrototypeRefs,
    ) -> Result<BTreeMap<Id, HostPrototypeRecord>> {
        let kind = Self::KIND;
        let mut branches = Vec::new();
        for (host, rules) in pending {
            let Some(hostid) = resolver.loaded_template_or_host_id(host) else {
                trace!(%kind, owner = %host, "skipping unresolved owner");
                continue;
            };

            for (rule_key, prototypes) in rules {
                let Some(first) = prototypes.first() else {
                    continue;
                };

                // a uuid-bearing group is matched by uuid under the rule its
                // first entry names; otherwise by host name under the rule key
                let clause = if !first.uuid.is_empty() && !first.discovery_rule_uuid.is_empty() {
                    resolver
                        .loaded_item_id_by_uuid(&first.discovery_rule_uuid)
                        .map(|ruleid| {
                            Condition::all(vec![
                                Condition::eq("discovery_ruleid", ruleid),
                                Condition::one_of(
                                    "uuid",
                                    prototypes
                                        .iter()
                                        .filter(|prototype| !prototype.uuid.is_empty())
                                        .map(|prototype| prototype.uuid.clone()),
                                ),
                            ])
                        })
                } else {
                    resolver
                        .loaded_item_id_by_key(hostid, rule_key)
                        .map(|ruleid| {
                            Condition::all(vec![
                                Condition::eq("discovery_ruleid", ruleid),
                                Condition::one_of(
                                    "host",
                                    prototypes.iter().map(|prototype| prototype.host.clone()),
                                ),
                            ])
                        })
                };

                match clause {
                    Some(clause) => branches.push(clause),
                    None => {
                        trace!(%kind, owner = %host, rule = %rule_key, "skipping unresolved discovery rule")
                    }
                }
            }
        }

        fetch(
            resolver,
            kind,
            &["uuid", "host", "parent_hostid", "discovery_ruleid"],
            Condition::any(branches),
        )
        .await
    }
}

#[async_trait]
impl BatchLookup for HttpTests {
    async fn select(
        resolver: &Resolver<'_>,
        pending: &HostScopedRefs,
    ) -> Result<BTreeMap<Id, HttpTestRecord>> {
        let filter = per_owner(
            Self::KIND,
            pending,
            |host| resolver.loaded_template_or_host_id(host),
            |hostid, tests| {
                Condition::all(vec![
                    Condition::eq("hostid", hostid),
                    Condition::any(vec![
                        Condition::one_of("name", tests.keys().cloned()),
                        Condition::one_of("uuid", uuids(tests.values())),
                    ]),
                ])
            },
        );
        fetch(resolver, Self::KIND, &["uuid", "name", "hostid"], filter).await
    }
}

#[async_trait]
impl BatchLookup for HttpSteps {
    async fn select(
        resolver: &Resolver<'_>,
        pending: &HttpStepRefs,
    ) -> Result<BTreeMap<Id, HttpStepRecord>> {
        let filter = per_owner(
            Self::KIND,
            pending,
            |host| resolver.loaded_template_or_host_id(host),
            |hostid, tests| {
                Condition::all(vec![
                    Condition::eq("hostid", hostid),
                    Condition::one_of("name", tests.values().flatten().cloned()),
                ])
            },
        );
        fetch(resolver, Self::KIND, &["name", "hostid", "httptestid"], filter).await
    }
}
