//! command definitions and dispatch for importref.

mod document;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use document::{load_document, Lookup, LookupResult, ReferenceDocument};
use importref_core::{resolution_order, EntityKind, Id};
use importref_engine::Resolver;
use importref_store_memory::MemoryStore;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// top-level cli definition.
#[derive(Parser)]
#[command(name = "importref")]
#[command(about = "Resolve import references against a configuration snapshot")]
pub(crate) struct Cli {
    /// increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub(crate) verbose: u8,
    #[command(subcommand)]
    command: Command,
}

/// cli subcommands.
#[derive(Subcommand)]
enum Command {
    /// register a document's references and run its lookups.
    Resolve {
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[arg(short = 'd', long)]
        document: PathBuf,
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// print the load order for kinds, dependencies first.
    Order {
        #[arg(required = true)]
        kinds: Vec<EntityKind>,
    },
}

pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Resolve {
            snapshot,
            document,
            output,
        } => {
            let snapshot = snapshot_path(snapshot)?;
            let store = MemoryStore::load(&snapshot)?;
            let document = load_document(&document)?;
            let results = resolve_document(&store, document).await?;
            info!(
                lookups = results.len(),
                queries = store.queries()?.len(),
                "resolved import references"
            );

            let raw = serde_json::to_string_pretty(&results)?;
            match output {
                Some(path) => {
                    write_results(&path, &raw)?;
                    println!("results written to {}", path.display());
                }
                None => println!("{raw}"),
            }
        }
        Command::Order { kinds } => {
            for kind in resolution_order(&kinds) {
                println!("{kind}");
            }
        }
    }

    Ok(())
}

/// resolve the snapshot path from the flag or environment.
fn snapshot_path(snapshot: Option<PathBuf>) -> Result<PathBuf> {
    snapshot
        .or_else(|| std::env::var_os("IMPORTREF_SNAPSHOT").map(PathBuf::from))
        .ok_or_else(|| anyhow!("missing --snapshot or IMPORTREF_SNAPSHOT"))
}

fn write_results(path: &Path, raw: &str) -> Result<()> {
    fs::write(path, raw).with_context(|| format!("write results: {}", path.display()))
}

/// register everything the document names, then run its lookups in order.
async fn resolve_document(
    store: &MemoryStore,
    document: ReferenceDocument,
) -> Result<Vec<LookupResult>> {
    let mut resolver = Resolver::with_backend(store);
    resolver.register_all(document.register);
    for interface in document.interfaces {
        resolver.set_interface_ref(interface.hostid, interface.reference, interface.interfaceid);
    }
    if !document.prime.is_empty() {
        resolver.prime(&document.prime).await?;
    }

    let mut results = Vec::with_capacity(document.lookups.len());
    for entry in document.lookups {
        if entry.refresh_before {
            if let Some(kind) = entry.lookup.kind() {
                resolver.refresh(kind);
            }
        }
        let result = run_lookup(&mut resolver, &entry.lookup).await?;
        results.push(LookupResult {
            lookup: entry.lookup,
            result,
        });
    }
    Ok(results)
}

fn id(found: Option<Id>) -> Value {
    json!(found)
}

async fn run_lookup(resolver: &mut Resolver<'_>, lookup: &Lookup) -> Result<Value> {
    let value = match lookup {
        Lookup::GroupIdByUuid { uuid } => id(resolver.find_group_id_by_uuid(uuid).await?),
        Lookup::GroupIdByName { name } => id(resolver.find_group_id_by_name(name).await?),
        Lookup::TemplateIdByUuid { uuid } => id(resolver.find_template_id_by_uuid(uuid).await?),
        Lookup::TemplateIdByHost { host } => id(resolver.find_template_id_by_host(host).await?),
        Lookup::HostIdByHost { host } => id(resolver.find_host_id_by_host(host).await?),
        Lookup::TemplateOrHostIdByHost { host } => {
            id(resolver.find_template_or_host_id_by_host(host).await?)
        }
        Lookup::InterfaceIdByRef { hostid, reference } => {
            id(resolver.find_interface_id_by_ref(*hostid, reference))
        }
        Lookup::ItemIdByUuid { uuid } => id(resolver.find_item_id_by_uuid(uuid).await?),
        Lookup::ItemIdByKey { hostid, key } => {
            id(resolver.find_item_id_by_key(*hostid, key).await?)
        }
        Lookup::ValuemapIdByName { hostid, name } => {
            id(resolver.find_valuemap_id_by_name(*hostid, name).await?)
        }
        Lookup::TriggerById { triggerid } => {
            serde_json::to_value(resolver.find_trigger_by_id(*triggerid).await?)?
        }
        Lookup::TriggerIdByUuid { uuid } => id(resolver.find_trigger_id_by_uuid(uuid).await?),
        Lookup::TriggerIdByName {
            description,
            expression,
            recovery_expression,
        } => id(resolver
            .find_trigger_id_by_name(description, expression, recovery_expression)
            .await?),
        Lookup::GraphIdByUuid { uuid } => id(resolver.find_graph_id_by_uuid(uuid).await?),
        Lookup::GraphIdByName { hostid, name } => {
            id(resolver.find_graph_id_by_name(*hostid, name).await?)
        }
        Lookup::IconmapIdByName { name } => id(resolver.find_iconmap_id_by_name(name).await?),
        Lookup::ImageIdByName { name } => id(resolver.find_image_id_by_name(name).await?),
        Lookup::MapIdByName { name } => id(resolver.find_map_id_by_name(name).await?),
        Lookup::TemplateDashboardId { templateid, name } => {
            id(resolver.find_template_dashboard_id(*templateid, name).await?)
        }
        Lookup::MacroId { hostid, name } => id(resolver.find_macro_id(*hostid, name).await?),
        Lookup::ProxyIdByHost { host } => id(resolver.find_proxy_id_by_host(host).await?),
        Lookup::HostPrototypeIdByUuid { uuid } => {
            id(resolver.find_host_prototype_id_by_uuid(uuid).await?)
        }
        Lookup::HostPrototypeIdByHost {
            parent_hostid,
            discovery_ruleid,
            host,
        } => id(resolver
            .find_host_prototype_id_by_host(*parent_hostid, *discovery_ruleid, host)
            .await?),
        Lookup::HttpTestIdByUuid { uuid } => id(resolver.find_http_test_id_by_uuid(uuid).await?),
        Lookup::HttpTestIdByName { hostid, name } => {
            id(resolver.find_http_test_id_by_name(*hostid, name).await?)
        }
        Lookup::HttpStepIdByName {
            hostid,
            httptestid,
            name,
        } => id(resolver
            .find_http_step_id_by_name(*hostid, *httptestid, name)
            .await?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use importref_core::Registrations;
    use std::sync::{Mutex, OnceLock};
    use tempfile::tempdir;

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    const SNAPSHOT: &str = r#"tables:
  host:
    10084: { host: "Zabbix server" }
  item:
    23002: { hostid: 10084, key_: "agent.ping", uuid: "" }
  trigger:
    16002: { uuid: "trg", description: "Agent unreachable", expression: "{901}=0", flags: 0 }
functions:
  901: "nodata(/Zabbix server/agent.ping,3m)"
"#;

    fn store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.yaml");
        fs::write(&path, SNAPSHOT).unwrap();
        let store = MemoryStore::load(&path).unwrap();
        (dir, store)
    }

    #[test]
    fn snapshot_path_prefers_flag() {
        let path = snapshot_path(Some(PathBuf::from("/tmp/flag.yaml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/flag.yaml"));
    }

    #[test]
    fn snapshot_path_from_env() {
        let _guard = env_lock().lock().unwrap();
        let old = std::env::var_os("IMPORTREF_SNAPSHOT");
        std::env::set_var("IMPORTREF_SNAPSHOT", "/tmp/env.yaml");

        let result = std::panic::catch_unwind(|| {
            assert_eq!(snapshot_path(None).unwrap(), PathBuf::from("/tmp/env.yaml"));
        });

        std::env::remove_var("IMPORTREF_SNAPSHOT");
        let missing = snapshot_path(None);

        if let Some(value) = old {
            std::env::set_var("IMPORTREF_SNAPSHOT", value);
        }

        assert!(result.is_ok());
        assert!(missing.is_err());
    }

    #[test]
    fn document_parses_lookups_with_refresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("document.yaml");
        fs::write(
            &path,
            r#"register:
  host: ["Zabbix server"]
interfaces:
  - { hostid: 10084, ref: "if1", interfaceid: 1 }
lookups:
  - lookup: item_id_by_key
    hostid: 10084
    key: agent.ping
  - lookup: macro_id
    hostid: 10084
    macro: "{$TIMEOUT}"
    refresh_before: true
"#,
        )
        .unwrap();

        let document = load_document(&path).unwrap();
        assert_eq!(document.interfaces[0].reference, "if1");
        assert_eq!(document.lookups.len(), 2);
        assert_eq!(
            document.lookups[0].lookup,
            Lookup::ItemIdByKey {
                hostid: 10084,
                key: "agent.ping".to_string(),
            }
        );
        assert!(!document.lookups[0].refresh_before);
        assert_eq!(document.lookups[1].lookup.kind(), Some(EntityKind::Macro));
        assert!(document.lookups[1].refresh_before);
    }

    #[tokio::test]
    async fn resolve_document_runs_lookups_in_order() {
        let (_dir, store) = store();
        let document = ReferenceDocument {
            register: serde_json::from_value::<Registrations>(json!({
                "host": ["Zabbix server"],
                "item": { "Zabbix server": { "agent.ping": {} } },
                "trigger": {
                    "Agent unreachable": {
                        "nodata(/Zabbix server/agent.ping,3m)=0": { "": {} }
                    }
                }
            }))
            .unwrap(),
            interfaces: Vec::new(),
            prime: vec![EntityKind::Item],
            lookups: serde_json::from_value(json!([
                { "lookup": "host_id_by_host", "host": "Zabbix server" },
                { "lookup": "item_id_by_key", "hostid": 10084, "key": "agent.ping" },
                { "lookup": "item_id_by_key", "hostid": 10084, "key": "missing" },
                { "lookup": "trigger_by_id", "triggerid": 16002 },
                { "lookup": "host_id_by_host", "host": "Zabbix server", "refresh_before": true }
            ]))
            .unwrap(),
        };

        let results = resolve_document(&store, document).await.unwrap();
        let values: Vec<&Value> = results.iter().map(|entry| &entry.result).collect();
        assert_eq!(values[0], &json!(10084));
        assert_eq!(values[1], &json!(23002));
        assert_eq!(values[2], &Value::Null);
        assert_eq!(
            values[3]["expression"],
            json!("nodata(/Zabbix server/agent.ping,3m)=0")
        );
        assert_eq!(values[4], &json!(10084));

        assert_eq!(store.query_count(EntityKind::Host).unwrap(), 2);
        assert_eq!(store.query_count(EntityKind::Item).unwrap(), 1);
    }

    #[test]
    fn results_serialize_with_lookup_fields() {
        let result = LookupResult {
            lookup: Lookup::GraphIdByName {
                hostid: 1,
                name: "CPU".to_string(),
            },
            result: Value::Null,
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "lookup": "graph_id_by_name", "hostid": 1, "name": "CPU", "result": null })
        );
    }
}
