use importref_core::{EntityKind, Registrations};
use importref_engine::Resolver;
use importref_store_memory::MemoryStore;
use serde_json::json;
use tempfile::tempdir;

const SNAPSHOT: &str = r#"tables:
  group:
    1: { uuid: "7df96b18c230490a9a0a9e2307226338", name: "Templates" }
    4: { uuid: "", name: "Linux servers" }
  template:
    10001: { uuid: "tpl-linux", host: "Linux by Zabbix agent" }
  host:
    10084: { host: "Zabbix server", status: 0 }
  item:
    23001: { hostid: 10001, key_: "agent.ping", uuid: "item-ping", flags: 0 }
    23002: { hostid: "10084", key_: "agent.ping", uuid: "", flags: 0 }
    23003: { hostid: 10001, key_: "vfs.fs.discovery", uuid: "rule-fs", flags: 1 }
  trigger:
    16001: { uuid: "trg-ping", description: "Agent unreachable", expression: "{900}=0", recovery_expression: "", flags: 0 }
    16002: { uuid: "", description: "Agent unreachable", expression: "{901}=0", recovery_expression: "", flags: 0 }
  graph:
    700: { uuid: "", name: "CPU load", hosts: ["10084"], flags: 0 }
  macro:
    50: { hostid: 10084, macro: "{$AGENT.TIMEOUT}" }
  host_prototype:
    10500: { uuid: "hp-fs", host: "{#FSNAME}", parent_hostid: 10001, discovery_ruleid: 23003 }
functions:
  900: "nodata(/Linux by Zabbix agent/agent.ping,3m)"
  901: "nodata(/Zabbix server/agent.ping,3m)"
"#;

fn registrations() -> Registrations {
    serde_json::from_value(json!({
        "group": {
            "Templates": { "uuid": "7df96b18c230490a9a0a9e2307226338" },
            "Linux servers": {}
        },
        "template": { "Linux by Zabbix agent": { "uuid": "tpl-linux" } },
        "host": ["Zabbix server", "New host"],
        "item": {
            "Linux by Zabbix agent": {
                "agent.ping": { "uuid": "item-ping" },
                "vfs.fs.discovery": { "uuid": "rule-fs" }
            },
            "Zabbix server": { "agent.ping": {} }
        },
        "trigger": {
            "Agent unreachable": {
                "nodata(/Zabbix server/agent.ping,3m)=0": { "": {} }
            }
        },
        "graph": { "Zabbix server": { "CPU load": {} } },
        "macro": { "Zabbix server": ["{$AGENT.TIMEOUT}"] },
        "host_prototype": {
            "Linux by Zabbix agent": {
                "vfs.fs.discovery": [
                    { "host": "{#FSNAME}", "uuid": "hp-fs", "discovery_rule_uuid": "rule-fs" }
                ]
            }
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn import_pipeline_resolves_against_snapshot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.yaml");
    std::fs::write(&path, SNAPSHOT).unwrap();
    let store = MemoryStore::load(&path).unwrap();

    let mut resolver = Resolver::with_backend(&store);
    resolver.register_all(registrations());

    assert_eq!(
        resolver
            .find_group_id_by_uuid("7df96b18c230490a9a0a9e2307226338")
            .await
            .unwrap(),
        Some(1)
    );
    assert_eq!(
        resolver.find_group_id_by_name("Linux servers").await.unwrap(),
        Some(4)
    );

    let server = resolver
        .find_template_or_host_id_by_host("Zabbix server")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(server, 10084);
    assert_eq!(
        resolver.find_item_id_by_key(server, "agent.ping").await.unwrap(),
        Some(23002)
    );
    assert_eq!(resolver.find_item_id_by_uuid("item-ping").await.unwrap(), Some(23001));
    assert_eq!(
        resolver
            .find_trigger_id_by_name("Agent unreachable", "nodata(/Zabbix server/agent.ping,3m)=0", "")
            .await
            .unwrap(),
        Some(16002)
    );
    assert_eq!(resolver.find_graph_id_by_name(server, "CPU load").await.unwrap(), Some(700));
    assert_eq!(
        resolver.find_macro_id(server, "{$AGENT.TIMEOUT}").await.unwrap(),
        Some(50)
    );
    assert_eq!(
        resolver.find_host_prototype_id_by_uuid("hp-fs").await.unwrap(),
        Some(10500)
    );

    for kind in [
        EntityKind::Group,
        EntityKind::Template,
        EntityKind::Host,
        EntityKind::Item,
        EntityKind::Trigger,
        EntityKind::Graph,
        EntityKind::Macro,
        EntityKind::HostPrototype,
    ] {
        // no registered trigger or graph carries a uuid, so only the name query runs
        assert_eq!(store.query_count(kind).unwrap(), 1, "{kind}");
    }
}

#[tokio::test]
async fn refresh_after_write_sees_created_host() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snapshot.yaml");
    std::fs::write(&path, SNAPSHOT).unwrap();
    let store = MemoryStore::load(&path).unwrap();

    let mut resolver = Resolver::with_backend(&store);
    resolver.register_all(registrations());

    assert_eq!(resolver.find_host_id_by_host("New host").await.unwrap(), None);

    let row = json!({ "host": "New host", "status": 0 });
    store
        .insert(EntityKind::Host, 10100, row.as_object().unwrap().clone())
        .unwrap();
    assert_eq!(resolver.find_host_id_by_host("New host").await.unwrap(), None);

    resolver.refresh(EntityKind::Host);
    assert_eq!(
        resolver.find_host_id_by_host("New host").await.unwrap(),
        Some(10100)
    );
    assert_eq!(store.query_count(EntityKind::Host).unwrap(), 2);
}
