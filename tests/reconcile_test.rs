//! Integration tests for the consistency reconciler
//!
//! Covers the node-deletion cascade, the dangling-host sweep, the async
//! node-event consumer and catalog reconciliation.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{create_node_catalog, create_test_reconcilers, create_test_registries, hosted_site, raw_site};
use sitegrid::config::SiteDefaults;
use sitegrid::error::Error;
use sitegrid::models::{ContentType, NewSite, NodeCategory, NodeOption, SitePatch, Status, Tag};
use sitegrid::scheduler::{parse_host_list, NodeEvent, NodeEventBus};
use sitegrid::site::{load_catalog, tags, Reconciler, SiteDefinition, SiteRegistry};
use sitegrid::storage::{create_sqlite_repository, MockSiteRepository};

fn shipped_catalog() -> Vec<SiteDefinition> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("sites.toml");
    load_catalog(path).unwrap()
}

// ============================================================================
// Node Deletion Cascade
// ============================================================================

#[test]
fn test_deleted_node_absent_everywhere() {
    for reconciler in create_test_reconcilers() {
        let registry = reconciler.registry().clone();
        registry.create(hosted_site("a", vec![1, 7])).unwrap();
        registry.create(hosted_site("b", vec![7])).unwrap();
        registry.create(hosted_site("c", vec![2])).unwrap();
        registry
            .create(NewSite::new("d", "D", "https://d.example.com"))
            .unwrap();

        let report = reconciler.on_node_deleted(7).unwrap();
        assert_eq!(report.scanned, 4);
        assert_eq!(report.updated.len(), 2);

        for site in registry.all().unwrap() {
            assert!(!parse_host_list(&site.node_hosts).unwrap().contains(&7));
        }

        let before = registry.all().unwrap();
        let again = reconciler.on_node_deleted(7).unwrap();
        assert!(again.updated.is_empty());
        assert_eq!(registry.all().unwrap(), before);
    }
}

#[test]
fn test_cascade_ignores_routing_mode() {
    for reconciler in create_test_reconcilers() {
        let registry = reconciler.registry().clone();
        let id = registry.create(hosted_site("a", vec![4, 8])).unwrap();

        // Switching back to category routing keeps the stored list around
        registry
            .update(
                id,
                SitePatch {
                    node_option: Some(NodeOption::ByCategory),
                    ..Default::default()
                },
            )
            .unwrap();

        reconciler.on_node_deleted(8).unwrap();
        assert_eq!(registry.get(id).unwrap().node_hosts, "[4]");
    }
}

#[test]
fn test_cascade_reports_corrupt_sites() {
    let mock = Arc::new(MockSiteRepository::new());
    mock.insert_raw(raw_site(1, "broken", "", "[3,"));
    let registry = Arc::new(SiteRegistry::new(mock));
    let ok = registry.create(hosted_site("fine", vec![3])).unwrap();

    let reconciler = Reconciler::new(registry.clone(), create_node_catalog(), SiteDefaults::default());
    let report = reconciler.on_node_deleted(3).unwrap();

    assert_eq!(report.skipped, vec![1]);
    assert_eq!(report.updated, vec![ok]);
    assert_eq!(registry.get(ok).unwrap().node_hosts, "[]");
}

#[test]
fn test_cascade_survives_unknown_status_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sites.db");

    let (bad, good) = {
        let registry = SiteRegistry::new(create_sqlite_repository(&path).unwrap());
        (
            registry.create(hosted_site("bad", vec![3, 5])).unwrap(),
            registry.create(hosted_site("good", vec![3, 5])).unwrap(),
        )
    };

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "UPDATE site SET enable = 7 WHERE id = ?1",
        rusqlite::params![bad],
    )
    .unwrap();
    drop(conn);

    let registry = Arc::new(SiteRegistry::new(create_sqlite_repository(&path).unwrap()));
    let reconciler = Reconciler::new(registry.clone(), create_node_catalog(), SiteDefaults::default());

    let report = reconciler.on_node_deleted(3).unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.updated, vec![good]);
    assert_eq!(registry.get(good).unwrap().node_hosts, "[5]");

    assert!(matches!(registry.get(bad), Err(Error::Persistence { .. })));
}

#[test]
fn test_sweep_removes_unknown_ids() {
    for reconciler in create_test_reconcilers() {
        let registry = reconciler.registry().clone();
        let a = registry.create(hosted_site("a", vec![3, 4, 5])).unwrap();
        let b = registry.create(hosted_site("b", vec![9])).unwrap();

        let report = reconciler.sweep_dangling().unwrap();
        assert_eq!(report.updated, vec![a]);
        assert_eq!(registry.get(a).unwrap().node_hosts, "[3,5]");
        assert_eq!(registry.get(b).unwrap().node_hosts, "[9]");
    }
}

// ============================================================================
// Node Event Consumer
// ============================================================================

#[tokio::test]
async fn test_event_consumer_runs_until_channel_closes() {
    let reconciler = create_test_reconcilers().remove(0);
    let registry = reconciler.registry().clone();
    let a = registry.create(hosted_site("a", vec![3, 5, 9])).unwrap();

    let bus = NodeEventBus::new(16);
    let events = bus.subscribe();

    let reconciler = Arc::new(reconciler);
    let watcher = tokio::spawn({
        let reconciler = reconciler.clone();
        async move { reconciler.run(events, std::future::pending::<()>()).await }
    });

    assert_eq!(bus.publish(NodeEvent::deleted(5)), 1);
    assert_eq!(bus.publish(NodeEvent::deleted(9)), 1);
    drop(bus);

    let summary = watcher.await.unwrap();
    assert_eq!(summary.events, 2);
    assert_eq!(summary.sweeps, 0);
    assert_eq!(summary.failures, 0);
    assert_eq!(registry.get(a).unwrap().node_hosts, "[3]");
}

#[tokio::test]
async fn test_event_consumer_sweeps_after_lag() {
    let reconciler = create_test_reconcilers().remove(1);
    let registry = reconciler.registry().clone();
    let a = registry.create(hosted_site("a", vec![3, 7, 11])).unwrap();

    let bus = NodeEventBus::new(1);
    let events = bus.subscribe();

    // Capacity 1: the first two events are overwritten before anyone reads
    bus.publish(NodeEvent::deleted(7));
    bus.publish(NodeEvent::deleted(11));
    bus.publish(NodeEvent::deleted(100));
    drop(bus);

    let summary = reconciler.run(events, std::future::pending::<()>()).await;
    assert_eq!(summary.sweeps, 1);
    assert_eq!(summary.events, 1);
    assert_eq!(summary.failures, 0);
    assert_eq!(registry.get(a).unwrap().node_hosts, "[3]");
}

#[tokio::test]
async fn test_event_consumer_counts_failures() {
    let mock = Arc::new(MockSiteRepository::new());
    let registry = Arc::new(SiteRegistry::new(mock.clone()));
    registry.create(hosted_site("a", vec![3, 4])).unwrap();
    mock.fail_updates_after(0);

    let reconciler = Reconciler::new(registry.clone(), create_node_catalog(), SiteDefaults::default());
    let bus = NodeEventBus::new(4);
    let events = bus.subscribe();
    bus.publish(NodeEvent::deleted(4));
    drop(bus);

    let summary = reconciler.run(events, std::future::pending::<()>()).await;
    assert_eq!(summary.events, 1);
    assert_eq!(summary.failures, 1);
}

#[tokio::test]
async fn test_event_consumer_stops_on_shutdown() {
    let reconciler = create_test_reconcilers().remove(1);
    let bus = NodeEventBus::new(4);
    let events = bus.subscribe();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    stop_tx.send(()).unwrap();

    let summary = reconciler
        .run(events, async {
            let _ = stop_rx.await;
        })
        .await;
    assert_eq!(summary.events, 0);

    // The bus is still open; the consumer returned because of shutdown
    assert_eq!(bus.publish(NodeEvent::deleted(1)), 0);
}

// ============================================================================
// Catalog Reconciliation
// ============================================================================

#[test]
fn test_shipped_catalog_loads() {
    let defs = shipped_catalog();
    let keys: Vec<&str> = defs.iter().map(|d| d.key.as_str()).collect();
    assert_eq!(keys, vec!["v2ex", "ct", "zhihu", "weibo", "hacker"]);
    assert_eq!(defs[2].content_type, ContentType::Api);
}

#[test]
fn test_catalog_new_weibo_gets_defaults() {
    for reconciler in create_test_reconcilers() {
        let report = reconciler.reconcile_from_catalog(&shipped_catalog()).unwrap();
        assert_eq!(report.created.len(), 5);
        assert!(report.updated.is_empty());

        let weibo = reconciler.registry().find_by_key("weibo").unwrap().unwrap();
        assert_eq!(weibo.cron, "*/30 * * * *");
        assert_eq!(weibo.node_option, NodeOption::ByCategory);
        assert_eq!(weibo.node_type, NodeCategory::DOMESTIC);
        assert_eq!(weibo.enable, Status::Disabled);
        assert_eq!(weibo.desc, "Weibo hot search");
    }
}

#[test]
fn test_catalog_existing_weibo_keeps_cron() {
    for reconciler in create_test_reconcilers() {
        let registry = reconciler.registry().clone();
        let id = registry
            .create(
                NewSite::new("weibo", "Sina Weibo", "https://weibo.com/hot")
                    .with_cron("0 * * * *")
                    .with_enable(Status::Enabled)
                    .by_hosts(vec![3]),
            )
            .unwrap();

        let report = reconciler.reconcile_from_catalog(&shipped_catalog()).unwrap();
        assert_eq!(report.updated, vec![id]);
        assert_eq!(report.created.len(), 4);

        let weibo = registry.get(id).unwrap();
        assert_eq!(weibo.name, "Weibo");
        assert_eq!(weibo.root, "https://s.weibo.com/top/summary");
        assert_eq!(weibo.cron, "0 * * * *");
        assert_eq!(weibo.enable, Status::Enabled);
        assert_eq!(weibo.node_option, NodeOption::ByExplicitHosts);
        assert_eq!(weibo.node_hosts, "[3]");
        assert_eq!(
            tags::parse(&weibo.tags).unwrap(),
            vec![Tag::new("realtime", "Realtime"), Tag::new("socialevent", "Social")]
        );
    }
}

#[test]
fn test_catalog_reconcile_is_idempotent() {
    for reconciler in create_test_reconcilers() {
        reconciler.reconcile_from_catalog(&shipped_catalog()).unwrap();
        let before = reconciler.registry().all().unwrap();

        let second = reconciler.reconcile_from_catalog(&shipped_catalog()).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.updated.len(), 5);
        assert_eq!(reconciler.registry().all().unwrap(), before);
    }
}

#[test]
fn test_catalog_defaults_are_configurable() {
    for registry in create_test_registries() {
        let defaults = SiteDefaults {
            cron: "*/5 * * * *".to_string(),
            node_type: NodeCategory(2),
            enabled: true,
            ..Default::default()
        };
        let reconciler = Reconciler::new(registry.clone(), create_node_catalog(), defaults);
        reconciler.reconcile_from_catalog(&shipped_catalog()).unwrap();

        let site = registry.find_by_key("zhihu").unwrap().unwrap();
        assert_eq!(site.cron, "*/5 * * * *");
        assert_eq!(site.node_type, NodeCategory(2));
        assert_eq!(site.enable, Status::Enabled);
        assert_eq!(site.content_type, ContentType::Api);
    }
}

#[test]
fn test_catalog_root_conflict_is_fatal() {
    for reconciler in create_test_reconcilers() {
        reconciler
            .registry()
            .create(NewSite::new("legacy-v2ex", "V2EX", "https://www.v2ex.com"))
            .unwrap();

        let err = reconciler
            .reconcile_from_catalog(&shipped_catalog())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKeyOrRoot { .. }));

        // v2ex is first in the catalog, so nothing after it was applied
        assert_eq!(reconciler.registry().all().unwrap().len(), 1);
    }
}
