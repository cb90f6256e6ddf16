//! Snapshot exporter
//!
//! Turns stored records into their wire shape. Unlike the routing path, a
//! corrupt stored list is never masked here: the whole export fails.

use crate::error::{Error, Result};
use crate::models::{Site, SiteSnapshot, SiteTab, TabTag};
use crate::scheduler::assignment::parse_host_list;

use super::tags;

/// Export one site
pub fn export(site: &Site) -> Result<SiteSnapshot> {
    let tags = tags::parse(&site.tags).map_err(|e| Error::export(site.id, e))?;
    let node_hosts = parse_host_list(&site.node_hosts).map_err(|e| Error::export(site.id, e))?;

    Ok(SiteSnapshot {
        id: site.id,
        name: site.name.clone(),
        key: site.key.clone(),
        root: site.root.clone(),
        desc: site.desc.clone(),
        tags,
        content_type: site.content_type,
        cron: site.cron.clone(),
        node_option: site.node_option,
        node_type: site.node_type,
        node_hosts,
        enable: site.enable,
    })
}

/// Export every site, failing on the first corrupt record
pub fn export_all(sites: &[Site]) -> Result<Vec<SiteSnapshot>> {
    sites.iter().map(export).collect()
}

/// Front-end tab configuration: enabled sites with their enabled tags
pub fn site_tabs(sites: &[Site]) -> Result<Vec<SiteTab>> {
    let mut tabs = Vec::new();

    for site in sites.iter().filter(|s| s.enable.is_enabled()) {
        let tags = tags::parse(&site.tags).map_err(|e| Error::export(site.id, e))?;

        tabs.push(SiteTab {
            name: site.name.clone(),
            key: site.key.clone(),
            tags: tags
                .into_iter()
                .filter(|t| t.enable.is_enabled())
                .map(|t| TabTag {
                    name: t.name,
                    key: t.key,
                })
                .collect(),
        });
    }

    Ok(tabs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, NodeCategory, NodeOption, Status};

    fn stored(id: i64, key: &str) -> Site {
        Site {
            id,
            name: key.to_uppercase(),
            key: key.to_string(),
            root: format!("https://{key}.example.com"),
            desc: String::new(),
            content_type: ContentType::Api,
            tags: String::new(),
            cron: "*/30 * * * *".to_string(),
            enable: Status::Enabled,
            node_option: NodeOption::ByExplicitHosts,
            node_type: NodeCategory::DOMESTIC,
            node_hosts: String::new(),
        }
    }

    #[test]
    fn test_export_empty_lists() {
        let snapshot = export(&stored(1, "v2ex")).unwrap();
        assert!(snapshot.tags.is_empty());
        assert!(snapshot.node_hosts.is_empty());
    }

    #[test]
    fn test_export_wire_shape() {
        let mut site = stored(4, "v2ex");
        site.tags = r#"[{"key":"hot","name":"Hot","enable":1}]"#.to_string();
        site.node_hosts = "[3,9]".to_string();

        let json = serde_json::to_value(export(&site).unwrap()).unwrap();
        assert_eq!(json["type"], 2);
        assert_eq!(json["node_option"], 2);
        assert_eq!(json["node_type"], 1);
        assert_eq!(json["node_hosts"], serde_json::json!([3, 9]));
        assert_eq!(json["tags"][0]["enable"], 1);
        assert_eq!(json["enable"], 1);
    }

    #[test]
    fn test_export_corrupt_hosts() {
        let mut site = stored(7, "weibo");
        site.node_hosts = "not-json".to_string();

        let err = export(&site).unwrap_err();
        match err {
            Error::Export { site_id, source } => {
                assert_eq!(site_id, 7);
                assert!(matches!(*source, Error::HostListCorrupt { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_export_all_fails_fast() {
        let mut bad = stored(2, "zhihu");
        bad.tags = "{".to_string();
        let sites = vec![stored(1, "v2ex"), bad];

        assert!(matches!(
            export_all(&sites),
            Err(Error::Export { site_id: 2, .. })
        ));
        assert_eq!(export_all(&sites[..1]).unwrap().len(), 1);
    }

    #[test]
    fn test_site_tabs_filters_disabled() {
        let mut a = stored(1, "v2ex");
        a.tags = r#"[{"key":"hot","name":"Hot","enable":1},{"key":"old","name":"Old","enable":0}]"#
            .to_string();
        let mut b = stored(2, "zhihu");
        b.enable = Status::Disabled;

        let tabs = site_tabs(&[a, b]).unwrap();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].key, "v2ex");
        assert_eq!(
            tabs[0].tags,
            vec![TabTag {
                name: "Hot".to_string(),
                key: "hot".to_string()
            }]
        );
    }
}
