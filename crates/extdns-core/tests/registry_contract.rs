//! Contract Test: TXT Ownership Registry
//!
//! The TXT registry keeps its ledger in companion records next to the data
//! records it manages.
//!
//! Constraints verified:
//! - Companions are written with creates and removed with deletes
//! - Companions never leak into `records()`
//! - Only records vouched for by our owner id are labeled
//! - Other values sharing a companion record set are never touched
//! - Name collisions withhold the create and report an ownership conflict
//! - Legacy-only ownership is migrated to the current format
//! - The listing cache is patched on success and dropped on failure

mod common;

use common::*;
use extdns_core::registry::{NoopRegistry, Registry, TxtRegistryOptions};
use extdns_core::{Changes, Endpoint, Error, OwnershipMode, Plan, RecordType};
use std::sync::Arc;
use std::time::Duration;

fn create(endpoints: Vec<Endpoint>) -> Changes {
    Changes {
        create: endpoints,
        ..Default::default()
    }
}

#[tokio::test]
async fn create_writes_companions_and_records_reads_them_back() {
    let provider = CountingProvider::new(&["example.com"]);
    let registry = txt_registry(&provider, TxtRegistryOptions::default());
    registry.records().await.unwrap();

    registry
        .apply_changes(&create(vec![from_resource(
            a("foo.example.com", "1.2.3.4"),
            "service/default/foo",
        )]))
        .await
        .unwrap();

    let content = "\"heritage=external-dns,external-dns/owner=default,external-dns/resource=service/default/foo\"";
    assert_eq!(
        provider.dump().await,
        vec![
            format!("a-foo.example.com/TXT={content}"),
            "foo.example.com/A=1.2.3.4".to_string(),
            format!("foo.example.com/TXT={content}"),
        ]
    );

    let records = registry.records().await.unwrap();
    assert_eq!(records.len(), 1, "companions must not be returned");
    assert_eq!(records[0].owner(), Some("default"));
    assert_eq!(records[0].resource(), Some("service/default/foo"));
}

#[tokio::test]
async fn labels_are_not_forwarded_to_the_provider() {
    let provider = CountingProvider::new(&["example.com"]);
    let registry = txt_registry(&provider, TxtRegistryOptions::default());
    registry.records().await.unwrap();

    registry
        .apply_changes(&create(vec![from_resource(a("foo.example.com", "1.2.3.4"), "svc/a")]))
        .await
        .unwrap();

    let batch = provider.last_batch().unwrap();
    assert_eq!(provider.apply_calls(), 1, "one provider call per apply");
    assert!(batch.create.iter().all(|ep| ep.labels.is_empty()));
}

#[tokio::test]
async fn new_format_only_writes_a_single_companion() {
    let provider = CountingProvider::new(&["example.com"]);
    let options = TxtRegistryOptions {
        new_format_only: true,
        prefix: "txt-".to_string(),
        ..Default::default()
    };
    let registry = txt_registry(&provider, options);
    registry.records().await.unwrap();

    registry
        .apply_changes(&create(vec![a("foo.example.com", "1.2.3.4")]))
        .await
        .unwrap();

    let dump = provider.dump().await;
    assert_eq!(dump.len(), 2);
    assert!(dump[1].starts_with("txt-a-foo.example.com/TXT="));
}

#[tokio::test]
async fn update_of_owned_record_leaves_companion_alone() {
    let provider = CountingProvider::new(&["example.com"]);
    provider
        .seed(vec![
            a("a.example.com", "1.2.3.4"),
            companion("a-a.example.com", "default", "svc/a"),
        ])
        .await;
    let registry = txt_registry(&provider, TxtRegistryOptions::default());

    let current = registry.records().await.unwrap();
    let desired = vec![from_resource(a("a.example.com", "5.6.7.8"), "svc/a")];
    let changes = Plan::new(registry.ownership()).compute(&current, &desired).changes;
    assert_eq!(changes.update_new.len(), 1);

    registry.apply_changes(&changes).await.unwrap();

    let batch = provider.last_batch().unwrap();
    assert_eq!(batch.update_old.len(), 1, "companion must stay unchanged");
    assert_eq!(batch.update_new[0].record_type, RecordType::A);
    assert!(batch.create.is_empty() && batch.delete.is_empty());
}

#[tokio::test]
async fn resource_change_rewrites_companion_content() {
    let provider = CountingProvider::new(&["example.com"]);
    provider
        .seed(vec![
            a("a.example.com", "1.2.3.4"),
            companion("a-a.example.com", "default", "svc/old"),
        ])
        .await;
    let registry = txt_registry(&provider, TxtRegistryOptions::default());

    let current = registry.records().await.unwrap();
    let desired = vec![from_resource(a("a.example.com", "5.6.7.8"), "svc/new")];
    let changes = Plan::new(registry.ownership()).compute(&current, &desired).changes;
    registry.apply_changes(&changes).await.unwrap();

    let records = registry.records().await.unwrap();
    assert_eq!(records[0].resource(), Some("svc/new"));
    assert_eq!(records[0].targets, vec!["5.6.7.8"]);
}

#[tokio::test]
async fn delete_removes_observed_companions() {
    let provider = CountingProvider::new(&["example.com"]);
    provider
        .seed(vec![
            a("a.example.com", "1.2.3.4"),
            companion("a-a.example.com", "default", "svc/a"),
            companion("a.example.com", "default", "svc/a"),
        ])
        .await;
    let registry = txt_registry(&provider, TxtRegistryOptions::default());

    let current = registry.records().await.unwrap();
    let changes = Plan::new(registry.ownership()).compute(&current, &[]).changes;
    assert_eq!(changes.delete.len(), 1);

    registry.apply_changes(&changes).await.unwrap();
    assert!(provider.dump().await.is_empty());
}

#[tokio::test]
async fn shared_legacy_companion_survives_partial_delete() {
    let provider = CountingProvider::new(&["example.com"]);
    provider
        .seed(vec![
            a("dual.example.com", "1.2.3.4"),
            Endpoint::new("dual.example.com", RecordType::AAAA, ["::1"]),
            companion("dual.example.com", "default", "svc/dual"),
        ])
        .await;
    let registry = txt_registry(&provider, TxtRegistryOptions::default());

    let current = registry.records().await.unwrap();
    assert!(current.iter().all(|ep| ep.owner() == Some("default")));

    let a_record: Vec<Endpoint> = current
        .into_iter()
        .filter(|ep| ep.record_type == RecordType::A)
        .collect();
    registry
        .apply_changes(&Changes {
            delete: a_record,
            ..Default::default()
        })
        .await
        .unwrap();

    let dump = provider.dump().await;
    assert!(dump.iter().any(|r| r.starts_with("dual.example.com/TXT=")));
    assert!(dump.iter().any(|r| r.starts_with("dual.example.com/AAAA=")));
}

#[tokio::test]
async fn other_values_in_a_companion_record_set_survive_delete() {
    let provider = CountingProvider::new(&["example.com"]);
    provider
        .seed(vec![
            a("foo.example.com", "1.2.3.4"),
            Endpoint::new(
                "foo.example.com",
                RecordType::TXT,
                [
                    "\"v=spf1 -all\"",
                    "\"heritage=external-dns,external-dns/owner=default\"",
                ],
            ),
        ])
        .await;
    let registry = txt_registry(&provider, TxtRegistryOptions::default());

    let records = registry.records().await.unwrap();
    assert_eq!(records.len(), 2, "admin TXT value must stay visible");
    let txt = records
        .iter()
        .find(|ep| ep.record_type == RecordType::TXT)
        .unwrap();
    assert_eq!(txt.targets, vec!["\"v=spf1 -all\"".to_string()]);
    assert_eq!(txt.owner(), None);

    let a_record: Vec<Endpoint> = records
        .into_iter()
        .filter(|ep| ep.record_type == RecordType::A)
        .collect();
    assert_eq!(a_record[0].owner(), Some("default"));
    registry
        .apply_changes(&Changes {
            delete: a_record,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(
        provider.dump().await,
        vec!["foo.example.com/TXT=\"v=spf1 -all\"".to_string()]
    );
}

#[tokio::test]
async fn foreign_current_companion_outranks_our_legacy_one() {
    let provider = CountingProvider::new(&["example.com"]);
    provider
        .seed(vec![
            a("foo.example.com", "1.2.3.4"),
            companion("a-foo.example.com", "cluster-b", "svc/x"),
            companion("foo.example.com", "default", "svc/a"),
        ])
        .await;
    let registry = txt_registry(&provider, TxtRegistryOptions::default());

    let records = registry.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].owner(), None);

    let changes = Plan::new(registry.ownership()).compute(&records, &[]).changes;
    assert!(changes.is_empty());
}

#[tokio::test]
async fn records_of_other_owners_stay_unlabeled() {
    let provider = CountingProvider::new(&["example.com"]);
    provider
        .seed(vec![
            a("theirs.example.com", "1.2.3.4"),
            companion("a-theirs.example.com", "cluster-b", "svc/x"),
            a("nobody.example.com", "1.2.3.4"),
        ])
        .await;
    let registry = txt_registry(&provider, TxtRegistryOptions::default());

    let records = registry.records().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|ep| ep.labels.is_empty()));

    let changes = Plan::new(registry.ownership()).compute(&records, &[]).changes;
    assert!(changes.is_empty(), "foreign records must never be deleted");
}

#[tokio::test]
async fn ordinary_txt_records_pass_through() {
    let provider = CountingProvider::new(&["example.com"]);
    provider
        .seed(vec![Endpoint::new(
            "example.com",
            RecordType::TXT,
            ["\"v=spf1 include:_spf.example.com ~all\""],
        )])
        .await;
    let registry = txt_registry(&provider, TxtRegistryOptions::default());

    let records = registry.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record_type, RecordType::TXT);
    assert_eq!(records[0].owner(), None);
}

#[tokio::test]
async fn malformed_companion_is_excluded_and_record_stays_foreign() {
    let provider = CountingProvider::new(&["example.com"]);
    provider
        .seed(vec![
            a("a.example.com", "1.2.3.4"),
            Endpoint::new("a-a.example.com", RecordType::TXT, ["\"heritage=external-dns\""]),
        ])
        .await;
    let registry = txt_registry(&provider, TxtRegistryOptions::default());

    let records = registry.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record_type, RecordType::A);
    assert_eq!(records[0].owner(), None);
}

#[tokio::test]
async fn collision_withholds_create_and_reports_conflict() {
    let provider = CountingProvider::new(&["example.com"]);
    provider
        .seed(vec![cname("a-taken.example.com", "elsewhere.example.net")])
        .await;
    let registry = txt_registry(&provider, TxtRegistryOptions::default());
    registry.records().await.unwrap();

    let err = registry
        .apply_changes(&create(vec![
            a("taken.example.com", "1.1.1.1"),
            a("free.example.com", "2.2.2.2"),
        ]))
        .await
        .unwrap_err();

    match err {
        Error::OwnershipConflict { records } => {
            assert_eq!(records, vec!["taken.example.com/A".to_string()])
        }
        other => panic!("expected ownership conflict, got {other}"),
    }
    let dump = provider.dump().await;
    assert!(dump.contains(&"free.example.com/A=2.2.2.2".to_string()));
    assert!(!dump.iter().any(|r| r.starts_with("taken.example.com/A")));
}

#[tokio::test]
async fn foreign_txt_at_legacy_name_only_drops_the_legacy_companion() {
    let provider = CountingProvider::new(&["example.com"]);
    provider
        .seed(vec![Endpoint::new(
            "mail.example.com",
            RecordType::TXT,
            ["\"v=spf1 -all\""],
        )])
        .await;
    let registry = txt_registry(&provider, TxtRegistryOptions::default());
    registry.records().await.unwrap();

    registry
        .apply_changes(&create(vec![a("mail.example.com", "1.1.1.1")]))
        .await
        .unwrap();

    let records = registry.records().await.unwrap();
    let owned: Vec<&Endpoint> = records.iter().filter(|ep| ep.owner().is_some()).collect();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].record_type, RecordType::A);
}

#[tokio::test]
async fn legacy_only_ownership_is_migrated() {
    let provider = CountingProvider::new(&["example.com"]);
    provider
        .seed(vec![
            a("old.example.com", "1.2.3.4"),
            Endpoint::new(
                "old.example.com",
                RecordType::TXT,
                ["heritage=external-dns,external-dns/owner=default,external-dns/resource=svc/old"],
            ),
        ])
        .await;
    let registry = txt_registry(&provider, TxtRegistryOptions::default());

    let records = registry.records().await.unwrap();
    assert_eq!(records[0].owner(), Some("default"), "legacy companion still grants ownership");

    registry.apply_changes(&Changes::default()).await.unwrap();

    let batch = provider.last_batch().expect("migration batch");
    assert_eq!(batch.create.len(), 1);
    assert_eq!(batch.create[0].dns_name, "a-old.example.com");

    registry.apply_changes(&Changes::default()).await.unwrap();
    assert_eq!(provider.apply_calls(), 1, "migration happens once");
}

#[tokio::test]
async fn cache_serves_listing_and_is_patched() {
    let provider = CountingProvider::new(&["example.com"]);
    let options = TxtRegistryOptions {
        cache_interval: Duration::from_secs(60),
        ..Default::default()
    };
    let registry = txt_registry(&provider, options);

    registry.records().await.unwrap();
    registry.records().await.unwrap();
    assert_eq!(provider.records_calls(), 1);

    registry
        .apply_changes(&create(vec![a("new.example.com", "1.1.1.1")]))
        .await
        .unwrap();
    let records = registry.records().await.unwrap();
    assert_eq!(provider.records_calls(), 1, "patched cache avoids a listing");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].owner(), Some("default"));
}

#[tokio::test]
async fn failed_apply_invalidates_cache() {
    let provider = CountingProvider::new(&["example.com"]);
    let options = TxtRegistryOptions {
        cache_interval: Duration::from_secs(60),
        ..Default::default()
    };
    let registry = txt_registry(&provider, options);
    registry.records().await.unwrap();

    provider.set_fail_apply(true);
    let result = registry
        .apply_changes(&create(vec![a("new.example.com", "1.1.1.1")]))
        .await;
    assert!(result.is_err());

    registry.records().await.unwrap();
    assert_eq!(provider.records_calls(), 2);
}

#[tokio::test]
async fn noop_registry_manages_everything_in_scope() {
    let provider = CountingProvider::new(&["example.com"]);
    provider.seed(vec![a("anyone.example.com", "1.2.3.4")]).await;
    let registry = NoopRegistry::new(Arc::new(provider.clone()));

    let current = registry.records().await.unwrap();
    assert_eq!(registry.ownership(), OwnershipMode::Implicit);

    let changes = Plan::new(registry.ownership()).compute(&current, &[]).changes;
    registry.apply_changes(&changes).await.unwrap();
    assert!(provider.dump().await.is_empty());
}
