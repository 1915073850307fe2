#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use biblio_core::logging_facility::test_capture::init_test_capture;
use biblio_core::model::dataset::ACCESS_LEVEL_OPEN;
use biblio_core::{Context, Dataset, ExErrorKind, Mutation, Publication, Record, Status};
use biblio_store::{Repo, RepoConfig, Snapshot, StoreConfig};
use chrono::{Duration, NaiveDate, Utc};
use common::{dataset, embargoed_dataset, other_user, person, publication, repo, repo_with, tick, user};
use std::sync::{Arc, Mutex};

#[test]
fn test_save_then_get() {
    // Given: An empty repository
    let (_dir, repo) = repo();
    let ctx = Context::new();

    // When: We save a dataset
    let saved = repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();

    // Then: Get returns it with the version token of its snapshot
    let loaded = repo.get_dataset(&ctx, "d1").unwrap();
    assert_eq!(loaded.title.as_deref(), Some("A"));
    assert!(saved.snapshot.version_id.is_some());
    assert_eq!(loaded.snapshot.version_id, saved.snapshot.version_id);
    assert!(loaded.snapshot.valid_until.is_none());
}

#[test]
fn test_save_stamps_audit_fields() {
    let (_dir, repo) = repo();
    let ctx = Context::new();

    let first = repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();
    assert_eq!(first.audit.creator_id.as_deref(), Some("u1"));
    assert_eq!(first.audit.user_id.as_deref(), Some("u1"));
    assert!(first.audit.date_created.is_some());
    assert!(first.audit.last_user_id.is_none());

    let mut edit = first.clone();
    edit.title = Some("B".to_string());
    let second = repo.save_dataset(&ctx, edit, &other_user()).unwrap();
    assert_eq!(second.audit.creator_id.as_deref(), Some("u1"));
    assert_eq!(second.audit.user_id.as_deref(), Some("u2"));
    assert_eq!(second.audit.last_user_id.as_deref(), Some("u1"));
    assert_eq!(second.audit.date_created, first.audit.date_created);
}

#[test]
fn test_save_is_idempotent_for_equal_content() {
    // Given: A saved dataset
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let first = repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();

    // When: The same content is saved again, as loaded and as built fresh
    let loaded = repo.get_dataset(&ctx, "d1").unwrap();
    let again = repo.save_dataset(&ctx, loaded, &user()).unwrap();
    let fresh = repo.save_dataset(&ctx, dataset("d1", "A"), &other_user()).unwrap();

    // Then: Still one snapshot
    assert_eq!(again.snapshot.version_id, first.snapshot.version_id);
    assert_eq!(fresh.snapshot.version_id, first.snapshot.version_id);
    assert_eq!(repo.dataset_history(&ctx, "d1").unwrap().len(), 1);
}

#[test]
fn test_validation_failure_writes_nothing() {
    // Given: A public dataset missing required fields
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let mut d = dataset("d1", "A");
    d.status = Status::Public;

    // When: We save it
    let err = repo.save_dataset(&ctx, d, &user()).unwrap_err();

    // Then: Itemized validation errors and no snapshot
    assert_eq!(err.kind(), ExErrorKind::Validation);
    let errors = err.validation_errors().unwrap();
    assert!(errors.contains("doi", "required"));
    assert!(errors.contains("author", "min_one"));
    assert!(repo.get_dataset(&ctx, "d1").unwrap_err().is_not_found());
}

#[test]
fn test_has_been_public_is_monotonic() {
    // Given: A publication made public
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let mut p = publication("p1", "On Snapshots");
    p.status = Status::Public;
    p.author.push(person("a1", "Ada", "Lovelace"));
    p.year = Some("2024".to_string());
    let saved = repo.save_publication(&ctx, p, &user()).unwrap();
    assert!(saved.has_been_public);

    // When: It is withdrawn
    let mut withdrawn = saved.clone();
    withdrawn.status = Status::Deleted;
    withdrawn.has_been_public = false;
    let saved = repo.save_publication(&ctx, withdrawn, &user()).unwrap();

    // Then: The flag stays set
    assert_eq!(saved.status, Status::Deleted);
    assert!(saved.has_been_public);
}

#[test]
fn test_concurrent_updates_one_conflicts() {
    // Given: Two readers holding the same version
    let (_dir, repo) = repo();
    let ctx = Context::new();
    repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();
    let reader_one = repo.get_dataset(&ctx, "d1").unwrap();
    let reader_two = repo.get_dataset(&ctx, "d1").unwrap();
    let s1 = reader_one.snapshot.version_id.clone().unwrap();

    // When: Both update from that version
    let mut first = reader_one.clone();
    first.title = Some("B".to_string());
    let s2 = repo.update_dataset(&ctx, &s1, first, &user()).unwrap();

    let mut second = reader_two.clone();
    second.title = Some("C".to_string());
    let err = repo.update_dataset(&ctx, &s1, second, &other_user()).unwrap_err();

    // Then: The first wins, the second is a conflict naming s1
    assert!(err.is_conflict());
    assert_eq!(err.conflict_info().unwrap().expected_version_id, s1);
    let current = repo.get_dataset(&ctx, "d1").unwrap();
    assert_eq!(current.snapshot.version_id, s2.snapshot.version_id);
    assert_eq!(current.title.as_deref(), Some("B"));
}

#[test]
fn test_conflict_is_logged_as_expected_outcome() {
    let capture = init_test_capture();
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let saved = repo.save_dataset(&ctx, dataset("d-logged", "A"), &user()).unwrap();
    let version = saved.snapshot.version_id.clone().unwrap();
    repo.update_dataset(&ctx, &version, dataset("d-logged", "B"), &user()).unwrap();

    let _ = repo.update_dataset(&ctx, &version, dataset("d-logged", "C"), &user());

    let events = capture.events_for("update_dataset", "d-logged");
    assert!(events.iter().any(|e| e.fields.get("outcome").map(String::as_str) == Some("ERR_CONFLICT")));
    assert!(events.iter().all(|e| e.level != tracing::Level::ERROR));
}

#[test]
fn test_mutate_applies_and_persists() {
    // Given: A saved dataset
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let saved = repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();

    // When: We add a keyword through the mutation table
    let mutated = repo
        .mutate_dataset(&ctx, "d1", &user(), &[Mutation::new("add_keyword", ["dna"])])
        .unwrap();

    // Then: A new version carries the keyword
    assert_eq!(mutated.keyword, vec!["dna".to_string()]);
    assert_ne!(mutated.snapshot.version_id, saved.snapshot.version_id);
    assert_eq!(repo.get_dataset(&ctx, "d1").unwrap().keyword, vec!["dna".to_string()]);
}

#[test]
fn test_unknown_mutation_changes_nothing() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let saved = repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();

    let err = repo
        .mutate_dataset(&ctx, "d1", &user(), &[Mutation::new("bogus", Vec::<String>::new())])
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Argument);
    assert!(err.to_string().contains("bogus"));
    let current = repo.get_dataset(&ctx, "d1").unwrap();
    assert_eq!(current.snapshot.version_id, saved.snapshot.version_id);
}

#[test]
fn test_failing_step_discards_earlier_steps() {
    // Given: A script whose second step has the wrong arity
    let (_dir, repo) = repo();
    let ctx = Context::new();
    repo.save_publication(&ctx, publication("p1", "A"), &user()).unwrap();
    let script = vec![
        Mutation::new("set_title", ["Changed"]).at_line(1),
        Mutation::new("set_year", ["2020", "2021"]).at_line(2),
    ];

    // When: We apply it
    let err = repo.mutate_publication(&ctx, "p1", &user(), &script).unwrap_err();

    // Then: Argument error on line 2, title untouched
    assert_eq!(err.kind(), ExErrorKind::Argument);
    assert_eq!(err.line(), Some(2));
    let current = repo.get_publication(&ctx, "p1").unwrap();
    assert_eq!(current.title.as_deref(), Some("A"));
    assert_eq!(repo.publication_history(&ctx, "p1").unwrap().len(), 1);
}

#[test]
fn test_mutation_result_is_validated() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();

    let err = repo
        .mutate_dataset(&ctx, "d1", &user(), &[Mutation::new("set_status", ["public"])])
        .unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::Validation);
    assert_eq!(repo.get_dataset(&ctx, "d1").unwrap().status, Status::Private);
}

#[test]
fn test_purge_then_get_is_not_found() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();

    assert_eq!(repo.purge_dataset(&ctx, "d1").unwrap(), 1);

    assert!(repo.get_dataset(&ctx, "d1").unwrap_err().is_not_found());
    assert!(repo.dataset_history(&ctx, "d1").unwrap_err().is_not_found());
}

#[test]
fn test_import_before_history_is_rejected() {
    // Given: A dataset saved now
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let saved = repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();
    let t1 = saved.snapshot.valid_from.unwrap();

    // When: A snapshot from before t1 is imported
    let t0 = t1 - Duration::days(365);
    let payload = dataset("d1", "old").encode().unwrap();
    let store = repo.client().store(&ctx, "datasets").unwrap();
    let err = store
        .import(&Snapshot::for_import("d1", "legacy-1", payload, t0, t0))
        .unwrap_err();

    // Then: Rejected, history still a single interval
    assert_eq!(err.kind(), ExErrorKind::Validation);
    let history = repo.dataset_history(&ctx, "d1").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].title.as_deref(), Some("A"));
}

#[test]
fn test_history_and_as_of() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let v1 = repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();
    tick();
    let mut edit = v1.clone();
    edit.title = Some("B".to_string());
    let v2 = repo.save_dataset(&ctx, edit, &user()).unwrap();

    let history = repo.dataset_history(&ctx, "d1").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].title.as_deref(), Some("A"));
    assert_eq!(history[0].snapshot.valid_until, v2.snapshot.valid_from);
    assert_eq!(history[1].title.as_deref(), Some("B"));

    let then = repo
        .dataset_as_of(&ctx, "d1", v1.snapshot.valid_from.unwrap())
        .unwrap();
    assert_eq!(then.title.as_deref(), Some("A"));
}

#[test]
fn test_get_many_skips_missing() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    repo.save_publication(&ctx, publication("p2", "B"), &user()).unwrap();
    repo.save_publication(&ctx, publication("p1", "A"), &user()).unwrap();

    let ids = vec!["p1".to_string(), "p9".to_string(), "p2".to_string()];
    let found = repo.get_publications(&ctx, &ids).unwrap();

    let titles: Vec<_> = found.iter().map(|p| p.title.clone().unwrap()).collect();
    assert_eq!(titles, vec!["A", "B"]);
}

#[test]
fn test_loaders_run_on_read_and_listeners_after_commit() {
    // Given: A repository with a loader and a listener
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let config = RepoConfig::builder()
        .dataset_loader(|d: &mut Dataset| {
            d.message = Some(format!("loaded {}", d.id));
            Ok(())
        })
        .dataset_listener(move |d: &Dataset| sink.lock().unwrap().push(d.id.clone()))
        .build();
    let (_dir, repo) = repo_with(config);
    let ctx = Context::new();

    // When: We save inside a transaction that commits
    repo.transaction(&ctx, |r| {
        r.save_dataset(dataset("d1", "A"), &user())?;
        assert!(seen.lock().unwrap().is_empty());
        Ok(())
    })
    .unwrap();

    // Then: The listener ran after commit and reads are enriched
    assert_eq!(*seen.lock().unwrap(), vec!["d1".to_string()]);
    let loaded = repo.get_dataset(&ctx, "d1").unwrap();
    assert_eq!(loaded.message.as_deref(), Some("loaded d1"));
}

#[test]
fn test_enriching_loader_keeps_saves_idempotent() {
    // Given: A loader that fills a serialized field on every read
    let config = RepoConfig::builder()
        .dataset_loader(|d: &mut Dataset| {
            d.message = Some("enriched".to_string());
            Ok(())
        })
        .build();
    let (_dir, repo) = repo_with(config);
    let ctx = Context::new();

    // When: The same content is saved three times
    let first = repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();
    repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();
    let last = repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();

    // Then: One version, returned enriched, stored without the loaded field
    let history = repo.dataset_history(&ctx, "d1").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(last.snapshot.version_id, first.snapshot.version_id);
    assert_eq!(last.message.as_deref(), Some("enriched"));
    let stored: Dataset = repo
        .client()
        .store(&ctx, "datasets")
        .unwrap()
        .get_current("d1")
        .unwrap()
        .into_record()
        .unwrap();
    assert!(stored.message.is_none());
}

#[test]
fn test_listeners_do_not_run_on_rollback() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let config = RepoConfig::builder()
        .publication_listener(move |p: &Publication| sink.lock().unwrap().push(p.id.clone()))
        .build();
    let (_dir, repo) = repo_with(config);
    let ctx = Context::new();

    let result = repo.transaction(&ctx, |r| {
        r.save_publication(publication("p1", "A"), &user())?;
        r.get_publication("missing")
    });

    assert!(result.unwrap_err().is_not_found());
    assert!(seen.lock().unwrap().is_empty());
    assert!(repo.get_publication(&ctx, "p1").unwrap_err().is_not_found());
}

#[test]
fn test_relation_saved_on_both_sides() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    repo.save_publication(&ctx, publication("p1", "A"), &user()).unwrap();
    repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();

    repo.add_publication_dataset(&ctx, "p1", "d1", &user()).unwrap();
    assert_eq!(repo.get_publication(&ctx, "p1").unwrap().related_dataset, vec!["d1"]);
    assert_eq!(repo.get_dataset(&ctx, "d1").unwrap().related_publication, vec!["p1"]);

    repo.remove_publication_dataset(&ctx, "p1", "d1", &user()).unwrap();
    assert!(repo.get_publication(&ctx, "p1").unwrap().related_dataset.is_empty());
    assert!(repo.get_dataset(&ctx, "d1").unwrap().related_publication.is_empty());
}

#[test]
fn test_relation_with_missing_side_saves_neither() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    repo.save_publication(&ctx, publication("p1", "A"), &user()).unwrap();

    let err = repo.add_publication_dataset(&ctx, "p1", "d404", &user()).unwrap_err();

    assert!(err.is_not_found());
    assert!(repo.get_publication(&ctx, "p1").unwrap().related_dataset.is_empty());
    assert_eq!(repo.publication_history(&ctx, "p1").unwrap().len(), 1);
}

#[test]
fn test_each_stops_when_callback_returns_false() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    for i in 0..5 {
        repo.save_dataset(&ctx, dataset(&format!("d{}", i), "A"), &user()).unwrap();
    }

    let mut visited = Vec::new();
    repo.each_dataset(&ctx, |d| {
        visited.push(d.id);
        visited.len() < 3
    })
    .unwrap();

    assert_eq!(visited, vec!["d0", "d1", "d2"]);
}

#[test]
fn test_each_callback_may_write() {
    // Given: Several datasets
    let (_dir, repo) = repo();
    let ctx = Context::new();
    for i in 0..3 {
        repo.save_dataset(&ctx, dataset(&format!("d{}", i), "A"), &user()).unwrap();
    }

    // When: The callback writes through the repository
    let writer = repo.clone();
    let mut failures = 0;
    repo.each_dataset(&ctx, |mut d| {
        d.title = Some("reindexed".to_string());
        if writer.save_dataset(&ctx, d, &user()).is_err() {
            failures += 1;
        }
        true
    })
    .unwrap();

    // Then: Every write went through
    assert_eq!(failures, 0);
    let mut titles = Vec::new();
    repo.each_dataset(&ctx, |d| {
        titles.push(d.title.unwrap());
        true
    })
    .unwrap();
    assert_eq!(titles, vec!["reindexed"; 3]);
}

#[test]
fn test_each_with_rewrites_visits_each_record_once() {
    // Given: More datasets than fit in one page
    let (_dir, client) = common::file_client_with(StoreConfig::default().with_page_size(1));
    let repo = Repo::new(client, RepoConfig::default());
    let ctx = Context::new();
    for i in 0..3 {
        repo.save_dataset(&ctx, dataset(&format!("d{}", i), "A"), &user()).unwrap();
    }

    // When: Every visit writes a new version of the record just seen
    let writer = repo.clone();
    let mut visited = Vec::new();
    repo.each_dataset(&ctx, |mut d| {
        visited.push(d.id.clone());
        d.title = Some(format!("pass {}", visited.len()));
        writer.save_dataset(&ctx, d, &user()).unwrap();
        visited.len() < 10
    })
    .unwrap();

    // Then: The walk ends after one visit per record
    assert_eq!(visited, vec!["d0", "d1", "d2"]);
    assert_eq!(repo.dataset_history(&ctx, "d2").unwrap().len(), 2);
}

#[test]
fn test_each_history_visits_every_version() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let first = repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();
    let mut edit = first.clone();
    edit.title = Some("B".to_string());
    repo.save_dataset(&ctx, edit, &user()).unwrap();
    repo.save_dataset(&ctx, dataset("d2", "A"), &user()).unwrap();

    let mut count = 0;
    repo.each_dataset_history(&ctx, |_| {
        count += 1;
        true
    })
    .unwrap();
    assert_eq!(count, 3);
}

#[test]
fn test_between_and_after() {
    // Given: Two datasets saved at different instants
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let a = repo.save_dataset(&ctx, dataset("a", "A"), &user()).unwrap();
    tick();
    let b = repo.save_dataset(&ctx, dataset("b", "B"), &user()).unwrap();
    let a_from = a.snapshot.valid_from.unwrap();
    let b_from = b.snapshot.valid_from.unwrap();

    // Then: between is inclusive on both ends
    let mut ids = Vec::new();
    repo.datasets_between(&ctx, a_from, a_from, |d| {
        ids.push(d.id);
        true
    })
    .unwrap();
    assert_eq!(ids, vec!["a"]);

    // And: after is exclusive and reports the total
    let (total, page) = repo.datasets_after(&ctx, a_from, 10, 0).unwrap();
    assert_eq!(total, 1);
    assert_eq!(page[0].id, "b");

    let (total, page) = repo
        .datasets_after(&ctx, a_from - Duration::seconds(1), 1, 1)
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].snapshot.valid_from, Some(b_from));
}

#[test]
fn test_count_with_predicate() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    repo.save_dataset(&ctx, dataset("d1", "A"), &user()).unwrap();
    repo.save_dataset(&ctx, dataset("d2", "B"), &user()).unwrap();

    assert_eq!(repo.count_datasets(&ctx, "", &[]).unwrap(), 2);
    let title = [biblio_store::SqlValue::Text("B".to_string())];
    assert_eq!(
        repo.count_datasets(&ctx, "json_extract(payload, '$.title') = ?", &title).unwrap(),
        1
    );
}

#[test]
fn test_lift_expired_embargoes() {
    // Given: One expired and one running embargo
    let (_dir, repo) = repo();
    let ctx = Context::new();
    repo.save_dataset(&ctx, embargoed_dataset("d1", "2024-01-31"), &user()).unwrap();
    repo.save_dataset(&ctx, embargoed_dataset("d2", "2024-12-31"), &user()).unwrap();
    let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

    // When: The expiry job runs
    let expired = repo.datasets_with_expired_embargo(&ctx, today).unwrap();
    let lifted = repo.lift_expired_embargoes(&ctx, today, &user()).unwrap();

    // Then: Only the expired one switched to its post-embargo access level
    assert_eq!(expired.len(), 1);
    assert_eq!(lifted, 1);
    let d1 = repo.get_dataset(&ctx, "d1").unwrap();
    assert_eq!(d1.access_level.as_deref(), Some(ACCESS_LEVEL_OPEN));
    assert!(d1.embargo_date.is_none());
    assert!(repo.get_dataset(&ctx, "d2").unwrap().is_embargoed());

    // And: Running again finds nothing
    assert_eq!(repo.lift_expired_embargoes(&ctx, today, &user()).unwrap(), 0);
}

#[test]
fn test_transfer_contributor_is_forbidden_by_default() {
    let (_dir, repo) = repo();
    let ctx = Context::new();

    let err = repo
        .transfer_contributor(&ctx, "old", &person("new", "Grace", "Hopper"))
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Forbidden);
}

#[test]
fn test_transfer_contributor_rewrites_history() {
    // Given: A publication with two versions and a dataset, both by person "old"
    let config = RepoConfig::builder().allow_history_rewrite(true).build();
    let (_dir, repo) = repo_with(config);
    let ctx = Context::new();
    let mut p = publication("p1", "A");
    p.author.push(person("old", "Ada", "Byron"));
    let v1 = repo.save_publication(&ctx, p, &user()).unwrap();
    let mut edit = v1.clone();
    edit.title = Some("B".to_string());
    let v2 = repo.save_publication(&ctx, edit, &user()).unwrap();
    let mut d = dataset("d1", "A");
    d.author.push(person("old", "Ada", "Byron"));
    d.author.push(person("other", "Alan", "Turing"));
    repo.save_dataset(&ctx, d, &user()).unwrap();

    // When: The person is transferred
    let rewritten = repo
        .transfer_contributor(&ctx, "old", &person("new", "Ada", "Lovelace"))
        .unwrap();

    // Then: Every snapshot was rewritten in place, versions unchanged
    assert_eq!(rewritten, 3);
    let history = repo.publication_history(&ctx, "p1").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].snapshot.version_id, v1.snapshot.version_id);
    assert_eq!(history[1].snapshot.version_id, v2.snapshot.version_id);
    for version in &history {
        assert_eq!(version.author[0].person_id.as_deref(), Some("new"));
        assert_eq!(version.author[0].full_name, "Ada Lovelace");
    }
    let d1 = repo.get_dataset(&ctx, "d1").unwrap();
    assert_eq!(d1.author[0].person_id.as_deref(), Some("new"));
    assert_eq!(d1.author[1].person_id.as_deref(), Some("other"));
}

#[test]
fn test_nested_repo_operations_share_the_transaction() {
    let (_dir, repo) = repo();
    let ctx = Context::new();

    let version_id = repo
        .transaction(&ctx, |r| {
            let saved = r.save_dataset(dataset("d1", "A"), &user())?;
            let loaded = r.get_dataset("d1")?;
            assert_eq!(loaded.snapshot.version_id, saved.snapshot.version_id);
            let mut edit = loaded.clone();
            edit.title = Some("B".to_string());
            let version = loaded.snapshot.version_id.clone().unwrap();
            let updated = r.update_dataset(&version, edit, &user())?;
            Ok(updated.snapshot.version_id.unwrap())
        })
        .unwrap();

    let current = repo.get_dataset(&ctx, "d1").unwrap();
    assert_eq!(current.snapshot.version_id.as_deref(), Some(version_id.as_str()));
    assert_eq!(current.title.as_deref(), Some("B"));
}

#[test]
fn test_saved_history_intervals_are_contiguous() {
    let (_dir, repo) = repo();
    let ctx = Context::new();
    let mut current = repo.save_dataset(&ctx, dataset("d1", "v0"), &user()).unwrap();
    for i in 1..5 {
        let mut edit = current.clone();
        edit.title = Some(format!("v{}", i));
        current = repo.save_dataset(&ctx, edit, &user()).unwrap();
    }

    let history = repo.dataset_history(&ctx, "d1").unwrap();
    assert_eq!(history.len(), 5);
    for pair in history.windows(2) {
        assert_eq!(pair[0].snapshot.valid_until, pair[1].snapshot.valid_from);
    }
    assert!(history.last().unwrap().snapshot.valid_until.is_none());
    assert!(history.last().unwrap().snapshot.valid_from.unwrap() <= Utc::now());
}
