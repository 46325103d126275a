mod common;

use relata::{
    save_many, BatchError, BatchState, Entity, EntityError, Query, QueryArgs, SaveManyOptions,
    SaveOutcome, WhereClause,
};
use serde_json::{json, Value};
use sqlx::AnyConnection;

fn author(registry: &relata::Registry, name: &str, email: &str) -> Entity {
    let mut e = Entity::new(registry.model("author").unwrap());
    e.set_field("name", name).unwrap();
    e.set_field("email", email).unwrap();
    e
}

async fn count_authors(conn: &mut AnyConnection, registry: &relata::Registry) -> u64 {
    Query::new(registry.model("author").unwrap(), WhereClause::default(), QueryArgs::default())
        .get_results(conn)
        .await
        .unwrap()
        .total_available()
}

#[tokio::test]
async fn commits_every_save() {
    let (mut conn, registry) = common::setup().await;
    let mut batch = vec![
        author(&registry, "Ada", "ada@example.com"),
        author(&registry, "Grace", "grace@example.com"),
    ];
    let report = save_many(&mut conn, &mut batch, SaveManyOptions::default())
        .await
        .unwrap();
    assert_eq!(report.state, BatchState::Committed);
    assert_eq!(report.outcomes, vec![SaveOutcome::Inserted, SaveOutcome::Inserted]);
    assert!(batch.iter().all(|e| !e.is_new()));
    assert_eq!(count_authors(&mut conn, &registry).await, 2);
}

#[tokio::test]
async fn first_failure_rolls_everything_back() {
    let (mut conn, registry) = common::setup().await;
    let mut existing = author(&registry, "Ada", "ada@example.com");
    existing.save(&mut conn).await.unwrap();
    existing.set_field("name", "Ada Lovelace").unwrap();

    let mut batch = vec![
        existing,
        author(&registry, "Grace", "grace@example.com"),
        author(&registry, "Imposter", "ada@example.com"),
        author(&registry, "Barbara", "barbara@example.com"),
    ];
    match save_many(&mut conn, &mut batch, SaveManyOptions::default()).await {
        Err(BatchError::Save { index, source }) => {
            assert_eq!(index, 2);
            assert!(matches!(source, EntityError::Save { .. }));
        }
        other => panic!("expected a failed batch, got {:?}", other),
    }

    assert_eq!(count_authors(&mut conn, &registry).await, 1);
    let ada = Entity::get(&mut conn, &registry.model("author").unwrap(), 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ada.get_field("name"), Some(&json!("Ada")));

    // In-memory state matches the database again.
    assert!(batch[0].is_modified());
    assert_eq!(batch[0].get_field("name"), Some(&json!("Ada Lovelace")));
    assert!(batch[1].is_new());
    assert_eq!(batch[1].get_id(), None::<&Value>);
    assert!(batch[3].is_new());
}

#[tokio::test]
async fn dry_run_persists_nothing() {
    let (mut conn, registry) = common::setup().await;
    let mut batch = vec![
        author(&registry, "Ada", "ada@example.com"),
        author(&registry, "Grace", "grace@example.com"),
    ];
    let report = save_many(&mut conn, &mut batch, SaveManyOptions::dry_run())
        .await
        .unwrap();
    assert_eq!(report.state, BatchState::RolledBack);
    assert_eq!(report.outcomes.len(), 2);
    assert!(batch.iter().all(|e| e.is_new() && e.is_modified()));
    assert_eq!(count_authors(&mut conn, &registry).await, 0);

    let report = save_many(&mut conn, &mut batch, SaveManyOptions::default())
        .await
        .unwrap();
    assert_eq!(report.state, BatchState::Committed);
    assert_eq!(count_authors(&mut conn, &registry).await, 2);
}
