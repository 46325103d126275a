mod common;

use relata::sql::Relation;
use relata::{
    AssociationChange, Entity, Filter, Query, QueryArgs, QueryError, RelationError, RelationFilter,
    WhereClause,
};
use serde_json::{json, Value};
use sqlx::AnyConnection;
use std::sync::Arc;

async fn create(conn: &mut AnyConnection, model: &Arc<relata::ModelDef>, fields: Value) -> Entity {
    let mut e = Entity::new(model.clone());
    for (k, v) in fields.as_object().unwrap() {
        e.set_field(k.clone(), v.clone()).unwrap();
    }
    e.save(conn).await.unwrap();
    e
}

fn ids(entities: &[Entity]) -> Vec<i64> {
    let mut out: Vec<i64> = entities
        .iter()
        .map(|e| e.get_id().and_then(Value::as_i64).unwrap())
        .collect();
    out.sort();
    out
}

#[tokio::test]
async fn add_remove_and_list() {
    let (mut conn, registry) = common::setup().await;
    let posts = registry.model("post").unwrap();
    let tags = registry.model("tag").unwrap();

    let p1 = create(&mut conn, &posts, json!({"title": "one"})).await;
    let p2 = create(&mut conn, &posts, json!({"title": "two"})).await;
    let rust = create(&mut conn, &tags, json!({"label": "rust"})).await;
    let sql = create(&mut conn, &tags, json!({"label": "sql"})).await;

    let assoc = registry.association("post", "tags").unwrap();
    assert_eq!(assoc.table(), "posts_relationships");
    assert_eq!(assoc.add(&mut conn, &p1, &rust).await.unwrap(), AssociationChange::Added);
    assert_eq!(
        assoc.add(&mut conn, &p1, &rust).await.unwrap(),
        AssociationChange::AlreadyPresent
    );
    assoc.add(&mut conn, &p1, &sql).await.unwrap();
    assoc.add(&mut conn, &p2, &rust).await.unwrap();

    let mut right = assoc.right_ids(&mut conn, &p1).await.unwrap();
    right.sort_by_key(|v| v.as_i64());
    assert_eq!(right, vec![json!(1), json!(2)]);
    assert_eq!(ids(&assoc.items_of(&mut conn, &p1).await.unwrap()), vec![1, 2]);
    assert_eq!(ids(&assoc.owners_of(&mut conn, &rust).await.unwrap()), vec![1, 2]);

    assert_eq!(
        assoc.remove(&mut conn, &p1, &rust).await.unwrap(),
        AssociationChange::Removed
    );
    assert_eq!(
        assoc.remove(&mut conn, &p1, &rust).await.unwrap(),
        AssociationChange::NotPresent
    );
    assert_eq!(ids(&assoc.owners_of(&mut conn, &rust).await.unwrap()), vec![2]);
}

#[tokio::test]
async fn unsaved_or_mismatched_entities_are_rejected() {
    let (mut conn, registry) = common::setup().await;
    let posts = registry.model("post").unwrap();
    let tags = registry.model("tag").unwrap();
    let assoc = registry.association("post", "tags").unwrap();

    let saved = create(&mut conn, &posts, json!({"title": "saved"})).await;
    let tag = create(&mut conn, &tags, json!({"label": "t"})).await;
    let unsaved = Entity::new(tags.clone());

    assert!(matches!(
        assoc.add(&mut conn, &saved, &unsaved).await,
        Err(RelationError::Unsaved)
    ));
    assert!(matches!(
        assoc.add(&mut conn, &tag, &saved).await,
        Err(RelationError::ModelMismatch { .. })
    ));
    assert!(matches!(
        registry.association("post", "author"),
        Err(RelationError::UnsupportedKind { kind: "belongs_to", .. })
    ));
}

#[tokio::test]
async fn relational_queries_join_the_association_table() {
    let (mut conn, registry) = common::setup().await;
    let posts = registry.model("post").unwrap();
    let tags = registry.model("tag").unwrap();
    let assoc = registry.association("post", "tags").unwrap();

    let p1 = create(&mut conn, &posts, json!({"title": "one", "views": 5})).await;
    let p2 = create(&mut conn, &posts, json!({"title": "two", "views": 50})).await;
    create(&mut conn, &posts, json!({"title": "three"})).await;
    let rust = create(&mut conn, &tags, json!({"label": "rust"})).await;
    let sql = create(&mut conn, &tags, json!({"label": "sql"})).await;
    assoc.add(&mut conn, &p1, &rust).await.unwrap();
    assoc.add(&mut conn, &p1, &sql).await.unwrap();
    assoc.add(&mut conn, &p2, &rust).await.unwrap();

    let tagged_sql = WhereClause::from_json(&json!({"relationships": {"tags": 2}})).unwrap();
    let r = Query::new(posts.clone(), tagged_sql, QueryArgs::default())
        .get_results(&mut conn)
        .await
        .unwrap();
    assert_eq!(ids(&r.to_entities()), vec![1]);

    // p1 matches both predicates but comes back once.
    let either = WhereClause::new(Filter::default()).with_relationships(
        RelationFilter::new(Relation::Or).with("tags", 1).with("tags", 2),
    );
    let r = Query::new(posts.clone(), either, QueryArgs::default())
        .get_results(&mut conn)
        .await
        .unwrap();
    assert_eq!(ids(&r.to_entities()), vec![1, 2]);
    assert_eq!(r.total_available(), 2);

    let popular = WhereClause::from_json(&json!({
        "views": {"compare": ">", "value": 10},
        "relationships": {"relation": "OR", "fields": {"tags": 1}}
    }))
    .unwrap();
    let r = Query::new(posts.clone(), popular, QueryArgs::default())
        .get_results(&mut conn)
        .await
        .unwrap();
    assert_eq!(ids(&r.to_entities()), vec![2]);

    let past_end = WhereClause::new(Filter::default())
        .with_relationships(RelationFilter::new(Relation::Or).with("tags", 1).with("tags", 2));
    let r = Query::new(posts.clone(), past_end, QueryArgs::page(2, 10))
        .get_results(&mut conn)
        .await
        .unwrap();
    assert!(r.is_empty());
    assert_eq!(r.total_available(), 2);

    let not_joined = WhereClause::from_json(&json!({"relationships": {"author": 1}})).unwrap();
    assert!(matches!(
        Query::new(posts, not_joined, QueryArgs::default())
            .get_results(&mut conn)
            .await,
        Err(QueryError::InvalidRelation(_))
    ));
}

#[tokio::test]
async fn belongs_to_follows_the_foreign_key() {
    let (mut conn, registry) = common::setup().await;
    let authors = registry.model("author").unwrap();
    let posts = registry.model("post").unwrap();

    let ada = create(&mut conn, &authors, json!({"name": "Ada"})).await;
    let post = create(&mut conn, &posts, json!({"title": "notes", "author_id": 1})).await;
    let orphan = create(&mut conn, &posts, json!({"title": "anon"})).await;

    let author = registry.related_one(&mut conn, &post, "author").await.unwrap().unwrap();
    assert_eq!(author.get_id(), ada.get_id());
    assert_eq!(author.get_field("name"), Some(&json!("Ada")));
    assert!(registry
        .related_one(&mut conn, &orphan, "author")
        .await
        .unwrap()
        .is_none());
    assert!(matches!(
        registry.related_one(&mut conn, &post, "tags").await,
        Err(RelationError::UnsupportedKind { .. })
    ));
}

#[tokio::test]
async fn has_one_looks_up_the_owner_key_on_the_related_table() {
    let (mut conn, registry) = common::setup().await;
    let authors = registry.model("author").unwrap();
    let profiles = registry.model("profile").unwrap();

    let ada = create(&mut conn, &authors, json!({"name": "Ada"})).await;
    let bob = create(&mut conn, &authors, json!({"name": "Bob"})).await;
    create(&mut conn, &profiles, json!({"author_id": 2, "bio": "b"})).await;
    create(&mut conn, &profiles, json!({"author_id": 1, "bio": "a"})).await;

    let profile = registry.related_one(&mut conn, &ada, "profile").await.unwrap().unwrap();
    assert_eq!(profile.get_id(), Some(&json!(2)));
    assert_eq!(profile.get_field("bio"), Some(&json!("a")));
    let profile = registry.related_one(&mut conn, &bob, "profile").await.unwrap().unwrap();
    assert_eq!(profile.get_field("bio"), Some(&json!("b")));

    let cy = create(&mut conn, &authors, json!({"name": "Cy"})).await;
    assert!(registry
        .related_one(&mut conn, &cy, "profile")
        .await
        .unwrap()
        .is_none());
}
