//! A small library catalogue on top of relata.
//!
//! Run: `cargo run --example library`
//! Point `DATABASE_URL` at MySQL to run against a server; defaults to in-memory SQLite.

use relata::{
    resolve, save_many, DbSettings, Direction, Entity, Filter, FullConfig, Query, QueryArgs,
    RelationFilter, SaveManyOptions, WhereClause,
};
use relata::sql::Relation;
use serde_json::json;

const MODELS: &str = r#"{
    "models": [
        {
            "name": "author",
            "table": "authors",
            "schema": {
                "fields": {
                    "id": "bigint unsigned NOT NULL AUTO_INCREMENT",
                    "name": "varchar(100) NOT NULL"
                },
                "indexes": ["PRIMARY KEY (id)", "UNIQUE KEY (name)"]
            }
        },
        {
            "name": "book",
            "table": "books",
            "schema": {
                "fields": {
                    "id": "bigint unsigned NOT NULL AUTO_INCREMENT",
                    "title": "varchar(255) NOT NULL",
                    "author_id": "bigint unsigned",
                    "published": "date"
                },
                "indexes": ["PRIMARY KEY (id)", "KEY (author_id)"]
            },
            "relationships": {
                "author": {"type": "belongs_to", "model": "author"},
                "sequels": {"type": "has_many", "model": "book"}
            }
        }
    ]
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relata=info")),
        )
        .init();

    let mut conn = DbSettings::from_env().connect().await?;
    let registry = resolve(&FullConfig::from_json_str(MODELS)?)?;
    for (table, change) in registry.ensure_tables(&mut conn).await? {
        tracing::info!(%table, ?change, "table ready");
    }

    let authors = registry.model("author")?;
    let books = registry.model("book")?;

    let mut le_guin = Entity::new(authors.clone());
    le_guin.set_field("name", "Ursula K. Le Guin")?;
    le_guin.save(&mut conn).await?;
    let author_id = le_guin.get_id().cloned().unwrap_or_default();

    let titles = [
        ("A Wizard of Earthsea", "1968-11-01"),
        ("The Tombs of Atuan", "1971-01-01"),
        ("The Farthest Shore", "1972-09-01"),
        ("Tehanu", "1990-02-01"),
    ];
    let mut batch = Vec::new();
    for (title, published) in titles {
        let mut book = Entity::new(books.clone());
        book.set_field("title", title)?;
        book.set_field("author_id", author_id.clone())?;
        book.set_field("published", published)?;
        batch.push(book);
    }
    let report = save_many(&mut conn, &mut batch, SaveManyOptions::default()).await?;
    tracing::info!(state = ?report.state, saved = report.outcomes.len(), "batch saved");

    let sequels = registry.association("book", "sequels")?;
    for later in &batch[1..] {
        sequels.add(&mut conn, &batch[0], later).await?;
    }

    let early = WhereClause::from_json(&json!({
        "author_id": author_id,
        "published": {"before": "1980", "inclusive": true}
    }))?;
    let results = Query::new(
        books.clone(),
        early,
        QueryArgs::page(1, 2).order_by("published", Direction::Desc),
    )
    .get_results(&mut conn)
    .await?;
    println!(
        "{} books before 1980 ({} pages):",
        results.total_available(),
        results.total_pages()
    );
    for book in &results {
        println!("  {}", book.get_field("title").cloned().unwrap_or_default());
    }

    let last_id = batch[3].get_id().cloned().unwrap_or_default();
    let preceding = Query::new(
        books.clone(),
        WhereClause::new(Filter::default())
            .with_relationships(RelationFilter::new(Relation::Or).with("sequels", last_id)),
        QueryArgs::default(),
    )
    .get_results(&mut conn)
    .await?;
    println!("{} book(s) list Tehanu as a sequel", preceding.total_available());

    let owners = sequels.owners_of(&mut conn, &batch[3]).await?;
    if let Some(first) = owners.first() {
        let author = registry.related_one(&mut conn, first, "author").await?;
        println!(
            "first in series by {}",
            author
                .and_then(|a| a.get_field("name").cloned())
                .unwrap_or_default()
        );
    }
    Ok(())
}
