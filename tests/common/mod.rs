#![allow(dead_code)]

use relata::{resolve, DbSettings, FullConfig, Registry};
use sqlx::AnyConnection;

pub const MODELS: &str = r#"{
    "models": [
        {
            "name": "author",
            "table": "authors",
            "schema": {
                "fields": {
                    "id": "bigint unsigned NOT NULL AUTO_INCREMENT",
                    "name": "varchar(100) NOT NULL",
                    "email": "varchar(255)"
                },
                "indexes": ["PRIMARY KEY (id)", "UNIQUE KEY (email)"]
            },
            "relationships": {
                "profile": {"type": "has_one", "model": "profile"}
            }
        },
        {
            "name": "post",
            "table": "posts",
            "schema": {
                "fields": {
                    "id": "bigint unsigned NOT NULL AUTO_INCREMENT",
                    "author_id": "bigint unsigned",
                    "title": "varchar(255) NOT NULL",
                    "views": "int NOT NULL DEFAULT 0",
                    "published": "datetime"
                },
                "indexes": ["PRIMARY KEY (id)", "KEY (author_id)"]
            },
            "relationships": {
                "author": {"type": "belongs_to", "model": "author"},
                "tags": {"type": "many_to_many", "model": "tag"}
            }
        },
        {
            "name": "tag",
            "table": "tags",
            "schema": {
                "fields": {
                    "id": "bigint unsigned NOT NULL AUTO_INCREMENT",
                    "label": "varchar(50) NOT NULL"
                },
                "indexes": ["PRIMARY KEY (id)", "UNIQUE KEY (label)"]
            }
        },
        {
            "name": "profile",
            "table": "profiles",
            "schema": {
                "fields": {
                    "id": "bigint unsigned NOT NULL AUTO_INCREMENT",
                    "author_id": "bigint unsigned",
                    "bio": "text"
                },
                "indexes": ["PRIMARY KEY (id)", "KEY (author_id)"]
            }
        },
        {
            "name": "option",
            "table": "site_options",
            "schema": {
                "fields": {"option_name": "varchar(64) NOT NULL", "value": "text"},
                "indexes": ["PRIMARY KEY (option_name)"]
            },
            "read_only": true
        }
    ]
}"#;

pub fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relata=warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A fresh in-memory database per call.
pub async fn connect() -> AnyConnection {
    init_logs();
    DbSettings::new("sqlite::memory:")
        .connect()
        .await
        .expect("Could not open the in-memory database")
}

pub fn registry() -> Registry {
    resolve(&FullConfig::from_json_str(MODELS).expect("models parse")).expect("models resolve")
}

/// Connection with every writable table created.
pub async fn setup() -> (AnyConnection, Registry) {
    let mut conn = connect().await;
    let registry = registry();
    registry
        .ensure_tables(&mut conn)
        .await
        .expect("Could not create tables");
    (conn, registry)
}
