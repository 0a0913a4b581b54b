//! End-to-end tests: schema generation, persistence and queries against an
//! in-memory `SQLite` database.

#![allow(missing_docs)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kiln_orm::{
    AutoPopulated, CacheProvider, Criterion, DataSourceOptions, DataType, Entity, JoinType,
    PersistentEntity, PersistentProperty, PreparedQuery, Projection, QueryModel,
    RepositoryDescriptor, RepositoryOperations, SchemaGenerator, Value, build_delete, entity_of,
};
use kiln_sqlite::{ConnectOptions, SqliteProvider};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Book {
    id: i64,
    title: String,
    total_pages: i32,
    published: bool,
}

impl Entity for Book {
    fn describe() -> PersistentEntity {
        PersistentEntity::new("Book")
            .with_identity(PersistentProperty::new("id", DataType::Long))
            .with_property(PersistentProperty::new("title", DataType::String))
            .with_property(PersistentProperty::new("totalPages", DataType::Integer))
            .with_property(PersistentProperty::new("published", DataType::Boolean))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ticket {
    id: Option<Uuid>,
    holder: String,
    issued: Option<DateTime<Utc>>,
}

impl Entity for Ticket {
    fn describe() -> PersistentEntity {
        PersistentEntity::new("Ticket")
            .with_identity(
                PersistentProperty::new("id", DataType::Uuid)
                    .with_auto_populated(AutoPopulated::Generated),
            )
            .with_property(PersistentProperty::new("holder", DataType::String))
            .with_property(
                PersistentProperty::new("issued", DataType::Timestamp)
                    .with_auto_populated(AutoPopulated::Created),
            )
    }
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookSummary {
    title: String,
    total_pages: i32,
    published: bool,
}

struct Fixture {
    provider: Arc<dyn CacheProvider>,
    operations: RepositoryOperations,
    repository: RepositoryDescriptor,
}

fn fixture() -> Fixture {
    let provider: Arc<dyn CacheProvider> = Arc::new(
        SqliteProvider::connect_with(ConnectOptions {
            database: ":memory:".to_string(),
        })
        .expect("connect"),
    );

    let options = DataSourceOptions {
        name: "e2e".to_string(),
        client: "default".to_string(),
        cache: "library".to_string(),
        schema_generate: "create-drop".to_string(),
    };
    SchemaGenerator::new(Arc::clone(&provider), options)
        .generate(&[entity_of::<Book>(), entity_of::<Ticket>()])
        .expect("schema");

    Fixture {
        operations: RepositoryOperations::new(Arc::clone(&provider)),
        repository: RepositoryDescriptor::generated("LibraryRepository", "library"),
        provider,
    }
}

fn seed(fixture: &Fixture) {
    let books = [(1, "Dune", 412, true), (2, "Emma", 474, true), (3, "Draft", 12, false)].map(
        |(id, title, total_pages, published)| Book {
            id,
            title: title.to_string(),
            total_pages,
            published,
        },
    );
    fixture.operations.persist_all(&fixture.repository, books).expect("persist");
}

#[test]
fn persisted_rows_are_queryable() {
    let fixture = fixture();
    seed(&fixture);

    let query = PreparedQuery::from_model(
        &QueryModel::of::<Book>()
            .project(Projection::Properties(vec!["title".to_string()]))
            .filter(Criterion::gt("totalPages", 0)),
    )
    .unwrap();
    let mut titles: Vec<String> =
        fixture.operations.find_all(&fixture.repository, &query, &[Value::Int(100)]).unwrap();
    titles.sort();
    assert_eq!(titles, vec!["Dune", "Emma"]);

    let count = PreparedQuery::from_model(&QueryModel::of::<Book>().project(Projection::Count)).unwrap();
    let total: Option<i64> = fixture.operations.find_one(&fixture.repository, &count, &[]).unwrap();
    assert_eq!(total, Some(3));
}

#[test]
fn dto_projection_reads_columns_by_name() {
    let fixture = fixture();
    seed(&fixture);

    let model = QueryModel::of::<Book>()
        .project(Projection::Properties(vec![
            "title".to_string(),
            "totalPages".to_string(),
            "published".to_string(),
        ]))
        .filter(Criterion::eq("id", 0));
    let query = PreparedQuery::from_model(&model).unwrap().dto(["title", "totalPages", "published"]);

    let summary: Option<BookSummary> =
        fixture.operations.find_one(&fixture.repository, &query, &[Value::Long(3)]).unwrap();
    assert_eq!(
        summary,
        Some(BookSummary {
            title: "Draft".to_string(),
            total_pages: 12,
            published: false,
        })
    );
}

#[test]
fn in_lists_expand_and_empty_lists_match_nothing() {
    let fixture = fixture();
    seed(&fixture);

    let model = QueryModel::of::<Book>()
        .project(Projection::Properties(vec!["id".to_string()]))
        .filter(Criterion::is_in("id", 0))
        .filter(Criterion::eq("published", 1));
    let query = PreparedQuery::from_model(&model).unwrap();

    let ids: Value = vec![1_i64, 3].into_iter().collect();
    let found: Vec<i64> =
        fixture.operations.find_all(&fixture.repository, &query, &[ids, Value::Boolean(true)]).unwrap();
    assert_eq!(found, vec![1]);

    let none: Vec<i64> = fixture
        .operations
        .find_all(&fixture.repository, &query, &[Value::List(vec![]), Value::Boolean(true)])
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn exists_and_delete() {
    let fixture = fixture();
    seed(&fixture);

    let by_title = PreparedQuery::from_model(
        &QueryModel::of::<Book>()
            .project(Projection::Properties(vec!["id".to_string()]))
            .filter(Criterion::eq("title", 0)),
    )
    .unwrap();
    assert!(fixture.operations.exists(&fixture.repository, &by_title, &["Emma".into()]).unwrap());

    let delete = PreparedQuery::new(
        entity_of::<Book>(),
        build_delete(&QueryModel::of::<Book>().filter(Criterion::eq("title", 0))).unwrap(),
    )
    .mutating();
    let deleted =
        fixture.operations.execute_update(&fixture.repository, &delete, &["Emma".into()]).unwrap();
    assert_eq!(deleted, 1);
    assert!(!fixture.operations.exists(&fixture.repository, &by_title, &["Emma".into()]).unwrap());
}

#[test]
fn generated_identity_round_trips() {
    let fixture = fixture();

    let ticket = fixture
        .operations
        .persist(
            &fixture.repository,
            Ticket {
                id: None,
                holder: "Ann".to_string(),
                issued: None,
            },
        )
        .unwrap();
    let id = ticket.id.expect("generated id");
    assert!(ticket.issued.is_some());

    let model = QueryModel::of::<Ticket>()
        .project(Projection::Properties(vec!["holder".to_string()]))
        .filter(Criterion::eq("id", 0));
    let query = PreparedQuery::from_model(&model).unwrap();
    let holder: Option<String> =
        fixture.operations.find_one(&fixture.repository, &query, &[Value::Uuid(id)]).unwrap();
    assert_eq!(holder.as_deref(), Some("Ann"));

    let renamed = fixture
        .operations
        .update(
            &fixture.repository,
            Ticket {
                holder: "Bea".to_string(),
                ..ticket
            },
        )
        .unwrap();
    assert_eq!(renamed.id, Some(id));
    let holder: Option<String> =
        fixture.operations.find_one(&fixture.repository, &query, &[Value::Uuid(id)]).unwrap();
    assert_eq!(holder.as_deref(), Some("Bea"));
}

#[test]
fn engine_errors_surface_as_execution_errors() {
    let fixture = fixture();
    let cache = fixture.provider.cache("library").unwrap();
    cache.execute("DROP TABLE book", &[]).unwrap();

    let query = PreparedQuery::from_model(&QueryModel::of::<Book>()).unwrap();
    let err = fixture.operations.find_all::<i64>(&fixture.repository, &query, &[]).unwrap_err();
    assert!(matches!(err, kiln_orm::Error::Execution(_)));

    // join on a plain column never reaches the engine
    let err = PreparedQuery::from_model(&QueryModel::of::<Book>().join("title", JoinType::Inner))
        .unwrap_err();
    assert!(matches!(err, kiln_orm::Error::Build(_)));
}
