//! Integration tests for repository operations against a recording cache.

#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use common::{
    Author, Book, FixedClock, Genre, Novel, RecordingCache, RecordingProvider, Token,
    placeholder_count,
};
use kiln_orm::{
    Association, AssociationKind, AutoPopulated, Criterion, DataSourceOptions, DataType, Entity,
    EntityRef, Error, Pageable, PersistentEntity, PersistentProperty, PreparedQuery, Projection,
    QueryModel, RepositoryDescriptor, RepositoryOperations, ResultKind, SchemaGenerator, Value,
    entity_of,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, PartialEq)]
struct Title {
    title: String,
}

fn operations(provider: &Arc<RecordingProvider>) -> RepositoryOperations {
    RepositoryOperations::new(Arc::clone(provider) as Arc<dyn kiln_orm::CacheProvider>)
}

fn library() -> RepositoryDescriptor {
    RepositoryDescriptor::generated("NovelRepository", "library")
}

// persist

#[test]
fn persist_assigns_generated_uuid() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
    let ops = operations(&provider).with_clock(Arc::new(FixedClock(now)));

    let token = ops
        .persist(
            &library(),
            Token {
                id: None,
                name: "api".to_string(),
                created: None,
            },
        )
        .unwrap();

    let id = token.id.expect("generated id is written back");
    assert_eq!(token.created, Some(now));

    let writes = provider.cache.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].sql, "INSERT INTO token (name,created,id) VALUES (?,?,?)");
    assert_eq!(
        writes[0].args,
        vec![Value::from("api"), Value::Timestamp(now), Value::Uuid(id)]
    );
    assert_eq!(provider.names(), vec!["library"]);
}

#[test]
fn persist_cascades_references_first() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let ops = operations(&provider);

    let novel = ops
        .persist(
            &library(),
            Novel {
                id: 1,
                title: "Dune".to_string(),
                author: Some(Author {
                    id: None,
                    name: "Frank".to_string(),
                }),
                genres: vec![Genre {
                    id: None,
                    name: "Science Fiction".to_string(),
                }],
            },
        )
        .unwrap();

    let author_id = novel.author.as_ref().and_then(|a| a.id).expect("author persisted");
    let genre_id = novel.genres[0].id.expect("genre persisted");

    assert_eq!(
        provider.cache.write_sql(),
        vec![
            "INSERT INTO author (name,id) VALUES (?,?)",
            "INSERT INTO novel (title,author_id,id) VALUES (?,?,?)",
            "INSERT INTO genre (name,id) VALUES (?,?)",
            "INSERT INTO novel_genres (novel_id,genre_id) VALUES (?, ?)",
        ]
    );

    let writes = provider.cache.writes();
    assert_eq!(writes[1].args, vec![Value::from("Dune"), Value::Uuid(author_id), Value::Long(1)]);
    assert_eq!(writes[3].args, vec![Value::Long(1), Value::Uuid(genre_id)]);
    for write in &writes {
        assert_eq!(write.args.len(), placeholder_count(&write.sql), "{}", write.sql);
    }
}

#[test]
fn persisted_references_are_not_reinserted() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let author_id = uuid::Uuid::new_v4();

    operations(&provider)
        .persist(
            &library(),
            Novel {
                id: 2,
                title: "Emma".to_string(),
                author: Some(Author {
                    id: Some(author_id),
                    name: "Jane".to_string(),
                }),
                genres: vec![],
            },
        )
        .unwrap();

    let writes = provider.cache.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].args[1], Value::Uuid(author_id));
}

// identity assigned by the database, so it is unknown until the row exists
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Imprint {
    id: Option<i64>,
    name: String,
}

impl Entity for Imprint {
    fn describe() -> PersistentEntity {
        PersistentEntity::new("Imprint")
            .with_identity(PersistentProperty::new("id", DataType::Long).generated())
            .with_property(PersistentProperty::new("name", DataType::String))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Magazine {
    id: i64,
    imprint: Option<Imprint>,
    #[serde(default)]
    partners: Vec<Imprint>,
}

impl Entity for Magazine {
    fn describe() -> PersistentEntity {
        PersistentEntity::new("Magazine")
            .with_identity(PersistentProperty::new("id", DataType::Long))
            .with_property(PersistentProperty::association(
                "imprint",
                Association::new(AssociationKind::ManyToOne, EntityRef::of::<Imprint>())
                    .cascade_persist(),
            ))
            .with_property(PersistentProperty::association(
                "partners",
                Association::new(AssociationKind::ManyToMany, EntityRef::of::<Imprint>())
                    .cascade_persist(),
            ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Pamphlet {
    id: i64,
    author: Option<Author>,
    slug: Option<String>,
}

impl Entity for Pamphlet {
    fn describe() -> PersistentEntity {
        PersistentEntity::new("Pamphlet")
            .with_identity(PersistentProperty::new("id", DataType::Long))
            .with_property(PersistentProperty::association(
                "author",
                Association::new(AssociationKind::ManyToOne, EntityRef::of::<Author>())
                    .cascade_persist(),
            ))
            .with_property(
                PersistentProperty::new("slug", DataType::String)
                    .with_auto_populated(AutoPopulated::Custom("slugify".to_string())),
            )
    }
}

fn imprint(name: &str) -> Imprint {
    Imprint {
        id: None,
        name: name.to_string(),
    }
}

#[test]
fn cascaded_reference_without_identity_is_rejected() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let magazine = Magazine {
        id: 1,
        imprint: Some(imprint("Vintage")),
        partners: vec![],
    };

    let err = operations(&provider).persist(&library(), magazine).unwrap_err();
    assert!(matches!(err, Error::Build(_)), "{err}");
    assert!(err.to_string().contains("referenced entity Imprint has no identity"), "{err}");
    assert!(provider.cache.writes().is_empty());
}

#[test]
fn cascaded_join_row_without_identity_is_rejected() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let magazine = Magazine {
        id: 1,
        imprint: None,
        partners: vec![imprint("Penguin")],
    };

    let err = operations(&provider).persist(&library(), magazine).unwrap_err();
    assert!(matches!(err, Error::Build(_)), "{err}");
    assert!(err.to_string().contains("[partners]"), "{err}");
    assert!(provider.cache.writes().is_empty());
}

#[test]
fn late_binding_failure_leaves_cascades_unwritten() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let pamphlet = Pamphlet {
        id: 1,
        author: Some(Author {
            id: None,
            name: "Frank".to_string(),
        }),
        slug: None,
    };

    let err = operations(&provider).persist(&library(), pamphlet).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)), "{err}");
    assert!(provider.cache.writes().is_empty());
    assert!(provider.names().is_empty());
}

#[test]
fn persist_all_writes_row_by_row() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let books = (1..=3).map(|id| Book {
        id,
        title: format!("Volume {id}"),
        total_pages: 100,
    });

    let persisted = operations(&provider).persist_all(&library(), books).unwrap();
    assert_eq!(persisted.len(), 3);

    let writes = provider.cache.writes();
    assert_eq!(writes.len(), 3);
    assert!(writes.iter().all(|w| w.sql == "INSERT INTO mydb.book (title,totalPages,id) VALUES (?,?,?)"));
    assert_eq!(writes[2].args[2], Value::Long(3));
}

#[test]
fn declared_statements_are_used() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let mut insert = kiln_orm::build_insert(&entity_of::<Book>()).unwrap();
    insert.query = "INSERT INTO mydb.book (title,totalPages,id) VALUES (?,?,?) -- declared".to_string();
    let repository = RepositoryDescriptor::new("BookRepository", "books").with_insert(insert);

    operations(&provider)
        .persist(
            &repository,
            Book {
                id: 1,
                title: "Dune".to_string(),
                total_pages: 412,
            },
        )
        .unwrap();
    assert!(provider.cache.write_sql()[0].ends_with("-- declared"));
}

#[test]
fn missing_insert_fails_before_execution() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let repository = RepositoryDescriptor::new("BookRepository", "books");

    let err = operations(&provider)
        .persist(
            &repository,
            Book {
                id: 1,
                title: "Dune".to_string(),
                total_pages: 412,
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("BookRepository"));
    assert!(provider.cache.writes().is_empty());
}

#[test]
fn update_keeps_creation_timestamp() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let created = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let id = uuid::Uuid::new_v4();

    let updated = operations(&provider)
        .update(
            &library(),
            Token {
                id: Some(id),
                name: "renamed".to_string(),
                created: Some(created),
            },
        )
        .unwrap();
    assert_eq!(updated.created, Some(created));

    let writes = provider.cache.writes();
    assert_eq!(writes[0].sql, "UPDATE token SET name=? WHERE id=?");
    assert_eq!(writes[0].args, vec![Value::from("renamed"), Value::Uuid(id)]);
}

// queries

#[test]
fn dto_reads_projected_column_by_name() {
    let provider = RecordingProvider::new(RecordingCache::with_rows(
        &["id", "title"],
        vec![vec![Value::Long(1), Value::from("Dune")], vec![Value::Long(2), Value::from("Emma")]],
    ));
    let query = PreparedQuery::from_model(&QueryModel::of::<Book>()).unwrap().dto(["title"]);

    let titles: Vec<Title> = operations(&provider).find_all(&library(), &query, &[]).unwrap();
    assert_eq!(
        titles,
        vec![Title { title: "Dune".to_string() }, Title { title: "Emma".to_string() }]
    );
    assert_eq!(provider.cache.open_cursors(), 0);
}

#[test]
fn find_one_reads_first_scalar() {
    let provider =
        RecordingProvider::new(RecordingCache::with_rows(&["c"], vec![vec![Value::Long(42)]]));
    let query =
        PreparedQuery::from_model(&QueryModel::of::<Book>().project(Projection::Count)).unwrap();

    let count: Option<i64> = operations(&provider).find_one(&library(), &query, &[]).unwrap();
    assert_eq!(count, Some(42));

    let empty = RecordingProvider::new(RecordingCache::new());
    let none: Option<i64> = operations(&empty).find_one(&library(), &query, &[]).unwrap();
    assert_eq!(none, None);
}

#[test]
fn find_stream_releases_cursor() {
    let provider = RecordingProvider::new(RecordingCache::with_rows(
        &["title"],
        vec![vec![Value::from("a")], vec![Value::from("b")]],
    ));
    let query = PreparedQuery::sql::<Book>("SELECT book_.title FROM mydb.book book_", vec![]);

    let titles = operations(&provider).find_stream::<String>(&library(), &query, &[]).unwrap();
    assert_eq!(provider.cache.open_cursors(), 0);
    assert_eq!(titles.collect::<Vec<_>>(), vec!["a", "b"]);
}

#[test]
fn exists_stops_after_first_row() {
    let provider = RecordingProvider::new(RecordingCache::with_rows(
        &["id"],
        vec![vec![Value::Long(1)], vec![Value::Long(2)], vec![Value::Long(3)]],
    ));
    let query = PreparedQuery::from_model(
        &QueryModel::of::<Book>().filter(Criterion::eq("title", 0)),
    )
    .unwrap();

    assert!(operations(&provider).exists(&library(), &query, &["Dune".into()]).unwrap());
    assert_eq!(provider.cache.rows_served(), 1);
    assert_eq!(provider.cache.open_cursors(), 0);

    let empty = RecordingProvider::new(RecordingCache::new());
    assert!(!operations(&empty).exists(&library(), &query, &["Dune".into()]).unwrap());
}

#[test]
fn queries_are_prepared_before_execution() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let query = PreparedQuery::from_model(&QueryModel::of::<Book>().filter(Criterion::is_in("id", 0)))
        .unwrap()
        .with_pageable(Pageable::from(2, 5))
        .in_cache("archive");

    let ids: Value = vec![4_i64, 5].into_iter().collect();
    let _: Vec<i64> = operations(&provider).find_all(&library(), &query, &[ids]).unwrap();

    let queries = provider.cache.queries();
    assert_eq!(
        queries[0].sql,
        "SELECT book_.title,book_.totalPages,book_.id FROM mydb.book book_ WHERE (book_.id IN(?,?)) OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY "
    );
    assert_eq!(queries[0].args, vec![Value::Long(4), Value::Long(5)]);
    assert_eq!(provider.names(), vec!["archive"]);
}

#[test]
fn execute_update_counts_rows() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let query = PreparedQuery::new(
        entity_of::<Book>(),
        kiln_orm::build_delete(&QueryModel::of::<Book>().filter(Criterion::eq("title", 0))).unwrap(),
    )
    .mutating()
    .with_pageable(Pageable::from(1, 10));

    let count = operations(&provider).execute_update(&library(), &query, &["Dune".into()]).unwrap();
    assert_eq!(count, 1);
    assert_eq!(provider.cache.write_sql(), vec!["DELETE FROM mydb.book WHERE (title = ?)"]);
}

// failures

#[test]
fn unknown_dto_field_fails_before_execution() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let query = PreparedQuery::from_model(&QueryModel::of::<Book>()).unwrap().dto(["isbn"]);

    let err = operations(&provider).find_all::<Title>(&library(), &query, &[]).unwrap_err();
    assert!(matches!(err, Error::Build(_)));
    assert!(err.to_string().contains("isbn"));
    assert!(err.to_string().contains("Book"));
    assert!(provider.cache.queries().is_empty());
}

#[test]
fn entity_results_are_unsupported() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let query = PreparedQuery::from_model(&QueryModel::of::<Book>())
        .unwrap()
        .with_result(ResultKind::Entity);

    let err = operations(&provider).find_one::<Book>(&library(), &query, &[]).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
    assert!(provider.cache.queries().is_empty());
}

#[test]
fn undeclared_operations_are_unsupported() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let ops = operations(&provider);

    let err = ops.find_by_id::<Book>(&library(), &Value::Long(1)).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
    let err = ops.count::<Book>(&library()).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
    let err = ops.delete_all::<Book>(&library(), &[]).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn execution_errors_pass_through() {
    let provider = RecordingProvider::new(RecordingCache::failing("SELECT"));
    let query = PreparedQuery::from_model(&QueryModel::of::<Book>()).unwrap();

    let err = operations(&provider).find_all::<i64>(&library(), &query, &[]).unwrap_err();
    assert!(matches!(err, Error::Execution(_)));
    assert!(err.to_string().contains("cache rejected statement"));
}

// schema generation

fn data_source(mode: &str) -> DataSourceOptions {
    DataSourceOptions {
        name: "default".to_string(),
        client: "default".to_string(),
        cache: "library".to_string(),
        schema_generate: mode.to_string(),
    }
}

#[test]
fn create_drop_drops_then_creates() {
    let provider = RecordingProvider::new(RecordingCache::failing("DROP"));
    let generator = SchemaGenerator::new(
        Arc::clone(&provider) as Arc<dyn kiln_orm::CacheProvider>,
        data_source("create-drop"),
    );

    generator.generate(&[entity_of::<Novel>(), entity_of::<Genre>()]).unwrap();
    assert_eq!(
        provider.cache.write_sql(),
        vec![
            "CREATE TABLE novel_genres (novel_id BIGINT,genre_id UUID)",
            "CREATE TABLE novel (title VARCHAR,author_id UUID,id BIGINT PRIMARY KEY);",
            "CREATE TABLE genre (name VARCHAR,id UUID PRIMARY KEY);",
        ]
    );
}

#[test]
fn schema_generation_modes() {
    let provider = RecordingProvider::new(RecordingCache::new());
    let generate = |mode: &str| {
        SchemaGenerator::new(
            Arc::clone(&provider) as Arc<dyn kiln_orm::CacheProvider>,
            data_source(mode),
        )
        .generate(&[entity_of::<Book>()])
    };

    generate("none").unwrap();
    assert!(provider.cache.writes().is_empty());

    generate("CREATE").unwrap();
    assert_eq!(provider.cache.write_sql().len(), 1);

    let err = generate("validate").unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}
