//! Entity metadata to SQL, and entity values to positional arguments.
//!
//! Compiles declarative entity and query metadata into SQL text for
//! cache-backed SQL engines (backtick-quoted identifiers, `?` placeholders,
//! `OFFSET n ROWS FETCH NEXT m ROWS ONLY` paging), binds entity instances
//! positionally, executes through a [`Cache`] and decodes rows back into
//! scalars or DTOs.
//!
//! # Quick Start
//!
//! ## Describe an Entity
//!
//! ```ignore
//! use kiln_orm::{DataType, Entity, PersistentEntity, PersistentProperty};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Book {
//!     id: i64,
//!     title: String,
//!     #[serde(rename = "totalPages")]
//!     total_pages: i32,
//! }
//!
//! impl Entity for Book {
//!     fn describe() -> PersistentEntity {
//!         PersistentEntity::new("Book")
//!             .with_schema("mydb")
//!             .with_identity(PersistentProperty::new("id", DataType::Long))
//!             .with_property(PersistentProperty::new("title", DataType::String))
//!             .with_property(PersistentProperty::new("totalPages", DataType::Integer))
//!     }
//! }
//!
//! // CREATE TABLE mydb.book (title VARCHAR,totalPages INT,id BIGINT PRIMARY KEY);
//! let ddl = build_create_table_statements(&entity_of::<Book>())?;
//! ```
//!
//! ## Query
//!
//! ```ignore
//! let model = QueryModel::of::<Book>()
//!     .project(Projection::Properties(vec!["title".into()]))
//!     .filter(Criterion::is_in("id", 0))
//!     .join("author", JoinType::Left);
//! let query = PreparedQuery::from_model(&model)?
//!     .dto(["title"])
//!     .with_pageable(Pageable::from(0, 20));
//!
//! let titles: Vec<Title> = operations.find_all(&repository, &query, &[ids])?;
//! ```
//!
//! ## Persist
//!
//! ```ignore
//! let repository = RepositoryDescriptor::generated("BookRepository", "books");
//! let book = operations.persist(&repository, book)?;
//! ```

mod bind;
mod cache;
mod clock;
mod codec;
mod ddl;
mod decode;
mod delete;
mod entity;
mod error;
mod filter;
mod insert;
mod join;
mod naming;
mod operations;
mod page;
mod prepare;
mod property;
mod query;
mod schema;
mod select;
mod update;
mod value;

pub use bind::{Bean, BindMode, Cascade, ParameterBinder};
pub use cache::{Cache, CacheProvider, Cursor};
pub use clock::{Clock, SystemClock};
pub use codec::{JsonCodec, SerdeJsonCodec};
pub use ddl::{
    build_create_table_statements, build_drop_table_statements, join_table_name,
    resolve_join_table_columns,
};
pub use decode::{ResultDecoder, check_projection};
pub use delete::build_delete;
pub use entity::{Entity, EntityRef, FlatColumn, PersistentEntity, entity_of, quote};
pub use error::{Error, Result};
pub use filter::Criterion;
pub use insert::{build_insert, build_join_table_insert};
pub use join::{JoinPath, JoinType};
pub use naming::NamingStrategy;
pub use operations::{RepositoryDescriptor, RepositoryOperations};
pub use page::{Direction, Order, Pageable, Sort, build_pagination};
pub use prepare::{
    LAST_UPDATED, ParameterBinding, PreparedQuery, ResultKind, Statement, StatementPreparer,
};
pub use property::{
    Association, AssociationKind, AutoPopulated, DataType, JoinTable, PersistentProperty,
    PropertyAccessor,
};
pub use query::{IN_EXPRESSION_END, IN_EXPRESSION_START, QueryResult, in_expression_marker};
pub use schema::{DataSourceOptions, SchemaGenerate, SchemaGenerator};
pub use select::{Projection, QueryModel, build_order_by, build_query, select_all_columns};
pub use update::build_update;
pub use value::{Value, parse_timestamp};
