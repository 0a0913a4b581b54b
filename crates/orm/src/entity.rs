use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::naming::{NamingStrategy, capitalize, decapitalize};
use crate::property::PersistentProperty;

/// A serde type persisted as a table row.
///
/// Implementations describe the table once; the description is memoized per
/// type by [`entity_of`].
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct Book {
///     id: Option<i64>,
///     title: String,
///     total_pages: i32,
/// }
///
/// impl Entity for Book {
///     fn describe() -> PersistentEntity {
///         PersistentEntity::new("Book")
///             .with_schema("mydb")
///             .with_identity(PersistentProperty::new("id", DataType::Long))
///             .with_property(PersistentProperty::new("title", DataType::String))
///             .with_property(PersistentProperty::new("totalPages", DataType::Integer))
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Builds the entity metadata.
    fn describe() -> PersistentEntity;
}

static ENTITIES: LazyLock<DashMap<TypeId, Arc<PersistentEntity>>> = LazyLock::new(DashMap::new);

/// Metadata for `T`, described on first use and shared afterwards.
///
/// Concurrent first calls may both describe the type; the first stored
/// description wins and every caller receives it.
#[must_use]
pub fn entity_of<T: Entity>() -> Arc<PersistentEntity> {
    let key = TypeId::of::<T>();
    if let Some(entity) = ENTITIES.get(&key) {
        return Arc::clone(entity.value());
    }

    // describe outside the shard lock, associations may look up other types
    let described = Arc::new(T::describe());
    Arc::clone(ENTITIES.entry(key).or_insert(described).value())
}

/// Reference to the entity on the other side of an association.
///
/// Lazy references are resolved through [`entity_of`] when first followed,
/// which lets entities refer to each other.
#[derive(Clone)]
pub enum EntityRef {
    /// Metadata already built.
    Resolved(Arc<PersistentEntity>),
    /// Metadata looked up on demand.
    Lazy(fn() -> Arc<PersistentEntity>),
}

impl EntityRef {
    /// Lazy reference to the metadata of `T`.
    #[must_use]
    pub fn of<T: Entity>() -> Self {
        Self::Lazy(entity_of::<T>)
    }

    /// Resolves the referenced metadata.
    #[must_use]
    pub fn get(&self) -> Arc<PersistentEntity> {
        match self {
            Self::Resolved(entity) => Arc::clone(entity),
            Self::Lazy(resolve) => resolve(),
        }
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(entity) => f.debug_tuple("Resolved").field(&entity.name).finish(),
            Self::Lazy(_) => f.write_str("Lazy"),
        }
    }
}

impl From<Arc<PersistentEntity>> for EntityRef {
    fn from(entity: Arc<PersistentEntity>) -> Self {
        Self::Resolved(entity)
    }
}

impl From<PersistentEntity> for EntityRef {
    fn from(entity: PersistentEntity) -> Self {
        Self::Resolved(Arc::new(entity))
    }
}

/// A column of the entity's table, with embedded properties flattened.
#[derive(Debug, Clone)]
pub struct FlatColumn {
    /// Binding path: `title`, or `address.city` for embedded sub-properties.
    pub path: String,
    /// Column name, quoted when the entity escapes identifiers.
    pub column: String,
    /// The property holding the value (the sub-property when embedded).
    pub property: PersistentProperty,
    /// Whether the column belongs to the identity.
    pub identity: bool,
}

/// Table-level metadata for an entity.
#[derive(Debug, Clone)]
pub struct PersistentEntity {
    name: String,
    table: Option<String>,
    persisted_name: String,
    schema: Option<String>,
    naming: NamingStrategy,
    escape: bool,
    identity: Option<PersistentProperty>,
    properties: Vec<PersistentProperty>,
}

impl PersistentEntity {
    /// Creates metadata for the entity called `name`, using the default
    /// naming strategy.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let naming = NamingStrategy::default();
        Self {
            persisted_name: naming.mapped_entity_name(&name),
            name,
            table: None,
            schema: None,
            naming,
            escape: false,
            identity: None,
            properties: Vec::new(),
        }
    }

    /// Places the table in a schema.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Overrides the table name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        let table = table.into();
        self.persisted_name.clone_from(&table);
        self.table = Some(table);
        self
    }

    /// Backtick-quotes identifiers in generated SQL.
    #[must_use]
    pub const fn with_escape(mut self, escape: bool) -> Self {
        self.escape = escape;
        self
    }

    /// Switches the naming strategy, renaming every column that has no
    /// explicit override.
    #[must_use]
    pub fn with_naming(mut self, naming: NamingStrategy) -> Self {
        self.naming = naming;
        if self.table.is_none() {
            self.persisted_name = naming.mapped_entity_name(&self.name);
        }
        for property in self.properties.iter_mut().chain(self.identity.as_mut()) {
            property.apply_naming(naming);
        }
        self
    }

    /// Declares the identity property.
    #[must_use]
    pub fn with_identity(mut self, mut identity: PersistentProperty) -> Self {
        identity.apply_naming(self.naming);
        self.identity = Some(identity);
        self
    }

    /// Appends a persistent property.
    #[must_use]
    pub fn with_property(mut self, mut property: PersistentProperty) -> Self {
        property.apply_naming(self.naming);
        self.properties.push(property);
        self
    }

    /// Entity name, e.g. `Book`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unqualified table name.
    #[must_use]
    pub fn persisted_name(&self) -> &str {
        &self.persisted_name
    }

    /// Schema, if any.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Naming strategy.
    #[must_use]
    pub const fn naming(&self) -> NamingStrategy {
        self.naming
    }

    /// Whether identifiers are quoted.
    #[must_use]
    pub const fn escape(&self) -> bool {
        self.escape
    }

    /// Identity property, if declared.
    #[must_use]
    pub const fn identity(&self) -> Option<&PersistentProperty> {
        self.identity.as_ref()
    }

    /// Identity property, required by the caller.
    ///
    /// # Errors
    ///
    /// Returns a build error naming the entity when no identity is declared.
    pub fn required_identity(&self) -> Result<&PersistentProperty> {
        self.identity
            .as_ref()
            .ok_or_else(|| Error::build(format!("entity {} declares no identity", self.name)))
    }

    /// Persistent properties in declaration order, identity excluded.
    #[must_use]
    pub fn properties(&self) -> &[PersistentProperty] {
        &self.properties
    }

    /// Looks a property up by name, identity included.
    #[must_use]
    pub fn property_by_name(&self, name: &str) -> Option<&PersistentProperty> {
        self.properties.iter().chain(self.identity.as_ref()).find(|p| p.name() == name)
    }

    /// Entity name with a lower-case first letter.
    #[must_use]
    pub fn decapitalized_name(&self) -> String {
        decapitalize(&self.name)
    }

    /// Root alias used in SELECT statements, e.g. `book_`.
    #[must_use]
    pub fn alias_name(&self) -> String {
        format!(
            "{}_",
            NamingStrategy::UnderScoreSeparatedLowerCase.mapped_name(&self.decapitalized_name())
        )
    }

    /// Quotes an identifier when the entity escapes identifiers.
    #[must_use]
    pub fn quote(&self, identifier: &str) -> String {
        if self.escape { quote(identifier) } else { identifier.to_string() }
    }

    /// Table name qualified by schema, e.g. `mydb.book`.
    #[must_use]
    pub fn table_name(&self) -> String {
        let table = self.quote(&self.persisted_name);
        match &self.schema {
            Some(schema) => format!("{}.{table}", self.quote(schema)),
            None => table,
        }
    }

    /// Unquoted column name of an embedded sub-property.
    #[must_use]
    pub fn embedded_column_name(
        &self, owner: &PersistentProperty, sub: &PersistentProperty,
    ) -> String {
        sub.explicit_column().map_or_else(
            || self.naming.mapped_name(&format!("{}{}", owner.name(), capitalize(sub.name()))),
            ToString::to_string,
        )
    }

    /// Every column of the table: declared properties first, identity last.
    /// Foreign-key associations have no column and are skipped.
    #[must_use]
    pub fn flattened_columns(&self) -> Vec<FlatColumn> {
        let mut columns = Vec::with_capacity(self.properties.len() + 1);
        for property in &self.properties {
            self.flatten_into(property, false, &mut columns);
        }
        if let Some(identity) = &self.identity {
            self.flatten_into(identity, true, &mut columns);
        }
        columns
    }

    fn flatten_into(&self, property: &PersistentProperty, identity: bool, out: &mut Vec<FlatColumn>) {
        if property.is_foreign_key() {
            return;
        }
        if let Some(embedded) = property.as_embedded() {
            let embeddable = embedded.associated_entity();
            for sub in embeddable.properties() {
                out.push(FlatColumn {
                    path: format!("{}.{}", property.name(), sub.name()),
                    column: self.quote(&self.embedded_column_name(property, sub)),
                    property: sub.clone(),
                    identity,
                });
            }
            return;
        }
        out.push(FlatColumn {
            path: property.name().to_string(),
            column: self.quote(property.persisted_name()),
            property: property.clone(),
            identity,
        });
    }

    /// Foreign-key associations that are linked through a join table.
    pub fn join_table_associations(&self) -> impl Iterator<Item = &PersistentProperty> {
        self.properties.iter().filter(|property| {
            property.as_association().is_some_and(|a| a.is_foreign_key_with_join_table())
        })
    }
}

/// Backtick-quotes an identifier.
#[must_use]
pub fn quote(identifier: &str) -> String {
    format!("`{identifier}`")
}
