use serde_json::{Map, Value as JsonValue};

use crate::entity::{EntityRef, PersistentEntity};
use crate::naming::NamingStrategy;

/// Semantic type of a persistent property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Text.
    String,
    /// 64-bit integer.
    Long,
    /// 32-bit integer.
    Integer,
    /// 16-bit integer.
    Short,
    /// 8-bit integer.
    Byte,
    /// Single character.
    Character,
    /// Boolean.
    Boolean,
    /// UUID.
    Uuid,
    /// Point in time.
    Timestamp,
    /// Calendar date.
    Date,
    /// Arbitrary precision decimal.
    BigDecimal,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Binary blob.
    ByteArray,
    /// Structured document stored through the JSON codec.
    Json,
    /// Reference to another entity.
    Entity,
    /// Anything else; has no column mapping.
    Object,
}

/// How the binder fills a property that the caller does not set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoPopulated {
    /// Set to the current time on insert.
    Created,
    /// Set to the current time on insert and update.
    Updated,
    /// Assigned a fresh random identifier when unset. UUID properties only.
    Generated,
    /// A population strategy the binder does not know how to apply.
    Custom(String),
}

/// Kind of relationship an association expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationKind {
    /// One to one.
    OneToOne,
    /// Many to one; the owner table holds the reference column.
    ManyToOne,
    /// One to many.
    OneToMany,
    /// Many to many.
    ManyToMany,
    /// Sub-properties are flattened into the owner's columns.
    Embedded,
}

/// Explicit join table mapping for a foreign-key association.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinTable {
    /// Join table name; derived through the naming strategy when absent.
    pub name: Option<String>,
    /// Join column overrides. Exactly two (owner, associated) when present.
    pub columns: Vec<String>,
}

/// A property referencing another persistent entity.
#[derive(Debug, Clone)]
pub struct Association {
    kind: AssociationKind,
    associated: EntityRef,
    mapped_by: Option<String>,
    join_table: Option<JoinTable>,
    cascade_persist: bool,
}

impl Association {
    /// Creates an association of the given kind.
    #[must_use]
    pub const fn new(kind: AssociationKind, associated: EntityRef) -> Self {
        Self {
            kind,
            associated,
            mapped_by: None,
            join_table: None,
            cascade_persist: false,
        }
    }

    /// Marks this as the inverse side of `property` on the associated entity.
    #[must_use]
    pub fn mapped_by(mut self, property: impl Into<String>) -> Self {
        self.mapped_by = Some(property.into());
        self
    }

    /// Overrides the join table used by a foreign-key association.
    #[must_use]
    pub fn join_table(mut self, join_table: JoinTable) -> Self {
        self.join_table = Some(join_table);
        self
    }

    /// Persist referenced entities whose identity is unset before the owner.
    #[must_use]
    pub const fn cascade_persist(mut self) -> Self {
        self.cascade_persist = true;
        self
    }

    /// The association kind.
    #[must_use]
    pub const fn kind(&self) -> AssociationKind {
        self.kind
    }

    /// The referenced entity.
    #[must_use]
    pub fn associated_entity(&self) -> std::sync::Arc<PersistentEntity> {
        self.associated.get()
    }

    /// Property on the associated entity owning the relationship.
    #[must_use]
    pub fn mapped_by_property(&self) -> Option<&str> {
        self.mapped_by.as_deref()
    }

    /// Explicit join table mapping, if any.
    #[must_use]
    pub const fn join_table_mapping(&self) -> Option<&JoinTable> {
        self.join_table.as_ref()
    }

    /// Whether referenced entities are persisted first.
    #[must_use]
    pub const fn cascades_persist(&self) -> bool {
        self.cascade_persist
    }

    /// True when the owner table holds no column for this association.
    #[must_use]
    pub const fn is_foreign_key(&self) -> bool {
        match self.kind {
            AssociationKind::OneToMany | AssociationKind::ManyToMany => true,
            AssociationKind::OneToOne => self.mapped_by.is_some(),
            AssociationKind::ManyToOne | AssociationKind::Embedded => false,
        }
    }

    /// True for foreign-key associations that are linked through a join table.
    #[must_use]
    pub const fn is_foreign_key_with_join_table(&self) -> bool {
        self.is_foreign_key() && self.mapped_by.is_none()
    }

    /// True for embedded associations.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.kind == AssociationKind::Embedded
    }
}

/// Reads and writes one property on a serialized entity instance.
///
/// Resolved once when the property is declared and reused for every bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyAccessor {
    key: String,
}

impl PropertyAccessor {
    /// Current value; `null` when the instance does not carry the property.
    #[must_use]
    pub fn read<'a>(&self, bean: &'a Map<String, JsonValue>) -> &'a JsonValue {
        bean.get(&self.key).unwrap_or(&JsonValue::Null)
    }

    /// Mutable access to a present value.
    pub fn read_mut<'a>(&self, bean: &'a mut Map<String, JsonValue>) -> Option<&'a mut JsonValue> {
        bean.get_mut(&self.key)
    }

    /// Replaces the value.
    pub fn write(&self, bean: &mut Map<String, JsonValue>, value: JsonValue) {
        bean.insert(self.key.clone(), value);
    }
}

/// A persistent property of an entity.
#[derive(Debug, Clone)]
pub struct PersistentProperty {
    name: String,
    column: Option<String>,
    persisted_name: String,
    data_type: DataType,
    generated: bool,
    auto_populated: Option<AutoPopulated>,
    required: bool,
    enumerated: bool,
    definition: Option<String>,
    association: Option<Association>,
    accessor: PropertyAccessor,
}

impl PersistentProperty {
    /// Creates a scalar property.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        Self {
            persisted_name: name.clone(),
            accessor: PropertyAccessor { key: name.clone() },
            name,
            column: None,
            data_type,
            generated: false,
            auto_populated: None,
            required: false,
            enumerated: false,
            definition: None,
            association: None,
        }
    }

    /// Creates an association property.
    #[must_use]
    pub fn association(name: impl Into<String>, association: Association) -> Self {
        let mut property = Self::new(name, DataType::Entity);
        property.association = Some(association);
        property
    }

    /// Creates an embedded property whose sub-properties become columns of
    /// the owner.
    #[must_use]
    pub fn embedded(name: impl Into<String>, embeddable: EntityRef) -> Self {
        Self::association(name, Association::new(AssociationKind::Embedded, embeddable))
    }

    /// Overrides the column name.
    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        self.persisted_name.clone_from(&column);
        self.column = Some(column);
        self
    }

    /// Overrides the column definition emitted by CREATE TABLE.
    #[must_use]
    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    /// Marks the value as generated by the database.
    #[must_use]
    pub const fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    /// Marks the property as auto-populated by the binder.
    #[must_use]
    pub fn with_auto_populated(mut self, kind: AutoPopulated) -> Self {
        self.auto_populated = Some(kind);
        self
    }

    /// Marks the property as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks a string property as holding an enum variant.
    #[must_use]
    pub const fn enumerated(mut self) -> Self {
        self.enumerated = true;
        self
    }

    /// Property name, as serialized by serde.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column name.
    #[must_use]
    pub fn persisted_name(&self) -> &str {
        &self.persisted_name
    }

    /// Explicit column override, if one was declared.
    #[must_use]
    pub fn explicit_column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    /// Semantic data type.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Whether the database generates the value.
    #[must_use]
    pub const fn is_generated(&self) -> bool {
        self.generated
    }

    /// Auto-population kind, if any.
    #[must_use]
    pub const fn auto_populated(&self) -> Option<&AutoPopulated> {
        self.auto_populated.as_ref()
    }

    /// Whether the property is required.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Whether the property holds an enum variant.
    #[must_use]
    pub const fn is_enum(&self) -> bool {
        self.enumerated
    }

    /// Explicit column definition, if any.
    #[must_use]
    pub fn definition(&self) -> Option<&str> {
        self.definition.as_deref()
    }

    /// Association details when the property references another entity.
    #[must_use]
    pub const fn as_association(&self) -> Option<&Association> {
        self.association.as_ref()
    }

    /// The embedded association, if this property is embedded.
    #[must_use]
    pub fn as_embedded(&self) -> Option<&Association> {
        self.association.as_ref().filter(|association| association.is_embedded())
    }

    /// True for foreign-key associations (no column on the owner table).
    #[must_use]
    pub fn is_foreign_key(&self) -> bool {
        self.association.as_ref().is_some_and(Association::is_foreign_key)
    }

    /// Read/write capability for this property.
    #[must_use]
    pub const fn accessor(&self) -> &PropertyAccessor {
        &self.accessor
    }

    /// Applies the owning entity's naming strategy unless a column was
    /// declared explicitly.
    pub(crate) fn apply_naming(&mut self, naming: crate::naming::NamingStrategy) {
        if self.column.is_some() {
            return;
        }
        let to_one = self.association.as_ref().is_some_and(|a| {
            matches!(a.kind(), AssociationKind::ManyToOne | AssociationKind::OneToOne)
                && !a.is_foreign_key()
        });
        self.persisted_name = if to_one {
            naming.mapped_name(&format!("{}{}", self.name, NamingStrategy::FOREIGN_KEY_SUFFIX))
        } else {
            naming.mapped_name(&self.name)
        };
    }
}
