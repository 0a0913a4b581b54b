use crate::entity::PersistentEntity;
use crate::error::{Error, Result};
use crate::property::{Association, DataType, PersistentProperty};

/// Builds the CREATE TABLE statements for an entity: one per join-table
/// association, followed by the entity's own table.
///
/// Intended for tests and development schemas, not for migrations.
///
/// # Errors
///
/// Returns a build error when a property has no column type, or a join
/// table cannot be resolved.
pub fn build_create_table_statements(entity: &PersistentEntity) -> Result<Vec<String>> {
    let mut statements = Vec::new();

    for property in entity.join_table_associations() {
        let Some(association) = property.as_association() else { continue };
        let associated = association.associated_entity();
        let identity = join_identity(entity)?;
        let associated_id = join_identity(&associated)?;
        let [this_column, that_column] =
            resolve_join_table_columns(entity, &associated, property, association)?;

        statements.push(format!(
            "CREATE TABLE {} ({},{})",
            entity.quote(&join_table_name(entity, property, association)),
            column_with_type(entity, identity, &entity.quote(&this_column))?,
            column_with_type(&associated, associated_id, &associated.quote(&that_column))?,
        ));
    }

    let mut columns = Vec::new();
    let mut primary_key = Vec::new();
    let embedded_identity = entity.identity().is_some_and(|id| id.as_embedded().is_some());

    for column in entity.flattened_columns() {
        let mut definition = column_with_type(entity, &column.property, &column.column)?;
        if column.identity {
            if embedded_identity {
                primary_key.push(column.column.clone());
            } else {
                definition.push_str(" PRIMARY KEY");
            }
        }
        columns.push(definition);
    }

    let mut statement = format!("CREATE TABLE {} ({}", entity.table_name(), columns.join(","));
    if !primary_key.is_empty() {
        statement.push_str(&format!(", PRIMARY KEY({})", primary_key.join(",")));
    }
    statement.push_str(");");

    tracing::debug!(
        table = entity.persisted_name(),
        sql = %statement,
        join_tables = statements.len(),
        "generated CREATE TABLE"
    );
    statements.push(statement);
    Ok(statements)
}

/// Builds the DROP TABLE statements matching
/// [`build_create_table_statements`].
#[must_use]
pub fn build_drop_table_statements(entity: &PersistentEntity) -> Vec<String> {
    let mut statements: Vec<String> = entity
        .join_table_associations()
        .filter_map(|property| {
            let association = property.as_association()?;
            Some(format!(
                "DROP TABLE {};",
                entity.quote(&join_table_name(entity, property, association))
            ))
        })
        .collect();
    statements.push(format!("DROP TABLE {};", entity.table_name()));
    statements
}

/// Unquoted join table name: the explicit mapping, or
/// `<owner>_<association>` through the owner's naming strategy.
#[must_use]
pub fn join_table_name(
    owner: &PersistentEntity, property: &PersistentProperty, association: &Association,
) -> String {
    association
        .join_table_mapping()
        .and_then(|mapping| mapping.name.clone())
        .unwrap_or_else(|| owner.naming().join_table_name(owner.name(), property.name()))
}

/// Unquoted join columns `[owner, associated]` of a join-table association.
///
/// # Errors
///
/// Returns a build error when either side has no identity, or when an
/// explicit mapping does not declare exactly two columns.
pub fn resolve_join_table_columns(
    owner: &PersistentEntity, associated: &PersistentEntity, property: &PersistentProperty,
    association: &Association,
) -> Result<[String; 2]> {
    join_identity(owner)?;
    join_identity(associated)?;

    let naming = owner.naming();
    let explicit = association.join_table_mapping().map(|m| m.columns.as_slice()).unwrap_or_default();
    match explicit {
        [] => Ok([
            naming.foreign_key_column(owner.name()),
            naming.foreign_key_column(associated.name()),
        ]),
        [this, that] => Ok([this.clone(), that.clone()]),
        _ => Err(Error::build(format!(
            "expected exactly 2 join columns for association [{}] of entity: {}",
            property.name(),
            owner.name()
        ))),
    }
}

fn join_identity(entity: &PersistentEntity) -> Result<&PersistentProperty> {
    entity.identity().ok_or_else(|| {
        Error::build(format!(
            "cannot have a foreign key association without an ID on entity: {}",
            entity.name()
        ))
    })
}

/// Appends the SQL type of `property` to `column`.
fn column_with_type(
    owner: &PersistentEntity, property: &PersistentProperty, column: &str,
) -> Result<String> {
    if let Some(definition) = property.definition() {
        return Ok(format!("{column} {definition}"));
    }

    let sql_type = match property.data_type() {
        DataType::String => "VARCHAR",
        DataType::Uuid => "UUID",
        DataType::Boolean => "BOOLEAN",
        DataType::Timestamp => "TIMESTAMP",
        DataType::Date => "DATE",
        DataType::Long => "BIGINT",
        DataType::Character | DataType::Integer => "INT",
        DataType::BigDecimal => "DECIMAL",
        DataType::Float => "REAL",
        DataType::ByteArray => "BINARY",
        DataType::Double => "DOUBLE",
        DataType::Short | DataType::Byte => "TINYINT",
        DataType::Json => {
            return Err(Error::build(format!(
                "unable to create table column for property [{}] of entity [{}]: JSON not supported natively",
                property.name(),
                owner.name()
            )));
        }
        DataType::Entity | DataType::Object => {
            if let Some(association) = property.as_association() {
                let associated = association.associated_entity();
                if let Some(identity) = associated.identity() {
                    return column_with_type(&associated, identity, column);
                }
            } else if property.is_enum() {
                return Ok(format!("{column} VARCHAR"));
            }
            return Err(Error::build(format!(
                "unable to create table column for property [{}] of entity [{}] with unknown data type: {:?}",
                property.name(),
                owner.name(),
                property.data_type()
            )));
        }
    };
    Ok(format!("{column} {sql_type}"))
}
