use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use crate::codec::JsonCodec;
use crate::entity::PersistentEntity;
use crate::error::{Error, Result};
use crate::prepare::ResultKind;
use crate::property::{DataType, PersistentProperty};
use crate::value::Value;

struct DtoField {
    name: String,
    index: usize,
    data_type: DataType,
}

enum Plan {
    Scalar,
    Dto(Vec<DtoField>),
}

/// Maps cursor rows to results.
///
/// The column layout is resolved once per cursor, so a projection naming a
/// property the root entity lacks fails before any row is read.
pub struct ResultDecoder<'a> {
    codec: &'a dyn JsonCodec,
    plan: Plan,
}

impl<'a> ResultDecoder<'a> {
    /// Resolves the decoding plan for a cursor with the given columns.
    ///
    /// Run [`check_projection`] before executing to fail without touching
    /// the cache.
    ///
    /// # Errors
    ///
    /// Returns an unsupported error for entity results, and a build error
    /// when a DTO field has no matching entity property or column.
    pub fn new(
        entity: &PersistentEntity, result: &ResultKind, column_names: &[String],
        codec: &'a dyn JsonCodec,
    ) -> Result<Self> {
        let plan = match projected_properties(entity, result)? {
            None => Plan::Scalar,
            Some(projected) => Plan::Dto(dto_fields(entity, projected, column_names)?),
        };
        Ok(Self { codec, plan })
    }

    /// Decodes one row.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the row does not fit `R`.
    pub fn decode<R: DeserializeOwned>(&self, row: Vec<Value>) -> Result<R> {
        let json = match &self.plan {
            Plan::Scalar => row
                .into_iter()
                .next()
                .ok_or_else(|| Error::conversion("row has no columns"))?
                .to_untyped_json()?,
            Plan::Dto(fields) => {
                let mut object = Map::with_capacity(fields.len());
                for field in fields {
                    let cell = row.get(field.index).unwrap_or(&Value::Null);
                    object.insert(field.name.clone(), self.cell_json(field, cell)?);
                }
                JsonValue::Object(object)
            }
        };
        Ok(serde_json::from_value(json)?)
    }

    fn cell_json(&self, field: &DtoField, cell: &Value) -> Result<JsonValue> {
        match (field.data_type, cell) {
            (DataType::Json, Value::String(text)) => self.codec.decode(text).map_err(|e| {
                Error::conversion(format!("cannot decode property [{}]: {e}", field.name))
            }),
            (data_type, cell) => cell.to_json(data_type),
        }
    }
}

/// Verifies a result kind can be decoded for `entity`, without a cursor.
///
/// # Errors
///
/// Returns an unsupported error for entity results and a build error for
/// DTO fields the root entity does not declare.
pub fn check_projection(entity: &PersistentEntity, result: &ResultKind) -> Result<()> {
    projected_properties(entity, result).map(drop)
}

type Projected<'e> = Vec<(&'e str, &'e PersistentProperty)>;

fn projected_properties<'e>(
    entity: &'e PersistentEntity, result: &'e ResultKind,
) -> Result<Option<Projected<'e>>> {
    let fields = match result {
        ResultKind::Scalar => return Ok(None),
        ResultKind::Entity => {
            return Err(Error::unsupported(format!(
                "entity mappings not supported, project the columns of {} into a DTO",
                entity.name()
            )));
        }
        ResultKind::Dto(fields) => fields,
    };

    fields
        .iter()
        .map(|field| {
            let property = entity.property_by_name(field).ok_or_else(|| {
                Error::build(format!(
                    "DTO projection defines a property [{field}] that doesn't exist on root entity: {}",
                    entity.name()
                ))
            })?;
            Ok((field.as_str(), property))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn dto_fields(
    entity: &PersistentEntity, projected: Projected<'_>, column_names: &[String],
) -> Result<Vec<DtoField>> {
    let mut exact = HashMap::with_capacity(column_names.len());
    let mut folded = HashMap::with_capacity(column_names.len());
    for (index, name) in column_names.iter().enumerate() {
        exact.entry(name.as_str()).or_insert(index);
        folded.entry(name.to_lowercase()).or_insert(index);
    }

    projected
        .into_iter()
        .map(|(field, property)| {
            let column = property.persisted_name();
            let index = exact
                .get(column)
                .copied()
                .or_else(|| folded.get(&column.to_lowercase()).copied())
                .ok_or_else(|| {
                    Error::build(format!(
                        "DTO property [{field}] of entity {} has no column [{column}] in the result",
                        entity.name()
                    ))
                })?;
            Ok(DtoField {
                name: field.to_string(),
                index,
                data_type: property.data_type(),
            })
        })
        .collect()
}
