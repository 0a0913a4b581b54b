use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::clock::Clock;
use crate::codec::JsonCodec;
use crate::entity::PersistentEntity;
use crate::error::{Error, Result};
use crate::property::{Association, AutoPopulated, DataType, PersistentProperty};
use crate::value::Value;

/// Serialized entity instance, as produced by `serde_json`.
pub type Bean = Map<String, JsonValue>;

/// Persists a referenced entity whose identity is unset, writing the
/// identity it receives back into the bean.
pub type Cascade<'a> = dyn FnMut(&Arc<PersistentEntity>, &mut Bean) -> Result<()> + 'a;

/// Statement kind being bound; decides which timestamps are refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// INSERT: creation and update timestamps are set.
    Insert,
    /// UPDATE: only update timestamps are set.
    Update,
}

/// Resolves a stored statement's binding paths against an entity instance.
pub struct ParameterBinder<'a> {
    codec: &'a dyn JsonCodec,
    clock: &'a dyn Clock,
}

impl<'a> ParameterBinder<'a> {
    /// Creates a binder.
    #[must_use]
    pub const fn new(codec: &'a dyn JsonCodec, clock: &'a dyn Clock) -> Self {
        Self { codec, clock }
    }

    /// One positional value per binding path.
    ///
    /// Auto-populated properties are assigned on `bean` as a side effect.
    /// Referenced entities without identity are handed to `cascade` first
    /// when their association cascades persistence.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown auto-populated kinds, a
    /// build error for paths the entity does not declare, and a conversion
    /// error for values that do not fit their declared type.
    pub fn bind(
        &self, entity: &PersistentEntity, paths: &[String], bean: &mut Bean, mode: BindMode,
        cascade: &mut Cascade<'_>,
    ) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(paths.len());
        for path in paths {
            values.push(self.bind_path(entity, path, bean, mode, cascade)?);
        }
        Ok(values)
    }

    fn bind_path(
        &self, entity: &PersistentEntity, path: &str, bean: &mut Bean, mode: BindMode,
        cascade: &mut Cascade<'_>,
    ) -> Result<Value> {
        let (name, sub) = match path.split_once('.') {
            Some((name, sub)) => (name, Some(sub)),
            None => (path, None),
        };
        let property = entity.property_by_name(name).ok_or_else(|| {
            Error::build(format!("entity {} has no property [{name}] bound by path {path}", entity.name()))
        })?;

        if let Some(sub) = sub {
            return self.bind_embedded(entity, property, sub, bean);
        }

        if let Some(kind) = property.auto_populated() {
            return self.auto_populate(property, kind, bean, mode);
        }

        if let Some(association) = property.as_association() {
            return bind_reference(property, association, bean, cascade);
        }

        self.scalar(property, property.accessor().read(bean))
    }

    fn bind_embedded(
        &self, entity: &PersistentEntity, owner: &PersistentProperty, sub: &str, bean: &Bean,
    ) -> Result<Value> {
        let embeddable = owner
            .as_embedded()
            .ok_or_else(|| {
                Error::build(format!(
                    "property [{}] of entity {} is not embedded",
                    owner.name(),
                    entity.name()
                ))
            })?
            .associated_entity();
        let sub_property = embeddable.property_by_name(sub).ok_or_else(|| {
            Error::build(format!("embedded entity {} has no property [{sub}]", embeddable.name()))
        })?;

        let JsonValue::Object(embedded) = owner.accessor().read(bean) else {
            return Ok(Value::Null);
        };
        let value = sub_property.accessor().read(embedded);

        match sub_property.as_association() {
            Some(association) => {
                let identity = association.associated_entity();
                let identity = identity.required_identity()?;
                match value {
                    JsonValue::Object(referenced) => {
                        Value::from_json(identity.accessor().read(referenced), identity.data_type())
                    }
                    _ => Ok(Value::Null),
                }
            }
            None => self.scalar(sub_property, value),
        }
    }

    fn auto_populate(
        &self, property: &PersistentProperty, kind: &AutoPopulated, bean: &mut Bean, mode: BindMode,
    ) -> Result<Value> {
        let accessor = property.accessor();
        match kind {
            AutoPopulated::Created if mode == BindMode::Update => {
                Value::from_json(accessor.read(bean), property.data_type())
            }
            AutoPopulated::Created | AutoPopulated::Updated => {
                let now = self.clock.now();
                let value = if property.data_type() == DataType::Date {
                    Value::Date(now.date_naive())
                } else {
                    Value::Timestamp(now)
                };
                accessor.write(bean, value.to_untyped_json()?);
                Ok(value)
            }
            AutoPopulated::Generated => {
                if property.data_type() != DataType::Uuid {
                    return Err(Error::configuration(format!(
                        "generated value for property [{}] requires a UUID type, found {:?}",
                        property.name(),
                        property.data_type()
                    )));
                }
                let current = accessor.read(bean);
                if !current.is_null() {
                    return Value::from_json(current, DataType::Uuid);
                }
                let id = Uuid::new_v4();
                accessor.write(bean, JsonValue::String(id.hyphenated().to_string()));
                Ok(Value::Uuid(id))
            }
            AutoPopulated::Custom(name) => Err(Error::configuration(format!(
                "unsupported auto-populated kind [{name}] on property [{}]",
                property.name()
            ))),
        }
    }

    fn scalar(&self, property: &PersistentProperty, json: &JsonValue) -> Result<Value> {
        if property.data_type() == DataType::Json {
            if json.is_null() {
                return Ok(Value::Null);
            }
            let text = self.codec.encode(json).map_err(|e| {
                Error::conversion(format!("cannot encode property [{}]: {e}", property.name()))
            })?;
            return Ok(Value::String(text));
        }
        Value::from_json(json, property.data_type())
    }
}

/// Binds the identity of the referenced entity rather than the entity.
fn bind_reference(
    property: &PersistentProperty, association: &Association, bean: &mut Bean,
    cascade: &mut Cascade<'_>,
) -> Result<Value> {
    if association.is_foreign_key() {
        return Err(Error::build(format!(
            "foreign key association [{}] has no column to bind",
            property.name()
        )));
    }

    let associated = association.associated_entity();
    let identity = associated.required_identity()?;
    let accessor = property.accessor();

    let Some(JsonValue::Object(referenced)) = accessor.read_mut(bean) else {
        return Ok(Value::Null);
    };

    if identity.accessor().read(referenced).is_null() && association.cascades_persist() {
        cascade(&associated, referenced)?;
        if identity.accessor().read(referenced).is_null() {
            return Err(Error::build(format!(
                "referenced entity {} has no identity after cascade through [{}]",
                associated.name(),
                property.name()
            )));
        }
    }
    Value::from_json(identity.accessor().read(referenced), identity.data_type())
}
