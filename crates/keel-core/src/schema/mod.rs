mod field;
mod rank;

pub use field::{Convert, Field, FieldReader, FieldType};

use crate::error::SchemaError;
use std::collections::HashMap;
use std::rc::Rc;

///
/// Schema
///
/// Frozen field layout for one record type. Built once, shared behind `Rc`;
/// every record of the type stores its values in a `Vec<Value>` indexed by
/// the ordinals fixed here. Conversion order, dependency links, and the
/// id/version wiring are all precomputed so record operations never walk
/// the declarations again.
///

#[derive(Debug)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    ordinals: HashMap<String, usize>,
    /// Ordinals in conversion-rank order.
    ranked: Vec<usize>,
    id_field: usize,
    version_field: Option<usize>,
    critical: Vec<usize>,
    transient: Vec<usize>,
}

impl Schema {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fixed data offset of the named field.
    #[must_use]
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.ordinals.get(name).copied()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.ordinal(name).map(|ordinal| &self.fields[ordinal])
    }

    #[must_use]
    pub fn field_at(&self, ordinal: usize) -> &Field {
        &self.fields[ordinal]
    }

    /// Ordinals in conversion-rank order (dependencies before dependents,
    /// opaque fields last).
    #[must_use]
    pub fn ranked(&self) -> &[usize] {
        &self.ranked
    }

    #[must_use]
    pub const fn id_ordinal(&self) -> usize {
        self.id_field
    }

    #[must_use]
    pub const fn version_ordinal(&self) -> Option<usize> {
        self.version_field
    }

    /// Ordinals of fields declared critical.
    #[must_use]
    pub fn critical(&self) -> &[usize] {
        &self.critical
    }

    /// Ordinals of non-persistent fields.
    #[must_use]
    pub fn transient(&self) -> &[usize] {
        &self.transient
    }
}

///
/// SchemaBuilder
///
/// Collects field declarations and freezes them into a shared [`Schema`].
/// Ranking runs here, so dependency mistakes surface at registration time
/// rather than on first use.
///

pub struct SchemaBuilder {
    name: String,
    fields: Vec<Field>,
    id_field: String,
    version_field: Option<String>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            id_field: "id".to_string(),
            version_field: None,
        }
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Name the identity field. Defaults to `id`; the field is declared
    /// implicitly (type `Auto`) if no declaration names it.
    #[must_use]
    pub fn id_field(mut self, name: impl Into<String>) -> Self {
        self.id_field = name.into();
        self
    }

    /// Name the field bumped on every non-phantom commit.
    #[must_use]
    pub fn version_field(mut self, name: impl Into<String>) -> Self {
        self.version_field = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Rc<Schema>, SchemaError> {
        let mut fields = self.fields;

        if !fields.iter().any(|field| field.name == self.id_field) {
            fields.push(Field::new(self.id_field.clone(), FieldType::Auto));
        }

        let mut ordinals = HashMap::with_capacity(fields.len());
        for (ordinal, field) in fields.iter().enumerate() {
            if ordinals.insert(field.name.clone(), ordinal).is_some() {
                return Err(SchemaError::DuplicateField {
                    schema: self.name,
                    field: field.name.clone(),
                });
            }
        }

        let ranked = rank::rank_fields(&self.name, &mut fields, &ordinals)?;

        let id_field = ordinals
            .get(&self.id_field)
            .copied()
            .ok_or_else(|| SchemaError::UnknownIdField {
                schema: self.name.clone(),
                field: self.id_field.clone(),
            })?;

        let version_field = match &self.version_field {
            Some(name) => Some(ordinals.get(name).copied().ok_or_else(|| {
                SchemaError::UnknownVersionField {
                    schema: self.name.clone(),
                    field: name.clone(),
                }
            })?),
            None => None,
        };

        let critical = fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.critical)
            .map(|(ordinal, _)| ordinal)
            .collect();
        let transient = fields
            .iter()
            .enumerate()
            .filter(|(_, field)| !field.persist)
            .map(|(ordinal, _)| ordinal)
            .collect();

        Ok(Rc::new(Schema {
            name: self.name,
            fields,
            ordinals,
            ranked,
            id_field,
            version_field,
            critical,
            transient,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn id_field_is_declared_implicitly() {
        let schema = Schema::builder("user")
            .field(Field::new("name", FieldType::Text))
            .build()
            .expect("schema");

        assert_eq!(schema.len(), 2);
        assert_eq!(schema.field_at(schema.id_ordinal()).name, "id");
    }

    #[test]
    fn declared_id_field_is_not_duplicated() {
        let schema = Schema::builder("user")
            .field(Field::new("id", FieldType::Int))
            .field(Field::new("name", FieldType::Text))
            .build()
            .expect("schema");

        assert_eq!(schema.len(), 2);
        assert_eq!(schema.field_at(schema.id_ordinal()).ftype, FieldType::Int);
    }

    #[test]
    fn duplicate_declarations_fail() {
        let err = Schema::builder("user")
            .field(Field::new("name", FieldType::Text))
            .field(Field::new("name", FieldType::Text))
            .build()
            .expect_err("duplicate");

        assert!(matches!(err, SchemaError::DuplicateField { .. }));
    }

    #[test]
    fn missing_version_field_fails() {
        let err = Schema::builder("user")
            .version_field("revision")
            .build()
            .expect_err("missing");

        assert!(matches!(err, SchemaError::UnknownVersionField { .. }));
    }

    #[test]
    fn ranked_order_crosses_declaration_order() {
        let schema = Schema::builder("calc")
            .field(
                Field::new("double", FieldType::Int)
                    .convert(|_, reader| {
                        let base = reader.read("base").and_then(Value::as_i64).unwrap_or(0);
                        Value::Int(base * 2)
                    })
                    .depends(&["base"]),
            )
            .field(Field::new("base", FieldType::Int))
            .build()
            .expect("schema");

        let order: Vec<&str> = schema
            .ranked()
            .iter()
            .map(|&i| schema.field_at(i).name.as_str())
            .collect();
        assert_eq!(order, vec!["base", "id", "double"]);
    }

    #[test]
    fn critical_and_transient_lists_are_precomputed() {
        let schema = Schema::builder("doc")
            .field(Field::new("state", FieldType::Text).critical())
            .field(Field::new("scratch", FieldType::Text).persist(false))
            .build()
            .expect("schema");

        assert_eq!(schema.critical().len(), 1);
        assert_eq!(schema.transient().len(), 1);
        assert_eq!(schema.field_at(schema.critical()[0]).name, "state");
        assert_eq!(schema.field_at(schema.transient()[0]).name, "scratch");
    }
}
