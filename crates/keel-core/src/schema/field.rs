use crate::value::Value;
use std::fmt;
use std::rc::Rc;

///
/// FieldType
///
/// Drives the default conversion a field applies to incoming raw values.
/// `Auto` performs no coercion at all.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FieldType {
    #[default]
    Auto,
    Bool,
    Int,
    Float,
    Text,
    Date,
}

///
/// FieldReader
///
/// Read-only view over a record's current values, handed to custom
/// converters so computed fields can read the fields they depend on.
///

pub trait FieldReader {
    /// Current value of the named field, if the field exists.
    fn read(&self, name: &str) -> Option<&Value>;
}

/// Custom conversion hook. Receives the incoming raw value (`None` when the
/// field is being defaulted) and a reader over the record.
pub type Convert = Rc<dyn Fn(Option<&Value>, &dyn FieldReader) -> Value>;

///
/// Field
///
/// One field descriptor inside a schema. Built with the fluent methods,
/// then frozen by `SchemaBuilder::build`, which fills `rank` and
/// `dependents`.
///

#[derive(Clone)]
pub struct Field {
    pub name: String,
    pub ftype: FieldType,
    pub convert: Option<Convert>,
    pub default_value: Value,
    /// Persistent fields survive serialization; transient ones do not.
    pub persist: bool,
    /// Critical fields always report as modified once set, even when the
    /// new value equals the old one.
    pub critical: bool,
    pub depends: Vec<String>,
    /// 1-based conversion order. 0 is the in-progress marker during ranking
    /// and never survives a successful build.
    pub(crate) rank: usize,
    /// Ordinals of fields whose converters read this one.
    pub(crate) dependents: Vec<usize>,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, ftype: FieldType) -> Self {
        Self {
            name: name.into(),
            ftype,
            convert: None,
            default_value: Value::Null,
            persist: true,
            critical: false,
            depends: Vec::new(),
            rank: 0,
            dependents: Vec::new(),
        }
    }

    #[must_use]
    pub fn convert(mut self, convert: impl Fn(Option<&Value>, &dyn FieldReader) -> Value + 'static) -> Self {
        self.convert = Some(Rc::new(convert));
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    #[must_use]
    pub const fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    #[must_use]
    pub const fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    #[must_use]
    pub fn depends(mut self, names: &[&str]) -> Self {
        self.depends = names.iter().map(|name| (*name).to_string()).collect();
        self
    }

    /// A field with a custom converter but no declared dependencies is
    /// opaque: its converter may read anything, so it ranks after every
    /// declared field.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        self.convert.is_some() && self.depends.is_empty()
    }

    /// 1-based conversion rank assigned by the schema build.
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.rank
    }

    /// Ordinals of the fields that must recompute when this one changes.
    #[must_use]
    pub fn dependents(&self) -> &[usize] {
        &self.dependents
    }

    /// Apply this field's conversion to a raw value.
    ///
    /// Custom converters win; otherwise `ftype` coerces. A missing raw value
    /// falls back to the declared default.
    #[must_use]
    pub fn apply_convert(&self, raw: Option<&Value>, reader: &dyn FieldReader) -> Value {
        if let Some(convert) = &self.convert {
            return convert(raw, reader);
        }
        match raw {
            Some(value) if !value.is_null() => self.coerce(value),
            _ => self.default_value.clone(),
        }
    }

    fn coerce(&self, value: &Value) -> Value {
        match self.ftype {
            FieldType::Auto => value.clone(),
            FieldType::Bool => match value {
                Value::Bool(_) => value.clone(),
                other => other
                    .as_i64()
                    .map_or_else(|| Value::Bool(!matches!(other, Value::Null)), |n| Value::Bool(n != 0)),
            },
            FieldType::Int => value.as_i64().map_or(Value::Null, Value::Int),
            FieldType::Float => value.as_f64().map_or(Value::Null, Value::Float),
            FieldType::Text => match value {
                Value::Text(_) => value.clone(),
                other => Value::Text(other.to_string()),
            },
            FieldType::Date => value.as_i64().map_or(Value::Null, Value::Date),
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("ftype", &self.ftype)
            .field("has_convert", &self.convert.is_some())
            .field("depends", &self.depends)
            .field("rank", &self.rank)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;
    impl FieldReader for Empty {
        fn read(&self, _name: &str) -> Option<&Value> {
            None
        }
    }

    #[test]
    fn type_coercion_follows_the_field_type() {
        let field = Field::new("age", FieldType::Int);
        assert_eq!(field.apply_convert(Some(&Value::Text("42".into())), &Empty), Value::Int(42));

        let field = Field::new("name", FieldType::Text);
        assert_eq!(field.apply_convert(Some(&Value::Int(7)), &Empty), Value::Text("7".into()));
    }

    #[test]
    fn missing_raw_value_takes_the_default() {
        let field = Field::new("count", FieldType::Int).default_value(3);
        assert_eq!(field.apply_convert(None, &Empty), Value::Int(3));
        assert_eq!(field.apply_convert(Some(&Value::Null), &Empty), Value::Int(3));
    }

    #[test]
    fn custom_convert_with_no_depends_is_opaque() {
        let field = Field::new("x", FieldType::Auto).convert(|raw, _| raw.cloned().unwrap_or_default());
        assert!(field.is_opaque());

        let field = Field::new("x", FieldType::Auto)
            .convert(|raw, _| raw.cloned().unwrap_or_default())
            .depends(&["y"]);
        assert!(!field.is_opaque());
    }
}
