use chrono::{DateTime, Utc};
use mongodb::bson::{self, Bson, Document};

use super::identity::Identity;
use crate::error::{ValidationError, ValidationErrors};

/// Declared semantic type of a schema field.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// The record identity. Generated when absent.
    Identity,
    String,
    /// A string shaped like `local@domain.tld`.
    Email,
    /// BSON date, or an RFC 3339 string.
    Timestamp,
    Integer,
    Boolean,
    IntegerList,
    StringList,
    /// An embedded sub-record.
    Record(&'static Schema),
    /// A mapping of external name to embedded sub-record.
    RecordMap(&'static Schema),
}

impl FieldKind {
    pub fn describe(&self) -> &'static str {
        match self {
            FieldKind::Identity => "identity",
            FieldKind::String => "string",
            FieldKind::Email => "email address",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::IntegerList => "list of integers",
            FieldKind::StringList => "list of strings",
            FieldKind::Record(_) => "sub-record",
            FieldKind::RecordMap(_) => "mapping of sub-records",
        }
    }

    /// Check `value` against this kind and return its normalized form.
    /// Failures are pushed onto `errors` under `path`.
    fn check(&self, value: &Bson, path: &str, errors: &mut Vec<ValidationError>) -> Option<Bson> {
        match (self, value) {
            (FieldKind::Identity, Bson::ObjectId(oid)) => Some(Bson::ObjectId(*oid)),
            (FieldKind::Identity, Bson::String(text)) => match Identity::parse(text) {
                Ok(identity) => Some(identity.into()),
                Err(e) => {
                    errors.push(ValidationError::new(path, e.reason));
                    None
                }
            },
            (FieldKind::String, Bson::String(s)) => Some(Bson::String(s.clone())),
            (FieldKind::Email, Bson::String(s)) => {
                if is_email_shaped(s) {
                    Some(Bson::String(s.clone()))
                } else {
                    errors.push(ValidationError::new(path, "value is not a valid email address"));
                    None
                }
            }
            (FieldKind::Timestamp, Bson::DateTime(dt)) => Some(Bson::DateTime(*dt)),
            (FieldKind::Timestamp, Bson::String(text)) => match parse_timestamp(text) {
                Ok(dt) => Some(Bson::DateTime(dt)),
                Err(reason) => {
                    errors.push(ValidationError::new(path, reason));
                    None
                }
            },
            (FieldKind::Integer, v) if integer_value(v).is_some() => integer_value(v).map(Bson::Int64),
            (FieldKind::Boolean, Bson::Boolean(b)) => Some(Bson::Boolean(*b)),
            (FieldKind::IntegerList, Bson::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    match integer_value(item) {
                        Some(n) => out.push(Bson::Int64(n)),
                        None => errors.push(type_error(&format!("{}.{}", path, idx), "integer", item)),
                    }
                }
                Some(Bson::Array(out))
            }
            (FieldKind::StringList, Bson::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (idx, item) in items.iter().enumerate() {
                    match item {
                        Bson::String(s) => out.push(Bson::String(s.clone())),
                        other => errors.push(type_error(&format!("{}.{}", path, idx), "string", other)),
                    }
                }
                Some(Bson::Array(out))
            }
            (FieldKind::Record(schema), Bson::Document(doc)) => {
                Some(Bson::Document(schema.check_document(doc, path, errors)))
            }
            (FieldKind::RecordMap(schema), Bson::Document(doc)) => {
                let mut out = Document::new();
                for (key, entry) in doc {
                    let entry_path = format!("{}.{}", path, key);
                    match entry {
                        Bson::Document(sub) => {
                            out.insert(key.clone(), schema.check_document(sub, &entry_path, errors));
                        }
                        other => errors.push(type_error(&entry_path, "sub-record", other)),
                    }
                }
                Some(Bson::Document(out))
            }
            (kind, other) => {
                errors.push(type_error(path, kind.describe(), other));
                None
            }
        }
    }
}

/// One entry of a schema table.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Key on the wire.
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, required: true }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, required: false }
    }
}

/// Static description of a record shape, interpreted by decode and override coercion.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check `raw` and build its normalized copy. Keys not in the schema are dropped.
    pub fn validate(&self, raw: &Document) -> Result<Document, ValidationErrors> {
        let mut errors = Vec::new();
        let normalized = self.check_document(raw, "", &mut errors);
        if errors.is_empty() {
            Ok(normalized)
        } else {
            Err(ValidationErrors::new(errors))
        }
    }

    fn check_document(&self, raw: &Document, prefix: &str, errors: &mut Vec<ValidationError>) -> Document {
        let mut out = Document::new();
        for spec in self.fields {
            let path = if prefix.is_empty() {
                spec.name.to_string()
            } else {
                format!("{}.{}", prefix, spec.name)
            };
            match raw.get(spec.name) {
                None | Some(Bson::Null) if matches!(spec.kind, FieldKind::Identity) => {
                    out.insert(spec.name, Identity::generate());
                }
                None if spec.required => errors.push(ValidationError::new(path, "field required")),
                Some(Bson::Null) if spec.required => {
                    errors.push(ValidationError::new(path, "field must not be null"))
                }
                None | Some(Bson::Null) => {}
                Some(value) => {
                    if let Some(normalized) = spec.kind.check(value, &path, errors) {
                        out.insert(spec.name, normalized);
                    }
                }
            }
        }
        out
    }

    /// Convert command-line text into a typed value for a top-level scalar field.
    pub fn coerce(&self, field: &str, text: &str) -> Result<Bson, ValidationError> {
        let spec = self
            .field(field)
            .ok_or_else(|| ValidationError::new(field, format!("unknown field for {}", self.name)))?;
        match spec.kind {
            FieldKind::Identity => Err(ValidationError::new(field, "identity cannot be overridden")),
            FieldKind::String | FieldKind::Email => Ok(Bson::String(text.to_string())),
            FieldKind::Timestamp => parse_timestamp(text)
                .map(Bson::DateTime)
                .map_err(|reason| ValidationError::new(field, reason)),
            FieldKind::Integer => text
                .trim()
                .parse::<i64>()
                .map(Bson::Int64)
                .map_err(|e| ValidationError::new(field, format!("expected integer: {}", e))),
            FieldKind::Boolean => text
                .trim()
                .parse::<bool>()
                .map(Bson::Boolean)
                .map_err(|e| ValidationError::new(field, format!("expected boolean: {}", e))),
            kind => Err(ValidationError::new(
                field,
                format!("a {} field cannot be set from text", kind.describe()),
            )),
        }
    }
}

fn type_error(path: &str, expected: &str, found: &Bson) -> ValidationError {
    ValidationError::new(
        path,
        format!("expected {}, found {:?}", expected, found.element_type()),
    )
}

fn integer_value(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
        _ => None,
    }
}

fn parse_timestamp(text: &str) -> Result<bson::DateTime, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| bson::DateTime::from_chrono(dt.with_timezone(&Utc)))
        .map_err(|e| format!("invalid RFC 3339 timestamp: {}", e))
}

pub fn is_email_shaped(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    static INNER: Schema = Schema {
        name: "Inner",
        fields: &[
            FieldSpec::required("label", FieldKind::String),
            FieldSpec::required("on", FieldKind::Boolean),
        ],
    };

    static OUTER: Schema = Schema {
        name: "Outer",
        fields: &[
            FieldSpec::required("_id", FieldKind::Identity),
            FieldSpec::required("count", FieldKind::Integer),
            FieldSpec::optional("contact", FieldKind::Email),
            FieldSpec::required("seen", FieldKind::Timestamp),
            FieldSpec::required("tags", FieldKind::StringList),
            FieldSpec::required("inner", FieldKind::Record(&INNER)),
            FieldSpec::required("by_name", FieldKind::RecordMap(&INNER)),
        ],
    };

    fn valid_outer() -> Document {
        doc! {
            "_id": "67ba172377e77ea34bc1c118",
            "count": 3_i32,
            "seen": "2024-05-01T12:00:00Z",
            "tags": ["a", "b"],
            "inner": { "label": "x", "on": true },
            "by_name": { "first": { "label": "y", "on": false } },
            "extra": "ignored",
        }
    }

    #[test]
    fn test_validate_normalizes_values() {
        let normalized = OUTER.validate(&valid_outer()).unwrap();
        assert!(matches!(normalized.get("_id"), Some(Bson::ObjectId(_))));
        assert_eq!(normalized.get("count"), Some(&Bson::Int64(3)));
        assert!(matches!(normalized.get("seen"), Some(Bson::DateTime(_))));
        assert!(normalized.get("extra").is_none());
        assert!(normalized.get("contact").is_none());
    }

    #[test]
    fn test_validate_accumulates_all_failures() {
        let mut raw = valid_outer();
        raw.remove("count");
        raw.insert("contact", "not-an-email");
        raw.insert("tags", vec![Bson::String("ok".into()), Bson::Int32(7)]);
        raw.insert("by_name", doc! { "first": { "label": "y" } });

        let errors = OUTER.validate(&raw).unwrap_err();
        assert_eq!(errors.errors().len(), 4);
        assert!(errors.contains_field("count"));
        assert!(errors.contains_field("contact"));
        assert!(errors.contains_field("tags.1"));
        assert!(errors.contains_field("by_name.first.on"));
    }

    #[test]
    fn test_validate_does_not_mutate_input() {
        let raw = valid_outer();
        let before = raw.clone();
        let _ = OUTER.validate(&raw);
        assert_eq!(raw, before);
    }

    #[test]
    fn test_missing_identity_is_generated() {
        let mut raw = valid_outer();
        raw.remove("_id");
        let normalized = OUTER.validate(&raw).unwrap();
        assert!(matches!(normalized.get("_id"), Some(Bson::ObjectId(_))));
    }

    #[test]
    fn test_null_required_field_is_rejected() {
        let mut raw = valid_outer();
        raw.insert("count", Bson::Null);
        let errors = OUTER.validate(&raw).unwrap_err();
        assert_eq!(errors.first_field(), Some("count"));
    }

    #[test]
    fn test_whole_doubles_are_integers() {
        let mut raw = valid_outer();
        raw.insert("count", 4.0_f64);
        assert_eq!(OUTER.validate(&raw).unwrap().get("count"), Some(&Bson::Int64(4)));
        raw.insert("count", 4.5_f64);
        assert!(OUTER.validate(&raw).is_err());
    }

    #[test]
    fn test_coerce_overrides() {
        assert_eq!(OUTER.coerce("count", "12").unwrap(), Bson::Int64(12));
        assert!(OUTER.coerce("count", "twelve").is_err());
        assert!(OUTER.coerce("_id", "67ba172377e77ea34bc1c118").is_err());
        assert!(OUTER.coerce("tags", "a,b").is_err());
        assert!(OUTER.coerce("nope", "x").is_err());
        assert!(matches!(
            OUTER.coerce("seen", "2020-02-02T00:00:00Z").unwrap(),
            Bson::DateTime(_)
        ));
    }

    #[test]
    fn test_email_shape() {
        assert!(is_email_shaped("daffy.duck@gmail.com"));
        assert!(!is_email_shaped("daffy.duck"));
        assert!(!is_email_shaped("@gmail.com"));
        assert!(!is_email_shaped("daffy@gmail"));
        assert!(!is_email_shaped("daffy@@gmail.com"));
        assert!(!is_email_shaped("daffy duck@gmail.com"));
    }
}
