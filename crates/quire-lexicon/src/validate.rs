use serde_json::{Map, Value};

use crate::catalog::{canonical_reference, Catalog};
use crate::format;
use crate::schema::{
    ArrayDef, BlobDef, BytesDef, IntegerDef, ObjectDef, SchemaDef, StringDef, StringFormat,
    UnionDef,
};

const TYPE_FIELD: &str = "$type";

/// Options for [`validate_record`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidateFlags {
    /// Reject object fields the schema does not declare, at every depth.
    pub closed_world: bool,
    /// Accept datetimes without an explicit offset.
    pub lenient_datetime: bool,
}

impl ValidateFlags {
    /// Closed world with RFC 3339 datetimes only.
    pub const STRICT: Self = Self {
        closed_world: true,
        lenient_datetime: false,
    };

    /// Open world with lenient datetimes.
    pub const LENIENT: Self = Self {
        closed_world: false,
        lenient_datetime: true,
    };
}

/// The rule a value broke.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rule {
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("required field missing: {0}")]
    RequiredMissing(String),
    #[error("$type {found} does not match declared type {declared}")]
    TypeMismatch { declared: String, found: String },
    #[error("{0} is not a record schema")]
    NotARecord(String),
    #[error("expected {expected}, found {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },
    #[error("expected integer")]
    NotAnInteger,
    #[error("string val not in required enum")]
    StringNotInEnum,
    #[error("integer val not in required enum")]
    IntegerNotInEnum,
    #[error("value does not match const {0}")]
    ConstMismatch(String),
    #[error("string too short: {actual} < {min}")]
    StringTooShort { min: usize, actual: usize },
    #[error("string too long: {actual} > {max}")]
    StringTooLong { max: usize, actual: usize },
    #[error("too few graphemes: {actual} < {min}")]
    TooFewGraphemes { min: usize, actual: usize },
    #[error("too many graphemes: {actual} > {max}")]
    TooManyGraphemes { max: usize, actual: usize },
    #[error("integer below minimum: {actual} < {min}")]
    BelowMinimum { min: i64, actual: i64 },
    #[error("integer above maximum: {actual} > {max}")]
    AboveMaximum { max: i64, actual: i64 },
    #[error("array too short: {actual} < {min}")]
    ArrayTooShort { min: usize, actual: usize },
    #[error("array too long: {actual} > {max}")]
    ArrayTooLong { max: usize, actual: usize },
    #[error("invalid {0} string")]
    InvalidFormat(StringFormat),
    #[error("unexpected field: {0}")]
    UnexpectedField(String),
    #[error("union value missing $type")]
    UnionMissingType,
    #[error("union does not allow $type {0}")]
    UnionTypeNotAllowed(String),
    #[error("{0} definitions do not describe data")]
    NotData(&'static str),
    #[error("bytes must be an object with a $bytes string")]
    InvalidBytes,
    #[error("bytes too short: {actual} < {min}")]
    BytesTooShort { min: usize, actual: usize },
    #[error("bytes too long: {actual} > {max}")]
    BytesTooLong { max: usize, actual: usize },
    #[error("cid-link must be an object with a valid $link")]
    InvalidLink,
    #[error("invalid blob: {0}")]
    InvalidBlob(&'static str),
    #[error("blob mime type {0} not accepted")]
    BlobTypeNotAccepted(String),
    #[error("blob too large: {actual} > {max}")]
    BlobTooLarge { max: u64, actual: u64 },
    #[error("unresolved schema: {0}")]
    Unresolved(String),
}

/// A record failed validation. `path` locates the offending value in
/// dotted/indexed form (`facets[0].index`); empty for the record itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub rule: Rule,
}

impl ValidationError {
    fn new(path: &str, rule: Rule) -> Self {
        Self {
            path: path.to_string(),
            rule,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.rule)
        } else {
            write!(f, "{}: {}", self.path, self.rule)
        }
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T = ()> = Result<T, ValidationError>;

/// Validate `data` against the record schema named by `declared_type`.
///
/// A `$type` field, when present, must equal `declared_type`.
pub fn validate_record(
    catalog: &Catalog,
    data: &Value,
    declared_type: &str,
    flags: ValidateFlags,
) -> ValidationResult {
    let Value::Object(fields) = data else {
        return Err(ValidationError::new(
            "",
            Rule::WrongKind {
                expected: "object",
                found: kind(data),
            },
        ));
    };
    if let Some(found) = fields.get(TYPE_FIELD) {
        let found = found.as_str().unwrap_or_default();
        if found != declared_type {
            return Err(ValidationError::new(
                TYPE_FIELD,
                Rule::TypeMismatch {
                    declared: declared_type.to_string(),
                    found: found.to_string(),
                },
            ));
        }
    }

    let resolved = catalog
        .resolve(declared_type)
        .map_err(|e| ValidationError::new("", Rule::Unresolved(e.to_string())))?;
    let SchemaDef::Record(record) = resolved.def else {
        return Err(ValidationError::new("", Rule::NotARecord(resolved.name())));
    };

    let walker = Walker { catalog, flags };
    walker.object(resolved.schema, &record.record, fields, "")
}

/// Parse `bytes` as JSON and validate it.
pub fn validate_record_bytes(
    catalog: &Catalog,
    bytes: &[u8],
    declared_type: &str,
    flags: ValidateFlags,
) -> ValidationResult {
    let data: Value = serde_json::from_slice(bytes)
        .map_err(|e| ValidationError::new("", Rule::Malformed(e.to_string())))?;
    validate_record(catalog, &data, declared_type, flags)
}

/// Parse `text` as JSON and validate it.
pub fn validate_record_str(
    catalog: &Catalog,
    text: &str,
    declared_type: &str,
    flags: ValidateFlags,
) -> ValidationResult {
    validate_record_bytes(catalog, text.as_bytes(), declared_type, flags)
}

struct Walker<'a> {
    catalog: &'a Catalog,
    flags: ValidateFlags,
}

impl Walker<'_> {
    /// `base` is the schema id relative references resolve against.
    fn value(&self, base: &str, def: &SchemaDef, value: &Value, path: &str) -> ValidationResult {
        match def {
            SchemaDef::Record(record) => self.object_value(base, &record.record, value, path),
            SchemaDef::Object(object) => self.object_value(base, object, value, path),
            SchemaDef::String(string) => self.string(string, value, path),
            SchemaDef::Integer(integer) => integer_value(integer, value, path),
            SchemaDef::Boolean(boolean) => {
                let actual = value.as_bool().ok_or_else(|| wrong_kind("boolean", value, path))?;
                match boolean.constant {
                    Some(expected) if expected != actual => Err(ValidationError::new(
                        path,
                        Rule::ConstMismatch(expected.to_string()),
                    )),
                    _ => Ok(()),
                }
            }
            SchemaDef::Array(array) => self.array(base, array, value, path),
            SchemaDef::Ref(reference) => {
                let target = self
                    .catalog
                    .resolve_from(Some(base), &reference.reference)
                    .map_err(|e| ValidationError::new(path, Rule::Unresolved(e.to_string())))?;
                self.value(target.schema, target.def, value, path)
            }
            SchemaDef::Union(union) => self.union(base, union, value, path),
            SchemaDef::Unknown(_) => match value {
                Value::Object(_) => Ok(()),
                other => Err(wrong_kind("object", other, path)),
            },
            SchemaDef::Bytes(bytes) => bytes_value(bytes, value, path),
            SchemaDef::CidLink(_) => {
                let link = link_of(value).ok_or_else(|| ValidationError::new(path, Rule::InvalidLink))?;
                if format::check(StringFormat::Cid, link, false) {
                    Ok(())
                } else {
                    Err(ValidationError::new(path, Rule::InvalidLink))
                }
            }
            SchemaDef::Blob(blob) => blob_value(blob, value, path),
            SchemaDef::Null(_) => match value {
                Value::Null => Ok(()),
                other => Err(wrong_kind("null", other, path)),
            },
            other @ (SchemaDef::Token(_)
            | SchemaDef::Params(_)
            | SchemaDef::Query(_)
            | SchemaDef::Procedure(_)
            | SchemaDef::Subscription(_)) => {
                Err(ValidationError::new(path, Rule::NotData(other.type_name())))
            }
        }
    }

    fn object_value(&self, base: &str, def: &ObjectDef, value: &Value, path: &str) -> ValidationResult {
        match value {
            Value::Object(fields) => self.object(base, def, fields, path),
            other => Err(wrong_kind("object", other, path)),
        }
    }

    fn object(&self, base: &str, def: &ObjectDef, fields: &Map<String, Value>, path: &str) -> ValidationResult {
        for name in &def.required {
            let present = match fields.get(name) {
                None => false,
                Some(Value::Null) => def.nullable.contains(name),
                Some(_) => true,
            };
            if !present {
                return Err(ValidationError::new(path, Rule::RequiredMissing(name.clone())));
            }
        }

        for (name, value) in fields {
            match def.properties.get(name) {
                Some(_) if value.is_null() && def.nullable.contains(name) => {}
                Some(field) => self.value(base, field, value, &join(path, name))?,
                None if name == TYPE_FIELD => {}
                None if self.flags.closed_world => {
                    return Err(ValidationError::new(path, Rule::UnexpectedField(name.clone())));
                }
                None => {}
            }
        }
        Ok(())
    }

    fn string(&self, def: &StringDef, value: &Value, path: &str) -> ValidationResult {
        let s = value.as_str().ok_or_else(|| wrong_kind("string", value, path))?;
        let fail = |rule| Err(ValidationError::new(path, rule));

        if let Some(expected) = &def.constant {
            if s != expected {
                return fail(Rule::ConstMismatch(expected.clone()));
            }
        }
        if let Some(allowed) = &def.allowed {
            if !allowed.iter().any(|a| a == s) {
                return fail(Rule::StringNotInEnum);
            }
        }

        // Lengths are UTF-8 bytes.
        let len = s.len();
        if let Some(min) = def.min_length.filter(|min| len < *min) {
            return fail(Rule::StringTooShort { min, actual: len });
        }
        if let Some(max) = def.max_length.filter(|max| len > *max) {
            return fail(Rule::StringTooLong { max, actual: len });
        }

        if def.min_graphemes.is_some() || def.max_graphemes.is_some() {
            let count = s.chars().count();
            if let Some(min) = def.min_graphemes.filter(|min| count < *min) {
                return fail(Rule::TooFewGraphemes { min, actual: count });
            }
            if let Some(max) = def.max_graphemes.filter(|max| count > *max) {
                return fail(Rule::TooManyGraphemes { max, actual: count });
            }
        }

        if let Some(fmt) = def.format {
            if !format::check(fmt, s, self.flags.lenient_datetime) {
                return fail(Rule::InvalidFormat(fmt));
            }
        }
        Ok(())
    }

    fn array(&self, base: &str, def: &ArrayDef, value: &Value, path: &str) -> ValidationResult {
        let items = value.as_array().ok_or_else(|| wrong_kind("array", value, path))?;
        let len = items.len();
        if let Some(min) = def.min_length.filter(|min| len < *min) {
            return Err(ValidationError::new(path, Rule::ArrayTooShort { min, actual: len }));
        }
        if let Some(max) = def.max_length.filter(|max| len > *max) {
            return Err(ValidationError::new(path, Rule::ArrayTooLong { max, actual: len }));
        }
        for (i, item) in items.iter().enumerate() {
            self.value(base, &def.items, item, &format!("{path}[{i}]"))?;
        }
        Ok(())
    }

    /// The value's `$type` picks the variant. Open unions accept variants
    /// they do not list.
    fn union(&self, base: &str, def: &UnionDef, value: &Value, path: &str) -> ValidationResult {
        let Value::Object(fields) = value else {
            return Err(wrong_kind("object", value, path));
        };
        let Some(found) = fields.get(TYPE_FIELD).and_then(Value::as_str) else {
            return Err(ValidationError::new(path, Rule::UnionMissingType));
        };
        let unresolved = |e: crate::LexiconError| ValidationError::new(path, Rule::Unresolved(e.to_string()));
        let wanted = canonical_reference(None, found).map_err(unresolved)?;

        for reference in &def.refs {
            if canonical_reference(Some(base), reference).map_err(unresolved)? == wanted {
                let target = self
                    .catalog
                    .resolve_from(Some(base), reference)
                    .map_err(unresolved)?;
                return self.value(target.schema, target.def, value, path);
            }
        }
        if def.closed {
            Err(ValidationError::new(path, Rule::UnionTypeNotAllowed(found.to_string())))
        } else {
            Ok(())
        }
    }
}

fn integer_value(def: &IntegerDef, value: &Value, path: &str) -> ValidationResult {
    let n = match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| ValidationError::new(path, Rule::NotAnInteger))?,
        other => return Err(wrong_kind("integer", other, path)),
    };
    let fail = |rule| Err(ValidationError::new(path, rule));
    if let Some(expected) = def.constant.filter(|c| *c != n) {
        return fail(Rule::ConstMismatch(expected.to_string()));
    }
    if let Some(allowed) = &def.allowed {
        if !allowed.contains(&n) {
            return fail(Rule::IntegerNotInEnum);
        }
    }
    if let Some(min) = def.minimum.filter(|min| n < *min) {
        return fail(Rule::BelowMinimum { min, actual: n });
    }
    if let Some(max) = def.maximum.filter(|max| n > *max) {
        return fail(Rule::AboveMaximum { max, actual: n });
    }
    Ok(())
}

/// `{"$bytes": "<base64>"}`; lengths apply to the decoded size.
fn bytes_value(def: &BytesDef, value: &Value, path: &str) -> ValidationResult {
    let encoded = value
        .as_object()
        .and_then(|o| o.get("$bytes"))
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::new(path, Rule::InvalidBytes))?;
    let body = encoded.trim_end_matches('=');
    let base64_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '-' | '_');
    if !body.chars().all(base64_char) || body.len() % 4 == 1 {
        return Err(ValidationError::new(path, Rule::InvalidBytes));
    }
    let len = body.len() * 3 / 4;
    if let Some(min) = def.min_length.filter(|min| len < *min) {
        return Err(ValidationError::new(path, Rule::BytesTooShort { min, actual: len }));
    }
    if let Some(max) = def.max_length.filter(|max| len > *max) {
        return Err(ValidationError::new(path, Rule::BytesTooLong { max, actual: len }));
    }
    Ok(())
}

/// `{"$type": "blob", "ref": {"$link": cid}, "mimeType": ..., "size": ...}`.
fn blob_value(def: &BlobDef, value: &Value, path: &str) -> ValidationResult {
    let fail = |reason| ValidationError::new(path, Rule::InvalidBlob(reason));
    let fields = value.as_object().ok_or_else(|| fail("not an object"))?;
    if fields.get(TYPE_FIELD).and_then(Value::as_str) != Some("blob") {
        return Err(fail("$type must be blob"));
    }
    let link = fields.get("ref").and_then(link_of).ok_or_else(|| fail("missing ref"))?;
    if !format::check(StringFormat::Cid, link, false) {
        return Err(fail("ref is not a cid"));
    }
    let mime = fields
        .get("mimeType")
        .and_then(Value::as_str)
        .ok_or_else(|| fail("missing mimeType"))?;
    let size = fields
        .get("size")
        .and_then(Value::as_u64)
        .ok_or_else(|| fail("size must be a non-negative integer"))?;

    if !def.accept.is_empty() && !def.accept.iter().any(|pattern| mime_matches(pattern, mime)) {
        return Err(ValidationError::new(path, Rule::BlobTypeNotAccepted(mime.to_string())));
    }
    if let Some(max) = def.max_size.filter(|max| size > *max) {
        return Err(ValidationError::new(path, Rule::BlobTooLarge { max, actual: size }));
    }
    Ok(())
}

fn mime_matches(pattern: &str, mime: &str) -> bool {
    match pattern.strip_suffix("/*") {
        _ if pattern == "*/*" => true,
        Some(major) => mime.split('/').next() == Some(major),
        None => pattern == mime,
    }
}

fn link_of(value: &Value) -> Option<&str> {
    value.as_object()?.get("$link")?.as_str()
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn wrong_kind(expected: &'static str, value: &Value, path: &str) -> ValidationError {
    ValidationError::new(
        path,
        Rule::WrongKind {
            expected,
            found: kind(value),
        },
    )
}
