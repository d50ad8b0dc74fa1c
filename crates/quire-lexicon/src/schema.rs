//! Typed model of Lexicon schema documents.

use std::collections::BTreeMap;

use serde::Deserialize;

/// One schema file.
#[derive(Clone, Debug, Deserialize)]
pub struct LexiconDoc {
    /// Lexicon language version.
    pub lexicon: u32,
    /// Declared id. When present it must equal the id derived from the path.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub revision: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    pub defs: BTreeMap<String, SchemaDef>,
}

/// A named definition inside a schema document.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SchemaDef {
    Record(RecordDef),
    Object(ObjectDef),
    String(StringDef),
    Integer(IntegerDef),
    Boolean(BooleanDef),
    Array(ArrayDef),
    Ref(RefDef),
    Union(UnionDef),
    Unknown(UnknownDef),
    Token(TokenDef),
    Bytes(BytesDef),
    CidLink(CidLinkDef),
    Blob(BlobDef),
    Null(NullDef),
    Params(ParamsDef),
    Query(XrpcDef),
    Procedure(XrpcDef),
    Subscription(XrpcDef),
}

impl SchemaDef {
    /// Name of the definition type as written in schema files.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Record(_) => "record",
            Self::Object(_) => "object",
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::Array(_) => "array",
            Self::Ref(_) => "ref",
            Self::Union(_) => "union",
            Self::Unknown(_) => "unknown",
            Self::Token(_) => "token",
            Self::Bytes(_) => "bytes",
            Self::CidLink(_) => "cid-link",
            Self::Blob(_) => "blob",
            Self::Null(_) => "null",
            Self::Params(_) => "params",
            Self::Query(_) => "query",
            Self::Procedure(_) => "procedure",
            Self::Subscription(_) => "subscription",
        }
    }

    /// References made directly by this definition or its inline children.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Record(def) => def.record.collect_references(out),
            Self::Object(def) => def.collect_references(out),
            Self::Array(def) => def.items.collect_references(out),
            Self::Ref(def) => out.push(def.reference.as_str()),
            Self::Union(def) => out.extend(def.refs.iter().map(String::as_str)),
            Self::Params(def) => {
                for prop in def.properties.values() {
                    prop.collect_references(out);
                }
            }
            Self::Query(def) | Self::Procedure(def) | Self::Subscription(def) => {
                if let Some(params) = &def.parameters {
                    for prop in params.properties.values() {
                        prop.collect_references(out);
                    }
                }
                for body in [&def.input, &def.output, &def.message].into_iter().flatten() {
                    if let Some(schema) = &body.schema {
                        schema.collect_references(out);
                    }
                }
            }
            Self::String(_)
            | Self::Integer(_)
            | Self::Boolean(_)
            | Self::Unknown(_)
            | Self::Token(_)
            | Self::Bytes(_)
            | Self::CidLink(_)
            | Self::Blob(_)
            | Self::Null(_) => {}
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct RecordDef {
    /// Record key type: `tid`, `any`, `nsid`, `literal:<value>`.
    #[serde(default)]
    pub key: Option<String>,
    pub record: ObjectDef,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDef {
    #[serde(default)]
    pub properties: BTreeMap<String, SchemaDef>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub nullable: Vec<String>,
}

impl ObjectDef {
    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        for prop in self.properties.values() {
            prop.collect_references(out);
        }
    }
}

/// Named string formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringFormat {
    Datetime,
    Did,
    Handle,
    Nsid,
    Uri,
    AtUri,
    Language,
    Tid,
    RecordKey,
    AtIdentifier,
    Cid,
}

impl StringFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Datetime => "datetime",
            Self::Did => "did",
            Self::Handle => "handle",
            Self::Nsid => "nsid",
            Self::Uri => "uri",
            Self::AtUri => "at-uri",
            Self::Language => "language",
            Self::Tid => "tid",
            Self::RecordKey => "record-key",
            Self::AtIdentifier => "at-identifier",
            Self::Cid => "cid",
        }
    }
}

impl std::fmt::Display for StringFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringDef {
    #[serde(default)]
    pub format: Option<StringFormat>,
    /// Limits in UTF-8 bytes.
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Limits in Unicode scalar values.
    #[serde(default)]
    pub min_graphemes: Option<usize>,
    #[serde(default)]
    pub max_graphemes: Option<usize>,
    #[serde(default, rename = "enum")]
    pub allowed: Option<Vec<String>>,
    #[serde(default, rename = "const")]
    pub constant: Option<String>,
    /// Advisory only; never enforced.
    #[serde(default)]
    pub known_values: Vec<String>,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct IntegerDef {
    #[serde(default)]
    pub minimum: Option<i64>,
    #[serde(default)]
    pub maximum: Option<i64>,
    #[serde(default, rename = "enum")]
    pub allowed: Option<Vec<i64>>,
    #[serde(default, rename = "const")]
    pub constant: Option<i64>,
    #[serde(default)]
    pub default: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct BooleanDef {
    #[serde(default, rename = "const")]
    pub constant: Option<bool>,
    #[serde(default)]
    pub default: Option<bool>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayDef {
    pub items: Box<SchemaDef>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RefDef {
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UnionDef {
    pub refs: Vec<String>,
    /// A closed union rejects `$type` values outside `refs`.
    #[serde(default)]
    pub closed: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UnknownDef {}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenDef {}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BytesDef {
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CidLinkDef {}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobDef {
    #[serde(default)]
    pub accept: Vec<String>,
    #[serde(default)]
    pub max_size: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NullDef {}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ParamsDef {
    #[serde(default)]
    pub properties: BTreeMap<String, SchemaDef>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// Query, procedure and subscription endpoints. Only their schemas matter
/// here; they never describe stored records.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct XrpcDef {
    #[serde(default)]
    pub parameters: Option<ParamsDef>,
    #[serde(default)]
    pub input: Option<BodyDef>,
    #[serde(default)]
    pub output: Option<BodyDef>,
    #[serde(default)]
    pub message: Option<BodyDef>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct BodyDef {
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub schema: Option<Box<SchemaDef>>,
}
