//! Lexicon schemas: loading a catalog of schema documents, resolving
//! references between them and validating record data.

mod catalog;
mod error;
mod format;
mod handle;
pub mod schema;
mod validate;

pub use catalog::{canonical_reference, split_reference, Catalog, ResolveState, Resolved, Resolver, Schema};
pub use error::{LexiconError, LexiconResult};
pub use handle::CatalogHandle;
pub use schema::{LexiconDoc, SchemaDef, StringFormat};
pub use validate::{
    validate_record, validate_record_bytes, validate_record_str, Rule, ValidateFlags,
    ValidationError, ValidationResult,
};
