use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{LexiconError, LexiconResult};
use crate::schema::{LexiconDoc, SchemaDef};

const MAIN: &str = "main";
const TEST_DATA_DIR: &str = "test-data";

/// A loaded schema document.
#[derive(Clone, Debug)]
pub struct Schema {
    pub id: String,
    pub revision: Option<u32>,
    pub defs: BTreeMap<String, SchemaDef>,
    /// File the schema was loaded from, if any.
    pub source: Option<PathBuf>,
}

/// A definition found by [`Catalog::resolve`].
#[derive(Clone, Copy, Debug)]
pub struct Resolved<'a> {
    /// Schema holding the definition; relative references inside it resolve
    /// against this id.
    pub schema: &'a str,
    pub fragment: &'a str,
    pub def: &'a SchemaDef,
}

impl Resolved<'_> {
    /// `id` for main definitions, `id#fragment` otherwise.
    pub fn name(&self) -> String {
        if self.fragment == MAIN {
            self.schema.to_string()
        } else {
            format!("{}#{}", self.schema, self.fragment)
        }
    }
}

/// Resolution progress of one reference during a resolution pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveState {
    Resolving,
    Resolved(String),
    Failed(String),
}

/// Read-only set of schemas keyed by id.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    schemas: HashMap<String, Schema>,
}

/// Split a reference into schema id and fragment. `#frag` takes its schema
/// from `base`; a bare id means its `main` definition.
pub fn split_reference<'a>(base: Option<&'a str>, reference: &'a str) -> LexiconResult<(&'a str, &'a str)> {
    let invalid = || LexiconError::InvalidReference(reference.to_string());
    let (schema, fragment) = match reference.split_once('#') {
        Some(("", fragment)) => (base.ok_or_else(invalid)?, fragment),
        Some((schema, fragment)) => (schema, fragment),
        None => (reference, MAIN),
    };
    if schema.is_empty() || fragment.is_empty() || fragment.contains('#') {
        return Err(invalid());
    }
    Ok((schema, fragment))
}

/// Canonical `id#fragment` form of a reference.
pub fn canonical_reference(base: Option<&str>, reference: &str) -> LexiconResult<String> {
    let (schema, fragment) = split_reference(base, reference)?;
    Ok(format!("{schema}#{fragment}"))
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` schema under `dir`, skipping `test-data`
    /// directories. Each schema's id is its path relative to `dir` without
    /// the extension, with separators replaced by dots.
    pub fn load_dir(dir: impl AsRef<Path>) -> LexiconResult<Self> {
        let dir = dir.as_ref();
        let mut catalog = Self::new();
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == TEST_DATA_DIR));
        for entry in walker {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let id = id_from_path(dir, path)?;
            let text = fs::read_to_string(path).map_err(|source| LexiconError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            catalog.add_document(&id, &text, Some(path))?;
            debug!(id, path = %path.display(), "schema loaded");
        }
        info!(dir = %dir.display(), schemas = catalog.len(), "lexicon catalog loaded");
        Ok(catalog)
    }

    /// Add one schema from its JSON text.
    pub fn add_json(&mut self, id: &str, text: &str) -> LexiconResult<()> {
        self.add_document(id, text, None)
    }

    fn add_document(&mut self, id: &str, text: &str, path: Option<&Path>) -> LexiconResult<()> {
        let display_path = path.map_or_else(|| PathBuf::from(id), Path::to_path_buf);
        let doc: LexiconDoc = serde_json::from_str(text).map_err(|e| LexiconError::Parse {
            path: display_path.clone(),
            reason: e.to_string(),
        })?;
        if doc.lexicon != 1 {
            return Err(LexiconError::Parse {
                path: display_path,
                reason: format!("unsupported lexicon version {}", doc.lexicon),
            });
        }
        if let Some(declared) = &doc.id {
            if declared != id {
                return Err(LexiconError::IdMismatch {
                    path: display_path,
                    declared: declared.clone(),
                    derived: id.to_string(),
                });
            }
        }
        if self.schemas.contains_key(id) {
            return Err(LexiconError::Duplicate(id.to_string()));
        }
        self.schemas.insert(
            id.to_string(),
            Schema {
                id: id.to_string(),
                revision: doc.revision,
                defs: doc.defs,
                source: path.map(Path::to_path_buf),
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn schema(&self, id: &str) -> Option<&Schema> {
        self.schemas.get(id)
    }

    /// Schema ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Look up a definition without following `ref` chains.
    pub fn lookup(&self, base: Option<&str>, reference: &str) -> LexiconResult<Resolved<'_>> {
        let (schema_id, fragment) = split_reference(base, reference)?;
        let Some((id, schema)) = self.schemas.get_key_value(schema_id) else {
            return Err(LexiconError::UnknownSchema {
                reference: reference.to_string(),
                schema: schema_id.to_string(),
            });
        };
        let Some((fragment, def)) = schema.defs.get_key_value(fragment) else {
            return Err(LexiconError::UnknownDefinition {
                reference: reference.to_string(),
                schema: schema_id.to_string(),
                fragment: fragment.to_string(),
            });
        };
        Ok(Resolved {
            schema: id.as_str(),
            fragment: fragment.as_str(),
            def,
        })
    }

    /// Resolve `id`, `id#fragment` or (with a base) `#fragment`, following
    /// `ref` definitions until a concrete definition is reached.
    pub fn resolve(&self, reference: &str) -> LexiconResult<Resolved<'_>> {
        self.resolve_from(None, reference)
    }

    pub fn resolve_from(&self, base: Option<&str>, reference: &str) -> LexiconResult<Resolved<'_>> {
        Resolver::new(self).resolve(base, reference)
    }

    /// Resolve every reference reachable from every definition. Returns one
    /// error per reference that failed.
    pub fn check_references(&self) -> Vec<LexiconError> {
        let mut resolver = Resolver::new(self);
        let mut errors = Vec::new();
        for id in self.ids() {
            let Some(schema) = self.schemas.get(id) else {
                continue;
            };
            for (fragment, def) in &schema.defs {
                for reference in def.references() {
                    if let Err(e) = resolver.resolve(Some(id), reference) {
                        warn!(schema = id, fragment, reference, error = %e, "unresolvable reference");
                        errors.push(e);
                    }
                }
            }
        }
        errors
    }
}

/// One resolution pass. States persist across calls so repeated references
/// are resolved once and cycles are detected.
pub struct Resolver<'a> {
    catalog: &'a Catalog,
    states: HashMap<String, ResolveState>,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            states: HashMap::new(),
        }
    }

    pub fn state(&self, canonical: &str) -> Option<&ResolveState> {
        self.states.get(canonical)
    }

    pub fn resolve(&mut self, base: Option<&str>, reference: &str) -> LexiconResult<Resolved<'a>> {
        let key = canonical_reference(base, reference)?;
        match self.states.get(&key) {
            Some(ResolveState::Resolving) => return Err(LexiconError::Cycle(key)),
            Some(ResolveState::Failed(reason)) => {
                return Err(LexiconError::InvalidReference(format!("{key}: {reason}")))
            }
            Some(ResolveState::Resolved(target)) => {
                let target = target.clone();
                return self.catalog.lookup(None, &target);
            }
            None => {}
        }

        self.states.insert(key.clone(), ResolveState::Resolving);
        let result = self.catalog.lookup(base, reference).and_then(|found| match found.def {
            SchemaDef::Ref(next) => self.resolve(Some(found.schema), &next.reference),
            _ => Ok(found),
        });
        let state = match &result {
            Ok(found) => ResolveState::Resolved(format!("{}#{}", found.schema, found.fragment)),
            Err(e) => ResolveState::Failed(e.to_string()),
        };
        self.states.insert(key, state);
        result
    }
}

fn id_from_path(root: &Path, path: &Path) -> LexiconResult<String> {
    let relative = path.strip_prefix(root).map_err(|_| LexiconError::Parse {
        path: path.to_path_buf(),
        reason: "schema outside the catalog directory".into(),
    })?;
    let stem = relative.with_extension("");
    let parts: Vec<String> = stem
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("."))
}
