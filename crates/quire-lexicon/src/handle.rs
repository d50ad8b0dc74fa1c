use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::catalog::Catalog;
use crate::error::LexiconResult;

/// Shared, swappable catalog.
///
/// Readers take an `Arc` snapshot and keep using it for the whole
/// validation; a reload builds a complete new catalog before swapping it in,
/// so a failed reload leaves the current one published.
#[derive(Debug, Default)]
pub struct CatalogHandle {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    pub fn load_dir(dir: impl AsRef<Path>) -> LexiconResult<Self> {
        Ok(Self::new(Catalog::load_dir(dir)?))
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.current.read().expect("lock poisoned"))
    }

    /// Replace the published catalog.
    pub fn publish(&self, catalog: Catalog) -> Arc<Catalog> {
        let next = Arc::new(catalog);
        *self.current.write().expect("lock poisoned") = Arc::clone(&next);
        next
    }

    /// Rebuild from `dir` and publish the result.
    pub fn reload(&self, dir: impl AsRef<Path>) -> LexiconResult<Arc<Catalog>> {
        let dir = dir.as_ref();
        let catalog = Catalog::load_dir(dir)?;
        let schemas = catalog.len();
        let next = self.publish(catalog);
        info!(dir = %dir.display(), schemas, "lexicon catalog published");
        Ok(next)
    }
}
