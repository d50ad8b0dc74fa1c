//! Record samples run against a lexicon catalog by `validate-lexicon`.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use quire_lexicon::{validate_record, Catalog, SchemaDef, ValidateFlags};
use serde_json::Value;
use walkdir::WalkDir;

const INVALID_MARKER: &str = "-invalid-";

/// Result of validating one sample file.
#[derive(Debug)]
pub struct SampleOutcome {
    pub path: PathBuf,
    /// The file name marks the sample as one that must be rejected.
    pub expect_invalid: bool,
    pub record_type: Option<String>,
    /// Why the sample was rejected, if it was.
    pub rejection: Option<String>,
}

impl SampleOutcome {
    /// Whether the sample behaved as its file name says it should.
    pub fn as_expected(&self) -> bool {
        match (self.expect_invalid, &self.record_type, &self.rejection) {
            // Unreadable or untyped samples are broken either way.
            (_, None, _) => false,
            (true, Some(_), rejection) => rejection.is_some(),
            (false, Some(_), rejection) => rejection.is_none(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SampleReport {
    pub outcomes: Vec<SampleOutcome>,
}

impl SampleReport {
    pub fn valid_total(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.expect_invalid).count()
    }

    pub fn valid_passed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.expect_invalid && o.as_expected())
            .count()
    }

    pub fn invalid_total(&self) -> usize {
        self.outcomes.iter().filter(|o| o.expect_invalid).count()
    }

    pub fn invalid_rejected(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.expect_invalid && o.as_expected())
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SampleOutcome> {
        self.outcomes.iter().filter(|o| !o.as_expected())
    }

    /// Record types with at least one accepted sample.
    pub fn tested_types(&self) -> BTreeSet<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.expect_invalid && o.as_expected())
            .filter_map(|o| o.record_type.as_deref())
            .collect()
    }
}

/// Validate every `.json` file under `dir` against the record type its
/// `$type` field names.
pub fn check_samples(catalog: &Catalog, dir: &Path, flags: ValidateFlags) -> anyhow::Result<SampleReport> {
    if !dir.is_dir() {
        bail!("test data path does not exist: {}", dir.display());
    }
    let mut report = SampleReport::default();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let expect_invalid = entry.file_name().to_string_lossy().contains(INVALID_MARKER);
        report.outcomes.push(check_one(catalog, path, expect_invalid, flags));
    }
    Ok(report)
}

fn check_one(catalog: &Catalog, path: &Path, expect_invalid: bool, flags: ValidateFlags) -> SampleOutcome {
    let mut outcome = SampleOutcome {
        path: path.to_path_buf(),
        expect_invalid,
        record_type: None,
        rejection: None,
    };
    let data: Value = match fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
    {
        Ok(data) => data,
        Err(reason) => {
            outcome.rejection = Some(format!("unreadable sample: {reason}"));
            return outcome;
        }
    };
    let Some(record_type) = data.get("$type").and_then(Value::as_str) else {
        outcome.rejection = Some("missing or invalid $type field".into());
        return outcome;
    };
    outcome.record_type = Some(record_type.to_string());
    outcome.rejection = validate_record(catalog, &data, record_type, flags)
        .err()
        .map(|e| e.to_string());
    outcome
}

/// Ids of schemas whose main definition is a record.
pub fn record_types(catalog: &Catalog) -> Vec<&str> {
    catalog
        .ids()
        .into_iter()
        .filter(|id| {
            catalog
                .schema(id)
                .and_then(|s| s.defs.get("main"))
                .is_some_and(|def| matches!(def, SchemaDef::Record(_)))
        })
        .collect()
}
