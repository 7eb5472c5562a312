//! Batch audits over a file or directory tree.

use std::path::Path;

use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{AuditEngine, FileAuditResult};
use crate::scanner::discover_templates;
use crate::CoreError;

// ---------------------------------------------------------------------------
// AggregateResult
// ---------------------------------------------------------------------------

/// Audit outcome for one discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateEntry {
    /// Path of the file as discovered.
    pub filename: String,
    pub file_results: FileAuditResult,
}

/// Per-file results in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AggregateResult {
    entries: Vec<AggregateEntry>,
}

impl AggregateResult {
    #[must_use]
    pub fn entries(&self) -> &[AggregateEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of every file's failure count.
    #[must_use]
    pub fn total_failure_count(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.file_results.failure_count())
            .fold(0_u32, u32::saturating_add)
    }
}

impl From<Vec<AggregateEntry>> for AggregateResult {
    fn from(entries: Vec<AggregateEntry>) -> Self {
        Self { entries }
    }
}

impl IntoIterator for AggregateResult {
    type Item = AggregateEntry;
    type IntoIter = std::vec::IntoIter<AggregateEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Aggregate audit
// ---------------------------------------------------------------------------

impl AuditEngine {
    /// Audits every template found under `input_path`.
    ///
    /// Files are audited in parallel on a pool of
    /// [`EngineOptions::jobs`](crate::EngineOptions::jobs) threads and the
    /// results come back in discovery order. A file that cannot be read, or
    /// whose audit fails with a rule error, gets a single FATAL violation and
    /// the batch continues.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InputNotFound`] if `input_path` does not exist.
    /// - [`CoreError::Io`] if the parameters file cannot be read.
    /// - [`CoreError::ThreadPool`] if the worker pool cannot be built.
    pub fn audit_aggregate(
        &self,
        input_path: &Path,
        parameters_path: Option<&Path>,
        template_pattern: &Regex,
    ) -> Result<AggregateResult, CoreError> {
        let templates = discover_templates(input_path, template_pattern)?;
        let parameters = parameters_path.map(read_parameters).transpose()?;

        if templates.is_empty() {
            info!(input = %input_path.display(), "no templates to audit");
            return Ok(AggregateResult::default());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options().jobs.unwrap_or(0))
            .build()
            .map_err(|e| CoreError::ThreadPool(e.to_string()))?;

        let entries: Vec<AggregateEntry> = pool.install(|| {
            templates
                .par_iter()
                .map(|path| self.audit_file(path, parameters.as_deref()))
                .collect()
        });

        let result = AggregateResult::from(entries);
        info!(
            files = result.len(),
            failures = result.total_failure_count(),
            "aggregate audit complete"
        );
        Ok(result)
    }

    fn audit_file(&self, path: &Path, parameters: Option<&str>) -> AggregateEntry {
        let filename = path.display().to_string();

        let file_results = match std::fs::read_to_string(path) {
            Ok(document) => match self.audit(&document, parameters) {
                Ok(result) => result,
                Err(err) => {
                    warn!(file = %filename, error = %err, "rule failure aborted file audit");
                    FileAuditResult::fatal(err.to_string())
                }
            },
            Err(err) => {
                warn!(file = %filename, error = %err, "failed to read template");
                FileAuditResult::fatal(format!("failed to read '{filename}': {err}"))
            }
        };

        AggregateEntry {
            filename,
            file_results,
        }
    }
}

fn read_parameters(path: &Path) -> Result<String, CoreError> {
    std::fs::read_to_string(path).map_err(|e| {
        CoreError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot read parameters file '{}': {e}", path.display()),
        ))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::{rule_set, Scripted};
    use crate::scanner::{template_pattern, DEFAULT_TEMPLATE_PATTERN};
    use crate::EngineOptions;
    use bastion_policy::ViolationFilter;
    use bastion_rules::{RuleSet, Violation, ViolationKind, FATAL_RULE_ID};
    use std::fs;

    const BUCKET: &str = r#"{"Resources": {"Bucket": {"Type": "AWS::S3::Bucket"}}}"#;
    const VOLUME: &str = "Resources:\n  Disk:\n    Type: AWS::EC2::Volume\n";

    fn builtin_engine(jobs: Option<usize>) -> AuditEngine {
        AuditEngine::new(
            RuleSet::with_builtin().unwrap(),
            ViolationFilter::unrestricted(),
            EngineOptions {
                isolate_rule_exceptions: false,
                jobs,
            },
        )
    }

    fn pattern() -> Regex {
        template_pattern(DEFAULT_TEMPLATE_PATTERN).unwrap()
    }

    fn file_names(result: &AggregateResult) -> Vec<String> {
        result
            .entries()
            .iter()
            .map(|e| {
                Path::new(&e.filename)
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    #[test]
    fn directory_results_follow_discovery_order() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["d.json", "b.json", "a.yaml", "c.template"] {
            fs::write(tmp.path().join(name), BUCKET).unwrap();
        }

        let result = builtin_engine(Some(4))
            .audit_aggregate(tmp.path(), None, &pattern())
            .unwrap();
        assert_eq!(
            file_names(&result),
            vec!["a.yaml", "b.json", "c.template", "d.json"]
        );
    }

    #[test]
    fn total_is_sum_of_file_failures() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("bucket.json"), BUCKET).unwrap();
        fs::write(tmp.path().join("volume.yaml"), VOLUME).unwrap();
        fs::write(tmp.path().join("broken.json"), "{").unwrap();

        let result = builtin_engine(None)
            .audit_aggregate(tmp.path(), None, &pattern())
            .unwrap();

        let per_file: Vec<u32> = result
            .entries()
            .iter()
            .map(|e| e.file_results.failure_count())
            .collect();
        // broken.json -> FATAL, bucket.json -> warnings only, volume.yaml -> F1
        assert_eq!(per_file, vec![1, 0, 1]);
        assert_eq!(result.total_failure_count(), 2);
    }

    #[test]
    fn single_file_input() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("volume.yaml");
        fs::write(&file, VOLUME).unwrap();

        let result = builtin_engine(None)
            .audit_aggregate(&file, None, &pattern())
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries()[0].filename, file.display().to_string());
        assert_eq!(result.total_failure_count(), 1);
    }

    #[test]
    fn no_matching_files_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("README.md"), "# docs").unwrap();

        let result = builtin_engine(None)
            .audit_aggregate(tmp.path(), None, &pattern())
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.total_failure_count(), 0);
    }

    #[test]
    fn missing_input_is_an_error() {
        let err = builtin_engine(None)
            .audit_aggregate(Path::new("/nonexistent/templates"), None, &pattern())
            .unwrap_err();
        assert!(matches!(err, CoreError::InputNotFound(_)));
    }

    #[test]
    fn unreadable_parameters_file_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("bucket.json"), BUCKET).unwrap();

        let err = builtin_engine(None)
            .audit_aggregate(
                tmp.path(),
                Some(&tmp.path().join("missing-params.json")),
                &pattern(),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
        assert!(err.to_string().contains("missing-params.json"));
    }

    #[test]
    fn parameters_apply_to_every_file() {
        let tmp = tempfile::tempdir().unwrap();
        let templates = tmp.path().join("templates");
        fs::create_dir(&templates).unwrap();
        let volume = "Parameters:\n  Enc:\n    Type: String\nResources:\n  Disk:\n    \
                      Type: AWS::EC2::Volume\n    Properties:\n      Encrypted: !Ref Enc\n";
        fs::write(templates.join("one.yaml"), volume).unwrap();
        fs::write(templates.join("two.yaml"), volume).unwrap();
        let params = tmp.path().join("params.json");
        fs::write(&params, r#"{"Parameters": {"Enc": true}}"#).unwrap();

        let engine = builtin_engine(Some(2));
        let without = engine.audit_aggregate(&templates, None, &pattern()).unwrap();
        let with = engine
            .audit_aggregate(&templates, Some(&params), &pattern())
            .unwrap();

        assert_eq!(without.total_failure_count(), 2);
        assert_eq!(with.total_failure_count(), 0);
    }

    #[test]
    fn rule_error_is_contained_per_file() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.json"), BUCKET).unwrap();
        fs::write(tmp.path().join("b.json"), BUCKET).unwrap();

        let engine = AuditEngine::new(
            rule_set(vec![Scripted::Fail("F9", "unsupported construct")]),
            ViolationFilter::unrestricted(),
            EngineOptions::default(),
        );
        let result = engine.audit_aggregate(tmp.path(), None, &pattern()).unwrap();

        assert_eq!(result.len(), 2);
        for entry in result.entries() {
            let violations = entry.file_results.violations();
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].id(), FATAL_RULE_ID);
            assert_eq!(violations[0].message(), "rule F9 failed: unsupported construct");
        }
        assert_eq!(result.total_failure_count(), 2);
    }

    #[test]
    fn serializes_as_array_of_entries() {
        let result = AggregateResult::from(vec![AggregateEntry {
            filename: "t.json".into(),
            file_results: FileAuditResult::from_violations(vec![Violation::new(
                "W35",
                ViolationKind::Warning,
                "logging",
            )]),
        }]);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "filename": "t.json",
                "file_results": {
                    "failure_count": 0,
                    "violations": [{"id": "W35", "kind": "WARNING", "message": "logging"}]
                }
            }])
        );
    }
}
