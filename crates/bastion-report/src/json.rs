//! JSON renderer.
//!
//! The report is the aggregate result itself:
//!
//! ```json
//! [
//!   {
//!     "filename": "templates/bucket.json",
//!     "file_results": {
//!       "failure_count": 0,
//!       "violations": [
//!         {"id": "W35", "kind": "WARNING", "message": "...", "logical_resource_ids": ["Bucket"]}
//!       ]
//!     }
//!   }
//! ]
//! ```
//!
//! `logical_resource_ids` is omitted when a violation names no resources.

use std::io::Write;

use bastion_core::AggregateResult;

use crate::{ReportError, Renderer};

/// Renders the aggregate result as a JSON array.
#[derive(Debug, Clone, Copy)]
pub struct JsonRenderer {
    /// Indent the output.
    pub pretty: bool,
}

impl Default for JsonRenderer {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl Renderer for JsonRenderer {
    fn render(&self, result: &AggregateResult, out: &mut dyn Write) -> Result<(), ReportError> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *out, result)?;
        } else {
            serde_json::to_writer(&mut *out, result)?;
        }
        writeln!(out)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{AggregateEntry, FileAuditResult};
    use bastion_rules::{Violation, ViolationKind};
    use serde_json::json;

    fn sample() -> AggregateResult {
        AggregateResult::from(vec![
            AggregateEntry {
                filename: "a.json".into(),
                file_results: FileAuditResult::from_violations(vec![
                    Violation::new("F1", ViolationKind::Failing, "EBS volume should be encrypted")
                        .with_resources(vec!["Disk".into()]),
                ]),
            },
            AggregateEntry {
                filename: "b.yaml".into(),
                file_results: FileAuditResult::fatal("expected value at line 1 column 2"),
            },
        ])
    }

    fn render(renderer: JsonRenderer, result: &AggregateResult) -> String {
        let mut out = Vec::new();
        renderer.render(result, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn renders_aggregate_shape() {
        let text = render(JsonRenderer::default(), &sample());
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(
            value,
            json!([
                {
                    "filename": "a.json",
                    "file_results": {
                        "failure_count": 1,
                        "violations": [{
                            "id": "F1",
                            "kind": "FAILING",
                            "message": "EBS volume should be encrypted",
                            "logical_resource_ids": ["Disk"]
                        }]
                    }
                },
                {
                    "filename": "b.yaml",
                    "file_results": {
                        "failure_count": 1,
                        "violations": [{
                            "id": "FATAL",
                            "kind": "FAILING",
                            "message": "expected value at line 1 column 2"
                        }]
                    }
                }
            ])
        );
    }

    #[test]
    fn compact_output_is_one_line() {
        let text = render(JsonRenderer { pretty: false }, &sample());
        assert_eq!(text.lines().count(), 1);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn empty_aggregate_is_empty_array() {
        let text = render(JsonRenderer::default(), &AggregateResult::default());
        assert_eq!(text.trim(), "[]");
    }
}
