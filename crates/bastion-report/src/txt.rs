//! Plain-text renderer.
//!
//! One block per file, one sub-block per violation:
//!
//! ```text
//! ------------------------------------------------------------
//! templates/bucket.json
//! ------------------------------------------------------------
//! | WARN W35
//! |
//! | Resources: ["Bucket"]
//! |
//! | S3 Bucket should have access logging configured
//!
//! Failures count: 0
//! Warnings count: 1
//! ```

use std::io::Write;

use bastion_core::{AggregateEntry, AggregateResult};
use bastion_rules::Violation;

use crate::{ReportError, Renderer};

const RULE: &str = "------------------------------------------------------------";

/// Renders human-readable per-file blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxtRenderer;

impl Renderer for TxtRenderer {
    fn render(&self, result: &AggregateResult, out: &mut dyn Write) -> Result<(), ReportError> {
        for entry in result.entries() {
            write_entry(entry, out)?;
        }
        Ok(())
    }
}

fn write_entry(entry: &AggregateEntry, out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "{RULE}")?;
    writeln!(out, "{}", entry.filename)?;
    writeln!(out, "{RULE}")?;

    for violation in entry.file_results.violations() {
        write_violation(violation, out)?;
        writeln!(out)?;
    }

    writeln!(out, "Failures count: {}", entry.file_results.failure_count())?;
    writeln!(out, "Warnings count: {}", entry.file_results.warning_count())?;
    writeln!(out)
}

fn write_violation(violation: &Violation, out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "| {} {}", violation.kind().short_label(), violation.id())?;
    writeln!(out, "|")?;
    if !violation.logical_resource_ids().is_empty() {
        let ids: Vec<String> = violation
            .logical_resource_ids()
            .iter()
            .map(|id| format!("\"{id}\""))
            .collect();
        writeln!(out, "| Resources: [{}]", ids.join(", "))?;
        writeln!(out, "|")?;
    }
    writeln!(out, "| {}", violation.message())
}
