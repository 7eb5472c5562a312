//! Template discovery.
//!
//! A file input is audited as-is. A directory input is walked recursively:
//!
//! - `.gitignore` and `.bastionignore` files are respected (via `ignore`);
//! - hidden files and directories are skipped;
//! - a file is kept when its **file name** fully matches the template
//!   pattern;
//! - results are sorted by path.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::{CoreError, CoreResult};

/// File-name pattern used when none is configured.
pub const DEFAULT_TEMPLATE_PATTERN: &str = r"..*\.json|..*\.yaml|..*\.yml|..*\.template";

/// Name of the per-directory ignore file.
pub const IGNORE_FILE_NAME: &str = ".bastionignore";

/// Compiles a template file-name pattern. The pattern must match the whole
/// file name.
///
/// # Errors
///
/// Returns [`CoreError::Pattern`] if `pattern` is not a valid regex.
pub fn template_pattern(pattern: &str) -> CoreResult<Regex> {
    Ok(Regex::new(&format!("^(?:{pattern})$"))?)
}

/// Lists the templates to audit under `input`, in audit order.
///
/// # Errors
///
/// Returns [`CoreError::InputNotFound`] if `input` does not exist.
pub fn discover_templates(input: &Path, pattern: &Regex) -> CoreResult<Vec<PathBuf>> {
    if !input.exists() {
        return Err(CoreError::InputNotFound(input.to_path_buf()));
    }
    if input.is_file() {
        debug!(path = %input.display(), "single template input");
        return Ok(vec![input.to_path_buf()]);
    }

    let mut walker = WalkBuilder::new(input);
    walker
        .follow_links(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .add_custom_ignore_filename(IGNORE_FILE_NAME)
        .hidden(true)
        .sort_by_file_path(|a, b| a.cmp(b));

    let mut templates = Vec::new();
    let mut skipped = 0_u64;

    for entry in walker.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "error walking directory entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| pattern.is_match(name));
        if matches {
            templates.push(path.to_path_buf());
        } else {
            debug!(path = %path.display(), "skipping file that does not match the template pattern");
            skipped += 1;
        }
    }

    templates.sort();
    info!(
        root = %input.display(),
        templates = templates.len(),
        skipped,
        "template discovery complete"
    );
    Ok(templates)
}
