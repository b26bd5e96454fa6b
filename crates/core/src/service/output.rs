//! Output path resolution.

use std::path::{Path, PathBuf};

use crate::catalog::Format;

/// Picks the destination of a conversion.
///
/// An explicit `output_path` always wins. Otherwise the output goes to
/// `output_dir` (or the input's directory) as `<stem>.<target>`. When that
/// names the input itself, `_converted` is appended to the stem.
pub fn resolve_output_path(
    input: &Path,
    target: &Format,
    output_path: Option<&Path>,
    output_dir: Option<&Path>,
) -> PathBuf {
    if let Some(path) = output_path {
        return path.to_path_buf();
    }

    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let candidate = dir.join(format!("{}.{}", stem, target));
    if names_input(&candidate, input) {
        dir.join(format!("{}_converted.{}", stem, target))
    } else {
        candidate
    }
}

/// Whether `candidate` refers to `input`, ignoring file name case.
fn names_input(candidate: &Path, input: &Path) -> bool {
    if candidate == input {
        return true;
    }
    if let (Ok(a), Ok(b)) = (candidate.canonicalize(), input.canonicalize()) {
        if a == b {
            return true;
        }
    }

    let same_dir = match (candidate.parent(), input.parent()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    let same_name = match (candidate.file_name(), input.file_name()) {
        (Some(a), Some(b)) => a.to_string_lossy().eq_ignore_ascii_case(&b.to_string_lossy()),
        _ => false,
    };
    same_dir && same_name
}
