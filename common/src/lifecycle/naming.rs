//! Object paths for extractor containers and their documents.
//!
//! Layout: `{root}/{extractor_id}/{doc_type}/{file_name}`.

use crate::error::AppError;

pub fn container_prefix(root: &str, extractor_id: &str) -> String {
    format!("{}/{extractor_id}", root.trim_end_matches('/'))
}

pub fn category_prefix(root: &str, extractor_id: &str, doc_type: &str) -> String {
    format!("{}/{doc_type}", container_prefix(root, extractor_id))
}

/// Accept `value` only if it can be used as exactly one path segment.
pub fn path_segment<'a>(value: &'a str, what: &str) -> Result<&'a str, AppError> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(AppError::Validation(format!("Invalid {what}: {value:?}")));
    }
    Ok(value)
}

/// Characters object stores reserve or ask callers to avoid in keys.
const RESERVED: &[char] = &[
    '{', '}', '^', '%', '`', '[', ']', '"', '<', '>', '~', '#', '|', '*', '?',
];

/// Reduce an uploaded file name to a single object-path segment.
///
/// Directory components are dropped. Everything else, spaces, dots and
/// non-ASCII letters included, is kept as uploaded, so the original name can
/// be read back from the stored path. Only control characters and characters
/// reserved in object keys become `_`.
pub fn sanitize_file_name(file_name: &str) -> Result<String, AppError> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or_default();

    if base.trim().is_empty() || base == "." || base == ".." {
        return Err(AppError::Validation("File name is missing".to_string()));
    }

    Ok(base
        .chars()
        .map(|c| {
            if c.is_control() || RESERVED.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect())
}

/// Name of the `copy`-th alternative for `file_name`: `a.pdf` -> `a-copy(2).pdf`.
pub fn copy_name(file_name: &str, copy: u32) -> String {
    match split_extension(file_name) {
        Some((stem, ext)) => format!("{stem}-copy({copy}).{ext}"),
        None => format!("{file_name}-copy({copy})"),
    }
}

fn split_extension(file_name: &str) -> Option<(&str, &str)> {
    file_name
        .rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
}
