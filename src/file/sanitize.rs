//! Filename cleaning.

use super::MAX_FILENAME_LENGTH;
use crate::{HoardError, Result};

/// Reduce a client-supplied name to a single safe path component.
///
/// Path separators and null bytes are stripped and `..` sequences removed
/// until none remain. A name that ends up empty, is `.`, or exceeds
/// [`MAX_FILENAME_LENGTH`] bytes is rejected rather than replaced.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let mut name: String = raw
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .collect();

    while name.contains("..") {
        name = name.replace("..", "");
    }

    let name = name.trim().to_string();

    if name.is_empty() || name == "." {
        return Err(HoardError::Validation(format!("invalid filename: {raw:?}")));
    }
    if name.len() > MAX_FILENAME_LENGTH {
        return Err(HoardError::Validation(format!(
            "filename exceeds {MAX_FILENAME_LENGTH} bytes"
        )));
    }

    Ok(name)
}
