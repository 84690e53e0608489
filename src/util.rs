#[cfg(unix)]
use std::os::unix::fs::PermissionsExt as _;
use std::{fs, path::Path};

use tracing::debug;

pub(crate) fn restrict_file_permissions(path: &Path) {
    #[cfg(unix)]
    if path.exists() {
        if let Err(error) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            debug!("restrict_file_permissions: failed for {path:?}: {error}");
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Writes `content` next to `path` and renames it into place.
pub(crate) fn write_private_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension(format!("tmp-{}", std::process::id()));
    fs::write(&tmp_path, content)?;
    restrict_file_permissions(&tmp_path);
    fs::rename(&tmp_path, path)
}

/// Hides everything after `access_token=` in a redirect URL or fragment.
pub fn redact_access_token(input: &str) -> String {
    match input.find("access_token=") {
        Some(start) => {
            let value_start = start + "access_token=".len();
            let value_end = input[value_start..]
                .find('&')
                .map_or(input.len(), |offset| value_start + offset);
            format!("{}***{}", &input[..value_start], &input[value_end..])
        }
        None => input.to_string(),
    }
}

pub fn truncate_message(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }

    let truncated: String = input.chars().take(max_chars).collect();
    format!("{truncated}...")
}
