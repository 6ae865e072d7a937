use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{error, info};

use crate::{
    error::{ErrorKind, GatewayError, Result},
    util::object,
};

/// Picks the local file a download is written to.
///
/// The returned path did not exist when it was checked. Nothing is reserved,
/// so two concurrent downloads of the same key into the same directory can
/// still pick the same name; the later writer wins.
pub fn resolve(requested: &Path, key: &str) -> Result<PathBuf> {
    let path = if is_directory_target(requested) {
        let file_name = object::basename(key);
        if file_name.is_empty() {
            return Err(GatewayError::new(
                ErrorKind::Download,
                format!("{}: {}", ErrorKind::Download.default_message(), key),
                format!("cannot derive a local file name from key {}", key),
            ));
        }
        info!(requested = %requested.display(), file_name = file_name, "directory target");
        requested.join(file_name)
    } else {
        requested.to_path_buf()
    };

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    ensure_parent(parent, key)?;

    let file_name = match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => {
            return Err(GatewayError::new(
                ErrorKind::Download,
                format!("{}: {}", ErrorKind::Download.default_message(), key),
                format!("{} does not name a file", path.display()),
            ));
        }
    };

    let (stem, extension) = split_name(&file_name);
    let mut candidate = path.clone();
    let mut counter: u64 = 1;
    while occupied(&candidate) {
        candidate = parent.join(format!("{}_{}{}", stem, counter, extension));
        counter += 1;
        info!(renamed = %candidate.display(), "local file exists, renaming");
    }

    Ok(candidate)
}

fn is_directory_target(requested: &Path) -> bool {
    let text = requested.to_string_lossy();
    requested.is_dir() || text.ends_with('/') || text.ends_with('\\')
}

fn ensure_parent(parent: &Path, key: &str) -> Result<()> {
    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }

    fs::create_dir_all(parent).map_err(|err| {
        error!(error_message=%err, error_group="create_dir", dir = %parent.display());
        GatewayError::download_failed(
            key,
            io::Error::new(
                err.kind(),
                format!("failed to create directory: {}, {}", parent.display(), err),
            ),
        )
    })?;
    info!(dir = %parent.display(), "created directory");

    Ok(())
}

/// Any directory entry counts, including dangling symlinks.
fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Splits at the last `.`; a leading dot does not start an extension.
pub fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => file_name.split_at(pos),
        _ => (file_name, ""),
    }
}
