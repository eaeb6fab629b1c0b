//! Executable lookup

use conduit_core::EnvironmentVariables;
use std::io;
use std::path::{Path, PathBuf};

/// Find the file a command's target refers to
///
/// Targets containing a path separator are taken as paths (relative ones
/// against `working_dir`, or the current directory) and must name an
/// executable file; the returned path is absolute. Bare names are searched on `PATH`, honouring an
/// override from the command's environment.
pub(crate) fn resolve_executable(
    target: &Path,
    working_dir: Option<&Path>,
    environment: &EnvironmentVariables,
) -> io::Result<PathBuf> {
    if has_separator(target) {
        let candidate = match working_dir {
            Some(dir) if target.is_relative() => dir.join(target),
            _ => target.to_path_buf(),
        };
        // The child starts in `working_dir`, so the program path must be absolute
        return if is_executable(&candidate) {
            std::path::absolute(&candidate)
        } else if candidate.exists() {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("'{}' is not an executable file", candidate.display()),
            ))
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("'{}' does not exist", candidate.display()),
            ))
        };
    }

    let search_path = environment.resolve("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&search_path) {
        for candidate in candidates(&dir.join(target), environment) {
            if is_executable(&candidate) {
                return Ok(candidate);
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("'{}' was not found on PATH", target.display()),
    ))
}

fn has_separator(target: &Path) -> bool {
    target.components().count() > 1 || target.is_absolute()
}

#[cfg(unix)]
fn candidates(base: &Path, _environment: &EnvironmentVariables) -> Vec<PathBuf> {
    vec![base.to_path_buf()]
}

#[cfg(windows)]
fn candidates(base: &Path, environment: &EnvironmentVariables) -> Vec<PathBuf> {
    let mut found = vec![base.to_path_buf()];
    if base.extension().is_none() {
        let extensions = environment
            .resolve("PATHEXT")
            .unwrap_or_else(|| ".COM;.EXE;.BAT;.CMD".to_string());
        for extension in extensions.split(';').filter(|e| !e.is_empty()) {
            let mut name = base.as_os_str().to_owned();
            name.push(extension);
            found.push(PathBuf::from(name));
        }
    }
    found
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(windows)]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
