//! Locating the native engine library on disk.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::InitializationError;

/// File stem of the 2D engine build.
pub const LIBRARY_STEM: &str = "libpeano-claw-2d";

/// Environment variable overriding the directory the library is searched in.
pub const LIBRARY_DIR_VAR: &str = "PEANOCLAW_LIBRARY_DIR";




/**
 * The platform-specific file name of the engine library. Only Linux and
 * macOS builds of the engine exist.
 */
pub fn library_file_name() -> Result<String, InitializationError> {
    library_file_name_for(env::consts::OS)
}

pub fn library_file_name_for(os: &'static str) -> Result<String, InitializationError> {
    let extension = match os {
        "linux" => "so",
        "macos" => "dylib",
        other => return Err(InitializationError::UnsupportedPlatform(other)),
    };
    Ok(format!("{}.{}", LIBRARY_STEM, extension))
}




/**
 * The directory the library is expected in: the explicit override if
 * given, else `$PEANOCLAW_LIBRARY_DIR`, else the directory of the running
 * executable.
 */
pub fn search_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(dir) = env::var_os(LIBRARY_DIR_VAR) {
        return PathBuf::from(dir);
    }
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}




/**
 * Resolve the full path of the engine library, failing with the path that
 * was tried if there is no file there.
 */
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, InitializationError> {
    let path = search_dir(explicit).join(library_file_name()?);

    if path.is_file() {
        Ok(path)
    } else {
        Err(InitializationError::LibraryNotFound { path })
    }
}
