//! Program lookup for the gateway child process.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// Supplies the search path used to find the gateway program and handed to
/// the child as its `PATH`.
pub trait SearchPathResolver: Send + Sync {
    fn search_path(&self) -> Option<OsString>;
}

/// The control plane's own `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InheritedSearchPath;

impl SearchPathResolver for InheritedSearchPath {
    fn search_path(&self) -> Option<OsString> {
        std::env::var_os("PATH")
    }
}

/// A fixed search path.
impl SearchPathResolver for OsString {
    fn search_path(&self) -> Option<OsString> {
        Some(self.clone())
    }
}

/// Resolve `program` against `search_path`, relative paths against the cwd.
pub fn resolve_program(program: &str, search_path: Option<&OsStr>) -> Result<PathBuf, which::Error> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    which::which_in(program, search_path, cwd)
}
