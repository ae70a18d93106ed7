//! Native libraries loaded by `Runtime.loadLibrary`.
//!
//! Libraries stay loaded for the life of the VM; their exported symbols are
//! the fallback when a native method is not a builtin.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::VmError;

/// Result of [`NativeLibraries::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    AlreadyLoaded,
    Loaded(PathBuf),
    NotFound,
}

struct Loaded {
    name: String,
    path: PathBuf,
    library: libloading::Library,
}

#[derive(Default)]
pub struct NativeLibraries {
    loaded: Mutex<Vec<Loaded>>,
}

impl NativeLibraries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.lock().iter().any(|l| l.name == name)
    }

    /// Path a library was loaded from.
    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        self.loaded.lock().iter().find(|l| l.name == name).map(|l| l.path.clone())
    }

    /// Loads `name` from the first directory of `search` holding the
    /// platform file name for it (`libfoo.so`, `foo.dll`, ...).
    pub fn load(&self, name: &str, search: &[PathBuf]) -> Result<LoadOutcome, VmError> {
        let mut loaded = self.loaded.lock();
        if loaded.iter().any(|l| l.name == name) {
            return Ok(LoadOutcome::AlreadyLoaded);
        }
        let file_name = libloading::library_filename(name);
        let Some(path) = search.iter().map(|dir| dir.join(&file_name)).find(|p| p.is_file()) else {
            return Ok(LoadOutcome::NotFound);
        };
        let library = open(&path)?;
        debug!(library = name, path = %path.display(), "loaded native library");
        loaded.push(Loaded { name: name.to_owned(), path: path.clone(), library });
        Ok(LoadOutcome::Loaded(path))
    }

    /// Address of an exported symbol in any loaded library.
    pub fn symbol_address(&self, symbol: &str) -> Option<usize> {
        let mut name = Vec::with_capacity(symbol.len() + 1);
        name.extend_from_slice(symbol.as_bytes());
        name.push(0);
        let loaded = self.loaded.lock();
        loaded.iter().find_map(|l| {
            // SAFETY: the address is only recorded, never called through a
            // Rust signature here.
            let sym = unsafe { l.library.get::<unsafe extern "C" fn()>(&name) }.ok()?;
            trace!(symbol, library = %l.name, "found external native symbol");
            Some(*sym as usize)
        })
    }
}

fn open(path: &Path) -> Result<libloading::Library, VmError> {
    // SAFETY: loading runs the library's initializers; the library path
    // was chosen explicitly through the configured search path.
    unsafe { libloading::Library::new(path) }.map_err(VmError::from)
}
