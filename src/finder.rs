//! Resource lookup over the classpath.
//!
//! Class bytes and `URL$ResourceInputStream` data both come through a
//! [`ResourceFinder`]. Directories are read from disk on each lookup; jar
//! files (feature `jar`) are opened once and read through `zip`.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::VmError;

pub trait ResourceFinder: Send + Sync {
    /// Bytes of the resource at `path` (slash-separated, relative), if any.
    fn find(&self, path: &str) -> Option<Arc<[u8]>>;

    fn exists(&self, path: &str) -> bool {
        self.find(path).is_some()
    }
}

/// Rejects absolute paths and `..` components.
fn relative(path: &str) -> Option<PathBuf> {
    let p = Path::new(path.trim_start_matches('/'));
    p.components().all(|c| matches!(c, Component::Normal(_))).then(|| p.to_path_buf())
}

/// Resources stored under a directory.
#[derive(Debug, Clone)]
pub struct DirectoryFinder {
    root: PathBuf,
}

impl DirectoryFinder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceFinder for DirectoryFinder {
    fn find(&self, path: &str) -> Option<Arc<[u8]>> {
        let file = self.root.join(relative(path)?);
        fs::read(file).ok().map(Arc::from)
    }

    fn exists(&self, path: &str) -> bool {
        relative(path).is_some_and(|p| self.root.join(p).is_file())
    }
}

/// Resources stored in a jar (zip) archive.
#[cfg(feature = "jar")]
pub struct JarFinder {
    archive: parking_lot::Mutex<zip::ZipArchive<fs::File>>,
}

#[cfg(feature = "jar")]
impl JarFinder {
    pub fn open(path: &Path) -> Result<Self, VmError> {
        let file = fs::File::open(path)?;
        let archive = zip::ZipArchive::new(file)?;
        Ok(Self { archive: parking_lot::Mutex::new(archive) })
    }
}

#[cfg(feature = "jar")]
impl ResourceFinder for JarFinder {
    fn find(&self, path: &str) -> Option<Arc<[u8]>> {
        use std::io::Read;

        let mut archive = self.archive.lock();
        let mut entry = archive.by_name(path.trim_start_matches('/')).ok()?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes).ok()?;
        Some(Arc::from(bytes))
    }

    fn exists(&self, path: &str) -> bool {
        self.archive.lock().by_name(path.trim_start_matches('/')).is_ok()
    }
}

/// Searches a list of finders in order.
#[derive(Default)]
pub struct ClassPath {
    entries: Vec<Box<dyn ResourceFinder>>,
}

impl ClassPath {
    /// Opens each entry: directories directly, anything else as a jar.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self, VmError> {
        let mut entries: Vec<Box<dyn ResourceFinder>> = Vec::with_capacity(paths.len());
        for path in paths {
            if path.is_dir() {
                entries.push(Box::new(DirectoryFinder::new(path)));
            } else if path.is_file() {
                entries.push(open_archive(path)?);
            } else {
                return Err(VmError::Classpath(path.clone()));
            }
        }
        Ok(Self { entries })
    }

    pub fn push(&mut self, finder: Box<dyn ResourceFinder>) {
        self.entries.push(finder);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(feature = "jar")]
fn open_archive(path: &Path) -> Result<Box<dyn ResourceFinder>, VmError> {
    Ok(Box::new(JarFinder::open(path)?))
}

#[cfg(not(feature = "jar"))]
fn open_archive(path: &Path) -> Result<Box<dyn ResourceFinder>, VmError> {
    Err(VmError::Classpath(path.to_path_buf()))
}

impl ResourceFinder for ClassPath {
    fn find(&self, path: &str) -> Option<Arc<[u8]>> {
        self.entries.iter().find_map(|e| e.find(path))
    }

    fn exists(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.exists(path))
    }
}
