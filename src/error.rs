//! Host-level errors.
//!
//! These are failures of the embedding (bad configuration, unreadable
//! classpath, a library that will not load), as opposed to
//! [`Throwable`](crate::exception::Throwable) values that Java code observes.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by VM construction and the host-facing collaborators.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("no execution engine configured")]
    MissingEngine,

    #[error("classpath entry does not exist: {}", .0.display())]
    Classpath(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "jar")]
    #[error("jar error: {0}")]
    Jar(#[from] zip::result::ZipError),

    #[error("failed to load native library: {0}")]
    Library(#[from] libloading::Error),
}
