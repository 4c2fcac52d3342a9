//! Filesystem port for the few reads the privilege probe needs.

use std::path::Path;

/// Provides read access to the filesystem.
///
/// Abstracting the filesystem lets the SELinux probe be tested without a
/// real `/sys/fs/selinux`.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or is not valid UTF-8.
    fn read_to_string(
        &self,
        path: &Path,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>>;

    /// Returns `true` if the path exists on the filesystem.
    fn exists(&self, path: &Path) -> bool;
}
