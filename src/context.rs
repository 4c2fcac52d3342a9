//! Service context bundling all port trait objects.

use std::sync::Arc;

use crate::adapters::live::filesystem::LiveFileSystem;
use crate::adapters::live::id_gen::RandomIdGenerator;
use crate::adapters::live::process::LiveSpawner;
use crate::ports::filesystem::FileSystem;
use crate::ports::id_gen::IdGenerator;
use crate::ports::process::ProcessSpawner;

/// Bundles all port trait objects into a single context.
///
/// Sessions and probes share the ports, so they are held behind `Arc`.
#[derive(Clone)]
pub struct ServiceContext {
    /// Starts child shells.
    pub spawner: Arc<dyn ProcessSpawner>,
    /// Random part of batch markers.
    pub id_gen: Arc<dyn IdGenerator>,
    /// Filesystem reads for privilege probing.
    pub fs: Arc<dyn FileSystem>,
}

impl ServiceContext {
    /// Creates a live context with real adapters.
    #[must_use]
    pub fn live() -> Self {
        Self {
            spawner: Arc::new(LiveSpawner),
            id_gen: Arc::new(RandomIdGenerator::new()),
            fs: Arc::new(LiveFileSystem),
        }
    }

    /// Returns a copy of this context with a different process spawner.
    #[must_use]
    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Returns a copy of this context with a different ID generator.
    #[must_use]
    pub fn with_id_gen(mut self, id_gen: Arc<dyn IdGenerator>) -> Self {
        self.id_gen = id_gen;
        self
    }

    /// Returns a copy of this context with a different filesystem.
    #[must_use]
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }
}

impl Default for ServiceContext {
    fn default() -> Self {
        Self::live()
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext").finish_non_exhaustive()
    }
}
