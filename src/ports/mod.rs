//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the session core and the
//! operating system (processes, randomness, files). Implementations live in
//! `src/adapters/`.

pub mod filesystem;
pub mod id_gen;
pub mod process;

pub use filesystem::FileSystem;
pub use id_gen::IdGenerator;
pub use process::{ChildProcess, ProcessSpawner, SpawnRequest};
