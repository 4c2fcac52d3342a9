//! Live adapters for real OS interactions.

pub mod filesystem;
pub mod id_gen;
pub mod process;
