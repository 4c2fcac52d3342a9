//! Live adapter for the `IdGenerator` port.

use uuid::Uuid;

use crate::ports::IdGenerator;

/// Produces random 128-bit identifiers rendered as 32 lowercase hex digits.
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    /// Creates a new random ID generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for RandomIdGenerator {
    fn generate_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}
