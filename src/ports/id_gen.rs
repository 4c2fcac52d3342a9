//! ID generator port for producing unique identifiers.

/// Generates unique identifiers.
///
/// Batch markers take their random part from here, so tests can substitute
/// a predictable (or even colliding) sequence.
pub trait IdGenerator: Send + Sync {
    /// Generates a new unique identifier string.
    fn generate_id(&self) -> String;
}
