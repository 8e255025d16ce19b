/// Trait for domain errors that are rendered to the person at the prompt
///
/// Implemented by each crate's error type. The front end renders these
/// without exposing transport details, keeping domain errors decoupled
/// from presentation.
pub trait UserFacingError: std::error::Error {
    /// Machine-readable error type (e.g. `execution_failed`)
    fn error_type(&self) -> &str;

    /// Message safe to show in the conversation
    fn client_message(&self) -> String;
}
