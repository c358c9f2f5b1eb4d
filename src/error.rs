//! Domain [`Error`]s raised by `vasco`.
//!
//! Most functions return a [`color_eyre::eyre::Report`]; when a failure has
//! one of these causes, the [`Error`] is the root of the report and can be
//! recovered with `report.downcast_ref::<vasco::Error>()`.

use thiserror::Error;

/// Errors that callers may want to discriminate on.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// A mutation string does not match the mutation grammar.
    #[error("Failed to parse mutation '{input}': {reason}")]
    Parse { input: String, reason: String },

    /// A mutation is well-formed but has a non-positive position or a symbol outside the alphabet.
    #[error("Invalid mutation '{input}': {reason}")]
    Validation { input: String, reason: String },

    /// A single count query failed, its counts were treated as zero.
    #[error("Failed to fetch counts for '{query}': {reason}")]
    PartialFetch { query: String, reason: String },

    /// The deconvolution engine failed or produced malformed output.
    #[error("Deconvolution engine failed: {0}")]
    Engine(String),

    /// A job payload could not be reconstructed on the worker.
    #[error("Failed to deserialize job input: {0}")]
    Serialization(String),

    /// A job result was requested before the job succeeded.
    #[error("Job {0} is not ready")]
    NotReady(String),

    /// The job failed, the captured error text is attached.
    #[error("Job {id} failed: {message}")]
    JobFailed { id: String, message: String },

    /// The job id is unknown to the broker.
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// A signature variant with this name is already registered.
    #[error("Signature variant '{0}' is already registered")]
    NameCollision(String),

    /// No signature variant with this name is registered.
    #[error("Signature variant '{0}' is not registered")]
    UnknownVariant(String),
}
