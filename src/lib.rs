//! `vasco` estimates **VA**riant **S**hares in wastewater from **CO**verage of signature mutations.
//!
//! A run goes through four steps:
//!
//! 1. [Parse](mutation::MutationCode) and canonicalize mutation codes.
//! 1. Register lineage signatures and [build](signature::SignatureMatrixBuilder) the
//!    mutation x lineage indicator matrix.
//! 1. [Aggregate](coverage::CoverageAggregator) per-date counts and coverage of every
//!    signature mutation from a sequence count service.
//! 1. [Deconvolve](deconvolve::DeconvolutionPipeline) the coverage into lineage proportions
//!    over time, usually as a [background job](task::TaskOrchestrator).

#[cfg(feature = "cli")]
pub mod cli;
pub mod coverage;
pub mod deconvolve;
pub mod error;
pub mod mutation;
pub mod signature;
pub mod task;
pub mod utils;

#[doc(inline)]
pub use crate::error::Error;
#[doc(inline)]
pub use crate::mutation::{MutationCode, MutationType};
#[doc(inline)]
pub use crate::signature::{Matrix, SignatureMatrixBuilder};
