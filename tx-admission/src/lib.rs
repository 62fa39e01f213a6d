//! Implementation of transaction admission checks.
//!
//! More specifically, this crate implements the ordered sequence of checks
//! and tentative state mutations a submitted transaction must pass before
//! it is allowed into a block, or rejected.
//!
//! ## Admission levels.
//!
//! The pipeline is oriented around three telescoping notions of validity:
//!
//! 1. *Structural Validity*, or whether the format and structure of the
//!    transaction are valid. For instance, a transaction must carry at
//!    least one message, and one signature per declared signer.
//!
//! 2. *Stateless Policy Validity*, or whether the transaction respects
//!    chain parameters that do not depend on account state. For instance,
//!    the memo must fit the configured limit, and the timeout height must
//!    not have passed.
//!
//! 3. *Stateful Admission Validity*, or whether the transaction is
//!    admissible against the current account and ledger state. For
//!    instance, the fee payer must be able to cover the fee, every
//!    signature must verify against the signer's registered key, and the
//!    declared sequence numbers must match the accounts' replay counters.
//!
//! Structural validity is enforced by the checks in
//! [`pipeline::steps`] that read only the [`transaction::Transaction`]
//! itself. Stateless policy validity is enforced by the checks that read
//! the [`config::Config`]. Stateful admission validity is enforced by the
//! checks that call into the node's keepers, through the narrow contracts
//! in [`keeper`].
//!
//! The order in which the checks run is consensus-relevant and fixed per
//! [`step::Variant`]; see the [`step`] module documentation.

// Re-enable this after cleaning the API surface.
//#![deny(missing_docs)]
#![allow(clippy::unnecessary_wraps)]

pub mod config;
pub mod error;
pub mod gas;
pub mod keeper;
pub mod pipeline;
pub mod step;
pub mod transaction;

pub use config::Config;
pub use error::{AdmissionError, BuildError};
pub use pipeline::{Mode, Options, Pipeline};
pub use step::Variant;

/// A boxed [`std::error::Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
