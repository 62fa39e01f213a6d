//! Errors that can occur while admitting a transaction.
//!
//! Each [`AdmissionError`] variant corresponds to one way a single
//! admission step can refuse a transaction, so enumerating all possible
//! admission failures enumerates the rules we enforce, and ensures that we
//! don't reject transactions for a non-enumerated reason.
//!
//! [`BuildError`] is a separate taxonomy: a missing keeper is a fatal node
//! configuration problem discovered at startup, and is never surfaced as a
//! per-transaction outcome.

use thiserror::Error;

use crate::{gas::GasError, step::StepKind, transaction::Address};

/// A fatal configuration error raised while building a pipeline.
///
/// Raised before any transaction is processed, when a keeper that the
/// selected variant's steps depend on is absent.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    #[error("account keeper is required for the admission pipeline")]
    MissingAccountKeeper,

    #[error("bank keeper is required for the admission pipeline")]
    MissingBankKeeper,

    #[error("sign mode handler is required for the admission pipeline")]
    MissingSignModeHandler,

    #[error("fee grant keeper is required for the admission pipeline")]
    MissingFeegrantKeeper,

    #[error("contract gas policy is required for the full admission pipeline")]
    MissingContractGasPolicy,

    #[error("tx counter store is required for the full admission pipeline")]
    MissingTxCounterStore,

    #[error("circuit breaker is required for the full admission pipeline")]
    MissingCircuitBreaker,

    #[error("channel keeper is required for the full admission pipeline")]
    MissingChannelKeeper,

    #[error("key share lane is required for the lazy-lane admission pipeline")]
    MissingKeyShareLane,

    #[error("tx encoder is required for the lazy-lane admission pipeline")]
    MissingTxEncoder,
}

/// A per-transaction admission failure.
///
/// The first step to fail aborts the run and its error is returned to the
/// caller verbatim; the failing step is recoverable through
/// [`AdmissionError::step`]. Admission failures never abort the node, and
/// the pipeline never retries them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("the per-block contract transaction quota was refused: {0}")]
    ContractTxCount(String),

    #[error("message type {type_url:?} is disabled by the circuit breaker")]
    MessageTypeDisabled {
        /// The disabled message type.
        type_url: String,
    },

    #[error("unsupported extension option {type_url:?}")]
    UnsupportedExtensionOption {
        /// The rejected option type.
        type_url: String,
    },

    #[error("transaction must carry at least one message")]
    NoMessages,

    #[error("transaction must carry at least one signature")]
    NoSignatures,

    #[error("signature count {signatures} does not match signer count {signers}")]
    SignatureCountMismatch {
        /// Declared signers.
        signers: usize,
        /// Detached signatures.
        signatures: usize,
    },

    #[error("fee amount for {denom:?} must not be zero")]
    ZeroFeeCoin {
        /// The offending fee denomination.
        denom: String,
    },

    #[error("timeout height {timeout_height} has passed, current height is {current_height}")]
    TimeoutHeight {
        /// The transaction's timeout height.
        timeout_height: u64,
        /// The height the pipeline ran at.
        current_height: u64,
    },

    #[error("memo is {length} characters, exceeding the limit of {max}")]
    MemoTooLong {
        /// The memo's length, in characters.
        length: usize,
        /// The configured limit.
        max: usize,
    },

    #[error("transaction size gas: {0}")]
    TxSizeGas(GasError),

    #[error("fee payer account {payer} is unknown")]
    UnknownFeePayer {
        /// The resolved payer address.
        payer: Address,
    },

    #[error("transaction has a fee but no payer account")]
    NoFeePayer,

    #[error("fee grant was refused: {0}")]
    FeeGrant(String),

    #[error("fee deduction failed: {0}")]
    InsufficientFunds(String),

    #[error("signer account {signer} is unknown")]
    UnknownSigner {
        /// The unknown signer address.
        signer: Address,
    },

    #[error("signer {signer} has no registered key and the transaction supplies none")]
    MissingPubKey {
        /// The keyless signer address.
        signer: Address,
    },

    #[error("the supplied key for signer {signer} does not match the registered key")]
    PubKeyMismatch {
        /// The signer whose keys disagree.
        signer: Address,
    },

    #[error("public key registration failed: {0}")]
    AccountUpdate(String),

    #[error("transaction has {count} signers, exceeding the limit of {max}")]
    TooManySignatures {
        /// Declared signers.
        count: usize,
        /// The configured limit.
        max: usize,
    },

    #[error("signature verification gas: {0}")]
    SignatureGas(GasError),

    #[error("signer {signer} declared sequence {found}, account is at {expected}")]
    SequenceMismatch {
        /// The out-of-date signer.
        signer: Address,
        /// The account's current sequence.
        expected: u64,
        /// The sequence the transaction committed to.
        found: u64,
    },

    #[error("sign bytes could not be produced: {0}")]
    SignBytes(String),

    #[error("invalid signature from signer {signer}")]
    InvalidSignature {
        /// The signer whose signature failed verification.
        signer: Address,
    },

    #[error("sequence increment failed: {0}")]
    SequenceUpdate(String),

    #[error("redundant relay submission: {0}")]
    RedundantRelay(String),

    #[error("transaction could not be encoded for lane inspection: {0}")]
    TxEncoding(String),

    #[error("key share lane refused the transaction: {0}")]
    KeyShareLane(String),
}

impl AdmissionError {
    /// The step that raised this error.
    ///
    /// Kept total over the error taxonomy, so the failing step is always
    /// recoverable for logs and metrics without wrapping the error.
    pub fn step(&self) -> StepKind {
        use AdmissionError::*;

        match self {
            ContractTxCount(_) => StepKind::CountContractTxs,
            MessageTypeDisabled { .. } => StepKind::CircuitBreaker,
            UnsupportedExtensionOption { .. } => StepKind::ExtensionOptions,
            NoMessages | NoSignatures | SignatureCountMismatch { .. } | ZeroFeeCoin { .. } => {
                StepKind::ValidateBasic
            }
            TimeoutHeight { .. } => StepKind::TimeoutHeight,
            MemoTooLong { .. } => StepKind::ValidateMemo,
            TxSizeGas(_) => StepKind::ConsumeTxSizeGas,
            UnknownFeePayer { .. } | NoFeePayer | FeeGrant(_) | InsufficientFunds(_) => {
                StepKind::DeductFee
            }
            UnknownSigner { .. }
            | MissingPubKey { .. }
            | PubKeyMismatch { .. }
            | AccountUpdate(_) => StepKind::ResolvePubKeys,
            TooManySignatures { .. } => StepKind::ValidateSigCount,
            SignatureGas(_) => StepKind::ConsumeSigGas,
            SequenceMismatch { .. } | SignBytes(_) | InvalidSignature { .. } => {
                StepKind::VerifySignatures
            }
            SequenceUpdate(_) => StepKind::IncrementSequence,
            RedundantRelay(_) => StepKind::RedundantRelay,
            TxEncoding(_) | KeyShareLane(_) => StepKind::KeyShareLane,
        }
    }
}
