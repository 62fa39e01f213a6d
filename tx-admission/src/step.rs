//! The admission step catalog and the fixed per-variant orderings.
//!
//! The pipeline is a decorator chain in spirit, but the orderings here are
//! plain `const` slices interpreted by one executor loop. That keeps the
//! consensus-relevant order independently testable as data, instead of
//! being implicit in call-graph shape.
//!
//! # Consensus
//!
//! The relative order of steps within a variant is fixed for the lifetime
//! of the node process. Several steps depend on state established by
//! earlier ones (see each identifier's documentation), and validators must
//! apply identical orderings to reach the same admission outcome. Do not
//! reorder steps without a protocol version bump.

use std::fmt;

/// Identifies one admission step.
///
/// Each step is invoked through the same contract: it reads the
/// transaction and the current processing context, and either returns an
/// updated context or fails with an [`AdmissionError`](crate::AdmissionError)
/// that aborts the run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// Establishes the gas meter and records the run mode.
    ///
    /// Must run first: every later step reads the context it creates.
    SetUpContext,

    /// Caps the gas meter for simulation runs.
    ///
    /// Must run immediately after setup, so runaway simulations are
    /// limited before any other metering begins. A no-op in deliver mode.
    LimitSimulationGas,

    /// Counts this contract-bearing transaction against the per-block cap.
    ///
    /// Must run before the contract gas scale is adjusted.
    CountContractTxs,

    /// Rescales the gas unit conversion used for contract execution.
    ///
    /// Must run before generic gas consumption, so later charges use the
    /// correct scale.
    ScaleContractGas,

    /// Rejects messages whose types are administratively disabled.
    ///
    /// Must run before any gas is charged for message processing, so fees
    /// are never charged for a message that will never execute.
    CircuitBreaker,

    /// Rejects unknown or unsupported extension options.
    ///
    /// Must precede basic validation.
    ExtensionOptions,

    /// Message-level structural self-consistency checks.
    ///
    /// Must precede all stateful checks.
    ValidateBasic,

    /// Rejects transactions whose timeout height has passed.
    TimeoutHeight,

    /// Checks the memo against the configured length limit.
    ValidateMemo,

    /// Charges gas proportional to the transaction's serialized size.
    ///
    /// Must precede fee deduction, so the fee check sees the final gas
    /// requirement.
    ConsumeTxSizeGas,

    /// Verifies the payer can cover the fee, directly or through a
    /// fee grant, and deducts it.
    ///
    /// Must run after all gas-affecting steps and before any signature
    /// work, so a transaction that cannot pay is rejected cheaply.
    DeductFee,

    /// Resolves each signer's public key, registering first-use keys.
    ///
    /// Must precede the signature count, gas, and verification steps,
    /// which read the resolved keys from the context.
    ResolvePubKeys,

    /// Rejects transactions with more signers than the configured maximum.
    ///
    /// Must precede per-signature gas consumption.
    ValidateSigCount,

    /// Charges gas per signature, before the expensive cryptographic
    /// verification.
    ConsumeSigGas,

    /// Cryptographically verifies each signature and checks the declared
    /// sequence numbers.
    ///
    /// Must precede the sequence increment: a transaction with an invalid
    /// signature must not advance any account's replay counter.
    VerifySignatures,

    /// Advances each signer's sequence number.
    ///
    /// Must be last among the signature-related steps.
    IncrementSequence,

    /// Rejects duplicate cross-chain relay-proof submissions.
    ///
    /// An auxiliary anti-replay guard, independent of fee and signature
    /// state, so it runs last in the full variant.
    RedundantRelay,

    /// Applies restricted-lane admission rules to the transaction's
    /// encoded byte form.
    ///
    /// Runs last in the lazy-lane variant, after the sequence increment.
    KeyShareLane,
}

impl StepKind {
    /// The step's name, as used in logs and error reports.
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::SetUpContext => "set up context",
            StepKind::LimitSimulationGas => "limit simulation gas",
            StepKind::CountContractTxs => "count contract txs",
            StepKind::ScaleContractGas => "scale contract gas",
            StepKind::CircuitBreaker => "circuit breaker",
            StepKind::ExtensionOptions => "extension options",
            StepKind::ValidateBasic => "validate basic",
            StepKind::TimeoutHeight => "timeout height",
            StepKind::ValidateMemo => "validate memo",
            StepKind::ConsumeTxSizeGas => "consume tx size gas",
            StepKind::DeductFee => "deduct fee",
            StepKind::ResolvePubKeys => "resolve pubkeys",
            StepKind::ValidateSigCount => "validate sig count",
            StepKind::ConsumeSigGas => "consume sig gas",
            StepKind::VerifySignatures => "verify signatures",
            StepKind::IncrementSequence => "increment sequence",
            StepKind::RedundantRelay => "redundant relay",
            StepKind::KeyShareLane => "key share lane",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The step ordering for full block-production admission.
///
/// Includes the contract gas machinery, the circuit breaker, and the
/// cross-chain redundant-relay guard.
pub const FULL_ORDER: &[StepKind] = &[
    StepKind::SetUpContext,
    StepKind::LimitSimulationGas,
    StepKind::CountContractTxs,
    StepKind::ScaleContractGas,
    StepKind::CircuitBreaker,
    StepKind::ExtensionOptions,
    StepKind::ValidateBasic,
    StepKind::TimeoutHeight,
    StepKind::ValidateMemo,
    StepKind::ConsumeTxSizeGas,
    StepKind::DeductFee,
    StepKind::ResolvePubKeys,
    StepKind::ValidateSigCount,
    StepKind::ConsumeSigGas,
    StepKind::VerifySignatures,
    StepKind::IncrementSequence,
    StepKind::RedundantRelay,
];

/// The step ordering for the restricted lazy lane.
///
/// Shares the shared steps with [`FULL_ORDER`] in the same relative
/// order, drops the contract, circuit-breaker, and relay machinery, and
/// appends the key-share-lane step after the sequence increment.
pub const LAZY_LANE_ORDER: &[StepKind] = &[
    StepKind::SetUpContext,
    StepKind::LimitSimulationGas,
    StepKind::ExtensionOptions,
    StepKind::ValidateBasic,
    StepKind::TimeoutHeight,
    StepKind::ValidateMemo,
    StepKind::ConsumeTxSizeGas,
    StepKind::DeductFee,
    StepKind::ResolvePubKeys,
    StepKind::ValidateSigCount,
    StepKind::ConsumeSigGas,
    StepKind::VerifySignatures,
    StepKind::IncrementSequence,
    StepKind::KeyShareLane,
];

/// Selects one of the two fixed step orderings.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    /// The full ordering, used when producing or validating blocks.
    Full,
    /// The restricted ordering, used on the lazy pre-execution lane.
    LazyLane,
}

impl Variant {
    /// The fixed step ordering for this variant.
    pub fn steps(&self) -> &'static [StepKind] {
        match self {
            Variant::Full => FULL_ORDER,
            Variant::LazyLane => LAZY_LANE_ORDER,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Variant::Full => "full",
            Variant::LazyLane => "lazy-lane",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    #[test]
    fn orderings_contain_no_duplicate_steps() {
        for variant in [Variant::Full, Variant::LazyLane] {
            let steps = variant.steps();
            let unique: HashSet<_> = steps.iter().collect();
            assert_eq!(
                unique.len(),
                steps.len(),
                "{variant} ordering must not repeat a step"
            );
        }
    }

    #[test]
    fn shared_steps_keep_their_relative_order() {
        // Every lazy-lane step other than its lane tail must appear in the
        // full ordering, in the same relative order.
        let shared: Vec<StepKind> = LAZY_LANE_ORDER
            .iter()
            .copied()
            .filter(|step| FULL_ORDER.contains(step))
            .collect();

        let mut full_positions = shared
            .iter()
            .map(|step| FULL_ORDER.iter().position(|s| s == step).unwrap());
        let mut previous = full_positions.next().expect("shared steps exist");
        for position in full_positions {
            assert!(
                position > previous,
                "shared steps must keep their relative order across variants"
            );
            previous = position;
        }
    }

    #[test]
    fn variant_specific_steps_stay_in_their_variant() {
        for step in [
            StepKind::CountContractTxs,
            StepKind::ScaleContractGas,
            StepKind::CircuitBreaker,
            StepKind::RedundantRelay,
        ] {
            assert!(FULL_ORDER.contains(&step));
            assert!(!LAZY_LANE_ORDER.contains(&step));
        }

        assert!(LAZY_LANE_ORDER.contains(&StepKind::KeyShareLane));
        assert!(!FULL_ORDER.contains(&StepKind::KeyShareLane));
    }

    #[test]
    fn fee_deduction_precedes_signature_work() {
        // Deliberate policy: fees are collected before the expensive
        // cryptographic checks, in both variants. Reordering this would
        // change consensus-relevant behavior.
        for variant in [Variant::Full, Variant::LazyLane] {
            let steps = variant.steps();
            let fee = steps
                .iter()
                .position(|s| *s == StepKind::DeductFee)
                .unwrap();
            let verify = steps
                .iter()
                .position(|s| *s == StepKind::VerifySignatures)
                .unwrap();
            assert!(fee < verify, "{variant}: fee must be deducted before signature verification");
        }
    }
}
