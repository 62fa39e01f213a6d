//! The admission pipeline: builder, executor, and service seam.
//!
//! [`Pipeline::new`] validates that every keeper the selected
//! [`Variant`]'s steps depend on is present, and fails with a
//! [`BuildError`] otherwise — a pipeline is never constructed with a
//! missing keeper, so no step needs to re-check its dependencies at
//! run time.
//!
//! [`Pipeline::process`] runs the variant's steps strictly in order,
//! threading the per-run [`Context`] from one step to the next and
//! stopping at the first failure. Keeper mutations made by earlier steps
//! (fee deduction, sequence increments) are tentative: the caller commits
//! or discards the surrounding execution context as a whole, the pipeline
//! itself never rolls back.
//!
//! # Correctness
//!
//! Concurrent admission runs for distinct transactions are fine: each run
//! allocates its own [`Context`], and keeper handles are shared
//! read-mostly. Steps within one run never execute concurrently or out of
//! the declared order.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context as TaskContext, Poll},
};

use futures::FutureExt;
use tower::Service;

use crate::{
    config::Config,
    error::{AdmissionError, BuildError},
    gas::GasMeter,
    keeper::{
        AccountKeeper, BankKeeper, ChannelKeeper, CircuitBreaker, ContractGasPolicy,
        FeegrantKeeper, KeyShareLane, SignModeHandler, TxCounterStore, TxEncoder,
    },
    step::{StepKind, Variant},
    transaction::{self, Address, PublicKey, Transaction},
};

pub mod steps;


/// Whether a transaction is being admitted for real or only simulated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Admit the transaction for block inclusion. All checks apply.
    Deliver,

    /// Estimate the transaction's cost. Gas is metered under the
    /// simulation cap, and the expensive cryptographic signature check is
    /// skipped.
    Simulate,
}

impl Mode {
    /// Returns true for simulation runs.
    pub fn is_simulate(&self) -> bool {
        matches!(self, Mode::Simulate)
    }
}

/// A signer whose key was resolved by the pubkey-resolution step.
///
/// Cached in the [`Context`] and consumed by the signature steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSigner {
    /// The signer's address.
    pub address: Address,
    /// The key signatures verify against.
    pub public_key: PublicKey,
    /// The account's sequence number when the key was resolved.
    pub sequence: u64,
}

/// Per-run processing state, threaded through the steps.
///
/// Created fresh at pipeline entry and returned to the caller on success;
/// never shared between runs or retained by the pipeline.
#[derive(Clone, Debug)]
pub struct Context {
    mode: Mode,
    height: u64,
    gas: GasMeter,
    contract_gas_scale: u64,
    contract_tx_index: Option<u64>,
    signers: Vec<ResolvedSigner>,
    fee_payer: Option<Address>,
}

impl Context {
    fn new(mode: Mode, height: u64) -> Self {
        Self {
            mode,
            height,
            gas: GasMeter::infinite(),
            contract_gas_scale: 1,
            contract_tx_index: None,
            signers: Vec::new(),
            fee_payer: None,
        }
    }

    /// The run mode this context was created for.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Returns true for simulation runs.
    pub fn is_simulate(&self) -> bool {
        self.mode.is_simulate()
    }

    /// The block height this run was admitted against.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// The gas consumed so far.
    pub fn gas_used(&self) -> u64 {
        self.gas.consumed()
    }

    /// The gas meter's limit, or `None` while unmetered.
    pub fn gas_limit(&self) -> Option<u64> {
        self.gas.limit()
    }

    /// The contract gas unit conversion established for this run.
    pub fn contract_gas_scale(&self) -> u64 {
        self.contract_gas_scale
    }

    /// This transaction's index among the block's contract-bearing
    /// transactions, if the counting step ran.
    pub fn contract_tx_index(&self) -> Option<u64> {
        self.contract_tx_index
    }

    /// The signers resolved by the pubkey-resolution step.
    pub fn signers(&self) -> &[ResolvedSigner] {
        &self.signers
    }

    /// The account the fee was deducted from, if a fee was collected.
    pub fn fee_payer(&self) -> Option<Address> {
        self.fee_payer
    }
}

/// The keeper set offered to [`Pipeline::new`].
///
/// Mirrors the node's wiring: every keeper is optional here, and the
/// builder checks that the ones the selected variant needs are present.
#[derive(Clone, Default)]
pub struct Options {
    /// Chain parameters read by the steps.
    pub config: Config,

    /// Account lookups, key registration, sequence numbers. Mandatory.
    pub account: Option<Arc<dyn AccountKeeper>>,

    /// Fee debiting. Mandatory.
    pub bank: Option<Arc<dyn BankKeeper>>,

    /// Delegated fee payment. Mandatory.
    pub feegrant: Option<Arc<dyn FeegrantKeeper>>,

    /// Sign-bytes production and signature verification. Mandatory.
    pub sign_mode: Option<Arc<dyn SignModeHandler>>,

    /// Contract gas parameters. Mandatory for [`Variant::Full`].
    pub contract_gas: Option<Arc<dyn ContractGasPolicy>>,

    /// The per-block contract tx counter. Mandatory for [`Variant::Full`].
    pub tx_counter: Option<Arc<dyn TxCounterStore>>,

    /// The message-type gate. Mandatory for [`Variant::Full`].
    pub circuit_breaker: Option<Arc<dyn CircuitBreaker>>,

    /// Relay replay detection. Mandatory for [`Variant::Full`].
    pub channel: Option<Arc<dyn ChannelKeeper>>,

    /// The restricted-lane gate. Mandatory for [`Variant::LazyLane`].
    pub key_share_lane: Option<Arc<dyn KeyShareLane>>,

    /// The node codec. Mandatory for [`Variant::LazyLane`].
    pub tx_encoder: Option<Arc<dyn TxEncoder>>,
}

/// The variant-specific keepers, present by construction.
#[derive(Clone)]
enum LaneKeepers {
    Full {
        contract_gas: Arc<dyn ContractGasPolicy>,
        tx_counter: Arc<dyn TxCounterStore>,
        circuit_breaker: Arc<dyn CircuitBreaker>,
        channel: Arc<dyn ChannelKeeper>,
    },
    LazyLane {
        lane: Arc<dyn KeyShareLane>,
        encoder: Arc<dyn TxEncoder>,
    },
}

/// A constructed admission pipeline.
///
/// Cheap to clone: clones share the same keeper handles. Build one per
/// variant at node startup; reconfiguring keepers means building a new
/// pipeline, never mutating this one.
#[derive(Clone)]
pub struct Pipeline {
    config: Config,
    variant: Variant,
    account: Arc<dyn AccountKeeper>,
    bank: Arc<dyn BankKeeper>,
    feegrant: Arc<dyn FeegrantKeeper>,
    sign_mode: Arc<dyn SignModeHandler>,
    lane: LaneKeepers,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("variant", &self.variant)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Builds the admission pipeline for `variant`.
    ///
    /// Fails fast with a [`BuildError`] if any keeper the variant's steps
    /// depend on is missing from `options`. This is a node configuration
    /// error: callers should treat it as fatal at startup.
    pub fn new(variant: Variant, options: Options) -> Result<Self, BuildError> {
        let account = options.account.ok_or(BuildError::MissingAccountKeeper)?;
        let bank = options.bank.ok_or(BuildError::MissingBankKeeper)?;
        let sign_mode = options
            .sign_mode
            .ok_or(BuildError::MissingSignModeHandler)?;
        let feegrant = options.feegrant.ok_or(BuildError::MissingFeegrantKeeper)?;

        let lane = match variant {
            Variant::Full => LaneKeepers::Full {
                contract_gas: options
                    .contract_gas
                    .ok_or(BuildError::MissingContractGasPolicy)?,
                tx_counter: options
                    .tx_counter
                    .ok_or(BuildError::MissingTxCounterStore)?,
                circuit_breaker: options
                    .circuit_breaker
                    .ok_or(BuildError::MissingCircuitBreaker)?,
                channel: options.channel.ok_or(BuildError::MissingChannelKeeper)?,
            },
            Variant::LazyLane => LaneKeepers::LazyLane {
                lane: options
                    .key_share_lane
                    .ok_or(BuildError::MissingKeyShareLane)?,
                encoder: options.tx_encoder.ok_or(BuildError::MissingTxEncoder)?,
            },
        };

        Ok(Self {
            config: options.config,
            variant,
            account,
            bank,
            feegrant,
            sign_mode,
            lane,
        })
    }

    /// The variant this pipeline was built for.
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Runs every step of this pipeline's variant against `transaction`,
    /// in the fixed order, at `height`.
    ///
    /// Returns the final [`Context`] when every step passes, or the first
    /// step's error verbatim. On failure, later steps are never invoked;
    /// keeper mutations already made remain tentative and are the
    /// caller's to discard.
    pub fn process(
        &self,
        transaction: &Transaction,
        height: u64,
        mode: Mode,
    ) -> Result<Context, AdmissionError> {
        let tx_id = transaction.hash();
        let span = tracing::debug_span!("admission", %tx_id, variant = %self.variant);
        let _entered = span.enter();

        tracing::trace!(?mode, height, "got admission request");

        let mut context = Context::new(mode, height);

        for step in self.variant.steps() {
            context = self
                .run_step(*step, context, transaction)
                .map_err(|error| {
                    debug_assert_eq!(error.step(), *step, "errors must name the step that raised them");

                    tracing::debug!(step = %step, %error, "transaction refused");
                    metrics::counter!("admission.refused.count").increment(1);
                    error
                })?;
        }

        metrics::counter!("admission.admitted.count").increment(1);
        tracing::trace!(gas_used = context.gas_used(), "transaction admitted");

        Ok(context)
    }

    /// Dispatches one step to its implementation.
    fn run_step(
        &self,
        step: StepKind,
        context: Context,
        transaction: &Transaction,
    ) -> Result<Context, AdmissionError> {
        match step {
            StepKind::SetUpContext => steps::set_up_context(context, transaction),
            StepKind::LimitSimulationGas => {
                // The full variant takes its simulation cap from the
                // contract gas policy, the lazy lane from the node config.
                let limit = match &self.lane {
                    LaneKeepers::Full { contract_gas, .. } => contract_gas.simulation_gas_limit(),
                    LaneKeepers::LazyLane { .. } => self.config.simulation_gas_limit,
                };
                steps::limit_simulation_gas(context, limit)
            }
            StepKind::CountContractTxs => {
                let (_, tx_counter, _, _) = self.contract_keepers();
                steps::count_contract_txs(context, tx_counter)
            }
            StepKind::ScaleContractGas => {
                let (contract_gas, _, _, _) = self.contract_keepers();
                steps::scale_contract_gas(context, contract_gas)
            }
            StepKind::CircuitBreaker => {
                let (_, _, circuit_breaker, _) = self.contract_keepers();
                steps::circuit_breaker(context, transaction, circuit_breaker)
            }
            StepKind::ExtensionOptions => {
                steps::extension_options(context, transaction, &self.config)
            }
            StepKind::ValidateBasic => steps::validate_basic(context, transaction),
            StepKind::TimeoutHeight => steps::timeout_height(context, transaction),
            StepKind::ValidateMemo => steps::validate_memo(context, transaction, &self.config),
            StepKind::ConsumeTxSizeGas => {
                steps::consume_tx_size_gas(context, transaction, &self.config)
            }
            StepKind::DeductFee => steps::deduct_fee(
                context,
                transaction,
                &*self.account,
                &*self.bank,
                &*self.feegrant,
            ),
            StepKind::ResolvePubKeys => {
                steps::resolve_pub_keys(context, transaction, &*self.account)
            }
            StepKind::ValidateSigCount => {
                steps::validate_sig_count(context, transaction, &self.config)
            }
            StepKind::ConsumeSigGas => steps::consume_sig_gas(context, transaction, &self.config),
            StepKind::VerifySignatures => {
                steps::verify_signatures(context, transaction, &*self.sign_mode)
            }
            StepKind::IncrementSequence => {
                steps::increment_sequence(context, transaction, &*self.account)
            }
            StepKind::RedundantRelay => {
                let (_, _, _, channel) = self.contract_keepers();
                steps::redundant_relay(context, transaction, channel)
            }
            StepKind::KeyShareLane => {
                let (lane, encoder) = self.lane_keepers();
                steps::key_share_lane(context, transaction, encoder, lane)
            }
        }
    }

    /// The full variant's keepers.
    fn contract_keepers(
        &self,
    ) -> (
        &dyn ContractGasPolicy,
        &dyn TxCounterStore,
        &dyn CircuitBreaker,
        &dyn ChannelKeeper,
    ) {
        match &self.lane {
            LaneKeepers::Full {
                contract_gas,
                tx_counter,
                circuit_breaker,
                channel,
            } => (&**contract_gas, &**tx_counter, &**circuit_breaker, &**channel),
            LaneKeepers::LazyLane { .. } => {
                unreachable!("contract steps are only scheduled in the full ordering")
            }
        }
    }

    /// The lazy-lane variant's keepers.
    fn lane_keepers(&self) -> (&dyn KeyShareLane, &dyn TxEncoder) {
        match &self.lane {
            LaneKeepers::LazyLane { lane, encoder } => (&**lane, &**encoder),
            LaneKeepers::Full { .. } => {
                unreachable!("the lane step is only scheduled in the lazy-lane ordering")
            }
        }
    }
}

/// An admission request for the service seam.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Admit the transaction for block inclusion at `height`.
    Deliver {
        /// The transaction itself.
        transaction: Arc<Transaction>,
        /// The height of the block the transaction would be included in.
        height: u64,
    },

    /// Simulate the transaction against the state at `height`.
    Simulate {
        /// The transaction itself.
        transaction: Arc<Transaction>,
        /// The height to simulate at.
        height: u64,
    },
}

impl Request {
    /// The transaction in this request.
    pub fn transaction(&self) -> Arc<Transaction> {
        match self {
            Request::Deliver { transaction, .. } | Request::Simulate { transaction, .. } => {
                transaction.clone()
            }
        }
    }

    /// The height this request runs at.
    pub fn height(&self) -> u64 {
        match self {
            Request::Deliver { height, .. } | Request::Simulate { height, .. } => *height,
        }
    }

    /// The run mode for this request.
    pub fn mode(&self) -> Mode {
        match self {
            Request::Deliver { .. } => Mode::Deliver,
            Request::Simulate { .. } => Mode::Simulate,
        }
    }

    /// Returns true if this is a simulation request.
    pub fn is_simulate(&self) -> bool {
        self.mode().is_simulate()
    }
}

/// A successful admission outcome.
///
/// Responses identify the transaction that was admitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// The hash of the admitted transaction.
    pub tx_id: transaction::Hash,

    /// The gas the admission checks consumed.
    pub gas_used: u64,

    /// The account the fee was deducted from, if a fee was collected.
    pub fee_payer: Option<Address>,
}

impl Service<Request> for Pipeline {
    type Response = Response;
    type Error = AdmissionError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let pipeline = self.clone();

        async move {
            let transaction = request.transaction();
            let tx_id = transaction.hash();

            let context = pipeline.process(&transaction, request.height(), request.mode())?;

            Ok(Response {
                tx_id,
                gas_used: context.gas_used(),
                fee_payer: context.fee_payer(),
            })
        }
        .boxed()
    }
}
