//! Narrow contracts for the node services the pipeline calls into.
//!
//! The pipeline implements none of the logic behind these traits: fee
//! arithmetic, signature cryptography, contract gas policy, relay replay
//! detection, and lane eligibility are all opaque services. The pipeline
//! only decides *when* each one is invoked and how its outcome is handled.
//!
//! Keeper handles are shared, read-mostly, across concurrent admission
//! runs for the lifetime of the node process. Keepers that mutate state
//! (fee deduction, sequence increments, tx counting) must apply their own
//! concurrency-safe update discipline; the pipeline performs no locking
//! and treats every call as atomic.

use crate::{
    transaction::{Address, Coin, Message, PublicKey, Signature, SignerInfo, Transaction},
    BoxError,
};

/// A signer account, as reported by the account keeper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// The account's address.
    pub address: Address,

    /// The account's registered public key, if one has been set.
    pub public_key: Option<PublicKey>,

    /// The account's replay-protection counter.
    pub sequence: u64,
}

/// Looks up signer accounts and maintains their keys and sequence numbers.
pub trait AccountKeeper: Send + Sync {
    /// Returns the account at `address`, or `None` if it does not exist.
    fn account(&self, address: &Address) -> Option<Account>;

    /// Registers `public_key` as the key for `address`.
    ///
    /// Called at most once per account, the first time the account signs.
    fn set_public_key(&self, address: &Address, public_key: &PublicKey) -> Result<(), BoxError>;

    /// Advances the sequence number of `address`, returning the new value.
    fn increment_sequence(&self, address: &Address) -> Result<u64, BoxError>;
}

/// Debits fee coins from a payer's balance.
pub trait BankKeeper: Send + Sync {
    /// Deducts `fee` from `payer`, failing if the balance cannot cover it.
    fn deduct_fee(&self, payer: &Address, fee: &[Coin]) -> Result<(), BoxError>;
}

/// Resolves delegated fee payment.
pub trait FeegrantKeeper: Send + Sync {
    /// Charges `fee` against the grant `granter` gave `grantee`.
    ///
    /// Fails if no such grant exists or the grant cannot cover the fee.
    fn use_grant(&self, granter: &Address, grantee: &Address, fee: &[Coin])
        -> Result<(), BoxError>;
}

/// Produces verifiable sign-bytes and checks signatures against them.
///
/// The cryptography is entirely inside this keeper; the pipeline only
/// sequences the calls and interprets pass/fail.
pub trait SignModeHandler: Send + Sync {
    /// The bytes `signer` must have signed for this transaction.
    fn sign_bytes(&self, transaction: &Transaction, signer: &SignerInfo)
        -> Result<Vec<u8>, BoxError>;

    /// Whether `signature` is a valid signature of `sign_bytes` under
    /// `public_key`.
    fn verify(&self, public_key: &PublicKey, sign_bytes: &[u8], signature: &Signature) -> bool;
}

/// Contract-execution gas parameters, read by the full variant.
pub trait ContractGasPolicy: Send + Sync {
    /// The gas cap for simulation runs, or `None` to leave them unmetered.
    fn simulation_gas_limit(&self) -> Option<u64>;

    /// The multiplier converting contract gas units to transaction gas.
    fn gas_scale(&self) -> u64;
}

/// The per-block contract-transaction counter store.
pub trait TxCounterStore: Send + Sync {
    /// Counts one more contract-bearing transaction at `height`,
    /// returning its index within the block.
    ///
    /// Fails when the per-block cap would be exceeded.
    fn count_tx(&self, height: u64) -> Result<u64, BoxError>;
}

/// The administrative message-type gate.
pub trait CircuitBreaker: Send + Sync {
    /// Whether messages of `type_url` are currently allowed.
    fn is_allowed(&self, type_url: &str) -> bool;
}

/// Cross-chain relay replay detection.
pub trait ChannelKeeper: Send + Sync {
    /// Fails if `messages` contains a relay proof that was already
    /// submitted.
    fn check_redundant_relay(&self, messages: &[Message]) -> Result<(), BoxError>;
}

/// The restricted-lane gate, fed the transaction's encoded byte form.
pub trait KeyShareLane: Send + Sync {
    /// Applies lane-specific admission rules to `tx_bytes`.
    fn check_lane(&self, tx_bytes: &[u8], simulate: bool) -> Result<(), BoxError>;
}

/// Byte-serializes transactions for lane inspection.
pub trait TxEncoder: Send + Sync {
    /// The node codec's encoding of `transaction`.
    fn encode(&self, transaction: &Transaction) -> Result<Vec<u8>, BoxError>;
}
