//! Transaction types for the admission pipeline.
//!
//! A [`Transaction`] is an immutable bundle owned by the caller; the
//! pipeline only ever reads it. Mutable per-invocation state lives in
//! [`crate::pipeline::Context`] instead.

use std::{fmt, sync::Arc};

/// The identifier of an account on the chain.
///
/// Addresses are opaque to the pipeline; they are only ever compared and
/// passed through to the keepers.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Returns the raw bytes of this address.
    pub fn bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Address").field(&hex::encode(self.0)).finish()
    }
}

/// An amount of some fee denomination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coin {
    /// The denomination this amount is counted in.
    pub denom: String,
    /// The amount, in the smallest unit of `denom`.
    pub amount: u128,
}

/// The fee declared by a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Fee {
    /// The coins offered as the fee. May be empty for zero-fee transactions.
    pub amount: Vec<Coin>,

    /// The gas limit the transaction is prepared to pay for.
    ///
    /// The context setup step installs a gas meter with this limit for
    /// deliver-mode runs.
    pub gas_limit: u64,

    /// An explicit fee payer. Defaults to the first signer when absent.
    pub payer: Option<Address>,

    /// A fee granter. When present, the fee-grant keeper is consulted and
    /// the granter's account is charged instead of the payer's.
    pub granter: Option<Address>,
}

/// A single message carried by a transaction.
///
/// Message contents are opaque to the pipeline: only the type URL is
/// inspected (by the circuit breaker), everything else is forwarded to the
/// keepers untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The protocol type of this message.
    pub type_url: String,
    /// The encoded message body.
    pub value: Vec<u8>,
    /// The account required to sign for this message.
    pub signer: Address,
}

/// An extension option attached to a transaction.
///
/// Unknown options are rejected during admission unless the node is
/// configured to accept their type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionOption {
    /// The protocol type of this option.
    pub type_url: String,
    /// The encoded option body.
    pub value: Vec<u8>,
}

/// A public key, opaque to the pipeline.
///
/// The sign-mode handler is the only component that interprets key bytes;
/// the pipeline just resolves, caches, and compares them.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(pub Vec<u8>);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

/// A detached signature, opaque to the pipeline.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signature")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

/// Metadata about one signer of a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerInfo {
    /// The signer's account address.
    pub address: Address,

    /// The signer's public key, if it is included in the transaction.
    ///
    /// A key is required here only when the account has no key registered
    /// yet; otherwise the registered key is used.
    pub public_key: Option<PublicKey>,

    /// The account sequence number this signature commits to.
    pub sequence: u64,
}

/// An immutable transaction submitted for admission.
///
/// The pipeline never mutates a transaction, so they are cheap to share
/// between concurrent admission runs via [`Arc`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// The messages to execute, in order.
    pub messages: Vec<Message>,

    /// The declared fee.
    pub fee: Fee,

    /// Signer metadata, one entry per signer.
    pub signer_infos: Vec<SignerInfo>,

    /// Detached signatures, in the same order as `signer_infos`.
    pub signatures: Vec<Signature>,

    /// Free-form memo text.
    pub memo: String,

    /// The last block height this transaction may be included at, if any.
    pub timeout_height: Option<u64>,

    /// Extension options, rejected during admission unless configured.
    pub extension_options: Vec<ExtensionOption>,
}

/// A transaction hash, used to identify transactions in logs and
/// admission responses.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash(pub [u8; 32]);

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("transaction::Hash")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl Transaction {
    /// Computes the hash identifying this transaction.
    ///
    /// The hash is a BLAKE2b-256 digest of the canonical encoding, so it
    /// commits to every field, including the signatures.
    pub fn hash(&self) -> Hash {
        let digest = blake2b_simd::Params::new()
            .hash_length(32)
            .personal(b"TxAdmission_Hash")
            .to_state()
            .update(&self.canonical_bytes())
            .finalize();

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(digest.as_bytes());
        Hash(bytes)
    }

    /// The serialized size of this transaction, in bytes.
    ///
    /// Used to charge gas proportional to the space the transaction takes
    /// up in a block.
    pub fn encoded_len(&self) -> usize {
        self.canonical_bytes().len()
    }

    /// A deterministic byte encoding of this transaction.
    ///
    /// This is an internal canonical form for hashing and size accounting.
    /// It is not the network wire format; the node's codec is a separate
    /// collaborator, consumed through [`crate::keeper::TxEncoder`].
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();

        write_slice_len(&mut out, self.messages.len());
        for message in &self.messages {
            write_bytes(&mut out, message.type_url.as_bytes());
            write_bytes(&mut out, &message.value);
            out.extend_from_slice(message.signer.bytes());
        }

        write_slice_len(&mut out, self.fee.amount.len());
        for coin in &self.fee.amount {
            write_bytes(&mut out, coin.denom.as_bytes());
            out.extend_from_slice(&coin.amount.to_le_bytes());
        }
        out.extend_from_slice(&self.fee.gas_limit.to_le_bytes());
        write_optional_address(&mut out, &self.fee.payer);
        write_optional_address(&mut out, &self.fee.granter);

        write_slice_len(&mut out, self.signer_infos.len());
        for signer in &self.signer_infos {
            out.extend_from_slice(signer.address.bytes());
            match &signer.public_key {
                Some(key) => {
                    out.push(1);
                    write_bytes(&mut out, &key.0);
                }
                None => out.push(0),
            }
            out.extend_from_slice(&signer.sequence.to_le_bytes());
        }

        write_slice_len(&mut out, self.signatures.len());
        for signature in &self.signatures {
            write_bytes(&mut out, &signature.0);
        }

        write_bytes(&mut out, self.memo.as_bytes());
        out.extend_from_slice(&self.timeout_height.unwrap_or(0).to_le_bytes());

        write_slice_len(&mut out, self.extension_options.len());
        for option in &self.extension_options {
            write_bytes(&mut out, option.type_url.as_bytes());
            write_bytes(&mut out, &option.value);
        }

        out
    }

    /// Returns the fee payer account for this transaction:
    /// the explicit payer if set, otherwise the first signer.
    ///
    /// Returns `None` for a transaction with no signers and no explicit
    /// payer, which basic validation rejects anyway.
    pub fn fee_payer(&self) -> Option<Address> {
        self.fee
            .payer
            .or_else(|| self.signer_infos.first().map(|signer| signer.address))
    }

    /// Wraps this transaction in an [`Arc`] for sharing across admission runs.
    pub fn into_shared(self) -> Arc<Transaction> {
        Arc::new(self)
    }
}

fn write_slice_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u64).to_le_bytes());
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_slice_len(out, bytes.len());
    out.extend_from_slice(bytes);
}

fn write_optional_address(out: &mut Vec<u8>, address: &Option<Address>) {
    match address {
        Some(address) => {
            out.push(1);
            out.extend_from_slice(address.bytes());
        }
        None => out.push(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_transaction() -> Transaction {
        Transaction {
            messages: vec![Message {
                type_url: "/bank.v1.MsgSend".to_string(),
                value: vec![1, 2, 3],
                signer: Address([7; 20]),
            }],
            fee: Fee {
                amount: vec![Coin {
                    denom: "uatom".to_string(),
                    amount: 1_500,
                }],
                gas_limit: 200_000,
                payer: None,
                granter: None,
            },
            signer_infos: vec![SignerInfo {
                address: Address([7; 20]),
                public_key: Some(PublicKey(vec![9; 33])),
                sequence: 4,
            }],
            signatures: vec![Signature(vec![0xAB; 64])],
            memo: "ok".to_string(),
            timeout_height: Some(1_000),
            extension_options: Vec::new(),
        }
    }

    #[test]
    fn hash_commits_to_every_field() {
        let transaction = demo_transaction();
        let base = transaction.hash();

        let mut changed = transaction.clone();
        changed.memo = "not ok".to_string();
        assert_ne!(base, changed.hash(), "memo must affect the hash");

        let mut changed = transaction.clone();
        changed.signer_infos[0].sequence = 5;
        assert_ne!(base, changed.hash(), "sequence must affect the hash");

        let mut changed = transaction.clone();
        changed.signatures[0] = Signature(vec![0xCD; 64]);
        assert_ne!(base, changed.hash(), "signatures must affect the hash");

        assert_eq!(base, transaction.hash(), "hashing must be deterministic");
    }

    #[test]
    fn fee_payer_defaults_to_first_signer() {
        let mut transaction = demo_transaction();
        assert_eq!(transaction.fee_payer(), Some(Address([7; 20])));

        transaction.fee.payer = Some(Address([1; 20]));
        assert_eq!(transaction.fee_payer(), Some(Address([1; 20])));
    }

    #[test]
    fn encoded_len_tracks_payload_size() {
        let transaction = demo_transaction();
        let base = transaction.encoded_len();

        let mut bigger = transaction.clone();
        bigger.memo = "a much longer memo than before".to_string();
        assert!(bigger.encoded_len() > base);
    }
}
