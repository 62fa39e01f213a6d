//! Admission step implementations.
//!
//! Every step has the same shape: it takes the current [`Context`] and
//! the transaction, and returns the updated context or the error that
//! refuses the transaction. The executor in [`super::Pipeline`] owns the
//! order the steps run in; code in this file can freely assume the
//! preconditions its position in the ordering establishes (for instance,
//! the signature steps assume the pubkey-resolution step already filled
//! the signer cache).

use crate::{
    config::Config,
    error::AdmissionError,
    gas::GasMeter,
    keeper::{
        AccountKeeper, BankKeeper, ChannelKeeper, CircuitBreaker, ContractGasPolicy,
        FeegrantKeeper, KeyShareLane, SignModeHandler, TxCounterStore, TxEncoder,
    },
    pipeline::{Context, Mode, ResolvedSigner},
    transaction::Transaction,
};

/// Installs the gas meter every later step charges against.
///
/// Deliver runs are metered by the gas limit the fee declares; simulation
/// runs start unmetered and rely on the simulation-gas-limiting step for
/// their cap.
pub fn set_up_context(
    mut context: Context,
    transaction: &Transaction,
) -> Result<Context, AdmissionError> {
    context.gas = match context.mode() {
        Mode::Deliver => GasMeter::with_limit(transaction.fee.gas_limit),
        Mode::Simulate => GasMeter::infinite(),
    };

    Ok(context)
}

/// Caps the gas meter for simulation runs.
///
/// A no-op in deliver mode, and when no cap is configured.
pub fn limit_simulation_gas(
    mut context: Context,
    limit: Option<u64>,
) -> Result<Context, AdmissionError> {
    if context.is_simulate() {
        if let Some(limit) = limit {
            context.gas = GasMeter::with_limit(limit);
        }
    }

    Ok(context)
}

/// Counts this transaction against the per-block contract-transaction cap.
///
/// The counter store enforces the cap; the step records the assigned
/// index for the contract runtime to read later.
pub fn count_contract_txs(
    mut context: Context,
    tx_counter: &dyn TxCounterStore,
) -> Result<Context, AdmissionError> {
    let index = tx_counter
        .count_tx(context.height())
        .map_err(|error| AdmissionError::ContractTxCount(error.to_string()))?;

    context.contract_tx_index = Some(index);
    Ok(context)
}

/// Records the contract gas unit conversion for this run.
///
/// Later contract-execution gas charges use this scale; it must be
/// established before generic gas consumption begins.
pub fn scale_contract_gas(
    mut context: Context,
    policy: &dyn ContractGasPolicy,
) -> Result<Context, AdmissionError> {
    context.contract_gas_scale = policy.gas_scale();
    Ok(context)
}

/// Rejects messages whose types are administratively disabled.
pub fn circuit_breaker(
    context: Context,
    transaction: &Transaction,
    breaker: &dyn CircuitBreaker,
) -> Result<Context, AdmissionError> {
    for message in &transaction.messages {
        if !breaker.is_allowed(&message.type_url) {
            return Err(AdmissionError::MessageTypeDisabled {
                type_url: message.type_url.clone(),
            });
        }
    }

    Ok(context)
}

/// Rejects extension options the node is not configured to accept.
pub fn extension_options(
    context: Context,
    transaction: &Transaction,
    config: &Config,
) -> Result<Context, AdmissionError> {
    for option in &transaction.extension_options {
        if !config
            .accepted_extensions
            .iter()
            .any(|accepted| accepted == &option.type_url)
        {
            return Err(AdmissionError::UnsupportedExtensionOption {
                type_url: option.type_url.clone(),
            });
        }
    }

    Ok(context)
}

/// Message-level structural self-consistency checks.
///
/// Everything here is stateless: it reads only the transaction itself.
pub fn validate_basic(
    context: Context,
    transaction: &Transaction,
) -> Result<Context, AdmissionError> {
    if transaction.messages.is_empty() {
        return Err(AdmissionError::NoMessages);
    }

    if transaction.signer_infos.is_empty() {
        return Err(AdmissionError::NoSignatures);
    }

    if transaction.signatures.len() != transaction.signer_infos.len() {
        return Err(AdmissionError::SignatureCountMismatch {
            signers: transaction.signer_infos.len(),
            signatures: transaction.signatures.len(),
        });
    }

    for coin in &transaction.fee.amount {
        if coin.amount == 0 {
            return Err(AdmissionError::ZeroFeeCoin {
                denom: coin.denom.clone(),
            });
        }
    }

    Ok(context)
}

/// Rejects transactions whose timeout height has passed.
pub fn timeout_height(
    context: Context,
    transaction: &Transaction,
) -> Result<Context, AdmissionError> {
    if let Some(timeout_height) = transaction.timeout_height {
        if context.height() > timeout_height {
            return Err(AdmissionError::TimeoutHeight {
                timeout_height,
                current_height: context.height(),
            });
        }
    }

    Ok(context)
}

/// Checks the memo against the configured length limit.
pub fn validate_memo(
    context: Context,
    transaction: &Transaction,
    config: &Config,
) -> Result<Context, AdmissionError> {
    let length = transaction.memo.chars().count();
    if length > config.max_memo_characters {
        return Err(AdmissionError::MemoTooLong {
            length,
            max: config.max_memo_characters,
        });
    }

    Ok(context)
}

/// Charges gas proportional to the transaction's serialized size.
pub fn consume_tx_size_gas(
    mut context: Context,
    transaction: &Transaction,
    config: &Config,
) -> Result<Context, AdmissionError> {
    let amount = config
        .tx_size_cost_per_byte
        .saturating_mul(transaction.encoded_len() as u64);

    context
        .gas
        .consume(amount, "transaction size")
        .map_err(AdmissionError::TxSizeGas)?;

    Ok(context)
}

/// Resolves the fee payer and deducts the declared fee.
///
/// The payer is the granter when a fee grant is used, otherwise the
/// explicit payer, otherwise the first signer. Zero-fee transactions skip
/// the bank call entirely.
pub fn deduct_fee(
    mut context: Context,
    transaction: &Transaction,
    account: &dyn AccountKeeper,
    bank: &dyn BankKeeper,
    feegrant: &dyn FeegrantKeeper,
) -> Result<Context, AdmissionError> {
    let fee = &transaction.fee;
    if fee.amount.is_empty() {
        return Ok(context);
    }

    let grantee = transaction.fee_payer().ok_or(AdmissionError::NoFeePayer)?;

    let payer = match fee.granter {
        Some(granter) => {
            feegrant
                .use_grant(&granter, &grantee, &fee.amount)
                .map_err(|error| AdmissionError::FeeGrant(error.to_string()))?;
            granter
        }
        None => grantee,
    };

    if account.account(&payer).is_none() {
        return Err(AdmissionError::UnknownFeePayer { payer });
    }

    bank.deduct_fee(&payer, &fee.amount)
        .map_err(|error| AdmissionError::InsufficientFunds(error.to_string()))?;

    context.fee_payer = Some(payer);
    Ok(context)
}

/// Resolves each signer's public key and caches it in the context.
///
/// A key supplied in the transaction must match the account's registered
/// key; accounts without a registered key have the supplied key
/// registered on first use.
pub fn resolve_pub_keys(
    mut context: Context,
    transaction: &Transaction,
    account: &dyn AccountKeeper,
) -> Result<Context, AdmissionError> {
    let mut signers = Vec::with_capacity(transaction.signer_infos.len());

    for signer in &transaction.signer_infos {
        let found = account
            .account(&signer.address)
            .ok_or(AdmissionError::UnknownSigner {
                signer: signer.address,
            })?;

        let public_key = match (&found.public_key, &signer.public_key) {
            (Some(registered), Some(supplied)) => {
                if registered != supplied {
                    return Err(AdmissionError::PubKeyMismatch {
                        signer: signer.address,
                    });
                }
                registered.clone()
            }
            (Some(registered), None) => registered.clone(),
            (None, Some(supplied)) => {
                account
                    .set_public_key(&signer.address, supplied)
                    .map_err(|error| AdmissionError::AccountUpdate(error.to_string()))?;
                supplied.clone()
            }
            (None, None) => {
                return Err(AdmissionError::MissingPubKey {
                    signer: signer.address,
                })
            }
        };

        signers.push(ResolvedSigner {
            address: signer.address,
            public_key,
            sequence: found.sequence,
        });
    }

    context.signers = signers;
    Ok(context)
}

/// Rejects transactions with more signers than the configured maximum.
pub fn validate_sig_count(
    context: Context,
    transaction: &Transaction,
    config: &Config,
) -> Result<Context, AdmissionError> {
    let count = transaction.signer_infos.len();
    if count > config.tx_sig_limit {
        return Err(AdmissionError::TooManySignatures {
            count,
            max: config.tx_sig_limit,
        });
    }

    Ok(context)
}

/// Charges gas per signature, before the cryptographic verification.
pub fn consume_sig_gas(
    mut context: Context,
    transaction: &Transaction,
    config: &Config,
) -> Result<Context, AdmissionError> {
    let amount = config
        .sig_verify_cost
        .saturating_mul(transaction.signatures.len() as u64);

    context
        .gas
        .consume(amount, "signature verification")
        .map_err(AdmissionError::SignatureGas)?;

    Ok(context)
}

/// Verifies each signer's sequence number and signature.
///
/// The sequence check runs in both modes; the cryptographic check is
/// skipped in simulation, where transactions may carry placeholder
/// signatures.
pub fn verify_signatures(
    context: Context,
    transaction: &Transaction,
    sign_mode: &dyn SignModeHandler,
) -> Result<Context, AdmissionError> {
    // Counts were matched by validate_basic and the cache was filled by
    // resolve_pub_keys, one entry per signer.
    for ((signer, signature), resolved) in transaction
        .signer_infos
        .iter()
        .zip(&transaction.signatures)
        .zip(context.signers())
    {
        if signer.sequence != resolved.sequence {
            return Err(AdmissionError::SequenceMismatch {
                signer: signer.address,
                expected: resolved.sequence,
                found: signer.sequence,
            });
        }

        if context.is_simulate() {
            continue;
        }

        let sign_bytes = sign_mode
            .sign_bytes(transaction, signer)
            .map_err(|error| AdmissionError::SignBytes(error.to_string()))?;

        if !sign_mode.verify(&resolved.public_key, &sign_bytes, signature) {
            return Err(AdmissionError::InvalidSignature {
                signer: signer.address,
            });
        }
    }

    Ok(context)
}

/// Advances every signer's replay-protection counter.
pub fn increment_sequence(
    mut context: Context,
    transaction: &Transaction,
    account: &dyn AccountKeeper,
) -> Result<Context, AdmissionError> {
    for signer in &transaction.signer_infos {
        let sequence = account
            .increment_sequence(&signer.address)
            .map_err(|error| AdmissionError::SequenceUpdate(error.to_string()))?;

        if let Some(resolved) = context
            .signers
            .iter_mut()
            .find(|resolved| resolved.address == signer.address)
        {
            resolved.sequence = sequence;
        }
    }

    Ok(context)
}

/// Rejects duplicate cross-chain relay-proof submissions.
pub fn redundant_relay(
    context: Context,
    transaction: &Transaction,
    channel: &dyn ChannelKeeper,
) -> Result<Context, AdmissionError> {
    channel
        .check_redundant_relay(&transaction.messages)
        .map_err(|error| AdmissionError::RedundantRelay(error.to_string()))?;

    Ok(context)
}

/// Applies restricted-lane admission rules to the encoded transaction.
pub fn key_share_lane(
    context: Context,
    transaction: &Transaction,
    encoder: &dyn TxEncoder,
    lane: &dyn KeyShareLane,
) -> Result<Context, AdmissionError> {
    let tx_bytes = encoder
        .encode(transaction)
        .map_err(|error| AdmissionError::TxEncoding(error.to_string()))?;

    lane.check_lane(&tx_bytes, context.is_simulate())
        .map_err(|error| AdmissionError::KeyShareLane(error.to_string()))?;

    Ok(context)
}
