//! Per-transaction consensus checks.

use chain::{
    amount::{Amount, AmountError},
    block::Height,
    transaction::Transaction,
    transparent::{Input, Output},
};
use thiserror::Error;

/// Coinbase outputs cannot be spent until they have this many confirmations.
pub const COINBASE_MATURITY: u32 = 100;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction has no inputs")]
    NoInputs,
    #[error("transaction has no outputs")]
    NoOutputs,
    #[error("coinbase transaction found outside a block's first position")]
    CoinbasePosition,
    #[error("coinbase input found outside a block's first transaction")]
    CoinbaseInputFound,
    #[error("a spent coinbase output has not yet reached maturity")]
    ImmatureCoinbaseSpend,
    #[error("sum of transaction outputs overflows")]
    Amount(#[from] AmountError),
    #[error("referenced previous output was not found")]
    MissingInput,
    #[error("sum of transaction inputs is less than the sum of its outputs")]
    ValueOverflow,
    #[error("script evaluation failed: {0}")]
    Script(#[from] script::ScriptError),
}

pub fn has_inputs_and_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        Err(TransactionError::NoInputs)
    } else if tx.outputs.is_empty() {
        Err(TransactionError::NoOutputs)
    } else {
        Ok(())
    }
}

/// Sum a transaction's output values, rejecting overflow.
pub fn output_total(outputs: &[Output]) -> Result<Amount, TransactionError> {
    outputs
        .iter()
        .try_fold(Amount::zero(), |total, output| total.checked_add(output.value))
        .map_err(TransactionError::from)
}

/// Check that spending a coinbase output at `spend_height` is allowed, given
/// the height of the block that created it.
pub fn coinbase_spend_is_mature(
    coinbase_height: Height,
    spend_height: Height,
) -> Result<(), TransactionError> {
    if spend_height.0 < coinbase_height.0 + COINBASE_MATURITY {
        Err(TransactionError::ImmatureCoinbaseSpend)
    } else {
        Ok(())
    }
}

/// Evaluate every non-coinbase input's scriptSig against its referenced
/// output's scriptPubKey.
pub fn scripts_are_valid(
    tx: &Transaction,
    previous_outputs: &[Output],
) -> Result<(), TransactionError> {
    for (i, input) in tx.inputs.iter().enumerate() {
        if let Input::PrevOut { unlock_script, .. } = input {
            let previous_output = &previous_outputs[i];
            let sighash = script::sighash_preimage(tx, i, &previous_output.lock_script);
            script::verify_p2pkh(&previous_output.lock_script, unlock_script, &sighash)?;
        }
    }
    Ok(())
}
