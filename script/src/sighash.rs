//! SIGHASH_ALL preimage construction.
//!
//! This network only supports `SIGHASH_ALL` (0x01): every input and output
//! commits to the signature. The preimage is the legacy (pre-SegWit)
//! transaction serialization with every input's unlock script cleared
//! except the one being signed, which is set to the referenced output's
//! lock script.

use chain::{
    transparent::{Input, Script},
    sha256d, BitcoinSerialize,
};

pub const SIGHASH_ALL: u32 = 0x01;

/// Compute the SIGHASH_ALL digest for input `input_index` of `tx`, given the
/// lock script of the output it spends.
pub fn sighash_preimage(
    tx: &chain::transaction::Transaction,
    input_index: usize,
    previous_lock_script: &Script,
) -> [u8; 32] {
    let mut writer = sha256d::Writer::default();

    tx.version
        .bitcoin_serialize(&mut writer)
        .expect("Sha256dWriter is infallible");
    chain::CompactInt::from(tx.inputs.len())
        .bitcoin_serialize(&mut writer)
        .unwrap();
    for (i, input) in tx.inputs.iter().enumerate() {
        let cleared = clear_unlock_script(input, i == input_index, previous_lock_script);
        cleared.bitcoin_serialize(&mut writer).unwrap();
    }
    chain::CompactInt::from(tx.outputs.len())
        .bitcoin_serialize(&mut writer)
        .unwrap();
    for output in tx.outputs.iter() {
        output.bitcoin_serialize(&mut writer).unwrap();
    }
    tx.locktime.bitcoin_serialize(&mut writer).unwrap();
    SIGHASH_ALL.bitcoin_serialize(&mut writer).unwrap();

    writer.finish()
}

fn clear_unlock_script(input: &Input, is_signing_input: bool, previous_lock_script: &Script) -> Input {
    match input {
        Input::PrevOut {
            outpoint,
            sequence,
            ..
        } => Input::PrevOut {
            outpoint: *outpoint,
            unlock_script: if is_signing_input {
                previous_lock_script.clone()
            } else {
                Script(Vec::new())
            },
            sequence: *sequence,
        },
        Input::Coinbase { .. } => input.clone(),
    }
}
