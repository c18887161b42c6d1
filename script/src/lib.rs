//! A minimal Bitcoin Script evaluator, restricted to the standard
//! pay-to-public-key-hash template.
//!
//! This does not implement the general Script language: it recognizes
//! exactly one scriptPubKey shape (`OP_DUP OP_HASH160 <20 bytes>
//! OP_EQUALVERIFY OP_CHECKSIG`) and exactly one scriptSig shape (a signature
//! push followed by a public key push), and rejects everything else. That is
//! the only template this network's consensus rules allow.

mod opcodes;
mod sighash;

use chain::hashing::hash160;
use chain::transparent::Script;
use secp256k1::{Message, PublicKey, Secp256k1, Signature};
use thiserror::Error;

pub use sighash::sighash_preimage;

use opcodes::*;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScriptError {
    #[error("scriptSig must consist only of data pushes")]
    NonPushOnlySignatureScript,
    #[error("scriptSig did not contain exactly a signature and a public key")]
    MalformedSignatureScript,
    #[error("scriptPubKey is not a recognized pay-to-public-key-hash template")]
    NotP2pkh,
    #[error("public key hash in scriptSig does not match scriptPubKey")]
    PubKeyHashMismatch,
    #[error("invalid ECDSA signature encoding: {0}")]
    InvalidSignature(String),
    #[error("invalid public key encoding")]
    InvalidPublicKey,
    #[error("signature does not verify against the transaction's signature hash")]
    SignatureVerificationFailed,
}

/// Split a push-only scriptSig into its pushed data items.
fn parse_pushes(script: &[u8]) -> Result<Vec<&[u8]>, ScriptError> {
    let mut items = Vec::new();
    let mut i = 0;
    while i < script.len() {
        let op = script[i];
        i += 1;
        let len = match op {
            0x01..=0x4b => op as usize,
            OP_PUSHDATA1 => {
                let len = *script.get(i).ok_or(ScriptError::MalformedSignatureScript)? as usize;
                i += 1;
                len
            }
            OP_PUSHDATA2 => {
                let bytes = script
                    .get(i..i + 2)
                    .ok_or(ScriptError::MalformedSignatureScript)?;
                i += 2;
                u16::from_le_bytes([bytes[0], bytes[1]]) as usize
            }
            _ => return Err(ScriptError::NonPushOnlySignatureScript),
        };
        let data = script
            .get(i..i + len)
            .ok_or(ScriptError::MalformedSignatureScript)?;
        items.push(data);
        i += len;
    }
    Ok(items)
}

/// Recognize `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG` and
/// return the embedded public key hash.
fn parse_p2pkh_lock_script(script: &[u8]) -> Result<[u8; 20], ScriptError> {
    if script.len() != 25
        || script[0] != OP_DUP
        || script[1] != OP_HASH160
        || script[2] != 20
        || script[23] != OP_EQUALVERIFY
        || script[24] != OP_CHECKSIG
    {
        return Err(ScriptError::NotP2pkh);
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&script[3..23]);
    Ok(hash)
}

/// Build the `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
/// scriptPubKey for `pubkey_hash`, the inverse of `parse_p2pkh_lock_script`.
/// Used by the work service to pay a mined block's coinbase to a requested
/// address.
pub fn p2pkh_lock_script(pubkey_hash: [u8; 20]) -> Script {
    let mut bytes = Vec::with_capacity(25);
    bytes.push(OP_DUP);
    bytes.push(OP_HASH160);
    bytes.push(20);
    bytes.extend_from_slice(&pubkey_hash);
    bytes.push(OP_EQUALVERIFY);
    bytes.push(OP_CHECKSIG);
    Script(bytes)
}

/// Verify that `unlock_script` satisfies `lock_script` for the given
/// signature hash (already computed per the transaction's SIGHASH type and
/// input index).
pub fn verify_p2pkh(
    lock_script: &Script,
    unlock_script: &Script,
    sighash: &[u8; 32],
) -> Result<(), ScriptError> {
    let pub_key_hash = parse_p2pkh_lock_script(&lock_script.0)?;
    let pushes = parse_pushes(&unlock_script.0)?;
    let (sig_bytes, pubkey_bytes) = match pushes.as_slice() {
        [sig, pubkey] => (*sig, *pubkey),
        _ => return Err(ScriptError::MalformedSignatureScript),
    };

    if hash160(pubkey_bytes) != pub_key_hash {
        return Err(ScriptError::PubKeyHashMismatch);
    }

    // The last byte of the pushed signature is the sighash type, not part
    // of the DER-encoded signature itself.
    let der = sig_bytes
        .split_last()
        .map(|(_, rest)| rest)
        .ok_or(ScriptError::MalformedSignatureScript)?;
    let signature = Signature::from_der(der)
        .map_err(|e| ScriptError::InvalidSignature(e.to_string()))?;
    let pubkey =
        PublicKey::from_slice(pubkey_bytes).map_err(|_| ScriptError::InvalidPublicKey)?;
    let message = Message::from_slice(sighash).expect("sighash is exactly 32 bytes");

    Secp256k1::verification_only()
        .verify(&message, &signature, &pubkey)
        .map_err(|_| ScriptError::SignatureVerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length_lock_script() {
        let lock = Script(vec![OP_DUP, OP_HASH160]);
        let unlock = Script(vec![]);
        assert_eq!(
            verify_p2pkh(&lock, &unlock, &[0u8; 32]),
            Err(ScriptError::NotP2pkh)
        );
    }

    #[test]
    fn p2pkh_lock_script_round_trips_through_the_parser() {
        let hash = [7u8; 20];
        let script = p2pkh_lock_script(hash);
        assert_eq!(parse_p2pkh_lock_script(&script.0), Ok(hash));
    }

    #[test]
    fn parses_pushes() {
        let script = vec![2u8, 0xaa, 0xbb, 3u8, 0x01, 0x02, 0x03];
        let items = parse_pushes(&script).unwrap();
        assert_eq!(items, vec![&[0xaa, 0xbb][..], &[0x01, 0x02, 0x03][..]]);
    }
}
