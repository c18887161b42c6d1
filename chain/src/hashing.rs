//! Hash functions used by the consensus rules.
//!
//! `sha256d` (double SHA-256) is the chain's canonical hash. `hash160`
//! (RIPEMD160 of SHA-256) underlies P2PKH scripts and addresses. `pow_hash`
//! is the scrypt-based proof-of-work hash, distinct from the canonical block
//! hash, with the Litecoin-style parameterization of salt=input=header
//! bytes.

use ripemd160::{Digest as RipemdDigest, Ripemd160};
use scrypt::{scrypt, ScryptParams};
use sha2::{Digest, Sha256};

pub use crate::serialization::sha256d::sha256d;

/// `RIPEMD160(SHA256(bytes))`, used for P2PKH pubkey hashes and script
/// hashes.
pub fn hash160(bytes: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(bytes);
    let ripe = Ripemd160::digest(&sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

/// `scrypt(header_bytes, header_bytes, N=1024, r=1, p=1, dkLen=32)`.
///
/// Both the password and the salt are the serialized header — this matches
/// Litecoin's parameterization and must be reproduced exactly for
/// interoperability with other implementations of this network.
pub fn pow_hash(header_bytes: &[u8]) -> [u8; 32] {
    // log2(1024) = 10
    let params = ScryptParams::new(10, 1, 1).expect("N=1024, r=1, p=1 are valid scrypt params");
    let mut out = [0u8; 32];
    scrypt(header_bytes, header_bytes, &params, &mut out).expect("fixed-size output buffer");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash160_known_vector() {
        // hash160("") = ripemd160(sha256(""))
        let got = hash160(b"");
        assert_eq!(
            hex::encode(got),
            "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"
        );
    }
}
