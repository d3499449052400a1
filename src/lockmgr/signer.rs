use base64::{engine::general_purpose::STANDARD, Engine as _};
use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::common::{RowId, TransactionId};
use crate::error::LockError;
use crate::lockmgr::types::LockMode;

/// An ECDSA P-256 key pair, loaded from a sealed blob on start or
/// generated fresh (section 4.G).
#[derive(Clone)]
pub struct KeyPair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        Self { signing_key, verifying_key }
    }

    pub fn from_scalar_bytes(private: &[u8]) -> Result<Self, LockError> {
        let signing_key = SigningKey::from_slice(private)
            .map_err(|e| LockError::KeyMaterialError(e.to_string()))?;
        let verifying_key = *signing_key.verifying_key();
        Ok(Self { signing_key, verifying_key })
    }

    pub fn private_key_bytes(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }
}

/// A per-worker signing context. Cloning a [`SigningKey`] is cheap (it
/// wraps a single scalar), standing in for the "each worker opens its own
/// ECC context" requirement without needing per-thread heap state.
pub struct Signer {
    signing_key: SigningKey,
}

impl Signer {
    pub fn new(keypair: &KeyPair) -> Self {
        Self { signing_key: keypair.signing_key.clone() }
    }

    /// Signs `"<tid>_<rid>_<S|X>_<block_timeout>"` and returns the wire
    /// form `base64(sig.r) + "-" + base64(sig.s)` (89 characters).
    pub fn sign_attestation(
        &self,
        tid: TransactionId,
        rid: RowId,
        mode: LockMode,
        block_timeout: u64,
    ) -> String {
        let plaintext = attestation_plaintext(tid, rid, mode, block_timeout);
        let signature: Signature = self.signing_key.sign(plaintext.as_bytes());
        encode_signature(&signature)
    }
}

fn encode_signature(signature: &Signature) -> String {
    let bytes = signature.to_bytes();
    let (r, s) = bytes.split_at(32);
    format!("{}-{}", STANDARD.encode(r), STANDARD.encode(s))
}

pub fn attestation_plaintext(
    tid: TransactionId,
    rid: RowId,
    mode: LockMode,
    block_timeout: u64,
) -> String {
    format!("{}_{}_{}_{}", tid, rid, mode.as_char(), block_timeout)
}

/// Reconstructs the plaintext, decodes the two base64 halves into
/// `(r, s)`, and verifies against `verifying_key`.
pub fn verify_attestation(
    verifying_key: &VerifyingKey,
    signature: &str,
    tid: TransactionId,
    rid: RowId,
    mode: LockMode,
    block_timeout: u64,
) -> Result<(), LockError> {
    let (r_b64, s_b64) = signature
        .split_once('-')
        .ok_or(LockError::SignatureInvalid)?;
    let r = STANDARD.decode(r_b64).map_err(|_| LockError::SignatureInvalid)?;
    let s = STANDARD.decode(s_b64).map_err(|_| LockError::SignatureInvalid)?;
    if r.len() != 32 || s.len() != 32 {
        return Err(LockError::SignatureInvalid);
    }
    let mut raw = [0u8; 64];
    raw[..32].copy_from_slice(&r);
    raw[32..].copy_from_slice(&s);
    let signature = Signature::from_slice(&raw).map_err(|_| LockError::SignatureInvalid)?;

    let plaintext = attestation_plaintext(tid, rid, mode, block_timeout);
    verifying_key
        .verify(plaintext.as_bytes(), &signature)
        .map_err(|_| LockError::SignatureInvalid)
}

/// The exported public key: a base64 string suffixed with its own
/// character count, so a verifier sharing the sealed blob can locate the
/// key boundary.
pub fn export_public_key(verifying_key: &VerifyingKey) -> String {
    let point = verifying_key.to_encoded_point(true);
    let encoded = STANDARD.encode(point.as_bytes());
    let len = encoded.len();
    format!("{}{}", encoded, len)
}

/// Returns 0 until a real chain-head source is wired in (open question
/// #3 in section 9 — the contract with the storage layer is
/// under-specified and must be finalized before production use).
pub fn default_block_timeout() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let keypair = KeyPair::generate();
        let signer = Signer::new(&keypair);
        let sig = signer.sign_attestation(1, 42, LockMode::Exclusive, 0);
        assert_eq!(sig.len(), 89);
        verify_attestation(&keypair.verifying_key, &sig, 1, 42, LockMode::Exclusive, 0).unwrap();
    }

    #[test]
    fn verify_rejects_wrong_row() {
        let keypair = KeyPair::generate();
        let signer = Signer::new(&keypair);
        let sig = signer.sign_attestation(1, 42, LockMode::Shared, 0);
        let result = verify_attestation(&keypair.verifying_key, &sig, 1, 43, LockMode::Shared, 0);
        assert_eq!(result, Err(LockError::SignatureInvalid));
    }

    #[test]
    fn public_key_export_is_self_delimiting() {
        let keypair = KeyPair::generate();
        let exported = export_public_key(&keypair.verifying_key);
        let point = keypair.verifying_key.to_encoded_point(true);
        let b64_len = STANDARD.encode(point.as_bytes()).len();
        assert_eq!(exported, format!("{}{}", STANDARD.encode(point.as_bytes()), b64_len));
    }
}
