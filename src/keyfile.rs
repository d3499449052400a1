//! Sealed persistence of the ECDSA signing key pair (section 4.G).
//!
//! Grounded on the teacher's `security_vault::keystore` envelope-encryption
//! pattern: a symmetric sealing key wraps the sensitive material with
//! AES-256-GCM before it touches disk. The sealing key itself stands in
//! for the "trusted memory" secret that, in the enclave original, never
//! left the CPU — here it is a second small file written once, alongside
//! the sealed blob, with the payload structure kept self-delimiting.

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::LockError;
use crate::lockmgr::signer::KeyPair;

const NONCE_LEN: usize = 12;
const SEAL_KEY_LEN: usize = 32;

/// The plaintext payload sealed into the key file, named after the
/// original enclave's `DataToSeal { privateKey, publicKey }` structure.
#[derive(Serialize, Deserialize)]
struct DataToSeal {
    private_key: Vec<u8>,
    public_key: Vec<u8>,
}

/// Wraps/unwraps the signing key pair's bytes with AES-256-GCM. `seal` and
/// `unseal` are inverses (tested property I6); the blob is self-delimiting
/// because its entire remaining length after the fixed-width nonce prefix
/// is the ciphertext — there is no further framing to recover.
pub struct KeySeal {
    cipher_key: [u8; SEAL_KEY_LEN],
}

impl KeySeal {
    /// Loads the sealing key from `<path>.sealkey`, generating and
    /// persisting a fresh one if absent.
    fn at(path: &Path) -> Result<Self, LockError> {
        let seal_path = seal_key_path(path);
        if let Some(parent) = seal_path.parent() {
            fs::create_dir_all(parent).map_err(|e| LockError::KeyMaterialError(e.to_string()))?;
        }

        if seal_path.exists() {
            let bytes = fs::read(&seal_path).map_err(|e| LockError::KeyMaterialError(e.to_string()))?;
            if bytes.len() != SEAL_KEY_LEN {
                return Err(LockError::KeyMaterialError("sealing key has unexpected length".into()));
            }
            let mut cipher_key = [0u8; SEAL_KEY_LEN];
            cipher_key.copy_from_slice(&bytes);
            Ok(Self { cipher_key })
        } else {
            let mut cipher_key = [0u8; SEAL_KEY_LEN];
            rand::rng().fill_bytes(&mut cipher_key);
            fs::write(&seal_path, cipher_key).map_err(|e| LockError::KeyMaterialError(e.to_string()))?;
            Ok(Self { cipher_key })
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, LockError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.cipher_key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| LockError::KeyMaterialError(e.to_string()))?;
        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn unseal(&self, blob: &[u8]) -> Result<Vec<u8>, LockError> {
        if blob.len() < NONCE_LEN {
            return Err(LockError::KeyMaterialError("sealed blob too short".into()));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.cipher_key));
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| LockError::KeyMaterialError(e.to_string()))
    }
}

fn seal_key_path(path: &Path) -> PathBuf {
    path.with_extension("sealkey")
}

/// Loads the sealed key pair from `path`, generating and sealing a fresh
/// pair if the file is absent or unreadable.
pub struct SealedKeyFile;

impl SealedKeyFile {
    pub fn load_or_generate(path: &Path) -> Result<KeyPair, LockError> {
        let seal = KeySeal::at(path)?;

        if path.exists() {
            match fs::read(path).map_err(|e| LockError::KeyMaterialError(e.to_string())) {
                Ok(blob) => match seal.unseal(&blob).and_then(|pt| decode_payload(&pt)) {
                    Ok(keypair) => {
                        info!(path = %path.display(), "loaded sealed signing key");
                        return Ok(keypair);
                    }
                    Err(e) => warn!(%e, "sealed key file unreadable, regenerating"),
                },
                Err(e) => warn!(%e, "failed to read sealed key file, regenerating"),
            }
        }

        let keypair = KeyPair::generate();
        let payload = DataToSeal {
            private_key: keypair.private_key_bytes(),
            public_key: keypair.verifying_key.to_encoded_point(true).as_bytes().to_vec(),
        };
        let plaintext = serde_json::to_vec(&payload).map_err(|e| LockError::KeyMaterialError(e.to_string()))?;
        let blob = seal.seal(&plaintext)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LockError::KeyMaterialError(e.to_string()))?;
        }
        fs::write(path, &blob).map_err(|e| LockError::KeyMaterialError(e.to_string()))?;
        info!(path = %path.display(), "generated and sealed a new signing key");
        Ok(keypair)
    }
}

fn decode_payload(plaintext: &[u8]) -> Result<KeyPair, LockError> {
    let payload: DataToSeal =
        serde_json::from_slice(plaintext).map_err(|e| LockError::KeyMaterialError(e.to_string()))?;
    KeyPair::from_scalar_bytes(&payload.private_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_unseal_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let seal = KeySeal::at(&tmp.path().join("k.bin")).unwrap();
        let plaintext = b"attestation key material".to_vec();
        let blob = seal.seal(&plaintext).unwrap();
        assert_eq!(seal.unseal(&blob).unwrap(), plaintext);
    }

    #[test]
    fn load_or_generate_persists_across_calls() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("signing.key");
        let first = SealedKeyFile::load_or_generate(&path).unwrap();
        let second = SealedKeyFile::load_or_generate(&path).unwrap();
        assert_eq!(first.private_key_bytes(), second.private_key_bytes());
    }
}
