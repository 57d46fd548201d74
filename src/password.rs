use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minimum length of the client-supplied password digest.
pub const MIN_DIGEST_LEN: usize = 4;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KdfParams {
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl KdfParams {
    pub fn server_default() -> Self {
        Self {
            m_cost_kib: 8 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }

    pub fn for_test() -> Self {
        Self {
            m_cost_kib: 1024,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

/// A room password at rest: argon2 output + salt, both base64, plus the
/// work-factor parameters the hash was derived with.
#[derive(Clone, Debug)]
pub struct StoredPassword {
    pub hash_b64: String,
    pub salt_b64: String,
    pub kdf: KdfParams,
}

fn derive_hash(digest: &str, salt: &[u8], params: &KdfParams) -> Result<[u8; 32]> {
    let argon_params = Params::new(params.m_cost_kib, params.t_cost, params.p_cost, Some(32))
        .map_err(|_| Error::Internal("argon2 params".to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(digest.as_bytes(), salt, &mut output)
        .map_err(|_| Error::Internal("argon2 hash".to_string()))?;
    Ok(output)
}

fn ct_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    // Accumulate over the full fixed-length output; no early exit.
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn hash_password(digest: &str, kdf: &KdfParams) -> Result<StoredPassword> {
    if digest.len() < MIN_DIGEST_LEN {
        return Err(Error::Validation(format!(
            "password digest must be at least {MIN_DIGEST_LEN} characters"
        )));
    }

    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);

    let hash = derive_hash(digest, &salt, kdf)?;
    Ok(StoredPassword {
        hash_b64: B64.encode(hash),
        salt_b64: B64.encode(salt),
        kdf: kdf.clone(),
    })
}

pub fn verify_password(digest: &str, stored: &StoredPassword) -> Result<bool> {
    let salt = B64
        .decode(&stored.salt_b64)
        .map_err(|_| Error::Internal("invalid stored salt".to_string()))?;
    let expected_bytes = B64
        .decode(&stored.hash_b64)
        .map_err(|_| Error::Internal("invalid stored hash".to_string()))?;
    if expected_bytes.len() != 32 {
        return Err(Error::Internal("invalid stored hash length".to_string()));
    }

    let mut expected = [0u8; 32];
    expected.copy_from_slice(&expected_bytes);

    let derived = derive_hash(digest, &salt, &stored.kdf)?;
    Ok(ct_eq(&derived, &expected))
}
