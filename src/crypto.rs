//! Hash, HMAC and the salted iteration function `Hi` of RFC5802 section 2.2.

use std::fmt;
use std::num::NonZeroU32;

use ring::{constant_time, digest, hmac, pbkdf2};

use crate::error::Error;

/// HMAC input for deriving the client key from the salted password.
pub const CLIENT_KEY: &[u8] = b"Client Key";
/// HMAC input for deriving the server key from the salted password.
pub const SERVER_KEY: &[u8] = b"Server Key";

/// The hash function a SCRAM mechanism is parameterized with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// SHA-1, used by `SCRAM-SHA-1`.
    Sha1,
    /// SHA-256, used by `SCRAM-SHA-256` (RFC7677).
    Sha256,
    /// SHA-512, used by `SCRAM-SHA-512`.
    Sha512,
}

impl Algorithm {
    /// Looks up an algorithm by its hash name, e.g. `SHA-256` or `SHA256`.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name.to_ascii_uppercase().as_str() {
            "SHA-1" | "SHA1" => Ok(Algorithm::Sha1),
            "SHA-256" | "SHA256" => Ok(Algorithm::Sha256),
            "SHA-512" | "SHA512" => Ok(Algorithm::Sha512),
            _ => Err(Error::UnsupportedAlgorithm(name.to_string())),
        }
    }

    /// The hash name as used in mechanism names.
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Sha1 => "SHA-1",
            Algorithm::Sha256 => "SHA-256",
            Algorithm::Sha512 => "SHA-512",
        }
    }

    /// Length in bytes of a digest, and therefore of every key and proof.
    pub fn output_len(self) -> usize {
        match self {
            Algorithm::Sha1 => digest::SHA1_OUTPUT_LEN,
            Algorithm::Sha256 => digest::SHA256_OUTPUT_LEN,
            Algorithm::Sha512 => digest::SHA512_OUTPUT_LEN,
        }
    }

    fn digest_algorithm(self) -> &'static digest::Algorithm {
        match self {
            Algorithm::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Algorithm::Sha256 => &digest::SHA256,
            Algorithm::Sha512 => &digest::SHA512,
        }
    }

    fn hmac_algorithm(self) -> hmac::Algorithm {
        match self {
            Algorithm::Sha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            Algorithm::Sha256 => hmac::HMAC_SHA256,
            Algorithm::Sha512 => hmac::HMAC_SHA512,
        }
    }

    fn pbkdf2_algorithm(self) -> pbkdf2::Algorithm {
        match self {
            Algorithm::Sha1 => pbkdf2::PBKDF2_HMAC_SHA1,
            Algorithm::Sha256 => pbkdf2::PBKDF2_HMAC_SHA256,
            Algorithm::Sha512 => pbkdf2::PBKDF2_HMAC_SHA512,
        }
    }

    /// `H(data)`
    pub fn hash(self, data: &[u8]) -> Vec<u8> {
        digest::digest(self.digest_algorithm(), data).as_ref().to_vec()
    }

    /// `HMAC(key, data)`
    pub fn hmac(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        self.hmac_parts(key, &[data])
    }

    /// `HMAC(key, parts[0] || parts[1] || ...)` without concatenating the parts first.
    pub fn hmac_parts(self, key: &[u8], parts: &[&[u8]]) -> Vec<u8> {
        let key = hmac::Key::new(self.hmac_algorithm(), key);
        let mut context = hmac::Context::with_key(&key);
        for part in parts {
            context.update(part);
        }
        context.sign().as_ref().to_vec()
    }

    /// `Hi(password, salt, iterations)`, which is PBKDF2 with HMAC-H and a derived key as long as
    /// one digest.
    pub fn hi(self, password: &[u8], salt: &[u8], iterations: NonZeroU32) -> Vec<u8> {
        let mut out = vec![0u8; self.output_len()];
        pbkdf2::derive(self.pbkdf2_algorithm(), iterations, salt, password, &mut out);
        out
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

/// Hashes a password with the given algorithm, salt and number of iterations. This should be
/// used by [`CredentialProvider`](../server/trait.CredentialProvider.html) implementors to hash
/// any passwords prior to being saved.
pub fn hash_password(
    algorithm: Algorithm,
    password: &str,
    iterations: NonZeroU32,
    salt: &[u8],
) -> Vec<u8> {
    algorithm.hi(password.as_bytes(), salt, iterations)
}

pub(crate) fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    a.iter().zip(b).map(|(a, b)| a ^ b).collect()
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    constant_time::verify_slices_are_equal(a, b).is_ok()
}

/// Computes `ClientProof` and `ServerSignature` from the salted password and the transcript.
/// Only the client needs both at once; the server derives them separately.
pub(crate) fn find_proofs(
    algorithm: Algorithm,
    salted_password: &[u8],
    auth_message: &[&[u8]],
) -> (Vec<u8>, Vec<u8>) {
    let client_key = algorithm.hmac(salted_password, CLIENT_KEY);
    let server_key = algorithm.hmac(salted_password, SERVER_KEY);
    let stored_key = algorithm.hash(&client_key);
    let client_signature = algorithm.hmac_parts(&stored_key, auth_message);
    let server_signature = algorithm.hmac_parts(&server_key, auth_message);
    (xor(&client_key, &client_signature), server_signature)
}
