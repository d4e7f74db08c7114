//! Deterministic cryptographic fixtures for testing
//!
//! Provides two fixed RSA-2048 keys (PEM files under `fixtures/`) and
//! reproducible Ed25519 keypairs derived from a seed value.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::EncodingKey;
use ring::signature::{Ed25519KeyPair, KeyPair};
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// Modulus (`n`) of the primary RSA test key, base64url without padding.
pub const PRIMARY_RSA_N: &str = "kHfylnFJmqAh1udVJp3Q_WBPkhZCVyuSCE4pHfOYUQ1lHLkpNVMdUVMGUPBlb9yPwusQzkrG6suAbto-ux-9VfILqbr22zWda7f5V15XZNlP27iqMWWx9SpP4im1iHWXHyMiF6Xv6vQafrsZ9ZY-MRx4vMMOBWgKRZ8VOZaWOMEuk5ZFrbGAhkBJT6V-CUwsTOiFNZnUf1TqdYuVwNLCufjTXk786pZBQQjE57rQy0UGSt_RoOoHzhmYLnZYp8t68pbSQMT8pSKi9WtfyLEfh5Yb8u_yUF6fB2dFEudrDFArNI49GQUoTa-XbYJKqC-adigvP8XY_c4IhA_ahXMvzw";

/// Modulus (`n`) of the secondary RSA test key, base64url without padding.
pub const SECONDARY_RSA_N: &str = "u-AZmvPQ4oNsLDU9ahP033Qqg21FCddgbyKJk6C_YhI75wigcfGdEFCuWcUWJueWqjxD-Z4DQFyY5sfjW3BglPAc3x0eTr0-uDvVYWjLVdMA13fkmTOFcXatQWNPrkQ2ZMp9nWVn-fWFhYcIOOkzIJLCTC8IfN1twRjUiHOFBbDfoTbik6e9zFQ7-hgsmj1wckifDfZ8doAtgUlGI1y6omlRH39l-4PeUQlk5Ysfigdx9n5uoGM-XFvlpne7eOq305Ub8G2KrBvmD3jfz4iOh7bdwahtO9kMP29dPOn2o76dXn2x7JlP1pgSGwAruQoQp1D-iViQYuNedPfq9VOSKw";

/// Public exponent shared by both RSA test keys (65537).
pub const RSA_E: &str = "AQAB";

/// A fixed RSA-2048 signing key.
#[derive(Debug, Clone, Copy)]
pub struct TestRsaKey {
    private_key_pem: &'static str,
    modulus: &'static str,
}

impl TestRsaKey {
    /// The key most tests publish and sign with.
    pub fn primary() -> Self {
        Self {
            private_key_pem: include_str!("../fixtures/rsa_primary.pem"),
            modulus: PRIMARY_RSA_N,
        }
    }

    /// A second, unrelated key for rotation and wrong-key tests.
    pub fn secondary() -> Self {
        Self {
            private_key_pem: include_str!("../fixtures/rsa_secondary.pem"),
            modulus: SECONDARY_RSA_N,
        }
    }

    /// Modulus, base64url without padding.
    pub fn n(&self) -> &'static str {
        self.modulus
    }

    /// PKCS#1 private key in PEM form.
    pub fn private_key_pem(&self) -> &'static str {
        self.private_key_pem
    }

    /// Signing key for `jsonwebtoken::encode`.
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_rsa_pem(self.private_key_pem.as_bytes())
            .expect("RSA fixture PEM should parse")
    }

    /// Public JWK declaring `alg: RS256`.
    pub fn jwk_json(&self, kid: &str) -> serde_json::Value {
        serde_json::json!({
            "kty": "RSA",
            "kid": kid,
            "alg": "RS256",
            "use": "sig",
            "n": self.modulus,
            "e": RSA_E
        })
    }

    /// Public JWK without `alg`, usable with any RSA algorithm.
    pub fn jwk_json_without_alg(&self, kid: &str) -> serde_json::Value {
        serde_json::json!({
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "n": self.modulus,
            "e": RSA_E
        })
    }
}

/// Public JWK for the primary RSA key.
pub fn rsa_jwk_json(kid: &str) -> serde_json::Value {
    TestRsaKey::primary().jwk_json(kid)
}

/// A deterministic Ed25519 keypair.
///
/// The same seed always produces the same keypair, ensuring test
/// reproducibility.
#[derive(Debug, Clone)]
pub struct TestEd25519Key {
    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestEd25519Key {
    /// Derive a keypair from `seed`.
    ///
    /// # Example
    /// ```rust,ignore
    /// let key = TestEd25519Key::from_seed(1)?;
    /// // Same seed always produces same key
    /// assert_eq!(key.public_key_bytes(), TestEd25519Key::from_seed(1)?.public_key_bytes());
    /// ```
    pub fn from_seed(seed: u8) -> Result<Self, FixtureError> {
        let seed_bytes = seed_bytes(seed);

        // Note: from_seed_unchecked is deterministic and suitable for testing
        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes).map_err(|e| {
            FixtureError::Crypto(format!("Failed to generate test keypair: {:?}", e))
        })?;

        Ok(Self {
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        })
    }

    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_key_bytes
    }

    /// Signing key for `jsonwebtoken::encode`.
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_ed_der(&self.private_key_pkcs8)
    }

    /// Public JWK (`kty: OKP`, `crv: Ed25519`).
    pub fn jwk_json(&self, kid: &str) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "kid": kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }
}

/// Expand a one-byte seed into a 32-byte Ed25519 seed.
fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = if i == 0 {
            seed
        } else {
            seed.wrapping_mul(i as u8).wrapping_add(i as u8)
        };
    }
    bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility. Ring doesn't expose a method to get PKCS#8
/// from an Ed25519KeyPair, so it is assembled by hand.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // PKCS#8 v1 format for Ed25519 (RFC 5208):
    // SEQUENCE {
    //   version         INTEGER (0),
    //   algorithm       AlgorithmIdentifier,
    //   privateKey      OCTET STRING
    // }
    // Where privateKey for Ed25519 is an OCTET STRING containing an OCTET
    // STRING with the 32-byte seed.

    let mut pkcs8 = Vec::with_capacity(48);

    // Outer SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);

    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);

    // AlgorithmIdentifier: SEQUENCE { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);

    // Private key: OCTET STRING (34) { OCTET STRING (32) seed }
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
