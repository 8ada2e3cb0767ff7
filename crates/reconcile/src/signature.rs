//! HMAC-SHA256 signing and constant-time verification.
//!
//! The same primitive covers both signature checks the gateway contract
//! requires: the client payment proof (`"{order_id}|{payment_id}"`) and the
//! raw webhook body.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer over a server-held secret.
#[derive(Clone)]
pub struct Signer {
    secret: Vec<u8>,
}

impl Signer {
    /// Creates a signer from secret key material.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Hex-encoded HMAC-SHA256 of `message`.
    pub fn sign(&self, message: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(message);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verifies a hex-encoded signature against `message`.
    ///
    /// The underlying comparison is constant-time; a signature that is not
    /// valid hex fails without revealing anything about the expected value.
    pub fn verify(&self, message: &[u8], provided_hex: &str) -> bool {
        let Ok(provided) = hex::decode(provided_hex) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(message);
        mac.verify_slice(&provided).is_ok()
    }

    /// Canonical message for a client payment proof.
    pub fn payment_proof_message(gateway_order_id: &str, gateway_payment_id: &str) -> Vec<u8> {
        format!("{gateway_order_id}|{gateway_payment_id}").into_bytes()
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}
