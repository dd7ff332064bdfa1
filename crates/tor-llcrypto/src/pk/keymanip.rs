//! Manipulate Ed25519 keys in the ways demanded by onion-service key blinding.
//!
//! The "key blinding" transform used for onion service identity keys (see
//! `rend-spec-v3`, prop224 appendix A.2) turns a long-term Ed25519 keypair
//! into a new keypair that rotates once per time period, without exposing the
//! long-term secret key to anyone who only knows a blinded key.
//!
//! A blinding factor `h` is a scalar derived from the original public key and
//! a per-period nonce.  Given `h`, anyone can blind a public key (scalar
//! multiplication on the curve); only the holder of the expanded secret key
//! can blind the matching secret key.

use curve25519_dalek::{EdwardsPoint, Scalar};
use digest::Digest;
use ed25519_dalek::hazmat::ExpandedSecretKey;
use sha2::Sha512;
use sha3::Sha3_256;
use thiserror::Error;

use super::ed25519::{ExpandedKeypair, PublicKey};

/// A domain-separation tag for the blinding-factor hash.
const BLIND_STRING: &[u8] = b"Derive temporary signing key";

/// An error during key blinding.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum BlindingError {
    /// The public key provided was not a valid Ed25519 point.
    #[error("Public key was not a valid Ed25519 point")]
    BadPubkey,
}

/// Compute the blinding factor `h` for a given identity public key and nonce.
///
/// `pk` is the master identity public key; `nonce` is a context string that
/// distinguishes this blinding operation from others (typically derived from
/// a time period).
pub fn blinding_factor(pk: &PublicKey, nonce: &[u8]) -> Scalar {
    let mut h = Sha3_256::new();
    h.update(BLIND_STRING);
    h.update(pk.as_bytes());
    h.update(nonce);
    let digest = h.finalize();

    let mut wide = [0_u8; 64];
    wide[..32].copy_from_slice(&digest);
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// Blind a public key `pk` with a given blinding factor `h`.
///
/// Returns an error if `pk` does not decode to a valid point on the curve.
pub fn blind_pubkey(pk: &PublicKey, h: Scalar) -> Result<PublicKey, BlindingError> {
    let compressed = curve25519_dalek::edwards::CompressedEdwardsY(*pk.as_bytes());
    let point: EdwardsPoint = compressed.decompress().ok_or(BlindingError::BadPubkey)?;
    let blinded = point * h;
    PublicKey::from_bytes(blinded.compress().as_bytes()).map_err(|_| BlindingError::BadPubkey)
}

/// Blind an expanded secret key with a given blinding factor `h`.
///
/// The resulting [`ExpandedKeypair`] can sign messages as the blinded
/// identity, but does not reveal the unblinded secret scalar.
pub fn blind_seckey(keypair: &ExpandedKeypair, h: Scalar, nonce: &[u8]) -> ExpandedKeypair {
    let new_scalar = keypair.secret.scalar * h;

    let mut hasher = Sha512::new();
    hasher.update(b"Derive temporary signing key hash prefix");
    hasher.update(keypair.secret.hash_prefix);
    hasher.update(nonce);
    let digest = hasher.finalize();
    let mut new_hash_prefix = [0_u8; 32];
    new_hash_prefix.copy_from_slice(&digest[..32]);

    let secret = ExpandedSecretKey {
        scalar: new_scalar,
        hash_prefix: new_hash_prefix,
    };
    let public = PublicKey::from(&secret);
    ExpandedKeypair { secret, public }
}

#[cfg(test)]
mod test {
    // @@ begin test lint list maintained by maint/add_warning @@
    #![allow(clippy::bool_assert_comparison)]
    #![allow(clippy::clone_on_copy)]
    #![allow(clippy::dbg_macro)]
    #![allow(clippy::print_stderr)]
    #![allow(clippy::print_stdout)]
    #![allow(clippy::single_char_pattern)]
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::unchecked_duration_subtraction)]
    #![allow(clippy::useless_vec)]
    #![allow(clippy::needless_pass_by_value)]
    //! <!-- @@ end test lint list maintained by maint/add_warning @@ -->
    use super::*;
    use crate::pk::ed25519::Keypair;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn blinding_is_consistent() {
        let mut rng = StdRng::seed_from_u64(42);
        let keypair = Keypair::generate(&mut rng);
        let expanded = ExpandedKeypair::from(&keypair);
        let nonce = b"key-blind\x00\x00\x00\x00\x00\x00\x00\x01\x00\x00\x00\x00\x00\x01Q\x80";

        let h = blinding_factor(&keypair.verifying_key(), nonce);
        let blinded_pub = blind_pubkey(&keypair.verifying_key(), h).unwrap();
        let blinded_pair = blind_seckey(&expanded, h, nonce);

        assert_eq!(blinded_pub.as_bytes(), blinded_pair.public().as_bytes());

        // Signing with the blinded keypair produces a signature that the
        // blinded public key accepts.
        use crate::pk::ValidatableSignature;
        let sig = blinded_pair.sign(b"hello world");
        let v = crate::pk::ed25519::ValidatableEd25519Signature::new(
            blinded_pub,
            sig,
            b"hello world",
        );
        assert!(v.is_valid());
    }

    #[test]
    fn distinct_nonces_give_distinct_keys() {
        let mut rng = StdRng::seed_from_u64(7);
        let keypair = Keypair::generate(&mut rng);
        let pk = keypair.verifying_key();

        let h1 = blinding_factor(&pk, b"period-1");
        let h2 = blinding_factor(&pk, b"period-2");
        assert_ne!(h1, h2);

        let b1 = blind_pubkey(&pk, h1).unwrap();
        let b2 = blind_pubkey(&pk, h2).unwrap();
        assert_ne!(b1.as_bytes(), b2.as_bytes());
    }
}
