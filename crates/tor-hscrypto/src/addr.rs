//! Encode and decode v3 onion service addresses.
//!
//! A v3 onion address is the base32 encoding of `pubkey || checksum ||
//! version`, where `checksum = H(".onion checksum" || pubkey ||
//! version)[:2]` and `H` is SHA3-256.

use tor_llcrypto::d::Sha3_256;
use tor_llcrypto::pk::ed25519;

use digest::Digest;
use thiserror::Error;

/// The only version of onion address this crate knows how to parse.
pub const ONION_ADDRESS_VERSION: u8 = 3;

/// Length, in bytes, of the unencoded onion address (pubkey + checksum + version).
const ADDRESS_LEN: usize = 32 + 2 + 1;

/// The domain-separation tag used to compute an onion address checksum.
const CHECKSUM_PREFIX: &[u8] = b".onion checksum";

/// An error that occurred while decoding an onion service address.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum OnionAddressError {
    /// The decoded bytes weren't the right length for a v3 address.
    #[error("Onion address did not decode to the expected length")]
    LengthInvalid,
    /// The string wasn't valid base32.
    #[error("Could not base32-decode onion address")]
    DecodeFailed,
    /// The decoded address carried an unrecognized version byte.
    #[error("Unrecognized onion address version {0}")]
    UnrecognizedVersion(u8),
    /// The decoded checksum did not match the recomputed one.
    #[error("Onion address checksum did not match")]
    ChecksumInvalid,
    /// The decoded bytes were not a valid Ed25519 public key.
    #[error("Onion address did not encode a valid Ed25519 public key")]
    BadPublicKey,
}

/// Compute the 2-byte checksum for a given public key and version.
fn checksum(pubkey: &[u8; 32], version: u8) -> [u8; 2] {
    let mut hasher = Sha3_256::new();
    hasher.update(CHECKSUM_PREFIX);
    hasher.update(pubkey);
    hasher.update([version]);
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}

/// Encode a v3 onion service public key as a `${base32}` onion address
/// (without the trailing `.onion`).
pub fn encode(pubkey: &[u8; 32]) -> String {
    let sum = checksum(pubkey, ONION_ADDRESS_VERSION);
    let mut buf = [0_u8; ADDRESS_LEN];
    buf[..32].copy_from_slice(pubkey);
    buf[32..34].copy_from_slice(&sum);
    buf[34] = ONION_ADDRESS_VERSION;

    data_encoding::BASE32_NOPAD.encode(&buf).to_ascii_lowercase()
}

/// Decode a v3 onion service address (without the trailing `.onion`) into the
/// raw bytes of its Ed25519 public key.
pub fn decode(address: &str) -> Result<[u8; 32], OnionAddressError> {
    let upper = address.to_ascii_uppercase();
    let decoded = data_encoding::BASE32_NOPAD
        .decode(upper.as_bytes())
        .map_err(|_| OnionAddressError::DecodeFailed)?;
    let decoded: [u8; ADDRESS_LEN] = decoded
        .try_into()
        .map_err(|_| OnionAddressError::LengthInvalid)?;

    let mut pubkey = [0_u8; 32];
    pubkey.copy_from_slice(&decoded[..32]);
    let sum = [decoded[32], decoded[33]];
    let version = decoded[34];

    if version != ONION_ADDRESS_VERSION {
        return Err(OnionAddressError::UnrecognizedVersion(version));
    }
    if checksum(&pubkey, version) != sum {
        return Err(OnionAddressError::ChecksumInvalid);
    }
    // Validate that this is actually a point on the curve, not just 32
    // arbitrary bytes.
    ed25519::PublicKey::from_bytes(&pubkey).map_err(|_| OnionAddressError::BadPublicKey)?;

    Ok(pubkey)
}
