//! Mid-level cryptographic operations used in the onion service protocol.
use tor_llcrypto::d::Sha3_256;
use tor_llcrypto::pk::ed25519;
use tor_llcrypto::util::ct::CtByteArray;

use digest::Digest;

use crate::Subcredential;

/// Domain-separation tag used when deriving the intermediate "credential"
/// value from an onion service's identity key.
const CREDENTIAL_PREFIX: &[u8] = b"credential";

/// Domain-separation tag used when deriving a [`Subcredential`] from a
/// credential and a blinded key.
const SUBCREDENTIAL_PREFIX: &[u8] = b"subcredential";

/// Derive the subcredential for an onion service during a given time period.
///
/// (See rend-spec-v3 section 2.1: `N_hs_subcred = H("subcredential" | N_hs_cred
/// | blinded-public-key)`, where `N_hs_cred = H("credential" | identity-public-key)`.)
pub fn subcredential(identity_pk: &ed25519::PublicKey, blinded_pk: &ed25519::PublicKey) -> Subcredential {
    let mut cred_hasher = Sha3_256::new();
    cred_hasher.update(CREDENTIAL_PREFIX);
    cred_hasher.update(identity_pk.as_bytes());
    let cred: [u8; 32] = cred_hasher.finalize().into();

    let mut subcred_hasher = Sha3_256::new();
    subcred_hasher.update(SUBCREDENTIAL_PREFIX);
    subcred_hasher.update(cred);
    subcred_hasher.update(blinded_pk.as_bytes());
    let subcred: [u8; 32] = subcred_hasher.finalize().into();
    subcred.into()
}

/// The length of the MAC returned by [`hs_mac`].
pub const HS_MAC_LEN: usize = 32;

/// Compute the lightweight MAC function used in the onion service protocol.
///
/// (See rend-spec-v3 section 0.3 `MAC`.)
///
/// This is not a great MAC; KMAC wasn't defined at the time that the HSv3
/// design was written. Please don't use this MAC in new protocols.
pub fn hs_mac(key: &[u8], msg: &[u8]) -> CtByteArray<HS_MAC_LEN> {
    // rend-spec-v3 says: "Instantiate H with SHA3-256... Instantiate MAC(key=k,
    // message=m) with H(k_len | k | m), where k_len is htonll(len(k))."

    let mut hasher = Sha3_256::new();
    let klen = key.len() as u64;
    hasher.update(klen.to_be_bytes());
    hasher.update(key);
    hasher.update(msg);
    let a: [u8; HS_MAC_LEN] = hasher.finalize().into();
    a.into()
}

/// Reference to a slice of bytes usable to compute the [`hs_mac`] function.
#[derive(Copy, Clone, derive_more::From)]
pub struct HsMacKey<'a>(&'a [u8]);

impl<'a> tor_llcrypto::traits::ShortMac<HS_MAC_LEN> for HsMacKey<'a> {
    fn mac(&self, input: &[u8]) -> CtByteArray<HS_MAC_LEN> {
        hs_mac(self.0, input)
    }

    fn validate(&self, input: &[u8], mac: &[u8; HS_MAC_LEN]) -> subtle::Choice {
        use subtle::ConstantTimeEq;
        let m = hs_mac(self.0, input);
        m.as_ref().ct_eq(mac)
    }
}
