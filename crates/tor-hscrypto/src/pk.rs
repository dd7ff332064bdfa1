//! Key type wrappers of various kinds used in onion services.
//
// NOTE: We define wrappers here as a safety net against confusing one kind of
// key for another: without a system like this, it can get pretty hard making
// sure that each key is used only in the right way.

use tor_llcrypto::pk::{curve25519, ed25519, keymanip};

use crate::time::TimePeriod;
use crate::{ops, Subcredential};

/// The nonce prefix used to derive the per-period blinding factor. See
/// rend-spec-v3 section A.2 ("Key blinding").
const BLIND_NONCE_PREFIX: &[u8] = b"key-blind";

/// Build the blinding-factor nonce for a given time period: `"key-blind" ||
/// u64_be(period_num) || u64_be(period_length_seconds)`.
fn blind_nonce(period: &TimePeriod) -> [u8; 9 + 8 + 8] {
    let mut nonce = [0_u8; 9 + 8 + 8];
    nonce[..9].copy_from_slice(BLIND_NONCE_PREFIX);
    nonce[9..17].copy_from_slice(&period.interval_num().to_be_bytes());
    nonce[17..25].copy_from_slice(&u64::from(period.length_in_sec()).to_be_bytes());
    nonce
}

/// The identity of a v3 onion service, in its compact encoded form.
///
/// This is the decoded and validated ed25519 public key that is encoded as a
/// `${base32}.onion` address.  When expanded, it is a public key whose
/// corresponding secret key is controlled by the onion service.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[allow(clippy::exhaustive_structs)]
pub struct OnionId([u8; 32]);

impl OnionId {
    /// Wrap a raw 32-byte Ed25519 public key as an onion ID.
    pub fn new(bytes: [u8; 32]) -> Self {
        OnionId(bytes)
    }

    /// Return the bytes of this onion ID.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for OnionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OnionId({})", crate::addr::encode(&self.0))
    }
}

impl From<[u8; 32]> for OnionId {
    fn from(bytes: [u8; 32]) -> Self {
        OnionId::new(bytes)
    }
}

impl From<OnionId> for [u8; 32] {
    fn from(id: OnionId) -> Self {
        id.0
    }
}

impl From<&OnionIdKey> for OnionId {
    fn from(key: &OnionIdKey) -> Self {
        OnionId::new(*key.0.as_bytes())
    }
}

/// The identity of a v3 onion service, expanded into a public key.
///
/// This is the decoded and validated ed25519 public key that is encoded as
/// a `${base32}.onion` address.
///
/// This key is not used to sign or validate anything on its own; instead, it is
/// used to derive a `BlindedOnionIdKey`.
//
// NOTE: This is called the "master" key in rend-spec-v3, but we're deprecating
// that vocabulary generally.
//
// NOTE: This is a separate type from OnionId because it is about 6x larger.  It
// is an expanded form, used for doing actual cryptography.
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct OnionIdKey(ed25519::PublicKey);

impl OnionIdKey {
    /// Wrap an Ed25519 public key as an onion service identity key.
    pub fn new(key: ed25519::PublicKey) -> Self {
        OnionIdKey(key)
    }

    /// Return the underlying Ed25519 public key.
    pub fn as_ed25519(&self) -> &ed25519::PublicKey {
        &self.0
    }

    /// Derive the blinded key and subcredential for this identity during `cur_period`.
    pub fn compute_blinded_key(
        &self,
        cur_period: &TimePeriod,
    ) -> (BlindedOnionIdKey, Subcredential) {
        let nonce = blind_nonce(cur_period);
        let h = keymanip::blinding_factor(&self.0, &nonce);
        let blinded = keymanip::blind_pubkey(&self.0, h)
            .expect("identity public key was not a valid point");
        let blinded_key = BlindedOnionIdKey(blinded);
        let subcred = ops::subcredential(&self.0, &blinded);
        (blinded_key, subcred)
    }
}

impl TryFrom<&OnionId> for OnionIdKey {
    type Error = signature::Error;
    fn try_from(id: &OnionId) -> Result<Self, Self::Error> {
        ed25519::PublicKey::from_bytes(&id.0).map(OnionIdKey)
    }
}

/// The secret counterpart of an [`OnionIdKey`], able to derive blinded
/// keypairs for successive time periods.
#[allow(clippy::exhaustive_structs)]
pub struct OnionIdKeypair(ed25519::ExpandedKeypair);

impl OnionIdKeypair {
    /// Wrap an expanded Ed25519 keypair as an onion service identity keypair.
    pub fn new(keypair: ed25519::ExpandedKeypair) -> Self {
        OnionIdKeypair(keypair)
    }

    /// Return the public part of this keypair.
    pub fn public(&self) -> OnionIdKey {
        OnionIdKey(*self.0.public())
    }

    /// Derive the blinded keypair and subcredential for this identity during
    /// `cur_period`.
    pub fn compute_blinded_key(
        &self,
        cur_period: &TimePeriod,
    ) -> (BlindedOnionIdKeypair, Subcredential) {
        let nonce = blind_nonce(cur_period);
        let identity_pub = *self.0.public();
        let h = keymanip::blinding_factor(&identity_pub, &nonce);
        let blinded_secret = keymanip::blind_seckey(&self.0, h, &nonce);
        let blinded_pub = *blinded_secret.public();
        let subcred = ops::subcredential(&identity_pub, &blinded_pub);
        (BlindedOnionIdKeypair(blinded_secret), subcred)
    }
}

/// The "blinded" identity of a v3 onion service.
///
/// This key is derived via a one-way transformation from an
/// `OnionIdKey` and the current time period.
///
/// It is used for two purposes: first, to compute an index into the HSDir
/// ring, and second, to sign a `DescSigningKey`.
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct BlindedOnionIdKey(ed25519::PublicKey);

impl BlindedOnionIdKey {
    /// Return the underlying Ed25519 public key.
    pub fn as_ed25519(&self) -> &ed25519::PublicKey {
        &self.0
    }
}

/// A blinded onion service identity, represented in a compact format.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::exhaustive_structs)]
pub struct BlindedOnionId([u8; 32]);

impl From<&BlindedOnionIdKey> for BlindedOnionId {
    fn from(key: &BlindedOnionIdKey) -> Self {
        BlindedOnionId(*key.0.as_bytes())
    }
}

impl TryFrom<&BlindedOnionId> for BlindedOnionIdKey {
    type Error = signature::Error;
    fn try_from(id: &BlindedOnionId) -> Result<Self, Self::Error> {
        ed25519::PublicKey::from_bytes(&id.0).map(BlindedOnionIdKey)
    }
}

/// The secret counterpart of a [`BlindedOnionIdKey`].
///
/// Onion services derive this once per time period (and once more during the
/// overlap period, for the previous one) from their long-term identity
/// keypair; it is used to sign the period's `DescSigningKey`.
#[allow(clippy::exhaustive_structs)]
pub struct BlindedOnionIdKeypair(ed25519::ExpandedKeypair);

impl BlindedOnionIdKeypair {
    /// Return the public part of this keypair.
    pub fn public(&self) -> BlindedOnionIdKey {
        BlindedOnionIdKey(*self.0.public())
    }

    /// Sign a message (such as a `DescSigningKey` certificate) with this key.
    pub fn sign(&self, msg: &[u8]) -> ed25519::Signature {
        self.0.sign(msg)
    }
}

/// A key used to sign onion service descriptors.
///
/// It is authenticated with a `BlindedOnionIdKeys` to prove that it belongs to
/// the right onion service, and is used in turn to sign the descriptor that
/// tells clients what they need to know about contacting an onion service.
///
/// Onion services create a new `DescSigningKey` every time the
/// `BlindedOnionIdKeys` rotates, to prevent descriptors made in one time period
/// from being linkable to those made in another.
///
/// Note: we use a separate signing key here, rather than using the
/// BlindedOnionIdKey directly, so that the secret key for the BlindedOnionIdKey
/// can be kept offline.
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct DescSigningKey(ed25519::PublicKey);

impl DescSigningKey {
    /// Wrap an Ed25519 public key as a descriptor signing key.
    pub fn new(key: ed25519::PublicKey) -> Self {
        DescSigningKey(key)
    }

    /// Return the underlying Ed25519 public key.
    pub fn as_ed25519(&self) -> &ed25519::PublicKey {
        &self.0
    }
}

/// A key used to identify and authenticate an onion service at a single
/// introduction point.
///
/// This key is included in the onion service's descriptor; a different one is
/// used at each introduction point.  Introduction points don't know the
/// relation of this key to the onion service: they only recognize the same key
/// when they see it again.
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct IntroPtAuthKey(ed25519::PublicKey);

impl IntroPtAuthKey {
    /// Wrap an Ed25519 public key as an intro-point auth key.
    pub fn new(key: ed25519::PublicKey) -> Self {
        IntroPtAuthKey(key)
    }

    /// Return the underlying Ed25519 public key.
    pub fn as_ed25519(&self) -> &ed25519::PublicKey {
        &self.0
    }
}

impl From<&IntroPtAuthKey> for ed25519::Ed25519Identity {
    fn from(key: &IntroPtAuthKey) -> Self {
        key.0.into()
    }
}

/// A key used in the HsNtor handshake between the client and the onion service.
///
/// The onion service chooses a different one of these to use with each
/// introduction point, though it does not need to tell the introduction points
/// about these keys.
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct IntroPtEncKey(curve25519::PublicKey);

impl IntroPtEncKey {
    /// Wrap a Curve25519 public key as an intro-point encryption key.
    pub fn new(key: curve25519::PublicKey) -> Self {
        IntroPtEncKey(key)
    }

    /// Return the underlying Curve25519 public key.
    pub fn as_curve25519(&self) -> &curve25519::PublicKey {
        &self.0
    }
}

/// First type of client authorization key, used for the introduction protocol.
///
/// This is used to sign a nonce included in an extension in the encrypted
/// portion of an introduce cell.
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct ClientIntroAuthKey(ed25519::PublicKey);

/// Second type of client authorization key, used for onion descryptor
/// decryption.
///
/// Any client who knows the secret key corresponding to this key can decrypt
/// the inner layer of the onion service descriptor.
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct ClientDescAuthKey(curve25519::PublicKey);

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
    use rand::{rngs::StdRng, SeedableRng};
    use std::time::{Duration, SystemTime};
    use tor_llcrypto::pk::ed25519::Keypair;

    #[test]
    fn blinded_key_matches_between_pub_and_secret_paths() {
        let mut rng = StdRng::seed_from_u64(99);
        let keypair = Keypair::generate(&mut rng);
        let expanded = ed25519::ExpandedKeypair::from(&keypair);

        let id_keypair = OnionIdKeypair::new(expanded);
        let id_key = id_keypair.public();

        let period = TimePeriod::new(Duration::from_secs(1440 * 60), SystemTime::now());

        let (blinded_from_secret, subcred1) = id_keypair.compute_blinded_key(&period);
        let (blinded_from_pub, subcred2) = id_key.compute_blinded_key(&period);

        assert_eq!(
            blinded_from_secret.public().as_ed25519().as_bytes(),
            blinded_from_pub.as_ed25519().as_bytes()
        );
        assert_eq!(subcred1.as_ref(), subcred2.as_ref());
    }

    #[test]
    fn different_periods_give_different_blinded_keys() {
        let mut rng = StdRng::seed_from_u64(123);
        let keypair = Keypair::generate(&mut rng);
        let id_key = OnionIdKey::new(keypair.verifying_key());

        let p1 = TimePeriod::new(Duration::from_secs(1440 * 60), SystemTime::now());
        let p2 = p1.next().unwrap();

        let (b1, _) = id_key.compute_blinded_key(&p1);
        let (b2, _) = id_key.compute_blinded_key(&p2);
        assert_ne!(b1.as_ed25519().as_bytes(), b2.as_ed25519().as_bytes());
    }
}
