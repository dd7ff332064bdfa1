//! Service-side introduction point establishment and the intro-point
//! registry, per §4.D "Service establishes intro point" / "Intro point
//! verifies".

use std::collections::HashMap;

use safelog::Sensitive;
use tracing::{debug, warn};

use tor_cell::relaycell::hs::est_intro::{EstablishIntroDetails, EstablishIntroSigError};
use tor_hscrypto::ops::HsMacKey;
use tor_llcrypto::pk::curve25519::StaticKeypair;
use tor_llcrypto::pk::ed25519::{Ed25519Identity, Keypair};

use crate::err::{IntroEstablishError, IntroPointVerifyError};
use crate::replay::ReplayLog;
use crate::timeouts::MAX_INTRO_CIRCS_PER_PERIOD;

/// Local identifier for one introduction point this service is using.
///
/// This corresponds to one entry in the service's descriptor; it's distinct
/// from the auth key, since a service may cycle the auth key for a given
/// intro point across runs but keep using the same relay.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, derive_more::Display)]
pub struct IptLocalId(pub u64);

/// An introduction point the service has chosen (or is attempting) to use.
pub struct IntroPoint {
    /// Local identifier, stable across retries to the same relay.
    pub local_id: IptLocalId,
    /// The auth keypair this service will present at this introduction
    /// point. A relay recognizes intro circuits for the same IP by this key.
    pub auth_keypair: Keypair,
    /// The per-intro-point X25519 keypair clients use (via the descriptor)
    /// to derive the `INTRODUCE1`/`INTRODUCE2` encryption key, distinct from
    /// the ntor onion-service handshake key.
    pub enc_keypair: StaticKeypair,
    /// Whether we've heard `INTRO_ESTABLISHED` back from this intro point.
    pub established: bool,
    /// The replay log for `INTRODUCE2` cells arriving at this IP.
    pub replay: ReplayLog,
    /// Number of `INTRODUCE2` cells accepted since this IP's replay log was
    /// created.
    pub introduce2_count: u64,
    /// Time (seconds since the Unix epoch) at which this IP expires and
    /// should be replaced, regardless of `introduce2_count`.
    pub time_to_expire: u64,
    /// Number of intro-circuit launch attempts made to this relay during the
    /// current `INTRO_CIRC_RETRY_PERIOD` window.
    pub launches_this_period: u32,
}

impl IntroPoint {
    /// Construct a fresh, not-yet-established introduction point that
    /// expires at `time_to_expire` (seconds since the Unix epoch).
    pub fn new(
        local_id: IptLocalId,
        auth_keypair: Keypair,
        enc_keypair: StaticKeypair,
        time_to_expire: u64,
    ) -> Self {
        IntroPoint {
            local_id,
            auth_keypair,
            enc_keypair,
            established: false,
            replay: ReplayLog::new(),
            introduce2_count: 0,
            time_to_expire,
            launches_this_period: 0,
        }
    }

    /// Return this IP's public encryption key, published in the service
    /// descriptor's intro-point entry.
    pub fn enc_key(&self) -> tor_llcrypto::pk::curve25519::PublicKey {
        self.enc_keypair.public
    }

    /// True once this IP has exceeded its introduction quota or its expiry
    /// time, and should be dropped and replaced (§3 "expires when either
    /// limit reached").
    pub fn has_expired(&self, now: u64, introduce2_max: u64) -> bool {
        self.introduce2_count >= introduce2_max || now >= self.time_to_expire
    }

    /// Return this IP's public auth key.
    pub fn auth_key(&self) -> Ed25519Identity {
        Ed25519Identity::from(self.auth_keypair.verifying_key())
    }

    /// Whether this IP may launch another circuit-establishment attempt
    /// within its current retry-period window (§5 `MAX_INTRO_CIRCS_PER_PERIOD`).
    pub fn may_launch_another(&self) -> bool {
        self.launches_this_period < MAX_INTRO_CIRCS_PER_PERIOD
    }

    /// Record that we're about to launch another circuit to this IP.
    pub fn record_launch(&mut self) {
        self.launches_this_period += 1;
    }

    /// Reset the per-period launch counter at an `INTRO_CIRC_RETRY_PERIOD`
    /// boundary.
    pub fn reset_launch_period(&mut self) {
        self.launches_this_period = 0;
    }

    /// Build the signed, encoded `ESTABLISH_INTRO` cell body this service
    /// should send down a freshly opened intro circuit, per §4.D step 3.
    ///
    /// `mac_key` is derived from the circuit's handshake key material by the
    /// caller's circuit layer.
    pub fn build_establish_intro<'a>(
        &self,
        mac_key: impl Into<HsMacKey<'a>>,
    ) -> Result<Vec<u8>, IntroEstablishError> {
        let details = EstablishIntroDetails::new(self.auth_key());
        let encoded = details
            .sign_and_encode(&self.auth_keypair, mac_key)
            .map_err(IntroEstablishError::CreateCell)?;
        debug!(
            ipt = %self.local_id,
            auth_key = ?Sensitive::new(self.auth_key()),
            "built ESTABLISH_INTRO cell"
        );
        Ok(encoded)
    }
}

/// The service's registry of introduction points it has established or is
/// attempting to establish, keyed by auth key so that a relay (or our own
/// bookkeeping) can detect "two intro circuits with the same auth key" per
/// the tie-break rule in §4.D.
#[derive(Default)]
pub struct IptRegistry {
    /// Introduction points currently registered, keyed by auth key.
    by_auth_key: HashMap<Ed25519Identity, IptLocalId>,
    /// The introduction points themselves.
    ipts: HashMap<IptLocalId, IntroPoint>,
    /// The number of introduction points the service wants kept open, per
    /// its configuration.
    num_intro_points: usize,
}

/// What to do with a circuit that just finished opening, decided by
/// [`IptRegistry::on_circuit_opened`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CircuitOpenedDisposition {
    /// Proceed to build and send `ESTABLISH_INTRO` on this circuit.
    EstablishIntro,
    /// The service already has `num_intro_points` established or pending;
    /// repurpose this circuit to general use rather than closing it, and
    /// drop the IP.
    RepurposeToGeneral,
}

impl IptRegistry {
    /// Create a registry that aims to keep `num_intro_points` introduction
    /// points open.
    pub fn new(num_intro_points: usize) -> Self {
        IptRegistry {
            by_auth_key: HashMap::new(),
            ipts: HashMap::new(),
            num_intro_points,
        }
    }

    /// Number of introduction points currently tracked (established or
    /// pending), regardless of cap.
    pub fn len(&self) -> usize {
        self.ipts.len()
    }

    /// True if there are no tracked introduction points.
    pub fn is_empty(&self) -> bool {
        self.ipts.is_empty()
    }

    /// Register a newly chosen introduction point before a circuit to it has
    /// opened.
    pub fn insert(&mut self, ipt: IntroPoint) {
        let auth_key = ipt.auth_key();
        if let Some(old_id) = self.by_auth_key.insert(auth_key, ipt.local_id) {
            // Tie-break: an auth key collision keeps the newest and drops
            // the old registration (§4.D "Tie-breaks and edge cases").
            debug!(
                old = %old_id,
                new = %ipt.local_id,
                auth_key = ?Sensitive::new(auth_key),
                "duplicate intro-point auth key, dropping older registration"
            );
            self.ipts.remove(&old_id);
        }
        self.ipts.insert(ipt.local_id, ipt);
    }

    /// Look up a tracked introduction point by local id.
    pub fn get(&self, id: IptLocalId) -> Option<&IntroPoint> {
        self.ipts.get(&id)
    }

    /// Look up a tracked introduction point by local id, mutably.
    pub fn get_mut(&mut self, id: IptLocalId) -> Option<&mut IntroPoint> {
        self.ipts.get_mut(&id)
    }

    /// Decide what to do when a circuit to introduction point `id` has just
    /// opened, per §4.D step 2: "if the service already has more than
    /// `num_intro_points` opened intro circuits for this descriptor,
    /// repurpose this circuit to general and drop the IP".
    ///
    /// Counts only *established* IPs other than `id` itself towards the cap,
    /// since circuits still pending establishment don't yet count as
    /// "opened intro circuits" in the sense of that invariant.
    pub fn on_circuit_opened(&mut self, id: IptLocalId) -> CircuitOpenedDisposition {
        let established_others = self
            .ipts
            .values()
            .filter(|ip| ip.established && ip.local_id != id)
            .count();
        if established_others >= self.num_intro_points {
            debug!(
                ipt = %id,
                established_others,
                cap = self.num_intro_points,
                "intro-point cap reached, repurposing circuit to general"
            );
            self.remove(id);
            CircuitOpenedDisposition::RepurposeToGeneral
        } else {
            CircuitOpenedDisposition::EstablishIntro
        }
    }

    /// Remove a tracked introduction point, e.g. after it's repurposed or
    /// its circuit has failed permanently.
    pub fn remove(&mut self, id: IptLocalId) -> Option<IntroPoint> {
        let ipt = self.ipts.remove(&id)?;
        self.by_auth_key.remove(&ipt.auth_key());
        Some(ipt)
    }

    /// Mark introduction point `id` established, after `INTRO_ESTABLISHED`
    /// has been received and validated.
    pub fn mark_established(&mut self, id: IptLocalId) {
        if let Some(ipt) = self.ipts.get_mut(&id) {
            ipt.established = true;
            debug!(ipt = %id, "intro point established");
        }
    }

    /// Number of introduction points already established.
    pub fn established_count(&self) -> usize {
        self.ipts.values().filter(|ip| ip.established).count()
    }
}

/// Verify an `ESTABLISH_INTRO` cell received by a relay acting as an
/// introduction point, per §4.D "Intro point verifies".
///
/// `circuit_is_eligible` should be true only for an `OR`-purpose circuit
/// with `n_chan == 0` (i.e. one hop, not yet repurposed).
pub fn verify_establish_intro<'a>(
    cell: tor_cell::relaycell::hs::est_intro::EstablishIntro,
    mac_key: impl Into<HsMacKey<'a>>,
    circuit_is_eligible: bool,
) -> Result<EstablishIntroDetails, IntroPointVerifyError> {
    if !circuit_is_eligible {
        warn!("rejecting ESTABLISH_INTRO: circuit was not eligible to become an introduction circuit");
        return Err(IntroPointVerifyError::WrongCircuitState);
    }
    cell.check_and_unwrap(mac_key).map_err(|e| {
        warn!(error = %e, "rejecting ESTABLISH_INTRO: signature or MAC check failed");
        match e {
            EstablishIntroSigError::Invalid => IntroPointVerifyError::BadAuth(e),
        }
    })
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
    use rand::{rngs::StdRng, SeedableRng};

    fn keypair(seed: u64) -> Keypair {
        let mut rng = StdRng::seed_from_u64(seed);
        Keypair::generate(&mut rng)
    }

    fn enc_keypair(seed: u64) -> StaticKeypair {
        let mut rng = StdRng::seed_from_u64(seed);
        let secret = tor_llcrypto::pk::curve25519::StaticSecret::random_from_rng(&mut rng);
        let public = tor_llcrypto::pk::curve25519::PublicKey::from(&secret);
        StaticKeypair { secret, public }
    }

    fn fresh_ipt(id: IptLocalId, seed: u64) -> IntroPoint {
        IntroPoint::new(id, keypair(seed), enc_keypair(seed + 1000), u64::MAX)
    }

    #[test]
    fn cap_is_enforced_on_circuit_open() {
        let mut reg = IptRegistry::new(2);
        let a = IptLocalId(1);
        let b = IptLocalId(2);
        let c = IptLocalId(3);
        reg.insert(fresh_ipt(a, 1));
        reg.insert(fresh_ipt(b, 2));
        reg.insert(fresh_ipt(c, 3));

        assert_eq!(reg.on_circuit_opened(a), CircuitOpenedDisposition::EstablishIntro);
        reg.mark_established(a);
        assert_eq!(reg.on_circuit_opened(b), CircuitOpenedDisposition::EstablishIntro);
        reg.mark_established(b);

        // Now two are established; a third crosses the cap and gets dropped.
        assert_eq!(reg.on_circuit_opened(c), CircuitOpenedDisposition::RepurposeToGeneral);
        assert!(reg.get(c).is_none());
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn duplicate_auth_key_keeps_newest() {
        let mut reg = IptRegistry::new(5);
        let kp = keypair(42);
        let old_id = IptLocalId(1);
        let new_id = IptLocalId(2);
        reg.insert(IntroPoint::new(old_id, kp.clone(), enc_keypair(1042), u64::MAX));
        reg.insert(IntroPoint::new(new_id, kp, enc_keypair(2042), u64::MAX));
        assert!(reg.get(old_id).is_none());
        assert!(reg.get(new_id).is_some());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn expires_once_either_limit_is_reached() {
        let ipt = fresh_ipt(IptLocalId(1), 5);
        let mut past_expiry = fresh_ipt(IptLocalId(2), 6);
        past_expiry.time_to_expire = 100;
        assert!(!ipt.has_expired(0, 10));
        assert!(past_expiry.has_expired(200, 10));

        let mut over_quota = fresh_ipt(IptLocalId(3), 7);
        over_quota.introduce2_count = 10;
        assert!(over_quota.has_expired(0, 10));
    }

    #[test]
    fn establish_intro_round_trips_through_verify() {
        let ipt = fresh_ipt(IptLocalId(1), 7);
        let mac_key = b"shared circuit secret material..";
        let encoded = ipt.build_establish_intro(&mac_key[..]).unwrap();

        let mut reader = tor_bytes::Reader::from_slice(&encoded);
        let cell: tor_cell::relaycell::hs::est_intro::EstablishIntro =
            tor_cell::relaycell::msg::Body::decode_from_reader(&mut reader).unwrap();

        let details = verify_establish_intro(cell, &mac_key[..], true).unwrap();
        assert_eq!(details.auth_key(), ipt.auth_key());
    }
}
