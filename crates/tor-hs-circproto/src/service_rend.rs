//! Service-side handling of `INTRODUCE2` cells and the resulting rendezvous
//! circuit, per §4.D "Service rendezvous".

use safelog::Sensitive;
use tracing::{debug, warn};

use tor_hscrypto::pk::OnionIdKey;
use tor_hscrypto::RendCookie;

use crate::circuit::{CircuitIdentifier, RendNtorHandshakeInfo, ServiceCircPurpose, StreamCounter};
use crate::err::ServiceRendError;
use crate::intro_point::IntroPoint;

/// Length in bytes of the digest recorded in an intro point's replay log for
/// one `INTRODUCE2` cell (the encrypted portion of the cell, per §4.D).
pub const INTRODUCE2_DIGEST_LEN: usize = crate::replay::DIGEST_LEN;

/// One service's view of an `INTRODUCE2` it just received on an established
/// introduction circuit.
pub struct Introduce2Request {
    /// The rendezvous cookie the client supplied, extracted from the
    /// decrypted payload.
    pub cookie: RendCookie,
}

/// Accept or reject one `INTRODUCE2` cell against introduction point `ipt`,
/// per §4.D "Service rendezvous": increments `ipt.introduce2_count`, enforces
/// `introduce2_max`, and checks the replay cache on `digest` (the hash of the
/// cell's encrypted portion).
///
/// On success, returns `Ok(())` and the caller should proceed to launch a
/// rendezvous circuit and send `RENDEZVOUS1`. On [`ServiceRendError::Replay`]
/// the caller must silently drop the cell rather than close the circuit,
/// since a replay by itself isn't proof of a misbehaving relay.
pub fn accept_introduce2(
    ipt: &mut IntroPoint,
    digest: &[u8; INTRODUCE2_DIGEST_LEN],
    introduce2_max: u64,
) -> Result<(), ServiceRendError> {
    if !ipt.replay.check_and_record(digest) {
        debug!(ipt = %ipt.local_id, "dropping replayed INTRODUCE2");
        return Err(ServiceRendError::Replay);
    }
    if ipt.introduce2_count >= introduce2_max {
        warn!(
            ipt = %ipt.local_id,
            introduce2_max,
            "introduction point exceeded its INTRODUCE2 quota"
        );
        return Err(ServiceRendError::TooManyIntroductions);
    }
    ipt.introduce2_count += 1;
    debug!(ipt = %ipt.local_id, count = ipt.introduce2_count, "accepted INTRODUCE2");
    Ok(())
}

/// Tracks the lifecycle of the rendezvous circuit a service launches after
/// accepting one `INTRODUCE2`.
pub struct ServiceRendAttempt {
    /// The cookie named by the client, used to find the rendezvous point and
    /// to construct `RENDEZVOUS1`.
    cookie: RendCookie,
    /// Current purpose of the circuit this attempt owns.
    state: ServiceCircPurpose,
    /// This attempt's rendezvous circuit identifier (§3 "Circuit
    /// identifier"), carrying this service's identity and (once available)
    /// the rendezvous ntor handshake material.
    identifier: CircuitIdentifier,
}

impl ServiceRendAttempt {
    /// Begin a new attempt after accepting an `INTRODUCE2` naming `cookie`,
    /// on behalf of the service identified by `service_id`.
    pub fn new(cookie: RendCookie, service_id: OnionIdKey) -> Self {
        debug!(cookie = ?Sensitive::new(cookie), "launching rendezvous circuit");
        ServiceRendAttempt {
            cookie,
            state: ServiceCircPurpose::ConnectRend,
            identifier: CircuitIdentifier::RendezvousService {
                service_id,
                cookie,
                ntor: RendNtorHandshakeInfo { seed: Vec::new() },
                stream_ctr: StreamCounter::new(),
            },
        }
    }

    /// The rendezvous cookie this attempt is using.
    pub fn cookie(&self) -> RendCookie {
        self.cookie
    }

    /// Current purpose of the rendezvous circuit.
    pub fn state(&self) -> ServiceCircPurpose {
        self.state
    }

    /// This attempt's rendezvous circuit identifier.
    pub fn identifier(&self) -> &CircuitIdentifier {
        &self.identifier
    }

    /// Record the rendezvous ntor handshake seed once the caller's circuit
    /// layer has completed it (§3 step 6).
    pub fn set_rend_ntor_seed(&mut self, seed: Vec<u8>) {
        if let CircuitIdentifier::RendezvousService { ntor, .. } = &mut self.identifier {
            ntor.seed = seed;
        }
    }

    /// Record that the rendezvous circuit opened and `RENDEZVOUS1` was sent,
    /// completing this attempt.
    pub fn on_rendezvous1_sent(&mut self) {
        self.state = ServiceCircPurpose::RendJoined;
        debug!(cookie = ?Sensitive::new(self.cookie), "sent RENDEZVOUS1, rendezvous circuit joined");
    }

    /// True once this rendezvous circuit is ready to carry application
    /// streams.
    pub fn is_joined(&self) -> bool {
        self.state == ServiceCircPurpose::RendJoined
    }
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
    use crate::intro_point::IptLocalId;
    use rand::{rngs::StdRng, SeedableRng};
    use tor_llcrypto::pk::ed25519::Keypair;

    fn service_id(seed: u64) -> OnionIdKey {
        let mut rng = StdRng::seed_from_u64(seed);
        OnionIdKey::new(Keypair::generate(&mut rng).verifying_key())
    }

    fn fresh_ipt() -> IntroPoint {
        let mut rng = StdRng::seed_from_u64(9);
        let auth_keypair = Keypair::generate(&mut rng);
        let secret = tor_llcrypto::pk::curve25519::StaticSecret::random_from_rng(&mut rng);
        let public = tor_llcrypto::pk::curve25519::PublicKey::from(&secret);
        let enc_keypair = tor_llcrypto::pk::curve25519::StaticKeypair { secret, public };
        IntroPoint::new(IptLocalId(1), auth_keypair, enc_keypair, u64::MAX)
    }

    #[test]
    fn first_introduce2_is_accepted_and_counted() {
        let mut ipt = fresh_ipt();
        let digest = [1_u8; INTRODUCE2_DIGEST_LEN];
        accept_introduce2(&mut ipt, &digest, 100).unwrap();
        assert_eq!(ipt.introduce2_count, 1);
    }

    #[test]
    fn replayed_introduce2_is_rejected_without_incrementing() {
        let mut ipt = fresh_ipt();
        let digest = [2_u8; INTRODUCE2_DIGEST_LEN];
        accept_introduce2(&mut ipt, &digest, 100).unwrap();
        let err = accept_introduce2(&mut ipt, &digest, 100).unwrap_err();
        assert!(matches!(err, ServiceRendError::Replay));
        assert_eq!(ipt.introduce2_count, 1);
    }

    #[test]
    fn introduce2_max_is_enforced() {
        let mut ipt = fresh_ipt();
        accept_introduce2(&mut ipt, &[3_u8; INTRODUCE2_DIGEST_LEN], 1).unwrap();
        let err = accept_introduce2(&mut ipt, &[4_u8; INTRODUCE2_DIGEST_LEN], 1).unwrap_err();
        assert!(matches!(err, ServiceRendError::TooManyIntroductions));
    }

    #[test]
    fn rendezvous_attempt_reaches_joined() {
        let mut rng = StdRng::seed_from_u64(1);
        let cookie = crate::client::fresh_rend_cookie(&mut rng);
        let mut attempt = ServiceRendAttempt::new(cookie, service_id(77));
        assert_eq!(attempt.state(), ServiceCircPurpose::ConnectRend);
        attempt.set_rend_ntor_seed(vec![3; 32]);
        attempt.on_rendezvous1_sent();
        assert!(attempt.is_joined());
        match attempt.identifier() {
            CircuitIdentifier::RendezvousService { ntor, .. } => assert_eq!(ntor.seed, vec![3; 32]),
            other => panic!("unexpected identifier variant: {other:?}"),
        }
    }
}
