//! Client-side introduction and rendezvous flow, per §4.D "Client
//! introduction".
//!
//! This module tracks the state of one attempt to reach a service through a
//! single (intro point, rendezvous point) pair. It does not choose intro
//! points, build circuits, or perform the ntor handshake itself — callers
//! supply those as already-available ingredients and drive this state
//! machine forward as circuit/cell events arrive.

use rand::RngCore;
use safelog::Sensitive;
use tracing::{debug, warn};

use tor_bytes::{EncodeResult, Writer as _};
use tor_cell::relaycell::hs::intro_payload::{IntroduceHandshakePayload, LinkSpecifier, OnionKey};
use tor_cell::relaycell::hs::IntroduceAckStatus;
use tor_hscrypto::ops::hs_mac;
use tor_hscrypto::pk::OnionIdKey;
use tor_hscrypto::{RendCookie, Subcredential};

use crate::circuit::{CircuitIdentifier, ClientCircPurpose, RendNtorHandshakeInfo, StreamCounter};
use crate::err::{AttemptError, ClientConnError};
use crate::timeouts::MAX_REND_TIMEOUT;

/// Length in bytes of a rendezvous cookie (§4.D step 4).
pub const REND_COOKIE_LEN: usize = 20;

/// Generate a fresh, uniformly random rendezvous cookie.
pub fn fresh_rend_cookie<R: RngCore>(rng: &mut R) -> RendCookie {
    let mut bytes = [0_u8; REND_COOKIE_LEN];
    rng.fill_bytes(&mut bytes);
    RendCookie::from(bytes)
}

/// One attempt to introduce to, and rendezvous with, a service using a
/// particular (intro point, rendezvous point) pair.
#[derive(educe::Educe)]
#[educe(Debug)]
pub struct ClientAttempt {
    /// Current state of the intro half of the attempt.
    intro_state: ClientCircPurpose,
    /// Current state of the rendezvous half of the attempt.
    rend_state: ClientCircPurpose,
    /// The cookie this attempt's rendezvous circuit was established with.
    #[educe(Debug(ignore))]
    cookie: RendCookie,
    /// True once `ESTABLISH_RENDEZVOUS` has been acknowledged.
    rend_established: bool,
    /// `timestamp_dirty`: set when `INTRODUCE1` is sent, used by the caller
    /// to enforce [`MAX_REND_TIMEOUT`].
    introduced_at: Option<std::time::Instant>,
    /// This attempt's rendezvous circuit identifier (§3 "Circuit
    /// identifier"), carrying the service identity and (once available) the
    /// rendezvous ntor handshake material forward to whatever circuit
    /// ultimately reaches `C_REND_JOINED`.
    identifier: CircuitIdentifier,
}

impl ClientAttempt {
    /// Start a new attempt with a freshly generated rendezvous cookie, to
    /// reach the service identified by `service_id`.
    pub fn new<R: RngCore>(rng: &mut R, service_id: OnionIdKey) -> Self {
        let cookie = fresh_rend_cookie(rng);
        ClientAttempt {
            intro_state: ClientCircPurpose::Introducing,
            rend_state: ClientCircPurpose::EstablishRend,
            cookie,
            rend_established: false,
            introduced_at: None,
            identifier: CircuitIdentifier::RendezvousClient {
                service_id,
                cookie,
                ntor: RendNtorHandshakeInfo { seed: Vec::new() },
                stream_ctr: StreamCounter::new(),
            },
        }
    }

    /// The rendezvous cookie chosen for this attempt.
    pub fn cookie(&self) -> RendCookie {
        self.cookie
    }

    /// This attempt's rendezvous circuit identifier.
    pub fn identifier(&self) -> &CircuitIdentifier {
        &self.identifier
    }

    /// Record the rendezvous ntor handshake seed once the caller's circuit
    /// layer has completed it, carrying it forward into this attempt's
    /// rendezvous circuit identifier (§3 step 6: the descriptor's keys are
    /// "copied into the rend circuit's identifier").
    pub fn set_rend_ntor_seed(&mut self, seed: Vec<u8>) {
        if let CircuitIdentifier::RendezvousClient { ntor, .. } = &mut self.identifier {
            ntor.seed = seed;
        }
    }

    /// Current purpose of the intro-side circuit.
    pub fn intro_state(&self) -> ClientCircPurpose {
        self.intro_state
    }

    /// Current purpose of the rendezvous-side circuit.
    pub fn rend_state(&self) -> ClientCircPurpose {
        self.rend_state
    }

    /// Record that the rendezvous point acknowledged `ESTABLISH_RENDEZVOUS`
    /// (§4.D step 4).
    pub fn on_rendezvous_established(&mut self) {
        self.rend_established = true;
        if self.rend_state == ClientCircPurpose::EstablishRend {
            self.rend_state = ClientCircPurpose::RendReady;
            debug!(
                cookie = ?Sensitive::new(self.cookie),
                "rendezvous point acknowledged ESTABLISH_RENDEZVOUS"
            );
        }
    }

    /// Build the plaintext `INTRODUCE1` payload for this attempt, per §4.D
    /// steps 5-6: the ntor-handshake onion key half, this attempt's
    /// rendezvous cookie, and the rendezvous point's link specifiers,
    /// authenticated with a MAC keyed on `subcredential` so the
    /// introduction point's relay of `INTRODUCE2` is bound to this
    /// service's current descriptor epoch.
    ///
    /// Returns the encoded payload; the caller's circuit layer is
    /// responsible for the surrounding hs-ntor encryption and for actually
    /// sending the cell.
    pub fn build_introduce1(
        &self,
        onion_key: OnionKey,
        link_specifiers: Vec<LinkSpecifier>,
        subcredential: &Subcredential,
    ) -> EncodeResult<Vec<u8>> {
        let payload = IntroduceHandshakePayload::new(self.cookie, onion_key, link_specifiers);
        let mut encoded = Vec::new();
        encoded.write(&payload)?;
        let mac = hs_mac(&subcredential.as_ref()[..], &encoded);
        encoded.extend_from_slice(&mac.as_ref()[..]);
        debug!(
            cookie = ?Sensitive::new(self.cookie),
            len = encoded.len(),
            "built INTRODUCE1 payload"
        );
        Ok(encoded)
    }

    /// Record that `INTRODUCE1` has been sent (§4.D step 6): transition the
    /// intro circuit to `C_INTRODUCE_ACK_WAIT` and note the time, so the
    /// caller can later check [`Self::introduce_ack_timed_out`].
    pub fn on_introduce_sent(&mut self, now: std::time::Instant) {
        self.intro_state = ClientCircPurpose::IntroduceAckWait;
        self.introduced_at = Some(now);
        debug!(cookie = ?Sensitive::new(self.cookie), "sent INTRODUCE1, awaiting ack");
    }

    /// True if we've been waiting in `C_INTRODUCE_ACK_WAIT` longer than
    /// [`MAX_REND_TIMEOUT`], as of `now`.
    pub fn introduce_ack_timed_out(&self, now: std::time::Instant) -> bool {
        matches!(self.introduced_at, Some(t) if now.duration_since(t) > MAX_REND_TIMEOUT)
    }

    /// Process an `INTRODUCE_ACK`, per §4.D step 7.
    ///
    /// On success, the rendezvous circuit becomes ready to complete (or, if
    /// the rendezvous point was already acknowledged, immediately ready to
    /// finish the ntor handshake) and the intro circuit should be closed by
    /// the caller. On failure, the intro circuit reverts to `C_INTRODUCING`
    /// so the caller may retry with a fresh `INTRODUCE1` attempt, and an
    /// error describing the NAK is returned.
    pub fn on_introduce_ack(&mut self, status: IntroduceAckStatus) -> Result<(), AttemptError> {
        if status == IntroduceAckStatus::SUCCESS {
            self.rend_state = self
                .rend_state
                .on_introduce_ack_success(self.rend_established);
            self.intro_state = ClientCircPurpose::IntroduceAcked;
            debug!(cookie = ?Sensitive::new(self.cookie), "introduction acknowledged");
            Ok(())
        } else {
            self.intro_state = ClientCircPurpose::Introducing;
            warn!(?status, "introduction point rejected INTRODUCE1");
            Err(AttemptError::Nacked(status))
        }
    }

    /// Process a successful `RENDEZVOUS2` (§4.D step 8): complete the ntor
    /// handshake (performed by the caller) and finalize this circuit's
    /// purpose.
    pub fn on_rendezvous_joined(&mut self) {
        self.rend_state = ClientCircPurpose::RendJoined;
        debug!(cookie = ?Sensitive::new(self.cookie), "rendezvous circuit joined");
    }

    /// True once the rendezvous circuit is ready to carry application
    /// streams.
    pub fn is_joined(&self) -> bool {
        self.rend_state == ClientCircPurpose::RendJoined
    }
}

/// A client's attempts across multiple introduction points, tracking the
/// exhausted set so a caller can surface [`ClientConnError::AllAttemptsFailed`]
/// once every usable introduction point has been tried (§4.D "Failure
/// semantics", permanent case).
#[derive(Default)]
pub struct ClientConnAttempts {
    /// Errors encountered so far, one per introduction point tried.
    failures: Vec<AttemptError>,
}

impl ClientConnAttempts {
    /// Start tracking a fresh connection attempt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an attempt against one introduction point failed.
    pub fn record_failure(&mut self, err: AttemptError) {
        warn!(error = %err, attempt = self.failures.len() + 1, "introduction attempt failed");
        self.failures.push(err);
    }

    /// Build the final error once every introduction point has been tried
    /// without success.
    pub fn into_exhausted_error(self) -> ClientConnError {
        warn!(attempts = self.failures.len(), "exhausted every introduction point");
        let mut retry = retry_error::RetryError::in_attempt_to("introduce to onion service");
        for f in self.failures {
            retry.push(f);
        }
        ClientConnError::AllAttemptsFailed(retry)
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
    use rand::{rngs::StdRng, SeedableRng};
    use tor_llcrypto::pk::ed25519::Keypair;

    fn service_id(seed: u64) -> OnionIdKey {
        let mut rng = StdRng::seed_from_u64(seed);
        OnionIdKey::new(Keypair::generate(&mut rng).verifying_key())
    }

    #[test]
    fn happy_path_reaches_joined() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut attempt = ClientAttempt::new(&mut rng, service_id(101));
        assert_eq!(attempt.intro_state(), ClientCircPurpose::Introducing);

        attempt.on_rendezvous_established();
        assert_eq!(attempt.rend_state(), ClientCircPurpose::RendReady);

        attempt.on_introduce_sent(std::time::Instant::now());
        assert_eq!(attempt.intro_state(), ClientCircPurpose::IntroduceAckWait);

        attempt
            .on_introduce_ack(IntroduceAckStatus::SUCCESS)
            .unwrap();
        assert_eq!(attempt.rend_state(), ClientCircPurpose::RendReadyIntroAcked);

        attempt.set_rend_ntor_seed(vec![9; 32]);
        attempt.on_rendezvous_joined();
        assert!(attempt.is_joined());
        match attempt.identifier() {
            CircuitIdentifier::RendezvousClient { ntor, .. } => assert_eq!(ntor.seed, vec![9; 32]),
            other => panic!("unexpected identifier variant: {other:?}"),
        }
    }

    #[test]
    fn nack_reverts_to_introducing() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut attempt = ClientAttempt::new(&mut rng, service_id(102));
        attempt.on_introduce_sent(std::time::Instant::now());
        let err = attempt
            .on_introduce_ack(IntroduceAckStatus::NOT_RECOGNIZED)
            .unwrap_err();
        assert!(matches!(err, AttemptError::Nacked(_)));
        assert_eq!(attempt.intro_state(), ClientCircPurpose::Introducing);
    }

    #[test]
    fn ack_before_rend_ready_waits_for_rendezvous() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut attempt = ClientAttempt::new(&mut rng, service_id(103));
        attempt.on_introduce_sent(std::time::Instant::now());
        attempt
            .on_introduce_ack(IntroduceAckStatus::SUCCESS)
            .unwrap();
        // Rendezvous point hasn't acked yet: purpose should just record the ack.
        assert_eq!(attempt.rend_state(), ClientCircPurpose::IntroduceAcked);
    }

    #[test]
    fn build_introduce1_embeds_cookie_and_authenticates_with_subcredential() {
        let mut rng = StdRng::seed_from_u64(4);
        let attempt = ClientAttempt::new(&mut rng, service_id(104));
        let onion_key = OnionKey::NtorOnionKey([7_u8; 32].into());
        let link_specifiers = vec![LinkSpecifier::new(0, vec![1, 2, 3, 4])];
        let subcred = Subcredential::from([0x55_u8; 32]);

        let encoded = attempt
            .build_introduce1(onion_key, link_specifiers, &subcred)
            .unwrap();

        let mut reader = tor_bytes::Reader::from_slice(&encoded);
        let _payload: IntroduceHandshakePayload = reader.extract().unwrap();
        // The MAC tag follows the encoded payload and authenticates it under
        // the subcredential; a different subcredential must not validate.
        let other_subcred = Subcredential::from([0xaa_u8; 32]);
        let other = attempt
            .build_introduce1(
                OnionKey::NtorOnionKey([7_u8; 32].into()),
                vec![LinkSpecifier::new(0, vec![1, 2, 3, 4])],
                &other_subcred,
            )
            .unwrap();
        assert_ne!(encoded, other);
    }

    #[test]
    fn exhausted_attempts_produce_retry_error() {
        let mut attempts = ClientConnAttempts::new();
        attempts.record_failure(AttemptError::IntroUnreachable);
        attempts.record_failure(AttemptError::Timeout);
        let err = attempts.into_exhausted_error();
        assert!(matches!(err, ClientConnError::AllAttemptsFailed(_)));
    }
}
