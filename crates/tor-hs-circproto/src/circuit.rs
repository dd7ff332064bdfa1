//! Circuit purpose state machines for the introduction and rendezvous
//! protocols.
//!
//! This module only tracks *which state a circuit is logically in*; it does
//! not open, extend, or tear down circuits itself. Callers own an actual
//! circuit (however they represent one) and drive it through these purposes
//! as protocol events occur.

use tor_hscrypto::pk::{IntroPtAuthKey, OnionIdKey};
use tor_hscrypto::RendCookie;

/// Ephemeral ntor-handshake material carried by a rendezvous circuit's
/// identifier: the seed used to derive that circuit's relay crypto state,
/// and the peer's contribution to the handshake transcript.
#[derive(educe::Educe, Clone)]
#[educe(Debug)]
pub struct RendNtorHandshakeInfo {
    /// The shared seed this circuit's crypto layer was keyed from.
    #[educe(Debug(ignore))]
    pub seed: Vec<u8>,
}

/// A monotonic per-circuit stream identifier counter (§3 "Circuit
/// identifier": "a stream counter").
#[derive(Copy, Clone, Debug, Eq, PartialEq, derive_more::Display)]
pub struct StreamCounter(u16);

impl StreamCounter {
    /// A fresh counter with no streams opened yet.
    pub fn new() -> Self {
        StreamCounter(0)
    }

    /// Allocate and return the next stream id on this circuit.
    ///
    /// Only the circuit that owns this counter should call this: per §3
    /// this tag is "exclusively owned by the circuit; cloned for related
    /// bookkeeping never aliased mutably".
    pub fn next(&mut self) -> u16 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }
}

impl Default for StreamCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// The polymorphic tag attached to each origin circuit involved in
/// introduction or rendezvous, per §3 "Circuit identifier".
///
/// Every variant carries the service's identity public key. Intro variants
/// additionally carry the intro point's authentication key; rendezvous
/// variants carry the rendezvous cookie and the rendezvous ntor handshake
/// material. Every variant carries its own stream counter.
///
/// This type is meant to be exclusively owned by the circuit it identifies;
/// it may be cloned for bookkeeping (logging, indexing by service) but a
/// clone should never be mutated in place of the original.
#[derive(educe::Educe, Clone)]
#[educe(Debug)]
#[non_exhaustive]
pub enum CircuitIdentifier {
    /// A client's circuit to an introduction point.
    IntroClient {
        /// The service being introduced to.
        service_id: OnionIdKey,
        /// The intro point's auth key, taken from the service descriptor.
        auth_key: IntroPtAuthKey,
        /// This circuit's stream counter.
        stream_ctr: StreamCounter,
    },
    /// A service's circuit to one of its introduction points.
    IntroService {
        /// This service's identity.
        service_id: OnionIdKey,
        /// The auth key this service is presenting at this intro point.
        auth_key: IntroPtAuthKey,
        /// This circuit's stream counter.
        stream_ctr: StreamCounter,
    },
    /// A client's circuit to a rendezvous point.
    RendezvousClient {
        /// The service this rendezvous circuit is meeting.
        service_id: OnionIdKey,
        /// The cookie this circuit was established with.
        #[educe(Debug(ignore))]
        cookie: RendCookie,
        /// The ntor handshake material for this circuit.
        ntor: RendNtorHandshakeInfo,
        /// This circuit's stream counter.
        stream_ctr: StreamCounter,
    },
    /// A service's circuit to a client's chosen rendezvous point.
    RendezvousService {
        /// This service's identity.
        service_id: OnionIdKey,
        /// The cookie the client named in its `INTRODUCE2`.
        #[educe(Debug(ignore))]
        cookie: RendCookie,
        /// The ntor handshake material for this circuit.
        ntor: RendNtorHandshakeInfo,
        /// This circuit's stream counter.
        stream_ctr: StreamCounter,
    },
}

impl CircuitIdentifier {
    /// The service identity public key carried by every variant.
    pub fn service_id(&self) -> &OnionIdKey {
        match self {
            CircuitIdentifier::IntroClient { service_id, .. }
            | CircuitIdentifier::IntroService { service_id, .. }
            | CircuitIdentifier::RendezvousClient { service_id, .. }
            | CircuitIdentifier::RendezvousService { service_id, .. } => service_id,
        }
    }

    /// Allocate the next stream id on this circuit.
    pub fn next_stream_id(&mut self) -> u16 {
        match self {
            CircuitIdentifier::IntroClient { stream_ctr, .. }
            | CircuitIdentifier::IntroService { stream_ctr, .. }
            | CircuitIdentifier::RendezvousClient { stream_ctr, .. }
            | CircuitIdentifier::RendezvousService { stream_ctr, .. } => stream_ctr.next(),
        }
    }
}

/// The purpose of a circuit a service has built, from the service's point of
/// view.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ServiceCircPurpose {
    /// We're in the process of sending `ESTABLISH_INTRO` on this circuit.
    EstablishIntro,
    /// The introduction point has acknowledged us; we're listening for
    /// `INTRODUCE2` cells.
    Intro,
    /// We're extending this circuit to a client's chosen rendezvous point.
    ConnectRend,
    /// The rendezvous handshake with a client has completed.
    RendJoined,
}

/// The purpose of a circuit a client has built, from the client's point of
/// view.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ClientCircPurpose {
    /// We're sending `INTRODUCE1` on this intro circuit.
    Introducing,
    /// `INTRODUCE1` has been sent; we're waiting for `INTRODUCE_ACK`.
    IntroduceAckWait,
    /// `INTRODUCE_ACK` reported success.
    IntroduceAcked,
    /// We're extending this rendezvous circuit and about to send
    /// `ESTABLISH_RENDEZVOUS`.
    EstablishRend,
    /// The rendezvous point acknowledged `ESTABLISH_RENDEZVOUS`.
    RendReady,
    /// The rendezvous point is ready, and our `INTRODUCE_ACK` also arrived
    /// successfully, but `RENDEZVOUS2` has not yet arrived.
    RendReadyIntroAcked,
    /// `RENDEZVOUS2` arrived and the ntor handshake completed; this circuit
    /// can now carry application streams.
    RendJoined,
}

impl ClientCircPurpose {
    /// Return the next state after a successful `INTRODUCE_ACK`, given
    /// whether the rendezvous point has already become ready.
    pub fn on_introduce_ack_success(self, rend_already_ready: bool) -> Self {
        if rend_already_ready {
            ClientCircPurpose::RendReadyIntroAcked
        } else {
            ClientCircPurpose::IntroduceAcked
        }
    }
}
