//! Errors produced by the introduction and rendezvous state machines.

use thiserror::Error;

use retry_error::RetryError;
use tor_error::{Bug, ErrorKind, HasKind};

/// An error encountered while a service is establishing or maintaining an
/// introduction point.
#[derive(Error, Clone, Debug)]
#[non_exhaustive]
pub enum IntroEstablishError {
    /// We could not sign or encode the `ESTABLISH_INTRO` cell.
    #[error("unable to construct ESTABLISH_INTRO cell")]
    CreateCell(#[source] tor_cell::Error),

    /// Sending the cell on the circuit failed.
    #[error("unable to send ESTABLISH_INTRO cell")]
    Send,

    /// The introduction point never acknowledged the cell.
    #[error("did not receive INTRO_ESTABLISHED")]
    NoAck,

    /// Internal error.
    #[error("{0}")]
    Bug(#[from] Bug),
}

impl HasKind for IntroEstablishError {
    fn kind(&self) -> ErrorKind {
        use IntroEstablishError as E;
        match self {
            E::CreateCell(_) => ErrorKind::OnionServiceProtocolViolation,
            E::Send | E::NoAck => ErrorKind::OnionServiceConnectionFailed,
            E::Bug(e) => e.kind(),
        }
    }
}

/// An error encountered by the introduction point when it validates an
/// incoming `ESTABLISH_INTRO` cell.
///
/// The caller should close the circuit with reason `TORPROTOCOL` whenever
/// this error is returned.
#[derive(Error, Clone, Debug)]
#[non_exhaustive]
pub enum IntroPointVerifyError {
    /// The circuit did not have the right purpose to receive this cell.
    #[error("circuit was not eligible to become an introduction circuit")]
    WrongCircuitState,

    /// The cell failed to parse.
    #[error("malformed ESTABLISH_INTRO cell")]
    Malformed,

    /// The signature or MAC on the cell did not validate.
    #[error("ESTABLISH_INTRO signature or MAC check failed")]
    BadAuth(#[source] tor_cell::relaycell::hs::est_intro::EstablishIntroSigError),
}

impl HasKind for IntroPointVerifyError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::OnionServiceProtocolViolation
    }
}

/// An error encountered while a client attempts to introduce itself to, and
/// rendezvous with, an onion service.
#[derive(Error, Clone, Debug)]
#[non_exhaustive]
pub enum ClientConnError {
    /// No usable introduction point remained after applying the exclusion
    /// policy.
    #[error("no usable introduction point")]
    NoUsableIntroPoints,

    /// The descriptor we had on hand is missing or stale; the caller should
    /// refetch it and retry. This is a transient condition.
    #[error("descriptor missing or stale, refetch needed")]
    DescriptorMissing,

    /// We received an `INTRODUCE_ACK` with a failure status.
    #[error("introduction point rejected INTRODUCE1: {0:?}")]
    IntroduceNacked(tor_cell::relaycell::hs::IntroduceAckStatus),

    /// We never heard back after sending `INTRODUCE1`.
    #[error("timed out waiting for INTRODUCE_ACK")]
    IntroduceTimeout,

    /// We never received `RENDEZVOUS2` after a successful introduction.
    #[error("timed out waiting for RENDEZVOUS2")]
    RendezvousTimeout,

    /// The ntor-style handshake embedded in `RENDEZVOUS2` did not validate.
    #[error("rendezvous handshake validation failed")]
    BadRendezvousHandshake,

    /// We tried every available introduction point without success.
    #[error("exhausted every introduction point")]
    AllAttemptsFailed(RetryError<AttemptError>),

    /// Internal error.
    #[error("{0}")]
    Bug(#[from] Bug),
}

impl HasKind for ClientConnError {
    fn kind(&self) -> ErrorKind {
        use ClientConnError as E;
        match self {
            E::NoUsableIntroPoints => ErrorKind::OnionServiceProtocolViolation,
            E::DescriptorMissing => ErrorKind::OnionServiceMissingClientAuth,
            E::IntroduceNacked(_) => ErrorKind::OnionServiceProtocolViolation,
            E::IntroduceTimeout | E::RendezvousTimeout => ErrorKind::TorNetworkTimeout,
            E::BadRendezvousHandshake => ErrorKind::OnionServiceProtocolViolation,
            E::AllAttemptsFailed(errs) => errs
                .sources()
                .next()
                .map(AttemptError::kind)
                .unwrap_or(ErrorKind::OnionServiceProtocolViolation),
            E::Bug(e) => e.kind(),
        }
    }
}

/// A failure using one particular introduction point / rendezvous point pair.
#[derive(Error, Clone, Debug)]
#[non_exhaustive]
pub enum AttemptError {
    /// The chosen introduction point could not be reached.
    #[error("unable to reach introduction point")]
    IntroUnreachable,

    /// The rendezvous point never acknowledged `ESTABLISH_RENDEZVOUS`.
    #[error("rendezvous point did not acknowledge ESTABLISH_RENDEZVOUS")]
    RendezvousNotEstablished,

    /// The introduction point rejected our `INTRODUCE1`.
    #[error("introduction rejected: {0:?}")]
    Nacked(tor_cell::relaycell::hs::IntroduceAckStatus),

    /// Timed out waiting on this attempt.
    #[error("timed out")]
    Timeout,
}

impl AttemptError {
    /// Classify this per-attempt failure for error reporting purposes.
    fn kind(&self) -> ErrorKind {
        match self {
            AttemptError::IntroUnreachable => ErrorKind::OnionServiceConnectionFailed,
            AttemptError::RendezvousNotEstablished => ErrorKind::OnionServiceConnectionFailed,
            AttemptError::Nacked(_) => ErrorKind::OnionServiceProtocolViolation,
            AttemptError::Timeout => ErrorKind::TorNetworkTimeout,
        }
    }
}

/// An error encountered by a service while handling an `INTRODUCE2` cell or
/// establishing the resulting rendezvous circuit.
#[derive(Error, Clone, Debug)]
#[non_exhaustive]
pub enum ServiceRendError {
    /// The cell was a byte-for-byte or cryptographic duplicate of one we've
    /// already processed. Per §4.D this must be dropped silently by the
    /// caller, but we still report it so the caller can count/log it.
    #[error("duplicate INTRODUCE2 (replay)")]
    Replay,

    /// We are already servicing `introduce2_max` requests for this
    /// introduction point's current key set.
    #[error("introduce2_max exceeded")]
    TooManyIntroductions,

    /// We could not build a circuit to the client's chosen rendezvous point.
    #[error("unable to build circuit to rendezvous point")]
    RendezvousCircuit,

    /// Internal error.
    #[error("{0}")]
    Bug(#[from] Bug),
}

impl HasKind for ServiceRendError {
    fn kind(&self) -> ErrorKind {
        use ServiceRendError as E;
        match self {
            E::Replay => ErrorKind::OnionServiceProtocolViolation,
            E::TooManyIntroductions => ErrorKind::OnionServiceProtocolViolation,
            E::RendezvousCircuit => ErrorKind::OnionServiceConnectionFailed,
            E::Bug(e) => e.kind(),
        }
    }
}
