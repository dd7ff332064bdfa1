//! Timeout and retry-rate constants from §5 "Cancellation & timeouts".

use std::time::Duration;

/// How long an intro circuit may sit in `C_INTRODUCE_ACK_WAIT` before the
/// attempt is abandoned.
pub const MAX_REND_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of consecutive rendezvous failures before an AP stream is failed
/// outright, rather than retried with another introduction point.
pub const MAX_REND_FAILURES: u32 = 1;

/// Maximum number of intro-circuit launch attempts a service will make to a
/// single introduction point within one [`INTRO_CIRC_RETRY_PERIOD`].
pub const MAX_INTRO_CIRCS_PER_PERIOD: u32 = 10;

/// The window over which [`MAX_INTRO_CIRCS_PER_PERIOD`] is enforced.
pub const INTRO_CIRC_RETRY_PERIOD: Duration = Duration::from_secs(300);
