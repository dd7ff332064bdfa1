#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
//! Introduction and rendezvous circuit state machines for onion services.
//!
//! This crate tracks the circuit-purpose state machines, replay detection,
//! and cell-building/verification logic a service or client needs to run
//! the introduction and rendezvous protocol, per the v3 onion service
//! handshake. It deliberately does not open, extend, or tear down circuits,
//! perform the ntor handshake, fetch or parse descriptors, or choose
//! introduction points under an exclusion policy — a caller's own circuit
//! and directory layers own those, and drive the state machines here
//! forward as protocol events arrive.
#![cfg_attr(not(ci_arti_stable), allow(renamed_and_removed_lints))]
#![cfg_attr(not(ci_arti_nightly), allow(unknown_lints))]
#![deny(missing_docs)]
#![warn(noop_method_call)]
#![deny(unreachable_pub)]
#![warn(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::checked_conversions)]
#![deny(clippy::exhaustive_structs)]
#![deny(clippy::expl_impl_clone_on_copy)]
#![deny(clippy::fallible_impl_from)]
#![deny(clippy::implicit_clone)]
#![deny(clippy::large_stack_arrays)]
#![deny(clippy::missing_docs_in_private_items)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::option_option)]
#![deny(clippy::ref_option_ref)]
#![deny(clippy::unnecessary_wraps)]
#![deny(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]

pub mod circuit;
pub mod client;
pub mod err;
pub mod intro_point;
pub mod replay;
pub mod service_rend;
pub mod timeouts;

pub use circuit::{CircuitIdentifier, ClientCircPurpose, RendNtorHandshakeInfo, ServiceCircPurpose, StreamCounter};
pub use client::{ClientAttempt, ClientConnAttempts};
pub use err::{AttemptError, ClientConnError, IntroEstablishError, IntroPointVerifyError, ServiceRendError};
pub use intro_point::{CircuitOpenedDisposition, IntroPoint, IptLocalId, IptRegistry};
pub use replay::ReplayLog;
pub use service_rend::ServiceRendAttempt;
