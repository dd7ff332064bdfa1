#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
//! Encoding and decoding for the onion service relay cells used by the
//! introduction and rendezvous protocols.
//!
//! This crate only speaks the cell bodies relevant to onion services:
//! `ESTABLISH_INTRO`, `INTRO_ESTABLISHED`, `INTRODUCE1`/`INTRODUCE2`,
//! `RENDEZVOUS1`/`RENDEZVOUS2`, `ESTABLISH_RENDEZVOUS`,
//! `RENDEZVOUS_ESTABLISHED`, and `INTRODUCE_ACK`. It does not implement the
//! general-purpose relay cell multiplexer (stream IDs, cell formats,
//! fragmentation) used for ordinary circuit traffic; that lives elsewhere.
#![cfg_attr(not(ci_arti_stable), allow(renamed_and_removed_lints))]
#![cfg_attr(not(ci_arti_nightly), allow(unknown_lints))]
#![deny(missing_docs)]
#![warn(noop_method_call)]
#![deny(unreachable_pub)]
#![warn(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::checked_conversions)]
#![deny(clippy::exhaustive_enums)]
#![deny(clippy::exhaustive_structs)]
#![deny(clippy::expl_impl_clone_on_copy)]
#![deny(clippy::fallible_impl_from)]
#![deny(clippy::implicit_clone)]
#![deny(clippy::large_stack_arrays)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::option_option)]
#![deny(clippy::ref_option_ref)]
#![deny(clippy::unnecessary_wraps)]
#![deny(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]

pub mod err;
pub mod relaycell;

pub use err::Error;

/// A Result type alias, for convenience.
pub type Result<T> = std::result::Result<T, Error>;
