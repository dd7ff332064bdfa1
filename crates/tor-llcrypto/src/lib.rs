#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
//! Low-level cryptographic wrappers used by the rest of this workspace.
//!
//! This crate collects all the primitive cryptographic operations that the
//! higher-level protocol code needs, so that crates that only care about the
//! protocol logic don't need to depend directly on `ed25519-dalek`,
//! `x25519-dalek`, `rsa`, `sha3`, and so on. It deliberately does not
//! implement any Tor-specific semantics of its own.
#![cfg_attr(not(ci_arti_stable), allow(renamed_and_removed_lints))]
#![cfg_attr(not(ci_arti_nightly), allow(unknown_lints))]
#![warn(missing_docs)]
#![warn(noop_method_call)]
#![warn(unreachable_pub)]
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
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::option_option)]
#![deny(clippy::ref_option_ref)]
#![deny(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]

pub mod cipher;
pub mod d;
pub mod pk;
pub mod rng;
pub mod traits;
pub mod util;
