#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
//! The directory-authority shared-random-value (SRV) commit-reveal
//! protocol.
//!
//! A small set of directory authorities cooperatively produce one fresh
//! 256-bit value per protocol run by each committing to a random number,
//! then revealing it once every authority has committed. This crate
//! implements that state machine: the text line codec used on votes and in
//! the persisted state file, the per-round bookkeeping, and the final SRV
//! computation (including the disaster fallback used when too few
//! authorities reveal).
//!
//! It does not implement the voting-round scheduler or the directory-vote
//! transport; callers drive [`state::SrState::tick`] at each round boundary
//! and feed it the commit lines extracted from peer votes.
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

pub mod commit;
pub mod err;
pub mod persist;
pub mod srv;
pub mod state;

pub use err::Error;
pub use srv::Srv;
pub use state::{Phase, SrState};

/// A `Result` type alias, for convenience.
pub type Result<T> = std::result::Result<T, Error>;
