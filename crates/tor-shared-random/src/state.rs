//! The SR state machine itself: phases, round bookkeeping, commit
//! ingestion, and end-of-run SRV computation (§3, §4.B).

use std::collections::BTreeMap;

use tracing::{debug, warn};

use tor_llcrypto::pk::ed25519::Ed25519Identity;
use tor_llcrypto::pk::rsa::RsaIdentity;

use crate::commit::Commit;
use crate::err::{Error, Result};
use crate::srv::{compute_srv, disaster_srv, Srv};

/// Number of voting rounds in each phase of a protocol run.
pub const N_ROUNDS: u64 = 12;

/// Number of phases in a protocol run (commit, then reveal).
pub const N_PHASES: u64 = 2;

/// Total voting rounds in one protocol run.
pub const N_ROUNDS_PER_RUN: u64 = N_ROUNDS * N_PHASES;

/// The current phase of a protocol run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Phase {
    /// Authorities generate and ingest commits; no reveals are accepted.
    Commit,
    /// Authorities accept reveal attachments; no new commits are generated.
    Reveal,
}

/// Return which round of the current run `valid_after` falls in, as an
/// index in `0..N_ROUNDS_PER_RUN`.
fn round_in_run(valid_after: u64, voting_interval: u64) -> u64 {
    (valid_after / voting_interval) % N_ROUNDS_PER_RUN
}

/// Compute the phase active at `valid_after`, per §4.B.
pub fn phase_at(valid_after: u64, voting_interval: u64) -> Phase {
    if round_in_run(valid_after, voting_interval) < N_ROUNDS {
        Phase::Commit
    } else {
        Phase::Reveal
    }
}

/// Compute `valid_until` for a state created at `valid_after`: the start of
/// the next protocol run.
pub fn valid_until_at(valid_after: u64, voting_interval: u64) -> u64 {
    let start_of_current_round = (valid_after / voting_interval) * voting_interval;
    let rounds_left = N_ROUNDS_PER_RUN - round_in_run(valid_after, voting_interval);
    start_of_current_round + rounds_left * voting_interval
}

/// The process-local SR state (§3 "SR state").
///
/// All mutation happens through [`SrState::tick`] and
/// [`SrState::ingest_commit`]; there is no generic setter path, so the only
/// way to corrupt the phase or round counters is a bug in this module.
#[derive(Clone, Debug)]
#[allow(clippy::exhaustive_structs)]
pub struct SrState {
    /// The protocol version this state was written with.
    pub version: u32,
    /// The current phase.
    pub phase: Phase,
    /// The consensus window this state serves.
    pub valid_after: u64,
    /// When this state expires (the start of the next protocol run).
    pub valid_until: u64,
    /// Commits received this run, keyed by the authority's RSA fingerprint.
    pub(crate) commits: BTreeMap<RsaIdentity, Commit>,
    /// The SRV from the previous completed run, if any.
    pub previous_srv: Option<Srv>,
    /// The SRV from the most recently completed run, if any.
    pub current_srv: Option<Srv>,
    /// Number of commit rounds observed so far this run.
    pub n_commit_rounds: u64,
    /// Number of reveal rounds observed so far this run.
    pub n_reveal_rounds: u64,
    /// Number of protocol runs completed since this state was created.
    pub n_protocol_runs: u64,
    /// Whether `current_srv` was freshly computed (as opposed to a
    /// disaster fallback).
    pub fresh: bool,
    /// Unrecognized keys read from disk, preserved verbatim for re-emission.
    pub extra: Vec<(String, String)>,
}

/// Protocol version written to (and expected in) the persisted state file.
pub const PROTOCOL_VERSION: u32 = 1;

impl SrState {
    /// Create a fresh state for a consensus window starting at
    /// `valid_after`, with no persisted history.
    pub fn new_fresh(valid_after: u64, voting_interval: u64) -> Self {
        SrState {
            version: PROTOCOL_VERSION,
            phase: phase_at(valid_after, voting_interval),
            valid_after,
            valid_until: valid_until_at(valid_after, voting_interval),
            commits: BTreeMap::new(),
            previous_srv: None,
            current_srv: None,
            n_commit_rounds: 0,
            n_reveal_rounds: 0,
            n_protocol_runs: 0,
            fresh: false,
            extra: Vec::new(),
        }
    }

    /// The commits accepted so far this run.
    pub fn commits(&self) -> impl Iterator<Item = (&RsaIdentity, &Commit)> {
        self.commits.iter()
    }

    /// Advance the state to a new voting round at `valid_after`, performing
    /// the per-round actions of §4.B.
    ///
    /// If `local` is given (our own RSA fingerprint and Ed25519 identity),
    /// and we are in the commit phase with no local commit yet this run, a
    /// fresh commit is generated and ingested.
    pub fn tick<R: rand::RngCore + rand::CryptoRng>(
        &mut self,
        valid_after: u64,
        voting_interval: u64,
        local: Option<(RsaIdentity, Ed25519Identity)>,
        rng: &mut R,
    ) -> Result<()> {
        let new_phase = phase_at(valid_after, voting_interval);
        let round = round_in_run(valid_after, voting_interval);
        let starting_new_run = valid_after >= self.valid_until;

        if starting_new_run {
            debug!(valid_after, "crossing protocol-run boundary");
            self.end_run();
            self.phase = phase_at(valid_after, voting_interval);
        } else {
            match (self.phase, new_phase) {
                (Phase::Reveal, Phase::Commit) => {
                    warn!(
                        valid_after,
                        "phase regressed from Reveal to Commit without crossing a run boundary"
                    );
                    return Err(Error::Internal(
                        "phase regressed from Reveal to Commit without crossing a run boundary"
                            .into(),
                    ));
                }
                (old, new) if old != new => {
                    debug!(valid_after, ?old, ?new, "SR phase transition");
                    self.phase = new;
                }
                (_, new) => self.phase = new,
            }
        }

        self.valid_after = valid_after;
        self.valid_until = valid_until_at(valid_after, voting_interval);
        match self.phase {
            Phase::Commit => self.n_commit_rounds = round + 1,
            Phase::Reveal => self.n_reveal_rounds = round + 1 - N_ROUNDS,
        }

        if self.phase == Phase::Commit {
            if let Some((rsa_fpr, ed25519_id)) = local {
                if !self.commits.contains_key(&rsa_fpr) {
                    let commit = Commit::generate_own(rng, rsa_fpr, ed25519_id, valid_after);
                    self.commits.insert(rsa_fpr, commit);
                }
            }
        }

        Ok(())
    }

    /// Ingest a single commit line parsed from a peer's vote, applying the
    /// validation and conflict rules of §4.B.
    pub fn ingest_commit(&mut self, commit: Commit) -> Result<()> {
        if commit.reveal.is_some() && self.phase == Phase::Commit {
            warn!(
                authority = %commit.rsa_fpr,
                "rejecting commit: reveal attached during commit phase"
            );
            return Err(Error::Protocol(
                "reveal attached to a commit during the commit phase".into(),
            ));
        }
        if let Some(reveal) = &commit.reveal {
            if !commit.verify_commit_and_reveal() {
                warn!(authority = %commit.rsa_fpr, "rejecting commit: reveal does not match");
                return Err(Error::Protocol(format!(
                    "reveal for {} does not match its commit (ts {} vs {})",
                    commit.rsa_fpr, reveal.reveal_ts, commit.commit_ts
                )));
            }
        }

        match self.commits.get_mut(&commit.rsa_fpr) {
            None => {
                self.commits.insert(commit.rsa_fpr, commit);
            }
            Some(existing) => {
                if existing.commit_b64 != commit.commit_b64 {
                    warn!(
                        authority = %commit.rsa_fpr,
                        "rejecting commit: conflicts with one already on record this run"
                    );
                    return Err(Error::Protocol(format!(
                        "authority {} sent two different commits this run",
                        commit.rsa_fpr
                    )));
                }
                // Idempotent resend of the same commit; a later message may
                // additionally carry the reveal half, or fill in the
                // Ed25519 identity that a disk-loaded commit lacked.
                if existing.reveal.is_none() {
                    existing.reveal = commit.reveal;
                }
                if existing.ed25519_id.is_none() {
                    existing.ed25519_id = commit.ed25519_id;
                }
            }
        }
        Ok(())
    }

    /// Compute the new SRV from the current commit set, rotate
    /// `current_srv` into `previous_srv`, and wipe the commit map and round
    /// counters. Called automatically by [`SrState::tick`] when crossing a
    /// run boundary.
    fn end_run(&mut self) {
        let commits: Vec<Commit> = self.commits.values().cloned().collect();
        let previous_value = self.current_srv.map(|s| s.value);
        let new_srv = match compute_srv(&commits, previous_value.as_ref()) {
            Some(srv) => {
                debug!(num_reveals = srv.num_reveals, "computed fresh SRV for new run");
                self.fresh = true;
                srv
            }
            None => {
                warn!(
                    n_commits = commits.len(),
                    "too few valid reveals this run; falling back to disaster SRV"
                );
                self.fresh = false;
                match previous_value {
                    Some(prev) => disaster_srv(&prev),
                    None => disaster_srv(&[0_u8; 32]),
                }
            }
        };

        self.previous_srv = self.current_srv;
        self.current_srv = Some(new_srv);
        self.commits.clear();
        self.n_commit_rounds = 0;
        self.n_reveal_rounds = 0;
        self.n_protocol_runs += 1;
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

    const V: u64 = 3600;

    #[test]
    fn phase_boundaries() {
        assert_eq!(phase_at(0, V), Phase::Commit);
        assert_eq!(phase_at(11 * V, V), Phase::Commit);
        assert_eq!(phase_at(12 * V, V), Phase::Reveal);
        assert_eq!(phase_at(23 * V, V), Phase::Reveal);
        assert_eq!(phase_at(24 * V, V), Phase::Commit);
    }

    #[test]
    fn valid_until_is_next_run_start() {
        assert_eq!(valid_until_at(0, V), 24 * V);
        assert_eq!(valid_until_at(5 * V, V), 24 * V);
        assert_eq!(valid_until_at(23 * V, V), 24 * V);
        assert_eq!(valid_until_at(24 * V, V), 48 * V);
    }

    #[test]
    fn three_authorities_reach_deterministic_srv() {
        let mut rng = StdRng::seed_from_u64(0xf00d);
        let authorities: Vec<(RsaIdentity, Ed25519Identity)> = (0..3)
            .map(|i| {
                (
                    RsaIdentity::from_bytes(&[i as u8 + 1; 20]).unwrap(),
                    Ed25519Identity::new([i as u8 + 1; 32]),
                )
            })
            .collect();

        let peer_commits: Vec<Commit> = authorities[1..]
            .iter()
            .map(|(rsa, ed)| Commit::generate_own(&mut rng, *rsa, *ed, 0))
            .collect();

        let mut state = SrState::new_fresh(0, V);
        // Commit phase: each authority generates its own commit, and the
        // other two arrive as commit-only vote lines (no reveal token yet).
        state.tick(0, V, Some(authorities[0]), &mut rng).unwrap();
        for c in &peer_commits {
            let mut commit_only = c.clone();
            commit_only.reveal = None;
            state.ingest_commit(commit_only).unwrap();
        }
        assert_eq!(state.phase, Phase::Commit);

        // Advance into the reveal phase; the peers' votes now carry their
        // reveal tokens too, merging into the commits already on record.
        state.tick(12 * V, V, None, &mut rng).unwrap();
        assert_eq!(state.phase, Phase::Reveal);
        for c in &peer_commits {
            state.ingest_commit(c.clone()).unwrap();
        }

        // Cross the run boundary.
        state.tick(24 * V, V, None, &mut rng).unwrap();
        assert_eq!(state.n_protocol_runs, 1);
        assert!(state.fresh);
        let srv = state.current_srv.unwrap();
        assert_eq!(srv.num_reveals, 3);
    }

    #[test]
    fn disaster_when_too_few_reveal() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = SrState::new_fresh(0, V);
        state.current_srv = Some(Srv {
            num_reveals: 3,
            value: [0x11_u8; 32],
        });
        state.tick(24 * V, V, None, &mut rng).unwrap();
        assert!(!state.fresh);
        let srv = state.current_srv.unwrap();
        assert_eq!(srv, disaster_srv(&[0x11_u8; 32]));
    }

    #[test]
    fn conflicting_commit_is_rejected() {
        let mut rng = StdRng::seed_from_u64(2);
        let rsa = RsaIdentity::from_bytes(&[9_u8; 20]).unwrap();
        let ed = Ed25519Identity::new([9_u8; 32]);
        let mut state = SrState::new_fresh(0, V);
        let c1 = Commit::generate_own(&mut rng, rsa, ed, 0);
        state.ingest_commit(c1).unwrap();
        let c2 = Commit::generate_own(&mut rng, rsa, ed, 0);
        assert!(state.ingest_commit(c2).is_err());
    }

    #[test]
    fn duplicate_identical_commit_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(3);
        let rsa = RsaIdentity::from_bytes(&[8_u8; 20]).unwrap();
        let ed = Ed25519Identity::new([8_u8; 32]);
        let mut state = SrState::new_fresh(0, V);
        let c = Commit::generate_own(&mut rng, rsa, ed, 0);
        state.ingest_commit(c.clone()).unwrap();
        state.ingest_commit(c).unwrap();
        assert_eq!(state.commits().count(), 1);
    }
}
