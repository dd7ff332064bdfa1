//! In-memory replay detection for `INTRODUCE2` cells.
//!
//! Real onion services keep a persistent, file-backed log so that a restart
//! doesn't reopen a replay window; here we keep only the in-memory
//! probabilistic filter, since this crate has no on-disk state of its own.
//! A service embedding this crate that wants persistence across restarts
//! should snapshot/restore the encrypted-portion digests itself.

use growable_bloom_filter::GrowableBloom;

/// Length, in bytes, of the digest we store per introduction, taken from the
/// encrypted portion of the `INTRODUCE2` cell.
pub const DIGEST_LEN: usize = 32;

/// A probabilistic record of the encrypted portions of `INTRODUCE2` cells
/// we've already processed for one introduction point auth key.
///
/// False positives (treating a fresh cell as a replay) are possible, by
/// design, in exchange for bounded memory use; false negatives are not.
pub struct ReplayLog {
    /// The underlying probabilistic filter.
    seen: GrowableBloom,
}

impl ReplayLog {
    /// Create a fresh, empty replay log.
    pub fn new() -> Self {
        let desired_error_prob = 1.0 / 100_000.0;
        let est_insertions = 10_000;
        ReplayLog {
            seen: GrowableBloom::new(desired_error_prob, est_insertions),
        }
    }

    /// Record `digest`, returning `true` if it had not been seen before (and
    /// so this introduction should be processed), or `false` if it's a
    /// replay (and should be dropped).
    pub fn check_and_record(&mut self, digest: &[u8; DIGEST_LEN]) -> bool {
        self.seen.insert(&digest[..])
    }
}

impl Default for ReplayLog {
    fn default() -> Self {
        Self::new()
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

    #[test]
    fn first_use_is_accepted_second_is_replay() {
        let mut log = ReplayLog::new();
        let digest = [0x55_u8; DIGEST_LEN];
        assert!(log.check_and_record(&digest));
        assert!(!log.check_and_record(&digest));
    }

    #[test]
    fn distinct_digests_are_independent() {
        let mut log = ReplayLog::new();
        assert!(log.check_and_record(&[1_u8; DIGEST_LEN]));
        assert!(log.check_and_record(&[2_u8; DIGEST_LEN]));
        assert!(!log.check_and_record(&[1_u8; DIGEST_LEN]));
    }
}
