//! Computation of the shared random value itself (§4.B "SRV computation").

use hmac::{Hmac, Mac};
use tor_llcrypto::d::{Sha256, Sha3_256};

use digest::Digest;

use crate::commit::Commit;

/// Version byte embedded in the SRV computation's message `M`.
pub const PROTO_VERSION: u8 = 1;

/// Minimum number of valid reveals required for a non-disaster SRV.
pub const PROTOCOL_FLOOR: usize = 3;

/// The message prefix used when computing a disaster SRV.
const DISASTER_MSG: &[u8] = b"shared-random-disaster";

/// The message prefix used when computing a normal SRV.
const NORMAL_MSG_PREFIX: &[u8] = b"shared-random";

/// A shared random value, together with the number of reveals that went
/// into computing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_structs)]
pub struct Srv {
    /// How many authorities' reveals contributed (0 for a disaster SRV
    /// computed from the protocol floor not being met).
    pub num_reveals: u64,
    /// The 32-byte value itself.
    pub value: [u8; 32],
}

/// Compute the disaster SRV: `HMAC-SHA256(key=previous_srv.value,
/// msg="shared-random-disaster")`.
pub fn disaster_srv(previous_srv_value: &[u8; 32]) -> Srv {
    let mut mac = Hmac::<Sha256>::new_from_slice(previous_srv_value)
        .expect("HMAC accepts keys of any length");
    mac.update(DISASTER_MSG);
    let value: [u8; 32] = mac.finalize().into_bytes().into();
    Srv {
        num_reveals: 0,
        value,
    }
}

/// Compute the normal-branch SRV from the set of commits that have both a
/// valid commit blob and a valid matching reveal, per §4.B steps 1-5.
///
/// `commits` need not be pre-sorted or pre-filtered; this function filters
/// to commits with a known Ed25519 identity and a verified reveal, then
/// sorts by that identity's base64 form ascending. Returns `None` if fewer
/// than [`PROTOCOL_FLOOR`] commits qualify, in which case the caller should
/// fall back to [`disaster_srv`].
pub fn compute_srv(commits: &[Commit], previous_srv_value: Option<&[u8; 32]>) -> Option<Srv> {
    let mut qualifying: Vec<&Commit> = commits
        .iter()
        .filter(|c| c.ed25519_id.is_some() && c.verify_commit_and_reveal())
        .collect();
    if qualifying.len() < PROTOCOL_FLOOR {
        return None;
    }
    qualifying.sort_by_key(|c| c.ed25519_id.expect("filtered above").to_string());

    let mut r = Vec::new();
    for c in &qualifying {
        let ed25519_id = c.ed25519_id.expect("filtered above");
        r.extend_from_slice(ed25519_id.to_string().as_bytes());
        let reveal = c.reveal.as_ref().expect("filtered above");
        r.extend_from_slice(reveal.reveal_b64.as_bytes());
    }
    let hashed_reveals: [u8; 32] = Sha3_256::digest(&r).into();

    let mut m = Vec::with_capacity(NORMAL_MSG_PREFIX.len() + 2 + 64);
    m.extend_from_slice(NORMAL_MSG_PREFIX);
    m.push(u8::try_from(qualifying.len()).unwrap_or(u8::MAX));
    m.push(PROTO_VERSION);
    match previous_srv_value {
        Some(prev) => m.extend_from_slice(prev),
        None => m.extend_from_slice(&[0_u8; 32]),
    }

    let mut mac =
        Hmac::<Sha256>::new_from_slice(&hashed_reveals).expect("HMAC accepts keys of any length");
    mac.update(&m);
    let value: [u8; 32] = mac.finalize().into_bytes().into();

    Some(Srv {
        num_reveals: qualifying.len() as u64,
        value,
    })
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
    use tor_llcrypto::pk::ed25519::Ed25519Identity;
    use tor_llcrypto::pk::rsa::RsaIdentity;

    #[test]
    fn disaster_is_deterministic() {
        let prev = [0x11_u8; 32];
        let a = disaster_srv(&prev);
        let b = disaster_srv(&prev);
        assert_eq!(a, b);
        assert_eq!(a.num_reveals, 0);
    }

    #[test]
    fn too_few_commits_is_none() {
        let mut rng = StdRng::seed_from_u64(1);
        let commits: Vec<Commit> = (0..2)
            .map(|i| {
                Commit::generate_own(
                    &mut rng,
                    RsaIdentity::from_bytes(&[i as u8; 20]).unwrap(),
                    Ed25519Identity::new([i as u8; 32]),
                    1000,
                )
            })
            .collect();
        assert!(compute_srv(&commits, None).is_none());
    }

    #[test]
    fn three_commits_deterministic_regardless_of_order() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut commits: Vec<Commit> = (0..3)
            .map(|i| {
                Commit::generate_own(
                    &mut rng,
                    RsaIdentity::from_bytes(&[i as u8 + 1; 20]).unwrap(),
                    Ed25519Identity::new([i as u8 + 1; 32]),
                    2000,
                )
            })
            .collect();
        let prev = [0x22_u8; 32];
        let forward = compute_srv(&commits, Some(&prev)).unwrap();
        commits.reverse();
        let reversed = compute_srv(&commits, Some(&prev)).unwrap();
        assert_eq!(forward, reversed);
        assert_eq!(forward.num_reveals, 3);
    }

    #[test]
    fn unreaveled_commit_is_excluded() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut commits: Vec<Commit> = (0..3)
            .map(|i| {
                Commit::generate_own(
                    &mut rng,
                    RsaIdentity::from_bytes(&[i as u8 + 10; 20]).unwrap(),
                    Ed25519Identity::new([i as u8 + 10; 32]),
                    3000,
                )
            })
            .collect();
        commits[0].reveal = None;
        assert!(compute_srv(&commits, None).is_none());
    }
}
