//! The `Commit` data model, and the text line codec used for both vote
//! lines and the on-disk state file (§4.A, §6).

use tor_llcrypto::d::Sha3_256;
use tor_llcrypto::pk::ed25519::Ed25519Identity;
use tor_llcrypto::pk::rsa::RsaIdentity;

use digest::Digest;

use crate::err::{Error, Result};

/// Length in bytes of a reveal's random number.
pub const RN_LEN: usize = 32;

/// Length in bytes of a hashed reveal (`H(REVEAL)`).
pub const HASHED_REVEAL_LEN: usize = 32;

/// The only digest algorithm this protocol recognizes.
///
/// Any other token in the `alg` field of a commit line is rejected.
pub const ALG_SHA3_256: &str = "sha3-256";

/// The reveal half of a commit, once exposed during the reveal phase.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_structs)]
pub struct Reveal {
    /// The timestamp embedded in the reveal. Must equal the commit's
    /// timestamp once both are known.
    pub reveal_ts: u64,
    /// The random number this authority committed to.
    pub random_number: [u8; RN_LEN],
    /// The base64 blob exactly as received (or produced), kept byte-exact
    /// for re-emission.
    pub reveal_b64: String,
}

impl Reveal {
    /// Encode `(random_number, timestamp)` the way `H(REVEAL)` is computed
    /// over: `timestamp(8, BE) || random_number(32)`.
    pub fn reveal_encode(random_number: &[u8; RN_LEN], ts: u64) -> [u8; 8 + RN_LEN] {
        let mut buf = [0_u8; 8 + RN_LEN];
        buf[..8].copy_from_slice(&ts.to_be_bytes());
        buf[8..].copy_from_slice(random_number);
        buf
    }

    /// Hash this reveal's encoded form with SHA3-256, as committed to by
    /// `hashed_reveal`.
    fn hash(random_number: &[u8; RN_LEN], ts: u64) -> [u8; HASHED_REVEAL_LEN] {
        Sha3_256::digest(Self::reveal_encode(random_number, ts)).into()
    }
}

/// A single authority's commitment to a random number, and (once the reveal
/// phase has exposed it) the reveal itself.
///
/// An authority may appear at most once per vote, and at most once in the
/// state per protocol run; see `SrState::ingest_commit`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_structs)]
pub struct Commit {
    /// The authority's long-term RSA fingerprint. Commits are keyed by this
    /// value in the state's commit map.
    pub rsa_fpr: RsaIdentity,
    /// The authority's Ed25519 SR identity.
    ///
    /// This is carried on vote lines but *not* on the persisted `sr-state`
    /// file (§6); a commit loaded from disk therefore has this field unset
    /// until a vote carrying the same `rsa_fpr` is ingested in the same
    /// run. SRV computation only considers commits for which it is known.
    pub ed25519_id: Option<Ed25519Identity>,
    /// The commit timestamp.
    pub commit_ts: u64,
    /// `H(REVEAL)`, 32 bytes.
    pub hashed_reveal: [u8; HASHED_REVEAL_LEN],
    /// The base64-encoded commit blob exactly as received.
    pub commit_b64: String,
    /// The reveal, once exposed.
    pub reveal: Option<Reveal>,
}

impl Commit {
    /// Decode the commit blob `[hashed_reveal(32) || timestamp(8, BE)]`.
    pub fn decode_commit_blob(bytes: &[u8]) -> Result<([u8; HASHED_REVEAL_LEN], u64)> {
        if bytes.len() != HASHED_REVEAL_LEN + 8 {
            return Err(Error::Protocol(format!(
                "commit blob has wrong length {}",
                bytes.len()
            )));
        }
        let mut hashed_reveal = [0_u8; HASHED_REVEAL_LEN];
        hashed_reveal.copy_from_slice(&bytes[..HASHED_REVEAL_LEN]);
        let ts = u64::from_be_bytes(bytes[HASHED_REVEAL_LEN..].try_into().expect("checked length"));
        Ok((hashed_reveal, ts))
    }

    /// Encode `[hashed_reveal(32) || timestamp(8, BE)]`.
    pub fn encode_commit_blob(hashed_reveal: &[u8; HASHED_REVEAL_LEN], ts: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HASHED_REVEAL_LEN + 8);
        buf.extend_from_slice(hashed_reveal);
        buf.extend_from_slice(&ts.to_be_bytes());
        buf
    }

    /// Decode the reveal blob `[timestamp(8, BE) || random_number(32)]`.
    pub fn decode_reveal_blob(bytes: &[u8]) -> Result<(u64, [u8; RN_LEN])> {
        if bytes.len() != 8 + RN_LEN {
            return Err(Error::Protocol(format!(
                "reveal blob has wrong length {}",
                bytes.len()
            )));
        }
        let ts = u64::from_be_bytes(bytes[..8].try_into().expect("checked length"));
        let mut rn = [0_u8; RN_LEN];
        rn.copy_from_slice(&bytes[8..]);
        Ok((ts, rn))
    }

    /// Check whether this commit carries a reveal whose hash matches the
    /// committed `hashed_reveal`, and whose timestamp matches `commit_ts`.
    pub fn verify_commit_and_reveal(&self) -> bool {
        match &self.reveal {
            None => false,
            Some(reveal) => {
                reveal.reveal_ts == self.commit_ts
                    && Reveal::hash(&reveal.random_number, reveal.reveal_ts) == self.hashed_reveal
            }
        }
    }

    /// Construct a fresh commit for the local authority at the start of a
    /// commit round: pick `RN` at random, and record both the commit and
    /// reveal halves (we always know our own reveal immediately).
    pub fn generate_own<R: rand::RngCore + rand::CryptoRng>(
        rng: &mut R,
        rsa_fpr: RsaIdentity,
        ed25519_id: Ed25519Identity,
        valid_after: u64,
    ) -> Self {
        let mut random_number = [0_u8; RN_LEN];
        rng.fill_bytes(&mut random_number);
        let hashed_reveal = Reveal::hash(&random_number, valid_after);
        let commit_b64 =
            data_encoding::BASE64.encode(&Self::encode_commit_blob(&hashed_reveal, valid_after));
        let reveal_b64 = data_encoding::BASE64
            .encode(&Reveal::reveal_encode(&random_number, valid_after));
        Commit {
            rsa_fpr,
            ed25519_id: Some(ed25519_id),
            commit_ts: valid_after,
            hashed_reveal,
            commit_b64,
            reveal: Some(Reveal {
                reveal_ts: valid_after,
                random_number,
                reveal_b64,
            }),
        }
    }
}

/// Parse a `shared-rand-commit` vote line's tokens: `[alg, ed25519_identity,
/// rsa_fpr, commit_b64, reveal_b64?]`.
///
/// `tokens` must not include the leading `shared-rand-commit` keyword.
pub fn parse_vote_commit_line(tokens: &[&str]) -> Result<Commit> {
    if tokens.len() != 4 && tokens.len() != 5 {
        return Err(Error::Protocol(format!(
            "commit line has {} tokens, expected 4 or 5",
            tokens.len()
        )));
    }
    let alg = tokens[0];
    if !alg.eq_ignore_ascii_case(ALG_SHA3_256) {
        return Err(Error::Protocol(format!("unrecognized digest algorithm {alg}")));
    }
    let ed25519_id = parse_ed25519_b64(tokens[1])?;
    let rsa_fpr = parse_rsa_fpr(tokens[2])?;
    let commit_b64 = tokens[3].to_string();
    let commit_bytes = data_encoding::BASE64
        .decode(commit_b64.as_bytes())
        .map_err(|e| Error::Protocol(format!("bad commit base64: {e}")))?;
    let (hashed_reveal, commit_ts) = Commit::decode_commit_blob(&commit_bytes)?;

    let reveal = match tokens.get(4) {
        None => None,
        Some(reveal_b64) => Some(decode_reveal_b64(reveal_b64)?),
    };

    Ok(Commit {
        rsa_fpr,
        ed25519_id: Some(ed25519_id),
        commit_ts,
        hashed_reveal,
        commit_b64,
        reveal,
    })
}

/// Parse a persisted `Commit <alg> <rsa_fpr> <commit_b64> [<reveal_b64>]`
/// line. As on §6, there is no Ed25519 identity token; callers must fill it
/// in from a vote (if and when one arrives) before the commit can
/// contribute to SRV computation.
pub fn parse_disk_commit_line(tokens: &[&str]) -> Result<Commit> {
    if tokens.len() != 3 && tokens.len() != 4 {
        return Err(Error::Protocol(format!(
            "disk commit line has {} tokens, expected 3 or 4",
            tokens.len()
        )));
    }
    let alg = tokens[0];
    if !alg.eq_ignore_ascii_case(ALG_SHA3_256) {
        return Err(Error::Protocol(format!("unrecognized digest algorithm {alg}")));
    }
    let rsa_fpr = parse_rsa_fpr(tokens[1])?;
    let commit_b64 = tokens[2].to_string();
    let commit_bytes = data_encoding::BASE64
        .decode(commit_b64.as_bytes())
        .map_err(|e| Error::Protocol(format!("bad commit base64: {e}")))?;
    let (hashed_reveal, commit_ts) = Commit::decode_commit_blob(&commit_bytes)?;

    let reveal = match tokens.get(3) {
        None => None,
        Some(reveal_b64) => Some(decode_reveal_b64(reveal_b64)?),
    };

    Ok(Commit {
        rsa_fpr,
        ed25519_id: None,
        commit_ts,
        hashed_reveal,
        commit_b64,
        reveal,
    })
}

/// Format a persisted `Commit` line (without the leading `Commit ` keyword).
pub fn format_disk_commit_line(c: &Commit) -> String {
    match &c.reveal {
        None => format!("{} {} {}", ALG_SHA3_256, c.rsa_fpr.as_hex_upper(), c.commit_b64),
        Some(reveal) => format!(
            "{} {} {} {}",
            ALG_SHA3_256,
            c.rsa_fpr.as_hex_upper(),
            c.commit_b64,
            reveal.reveal_b64
        ),
    }
}

/// Format a `shared-rand-commit` vote line (without the leading keyword).
pub fn format_vote_commit_line(c: &Commit) -> Result<String> {
    let ed25519_id = c
        .ed25519_id
        .ok_or_else(|| Error::Internal("commit has no ed25519 identity to emit".into()))?;
    Ok(match &c.reveal {
        None => format!(
            "{} {} {} {}",
            ALG_SHA3_256,
            ed25519_id,
            c.rsa_fpr.as_hex_upper(),
            c.commit_b64
        ),
        Some(reveal) => format!(
            "{} {} {} {} {}",
            ALG_SHA3_256,
            ed25519_id,
            c.rsa_fpr.as_hex_upper(),
            c.commit_b64,
            reveal.reveal_b64
        ),
    })
}

/// Decode a reveal's base64 token into a `Reveal`.
fn decode_reveal_b64(reveal_b64: &str) -> Result<Reveal> {
    let reveal_bytes = data_encoding::BASE64
        .decode(reveal_b64.as_bytes())
        .map_err(|e| Error::Protocol(format!("bad reveal base64: {e}")))?;
    let (reveal_ts, random_number) = Commit::decode_reveal_blob(&reveal_bytes)?;
    Ok(Reveal {
        reveal_ts,
        random_number,
        reveal_b64: reveal_b64.to_string(),
    })
}

/// Parse an Ed25519 identity from its unpadded-base64 textual form (the
/// same encoding produced by `Ed25519Identity`'s `Display` impl).
fn parse_ed25519_b64(s: &str) -> Result<Ed25519Identity> {
    let bytes = data_encoding::BASE64_NOPAD
        .decode(s.as_bytes())
        .map_err(|_| Error::Protocol(format!("bad ed25519 identity {s}")))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Protocol("ed25519 identity has wrong length".into()))?;
    Ok(Ed25519Identity::new(arr))
}

/// Parse an RSA fingerprint from its hex textual form.
fn parse_rsa_fpr(s: &str) -> Result<RsaIdentity> {
    let s = s.trim_start_matches('$');
    RsaIdentity::from_hex(s).ok_or_else(|| Error::Protocol(format!("bad rsa fingerprint {s}")))
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

    #[test]
    fn own_commit_verifies() {
        let mut rng = StdRng::seed_from_u64(77);
        let rsa_fpr = RsaIdentity::from_bytes(&[1_u8; 20]).unwrap();
        let ed = Ed25519Identity::new([2_u8; 32]);
        let c = Commit::generate_own(&mut rng, rsa_fpr, ed, 1_000_000);
        assert!(c.verify_commit_and_reveal());
    }

    #[test]
    fn vote_line_round_trips() {
        let mut rng = StdRng::seed_from_u64(99);
        let rsa_fpr = RsaIdentity::from_bytes(&[3_u8; 20]).unwrap();
        let ed = Ed25519Identity::new([4_u8; 32]);
        let c = Commit::generate_own(&mut rng, rsa_fpr, ed, 42);
        let line = format_vote_commit_line(&c).unwrap();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let parsed = parse_vote_commit_line(&tokens).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn disk_line_drops_ed25519_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let rsa_fpr = RsaIdentity::from_bytes(&[5_u8; 20]).unwrap();
        let ed = Ed25519Identity::new([6_u8; 32]);
        let c = Commit::generate_own(&mut rng, rsa_fpr, ed, 7);
        let line = format_disk_commit_line(&c);
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let parsed = parse_disk_commit_line(&tokens).unwrap();
        assert_eq!(parsed.ed25519_id, None);
        assert_eq!(parsed.rsa_fpr, c.rsa_fpr);
        assert_eq!(parsed.hashed_reveal, c.hashed_reveal);
    }

    #[test]
    fn rejects_wrong_algorithm() {
        let tokens = ["md5", "AAAA", "AQEBAQEBAQEBAQEBAQEBAQEBAQE=", "AAAA"];
        assert!(parse_disk_commit_line(&tokens).is_err());
    }

    #[test]
    fn rejects_tampered_reveal() {
        let mut rng = StdRng::seed_from_u64(5);
        let rsa_fpr = RsaIdentity::from_bytes(&[9_u8; 20]).unwrap();
        let ed = Ed25519Identity::new([10_u8; 32]);
        let mut c = Commit::generate_own(&mut rng, rsa_fpr, ed, 123);
        if let Some(reveal) = c.reveal.as_mut() {
            reveal.random_number[0] ^= 0xff;
        }
        assert!(!c.verify_commit_and_reveal());
    }
}
