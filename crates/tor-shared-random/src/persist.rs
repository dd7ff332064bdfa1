//! Reading and atomically writing the persisted `sr-state` file (§4.B
//! "Persistence", §6 "Persisted SR file").

use std::io::Write as _;
use std::path::Path;

use time::format_description::well_known::Iso8601;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::commit::{format_disk_commit_line, parse_disk_commit_line};
use crate::err::{Error, Result};
use crate::srv::Srv;
use crate::state::{SrState, PROTOCOL_VERSION};

/// The banner written at the top of every `sr-state` file.
const BANNER: &str = "# This file was generated by Tor; if you edit it, comments will not be preserved\n# The tor process treats this file as a binary blob, and will overwrite it as needed. Do not edit by hand.\n";

/// Filename of the persisted SR state, relative to the data directory.
pub const STATE_FILENAME: &str = "sr-state";

/// Format `t` (seconds since the Unix epoch) as an ISO-8601 UTC timestamp.
fn format_timestamp(t: u64) -> Result<String> {
    let dt = OffsetDateTime::from_unix_timestamp(
        i64::try_from(t).map_err(|_| Error::Internal("timestamp overflow".into()))?,
    )
    .map_err(|e| Error::Internal(format!("bad timestamp: {e}")))?;
    dt.format(&Iso8601::DEFAULT)
        .map_err(|e| Error::Internal(format!("cannot format timestamp: {e}")))
}

/// Parse an ISO-8601 UTC timestamp into seconds since the Unix epoch.
fn parse_timestamp(s: &str) -> Result<u64> {
    let dt = OffsetDateTime::parse(s, &Iso8601::DEFAULT)
        .map_err(|e| Error::Persistence(format!("bad timestamp {s}: {e}")))?;
    u64::try_from(dt.unix_timestamp())
        .map_err(|_| Error::Persistence(format!("timestamp {s} precedes the epoch")))
}

/// Render `state` as the text of an `sr-state` file.
fn serialize(state: &SrState) -> Result<String> {
    let mut out = String::new();
    out.push_str(BANNER);
    out.push_str(&format!("Version {}\n", state.version));
    out.push_str(&format!("ValidAfter {}\n", format_timestamp(state.valid_after)?));
    out.push_str(&format!("ValidUntil {}\n", format_timestamp(state.valid_until)?));
    for (_, commit) in state.commits() {
        out.push_str(&format!("Commit {}\n", format_disk_commit_line(commit)));
    }
    if let Some(srv) = &state.previous_srv {
        out.push_str(&format!(
            "SharedRandPreviousValue {} {}\n",
            srv.num_reveals,
            hex::encode(srv.value)
        ));
    }
    if let Some(srv) = &state.current_srv {
        out.push_str(&format!(
            "SharedRandCurrentValue {} {}\n",
            srv.num_reveals,
            hex::encode(srv.value)
        ));
    }
    for (k, v) in &state.extra {
        out.push_str(&format!("{k} {v}\n"));
    }
    Ok(out)
}

/// Parse the text of an `sr-state` file, applying the validation-on-load
/// rules of §4.B. `now` is the current time (seconds since the epoch),
/// used to reject an already-expired state.
fn parse(text: &str, now: u64, voting_interval: u64) -> Result<SrState> {
    let mut version = None;
    let mut valid_after = None;
    let mut valid_until = None;
    let mut commits = Vec::new();
    let mut previous_srv = None;
    let mut current_srv = None;
    let mut extra = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, rest) = line
            .split_once(' ')
            .ok_or_else(|| Error::Persistence(format!("line with no value: {line}")))?;
        match key {
            "Version" => {
                version = Some(
                    rest.trim()
                        .parse::<u32>()
                        .map_err(|_| Error::Persistence(format!("bad version {rest}")))?,
                );
            }
            "ValidAfter" => valid_after = Some(parse_timestamp(rest.trim())?),
            "ValidUntil" => valid_until = Some(parse_timestamp(rest.trim())?),
            "Commit" => {
                let tokens: Vec<&str> = rest.split_whitespace().collect();
                commits.push(parse_disk_commit_line(&tokens)?);
            }
            "SharedRandPreviousValue" => previous_srv = Some(parse_srv_line(rest)?),
            "SharedRandCurrentValue" => current_srv = Some(parse_srv_line(rest)?),
            _ => extra.push((key.to_string(), rest.to_string())),
        }
    }

    let version = version.ok_or_else(|| Error::Persistence("missing Version".into()))?;
    if version > PROTOCOL_VERSION {
        return Err(Error::Persistence(format!(
            "state file version {version} is newer than supported {PROTOCOL_VERSION}"
        )));
    }
    let valid_after = valid_after.ok_or_else(|| Error::Persistence("missing ValidAfter".into()))?;
    let valid_until = valid_until.ok_or_else(|| Error::Persistence("missing ValidUntil".into()))?;
    if valid_until < now {
        return Err(Error::Persistence("state has already expired".into()));
    }
    if valid_after >= valid_until {
        return Err(Error::Persistence("ValidAfter is not before ValidUntil".into()));
    }

    let mut commit_map = std::collections::BTreeMap::new();
    for c in commits {
        commit_map.insert(c.rsa_fpr, c);
    }

    Ok(SrState {
        version,
        phase: crate::state::phase_at(valid_after, voting_interval),
        valid_after,
        valid_until,
        commits: commit_map,
        previous_srv,
        current_srv,
        n_commit_rounds: 0,
        n_reveal_rounds: 0,
        n_protocol_runs: 0,
        fresh: false,
        extra,
    })
}

/// Parse a `SharedRand{Previous,Current}Value` line's value portion:
/// `<num_reveals> <hex32>`.
fn parse_srv_line(rest: &str) -> Result<Srv> {
    let mut tokens = rest.split_whitespace();
    let num_reveals = tokens
        .next()
        .ok_or_else(|| Error::Persistence("SRV line missing num_reveals".into()))?
        .parse::<u64>()
        .map_err(|_| Error::Persistence("SRV line has non-numeric num_reveals".into()))?;
    let hex_value = tokens
        .next()
        .ok_or_else(|| Error::Persistence("SRV line missing value".into()))?;
    let bytes = hex::decode(hex_value)
        .map_err(|_| Error::Persistence("SRV line has bad hex value".into()))?;
    let value: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Persistence("SRV line value is not 32 bytes".into()))?;
    Ok(Srv { num_reveals, value })
}

/// Load the `sr-state` file from `data_dir`, falling back to a fresh state
/// (and immediately persisting it) if the file is absent or invalid, per
/// §4.B "Validation on load": rejection is non-fatal.
pub fn load_or_init(
    data_dir: &Path,
    now: u64,
    voting_interval: u64,
) -> Result<SrState> {
    let path = data_dir.join(STATE_FILENAME);
    let loaded = match std::fs::read_to_string(&path) {
        Ok(text) => match parse(&text, now, voting_interval) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(error = %e, path = %path.display(), "discarding unreadable sr-state, starting fresh");
                None
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let state = loaded.unwrap_or_else(|| {
        debug!("no usable sr-state on disk; initializing fresh state");
        SrState::new_fresh(now, voting_interval)
    });
    save(data_dir, &state)?;
    Ok(state)
}

/// Atomically write `state` to `data_dir/sr-state`: write to a temp file in
/// the same directory, then rename over the target.
pub fn save(data_dir: &Path, state: &SrState) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let path = data_dir.join(STATE_FILENAME);
    let tmp_path = data_dir.join(format!("{STATE_FILENAME}.tmp"));
    let text = serialize(state)?;
    {
        let mut f = std::fs::File::create(&tmp_path)?;
        f.write_all(text.as_bytes())?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, &path)?;
    debug!(path = %path.display(), "wrote sr-state");
    Ok(())
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

    const V: u64 = 3600;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = SrState::new_fresh(1_600_000_000, V);
        state.previous_srv = Some(Srv {
            num_reveals: 3,
            value: [0x42_u8; 32],
        });
        state.extra.push(("SomeFutureKey".to_string(), "value".to_string()));
        save(dir.path(), &state).unwrap();

        let loaded = load_or_init(dir.path(), 1_600_000_000, V).unwrap();
        assert_eq!(loaded.valid_after, state.valid_after);
        assert_eq!(loaded.valid_until, state.valid_until);
        assert_eq!(loaded.previous_srv, state.previous_srv);
        assert_eq!(loaded.extra, state.extra);
    }

    #[test]
    fn expired_state_is_replaced_with_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let state = SrState::new_fresh(0, V);
        save(dir.path(), &state).unwrap();

        let loaded = load_or_init(dir.path(), 100 * V * 24, V).unwrap();
        assert_eq!(loaded.n_protocol_runs, 0);
        assert!(loaded.valid_after >= 100 * V * 24);
    }

    #[test]
    fn garbage_file_is_replaced_with_fresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILENAME), "not a state file\n").unwrap();
        let loaded = load_or_init(dir.path(), 0, V).unwrap();
        assert_eq!(loaded.n_protocol_runs, 0);
    }
}
