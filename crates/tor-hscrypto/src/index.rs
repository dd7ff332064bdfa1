//! Derive ring indices used to decide which directories are responsible for
//! storing a given onion service descriptor.

use tor_llcrypto::d::Sha3_256;
use tor_llcrypto::pk::ed25519::Ed25519Identity;

use digest::Digest;

use crate::pk::BlindedOnionIdKey;
use crate::time::TimePeriod;

/// The number of independent descriptor replicas a service stores, by
/// default.  See rend-spec-v3 section 2.2.3.
pub const N_REPLICAS_DEFAULT: u64 = 2;

/// The default number of directories, per replica, that a client or service
/// should treat as holding a copy of a descriptor.
pub const SPREAD_STORE_DEFAULT: usize = 3;

/// Compute the index that places a single directory node on the HSDir ring
/// for a given SRV and time period.
///
/// `node_ed25519_id` identifies the node (its relay identity key);
/// `srv` is the 32-byte shared random value currently in use.
pub fn hsdir_index(node_ed25519_id: &Ed25519Identity, srv: &[u8; 32], period: &TimePeriod) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(b"node-idx");
    hasher.update(node_ed25519_id.as_bytes());
    hasher.update(srv);
    hasher.update(period.interval_num().to_be_bytes());
    hasher.update(u64::from(period.length_in_sec()).to_be_bytes());
    hasher.finalize().into()
}

/// Compute the index at which a service should store the `replica`'th copy
/// of its descriptor, for a given time period.
///
/// `replica` ranges over `1..=N_REPLICAS`.
pub fn hs_index(blinded_pk: &BlindedOnionIdKey, replica: u64, period: &TimePeriod) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(b"store-at-idx");
    hasher.update(blinded_pk.as_ed25519().as_bytes());
    hasher.update(replica.to_be_bytes());
    hasher.update(u64::from(period.length_in_sec()).to_be_bytes());
    hasher.update(period.interval_num().to_be_bytes());
    hasher.finalize().into()
}

/// Given the consensus nodes eligible to be HSDirs, each paired with its
/// precomputed [`hsdir_index`], return the set of nodes responsible for
/// storing a service's descriptor during `period`.
///
/// `nodes` need not be pre-sorted: this function sorts a copy by index to
/// form the ring.  Nodes are returned in ring order, deduplicated across
/// replicas, for `replica in 1..=n_replicas`, walking `spread_store` unique
/// nodes clockwise from each replica's `hs_index`.
pub fn responsible_hsdirs<'n, T: Clone + Eq>(
    nodes: &'n [(T, [u8; 32])],
    blinded_pk: &BlindedOnionIdKey,
    period: &TimePeriod,
    n_replicas: u64,
    spread_store: usize,
) -> Vec<T> {
    if nodes.is_empty() {
        return Vec::new();
    }

    let mut ring: Vec<&(T, [u8; 32])> = nodes.iter().collect();
    ring.sort_by(|a, b| a.1.cmp(&b.1));

    let mut result = Vec::new();
    for replica in 1..=n_replicas {
        let target = hs_index(blinded_pk, replica, period);
        // Find the first node whose index is >= target; wrap around if none.
        let start = ring
            .partition_point(|(_, idx)| idx < &target)
            % ring.len();

        let mut taken = 0;
        for step in 0..ring.len() {
            let node = ring[(start + step) % ring.len()];
            if !result.iter().any(|n: &T| n == &node.0) {
                result.push(node.0.clone());
                taken += 1;
            }
            if taken >= spread_store {
                break;
            }
        }
    }
    result
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
    use crate::pk::OnionIdKey;
    use rand::{rngs::StdRng, SeedableRng};
    use std::time::SystemTime;
    use tor_llcrypto::pk::ed25519::Keypair;

    fn period() -> TimePeriod {
        TimePeriod::new(crate::time::DEFAULT_TIME_PERIOD_LENGTH, SystemTime::now())
    }

    #[test]
    fn hsdir_index_is_deterministic() {
        let id = Ed25519Identity::new([7; 32]);
        let srv = [9_u8; 32];
        let p = period();
        assert_eq!(hsdir_index(&id, &srv, &p), hsdir_index(&id, &srv, &p));

        let other_srv = [10_u8; 32];
        assert_ne!(hsdir_index(&id, &srv, &p), hsdir_index(&id, &other_srv, &p));
    }

    #[test]
    fn responsible_hsdirs_returns_unique_nodes_in_ring_order() {
        let mut rng = StdRng::seed_from_u64(0xabba);
        let id_key = OnionIdKey::new(Keypair::generate(&mut rng).verifying_key());
        let p = period();
        let (blinded, _) = id_key.compute_blinded_key(&p);

        let srv = [3_u8; 32];
        let nodes: Vec<(u32, [u8; 32])> = (0..20)
            .map(|i| {
                let id = Ed25519Identity::new([i as u8; 32]);
                (i, hsdir_index(&id, &srv, &p))
            })
            .collect();

        let selected = responsible_hsdirs(&nodes, &blinded, &p, N_REPLICAS_DEFAULT, SPREAD_STORE_DEFAULT);
        assert!(!selected.is_empty());
        assert!(selected.len() <= (N_REPLICAS_DEFAULT as usize) * SPREAD_STORE_DEFAULT);

        let mut seen = std::collections::HashSet::new();
        for n in &selected {
            assert!(seen.insert(*n), "node {n} selected twice");
        }
    }

    #[test]
    fn responsible_hsdirs_empty_ring() {
        let mut rng = StdRng::seed_from_u64(1);
        let id_key = OnionIdKey::new(Keypair::generate(&mut rng).verifying_key());
        let p = period();
        let (blinded, _) = id_key.compute_blinded_key(&p);
        let nodes: Vec<(u32, [u8; 32])> = Vec::new();
        assert!(responsible_hsdirs(&nodes, &blinded, &p, N_REPLICAS_DEFAULT, SPREAD_STORE_DEFAULT).is_empty());
    }
}
