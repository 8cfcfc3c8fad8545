//! Consistent hash ring for routing metrics to cache instances.
//!
//! Every cache daemon in the fleet must agree on which instance buffers a
//! given metric without consulting a shared directory, so the ring is a pure
//! function of its membership list: each node is hashed at a fixed number of
//! replica points into a 16-bit ring space, the points are kept sorted, and a
//! key maps to the owner of the first point at or after the key's own hash
//! (wrapping past the top of the ring).

use fnv::FnvHasher;
use std::hash::Hasher;

/// Number of replica points each node occupies on the ring.
pub const REPLICA_COUNT: usize = 100;

/// Identity of one cache instance: a server plus an optional instance label
/// disambiguating multiple daemons co-located on that server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RingNode {
    pub server: String,
    pub instance: Option<String>,
}

impl RingNode {
    pub fn new(server: impl Into<String>, instance: Option<String>) -> Self {
        RingNode {
            server: server.into(),
            instance,
        }
    }

    fn replica_key(&self, index: usize) -> String {
        format!(
            "{}:{}:{}",
            self.instance.as_deref().unwrap_or("none"),
            self.server,
            index
        )
    }
}

impl std::fmt::Display for RingNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}:{}", self.server, instance),
            None => write!(f, "{}", self.server),
        }
    }
}

/// Maps arbitrary string keys onto a fixed membership of [`RingNode`]s with
/// minimal remapping when membership changes.
///
/// The ring is built once at startup and read concurrently afterwards; all
/// methods taking `&mut self` exist for membership changes off the hot path.
#[derive(Debug, Clone)]
pub struct ConsistentHashRing {
    /// (position, node) pairs sorted by position. Nodes appear once per
    /// replica point.
    ring: Vec<(u16, RingNode)>,
}

impl ConsistentHashRing {
    pub fn new(nodes: Vec<RingNode>) -> Self {
        let mut ring = ConsistentHashRing { ring: Vec::new() };
        for node in nodes {
            ring.add_node(node);
        }
        ring
    }

    /// Hash an arbitrary string into the ring's position space.
    ///
    /// FNV-1a folded down to 16 bits: the space only needs to spread replica
    /// points evenly, and a compact position keeps the sorted scan cheap.
    fn ring_position(key: &str) -> u16 {
        let mut hasher = FnvHasher::default();
        hasher.write(key.as_bytes());
        let h = hasher.finish();
        ((h >> 48) ^ (h & 0xffff)) as u16
    }

    /// Add a node's replica points, keeping the ring sorted.
    pub fn add_node(&mut self, node: RingNode) {
        for i in 0..REPLICA_COUNT {
            let position = Self::ring_position(&node.replica_key(i));
            let entry = (position, node.clone());
            let at = self
                .ring
                .partition_point(|(p, _)| *p <= position);
            self.ring.insert(at, entry);
        }
    }

    /// Remove every replica point owned by `node`.
    pub fn remove_node(&mut self, node: &RingNode) {
        self.ring.retain(|(_, n)| n != node);
    }

    /// Return the node authoritative for `key`, or `None` on an empty ring.
    ///
    /// Deterministic for a fixed membership: repeated calls (and calls from
    /// other processes built from the same membership) agree.
    pub fn get_node(&self, key: &str) -> Option<&RingNode> {
        if self.ring.is_empty() {
            return None;
        }
        let position = Self::ring_position(key);
        let at = self.ring.partition_point(|(p, _)| *p < position);
        // Past the last point means wrapping around to the first.
        let at = if at == self.ring.len() { 0 } else { at };
        Some(&self.ring[at].1)
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Number of replica points currently on the ring.
    pub fn len(&self) -> usize {
        self.ring.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_node_ring() -> ConsistentHashRing {
        ConsistentHashRing::new(vec![
            RingNode::new("cache-a", None),
            RingNode::new("cache-b", None),
            RingNode::new("cache-c", Some("1".to_string())),
        ])
    }

    #[test]
    fn test_get_node_deterministic() {
        let ring1 = three_node_ring();
        let ring2 = three_node_ring();

        for key in ["servers.web01.cpu", "servers.web02.load", "a.b.c", ""] {
            let n1 = ring1.get_node(key).unwrap();
            let n2 = ring2.get_node(key).unwrap();
            assert_eq!(n1, n2, "two rings with identical membership disagree");
            // Stable across repeated calls on the same ring
            assert_eq!(ring1.get_node(key).unwrap(), n1);
        }
    }

    #[test]
    fn test_empty_ring() {
        let ring = ConsistentHashRing::new(vec![]);
        assert!(ring.get_node("anything").is_none());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_remove_non_selected_node_keeps_mapping() {
        let mut ring = three_node_ring();
        let removed = RingNode::new("cache-c", Some("1".to_string()));

        // Collect keys currently mapped to nodes other than cache-c
        let keys: Vec<String> = (0..500).map(|i| format!("servers.web{:03}.cpu", i)).collect();
        let kept: Vec<(String, RingNode)> = keys
            .iter()
            .filter_map(|k| {
                let node = ring.get_node(k).unwrap().clone();
                (node != removed).then(|| (k.clone(), node))
            })
            .collect();
        assert!(!kept.is_empty());

        ring.remove_node(&removed);

        for (key, node) in kept {
            assert_eq!(
                ring.get_node(&key).unwrap(),
                &node,
                "removing an unrelated node remapped {}",
                key
            );
        }
    }

    #[test]
    fn test_all_nodes_reachable() {
        let ring = three_node_ring();
        let mut seen = std::collections::HashSet::new();
        for i in 0..1000 {
            seen.insert(ring.get_node(&format!("metric.{}", i)).unwrap().clone());
        }
        assert_eq!(seen.len(), 3, "some node owns no keys at all");
    }

    #[test]
    fn test_add_node_moves_bounded_share() {
        let mut ring = three_node_ring();
        let keys: Vec<String> = (0..1000).map(|i| format!("m.{}", i)).collect();
        let before: Vec<RingNode> = keys.iter().map(|k| ring.get_node(k).unwrap().clone()).collect();

        ring.add_node(RingNode::new("cache-d", None));

        let moved = keys
            .iter()
            .zip(&before)
            .filter(|(k, old)| ring.get_node(k).unwrap() != *old)
            .count();
        // Roughly a quarter of the keyspace should move to the fourth node;
        // anything over half means the ring is rehashing wholesale.
        assert!(moved < 500, "{} of 1000 keys moved on node addition", moved);
    }
}
