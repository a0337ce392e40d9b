/// Ring topology, physical adjacency and repair routing.
///
/// The topology is the single owner of routing state: the ring successor
/// relation, the physical neighbor graph, every node's redirection table
/// and the set of nodes known to have failed. Nodes query it through the
/// [`Router`] trait and never mutate it.
///
/// A redirection entry on node `here` maps a final destination to the
/// physical neighbor `here` should hand traffic to. Entries are added or
/// overwritten by [`Topology::repair`] and never removed, so a chain of
/// failures can leave a destination several tunnel hops away. Each hop
/// consults only its own table, one physical link per round.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, error, info};

use crate::error::{RingError, RingResult};
use crate::node::{NodeId, Router};

// ── Adjacency ─────────────────────────────────────────────────────────

/// The parsed physical graph, in declaration order.
///
/// Declaration order is also the order nodes are laid out in the ring
/// and stepped by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjacency {
    entries: Vec<(NodeId, Vec<NodeId>)>,
}

impl Adjacency {
    /// Parse `nodeId neighborId neighborId ...` lines. Blank lines are
    /// skipped; a node listing itself as a neighbor is ignored.
    pub fn parse(text: &str) -> RingResult<Self> {
        let mut entries = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let mut ids = Vec::new();
            for token in raw.split_whitespace() {
                let id = token.parse::<NodeId>().map_err(|e| RingError::MalformedGraph {
                    line,
                    reason: format!("invalid node id {token:?}: {e}"),
                })?;
                ids.push(id);
            }
            let Some((&head, rest)) = ids.split_first() else {
                continue;
            };
            entries.push((head, rest.to_vec()));
        }
        Self::from_entries(entries)
    }

    /// Build from explicit `(node, neighbors)` pairs, validating that every
    /// referenced neighbor is declared and that no node is declared twice.
    pub fn from_entries(entries: Vec<(NodeId, Vec<NodeId>)>) -> RingResult<Self> {
        if entries.is_empty() {
            return Err(RingError::EmptyTopology);
        }
        let mut declared = BTreeSet::new();
        for (id, _) in &entries {
            if !declared.insert(*id) {
                return Err(RingError::DuplicateNode(*id));
            }
        }
        let mut cleaned = Vec::with_capacity(entries.len());
        for (id, neighbors) in entries {
            let mut kept = Vec::with_capacity(neighbors.len());
            for n in neighbors {
                if !declared.contains(&n) {
                    return Err(RingError::UnknownNode(n));
                }
                if n != id && !kept.contains(&n) {
                    kept.push(n);
                }
            }
            cleaned.push((id, kept));
        }
        Ok(Adjacency { entries: cleaned })
    }

    /// A bare ring: nodes in the given order with no extra links.
    pub fn ring(ids: &[u64]) -> RingResult<Self> {
        Self::from_entries(ids.iter().map(|&id| (NodeId::new(id), Vec::new())).collect())
    }

    pub fn entries(&self) -> &[(NodeId, Vec<NodeId>)] {
        &self.entries
    }

    /// Node ids in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── RepairOutcome ─────────────────────────────────────────────────────

/// Result of rerouting one node around a failed successor.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum RepairOutcome {
    /// `node` now follows `new_next`, reached along `path`.
    Rerouted {
        node: NodeId,
        new_next: NodeId,
        path: Vec<NodeId>,
    },
    /// No live path connects `node` to `target`.
    Unreachable { node: NodeId, target: NodeId },
}

impl RepairOutcome {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, RepairOutcome::Unreachable { .. })
    }
}

// ── Topology ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Topology {
    order: Vec<NodeId>,
    neighbors: BTreeMap<NodeId, BTreeSet<NodeId>>,
    successor: BTreeMap<NodeId, NodeId>,
    predecessor: BTreeMap<NodeId, NodeId>,
    redirection: BTreeMap<NodeId, BTreeMap<NodeId, NodeId>>,
    failed: BTreeSet<NodeId>,
}

impl Topology {
    /// Lay the declared nodes out in a ring and merge the ring links into
    /// the physical graph.
    ///
    /// Physical links are undirected: a neighbor listed on one line only
    /// is linked both ways, so every repair path can be walked back.
    pub fn new(adjacency: &Adjacency) -> Self {
        let mut neighbors: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for (id, links) in adjacency.entries() {
            neighbors.entry(*id).or_default().extend(links.iter().copied());
            for link in links {
                neighbors.entry(*link).or_default().insert(*id);
            }
        }
        let mut topology = Topology {
            order: adjacency.nodes().collect(),
            neighbors,
            successor: BTreeMap::new(),
            predecessor: BTreeMap::new(),
            redirection: BTreeMap::new(),
            failed: BTreeSet::new(),
        };
        topology.build_ring();
        topology
    }

    fn build_ring(&mut self) {
        let n = self.order.len();
        for i in 0..n {
            let here = self.order[i];
            let prev = self.order[(i + n - 1) % n];
            let next = self.order[(i + 1) % n];
            let set = self.neighbors.entry(here).or_default();
            set.insert(prev);
            set.insert(next);
            self.successor.insert(here, next);
            self.predecessor.insert(here, prev);
        }
        debug!(nodes = n, "ring built");
    }

    // ── Queries ───────────────────────────────────────────────────

    /// Node ids in declaration (and stepping) order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.neighbors.contains_key(&id)
    }

    pub fn neighbors(&self, id: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.neighbors.get(&id)
    }

    /// Whether a direct physical link `from → to` exists.
    pub fn is_neighbor(&self, from: NodeId, to: NodeId) -> bool {
        self.neighbors
            .get(&from)
            .is_some_and(|set| set.contains(&to))
    }

    pub fn predecessor(&self, id: NodeId) -> Option<NodeId> {
        self.predecessor.get(&id).copied()
    }

    /// The redirection entry `from` holds for `destination`, if any.
    pub fn redirection(&self, from: NodeId, destination: NodeId) -> Option<NodeId> {
        self.redirection.get(&from)?.get(&destination).copied()
    }

    pub fn redirections(&self, from: NodeId) -> Option<&BTreeMap<NodeId, NodeId>> {
        self.redirection.get(&from)
    }

    pub fn failed(&self) -> &BTreeSet<NodeId> {
        &self.failed
    }

    pub fn is_failed(&self, id: NodeId) -> bool {
        self.failed.contains(&id)
    }

    /// Walk the ring from the first live node, following successors.
    pub fn ring(&self) -> Vec<NodeId> {
        let Some(start) = self.order.iter().copied().find(|id| !self.is_failed(*id)) else {
            return Vec::new();
        };
        let mut ring = vec![start];
        let mut current = start;
        while let Some(next) = self.successor.get(&current).copied() {
            if next == start || ring.len() > self.order.len() {
                break;
            }
            ring.push(next);
            current = next;
        }
        ring
    }

    /// Follow redirection entries hop by hop from `from` to `destination`.
    ///
    /// Returns the physical path, or `None` if the chain hits a missing
    /// link, a failed hop, or exceeds the node count.
    pub fn resolve(&self, from: NodeId, destination: NodeId) -> Option<Vec<NodeId>> {
        let mut path = vec![from];
        let mut current = from;
        for _ in 0..=self.order.len() {
            if current == destination {
                return Some(path);
            }
            let hop = self.redirection(current, destination).unwrap_or(destination);
            if !self.is_neighbor(current, hop) || self.is_failed(hop) {
                return None;
            }
            path.push(hop);
            current = hop;
        }
        None
    }

    // ── Repair ────────────────────────────────────────────────────

    /// Record `id` as failed. Returns `false` if it was already known.
    pub fn mark_failed(&mut self, id: NodeId) -> bool {
        self.failed.insert(id)
    }

    /// Breadth-first search over live physical links.
    ///
    /// Whole paths are queued so the winner can be walked directly.
    /// Paths never exceed the node count, which bounds the search even
    /// on a graph with cycles.
    pub fn find_path(&self, source: NodeId, target: NodeId) -> Option<Vec<NodeId>> {
        if self.is_failed(source) || self.is_failed(target) {
            return None;
        }
        let max_len = self.order.len();
        let mut visited = BTreeSet::from([source]);
        let mut queue = VecDeque::from([vec![source]]);

        while let Some(path) = queue.pop_front() {
            if path.len() > max_len {
                break;
            }
            let end = path[path.len() - 1];
            if end == target {
                return Some(path);
            }
            let Some(links) = self.neighbors.get(&end) else {
                continue;
            };
            for &next in links {
                if self.is_failed(next) || !visited.insert(next) {
                    continue;
                }
                let mut extended = path.clone();
                extended.push(next);
                queue.push_back(extended);
            }
        }
        None
    }

    /// Reroute every live node whose successor is `failed` to the node
    /// after it, installing redirection entries both ways along the
    /// shortest live path.
    ///
    /// Only direct predecessors are repaired; routes that reach `failed`
    /// through older redirection chains are left as they are.
    pub fn repair(&mut self, failed: NodeId) -> Vec<RepairOutcome> {
        let affected: Vec<NodeId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.successor.get(id) == Some(&failed) && !self.is_failed(*id))
            .collect();

        let mut outcomes = Vec::with_capacity(affected.len());
        for node in affected {
            let target = self.skip_target(node, failed);
            let path = match target {
                Some(target) => self.find_path(node, target).map(|path| (target, path)),
                None => None,
            };
            match path {
                Some((target, path)) => {
                    self.install(&path, node, target);
                    self.successor.insert(node, target);
                    self.predecessor.insert(target, node);
                    info!(%node, %failed, new_next = %target, hops = path.len() - 1, "ring repaired");
                    outcomes.push(RepairOutcome::Rerouted {
                        node,
                        new_next: target,
                        path,
                    });
                }
                None => {
                    let target = target.unwrap_or(node);
                    error!(%node, %failed, %target, "no live path to new successor");
                    outcomes.push(RepairOutcome::Unreachable { node, target });
                }
            }
        }
        outcomes
    }

    /// The node `node` should follow once `failed` is skipped: the
    /// failed node's own successor, moving past any node already known
    /// to be down. `None` when nothing but `node` itself is left.
    fn skip_target(&self, node: NodeId, failed: NodeId) -> Option<NodeId> {
        let mut target = self.successor.get(&failed).copied()?;
        for _ in 0..self.order.len() {
            if target == node {
                return None;
            }
            if !self.is_failed(target) {
                return Some(target);
            }
            target = self.successor.get(&target).copied()?;
        }
        None
    }

    fn install(&mut self, path: &[NodeId], source: NodeId, target: NodeId) {
        for pair in path.windows(2) {
            self.redirection
                .entry(pair[0])
                .or_default()
                .insert(target, pair[1]);
        }
        let reversed: Vec<NodeId> = path.iter().rev().copied().collect();
        for pair in reversed.windows(2) {
            self.redirection
                .entry(pair[0])
                .or_default()
                .insert(source, pair[1]);
        }
    }
}

impl Router for Topology {
    fn successor(&self, node: NodeId) -> Option<NodeId> {
        self.successor.get(&node).copied()
    }

    fn next_hop(&self, from: NodeId, destination: NodeId) -> NodeId {
        if let Some(hop) = self.redirection(from, destination) {
            return hop;
        }
        if !self.is_neighbor(from, destination) {
            error!(%from, %destination, "no direct link and no redirection entry");
        }
        destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    /// Ring 1-2-3-4-5 plus chords 1-3 and 3-5.
    fn chorded() -> Topology {
        let adj = Adjacency::parse("1 3\n2\n3 1 5\n4\n5 3\n").unwrap();
        Topology::new(&adj)
    }

    #[test]
    fn test_parse_adjacency() {
        let adj = Adjacency::parse("1 2 3\n\n2 1\n3 1 3\n").unwrap();
        assert_eq!(adj.len(), 3);
        assert_eq!(adj.entries()[0], (n(1), vec![n(2), n(3)]));
        // Self reference dropped.
        assert_eq!(adj.entries()[2], (n(3), vec![n(1)]));
    }

    #[test]
    fn test_parse_adjacency_errors() {
        assert_eq!(Adjacency::parse(""), Err(RingError::EmptyTopology));
        assert_eq!(
            Adjacency::parse("1 2\n1\n2\n"),
            Err(RingError::DuplicateNode(n(1)))
        );
        assert_eq!(Adjacency::parse("1 9\n"), Err(RingError::UnknownNode(n(9))));
        assert!(matches!(
            Adjacency::parse("1 x\n"),
            Err(RingError::MalformedGraph { line: 1, .. })
        ));
    }

    #[test]
    fn test_ring_build_wraps_and_links() {
        let topo = Topology::new(&Adjacency::ring(&[1, 2, 3, 4, 5]).unwrap());
        assert_eq!(topo.successor(n(5)), Some(n(1)));
        assert_eq!(topo.predecessor(n(1)), Some(n(5)));
        assert_eq!(topo.ring(), vec![n(1), n(2), n(3), n(4), n(5)]);
        let set: Vec<NodeId> = topo.neighbors(n(1)).unwrap().iter().copied().collect();
        assert_eq!(set, vec![n(2), n(5)]);
    }

    #[test]
    fn test_ring_links_not_duplicated() {
        let topo = Topology::new(&Adjacency::parse("1 2\n2 1 3\n3\n").unwrap());
        assert_eq!(topo.neighbors(n(2)).unwrap().len(), 2);
    }

    #[test]
    fn test_one_sided_link_is_undirected() {
        // Only node 1 lists the chord to 3.
        let mut topo = Topology::new(&Adjacency::parse("1 3\n2\n3\n4\n5\n").unwrap());
        assert!(topo.is_neighbor(n(1), n(3)));
        assert!(topo.is_neighbor(n(3), n(1)));

        topo.mark_failed(n(2));
        let outcomes = topo.repair(n(2));
        assert_eq!(
            outcomes,
            vec![RepairOutcome::Rerouted {
                node: n(1),
                new_next: n(3),
                path: vec![n(1), n(3)],
            }]
        );
        // The return route is a real link too.
        assert_eq!(topo.resolve(n(3), n(1)), Some(vec![n(3), n(1)]));
        assert_eq!(topo.resolve(n(1), n(3)), Some(vec![n(1), n(3)]));
    }

    #[test]
    fn test_find_path_skips_failed() {
        let mut topo = chorded();
        assert_eq!(topo.find_path(n(1), n(3)), Some(vec![n(1), n(3)]));
        topo.mark_failed(n(3));
        assert_eq!(
            topo.find_path(n(2), n(4)),
            Some(vec![n(2), n(1), n(5), n(4)])
        );
        assert_eq!(topo.find_path(n(2), n(3)), None);
    }

    #[test]
    fn test_next_hop_direct_without_redirection() {
        let topo = chorded();
        assert_eq!(topo.next_hop(n(1), n(2)), n(2));
    }

    #[test]
    fn test_repair_installs_both_directions() {
        let mut topo = chorded();
        topo.mark_failed(n(4));
        let outcomes = topo.repair(n(4));
        assert_eq!(
            outcomes,
            vec![RepairOutcome::Rerouted {
                node: n(3),
                new_next: n(5),
                path: vec![n(3), n(5)],
            }]
        );
        assert_eq!(topo.successor(n(3)), Some(n(5)));
        assert_eq!(topo.predecessor(n(5)), Some(n(3)));
        assert_eq!(topo.ring(), vec![n(1), n(2), n(3), n(5)]);
    }

    #[test]
    fn test_repair_multi_hop_tunnel() {
        let mut topo = chorded();
        topo.mark_failed(n(3));
        let outcomes = topo.repair(n(3));
        assert_eq!(
            outcomes,
            vec![RepairOutcome::Rerouted {
                node: n(2),
                new_next: n(4),
                path: vec![n(2), n(1), n(5), n(4)],
            }]
        );
        // Forward direction toward 4.
        assert_eq!(topo.next_hop(n(2), n(4)), n(1));
        assert_eq!(topo.next_hop(n(1), n(4)), n(5));
        assert_eq!(topo.next_hop(n(5), n(4)), n(4));
        // Return direction toward 2.
        assert_eq!(topo.next_hop(n(4), n(2)), n(5));
        assert_eq!(topo.next_hop(n(5), n(2)), n(1));
        assert_eq!(topo.next_hop(n(1), n(2)), n(2));

        assert_eq!(topo.resolve(n(2), n(4)), Some(vec![n(2), n(1), n(5), n(4)]));
        assert_eq!(topo.resolve(n(4), n(2)), Some(vec![n(4), n(5), n(1), n(2)]));
    }

    #[test]
    fn test_repair_plain_ring_then_cut() {
        // A bare ring minus one node is a line; rerouting 1 → 3 after 2
        // fails is still possible the long way round.
        let mut topo = Topology::new(&Adjacency::ring(&[1, 2, 3, 4]).unwrap());
        topo.mark_failed(n(2));
        let outcomes = topo.repair(n(2));
        assert_eq!(
            outcomes,
            vec![RepairOutcome::Rerouted {
                node: n(1),
                new_next: n(3),
                path: vec![n(1), n(4), n(3)],
            }]
        );

        // A second failure cuts the line in two.
        topo.mark_failed(n(4));
        let outcomes = topo.repair(n(4));
        assert_eq!(
            outcomes,
            vec![RepairOutcome::Unreachable {
                node: n(3),
                target: n(1),
            }]
        );
    }

    #[test]
    fn test_repair_collapsed_ring() {
        let mut topo = Topology::new(&Adjacency::ring(&[1, 2]).unwrap());
        topo.mark_failed(n(2));
        let outcomes = topo.repair(n(2));
        assert_eq!(
            outcomes,
            vec![RepairOutcome::Unreachable {
                node: n(1),
                target: n(1),
            }]
        );
    }

    #[test]
    fn test_repair_skips_already_failed_successor() {
        let mut topo = chorded();
        // 5 dies unnoticed by repair, then 4 is reported.
        topo.mark_failed(n(5));
        topo.mark_failed(n(4));
        let outcomes = topo.repair(n(4));
        assert_eq!(
            outcomes,
            vec![RepairOutcome::Rerouted {
                node: n(3),
                new_next: n(1),
                path: vec![n(3), n(1)],
            }]
        );
    }

    #[test]
    fn test_redirection_overwritten_not_removed() {
        let mut topo = chorded();
        topo.mark_failed(n(3));
        topo.repair(n(3));
        assert_eq!(topo.redirection(n(1), n(4)), Some(n(5)));
        topo.mark_failed(n(4));
        topo.repair(n(4));
        // 2 now follows 5: path 2-1-5 rewrites 1's entry for 5 and keeps
        // the stale entry for 4.
        assert_eq!(topo.successor(n(2)), Some(n(5)));
        assert_eq!(topo.redirection(n(1), n(5)), Some(n(5)));
        assert_eq!(topo.redirection(n(1), n(4)), Some(n(5)));
    }
}
