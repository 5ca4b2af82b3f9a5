//! Wait-for graph and deadlock detection
//!
//! An edge `T -> U` means T's current operation cannot proceed until U
//! releases a lock or leaves a lock queue. Edges are replaced whenever a
//! blocked request is re-evaluated and removed when the waiter is granted
//! or terminates.

use repdb_common::{Timestamp, TransactionId};
use std::collections::{BTreeMap, BTreeSet};

/// Directed wait-for graph over transactions
#[derive(Debug, Clone, Default)]
pub struct WaitForGraph {
    edges: BTreeMap<TransactionId, BTreeSet<TransactionId>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the outgoing edges of `waiter`. Self-edges are dropped.
    pub fn set_edges(&mut self, waiter: TransactionId, blockers: impl IntoIterator<Item = TransactionId>) {
        let targets: BTreeSet<_> = blockers.into_iter().filter(|b| *b != waiter).collect();
        if targets.is_empty() {
            self.edges.remove(&waiter);
        } else {
            self.edges.insert(waiter, targets);
        }
    }

    /// Drop the outgoing edges of `waiter`
    pub fn clear_waiter(&mut self, waiter: TransactionId) {
        self.edges.remove(&waiter);
    }

    /// Drop every edge into or out of `txn`
    pub fn remove(&mut self, txn: TransactionId) {
        self.edges.remove(&txn);
        self.edges.retain(|_, targets| {
            targets.remove(&txn);
            !targets.is_empty()
        });
    }

    pub fn successors(&self, txn: TransactionId) -> Vec<TransactionId> {
        self.edges
            .get(&txn)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Find a cycle reachable from `start`, returned in path order
    pub fn find_cycle_from(&self, start: TransactionId) -> Option<Vec<TransactionId>> {
        // Nodes on the current path are gray, fully explored nodes are black
        let mut on_path: Vec<TransactionId> = Vec::new();
        let mut gray: BTreeSet<TransactionId> = BTreeSet::new();
        let mut black: BTreeSet<TransactionId> = BTreeSet::new();
        let mut frames: Vec<(TransactionId, Vec<TransactionId>, usize)> = Vec::new();

        gray.insert(start);
        on_path.push(start);
        frames.push((start, self.successors(start), 0));

        while let Some((node, successors, next)) = frames.last_mut() {
            let Some(&child) = successors.get(*next) else {
                let done = *node;
                frames.pop();
                on_path.pop();
                gray.remove(&done);
                black.insert(done);
                continue;
            };
            *next += 1;

            if gray.contains(&child) {
                let from = on_path.iter().position(|t| *t == child)?;
                return Some(on_path[from..].to_vec());
            }
            if black.contains(&child) {
                continue;
            }

            gray.insert(child);
            on_path.push(child);
            frames.push((child, self.successors(child), 0));
        }

        None
    }
}

/// A detected cycle and the transaction chosen to break it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deadlock {
    pub cycle: Vec<TransactionId>,
    pub victim: TransactionId,
}

/// Owns the wait-for graph and picks deadlock victims
#[derive(Debug, Default)]
pub struct DeadlockDetector {
    graph: WaitForGraph,
}

impl DeadlockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self) -> &WaitForGraph {
        &self.graph
    }

    pub fn set_waiting(&mut self, waiter: TransactionId, blockers: impl IntoIterator<Item = TransactionId>) {
        self.graph.set_edges(waiter, blockers);
    }

    pub fn clear_waiting(&mut self, waiter: TransactionId) {
        self.graph.clear_waiter(waiter);
    }

    pub fn remove(&mut self, txn: TransactionId) {
        self.graph.remove(txn);
    }

    /// Look for a cycle through the edges of `start`
    ///
    /// The victim is the youngest member (latest start time); ties go to
    /// the lowest transaction id.
    pub fn detect(&self, start: TransactionId, start_time: impl Fn(TransactionId) -> Timestamp) -> Option<Deadlock> {
        let cycle = self.graph.find_cycle_from(start)?;
        let victim = cycle
            .iter()
            .copied()
            .max_by(|a, b| start_time(*a).cmp(&start_time(*b)).then_with(|| b.cmp(a)))?;

        tracing::info!(
            cycle = ?cycle.iter().map(ToString::to_string).collect::<Vec<_>>(),
            victim = %victim,
            "deadlock detected"
        );
        Some(Deadlock { cycle, victim })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: u32) -> TransactionId {
        TransactionId::new(id)
    }

    #[test]
    fn test_no_cycle_in_chain() {
        let mut graph = WaitForGraph::new();
        graph.set_edges(tx(3), [tx(2)]);
        graph.set_edges(tx(2), [tx(1)]);

        assert_eq!(graph.find_cycle_from(tx(3)), None);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_two_cycle() {
        let mut graph = WaitForGraph::new();
        graph.set_edges(tx(1), [tx(2)]);
        graph.set_edges(tx(2), [tx(1)]);

        assert_eq!(graph.find_cycle_from(tx(1)), Some(vec![tx(1), tx(2)]));
    }

    #[test]
    fn test_cycle_behind_branch() {
        let mut graph = WaitForGraph::new();
        graph.set_edges(tx(1), [tx(2), tx(3)]);
        graph.set_edges(tx(3), [tx(4)]);
        graph.set_edges(tx(4), [tx(1)]);

        assert_eq!(graph.find_cycle_from(tx(1)), Some(vec![tx(1), tx(3), tx(4)]));
    }

    #[test]
    fn test_self_edges_are_ignored() {
        let mut graph = WaitForGraph::new();
        graph.set_edges(tx(1), [tx(1)]);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.find_cycle_from(tx(1)), None);
    }

    #[test]
    fn test_remove_drops_incoming_edges() {
        let mut graph = WaitForGraph::new();
        graph.set_edges(tx(1), [tx(2)]);
        graph.set_edges(tx(2), [tx(1)]);

        graph.remove(tx(2));
        assert!(graph.successors(tx(1)).is_empty());
        assert_eq!(graph.find_cycle_from(tx(1)), None);
    }

    #[test]
    fn test_victim_is_youngest() {
        let mut detector = DeadlockDetector::new();
        detector.set_waiting(tx(1), [tx(2)]);
        detector.set_waiting(tx(2), [tx(3)]);
        detector.set_waiting(tx(3), [tx(1)]);

        let times = |t: TransactionId| Timestamp::new(match t.get() {
            1 => 1,
            2 => 5,
            _ => 3,
        });
        let deadlock = detector.detect(tx(1), times).expect("cycle");
        assert_eq!(deadlock.victim, tx(2));
        assert_eq!(deadlock.cycle.len(), 3);
    }

    #[test]
    fn test_victim_tie_goes_to_lowest_id() {
        let mut detector = DeadlockDetector::new();
        detector.set_waiting(tx(4), [tx(7)]);
        detector.set_waiting(tx(7), [tx(4)]);

        let deadlock = detector.detect(tx(7), |_| Timestamp::new(2)).expect("cycle");
        assert_eq!(deadlock.victim, tx(4));
    }
}
