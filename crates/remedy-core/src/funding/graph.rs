//! # Funding Graph
//!
//! Directed edges `transaction -> source it draws from`.
//!
//! ```text
//!   D ──► C ──► B ──► A          "D is funded by C, C by B, B by A"
//!
//!   allocate A ◄── D ?   path_between(A, D) is None  → fine
//!   allocate D ◄── A ?   path_between(D, A) = D,C,B,A → A would fund
//!                        itself through D: A -> D -> C -> B -> A
//! ```
//!
//! Self-loops are kept out of the graph; a transaction naming itself as a
//! source is reported separately as self-funding.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::types::LedgerTransaction;

#[derive(Debug, Clone, Default)]
pub struct FundingGraph {
    edges: HashMap<String, BTreeSet<String>>,
}

impl FundingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from `(transaction_id, source_transaction_id)` pairs.
    pub fn from_edges<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut graph = FundingGraph::new();
        for (transaction_id, source_id) in pairs {
            graph.add_edge(transaction_id, source_id);
        }
        graph
    }

    /// Builds the graph from whole transactions, skipping cancelled ones.
    pub fn from_transactions<'a, I>(transactions: I) -> Self
    where
        I: IntoIterator<Item = &'a LedgerTransaction>,
    {
        let mut graph = FundingGraph::new();
        for transaction in transactions {
            if !transaction.status.counts_as_usage() {
                continue;
            }
            for source_id in transaction.source_ids() {
                graph.add_edge(transaction.id.as_str(), source_id);
            }
        }
        graph
    }

    pub fn add_edge(&mut self, transaction_id: impl Into<String>, source_id: impl Into<String>) {
        let (transaction_id, source_id) = (transaction_id.into(), source_id.into());
        if transaction_id == source_id {
            return;
        }
        self.edges.entry(transaction_id).or_default().insert(source_id);
    }

    pub fn sources_of(&self, transaction_id: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(transaction_id)
            .into_iter()
            .flat_map(|sources| sources.iter().map(String::as_str))
    }

    /// Shortest chain of funding edges leading from `from` to `to`,
    /// inclusive of both ends.
    ///
    /// Breadth-first with sorted neighbours, so the answer is deterministic.
    pub fn path_between(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_string()]);
        }

        let mut parent: HashMap<&str, &str> = HashMap::new();
        let mut seen: HashSet<&str> = HashSet::from([from]);
        let mut queue: VecDeque<&str> = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            for next in self.sources_of(current) {
                if !seen.insert(next) {
                    continue;
                }
                parent.insert(next, current);

                if next == to {
                    let mut path = vec![to.to_string()];
                    let mut cursor = to;
                    while let Some(&prev) = parent.get(cursor) {
                        path.push(prev.to_string());
                        cursor = prev;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }

        None
    }

    /// The cycle that adding `transaction_id -> source_id` would close,
    /// written `transaction, source, ..., transaction`.
    pub fn cycle_if_linked(&self, transaction_id: &str, source_id: &str) -> Option<Vec<String>> {
        if transaction_id == source_id {
            return None;
        }
        let mut path = self.path_between(source_id, transaction_id)?;
        path.insert(0, transaction_id.to_string());
        Some(path)
    }

    /// An existing cycle passing through `transaction_id`, if any.
    pub fn cycle_through(&self, transaction_id: &str) -> Option<Vec<String>> {
        self.sources_of(transaction_id)
            .find_map(|source_id| self.cycle_if_linked(transaction_id, source_id))
    }

    /// True if any cycle is reachable by following sources from `start`.
    pub fn has_cycle_from(&self, start: &str) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        // Iterative DFS; the bool records whether the node's children were pushed.
        let mut stack: Vec<(&str, bool)> = vec![(start, false)];

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                marks.insert(node, Mark::Done);
                continue;
            }
            match marks.get(node) {
                Some(Mark::Done) => continue,
                Some(Mark::Active) => continue,
                None => {}
            }

            marks.insert(node, Mark::Active);
            stack.push((node, true));

            for next in self.sources_of(node) {
                match marks.get(next) {
                    Some(Mark::Active) => return true,
                    Some(Mark::Done) => {}
                    None => stack.push((next, false)),
                }
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> FundingGraph {
        FundingGraph::from_edges([("D", "C"), ("C", "B"), ("B", "A")])
    }

    #[test]
    fn test_path_between_follows_sources() {
        let graph = chain();
        assert_eq!(
            graph.path_between("D", "A"),
            Some(vec!["D".into(), "C".into(), "B".into(), "A".into()])
        );
        assert_eq!(graph.path_between("A", "D"), None);
    }

    #[test]
    fn test_cycle_if_linked() {
        let graph = chain();
        assert_eq!(graph.cycle_if_linked("D", "A"), None);
        assert_eq!(
            graph.cycle_if_linked("A", "D"),
            Some(vec!["A".into(), "D".into(), "C".into(), "B".into(), "A".into()])
        );
    }

    #[test]
    fn test_self_edges_are_ignored() {
        let graph = FundingGraph::from_edges([("A", "A")]);
        assert_eq!(graph.sources_of("A").count(), 0);
        assert!(!graph.has_cycle_from("A"));
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = chain();
        assert!(!graph.has_cycle_from("D"));
        assert_eq!(graph.cycle_through("B"), None);

        graph.add_edge("A", "C");
        assert!(graph.has_cycle_from("D"));
        assert_eq!(
            graph.cycle_through("A"),
            Some(vec!["A".into(), "C".into(), "B".into(), "A".into()])
        );
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let graph = FundingGraph::from_edges([("D", "B"), ("D", "C"), ("B", "A"), ("C", "A")]);
        assert!(!graph.has_cycle_from("D"));
    }
}
