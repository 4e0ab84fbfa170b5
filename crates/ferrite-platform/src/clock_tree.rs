//! Derived clock tree.
//!
//! Named frequency signals form a small DAG: each node has at most one
//! upstream source and a fixed multiplier/divisor. Frequencies are cached and
//! recomputed by explicit [`ClockTree::propagate`] when a source changes,
//! rather than lazily on every read.
//!
//! A node with no source (and no externally supplied frequency) has undefined
//! frequency; dependent devices must check [`ClockTree::has_source`] before
//! activating.

use core::fmt;

/// Handle to a node in a [`ClockTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// Wiring `node` to `source` would close a cycle.
    Cycle { node: &'static str, source: &'static str },
    /// The node already has an upstream source.
    AlreadyWired { node: &'static str },
    /// The divisor is zero.
    ZeroDivisor { node: &'static str },
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::Cycle { node, source } => {
                write!(f, "wiring clock {node:?} to {source:?} would create a cycle")
            }
            ClockError::AlreadyWired { node } => {
                write!(f, "clock {node:?} already has a source")
            }
            ClockError::ZeroDivisor { node } => {
                write!(f, "clock {node:?} configured with a zero divisor")
            }
        }
    }
}

impl std::error::Error for ClockError {}

#[derive(Debug)]
struct Node {
    name: &'static str,
    source: Option<ClockId>,
    /// Frequency supplied by board code for root nodes.
    external_hz: Option<u64>,
    mul: u64,
    div: u64,
    /// Cached output frequency, refreshed by `propagate`.
    freq_hz: Option<u64>,
}

#[derive(Debug, Default)]
pub struct ClockTree {
    nodes: Vec<Node>,
}

impl ClockTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &'static str) -> ClockId {
        let id = ClockId(self.nodes.len());
        self.nodes.push(Node {
            name,
            source: None,
            external_hz: None,
            mul: 1,
            div: 1,
            freq_hz: None,
        });
        id
    }

    pub fn name(&self, id: ClockId) -> &'static str {
        self.nodes[id.0].name
    }

    /// Supplies a root frequency from board code. Counts as having a source.
    pub fn set_external_frequency(&mut self, id: ClockId, hz: u64) {
        self.nodes[id.0].external_hz = Some(hz);
    }

    /// Applies `out = in * mul / div` to the node's derivation.
    pub fn set_mul_div(&mut self, id: ClockId, mul: u64, div: u64) -> Result<(), ClockError> {
        if div == 0 {
            return Err(ClockError::ZeroDivisor {
                node: self.nodes[id.0].name,
            });
        }
        self.nodes[id.0].mul = mul;
        self.nodes[id.0].div = div;
        Ok(())
    }

    pub fn set_source(&mut self, id: ClockId, source: ClockId) -> Result<(), ClockError> {
        if self.nodes[id.0].source.is_some() {
            return Err(ClockError::AlreadyWired {
                node: self.nodes[id.0].name,
            });
        }

        // Walk upstream from `source`; reaching `id` would close a cycle.
        let mut cursor = Some(source);
        while let Some(cur) = cursor {
            if cur == id {
                return Err(ClockError::Cycle {
                    node: self.nodes[id.0].name,
                    source: self.nodes[source.0].name,
                });
            }
            cursor = self.nodes[cur.0].source;
        }

        self.nodes[id.0].source = Some(source);
        Ok(())
    }

    pub fn has_source(&self, id: ClockId) -> bool {
        let node = &self.nodes[id.0];
        node.source.is_some() || node.external_hz.is_some()
    }

    /// Cached output frequency; `None` while undefined (no source anywhere
    /// upstream, or `propagate` not yet run since wiring changed).
    pub fn frequency(&self, id: ClockId) -> Option<u64> {
        self.nodes[id.0].freq_hz
    }

    /// Recomputes every cached frequency from the roots down.
    pub fn propagate(&mut self) {
        for idx in 0..self.nodes.len() {
            self.nodes[idx].freq_hz = self.resolve(ClockId(idx));
        }
    }

    fn resolve(&self, id: ClockId) -> Option<u64> {
        let node = &self.nodes[id.0];
        let input = match (node.external_hz, node.source) {
            (Some(hz), _) => hz,
            (None, Some(src)) => self.resolve(src)?,
            (None, None) => return None,
        };
        Some(((input as u128) * (node.mul as u128) / (node.div as u128)) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_frequency_follows_source_through_mul_div() {
        let mut tree = ClockTree::new();
        let sysclk = tree.add_node("sysclk");
        let refclk = tree.add_node("refclk");

        assert!(!tree.has_source(refclk));

        tree.set_external_frequency(sysclk, 168_000_000);
        tree.set_mul_div(refclk, 1, 8).unwrap();
        tree.set_source(refclk, sysclk).unwrap();
        tree.propagate();

        assert!(tree.has_source(refclk));
        assert_eq!(tree.frequency(sysclk), Some(168_000_000));
        assert_eq!(tree.frequency(refclk), Some(21_000_000));
    }

    #[test]
    fn frequency_is_undefined_without_a_source() {
        let mut tree = ClockTree::new();
        let orphan = tree.add_node("orphan");
        tree.propagate();
        assert_eq!(tree.frequency(orphan), None);
    }

    #[test]
    fn source_change_requires_explicit_propagation() {
        let mut tree = ClockTree::new();
        let root = tree.add_node("root");
        let leaf = tree.add_node("leaf");
        tree.set_source(leaf, root).unwrap();

        tree.set_external_frequency(root, 1_000_000);
        // Cache still stale until propagate.
        assert_eq!(tree.frequency(leaf), None);
        tree.propagate();
        assert_eq!(tree.frequency(leaf), Some(1_000_000));
    }

    #[test]
    fn double_wiring_and_cycles_are_rejected() {
        let mut tree = ClockTree::new();
        let a = tree.add_node("a");
        let b = tree.add_node("b");

        tree.set_source(b, a).unwrap();
        assert!(matches!(
            tree.set_source(b, a),
            Err(ClockError::AlreadyWired { node: "b" })
        ));
        assert!(matches!(
            tree.set_source(a, b),
            Err(ClockError::Cycle { node: "a", .. })
        ));
        assert!(matches!(
            tree.set_mul_div(a, 1, 0),
            Err(ClockError::ZeroDivisor { node: "a" })
        ));
    }
}
