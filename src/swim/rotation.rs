use rand::rngs::StdRng;
use rand::Rng;

use super::member::Node;

/// Round-robin probe-target queue.
///
/// New peers are spliced in at a uniformly random index so every node walks
/// the ring in a different order without an explicit shuffle. The cursor is
/// adjusted on insert and remove so the rotation never skips or repeats a
/// member because the list shifted underneath it.
#[derive(Debug, Default)]
pub(crate) struct PingRotation {
    nodes: Vec<Node>,
    cursor: usize,
}

impl PingRotation {
    pub(crate) fn insert(&mut self, node: Node, rng: &mut StdRng) {
        let at = rng.gen_range(0..=self.nodes.len());
        let had_nodes = !self.nodes.is_empty();
        self.nodes.insert(at, node);
        if had_nodes && at <= self.cursor {
            self.cursor += 1;
        }
    }

    pub(crate) fn remove(&mut self, node: &Node) {
        if let Some(at) = self.nodes.iter().position(|n| n.addr == node.addr) {
            self.nodes.remove(at);
            if at < self.cursor {
                self.cursor -= 1;
            }
            if self.cursor >= self.nodes.len() {
                self.cursor = 0;
            }
        }
    }

    pub(crate) fn next(&mut self) -> Option<Node> {
        if self.nodes.is_empty() {
            return None;
        }
        let node = self.nodes[self.cursor];
        self.cursor = (self.cursor + 1) % self.nodes.len();
        Some(node)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn contains(&self, node: &Node) -> bool {
        self.nodes.iter().any(|n| n.addr == node.addr)
    }
}
