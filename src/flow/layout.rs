//! Auto-layout - BFS columns from the start node
//!
//! Each node's column is its BFS depth from the start node and its row is the
//! order in which it was first visited at that depth. Nodes the traversal never
//! reaches share one extra column after the deepest one.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use super::types::{FlowGraph, Position};
use crate::error::GraphError;

/// Spacing constants for the grid
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    pub base_x: i64,
    pub base_y: i64,
    pub column_gap: i64,
    pub row_gap: i64,
    /// Coordinates snap to multiples of this value
    pub grid: i64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            base_x: 160,
            base_y: 160,
            column_gap: 230,
            row_gap: 180,
            grid: 20,
        }
    }
}

impl LayoutConfig {
    fn snap(&self, value: i64) -> i64 {
        if self.grid <= 0 {
            return value;
        }
        // Ties round to even, like the canvas this grid was designed for
        let steps = (value as f64 / self.grid as f64).round_ties_even() as i64;
        steps * self.grid
    }

    pub fn position(&self, depth: usize, row: usize) -> Position {
        Position::new(
            self.snap(self.base_x + depth as i64 * self.column_gap),
            self.snap(self.base_y + row as i64 * self.row_gap),
        )
    }
}

/// Compute a grid position for every node of `graph`
pub fn layout(graph: &FlowGraph, config: &LayoutConfig) -> BTreeMap<String, Position> {
    let mut positions = BTreeMap::new();
    let Some(start) = graph
        .start_nodes()
        .first()
        .map(|n| n.id.as_str())
        .or_else(|| graph.nodes().first().map(|n| n.id.as_str()))
    else {
        return positions;
    };

    let mut depth_of: HashMap<&str, usize> = HashMap::new();
    let mut rows: HashMap<usize, usize> = HashMap::new();
    let mut queued: HashSet<&str> = HashSet::from([start]);
    let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(start, 0)]);

    while let Some((id, depth)) = queue.pop_front() {
        let row = rows.entry(depth).or_insert(0);
        positions.insert(id.to_string(), config.position(depth, *row));
        *row += 1;
        depth_of.insert(id, depth);

        for conn in graph.outgoing(id) {
            if queued.insert(conn.to.as_str()) {
                queue.push_back((conn.to.as_str(), depth + 1));
            }
        }
    }

    let orphan_depth = depth_of.values().copied().max().unwrap_or(0) + 1;
    let mut orphan_row = 0;
    for node in graph.nodes() {
        if !depth_of.contains_key(node.id.as_str()) {
            positions.insert(node.id.clone(), config.position(orphan_depth, orphan_row));
            orphan_row += 1;
        }
    }

    log::debug!(
        "Laid out {} nodes ({} unreachable)",
        positions.len(),
        orphan_row
    );

    positions
}

/// Compute the layout and store it on the graph's nodes
pub fn apply_layout(graph: &mut FlowGraph, config: &LayoutConfig) -> Result<(), GraphError> {
    for (id, position) in layout(graph, config) {
        graph.set_position(&id, position)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::types::{Node, NodeType, Port};

    fn chain(len: usize) -> FlowGraph {
        let mut graph = FlowGraph::new();
        graph.add_node(Node::new("n0", "Boot", NodeType::Start)).unwrap();
        for i in 1..len {
            let node_type = if i + 1 == len {
                NodeType::EndPass
            } else {
                NodeType::Test
            };
            graph
                .add_node(Node::new(format!("n{}", i), format!("N{}", i), node_type))
                .unwrap();
            graph
                .connect(&format!("n{}", i - 1), &format!("n{}", i), Port::pass())
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_linear_chain_columns() {
        let graph = chain(5);
        let positions = layout(&graph, &LayoutConfig::default());
        let xs: Vec<i64> = (0..5).map(|i| positions[&format!("n{}", i)].x).collect();
        let ys: Vec<i64> = (0..5).map(|i| positions[&format!("n{}", i)].y).collect();

        assert_eq!(xs, vec![160, 400, 620, 840, 1080]);
        assert!(xs.windows(2).all(|w| (w[1] - w[0] - 230).abs() <= 20));
        assert!(ys.iter().all(|y| *y == 160));
    }

    #[test]
    fn test_branches_get_distinct_rows() {
        let mut graph = chain(3);
        graph.add_node(Node::new("f", "Fail", NodeType::EndFail)).unwrap();
        graph.connect("n1", "f", Port::fail()).unwrap();

        let positions = layout(&graph, &LayoutConfig::default());
        assert_eq!(positions["n2"].x, positions["f"].x);
        assert_eq!(positions["n2"].y, 160);
        assert_eq!(positions["f"].y, 340);
    }

    #[test]
    fn test_first_visit_keeps_depth() {
        // n0 -> n1 -> n2 and n0 -> n2: n2 stays in column 1
        let mut graph = chain(3);
        graph.connect("n0", "n2", Port::fail()).unwrap();
        let positions = layout(&graph, &LayoutConfig::default());
        assert_eq!(positions["n1"].x, positions["n2"].x);
        assert_ne!(positions["n1"].y, positions["n2"].y);
    }

    #[test]
    fn test_orphans_in_extra_column() {
        let mut graph = chain(2);
        graph.add_node(Node::new("o1", "O1", NodeType::EndFail)).unwrap();
        graph.add_node(Node::new("o2", "O2", NodeType::EndAbort)).unwrap();

        let positions = layout(&graph, &LayoutConfig::default());
        assert_eq!(positions["o1"].x, 620);
        assert_eq!(positions["o1"].y, 160);
        assert_eq!(positions["o2"].x, 620);
        assert_eq!(positions["o2"].y, 340);
    }

    #[test]
    fn test_no_start_uses_first_node() {
        let mut graph = FlowGraph::new();
        graph.add_node(Node::new("a", "A", NodeType::Test)).unwrap();
        graph.add_node(Node::new("b", "B", NodeType::EndPass)).unwrap();
        graph.connect("a", "b", Port::pass()).unwrap();
        let positions = layout(&graph, &LayoutConfig::default());
        assert_eq!(positions["a"], Position::new(160, 160));
        assert_eq!(positions["b"].x, 400);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut graph = chain(3);
        graph.connect("n1", "n0", Port::fail()).unwrap();
        let positions = layout(&graph, &LayoutConfig::default());
        assert_eq!(positions.len(), 3);
        assert_eq!(positions["n0"].x, 160);
    }

    #[test]
    fn test_apply_layout_sets_positions() {
        let mut graph = chain(2);
        apply_layout(&mut graph, &LayoutConfig::default()).unwrap();
        assert!(graph.nodes().iter().all(|n| n.position.is_some()));
    }

    #[test]
    fn test_empty_graph() {
        assert!(layout(&FlowGraph::new(), &LayoutConfig::default()).is_empty());
    }
}
