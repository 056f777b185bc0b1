//! Binary decision trees shared by the forest and the boosted ensemble.
//!
//! Nodes live in a flat arena; the root is node 0. Growth replaces a leaf in
//! place with a split and appends its two children, so node ids stay stable
//! while a tree is built.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Rows with `x[feature] <= threshold` go left; everything else,
    /// including NaN, goes right.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// A single-leaf tree.
    pub(crate) fn new(root_value: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf { value: root_value }],
        }
    }

    /// Turn leaf `node` into a split and return the ids of its new children.
    pub(crate) fn split(
        &mut self,
        node: usize,
        feature: usize,
        threshold: f64,
        left_value: f64,
        right_value: f64,
    ) -> (usize, usize) {
        let left = self.nodes.len();
        let right = left + 1;
        self.nodes.push(Node::Leaf { value: left_value });
        self.nodes.push(Node::Leaf { value: right_value });
        self.nodes[node] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        (left, right)
    }

    pub(crate) fn set_leaf_value(&mut self, node: usize, value: f64) {
        if let Node::Leaf { value: v } = &mut self.nodes[node] {
            *v = value;
        }
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Features used by each split node, in node order.
    pub fn split_features(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes.iter().filter_map(|n| match n {
            Node::Split { feature, .. } => Some(*feature),
            Node::Leaf { .. } => None,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_routing() {
        let mut tree = Tree::new(0.0);
        let (left, _right) = tree.split(0, 0, 2.5, -1.0, 1.0);
        tree.split(left, 1, 0.0, -2.0, -0.5);

        assert_eq!(tree.predict_row(array![1.0, -3.0].view()), -2.0);
        assert_eq!(tree.predict_row(array![1.0, 3.0].view()), -0.5);
        assert_eq!(tree.predict_row(array![2.5, 3.0].view()), -0.5);
        assert_eq!(tree.predict_row(array![4.0, 0.0].view()), 1.0);
        assert_eq!(tree.predict_row(array![f64::NAN, 0.0].view()), 1.0);
        assert_eq!(tree.n_leaves(), 3);
        assert_eq!(tree.split_features().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_set_leaf_value_ignores_splits() {
        let mut tree = Tree::new(0.0);
        let (left, right) = tree.split(0, 0, 1.0, 0.0, 0.0);
        tree.set_leaf_value(0, 9.0);
        tree.set_leaf_value(left, 0.25);
        tree.set_leaf_value(right, 0.75);
        assert!(matches!(tree.nodes()[0], Node::Split { .. }));
        assert_eq!(tree.predict_row(array![0.0].view()), 0.25);
    }
}
