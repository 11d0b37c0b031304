use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::mem;

/// How an internal node compares a sample's attribute value with its threshold.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Comparison {
    /// The sample goes right when its value equals the threshold.
    Discrete,
    /// The sample goes right when its value is strictly greater than the threshold.
    Continuous,
}

impl Comparison {
    #[inline]
    pub fn goes_right(&self, value: f32, threshold: f32) -> bool {
        match self {
            Comparison::Discrete => value == threshold,
            Comparison::Continuous => value > threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Discrete => "==",
            Comparison::Continuous => ">",
        }
    }
}

/// The prediction stored in a leaf.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub enum LeafValue {
    /// Most frequent class label, for classification trees.
    Class(i32),
    /// Mean of the training values, for regression trees.
    Value(f32),
}

impl LeafValue {
    /// The leaf as a class label, regression values are truncated.
    pub fn as_class(&self) -> i32 {
        match self {
            LeafValue::Class(c) => *c,
            LeafValue::Value(v) => *v as i32,
        }
    }

    /// The leaf as a continuous value.
    pub fn as_value(&self) -> f32 {
        match self {
            LeafValue::Class(c) => *c as f32,
            LeafValue::Value(v) => *v,
        }
    }
}

impl Display for LeafValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LeafValue::Class(c) => write!(f, "class={}", c),
            LeafValue::Value(v) => write!(f, "value={}", v),
        }
    }
}

/// A node of a binary decision tree. Every node is either a leaf, or a
/// split that owns exactly two children.
///
/// Whole-tree operations (drop, clone, comparison, size and depth queries)
/// walk the tree with an explicit stack, so arbitrarily deep trees are safe.
#[derive(Debug)]
pub enum Node {
    Leaf {
        value: LeafValue,
    },
    Split {
        feature: usize,
        threshold: f32,
        comparison: Comparison,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A node without its children, as it appears in a preorder listing of a tree.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub enum NodeRecord {
    Leaf(LeafValue),
    Split {
        feature: usize,
        threshold: f32,
        comparison: Comparison,
    },
}

/// Preorder iterator over the nodes of a tree, left subtrees first,
/// yielding each node with its depth below the starting node.
pub struct Walk<'a> {
    stack: Vec<(&'a Node, usize)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (&'a Node, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (node, depth) = self.stack.pop()?;
        if let Node::Split { left, right, .. } = node {
            self.stack.push((right.as_ref(), depth + 1));
            self.stack.push((left.as_ref(), depth + 1));
        }
        Some((node, depth))
    }
}

/// One step taken while routing a sample from the root to a leaf.
#[derive(Clone, PartialEq, Debug)]
pub struct Decision {
    pub feature: usize,
    pub name: Option<String>,
    pub value: f32,
    pub comparison: Comparison,
    pub threshold: f32,
    pub went_right: bool,
}

impl Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match &self.name {
            Some(n) => n.clone(),
            None => format!("attribute {}", self.feature + 1),
        };
        write!(
            f,
            "Is {:>20} = {:8.4} {} {:8.4}? {}",
            name,
            self.value,
            self.comparison.symbol(),
            self.threshold,
            if self.went_right { "Yes" } else { "No" }
        )
    }
}

impl Node {
    pub fn leaf(value: LeafValue) -> Self {
        Node::Leaf { value }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Walk the tree with the attribute values of one sample,
    /// returning the value of the leaf it lands in.
    pub fn predict(&self, row: &[f32]) -> LeafValue {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    comparison,
                    left,
                    right,
                } => {
                    node = if comparison.goes_right(row[*feature], *threshold) {
                        right
                    } else {
                        left
                    };
                }
            }
        }
    }

    /// Same as [`Node::predict`], also recording every decision along the way.
    pub fn decision_path(&self, row: &[f32]) -> (Vec<Decision>, LeafValue) {
        let mut path = Vec::new();
        let mut node = self;
        loop {
            match node {
                Node::Leaf { value } => return (path, *value),
                Node::Split {
                    feature,
                    threshold,
                    comparison,
                    left,
                    right,
                } => {
                    let value = row[*feature];
                    let went_right = comparison.goes_right(value, *threshold);
                    path.push(Decision {
                        feature: *feature,
                        name: None,
                        value,
                        comparison: *comparison,
                        threshold: *threshold,
                        went_right,
                    });
                    node = if went_right { right } else { left };
                }
            }
        }
    }

    /// Walk the tree in preorder, left subtrees first.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(self, 0)],
        }
    }

    /// This node without its children.
    pub fn record(&self) -> NodeRecord {
        match self {
            Node::Leaf { value } => NodeRecord::Leaf(*value),
            Node::Split {
                feature,
                threshold,
                comparison,
                ..
            } => NodeRecord::Split {
                feature: *feature,
                threshold: *threshold,
                comparison: *comparison,
            },
        }
    }

    /// Assemble a tree from its preorder listing, where every split is
    /// followed by its left subtree and then its right subtree.
    /// Returns `None` unless the listing describes exactly one tree.
    pub fn from_preorder(records: &[NodeRecord]) -> Option<Node> {
        // Built in reverse, so both subtrees of a split are on the stack when it is reached.
        let mut built: Vec<Node> = Vec::new();
        for record in records.iter().rev() {
            let node = match *record {
                NodeRecord::Leaf(value) => Node::leaf(value),
                NodeRecord::Split {
                    feature,
                    threshold,
                    comparison,
                } => {
                    let left = built.pop()?;
                    let right = built.pop()?;
                    Node::Split {
                        feature,
                        threshold,
                        comparison,
                        left: Box::new(left),
                        right: Box::new(right),
                    }
                }
            };
            built.push(node);
        }
        let root = built.pop()?;
        built.is_empty().then_some(root)
    }

    pub fn n_nodes(&self) -> usize {
        self.walk().count()
    }

    pub fn n_leaves(&self) -> usize {
        self.walk().filter(|(n, _)| n.is_leaf()).count()
    }

    /// Number of splits on the longest path from this node to a leaf.
    pub fn depth(&self) -> usize {
        self.walk().map(|(_, d)| d).max().unwrap_or(0)
    }
}

/// Move the split children of `node` onto `pending`, leaving leaves in their place.
fn detach_splits(node: &mut Node, pending: &mut Vec<Node>) {
    if let Node::Split { left, right, .. } = node {
        for child in [left, right] {
            if !child.is_leaf() {
                pending.push(mem::replace(child.as_mut(), Node::leaf(LeafValue::Class(0))));
            }
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        detach_splits(self, &mut pending);
        while let Some(mut node) = pending.pop() {
            detach_splits(&mut node, &mut pending);
        }
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        let records: Vec<NodeRecord> = self.walk().map(|(n, _)| n.record()).collect();
        Node::from_preorder(&records).expect("the preorder listing of a tree is well formed")
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        let mut a = self.walk();
        let mut b = other.walk();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some((x, _)), Some((y, _))) if x.record() == y.record() => {}
                _ => return false,
            }
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (node, level) in self.walk() {
            let pad = "  ".repeat(level);
            match node {
                Node::Leaf { value } => writeln!(f, "{}leaf:{}", pad, value)?,
                Node::Split {
                    feature,
                    threshold,
                    comparison,
                    ..
                } => writeln!(f, "{}[{} {} {}]", pad, feature, comparison.symbol(), threshold)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Node {
        Node::Split {
            feature: 1,
            threshold: 2.0,
            comparison: Comparison::Continuous,
            left: Box::new(Node::leaf(LeafValue::Class(0))),
            right: Box::new(Node::Split {
                feature: 0,
                threshold: 5.0,
                comparison: Comparison::Discrete,
                left: Box::new(Node::leaf(LeafValue::Class(1))),
                right: Box::new(Node::leaf(LeafValue::Class(2))),
            }),
        }
    }

    #[test]
    fn test_comparison() {
        assert!(Comparison::Discrete.goes_right(1.0, 1.0));
        assert!(!Comparison::Discrete.goes_right(2.0, 1.0));
        assert!(Comparison::Continuous.goes_right(2.0, 1.0));
        assert!(!Comparison::Continuous.goes_right(1.0, 1.0));
    }

    #[test]
    fn test_predict() {
        let tree = stump();
        assert_eq!(tree.predict(&[0.0, 1.0]), LeafValue::Class(0));
        assert_eq!(tree.predict(&[0.0, 2.0]), LeafValue::Class(0));
        assert_eq!(tree.predict(&[0.0, 3.0]), LeafValue::Class(1));
        assert_eq!(tree.predict(&[5.0, 3.0]), LeafValue::Class(2));
    }

    #[test]
    fn test_shape() {
        let tree = stump();
        assert_eq!(tree.n_nodes(), 5);
        assert_eq!(tree.n_leaves(), 3);
        assert_eq!(tree.depth(), 2);
        assert!(!tree.is_leaf());
        assert_eq!(Node::leaf(LeafValue::Value(1.5)).depth(), 0);
    }

    #[test]
    fn test_decision_path() {
        let tree = stump();
        let (path, value) = tree.decision_path(&[5.0, 3.0]);
        assert_eq!(value, LeafValue::Class(2));
        assert_eq!(path.len(), 2);
        assert!(path[0].went_right);
        assert_eq!(path[0].feature, 1);
        assert!(path[1].went_right);
        assert_eq!(path[1].comparison, Comparison::Discrete);
        let line = path[1].to_string();
        assert!(line.contains("attribute 1"));
        assert!(line.contains("=="));
        assert!(line.ends_with("Yes"));
    }

    #[test]
    fn test_display() {
        let s = stump().to_string();
        assert_eq!(s.lines().count(), 5);
        assert!(s.starts_with("[1 > 2]"));
    }

    /// A tree whose right spine holds `len` splits, each with a leaf on the left.
    fn right_chain(len: usize) -> Node {
        let mut node = Node::leaf(LeafValue::Class(-1));
        for i in 0..len {
            node = Node::Split {
                feature: 0,
                threshold: i as f32,
                comparison: Comparison::Continuous,
                left: Box::new(Node::leaf(LeafValue::Class(i as i32))),
                right: Box::new(node),
            };
        }
        node
    }

    #[test]
    fn test_walk_order() {
        let records: Vec<NodeRecord> = stump().walk().map(|(n, _)| n.record()).collect();
        assert_eq!(records[1], NodeRecord::Leaf(LeafValue::Class(0)));
        assert_eq!(records[4], NodeRecord::Leaf(LeafValue::Class(2)));
        let depths: Vec<usize> = stump().walk().map(|(_, d)| d).collect();
        assert_eq!(depths, vec![0, 1, 1, 2, 2]);
        assert_eq!(Node::from_preorder(&records), Some(stump()));
    }

    #[test]
    fn test_from_preorder_rejects_malformed() {
        let split = NodeRecord::Split {
            feature: 0,
            threshold: 1.0,
            comparison: Comparison::Discrete,
        };
        let leaf = NodeRecord::Leaf(LeafValue::Class(1));
        assert_eq!(Node::from_preorder(&[]), None);
        assert_eq!(Node::from_preorder(&[split]), None);
        assert_eq!(Node::from_preorder(&[split, leaf]), None);
        assert_eq!(Node::from_preorder(&[leaf, leaf]), None);
        assert_eq!(Node::from_preorder(&[split, leaf, leaf, leaf]), None);
        assert!(Node::from_preorder(&[split, leaf, leaf]).is_some());
    }

    #[test]
    fn test_deep_chain() {
        let len = 100_000;
        let tree = right_chain(len);
        assert_eq!(tree.depth(), len);
        assert_eq!(tree.n_nodes(), 2 * len + 1);
        assert_eq!(tree.n_leaves(), len + 1);
        assert_eq!(tree.predict(&[-1.0]), LeafValue::Class(len as i32 - 1));
        assert_eq!(tree.predict(&[len as f32]), LeafValue::Class(-1));

        let copy = tree.clone();
        assert_eq!(copy, tree);
        assert_ne!(copy, right_chain(len - 1));
        drop(copy);
        drop(tree);
    }

    #[test]
    fn test_leaf_conversion() {
        assert_eq!(LeafValue::Class(3).as_value(), 3.0);
        assert_eq!(LeafValue::Value(2.5).as_class(), 2);
    }
}
