//! Codec
//!
//! Portable binary model format. All integers and floats are little endian.
//!
//! ```text
//! magic            4 bytes, "SPLT"
//! version          u32
//! tree type        u32, 0 classifier, 1 regressor
//! criterion        u32
//! discrete thresh  u32
//! max depth        u32
//! max workers      u32
//! num features     u32
//! names flag       u32, 1 when names follow
//! names            num features times: u32 byte length, utf8 bytes (length 0 for a missing name)
//! node count       u32
//! nodes            node count records in preorder:
//!                    threshold f32, feature i32 (-1 for a leaf),
//!                    comparison i32 (1 equality, 0 greater than, -1 for a leaf),
//!                    leaf value i32 class or f32 value per tree type (0 for a split)
//! inorder          node count u32, the preorder position of each node in inorder
//! ```
//!
//! The preorder and inorder sequences together determine the shape of the tree.
use crate::config::{SplitCriterion, TrainConfig, TreeType};
use crate::errors::SaplingError;
use crate::node::{Comparison, LeafValue, Node, NodeRecord};
use crate::tree::DecisionTree;

pub const MAGIC: &[u8; 4] = b"SPLT";
pub const FORMAT_VERSION: u32 = 1;

const LEAF_FEATURE: i32 = -1;
const LEAF_COMPARISON: i32 = -1;
const DISCRETE: i32 = 1;
const CONTINUOUS: i32 = 0;

fn invalid<T>(msg: impl Into<String>) -> Result<T, SaplingError> {
    Err(SaplingError::InvalidModel(msg.into()))
}

fn to_u32(value: usize, what: &str) -> Result<u32, SaplingError> {
    u32::try_from(value).map_err(|_| SaplingError::InvalidModel(format!("{} {} does not fit in 32 bits", what, value)))
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SaplingError> {
        if self.buf.len() - self.pos < n {
            return invalid(format!("unexpected end of data at byte {}", self.pos));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn word(&mut self) -> Result<[u8; 4], SaplingError> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(word)
    }

    fn u32(&mut self) -> Result<u32, SaplingError> {
        Ok(u32::from_le_bytes(self.word()?))
    }

    fn usize(&mut self) -> Result<usize, SaplingError> {
        Ok(self.u32()? as usize)
    }

    fn i32(&mut self) -> Result<i32, SaplingError> {
        Ok(i32::from_le_bytes(self.word()?))
    }

    fn f32(&mut self) -> Result<f32, SaplingError> {
        Ok(f32::from_le_bytes(self.word()?))
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

enum Visit<'a> {
    Enter(&'a Node),
    Emit(usize),
}

/// The preorder records of a tree, and the preorder position of each node in inorder.
fn flatten(root: &Node) -> (Vec<NodeRecord>, Vec<usize>) {
    let mut preorder = Vec::new();
    let mut inorder = Vec::new();
    let mut stack = vec![Visit::Enter(root)];
    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Emit(position) => inorder.push(position),
            Visit::Enter(node) => {
                let position = preorder.len();
                preorder.push(node.record());
                match node {
                    Node::Leaf { .. } => inorder.push(position),
                    Node::Split { left, right, .. } => {
                        stack.push(Visit::Enter(right));
                        stack.push(Visit::Emit(position));
                        stack.push(Visit::Enter(left));
                    }
                }
            }
        }
    }
    (preorder, inorder)
}

fn write_record(w: &mut Writer, record: &NodeRecord, tree_type: TreeType) -> Result<(), SaplingError> {
    match record {
        NodeRecord::Leaf(value) => {
            w.f32(0.0);
            w.i32(LEAF_FEATURE);
            w.i32(LEAF_COMPARISON);
            match tree_type {
                TreeType::Classifier => w.i32(value.as_class()),
                TreeType::Regressor => w.f32(value.as_value()),
            }
        }
        NodeRecord::Split {
            feature,
            threshold,
            comparison,
        } => {
            let feature = i32::try_from(*feature)
                .map_err(|_| SaplingError::InvalidModel(format!("attribute index {} does not fit in 32 bits", feature)))?;
            w.f32(*threshold);
            w.i32(feature);
            w.i32(match comparison {
                Comparison::Discrete => DISCRETE,
                Comparison::Continuous => CONTINUOUS,
            });
            w.i32(0);
        }
    }
    Ok(())
}

/// Encode a tree, trained or not, in the binary model format.
pub fn to_bytes(tree: &DecisionTree) -> Result<Vec<u8>, SaplingError> {
    let config = tree.config();
    let mut w = Writer { buf: Vec::new() };
    w.buf.extend_from_slice(MAGIC);
    w.u32(FORMAT_VERSION);

    w.u32(config.tree_type.code());
    w.u32(config.criterion.code());
    w.u32(to_u32(config.discrete_threshold, "discrete threshold")?);
    w.u32(to_u32(config.max_depth, "max depth")?);
    w.u32(to_u32(config.max_workers, "max workers")?);
    w.u32(to_u32(tree.num_features(), "attribute count")?);

    match tree.feature_names() {
        Some(names) => {
            w.u32(1);
            for name in names {
                let bytes = name.as_deref().unwrap_or("").as_bytes();
                w.u32(to_u32(bytes.len(), "name length")?);
                w.buf.extend_from_slice(bytes);
            }
        }
        None => w.u32(0),
    }

    let (preorder, inorder) = tree.root().map(flatten).unwrap_or_default();
    w.u32(to_u32(preorder.len(), "node count")?);
    for record in &preorder {
        write_record(&mut w, record, config.tree_type)?;
    }
    for position in inorder {
        w.u32(to_u32(position, "node position")?);
    }
    Ok(w.buf)
}

fn read_record(r: &mut Reader, tree_type: TreeType, num_features: usize) -> Result<NodeRecord, SaplingError> {
    let threshold = r.f32()?;
    let feature = r.i32()?;
    let comparison = r.i32()?;
    let leaf = r.word()?;
    match (feature, comparison) {
        (LEAF_FEATURE, LEAF_COMPARISON) => Ok(NodeRecord::Leaf(match tree_type {
            TreeType::Classifier => LeafValue::Class(i32::from_le_bytes(leaf)),
            TreeType::Regressor => LeafValue::Value(f32::from_le_bytes(leaf)),
        })),
        (f, c) if f >= 0 && (c == DISCRETE || c == CONTINUOUS) => {
            let feature = f as usize;
            if feature >= num_features {
                return invalid(format!(
                    "split on attribute {} of a tree with {} attributes",
                    feature, num_features
                ));
            }
            Ok(NodeRecord::Split {
                feature,
                threshold,
                comparison: if c == DISCRETE {
                    Comparison::Discrete
                } else {
                    Comparison::Continuous
                },
            })
        }
        (f, c) => invalid(format!("malformed node record, attribute {} and comparison {}", f, c)),
    }
}

/// Rebuild a tree from its preorder records and the preorder position of
/// each node in inorder. The first record of a preorder range is the root of
/// that subtree; the number of inorder entries before the root is the size of
/// its left subtree, which splits both ranges into the two child subtrees.
fn rebuild(preorder: &[NodeRecord], inorder: &[usize]) -> Result<Node, SaplingError> {
    let n = preorder.len();
    if n == 0 || inorder.len() != n {
        return invalid(format!("{} preorder records and {} inorder positions", n, inorder.len()));
    }
    // Index of every preorder position within the inorder sequence.
    let mut inorder_index = vec![usize::MAX; n];
    for (i, &position) in inorder.iter().enumerate() {
        if position >= n {
            return invalid(format!("inorder position {} out of range", position));
        }
        if inorder_index[position] != usize::MAX {
            return invalid(format!("node {} appears twice in the inorder sequence", position));
        }
        inorder_index[position] = i;
    }

    // Children of every split, found from (preorder start, inorder start, length) ranges.
    let mut children: Vec<Option<(usize, usize)>> = vec![None; n];
    let mut ranges = vec![(0, 0, n)];
    while let Some((root, first, len)) = ranges.pop() {
        let at = inorder_index[root];
        if at < first || at >= first + len {
            return invalid(format!("node {} is outside its subtree in the inorder sequence", root));
        }
        let left_len = at - first;
        let right_len = len - left_len - 1;
        match preorder[root] {
            NodeRecord::Leaf(_) => {
                if len != 1 {
                    return invalid(format!("leaf {} has children", root));
                }
            }
            NodeRecord::Split { .. } => {
                if left_len == 0 || right_len == 0 {
                    return invalid(format!("split {} is missing a child", root));
                }
                let right = root + 1 + left_len;
                children[root] = Some((root + 1, right));
                ranges.push((root + 1, first, left_len));
                ranges.push((right, at + 1, right_len));
            }
        }
    }

    // Children follow their parent in preorder, so build from the back.
    let mut built: Vec<Option<Node>> = (0..n).map(|_| None).collect();
    for i in (0..n).rev() {
        let node = match (preorder[i], children[i]) {
            (NodeRecord::Leaf(value), _) => Node::leaf(value),
            (
                NodeRecord::Split {
                    feature,
                    threshold,
                    comparison,
                },
                Some((l, r)),
            ) => match (built[l].take(), built[r].take()) {
                (Some(left), Some(right)) => Node::Split {
                    feature,
                    threshold,
                    comparison,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                _ => return invalid(format!("split {} shares a child", i)),
            },
            (NodeRecord::Split { .. }, None) => return invalid(format!("split {} is not part of the tree", i)),
        };
        built[i] = Some(node);
    }
    match built[0].take() {
        Some(root) => Ok(root),
        None => invalid("missing root"),
    }
}

/// Decode a tree from the binary model format.
pub fn from_bytes(bytes: &[u8]) -> Result<DecisionTree, SaplingError> {
    let mut r = Reader { buf: bytes, pos: 0 };
    if r.take(MAGIC.len())? != MAGIC {
        return invalid("not a decision tree model");
    }
    let version = r.u32()?;
    if version != FORMAT_VERSION {
        return invalid(format!("unsupported format version {}, expected {}", version, FORMAT_VERSION));
    }

    let code = r.u32()?;
    let Some(tree_type) = TreeType::from_code(code) else {
        return invalid(format!("unknown tree type {}", code));
    };
    let code = r.u32()?;
    let Some(criterion) = SplitCriterion::from_code(code) else {
        return invalid(format!("unknown split criterion {}", code));
    };
    let config = TrainConfig {
        tree_type,
        criterion,
        discrete_threshold: r.usize()?,
        max_depth: r.usize()?,
        max_workers: r.usize()?,
    };

    let num_features = r.usize()?;
    let feature_names = match r.u32()? {
        0 => None,
        1 => {
            let mut names = Vec::with_capacity(num_features.min(r.remaining() / 4));
            for _ in 0..num_features {
                let len = r.usize()?;
                let name = std::str::from_utf8(r.take(len)?)
                    .map_err(|e| SaplingError::InvalidModel(format!("attribute name is not utf8: {}", e)))?;
                names.push((!name.is_empty()).then(|| name.to_string()));
            }
            Some(names)
        }
        flag => return invalid(format!("unknown names flag {}", flag)),
    };

    let n_nodes = r.usize()?;
    // Each node takes a 16 byte record and a 4 byte inorder entry.
    if r.remaining() / 20 < n_nodes {
        return invalid(format!("{} nodes declared, the data is too short", n_nodes));
    }
    let mut preorder = Vec::with_capacity(n_nodes);
    for _ in 0..n_nodes {
        preorder.push(read_record(&mut r, tree_type, num_features)?);
    }
    let mut inorder = Vec::with_capacity(n_nodes);
    for _ in 0..n_nodes {
        inorder.push(r.usize()?);
    }
    if r.remaining() != 0 {
        return invalid(format!("{} trailing bytes", r.remaining()));
    }

    let root = if n_nodes == 0 {
        None
    } else {
        Some(rebuild(&preorder, &inorder)?)
    };
    DecisionTree::from_parts(config, num_features, feature_names, root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> DecisionTree {
        let root = Node::Split {
            feature: 1,
            threshold: 2.5,
            comparison: Comparison::Continuous,
            left: Box::new(Node::leaf(LeafValue::Class(-3))),
            right: Box::new(Node::Split {
                feature: 0,
                threshold: 1.0,
                comparison: Comparison::Discrete,
                left: Box::new(Node::leaf(LeafValue::Class(7))),
                right: Box::new(Node::leaf(LeafValue::Class(9))),
            }),
        };
        let names = Some(vec![Some("outlook".to_string()), None]);
        DecisionTree::from_parts(TrainConfig::default(), 2, names, Some(root)).unwrap()
    }

    /// Offset of the first node record in the encoding of `sample_tree`.
    fn nodes_offset() -> usize {
        // magic, version, 5 config words, features, flag, 2 names, node count
        4 + 4 + 5 * 4 + 4 + 4 + (4 + "outlook".len()) + 4 + 4
    }

    #[test]
    fn test_layout() {
        let bytes = to_bytes(&sample_tree()).unwrap();
        assert_eq!(&bytes[..4], b"SPLT");
        assert_eq!(bytes.len(), nodes_offset() + 5 * 16 + 5 * 4);
        let count = nodes_offset() - 4;
        assert_eq!(bytes[count..count + 4], 5u32.to_le_bytes());

        // Preorder is root, leaf -3, split, leaf 7, leaf 9. Inorder visits
        // leaf -3, root, leaf 7, split, leaf 9.
        let inorder: Vec<u32> = bytes[bytes.len() - 20..]
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(inorder, vec![1, 0, 3, 2, 4]);

        let first = nodes_offset();
        assert_eq!(bytes[first..first + 4], 2.5f32.to_le_bytes());
        assert_eq!(bytes[first + 4..first + 8], 1i32.to_le_bytes());
        assert_eq!(bytes[first + 8..first + 12], CONTINUOUS.to_le_bytes());
        let leaf = first + 16;
        assert_eq!(bytes[leaf + 4..leaf + 8], (-1i32).to_le_bytes());
        assert_eq!(bytes[leaf + 12..leaf + 16], (-3i32).to_le_bytes());
    }

    #[test]
    fn test_round_trip() {
        let tree = sample_tree();
        let decoded = from_bytes(&to_bytes(&tree).unwrap()).unwrap();
        assert_eq!(decoded, tree);
        assert_eq!(decoded.predict_class(&[1.0, 3.0]), 9);
        assert_eq!(decoded.feature_name(0), Some("outlook"));
        assert_eq!(decoded.feature_name(1), None);
    }

    #[test]
    fn test_round_trip_regressor_and_untrained() {
        let root = Node::Split {
            feature: 0,
            threshold: -0.75,
            comparison: Comparison::Continuous,
            left: Box::new(Node::leaf(LeafValue::Value(0.1))),
            right: Box::new(Node::leaf(LeafValue::Value(f32::MAX))),
        };
        let config = TrainConfig::regressor().set_max_depth(3).set_max_workers(4);
        let tree = DecisionTree::from_parts(config, 1, None, Some(root)).unwrap();
        assert_eq!(from_bytes(&to_bytes(&tree).unwrap()).unwrap(), tree);

        let untrained = DecisionTree::new(3, None).unwrap();
        let decoded = from_bytes(&to_bytes(&untrained).unwrap()).unwrap();
        assert!(!decoded.is_trained());
        assert_eq!(decoded, untrained);
    }

    #[test]
    fn test_rejects_corrupt_header() {
        let bytes = to_bytes(&sample_tree()).unwrap();
        assert!(matches!(from_bytes(&bytes[..3]), Err(SaplingError::InvalidModel(..))));
        assert!(from_bytes(b"XXXX").is_err());

        let mut wrong_version = bytes.clone();
        wrong_version[4] = 9;
        assert!(from_bytes(&wrong_version).is_err());

        let mut wrong_type = bytes.clone();
        wrong_type[8] = 5;
        assert!(from_bytes(&wrong_type).is_err());

        for cut in [10, 40, bytes.len() - 1] {
            assert!(from_bytes(&bytes[..cut]).is_err());
        }
        let mut trailing = bytes;
        trailing.push(0);
        assert!(from_bytes(&trailing).is_err());
    }

    #[test]
    fn test_rejects_inconsistent_nodes() {
        let bytes = to_bytes(&sample_tree()).unwrap();
        let inorder = bytes.len() - 20;

        // A leaf given children.
        let mut swapped = bytes.clone();
        swapped[inorder..inorder + 4].copy_from_slice(&0u32.to_le_bytes());
        swapped[inorder + 4..inorder + 8].copy_from_slice(&1u32.to_le_bytes());
        assert!(from_bytes(&swapped).is_err());

        // A position out of range.
        let mut out_of_range = bytes.clone();
        out_of_range[inorder..inorder + 4].copy_from_slice(&5u32.to_le_bytes());
        assert!(from_bytes(&out_of_range).is_err());

        // The same node listed twice.
        let mut repeated = bytes.clone();
        repeated[inorder + 16..inorder + 20].copy_from_slice(&1u32.to_le_bytes());
        assert!(from_bytes(&repeated).is_err());

        // A split on an attribute the tree does not have.
        let mut bad_feature = bytes.clone();
        let first = nodes_offset();
        bad_feature[first + 4..first + 8].copy_from_slice(&2i32.to_le_bytes());
        assert!(from_bytes(&bad_feature).is_err());

        // A leaf marker on an internal node.
        let mut bad_marker = bytes;
        bad_marker[first + 8..first + 12].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(from_bytes(&bad_marker).is_err());
    }

    #[test]
    fn test_deep_chain_round_trip() {
        let splits = 20_000;
        let mut root = Node::leaf(LeafValue::Value(-1.0));
        for i in 0..splits {
            root = Node::Split {
                feature: 0,
                threshold: i as f32,
                comparison: Comparison::Continuous,
                left: Box::new(Node::leaf(LeafValue::Value(i as f32))),
                right: Box::new(root),
            };
        }
        let config = TrainConfig::regressor().set_max_depth(splits);
        let tree = DecisionTree::from_parts(config, 1, None, Some(root)).unwrap();
        let bytes = to_bytes(&tree).unwrap();

        let decoded = from_bytes(&bytes).unwrap();
        assert_eq!(decoded.n_nodes(), 2 * splits + 1);
        assert_eq!(decoded.depth(), splits);
        assert_eq!(decoded.predict_value(&[splits as f32]), -1.0);
        assert_eq!(to_bytes(&decoded).unwrap(), bytes);
        assert!(decoded == tree);
    }

    #[test]
    fn test_rebuild_matches_flatten() {
        let tree = sample_tree();
        let (preorder, inorder) = flatten(tree.root().unwrap());
        assert_eq!(inorder, vec![1, 0, 3, 2, 4]);
        assert!(rebuild(&preorder, &inorder).unwrap() == *tree.root().unwrap());
        assert!(rebuild(&preorder, &inorder[..4]).is_err());
        assert!(rebuild(&[], &[]).is_err());
    }
}
