// Copyright @yucwang 2026

use crate::core::sampler::Sampler;
use crate::guiding::quadtree::QuadTreeNode;
use crate::guiding::DirectionalFilter;
use crate::math::atomic_float::AtomicFloat;
use crate::math::constants::{ Float, Vector2f, FOUR_PI, INV_FOUR_PI };

use std::convert::TryFrom;
use std::fmt;
use std::sync::atomic::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum DTreeError {
    /// A child index no longer fits the 16 bit slots of `QuadTreeNode`.
    NodeIndexExhausted { nodes: usize },
}

impl fmt::Display for DTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DTreeError::NodeIndexExhausted { nodes } =>
                write!(f, "directional tree hit the maximum node count ({} nodes)", nodes),
        }
    }
}

impl std::error::Error for DTreeError {}

/// A directional distribution: a quadtree arena rooted at index 0 plus the
/// running energy sum and statistical weight that normalize it.
#[derive(Debug, Clone)]
pub struct DTree {
    nodes: Vec<QuadTreeNode>,
    sum: AtomicFloat,
    statistical_weight: AtomicFloat,
    max_depth: usize,
}

impl Default for DTree {
    fn default() -> Self {
        Self::new()
    }
}

// Which tree a pending node of `reset` mirrors: the previous iteration's
// tree, or a node freshly created in this one.
#[derive(Clone, Copy)]
enum Source {
    Previous(usize),
    Own(usize),
}

struct StackNode {
    node_index: usize,
    source: Source,
    depth: usize,
}

impl DTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![QuadTreeNode::new()],
            sum: AtomicFloat::default(),
            statistical_weight: AtomicFloat::default(),
            max_depth: 0,
        }
    }

    pub fn node(&self, index: usize) -> &QuadTreeNode {
        &self.nodes[index]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest level created by the last `reset`.
    pub fn depth(&self) -> usize {
        self.max_depth
    }

    pub fn depth_at(&self, p: &Vector2f) -> usize {
        self.nodes[0].depth_at(p, &self.nodes)
    }

    pub fn sum(&self) -> Float {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn statistical_weight(&self) -> Float {
        self.statistical_weight.load(Ordering::Relaxed)
    }

    pub fn set_statistical_weight(&self, statistical_weight: Float) {
        self.statistical_weight.store(statistical_weight, Ordering::Relaxed);
    }

    /// Average radiance over the sphere; 0 until something was recorded.
    pub fn mean(&self) -> Float {
        let statistical_weight = self.statistical_weight();
        if statistical_weight == 0.0 {
            return 0.0;
        }
        self.sum() / (FOUR_PI * statistical_weight)
    }

    pub fn eval(&self, p: &Vector2f) -> Float {
        self.nodes[0].eval(p, &self.nodes)
    }

    pub fn record_irradiance(&self,
                             p: &Vector2f,
                             irradiance: Float,
                             statistical_weight: Float,
                             filter: DirectionalFilter) {
        if !(statistical_weight.is_finite() && statistical_weight > 0.0) {
            return;
        }

        self.statistical_weight.fetch_add(statistical_weight, Ordering::Relaxed);

        if !(irradiance.is_finite() && irradiance > 0.0) {
            return;
        }

        match filter {
            DirectionalFilter::Nearest => {
                self.nodes[0].record(p, irradiance * statistical_weight, &self.nodes);
            }
            DirectionalFilter::Box => {
                // Box of the size of the leaf containing `p`, centered on it.
                let size = (0.5 as Float).powi(self.depth_at(p) as i32);
                let origin = p - Vector2f::new(size / 2.0, size / 2.0);
                self.nodes[0].record_box(&origin,
                                         size,
                                         &Vector2f::new(0.0, 0.0),
                                         1.0,
                                         irradiance * statistical_weight / (size * size),
                                         &self.nodes);
            }
        }
    }

    /// Density per steradian at the canonical point `p`.
    pub fn pdf(&self, p: &Vector2f) -> Float {
        if !(self.mean() > 0.0) {
            return INV_FOUR_PI;
        }
        self.nodes[0].pdf(p, &self.nodes) * INV_FOUR_PI
    }

    /// Canonical point distributed according to the tree.
    pub fn sample(&self, sampler: &mut dyn Sampler) -> Vector2f {
        if !(self.mean() > 0.0) {
            return sampler.get_2d();
        }

        let res = self.nodes[0].sample(sampler, &self.nodes);
        Vector2f::new(res.x.max(0.0).min(1.0), res.y.max(0.0).min(1.0))
    }

    /// Rebuilds the topology from `previous`, subdividing each cell whose
    /// share of `previous`'s energy exceeds `subdivision_threshold`, down to
    /// `max_depth` levels. Energy and weight start from zero afterwards.
    ///
    /// When the arena would outgrow 16 bit child indices, subdivision stops;
    /// the truncated tree stays valid and the error reports it.
    pub fn reset(&mut self,
                 previous: &DTree,
                 max_depth: usize,
                 subdivision_threshold: Float) -> Result<(), DTreeError> {
        self.sum.store(0.0, Ordering::Relaxed);
        self.statistical_weight.store(0.0, Ordering::Relaxed);
        self.max_depth = 0;
        self.nodes.clear();
        self.nodes.push(QuadTreeNode::new());

        let total = previous.sum();
        let mut result = Ok(());
        let mut stack = vec![StackNode { node_index: 0, source: Source::Previous(0), depth: 1 }];

        'outer: while let Some(current) = stack.pop() {
            self.max_depth = self.max_depth.max(current.depth);

            let source_node = match current.source {
                Source::Previous(index) => &previous.nodes[index],
                Source::Own(index) => &self.nodes[index],
            };
            let mut source_sums = [0.0 as Float; 4];
            let mut source_children = [0u16; 4];
            for i in 0..4 {
                source_sums[i] = source_node.sum(i);
                source_children[i] = source_node.child(i);
            }
            let from_previous = matches!(current.source, Source::Previous(_));

            for i in 0..4 {
                let fraction = if total > 0.0 {
                    source_sums[i] / total
                } else {
                    (0.25 as Float).powi(current.depth as i32)
                };

                if current.depth >= max_depth || !(fraction > subdivision_threshold) {
                    continue;
                }

                let new_index = match u16::try_from(self.nodes.len()) {
                    Ok(index) => index,
                    Err(_) => {
                        log::warn!("Directional tree hit the maximum node count, subdivision stops.");
                        result = Err(DTreeError::NodeIndexExhausted { nodes: self.nodes.len() });
                        break 'outer;
                    }
                };

                let source = if from_previous && source_children[i] != 0 {
                    Source::Previous(source_children[i] as usize)
                } else {
                    Source::Own(new_index as usize)
                };
                stack.push(StackNode { node_index: new_index as usize, source, depth: current.depth + 1 });

                self.nodes[current.node_index].set_child(i, new_index);
                let node = QuadTreeNode::new();
                node.set_all_sums(source_sums[i] / 4.0);
                self.nodes.push(node);
            }
        }

        for node in self.nodes.iter() {
            node.set_all_sums(0.0);
        }

        result
    }

    pub fn approx_memory_footprint(&self) -> usize {
        self.nodes.capacity() * std::mem::size_of::<QuadTreeNode>() + std::mem::size_of::<Self>()
    }

    /// Propagates leaf energy up the tree and publishes the new total.
    pub fn build(&mut self) {
        let root = &self.nodes[0];
        root.build(&self.nodes);
        self.sum.store(root.total(), Ordering::Relaxed);
    }
}
