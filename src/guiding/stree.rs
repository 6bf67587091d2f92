// Copyright @yucwang 2026

use crate::core::sampler::Sampler;
use crate::guiding::wrapper::{ DTreeRecord, DTreeWrapper };
use crate::guiding::{ BsdfSamplingFractionLoss, DirectionalFilter, SpatialFilter };
use crate::math::aabb::AABB;
use crate::math::constants::{ Float, Vector3f };

use std::collections::VecDeque;
use std::convert::TryFrom;
use std::thread;

#[derive(Debug, Clone)]
enum Content {
    Leaf(DTreeWrapper),
    Interior { children: [u32; 2] },
}

/// Binary node of the spatial tree. Interior nodes split their box in half
/// along `axis`; children split along the next axis.
#[derive(Debug, Clone)]
pub struct STreeNode {
    axis: usize,
    content: Content,
}

impl STreeNode {
    fn leaf(axis: usize, wrapper: DTreeWrapper) -> Self {
        Self { axis, content: Content::Leaf(wrapper) }
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.content, Content::Leaf(_))
    }

    pub fn dtree_wrapper(&self) -> Option<&DTreeWrapper> {
        match &self.content {
            Content::Leaf(wrapper) => Some(wrapper),
            Content::Interior { .. } => None,
        }
    }

    fn dtree_wrapper_mut(&mut self) -> Option<&mut DTreeWrapper> {
        match &mut self.content {
            Content::Leaf(wrapper) => Some(wrapper),
            Content::Interior { .. } => None,
        }
    }

    pub fn children(&self) -> Option<[usize; 2]> {
        match &self.content {
            Content::Leaf(_) => None,
            Content::Interior { children } => Some([children[0] as usize, children[1] as usize]),
        }
    }

    /// Child half containing the normalized point `p`, and `p` rescaled
    /// into that half.
    pub fn child_index(&self, p: &Vector3f) -> (usize, Vector3f) {
        let mut local = *p;
        if local[self.axis] < 0.5 {
            local[self.axis] *= 2.0;
            (0, local)
        } else {
            local[self.axis] = (local[self.axis] - 0.5) * 2.0;
            (1, local)
        }
    }

    fn child_bounds(&self, bounds: &AABB, index: usize) -> AABB {
        let mut child = *bounds;
        let mid = 0.5 * (bounds.p_min[self.axis] + bounds.p_max[self.axis]);
        if index == 0 {
            child.p_max[self.axis] = mid;
        } else {
            child.p_min[self.axis] = mid;
        }
        child
    }

    fn record(&self,
              filter_box: &AABB,
              node_box: &AABB,
              rec: &DTreeRecord,
              directional_filter: DirectionalFilter,
              loss: BsdfSamplingFractionLoss,
              nodes: &[STreeNode]) {
        let w = filter_box.overlap_volume(node_box);
        if !(w > 0.0) {
            return;
        }

        match &self.content {
            Content::Leaf(wrapper) => {
                let mut weighted = *rec;
                weighted.statistical_weight *= w;
                wrapper.record(&weighted, directional_filter, loss);
            }
            Content::Interior { children } => {
                for (i, child) in children.iter().enumerate() {
                    nodes[*child as usize].record(filter_box,
                                                  &self.child_bounds(node_box, i),
                                                  rec,
                                                  directional_filter,
                                                  loss,
                                                  nodes);
                }
            }
        }
    }
}

/// Spatial binary tree over a cube enclosing the scene. Each leaf (voxel)
/// owns the directional distribution used to guide paths inside it.
#[derive(Debug, Clone)]
pub struct STree {
    nodes: Vec<STreeNode>,
    aabb: AABB,
}

impl STree {
    pub fn new(scene_bounds: &AABB) -> Self {
        Self {
            nodes: vec![STreeNode::leaf(0, DTreeWrapper::new())],
            aabb: scene_bounds.bounding_cube(),
        }
    }

    pub fn aabb(&self) -> &AABB {
        &self.aabb
    }

    pub fn node(&self, index: usize) -> &STreeNode {
        &self.nodes[index]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_leaf()).count()
    }

    /// Splits a leaf in two along the next axis. Both children start from a
    /// copy of the leaf's distributions with half its building weight.
    /// Returns false when the node is not a leaf or indices ran out.
    pub fn subdivide(&mut self, node_index: usize) -> bool {
        if !self.nodes[node_index].is_leaf() {
            return false;
        }

        let first = self.nodes.len();
        let children = match (u32::try_from(first), u32::try_from(first + 1)) {
            (Ok(left), Ok(right)) => [left, right],
            _ => {
                log::warn!("Spatial tree hit the maximum node count, node {} stays a leaf.", node_index);
                return false;
            }
        };

        let axis = (self.nodes[node_index].axis + 1) % 3;
        let parent = std::mem::replace(&mut self.nodes[node_index].content, Content::Interior { children });
        let wrapper = match parent {
            Content::Leaf(wrapper) => wrapper,
            Content::Interior { .. } => return false,
        };

        let halved_weight = wrapper.statistical_weight_building() / 2.0;
        wrapper.set_statistical_weight_building(halved_weight);
        self.nodes.push(STreeNode::leaf(axis, wrapper.clone()));
        self.nodes.push(STreeNode::leaf(axis, wrapper));
        true
    }

    pub fn subdivide_all(&mut self) {
        let num_nodes = self.nodes.len();
        for i in 0..num_nodes {
            if self.nodes[i].is_leaf() {
                self.subdivide(i);
            }
        }
    }

    /// Voxel containing `p`, together with the voxel's extent.
    pub fn dtree_wrapper_with_size(&self, p: &Vector3f) -> (&DTreeWrapper, Vector3f) {
        let mut size = self.aabb.diagonal();
        let mut local = (p - self.aabb.p_min).component_div(&size);
        let mut index = 0;

        loop {
            let node = &self.nodes[index];
            match &node.content {
                Content::Leaf(wrapper) => return (wrapper, size),
                Content::Interior { children } => {
                    size[node.axis] /= 2.0;
                    let (child, next) = node.child_index(&local);
                    local = next;
                    index = children[child] as usize;
                }
            }
        }
    }

    pub fn dtree_wrapper(&self, p: &Vector3f) -> &DTreeWrapper {
        self.dtree_wrapper_with_size(p).0
    }

    pub fn depth_at(&self, p: &Vector3f) -> usize {
        let mut local = (p - self.aabb.p_min).component_div(&self.aabb.diagonal());
        let mut index = 0;
        let mut depth = 1;
        while let Some(children) = self.nodes[index].children() {
            let (child, next) = self.nodes[index].child_index(&local);
            local = next;
            index = children[child];
            depth += 1;
        }
        depth
    }

    pub fn depth(&self) -> usize {
        let mut result = 0;
        let mut stack = vec![(0usize, 1usize)];
        while let Some((index, depth)) = stack.pop() {
            result = result.max(depth);
            if let Some(children) = self.nodes[index].children() {
                stack.push((children[0], depth + 1));
                stack.push((children[1], depth + 1));
            }
        }
        result
    }

    pub fn dtree_wrappers(&self) -> impl Iterator<Item = &DTreeWrapper> {
        self.nodes.iter().filter_map(|node| node.dtree_wrapper())
    }

    /// Visits every voxel with the minimum corner and extent of its box.
    pub fn for_each_leaf<F>(&self, mut f: F)
        where F: FnMut(&DTreeWrapper, &Vector3f, &Vector3f) {
        let mut stack = vec![(0usize, self.aabb)];
        while let Some((index, bounds)) = stack.pop() {
            let node = &self.nodes[index];
            match &node.content {
                Content::Leaf(wrapper) => f(wrapper, &bounds.p_min, &bounds.diagonal()),
                Content::Interior { children } => {
                    for (i, child) in children.iter().enumerate() {
                        stack.push((*child as usize, node.child_bounds(&bounds, i)));
                    }
                }
            }
        }
    }

    /// Applies `f` to every voxel, spread over all available cores.
    pub fn for_each_dtree_wrapper_parallel<F>(&mut self, f: F)
        where F: Fn(&mut DTreeWrapper) + Sync {
        let mut leaves: Vec<&mut DTreeWrapper> = self.nodes
            .iter_mut()
            .filter_map(|node| node.dtree_wrapper_mut())
            .collect();
        if leaves.is_empty() {
            return;
        }

        let thread_count = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let chunk_size = (leaves.len() + thread_count - 1) / thread_count;
        let f = &f;

        thread::scope(|scope| {
            for chunk in leaves.chunks_mut(chunk_size) {
                scope.spawn(move || {
                    for wrapper in chunk.iter_mut() {
                        f(&mut **wrapper);
                    }
                });
            }
        });
    }

    /// Deposits `rec` into every voxel overlapping the box of extent
    /// `voxel_size` centered at `p`, weighted by the overlapping volume.
    pub fn record(&self,
                  p: &Vector3f,
                  voxel_size: &Vector3f,
                  rec: &DTreeRecord,
                  directional_filter: DirectionalFilter,
                  loss: BsdfSamplingFractionLoss) {
        let volume = voxel_size.x * voxel_size.y * voxel_size.z;
        let mut normalized = *rec;
        normalized.statistical_weight /= volume;

        let half = *voxel_size * 0.5;
        let filter_box = AABB { p_min: p - half, p_max: p + half };
        self.nodes[0].record(&filter_box, &self.aabb, &normalized, directional_filter, loss, &self.nodes);
    }

    /// Records `rec` according to `spatial_filter`. `voxel_size` is the
    /// extent of the voxel `p` was looked up in.
    pub fn splat(&self,
                 p: &Vector3f,
                 voxel_size: &Vector3f,
                 rec: &DTreeRecord,
                 spatial_filter: SpatialFilter,
                 directional_filter: DirectionalFilter,
                 loss: BsdfSamplingFractionLoss,
                 sampler: &mut dyn Sampler) {
        match spatial_filter {
            SpatialFilter::Nearest => {
                self.dtree_wrapper(p).record(rec, directional_filter, loss);
            }
            SpatialFilter::StochasticBox => {
                let mut offset = *voxel_size;
                for i in 0..3 {
                    offset[i] *= sampler.get_1d() - 0.5;
                }
                let origin = self.aabb.clip(&(p + offset));
                self.dtree_wrapper(&origin).record(rec, directional_filter, loss);
            }
            SpatialFilter::Box => {
                self.record(p, voxel_size, rec, directional_filter, loss);
            }
        }
    }

    /// Breadth-first pass splitting every voxel whose building weight
    /// exceeds `threshold`, children included. Stops quietly once the
    /// estimated footprint reaches `max_memory_mb`.
    pub fn refine(&mut self, threshold: Float, max_memory_mb: Option<usize>) {
        let budget = max_memory_mb.map(|mb| mb.saturating_mul(1_000_000));
        let mut footprint: usize = self.dtree_wrappers()
            .map(|wrapper| wrapper.approx_memory_footprint())
            .sum();

        let mut splits = 0;
        let mut queue = VecDeque::new();
        queue.push_back(0usize);

        while let Some(index) = queue.pop_front() {
            if let Some(budget) = budget {
                if footprint >= budget {
                    log::debug!("Spatial refinement stopped at the memory budget ({} bytes).", footprint);
                    break;
                }
            }

            let leaf_footprint = match self.nodes[index].dtree_wrapper() {
                Some(wrapper) if wrapper.statistical_weight_building() > threshold =>
                    Some(wrapper.approx_memory_footprint()),
                _ => None,
            };
            if let Some(leaf_footprint) = leaf_footprint {
                if self.subdivide(index) {
                    footprint += leaf_footprint;
                    splits += 1;
                }
            }

            if let Some(children) = self.nodes[index].children() {
                queue.extend(children.iter().copied());
            }
        }

        log::info!("Spatial tree refined: {} splits, {} voxels, depth {}.",
                   splits, self.num_leaves(), self.depth());
    }
}

#[cfg(test)]
mod tests {
    use super::STree;
    use crate::core::rng::LcgRng;
    use crate::core::sampler::Sampler;
    use crate::guiding::config::GuidingConfig;
    use crate::guiding::wrapper::DTreeRecord;
    use crate::guiding::{ BsdfSamplingFractionLoss, DirectionalFilter, SpatialFilter };
    use crate::math::aabb::AABB;
    use crate::math::constants::{ Float, Vector3f };

    use std::sync::atomic::{ AtomicUsize, Ordering };

    fn unit_tree() -> STree {
        STree::new(&AABB::new(Vector3f::new(0.0, 0.0, 0.0), Vector3f::new(1.0, 1.0, 1.0)))
    }

    fn record(weight: Float) -> DTreeRecord {
        DTreeRecord {
            d: Vector3f::new(0.0, 0.0, 1.0),
            radiance: 1.0,
            product: 0.0,
            wo_pdf: 1.0,
            bsdf_pdf: 0.0,
            dtree_pdf: 0.0,
            statistical_weight: weight,
            is_delta: false,
        }
    }

    fn record_nearest(tree: &STree, p: &Vector3f) {
        tree.dtree_wrapper(p).record(&record(1.0), DirectionalFilter::Nearest, BsdfSamplingFractionLoss::None);
    }

    #[test]
    fn test_root_is_cube() {
        let tree = STree::new(&AABB::new(Vector3f::new(-1.0, 0.0, 0.0), Vector3f::new(1.0, 0.5, 0.25)));
        let size = tree.aabb().diagonal();
        assert_eq!(size, Vector3f::new(2.0, 2.0, 2.0));
        assert_eq!(tree.num_leaves(), 1);

        let (_, voxel) = tree.dtree_wrapper_with_size(&Vector3f::new(0.0, 0.1, 0.1));
        assert_eq!(voxel, size);
    }

    #[test]
    fn test_subdivide_halves_building_weight() {
        let mut tree = unit_tree();
        for _ in 0..100 {
            record_nearest(&tree, &Vector3f::new(0.5, 0.5, 0.5));
        }
        assert!(tree.subdivide(0));
        assert!(!tree.subdivide(0));
        assert_eq!(tree.num_nodes(), 3);

        let left = tree.dtree_wrapper(&Vector3f::new(0.25, 0.5, 0.5));
        let right = tree.dtree_wrapper(&Vector3f::new(0.75, 0.5, 0.5));
        assert!(!std::ptr::eq(left, right));
        assert!((left.statistical_weight_building() - 50.0).abs() < 1e-4);
        assert!((right.statistical_weight_building() - 50.0).abs() < 1e-4);
        assert_eq!(tree.node(1).axis(), 1);
        assert!(tree.node(0).dtree_wrapper().is_none());
    }

    #[test]
    fn test_axis_rotates_with_depth() {
        let mut tree = unit_tree();
        for _ in 0..3 {
            tree.subdivide_all();
        }
        assert_eq!(tree.num_leaves(), 8);
        assert_eq!(tree.depth(), 4);
        tree.for_each_leaf(|_, _, size| {
            assert!((size - Vector3f::new(0.5, 0.5, 0.5)).norm() < 1e-6);
        });

        let (_, voxel) = tree.dtree_wrapper_with_size(&Vector3f::new(0.9, 0.1, 0.6));
        assert!((voxel - Vector3f::new(0.5, 0.5, 0.5)).norm() < 1e-6);
        assert_eq!(tree.depth_at(&Vector3f::new(0.9, 0.1, 0.6)), 4);
    }

    #[test]
    fn test_refine_partitions_the_cube() {
        let mut tree = unit_tree();
        let mut rng = LcgRng::new(21);
        for _ in 0..4000 {
            // Denser towards the origin corner.
            let u = rng.get_1d();
            let p = Vector3f::new(u * u, rng.get_1d() * u, rng.get_1d());
            record_nearest(&tree, &p);
        }
        tree.refine(200.0, None);
        assert!(tree.num_leaves() > 4);

        let mut boxes = Vec::new();
        tree.for_each_leaf(|wrapper, origin, size| {
            assert!(wrapper.statistical_weight_building() <= 200.0);
            boxes.push(AABB { p_min: *origin, p_max: origin + size });
        });

        let total: Float = boxes.iter().map(|b| b.volume()).sum();
        assert!((total - tree.aabb().volume()).abs() < 1e-5);
        for i in 0..boxes.len() {
            for j in (i + 1)..boxes.len() {
                assert!(boxes[i].overlap_volume(&boxes[j]) < 1e-9);
            }
        }
    }

    #[test]
    fn test_refine_respects_memory_budget() {
        let mut tree = unit_tree();
        for _ in 0..1000 {
            record_nearest(&tree, &Vector3f::new(0.3, 0.3, 0.3));
        }
        tree.refine(10.0, Some(0));
        assert_eq!(tree.num_leaves(), 1);

        tree.refine(10.0, Some(1000));
        assert!(tree.num_leaves() > 1);
    }

    #[test]
    fn test_refine_with_huge_budget_is_unbounded() {
        let mut config = GuidingConfig::default();
        config.set_property("sdTreeMaxMemory", "20000000000000").expect("fits in usize");

        let mut tree = unit_tree();
        for _ in 0..1000 {
            record_nearest(&tree, &Vector3f::new(0.3, 0.3, 0.3));
        }
        tree.refine(10.0, config.sd_tree_max_memory_mb);
        assert!(tree.num_leaves() > 1);

        tree.refine(10.0, Some(usize::MAX));
    }

    #[test]
    fn test_box_record_splits_weight() {
        let mut tree = unit_tree();
        tree.subdivide(0);
        let voxel = Vector3f::new(0.5, 1.0, 1.0);
        tree.record(&Vector3f::new(0.5, 0.5, 0.5), &voxel, &record(1.0),
                    DirectionalFilter::Nearest, BsdfSamplingFractionLoss::None);

        let left = tree.dtree_wrapper(&Vector3f::new(0.1, 0.5, 0.5));
        let right = tree.dtree_wrapper(&Vector3f::new(0.9, 0.5, 0.5));
        assert!((left.statistical_weight_building() - 0.5).abs() < 1e-5);
        assert!((right.statistical_weight_building() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_splat_filters() {
        let mut tree = unit_tree();
        tree.subdivide_all();
        tree.subdivide_all();
        let mut rng = LcgRng::new(4);
        let p = Vector3f::new(0.55, 0.55, 0.5);
        let (_, voxel) = tree.dtree_wrapper_with_size(&p);

        for _ in 0..200 {
            tree.splat(&p, &voxel, &record(1.0), SpatialFilter::StochasticBox,
                       DirectionalFilter::Nearest, BsdfSamplingFractionLoss::None, &mut rng);
        }
        tree.splat(&p, &voxel, &record(1.0), SpatialFilter::Nearest,
                   DirectionalFilter::Nearest, BsdfSamplingFractionLoss::None, &mut rng);

        let total: Float = tree.dtree_wrappers().map(|w| w.statistical_weight_building()).sum();
        assert!((total - 201.0).abs() < 1e-3);
        let home = tree.dtree_wrapper(&p).statistical_weight_building();
        assert!(home > 1.0 && home < 201.0);
    }

    #[test]
    fn test_parallel_visits_every_leaf() {
        let mut tree = unit_tree();
        for _ in 0..4 {
            tree.subdivide_all();
        }
        record_nearest(&tree, &Vector3f::new(0.2, 0.2, 0.2));

        let visited = AtomicUsize::new(0);
        tree.for_each_dtree_wrapper_parallel(|wrapper| {
            wrapper.build();
            visited.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(visited.load(Ordering::Relaxed), 16);

        let weights: Float = tree.dtree_wrappers().map(|w| w.statistical_weight()).sum();
        assert_eq!(weights, 1.0);
    }
}
