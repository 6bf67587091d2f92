// Copyright @yucwang 2026

use crate::core::sampler::Sampler;
use crate::math::atomic_float::AtomicFloat;
use crate::math::constants::{ Float, Vector2f };

use std::sync::atomic::Ordering;

/// One 2x2 cell of a directional quadtree over the canonical unit square.
///
/// Child `i` covers the quadrant with `x >= 0.5` when bit 0 is set and
/// `y >= 0.5` when bit 1 is set. A child slot of 0 marks a leaf whose energy
/// is stored directly in `sums[i]`; any other value indexes the owning arena.
#[derive(Debug, Clone, Default)]
pub struct QuadTreeNode {
    sums: [AtomicFloat; 4],
    children: [u16; 4],
}

impl QuadTreeNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quadrant containing `p` and `p` rescaled into that quadrant's frame.
    pub fn child_index(p: &Vector2f) -> (usize, Vector2f) {
        let mut index = 0;
        let mut local = *p;
        for dim in 0..2 {
            if local[dim] < 0.5 {
                local[dim] *= 2.0;
            } else {
                local[dim] = (local[dim] - 0.5) * 2.0;
                index |= 1 << dim;
            }
        }
        (index, local)
    }

    pub fn sum(&self, index: usize) -> Float {
        self.sums[index].load(Ordering::Relaxed)
    }

    pub fn set_sum(&self, index: usize, value: Float) {
        self.sums[index].store(value, Ordering::Relaxed);
    }

    pub fn set_all_sums(&self, value: Float) {
        for sum in self.sums.iter() {
            sum.store(value, Ordering::Relaxed);
        }
    }

    pub fn total(&self) -> Float {
        (0..4).map(|i| self.sum(i)).sum()
    }

    pub fn child(&self, index: usize) -> u16 {
        self.children[index]
    }

    pub fn set_child(&mut self, index: usize, node: u16) {
        self.children[index] = node;
    }

    pub fn is_leaf(&self, index: usize) -> bool {
        self.children[index] == 0
    }

    fn child_node<'a>(&self, index: usize, nodes: &'a [QuadTreeNode]) -> &'a QuadTreeNode {
        &nodes[self.children[index] as usize]
    }

    /// Energy density (sum per unit area) at `p`. Dividing by the tree's
    /// statistical weight turns it into radiance.
    pub fn eval(&self, p: &Vector2f, nodes: &[QuadTreeNode]) -> Float {
        let (index, local) = Self::child_index(p);
        if self.is_leaf(index) {
            4.0 * self.sum(index)
        } else {
            4.0 * self.child_node(index, nodes).eval(&local, nodes)
        }
    }

    /// Normalized density over the unit square; 0 on an empty branch.
    pub fn pdf(&self, p: &Vector2f, nodes: &[QuadTreeNode]) -> Float {
        let (index, local) = Self::child_index(p);
        if !(self.sum(index) > 0.0) {
            return 0.0;
        }

        let factor = 4.0 * self.sum(index) / self.total();
        if self.is_leaf(index) {
            factor
        } else {
            factor * self.child_node(index, nodes).pdf(&local, nodes)
        }
    }

    pub fn depth_at(&self, p: &Vector2f, nodes: &[QuadTreeNode]) -> usize {
        let (index, local) = Self::child_index(p);
        if self.is_leaf(index) {
            1
        } else {
            1 + self.child_node(index, nodes).depth_at(&local, nodes)
        }
    }

    pub fn sample(&self, sampler: &mut dyn Sampler, nodes: &[QuadTreeNode]) -> Vector2f {
        let top_left = self.sum(0);
        let top_right = self.sum(1);
        let mut partial = top_left + self.sum(2);
        let total = partial + top_right + self.sum(3);

        // Only reachable through numerical trouble in the sums.
        if !(total > 0.0) {
            return sampler.get_2d();
        }

        let mut index = 0;
        let mut origin = Vector2f::new(0.0, 0.0);
        let mut boundary = partial / total;
        let mut sample = sampler.get_1d();

        if sample < boundary {
            sample /= boundary;
            boundary = top_left / partial;
        } else {
            partial = total - partial;
            origin.x = 0.5;
            sample = (sample - boundary) / (1.0 - boundary);
            boundary = top_right / partial;
            index |= 1;
        }

        if !(sample < boundary) {
            origin.y = 0.5;
            index |= 2;
        }

        if self.is_leaf(index) {
            origin + 0.5 * sampler.get_2d()
        } else {
            origin + 0.5 * self.child_node(index, nodes).sample(sampler, nodes)
        }
    }

    pub fn record(&self, p: &Vector2f, irradiance: Float, nodes: &[QuadTreeNode]) {
        let (index, local) = Self::child_index(p);
        if self.is_leaf(index) {
            self.sums[index].fetch_add(irradiance, Ordering::Relaxed);
        } else {
            self.child_node(index, nodes).record(&local, irradiance, nodes);
        }
    }

    /// Splats `value` times the overlap area of the square box at `origin`
    /// with side `size` into every leaf it touches. `node_origin` and
    /// `node_size` locate this node inside the unit square.
    pub fn record_box(&self,
                      origin: &Vector2f,
                      size: Float,
                      node_origin: &Vector2f,
                      node_size: Float,
                      value: Float,
                      nodes: &[QuadTreeNode]) {
        let child_size = node_size / 2.0;
        for i in 0..4 {
            let mut child_origin = *node_origin;
            if i & 1 != 0 {
                child_origin.x += child_size;
            }
            if i & 2 != 0 {
                child_origin.y += child_size;
            }

            let w = overlapping_area(origin, size, &child_origin, child_size);
            if w > 0.0 {
                if self.is_leaf(i) {
                    self.sums[i].fetch_add(value * w, Ordering::Relaxed);
                } else {
                    self.child_node(i, nodes)
                        .record_box(origin, size, &child_origin, child_size, value, nodes);
                }
            }
        }
    }

    /// Recomputes the sums of interior children from their subtrees so that
    /// every node's total equals the energy of the leaves below it.
    pub fn build(&self, nodes: &[QuadTreeNode]) {
        for i in 0..4 {
            if self.is_leaf(i) {
                continue;
            }

            let child = self.child_node(i, nodes);
            child.build(nodes);
            self.set_sum(i, child.total());
        }
    }
}

fn overlapping_area(min1: &Vector2f, size1: Float, min2: &Vector2f, size2: Float) -> Float {
    let mut area = 1.0;
    for dim in 0..2 {
        let length = (min1[dim] + size1).min(min2[dim] + size2) - min1[dim].max(min2[dim]);
        area *= length.max(0.0);
    }
    area
}

#[cfg(test)]
mod tests {
    use super::QuadTreeNode;
    use crate::core::rng::LcgRng;
    use crate::math::constants::{ Float, Vector2f };

    // Root with its lower-left quadrant refined once.
    fn two_level_tree() -> Vec<QuadTreeNode> {
        let mut root = QuadTreeNode::new();
        root.set_child(0, 1);
        vec![root, QuadTreeNode::new()]
    }

    #[test]
    fn test_child_index_rescales() {
        let (index, local) = QuadTreeNode::child_index(&Vector2f::new(0.25, 0.75));
        assert_eq!(index, 2);
        assert!((local - Vector2f::new(0.5, 0.5)).norm() < 1e-6);

        let (index, local) = QuadTreeNode::child_index(&Vector2f::new(0.5, 0.1));
        assert_eq!(index, 1);
        assert!((local - Vector2f::new(0.0, 0.2)).norm() < 1e-6);
    }

    #[test]
    fn test_record_and_build_propagates_sums() {
        let nodes = two_level_tree();
        nodes[0].record(&Vector2f::new(0.1, 0.1), 2.0, &nodes);
        nodes[0].record(&Vector2f::new(0.4, 0.1), 1.0, &nodes);
        nodes[0].record(&Vector2f::new(0.9, 0.9), 3.0, &nodes);
        assert_eq!(nodes[0].sum(0), 0.0);

        nodes[0].build(&nodes);
        assert!((nodes[0].sum(0) - 3.0).abs() < 1e-6);
        assert!((nodes[0].sum(3) - 3.0).abs() < 1e-6);
        assert!((nodes[0].total() - 6.0).abs() < 1e-6);
        assert_eq!(nodes[0].depth_at(&Vector2f::new(0.1, 0.1), &nodes), 2);
        assert_eq!(nodes[0].depth_at(&Vector2f::new(0.9, 0.1), &nodes), 1);

        // A leaf of area 1/16 holding 2 units has density 32.
        assert!((nodes[0].eval(&Vector2f::new(0.1, 0.1), &nodes) - 32.0).abs() < 1e-4);
    }

    #[test]
    fn test_pdf_integrates_to_one() {
        let nodes = two_level_tree();
        nodes[1].set_all_sums(1.0);
        nodes[0].set_sum(1, 0.5);
        nodes[0].set_sum(2, 2.0);
        nodes[0].build(&nodes);

        let n = 256;
        let mut integral = 0.0;
        for i in 0..n {
            for j in 0..n {
                let p = Vector2f::new((i as Float + 0.5) / n as Float, (j as Float + 0.5) / n as Float);
                integral += nodes[0].pdf(&p, &nodes);
            }
        }
        integral /= (n * n) as Float;
        assert!((integral - 1.0).abs() < 1e-3, "integral = {}", integral);

        assert_eq!(nodes[0].pdf(&Vector2f::new(0.9, 0.9), &nodes), 0.0);
    }

    #[test]
    fn test_sample_follows_sums() {
        let nodes = two_level_tree();
        nodes[1].set_sum(3, 1.0);
        nodes[0].build(&nodes);

        let mut rng = LcgRng::new(3);
        for _ in 0..1000 {
            let s = nodes[0].sample(&mut rng, &nodes);
            assert!(s.x >= 0.25 && s.x <= 0.5, "{:?}", s);
            assert!(s.y >= 0.25 && s.y <= 0.5, "{:?}", s);
        }
    }

    #[test]
    fn test_sample_falls_back_to_uniform() {
        let nodes = vec![QuadTreeNode::new()];
        let mut rng = LcgRng::new(5);
        let mut mean = Vector2f::new(0.0, 0.0);
        for _ in 0..4000 {
            let s = nodes[0].sample(&mut rng, &nodes);
            assert!(s.x >= 0.0 && s.x < 1.0 && s.y >= 0.0 && s.y < 1.0);
            mean += s / 4000.0;
        }
        assert!((mean - Vector2f::new(0.5, 0.5)).norm() < 0.05);
    }

    #[test]
    fn test_record_box_conserves_energy() {
        let nodes = two_level_tree();
        let origin = Vector2f::new(0.1, 0.2);
        let size = 0.5;
        nodes[0].record_box(&origin, size, &Vector2f::new(0.0, 0.0), 1.0, 4.0, &nodes);
        nodes[0].build(&nodes);

        // value times the box area, split over every touched leaf.
        assert!((nodes[0].total() - 4.0 * size * size).abs() < 1e-5);
        assert!(nodes[1].sum(3) > 0.0);
        assert!(nodes[0].sum(1) > 0.0);
        assert!(nodes[0].sum(3) > 0.0);
    }
}
