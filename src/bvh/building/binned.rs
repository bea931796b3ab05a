//! Binned SAH builder running on a thread pool.
//!
//! The calling thread (the coordinator) splits the top of the tree. Every subtree smaller
//! than the task threshold is built as an independent task into its own [`Topology`],
//! and the task results are spliced into the coordinator's arena once all of them finish.
//! Task results are ordered by task id, so the output doesn't depend on scheduling.

use std::sync::Mutex;

use log::{debug, trace};
use ordered_float::OrderedFloat;
use rayon::{Scope, ThreadPoolBuilder};

use crate::geometry::{FloatType, WorldBox, WorldPoint};

use super::{Decision, Split, Topology, decide, forced_leaf};
use crate::bvh::{
    BuildError, BuildSettings, BuildStatistics, ChildLink, NodeIdx,
    cost::SahCost,
    node::{BvhNode, Side},
    primitives::BuildPrimitives,
    statistics::LeafReason,
};

type TaskResult = (usize, Result<(Topology, ChildLink), BuildError>);

pub(in crate::bvh) fn build(
    primitives: &BuildPrimitives,
    settings: &BuildSettings,
) -> Result<Topology, BuildError> {
    let count = primitives.len();
    let worker_count = settings.worker_count.resolve();

    let pool = ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .thread_name(|i| format!("bvh-build{i}"))
        .build()?;

    let mut indices = Vec::new();
    indices.try_reserve_exact(count)?;
    indices.extend(0..count as u32);

    let indices = indices.as_mut_slice();

    let results = Mutex::new(Vec::new());
    let task_results = &results;

    let (mut topology, root, fixups, task_count) = pool.scope(move |scope| {
        let mut coordinator = Coordinator {
            scope,
            splitter: BinnedSplitter::new(primitives, settings)?,
            topology: Topology::new(),
            fixups: Vec::new(),
            task_count: 0,
            results: task_results,
        };
        let root = coordinator.build_node(indices, primitives.bounds, 0)?;
        Ok::<_, BuildError>((
            coordinator.topology,
            root,
            coordinator.fixups,
            coordinator.task_count,
        ))
    })?;
    debug!(
        "Coordinator built {} nodes and spawned {task_count} tasks on {worker_count} workers",
        topology.nodes.len()
    );

    let mut results = results.into_inner().expect("Poisoned lock!");
    results.sort_unstable_by_key(|(task, _)| *task);
    assert!(results.len() == task_count, "Lost a build task result");

    let mut task_roots = Vec::new();
    task_roots.try_reserve_exact(task_count)?;
    for (_, result) in results {
        let (task_topology, task_root) = result?;
        task_roots.push(topology.append(task_topology, task_root)?);
    }

    for fixup in fixups {
        topology.nodes[fixup.node].set_link(fixup.side, task_roots[fixup.task]);
    }

    let root = match root {
        Slot::Ready(link) => link,
        Slot::Task(task) => task_roots[task],
    };
    topology.into_rooted(root, primitives.bounds)
}

/// Child of a coordinator node, either finished or waiting for a task.
#[derive(Copy, Clone, Debug)]
enum Slot {
    Ready(ChildLink),
    Task(usize),
}

/// Link to patch once the task finishes.
#[derive(Copy, Clone, Debug)]
struct Fixup {
    node: NodeIdx,
    side: Side,
    task: usize,
}

struct Coordinator<'a, 'scope> {
    scope: &'a Scope<'scope>,
    splitter: BinnedSplitter<'scope>,
    topology: Topology,
    fixups: Vec<Fixup>,
    task_count: usize,
    results: &'scope Mutex<Vec<TaskResult>>,
}

impl<'scope> Coordinator<'_, 'scope> {
    fn build_node(
        &mut self,
        indices: &'scope mut [u32],
        bounds: WorldBox,
        depth: usize,
    ) -> Result<Slot, BuildError> {
        if indices.len() < self.splitter.settings.task_threshold {
            return Ok(self.spawn_task(indices, bounds, depth));
        }

        let left_count =
            match self
                .splitter
                .plan(indices, &bounds, depth, &mut self.topology.statistics)
            {
                Step::Leaf(reason) => {
                    return Ok(Slot::Ready(self.topology.make_leaf(indices, depth, reason)?));
                }
                Step::Split(left_count) => left_count,
            };

        let (left, right) = indices.split_at_mut(left_count);
        let left_bounds = self.splitter.primitives.bounds_of(left);
        let right_bounds = self.splitter.primitives.bounds_of(right);

        let index = self.topology.push_node(BvhNode::default())?;
        let left_slot = self.build_node(left, left_bounds, depth + 1)?;
        let right_slot = self.build_node(right, right_bounds, depth + 1)?;

        let mut link = |side: Side, slot: Slot| match slot {
            Slot::Ready(link) => link,
            Slot::Task(task) => {
                self.fixups.push(Fixup {
                    node: index,
                    side,
                    task,
                });
                ChildLink::EMPTY
            }
        };
        let node = BvhNode::new(
            (left_bounds, link(Side::Left, left_slot)),
            (right_bounds, link(Side::Right, right_slot)),
        );
        self.topology.nodes[index] = node;

        Ok(Slot::Ready(ChildLink::new_inner(index)))
    }

    fn spawn_task(&mut self, indices: &'scope mut [u32], bounds: WorldBox, depth: usize) -> Slot {
        let task = self.task_count;
        self.task_count += 1;
        trace!(
            "Spawning task {task} with {} triangles at depth {depth}",
            indices.len()
        );

        let primitives = self.splitter.primitives;
        let settings = self.splitter.settings;
        let results = self.results;
        self.scope.spawn(move |_| {
            let result = build_task(primitives, settings, indices, bounds, depth);
            results.lock().expect("Poisoned lock!").push((task, result));
        });

        Slot::Task(task)
    }
}

fn build_task(
    primitives: &BuildPrimitives,
    settings: &BuildSettings,
    indices: &mut [u32],
    bounds: WorldBox,
    depth: usize,
) -> Result<(Topology, ChildLink), BuildError> {
    let mut topology = Topology::with_capacity(indices.len())?;
    topology.statistics.parallel_tasks = 1;
    let mut splitter = BinnedSplitter::new(primitives, settings)?;
    let root = splitter.build_subtree(&mut topology, indices, bounds, depth)?;
    Ok((topology, root))
}

/// Maps centroids to equally sized bins along one axis of the centroid bounds.
#[derive(Copy, Clone, Debug, PartialEq)]
struct BinMapping {
    axis: usize,
    min: FloatType,
    scale: FloatType,
    bin_count: usize,
}

impl BinMapping {
    /// Returns None if the centroids don't spread along the axis.
    fn new(axis: usize, centroid_bounds: &WorldBox, bin_count: usize) -> Option<BinMapping> {
        let extent = centroid_bounds.axis_length(axis);
        if !(extent > 0.0) {
            return None;
        }
        Some(BinMapping {
            axis,
            min: centroid_bounds.min[axis],
            scale: bin_count as FloatType / extent,
            bin_count,
        })
    }

    fn bin(&self, centroid: &WorldPoint) -> usize {
        // Float to int casts saturate and map NaN to zero
        (((centroid[self.axis] - self.min) * self.scale) as usize).min(self.bin_count - 1)
    }
}

#[derive(Copy, Clone, Debug)]
struct Bin {
    count: usize,
    bounds: WorldBox,
}

impl Default for Bin {
    fn default() -> Self {
        Bin {
            count: 0,
            bounds: WorldBox::empty(),
        }
    }
}

/// Outcome of planning a node, with the indices already partitioned for a split.
enum Step {
    Leaf(LeafReason),
    Split(usize),
}

struct BinnedSplitter<'a> {
    primitives: &'a BuildPrimitives,
    settings: &'a BuildSettings,
    cost: SahCost,
    bins: Vec<Bin>,
    right_areas: Vec<(usize, FloatType)>,
}

impl<'a> BinnedSplitter<'a> {
    fn new(
        primitives: &'a BuildPrimitives,
        settings: &'a BuildSettings,
    ) -> Result<BinnedSplitter<'a>, BuildError> {
        let mut bins = Vec::new();
        bins.try_reserve_exact(settings.bin_count)?;
        let mut right_areas = Vec::new();
        right_areas.try_reserve_exact(settings.bin_count)?;

        Ok(BinnedSplitter {
            primitives,
            settings,
            cost: SahCost::new(settings),
            bins,
            right_areas,
        })
    }

    fn build_subtree(
        &mut self,
        topology: &mut Topology,
        indices: &mut [u32],
        bounds: WorldBox,
        depth: usize,
    ) -> Result<ChildLink, BuildError> {
        let left_count = match self.plan(indices, &bounds, depth, &mut topology.statistics) {
            Step::Leaf(reason) => return topology.make_leaf(indices, depth, reason),
            Step::Split(left_count) => left_count,
        };

        let (left, right) = indices.split_at_mut(left_count);
        let left_bounds = self.primitives.bounds_of(left);
        let right_bounds = self.primitives.bounds_of(right);

        let index = topology.push_node(BvhNode::default())?;
        let left_link = self.build_subtree(topology, left, left_bounds, depth + 1)?;
        let right_link = self.build_subtree(topology, right, right_bounds, depth + 1)?;
        topology.nodes[index] =
            BvhNode::new((left_bounds, left_link), (right_bounds, right_link));

        Ok(ChildLink::new_inner(index))
    }

    /// Decides what to do with a node and partitions `indices` if it is to be split.
    fn plan(
        &mut self,
        indices: &mut [u32],
        bounds: &WorldBox,
        depth: usize,
        statistics: &mut BuildStatistics,
    ) -> Step {
        let count = indices.len();
        let decision = match forced_leaf(count, depth, self.settings) {
            Some(reason) => Decision::Leaf(reason),
            None => {
                let split = self.find_split(indices, bounds);
                decide(count, depth, &self.cost, split)
            }
        };

        match decision {
            Decision::Leaf(reason) => Step::Leaf(reason),
            Decision::Split(split) => Step::Split(self.partition(indices, &split)),
            Decision::Median => {
                statistics.median_splits += 1;
                Step::Split(self.partition_median(indices))
            }
        }
    }

    fn find_split(&mut self, indices: &[u32], bounds: &WorldBox) -> Option<Split<BinMapping>> {
        let centroid_bounds = self.primitives.centroid_bounds_of(indices);
        let parent_area = bounds.surface_area();

        let mut best: Option<Split<BinMapping>> = None;
        for axis in 0..3 {
            let Some(mapping) = BinMapping::new(axis, &centroid_bounds, self.settings.bin_count)
            else {
                continue;
            };

            self.bins.clear();
            self.bins.resize(mapping.bin_count, Bin::default());
            for i in indices {
                let bin = &mut self.bins[mapping.bin(&self.primitives.centroids[*i as usize])];
                bin.count += 1;
                bin.bounds.enlarge_box(&self.primitives.boxes[*i as usize]);
            }

            let bins = &self.bins;
            let Some(candidate) = self.cost.sweep(
                axis,
                parent_area,
                bins.len(),
                |i| (bins[i].count, bins[i].bounds),
                &mut self.right_areas,
            ) else {
                continue;
            };

            if best.is_none_or(|best| candidate.cost < best.candidate.cost) {
                best = Some(Split {
                    candidate,
                    left_count: bins[..candidate.position].iter().map(|b| b.count).sum(),
                    extra: mapping,
                });
            }
        }
        best
    }

    /// Moves triangles from bins left of the split to the front, returns their count.
    fn partition(&self, indices: &mut [u32], split: &Split<BinMapping>) -> usize {
        let is_left = |i: u32| {
            split.extra.bin(&self.primitives.centroids[i as usize]) < split.candidate.position
        };

        let mut left = 0;
        let mut right = indices.len();
        while left < right {
            if is_left(indices[left]) {
                left += 1;
            } else {
                right -= 1;
                indices.swap(left, right);
            }
        }

        debug_assert_eq!(left, split.left_count);
        left
    }

    /// Splits at the centroid median along the longest axis of centroid bounds.
    fn partition_median(&self, indices: &mut [u32]) -> usize {
        let axis = self.primitives.centroid_bounds_of(indices).longest_axis();
        let middle = indices.len() / 2;
        let centroids = &self.primitives.centroids;
        indices.select_nth_unstable_by_key(middle, |i| {
            (OrderedFloat(centroids[*i as usize][axis]), *i)
        });
        middle
    }
}
