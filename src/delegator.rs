// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - Task Delegation

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::{PriorityBoost, ScoringWeights, SimConfig};
use crate::error::DropReason;
use crate::types::{Node, Task, TaskAssignment};
use crate::units::{NodeId, Position};

/// Fleet-wide maxima each score term is normalised against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FleetScale {
    pub energy: f64,
    pub spare_processing: f64,
    pub queue: f64,
    pub distance: f64,
}

impl FleetScale {
    pub fn of<'a>(nodes: impl IntoIterator<Item = &'a Node>, origin: &Position) -> Self {
        nodes.into_iter().fold(Self::default(), |acc, n| Self {
            energy: acc.energy.max(n.energy),
            spare_processing: acc.spare_processing.max(n.spare_processing()),
            queue: acc.queue.max(n.queue_len() as f64),
            distance: acc.distance.max(origin.distance_km(&n.position)),
        })
    }
}

/// Scores every eligible node for a task and places it on the best one.
#[derive(Debug, Clone)]
pub struct Delegator {
    weights: ScoringWeights,
    boost: PriorityBoost,
    max_tasks_per_node: usize,
    min_energy_to_accept: f64,
    /// Where tasks are uplinked from; distance is measured from here.
    origin: Position,
}

/// A successful placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub node_id: NodeId,
    pub score: f64,
    /// The node just reached its task or processing limit.
    pub saturated: bool,
}

impl Delegator {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            weights: config.weights.clone(),
            boost: config.priority_boost.clone(),
            max_tasks_per_node: config.max_tasks_per_node,
            min_energy_to_accept: config.min_energy_to_accept,
            origin: config.source_position,
        }
    }

    /// A node may take `task` only with enough spare processing, enough
    /// energy to start and room in its queue.
    pub fn is_candidate(&self, node: &Node, task: &Task) -> bool {
        node.spare_processing() >= task.processing_power_needed
            && node.energy >= self.min_energy_to_accept
            && node.queue_len() < self.max_tasks_per_node
    }

    /// score = w1·energy + w2·spare + w3·(1 − queue) − w4·distance + w5·boost
    pub fn score(&self, node: &Node, task: &Task, scale: &FleetScale) -> f64 {
        let w = &self.weights;
        let energy_norm = norm(node.energy, scale.energy);
        let spare_norm = norm(node.spare_processing(), scale.spare_processing);
        let queue_norm = norm(node.queue_len() as f64, scale.queue);
        let distance_norm = norm(self.origin.distance_km(&node.position), scale.distance);
        let boost = self.boost.for_priority(task.priority);

        w.w1 * energy_norm + w.w2 * spare_norm + w.w3 * (1.0 - queue_norm) - w.w4 * distance_norm + w.w5 * boost
    }

    /// Eligible nodes ranked best first.
    ///
    /// Ties on score go to the shorter queue, then the lower node id.
    pub fn rank<'a>(&self, task: &Task, nodes: impl IntoIterator<Item = &'a Node> + Clone) -> Vec<(&'a Node, f64)> {
        let scale = FleetScale::of(nodes.clone(), &self.origin);
        let mut ranked: Vec<(&Node, f64)> = nodes
            .into_iter()
            .filter(|n| self.is_candidate(n, task))
            .map(|n| (n, self.score(n, task, &scale)))
            .collect();
        ranked.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.queue_len().cmp(&b.queue_len()))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked
    }

    /// Pick the winning node without mutating anything.
    pub fn select(&self, task: &Task, nodes: &BTreeMap<NodeId, Node>) -> Result<(NodeId, f64), DropReason> {
        self.rank(task, nodes.values())
            .first()
            .map(|(n, s)| (n.id.clone(), *s))
            .ok_or(DropReason::NoCapacity)
    }

    /// Place `task` on the best node and reserve its processing at once, so a
    /// later task in the same tick sees the reduced headroom.
    pub fn assign(&self, task: &Task, nodes: &mut BTreeMap<NodeId, Node>, tick: u64) -> Result<Placement, DropReason> {
        let (node_id, score) = self.select(task, nodes)?;
        let node = nodes.get_mut(&node_id).ok_or(DropReason::NoCapacity)?;
        node.tasks.push(TaskAssignment {
            task_id: task.id.clone(),
            remaining_energy: task.energy_need,
            processing_reserved: task.processing_power_needed,
            progress: 0.0,
            priority: task.priority,
            assigned_at: tick,
        });
        let saturated = node.queue_len() >= self.max_tasks_per_node || node.spare_processing() <= 0.0;
        Ok(Placement { node_id, score, saturated })
    }
}

fn norm(value: f64, max: f64) -> f64 {
    if max > 0.0 {
        (value / max).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
