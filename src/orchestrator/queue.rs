//! Priority task queue.
//!
//! Ready tasks live in one ordered map per agent type, keyed by
//! `(priority, created_at, seq)`; the global head is the smallest key over the
//! agent types the caller considers eligible. A task keeps its key for life,
//! so deferrals and retries never change its place relative to others.
//! Backed-off tasks wait in a deadline heap; parked tasks wait for their
//! agent to recover.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use tokio::time::Instant;

use crate::model::{AgentType, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueKey {
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    /// Submission counter; breaks `created_at` ties in FIFO order.
    pub seq: u64,
}

impl QueueKey {
    fn age_order(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.seq)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    agent: AgentType,
    key: QueueKey,
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    max_depth_per_agent: usize,
    next_seq: u64,
    slots: HashMap<String, Slot>,
    ready: HashMap<AgentType, BTreeMap<QueueKey, String>>,
    parked: HashMap<AgentType, BTreeMap<QueueKey, String>>,
    delayed: BinaryHeap<Reverse<(Instant, u64, String)>>,
}

impl TaskQueue {
    pub fn new(max_depth_per_agent: usize) -> Self {
        Self {
            max_depth_per_agent: max_depth_per_agent.max(1),
            ..Default::default()
        }
    }

    /// Enqueue a new task. Returns the ids of any tasks dropped to keep the
    /// agent's queue within its depth bound (oldest first).
    pub fn push(
        &mut self,
        task_id: &str,
        agent: AgentType,
        priority: Priority,
        created_at: DateTime<Utc>,
    ) -> Vec<String> {
        let key = QueueKey {
            priority,
            created_at,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.slots.insert(task_id.to_string(), Slot { agent, key });
        self.ready
            .entry(agent)
            .or_default()
            .insert(key, task_id.to_string());
        self.enforce_depth(agent)
    }

    /// Put a popped task back with its original key.
    pub fn requeue(&mut self, task_id: &str) -> bool {
        let Some(slot) = self.slots.get(task_id).cloned() else {
            return false;
        };
        self.ready
            .entry(slot.agent)
            .or_default()
            .insert(slot.key, task_id.to_string());
        true
    }

    /// Hold a popped task until `eligible_at`.
    pub fn delay(&mut self, task_id: &str, eligible_at: Instant) -> bool {
        let Some(slot) = self.slots.get(task_id) else {
            return false;
        };
        self.delayed
            .push(Reverse((eligible_at, slot.key.seq, task_id.to_string())));
        true
    }

    /// Park a popped task until its agent recovers.
    pub fn park(&mut self, task_id: &str) -> Vec<String> {
        let Some(slot) = self.slots.get(task_id).cloned() else {
            return Vec::new();
        };
        self.parked
            .entry(slot.agent)
            .or_default()
            .insert(slot.key, task_id.to_string());
        self.enforce_depth(slot.agent)
    }

    /// Move backed-off tasks whose deadline passed to the ready set.
    pub fn promote_due(&mut self, now: Instant) -> Vec<String> {
        let mut promoted = Vec::new();
        while let Some(Reverse((at, _, _))) = self.delayed.peek() {
            if *at > now {
                break;
            }
            let Some(Reverse((_, _, id))) = self.delayed.pop() else {
                break;
            };
            if self.requeue(&id) {
                promoted.push(id);
            }
        }
        promoted
    }

    /// Return every parked task of `agent` to the ready set.
    pub fn unpark(&mut self, agent: AgentType) -> usize {
        let Some(parked) = self.parked.remove(&agent) else {
            return 0;
        };
        let n = parked.len();
        self.ready.entry(agent).or_default().extend(parked);
        n
    }

    /// Head of the queue restricted to agents for which `eligible` holds.
    pub fn peek(&self, eligible: impl Fn(AgentType) -> bool) -> Option<(QueueKey, &str)> {
        self.ready
            .iter()
            .filter(|(agent, _)| eligible(**agent))
            .filter_map(|(_, m)| m.first_key_value())
            .min_by_key(|(k, _)| **k)
            .map(|(k, id)| (*k, id.as_str()))
    }

    /// Pop the head of the queue restricted to eligible agents.
    pub fn pop(&mut self, eligible: impl Fn(AgentType) -> bool) -> Option<String> {
        let (_, id) = self.peek(eligible)?;
        let id = id.to_string();
        let agent = self.slots.get(&id)?.agent;
        self.ready.get_mut(&agent)?.pop_first().map(|(_, id)| id)
    }

    /// Forget a task that reached a terminal state.
    pub fn forget(&mut self, task_id: &str) {
        if let Some(slot) = self.slots.remove(task_id) {
            if let Some(m) = self.ready.get_mut(&slot.agent) {
                m.remove(&slot.key);
            }
            if let Some(m) = self.parked.get_mut(&slot.agent) {
                m.remove(&slot.key);
            }
        }
        // Stale `delayed` entries are skipped by `promote_due`.
    }

    /// Ready plus parked tasks of `agent`.
    pub fn depth(&self, agent: AgentType) -> usize {
        self.ready.get(&agent).map_or(0, BTreeMap::len)
            + self.parked.get(&agent).map_or(0, BTreeMap::len)
    }

    pub fn parked_len(&self, agent: AgentType) -> usize {
        self.parked.get(&agent).map_or(0, BTreeMap::len)
    }

    pub fn ready_len(&self) -> usize {
        self.ready.values().map(BTreeMap::len).sum()
    }

    pub fn delayed_len(&self) -> usize {
        self.delayed
            .iter()
            .filter(|Reverse((_, _, id))| self.slots.contains_key(id))
            .count()
    }

    /// Earliest pending backoff deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.delayed.peek().map(|Reverse((at, _, _))| *at)
    }

    /// Drop the oldest ready or parked tasks of `agent` beyond the bound.
    fn enforce_depth(&mut self, agent: AgentType) -> Vec<String> {
        let mut dropped = Vec::new();
        while self.depth(agent) > self.max_depth_per_agent {
            let oldest_ready = self
                .ready
                .get(&agent)
                .and_then(|m| m.keys().min_by_key(|k| k.age_order()).copied());
            let oldest_parked = self
                .parked
                .get(&agent)
                .and_then(|m| m.keys().min_by_key(|k| k.age_order()).copied());
            let from_parked = match (oldest_ready, oldest_parked) {
                (Some(r), Some(p)) => p.age_order() < r.age_order(),
                (None, Some(_)) => true,
                _ => false,
            };
            let removed = if from_parked {
                oldest_parked.and_then(|k| self.parked.get_mut(&agent)?.remove(&k))
            } else {
                oldest_ready.and_then(|k| self.ready.get_mut(&agent)?.remove(&k))
            };
            let Some(id) = removed else {
                break;
            };
            self.slots.remove(&id);
            dropped.push(id);
        }
        dropped
    }
}
