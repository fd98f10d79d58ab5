//! Lane scheduler.
//!
//! Decides which lane's head message goes on the wire next. Lanes with a
//! numerically lower priority drain completely before any lane with a higher
//! value is serviced. Lanes sharing a priority split bandwidth in proportion
//! to weight using virtual time: sending `n` bytes advances a lane's clock by
//! `n * LANE_WEIGHT_SCALE / weight` and the lane with the smallest clock goes
//! next. A lane that becomes active is brought up to the virtual time last
//! served at its priority (and to the smallest clock of its active peers),
//! so idle time does not bank credit.

use std::collections::{BTreeMap, VecDeque};

use crate::core::constants::{LANE_WEIGHT_SCALE, MAX_LANES};
use crate::core::{SocketError, SocketResult};

/// Priority and weight of one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaneConfig {
    /// Lower drains first.
    pub priority: i32,
    /// Bandwidth share among lanes of equal priority. Must be positive.
    pub weight: u16,
}

impl LaneConfig {
    /// Create a lane config.
    pub fn new(priority: i32, weight: u16) -> Self {
        Self { priority, weight }
    }
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            priority: 0,
            weight: 1,
        }
    }
}

#[derive(Debug)]
struct LaneQueue<T> {
    config: LaneConfig,
    virtual_time: u64,
    items: VecDeque<(T, usize)>,
    bytes: usize,
}

impl<T> LaneQueue<T> {
    fn new(config: LaneConfig) -> Self {
        Self {
            config,
            virtual_time: 0,
            items: VecDeque::new(),
            bytes: 0,
        }
    }
}

/// Per-lane queues plus the priority/weight scheduling state.
#[derive(Debug)]
pub struct LaneScheduler<T> {
    lanes: Vec<LaneQueue<T>>,
    /// Start time of the last message popped at each priority.
    served: BTreeMap<i32, u64>,
}

impl<T> Default for LaneScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LaneScheduler<T> {
    /// One default lane.
    pub fn new() -> Self {
        Self {
            lanes: vec![LaneQueue::new(LaneConfig::default())],
            served: BTreeMap::new(),
        }
    }

    /// Number of configured lanes.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Configuration of `lane`.
    pub fn config(&self, lane: usize) -> Option<LaneConfig> {
        self.lanes.get(lane).map(|l| l.config)
    }

    /// Replace lane priorities and weights. The lane count may grow but never
    /// shrink. All bandwidth-sharing bookkeeping restarts from zero.
    pub fn configure(&mut self, configs: &[LaneConfig]) -> SocketResult<()> {
        if configs.is_empty() || configs.len() > MAX_LANES {
            return Err(SocketError::InvalidParam("lane count"));
        }
        if configs.len() < self.lanes.len() {
            return Err(SocketError::InvalidParam("lane count cannot shrink"));
        }
        if configs.iter().any(|c| c.weight == 0) {
            return Err(SocketError::InvalidParam("lane weight must be positive"));
        }

        for (lane, config) in self.lanes.iter_mut().zip(configs) {
            lane.config = *config;
        }
        for config in &configs[self.lanes.len()..] {
            self.lanes.push(LaneQueue::new(*config));
        }
        for lane in &mut self.lanes {
            lane.virtual_time = 0;
        }
        self.served.clear();
        Ok(())
    }

    /// Queue `item` of `size` bytes on `lane`.
    pub fn push(&mut self, lane: usize, item: T, size: usize) {
        let Some(queue) = self.lanes.get(lane) else {
            return;
        };
        if queue.items.is_empty() {
            let priority = queue.config.priority;
            let served = self.served.get(&priority).copied().unwrap_or(0);
            let peers = self
                .lanes
                .iter()
                .enumerate()
                .filter(|(i, l)| *i != lane && !l.items.is_empty() && l.config.priority == priority)
                .map(|(_, l)| l.virtual_time)
                .min()
                .unwrap_or(0);
            let queue = &mut self.lanes[lane];
            queue.virtual_time = queue.virtual_time.max(served).max(peers);
        }

        let queue = &mut self.lanes[lane];
        queue.items.push_back((item, size));
        queue.bytes += size;
    }

    /// Lane whose head message should go out next.
    pub fn next_lane(&self) -> Option<usize> {
        self.lanes
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.items.is_empty())
            .min_by_key(|(i, l)| (l.config.priority, l.virtual_time, *i))
            .map(|(i, _)| i)
    }

    /// Head of `lane`.
    pub fn front(&self, lane: usize) -> Option<&T> {
        self.lanes.get(lane)?.items.front().map(|(item, _)| item)
    }

    /// Take the head of `lane` and charge its virtual clock.
    pub fn pop(&mut self, lane: usize) -> Option<T> {
        let queue = self.lanes.get_mut(lane)?;
        let (item, size) = queue.items.pop_front()?;
        queue.bytes -= size;
        let served = self.served.entry(queue.config.priority).or_insert(0);
        *served = (*served).max(queue.virtual_time);
        let cost = (size.max(1) as u64).saturating_mul(LANE_WEIGHT_SCALE)
            / u64::from(queue.config.weight);
        queue.virtual_time = queue.virtual_time.saturating_add(cost);
        Some(item)
    }

    /// Take the next message in wire order.
    pub fn pop_next(&mut self) -> Option<(usize, T)> {
        let lane = self.next_lane()?;
        self.pop(lane).map(|item| (lane, item))
    }

    /// Items queued on `lane`, oldest first.
    pub fn items(&self, lane: usize) -> impl Iterator<Item = &T> {
        self.lanes
            .get(lane)
            .into_iter()
            .flat_map(|l| l.items.iter().map(|(item, _)| item))
    }

    /// Keep only items for which `keep` returns true. Clocks are not charged.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        for lane in &mut self.lanes {
            lane.items.retain(|(item, _)| keep(item));
            lane.bytes = lane.items.iter().map(|(_, size)| size).sum();
        }
    }

    /// Drop everything queued.
    pub fn clear(&mut self) {
        for lane in &mut self.lanes {
            lane.items.clear();
            lane.bytes = 0;
        }
    }

    /// Bytes queued on `lane`.
    pub fn lane_bytes(&self, lane: usize) -> usize {
        self.lanes.get(lane).map_or(0, |l| l.bytes)
    }

    /// Messages queued on `lane`.
    pub fn lane_len(&self, lane: usize) -> usize {
        self.lanes.get(lane).map_or(0, |l| l.items.len())
    }

    /// Messages queued across all lanes.
    pub fn len(&self) -> usize {
        self.lanes.iter().map(|l| l.items.len()).sum()
    }

    /// Bytes queued across all lanes.
    pub fn queued_bytes(&self) -> usize {
        self.lanes.iter().map(|l| l.bytes).sum()
    }

    /// Whether every lane is empty.
    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(|l| l.items.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scheduler: &mut LaneScheduler<u32>) -> Vec<usize> {
        std::iter::from_fn(|| scheduler.pop_next().map(|(lane, _)| lane)).collect()
    }

    #[test]
    fn test_single_lane_fifo() {
        let mut s = LaneScheduler::new();
        s.push(0, 1u32, 10);
        s.push(0, 2u32, 10);
        assert_eq!(s.queued_bytes(), 20);
        assert_eq!(s.pop_next(), Some((0, 1)));
        assert_eq!(s.pop_next(), Some((0, 2)));
        assert!(s.is_empty());
    }

    #[test]
    fn test_strict_priority() {
        let mut s = LaneScheduler::new();
        s.configure(&[
            LaneConfig::new(0, 1),
            LaneConfig::new(10, 4),
            LaneConfig::new(10, 1),
        ])
        .unwrap();

        for i in 0..10 {
            s.push(1, i, 100);
            s.push(2, i, 100);
            s.push(0, i, 100);
        }

        let order = drain(&mut s);
        assert!(order[..10].iter().all(|&lane| lane == 0));
        assert!(order[10..].iter().all(|&lane| lane != 0));
    }

    #[test]
    fn test_weighted_share() {
        let mut s = LaneScheduler::new();
        s.configure(&[
            LaneConfig::new(0, 1),
            LaneConfig::new(10, 4),
            LaneConfig::new(10, 1),
        ])
        .unwrap();

        for i in 0..100 {
            s.push(1, i, 100);
            s.push(2, i, 100);
        }

        let first: Vec<usize> = drain(&mut s).into_iter().take(50).collect();
        let lane1 = first.iter().filter(|&&l| l == 1).count();
        let lane2 = first.iter().filter(|&&l| l == 2).count();
        assert_eq!(lane1, 40);
        assert_eq!(lane2, 10);
    }

    #[test]
    fn test_idle_lane_banks_no_credit() {
        let mut s = LaneScheduler::new();
        s.configure(&[LaneConfig::new(0, 1), LaneConfig::new(0, 1)])
            .unwrap();

        for i in 0..20 {
            s.push(0, i, 100);
        }
        for _ in 0..10 {
            s.pop_next();
        }

        // Lane 1 was idle the whole time; it must not now monopolize the wire.
        for i in 0..10 {
            s.push(1, i, 100);
        }
        let order: Vec<usize> = drain(&mut s).into_iter().take(6).collect();
        assert!(order.contains(&0));
        assert!(order.contains(&1));
    }

    #[test]
    fn test_lane_reactivated_after_all_idle() {
        let mut s = LaneScheduler::new();
        s.configure(&[LaneConfig::new(0, 1), LaneConfig::new(0, 1)])
            .unwrap();

        for i in 0..10 {
            s.push(0, i, 100);
        }
        assert_eq!(drain(&mut s).len(), 10);

        // Both lanes are idle now; lane 1 arrives first and must not get the
        // wire for the time lane 0 spent alone.
        for i in 0..10 {
            s.push(1, i, 100);
        }
        for i in 0..10 {
            s.push(0, i, 100);
        }
        let first: Vec<usize> = drain(&mut s).into_iter().take(10).collect();
        let lane0 = first.iter().filter(|&&l| l == 0).count();
        assert!((4..=6).contains(&lane0), "lane 0 got {lane0} of 10");
    }

    #[test]
    fn test_reconfigure_resets_sharing() {
        let mut s = LaneScheduler::new();
        s.configure(&[LaneConfig::new(0, 1), LaneConfig::new(1, 1)])
            .unwrap();
        for i in 0..10 {
            s.push(0, i, 100);
        }
        drain(&mut s);

        // Lane 0's clock is far ahead; after the reset both start level.
        s.configure(&[LaneConfig::new(0, 1), LaneConfig::new(0, 1)])
            .unwrap();
        for i in 0..4 {
            s.push(1, i, 100);
            s.push(0, i, 100);
        }
        assert_eq!(drain(&mut s), vec![0, 1, 0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_configure_rules() {
        let mut s: LaneScheduler<u32> = LaneScheduler::new();
        assert!(s.configure(&[]).is_err());
        assert!(s.configure(&[LaneConfig::new(0, 0)]).is_err());

        s.configure(&[LaneConfig::default(), LaneConfig::default()])
            .unwrap();
        assert_eq!(s.lane_count(), 2);
        assert!(s.configure(&[LaneConfig::default()]).is_err());

        s.configure(&[LaneConfig::new(5, 2), LaneConfig::new(1, 3), LaneConfig::default()])
            .unwrap();
        assert_eq!(s.lane_count(), 3);
        assert_eq!(s.config(1), Some(LaneConfig::new(1, 3)));

        let too_many = vec![LaneConfig::default(); MAX_LANES + 1];
        assert!(s.configure(&too_many).is_err());
    }

    #[test]
    fn test_retain_and_clear() {
        let mut s = LaneScheduler::new();
        s.push(0, 1u32, 10);
        s.push(0, 2u32, 20);
        s.push(0, 3u32, 30);

        s.retain(|v| v % 2 == 1);
        assert_eq!(s.lane_bytes(0), 40);
        assert_eq!(s.items(0).copied().collect::<Vec<_>>(), vec![1, 3]);

        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.queued_bytes(), 0);
    }
}
