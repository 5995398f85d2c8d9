//! Per-ship journey trail retention.
//!
//! Each ship keeps its latest `recent` hops individually (drawn with a fading
//! alpha ramp), demotes older hops into a capped `older` ring (drawn uniformly
//! dim), and tracks which hop, if any, is in flight right now.

use bevy::math::DVec2;
use std::collections::{BTreeMap, VecDeque};

pub const DEFAULT_RECENT_CAPACITY: usize = 5;
pub const DEFAULT_OLDER_CAPACITY: usize = 200;

/// One journey's origin -> destination hop with timing.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub journey_id: String,
    pub from: DVec2,
    pub to: DVec2,
    pub departure_ms: i64,
    pub arrival_ms: i64,
    pub origin: String,
    pub destination: String,
    pub flight_mode: Option<String>,
}

impl Segment {
    /// True while `now_ms` lies inside the closed departure/arrival window.
    pub fn is_in_flight(&self, now_ms: i64) -> bool {
        self.departure_ms <= now_ms && now_ms <= self.arrival_ms
    }
}

/// Retention limits shared by every ship.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrailLimits {
    pub recent: usize,
    pub older: usize,
}

impl Default for TrailLimits {
    fn default() -> Self {
        Self {
            recent: DEFAULT_RECENT_CAPACITY,
            older: DEFAULT_OLDER_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ShipTrail {
    /// Most recent first.
    pub recent: VecDeque<Segment>,
    /// Most recent first; the back is evicted when over capacity.
    pub older: VecDeque<Segment>,
    pub active: Option<Segment>,
    /// Segments dropped from the back of `older`.
    pub evicted: usize,
}

impl ShipTrail {
    /// Insert or replace a segment keyed by `journey_id`.
    pub fn insert(&mut self, segment: Segment, limits: TrailLimits) {
        self.remove(&segment.journey_id);

        self.recent.push_front(segment);
        while self.recent.len() > limits.recent.max(1) {
            if let Some(demoted) = self.recent.pop_back() {
                self.older.push_front(demoted);
            }
        }
        while self.older.len() > limits.older {
            self.older.pop_back();
            self.evicted += 1;
        }
    }

    /// Remove every segment with `journey_id`. Returns how many were removed.
    pub fn remove(&mut self, journey_id: &str) -> usize {
        let before = self.recent.len() + self.older.len();
        self.recent.retain(|s| s.journey_id != journey_id);
        self.older.retain(|s| s.journey_id != journey_id);
        if self
            .active
            .as_ref()
            .is_some_and(|s| s.journey_id == journey_id)
        {
            self.active = None;
        }
        before - self.recent.len() - self.older.len()
    }

    /// Pick the in-flight segment among `recent`. When journeys overlap the
    /// latest departure wins, ties going to the most recently inserted.
    pub fn refresh_active(&mut self, now_ms: i64) -> Option<&Segment> {
        self.active = self
            .recent
            .iter()
            .rev()
            .filter(|s| s.is_in_flight(now_ms))
            .max_by_key(|s| s.departure_ms)
            .cloned();
        self.active.as_ref()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.recent.iter().chain(self.older.iter())
    }

    pub fn len(&self) -> usize {
        self.recent.len() + self.older.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trails for every ship seen on the stream, ordered by ship symbol.
#[derive(Clone, Debug, Default)]
pub struct TrailStore {
    ships: BTreeMap<String, ShipTrail>,
    limits: TrailLimits,
}

impl TrailStore {
    pub fn new(limits: TrailLimits) -> Self {
        Self {
            ships: BTreeMap::new(),
            limits,
        }
    }

    pub fn insert(&mut self, ship_symbol: &str, segment: Segment) {
        let limits = self.limits;
        self.ships
            .entry(ship_symbol.to_string())
            .or_default()
            .insert(segment, limits);
    }

    pub fn refresh_active(&mut self, now_ms: i64) {
        for trail in self.ships.values_mut() {
            trail.refresh_active(now_ms);
        }
    }

    pub fn get(&self, ship_symbol: &str) -> Option<&ShipTrail> {
        self.ships.get(ship_symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ShipTrail)> {
        self.ships.iter()
    }

    /// Every segment endpoint across all ships.
    pub fn endpoints(&self) -> impl Iterator<Item = DVec2> + '_ {
        self.ships
            .values()
            .flat_map(|t| t.segments())
            .flat_map(|s| [s.from, s.to])
    }

    /// Segments evicted from `older` across all ships.
    pub fn evicted(&self) -> usize {
        self.ships.values().map(|t| t.evicted).sum()
    }

    pub fn ship_count(&self) -> usize {
        self.ships.len()
    }

    pub fn clear(&mut self) {
        self.ships.clear();
    }
}
