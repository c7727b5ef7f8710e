/// Channel statistics
///
/// Per-kind event counters, resubscriptions, and a rolling window of
/// dispatch latencies (decode + routing + callback) in microseconds.

use crate::protocol::{EventKind, EVENT_KINDS};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

const WINDOW_SIZE: usize = 10000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p99_us: u64,
}

impl LatencyStats {
    fn from_window(window: &VecDeque<u64>) -> Option<Self> {
        if window.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = window.iter().copied().collect();
        sorted.sort_unstable();
        let n = sorted.len();
        Some(LatencyStats {
            min_us: sorted[0],
            max_us: sorted[n - 1],
            mean_us: sorted.iter().sum::<u64>() as f64 / n as f64,
            p50_us: sorted[n / 2],
            p99_us: sorted[(n * 99) / 100],
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChannelStats {
    start_time: Option<Instant>,
    events: [u64; EVENT_KINDS],
    decode_errors: u64,
    unresolved: u64,
    resubscribes: u64,
    idle_polls: u64,
    dispatch_latencies: VecDeque<u64>,
}

impl ChannelStats {
    pub fn new() -> Self {
        ChannelStats {
            start_time: None,
            events: [0; EVENT_KINDS],
            decode_errors: 0,
            unresolved: 0,
            resubscribes: 0,
            idle_polls: 0,
            dispatch_latencies: VecDeque::with_capacity(WINDOW_SIZE),
        }
    }

    pub fn record_event(&mut self, kind: EventKind) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
        self.events[kind.index()] += 1;
    }

    pub fn record_dispatch_latency(&mut self, micros: u64) {
        if self.dispatch_latencies.len() >= WINDOW_SIZE {
            self.dispatch_latencies.pop_front();
        }
        self.dispatch_latencies.push_back(micros);
    }

    pub fn record_decode_error(&mut self) {
        self.decode_errors += 1;
    }

    /// An event whose stream matched no watchlist record
    pub fn record_unresolved(&mut self) {
        self.unresolved += 1;
    }

    pub fn record_resubscribes(&mut self, count: usize) {
        self.resubscribes += count as u64;
    }

    pub fn record_idle(&mut self) {
        self.idle_polls += 1;
    }

    pub fn events(&self, kind: EventKind) -> u64 {
        self.events[kind.index()]
    }

    pub fn total_events(&self) -> u64 {
        self.events.iter().sum()
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    pub fn unresolved(&self) -> u64 {
        self.unresolved
    }

    pub fn resubscribes(&self) -> u64 {
        self.resubscribes
    }

    pub fn idle_polls(&self) -> u64 {
        self.idle_polls
    }

    pub fn events_per_sec(&self) -> f64 {
        match self.start_time {
            None => 0.0,
            Some(start) => {
                let elapsed = start.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    self.total_events() as f64 / elapsed
                } else {
                    0.0
                }
            }
        }
    }

    pub fn dispatch_latency_stats(&self) -> Option<LatencyStats> {
        LatencyStats::from_window(&self.dispatch_latencies)
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.start_time.map(|st| st.elapsed())
    }

    pub fn reset(&mut self) {
        *self = ChannelStats::new();
    }

    pub fn log_summary(&self) {
        info!(
            total = self.total_events(),
            updates = self.events(EventKind::Update),
            dead = self.events(EventKind::Status),
            done = self.events(EventKind::StreamDone),
            resubscribes = self.resubscribes,
            decode_errors = self.decode_errors,
            unresolved = self.unresolved,
            per_sec = format!("{:.2}", self.events_per_sec()),
            "channel statistics"
        );
        if let Some(l) = self.dispatch_latency_stats() {
            info!(
                min_us = l.min_us,
                max_us = l.max_us,
                mean_us = format!("{:.2}", l.mean_us),
                p50_us = l.p50_us,
                p99_us = l.p99_us,
                "dispatch latency"
            );
        }
    }
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self::new()
    }
}
