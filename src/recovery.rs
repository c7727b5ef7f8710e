/// Service-level recovery
///
/// Tracks the UP/DOWN state of each publisher seen on a subscription
/// channel and decides when the channel must re-open the streams of a
/// service that came back after going down.

use crate::protocol::LinkState;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ServiceMonitor {
    services: HashMap<String, LinkState>,
    recoveries: u64,
}

impl ServiceMonitor {
    pub fn new() -> Self {
        ServiceMonitor::default()
    }

    /// Apply a SERVICE event. Returns true when the service transitioned
    /// DOWN -> UP and its streams need re-opening.
    pub fn on_service(&mut self, service: &str, state: LinkState) -> bool {
        let prev = self.services.insert(service.to_string(), state);
        let recovered = state.is_up() && prev == Some(LinkState::Down);
        if recovered {
            self.recoveries += 1;
        }
        recovered
    }

    /// Connection lost: every known service is down until announced again.
    pub fn on_disconnect(&mut self) {
        for state in self.services.values_mut() {
            *state = LinkState::Down;
        }
    }

    pub fn state(&self, service: &str) -> Option<LinkState> {
        self.services.get(service).copied()
    }

    pub fn is_up(&self, service: &str) -> bool {
        self.state(service).map_or(false, |s| s.is_up())
    }

    /// Number of DOWN -> UP transitions seen
    pub fn recoveries(&self) -> u64 {
        self.recoveries
    }

    pub fn reset(&mut self) {
        self.services.clear();
        self.recoveries = 0;
    }
}
