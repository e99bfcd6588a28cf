//! Idle/active tracking for configured service ports
//!
//! A service is active while its port keeps receiving packets and goes idle
//! once no new packets arrive for the idle timeout. Only state transitions
//! are reported; acting on them is left to whoever reads the log.

use crate::config::ServiceConfig;
use crate::metrics::Poll;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Active,
    Idle,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Active => write!(f, "active"),
            ServiceState::Idle => write!(f, "idle"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// An idle service received new traffic
    Woke { port: u16, name: String },
    /// An active service saw no traffic for at least the idle timeout
    WentIdle {
        port: u16,
        name: String,
        idle_for: Duration,
    },
}

#[derive(Debug)]
struct TrackedService {
    name: String,
    idle_timeout: Duration,
    last_traffic: Instant,
    state: ServiceState,
}

#[derive(Debug)]
pub struct ActivityTracker {
    services: BTreeMap<u16, TrackedService>,
}

impl ActivityTracker {
    /// Every service starts active, as if it had just seen traffic at `now`.
    /// `idle_timeout` applies to services without their own timeout.
    pub fn new(
        services: &BTreeMap<u16, ServiceConfig>,
        idle_timeout: Duration,
        now: Instant,
    ) -> Self {
        let mut tracker = Self {
            services: BTreeMap::new(),
        };
        tracker.update_services(services, idle_timeout, now);
        tracker
    }

    /// Replace the set of tracked services after a config reload.
    ///
    /// Ports that stay configured keep their state and last traffic time;
    /// new ports start active at `now`; removed ports are forgotten.
    pub fn update_services(
        &mut self,
        services: &BTreeMap<u16, ServiceConfig>,
        idle_timeout: Duration,
        now: Instant,
    ) {
        self.services.retain(|port, _| services.contains_key(port));

        for (port, service) in services {
            let timeout = service.idle_timeout(idle_timeout);
            self.services
                .entry(*port)
                .and_modify(|tracked| {
                    tracked.name = service.name.clone();
                    tracked.idle_timeout = timeout;
                })
                .or_insert_with(|| TrackedService {
                    name: service.name.clone(),
                    idle_timeout: timeout,
                    last_traffic: now,
                    state: ServiceState::Active,
                });
        }
    }

    pub fn observe(&mut self, poll: &Poll, now: Instant) -> Vec<Transition> {
        let mut transitions = Vec::new();

        for (port, service) in self.services.iter_mut() {
            if poll.delta(*port) > 0 {
                service.last_traffic = now;
                if service.state == ServiceState::Idle {
                    service.state = ServiceState::Active;
                    transitions.push(Transition::Woke {
                        port: *port,
                        name: service.name.clone(),
                    });
                }
                continue;
            }

            let idle_for = now.saturating_duration_since(service.last_traffic);
            if service.state == ServiceState::Active && idle_for >= service.idle_timeout {
                service.state = ServiceState::Idle;
                transitions.push(Transition::WentIdle {
                    port: *port,
                    name: service.name.clone(),
                    idle_for,
                });
            }
        }

        transitions
    }

    pub fn state(&self, port: u16) -> Option<ServiceState> {
        self.services.get(&port).map(|s| s.state)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::PortDelta;

    fn services() -> BTreeMap<u16, ServiceConfig> {
        BTreeMap::from([
            (
                8080,
                ServiceConfig {
                    name: "api".to_string(),
                    idle_timeout_secs: None,
                },
            ),
            (
                9000,
                ServiceConfig {
                    name: "worker".to_string(),
                    idle_timeout_secs: None,
                },
            ),
        ])
    }

    fn poll_with(port: u16, delta: u64) -> Poll {
        Poll {
            deltas: vec![PortDelta {
                port,
                total: delta,
                delta,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_goes_idle_after_timeout() {
        let start = Instant::now();
        let mut tracker = ActivityTracker::new(&services(), Duration::from_secs(60), start);

        let early = tracker.observe(&Poll::default(), start + Duration::from_secs(30));
        assert!(early.is_empty());

        let later = tracker.observe(
            &poll_with(8080, 5),
            start + Duration::from_secs(61),
        );
        assert_eq!(
            later,
            vec![Transition::WentIdle {
                port: 9000,
                name: "worker".to_string(),
                idle_for: Duration::from_secs(61),
            }]
        );
        assert_eq!(tracker.state(8080), Some(ServiceState::Active));
        assert_eq!(tracker.state(9000), Some(ServiceState::Idle));
    }

    #[test]
    fn test_idle_service_wakes_on_traffic() {
        let start = Instant::now();
        let mut tracker = ActivityTracker::new(&services(), Duration::from_secs(10), start);
        tracker.observe(&Poll::default(), start + Duration::from_secs(10));
        assert_eq!(tracker.state(9000), Some(ServiceState::Idle));

        let woke = tracker.observe(&poll_with(9000, 1), start + Duration::from_secs(15));
        assert_eq!(
            woke,
            vec![Transition::Woke {
                port: 9000,
                name: "worker".to_string(),
            }]
        );

        // Idle is reported once, not on every poll
        let again = tracker.observe(&Poll::default(), start + Duration::from_secs(16));
        assert!(again.is_empty());
    }

    #[test]
    fn test_per_service_timeout() {
        let start = Instant::now();
        let mut services = services();
        services.get_mut(&8080).unwrap().idle_timeout_secs = Some(10);
        let mut tracker = ActivityTracker::new(&services, Duration::from_secs(60), start);

        let transitions = tracker.observe(&Poll::default(), start + Duration::from_secs(10));
        assert_eq!(
            transitions,
            vec![Transition::WentIdle {
                port: 8080,
                name: "api".to_string(),
                idle_for: Duration::from_secs(10),
            }]
        );
        assert_eq!(tracker.state(9000), Some(ServiceState::Active));
    }

    #[test]
    fn test_update_services_keeps_existing_state() {
        let start = Instant::now();
        let mut tracker = ActivityTracker::new(&services(), Duration::from_secs(10), start);
        tracker.observe(&poll_with(8080, 1), start + Duration::from_secs(10));
        assert_eq!(tracker.state(9000), Some(ServiceState::Idle));

        let mut reloaded = services();
        reloaded.remove(&8080);
        reloaded.get_mut(&9000).unwrap().name = "batch".to_string();
        reloaded.insert(
            7000,
            ServiceConfig {
                name: "new".to_string(),
                idle_timeout_secs: Some(100),
            },
        );
        tracker.update_services(&reloaded, Duration::from_secs(10), start + Duration::from_secs(12));

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.state(8080), None);
        assert_eq!(tracker.state(9000), Some(ServiceState::Idle));
        assert_eq!(tracker.state(7000), Some(ServiceState::Active));

        // Renamed service wakes under its new name; the new one is not idle yet
        let transitions = tracker.observe(&poll_with(9000, 3), start + Duration::from_secs(50));
        assert_eq!(
            transitions,
            vec![Transition::Woke {
                port: 9000,
                name: "batch".to_string(),
            }]
        );
    }

    #[test]
    fn test_unconfigured_ports_are_ignored() {
        let start = Instant::now();
        let mut tracker = ActivityTracker::new(&BTreeMap::new(), Duration::from_secs(1), start);
        assert!(tracker.is_empty());
        assert!(tracker
            .observe(&poll_with(22, 100), start + Duration::from_secs(5))
            .is_empty());
        assert_eq!(tracker.state(22), None);
    }
}
