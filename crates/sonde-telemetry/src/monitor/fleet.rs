// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A fleet of identical monitors, one per member of a static resource set.

use super::poll_monitor::{PollMonitor, Tick};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use sonde_core::{MonitorConfig, MonitorError, MonitorResult};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Monitors keyed by the resource they sample, e.g. one per CPU.
///
/// The resource set is enumerated once at construction and never changes.
pub struct MonitorFleet<R, T: Tick> {
    monitors: BTreeMap<R, PollMonitor<T>>,
}

impl<R, T> MonitorFleet<R, T>
where
    R: Ord + Copy + Display,
    T: Tick,
{
    /// Builds one idle monitor per resource with `factory`.
    ///
    /// If the factory fails for any resource, the error is returned and the
    /// monitors built so far are dropped.
    pub fn new<I, F>(resources: I, config: &MonitorConfig, mut factory: F) -> MonitorResult<Self>
    where
        I: IntoIterator<Item = R>,
        F: FnMut(R) -> MonitorResult<T>,
    {
        let mut monitors = BTreeMap::new();
        for resource in resources {
            let tick = factory(resource)?;
            monitors.insert(resource, PollMonitor::new(tick, config));
        }

        log::info!("Created a fleet of {} monitors", monitors.len());
        Ok(Self { monitors })
    }

    /// Returns the number of monitors.
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    /// Returns `true` if the resource set was empty.
    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Returns the resources, in ascending order.
    pub fn resources(&self) -> impl Iterator<Item = &R> {
        self.monitors.keys()
    }

    /// Returns the monitor of `resource`.
    pub fn monitor(&self, resource: &R) -> Option<&PollMonitor<T>> {
        self.monitors.get(resource)
    }

    /// Starts every monitor.
    ///
    /// If a monitor fails to start, the ones already started are stopped
    /// again before the error is returned.
    pub fn start_all(&mut self) -> MonitorResult<()> {
        let mut failure = None;
        for (resource, monitor) in &mut self.monitors {
            if let Err(e) = monitor.start() {
                failure = Some((*resource, e));
                break;
            }
        }

        match failure {
            None => Ok(()),
            Some((resource, e)) => {
                log::error!("Failed to start the monitor of {}: {}", resource, e);
                self.stop_all();
                Err(e)
            }
        }
    }

    /// Stops every monitor.
    ///
    /// Returns the faults of the monitors whose loop ended early.
    pub fn stop_all(&mut self) -> Vec<(R, MonitorError)> {
        let mut faults = Vec::new();
        for (resource, monitor) in &mut self.monitors {
            if let Err(e) = monitor.stop() {
                faults.push((*resource, e));
            }
        }
        faults
    }

    /// Starts every monitor, blocks in `wait`, then stops every monitor.
    pub fn run_until<W>(&mut self, wait: W) -> MonitorResult<Vec<(R, MonitorError)>>
    where
        W: FnOnce(),
    {
        self.start_all()?;
        wait();
        let faults = self.stop_all();

        log::info!(
            "Stopped {} monitors, {} ended with a fault",
            self.monitors.len(),
            faults.len()
        );
        Ok(faults)
    }

    /// Runs the fleet until the process receives SIGINT or SIGTERM.
    ///
    /// The signals are registered before any monitor starts, so they are
    /// never delivered to a monitor thread.
    pub fn run(&mut self) -> MonitorResult<Vec<(R, MonitorError)>> {
        let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(MonitorError::Signal)?;
        let handle = signals.handle();

        let faults = self.run_until(|| {
            if let Some(signal) = signals.forever().next() {
                log::info!("Received signal {}, shutting down", signal);
            }
        });

        handle.close();
        faults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonde_core::{CpuId, SourceError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CpuTick {
        name: String,
        fail: bool,
        dropped: Arc<AtomicUsize>,
    }

    impl Drop for CpuTick {
        fn drop(&mut self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Tick for CpuTick {
        fn name(&self) -> &str {
            &self.name
        }

        fn group(&self) -> &'static str {
            "test::CpuTick"
        }

        fn tick(&mut self) -> MonitorResult<()> {
            if self.fail {
                return Err(MonitorError::Read {
                    resource: self.name.clone(),
                    source: SourceError::new("cpu_usage", "offline"),
                });
            }
            Ok(())
        }
    }

    fn config() -> MonitorConfig {
        MonitorConfig::new(Duration::from_millis(5))
    }

    #[test]
    fn test_one_monitor_per_resource() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let fleet = MonitorFleet::new((0..4).map(CpuId), &config(), |cpu| {
            Ok(CpuTick {
                name: cpu.to_string(),
                fail: false,
                dropped: dropped.clone(),
            })
        })
        .unwrap();

        assert_eq!(fleet.len(), 4);
        assert_eq!(
            fleet.resources().copied().collect::<Vec<_>>(),
            vec![CpuId(0), CpuId(1), CpuId(2), CpuId(3)]
        );
        assert_eq!(fleet.monitor(&CpuId(2)).unwrap().name(), "cpu 2");
        assert!(fleet.monitor(&CpuId(9)).is_none());
    }

    #[test]
    fn test_factory_failure_drops_partial_fleet() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let result = MonitorFleet::new((0..4).map(CpuId), &config(), |cpu| {
            if cpu == CpuId(2) {
                return Err(MonitorError::Resolution {
                    resource: cpu.to_string(),
                    source: SourceError::new("cpu_handle", "no such cpu"),
                });
            }
            Ok(CpuTick {
                name: cpu.to_string(),
                fail: false,
                dropped: dropped.clone(),
            })
        });

        assert!(matches!(result, Err(MonitorError::Resolution { .. })));
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_run_until_collects_faults() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut fleet = MonitorFleet::new((0..3).map(CpuId), &config(), |cpu| {
            Ok(CpuTick {
                name: cpu.to_string(),
                fail: cpu == CpuId(1),
                dropped: dropped.clone(),
            })
        })
        .unwrap();

        let faults = fleet
            .run_until(|| std::thread::sleep(Duration::from_millis(50)))
            .unwrap();

        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].0, CpuId(1));
        assert!(matches!(faults[0].1, MonitorError::Read { .. }));
        assert!(fleet.resources().all(|cpu| !fleet.monitor(cpu).unwrap().is_running()));
    }

    #[test]
    fn test_stop_all_is_repeatable() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut fleet = MonitorFleet::new((0..2).map(CpuId), &config(), |cpu| {
            Ok(CpuTick {
                name: cpu.to_string(),
                fail: false,
                dropped: dropped.clone(),
            })
        })
        .unwrap();

        fleet.start_all().unwrap();
        assert!(fleet.stop_all().is_empty());
        assert!(fleet.stop_all().is_empty());
    }
}
