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

//! A sampling loop bound to one thread and one pollable handle.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use sonde_core::{MonitorConfig, MonitorError, MonitorResult};
use std::any::Any;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One measurement-and-forward cycle, driven by a [`PollMonitor`].
pub trait Tick: Send + 'static {
    /// The name of the monitored resource, used for streams and threads.
    fn name(&self) -> &str;

    /// The kind of monitor, used to group log output.
    fn group(&self) -> &'static str;

    /// Performs one sampling step.
    ///
    /// A recoverable error is logged and the loop continues; any other error
    /// ends the loop of the monitor driving this tick.
    fn tick(&mut self) -> MonitorResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Poke,
    Stop,
}

/// Why a [`Wakeup`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Elapsed,
    Poked,
    Stopped,
}

/// The handle a monitor thread blocks on between two ticks.
struct Wakeup {
    signals: Receiver<Signal>,
}

impl Wakeup {
    fn channel() -> (Sender<Signal>, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (tx, Self { signals: rx })
    }

    fn wait_until(&self, deadline: Instant) -> Wake {
        match self.signals.recv_deadline(deadline) {
            Ok(Signal::Poke) => Wake::Poked,
            // A dropped monitor can no longer ask for a stop, so treat it as one.
            Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => Wake::Stopped,
            Err(RecvTimeoutError::Timeout) => Wake::Elapsed,
        }
    }
}

/// Clears the running flag when the monitor thread exits, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

enum State<T> {
    Idle(T),
    Running {
        signals: Sender<Signal>,
        handle: JoinHandle<(T, MonitorResult<()>)>,
    },
    /// The thread panicked and took its tick with it.
    Poisoned,
}

/// Drives one [`Tick`] at a fixed interval on a dedicated thread.
///
/// Each monitor blocks independently between ticks, so a slow counter source
/// only delays its own monitor. Stopping is cooperative: a tick in progress
/// always completes before the thread exits.
pub struct PollMonitor<T: Tick> {
    name: String,
    group: &'static str,
    interval: Duration,
    state: State<T>,
    ticks: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl<T: Tick> PollMonitor<T> {
    /// Creates an idle monitor for the given tick.
    pub fn new(tick: T, config: &MonitorConfig) -> Self {
        Self {
            name: tick.name().to_string(),
            group: tick.group(),
            interval: config.read_interval,
            state: State::Idle(tick),
            ticks: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the name of the monitored resource.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the monitor group.
    pub fn group(&self) -> &'static str {
        self.group
    }

    /// Returns the interval between two ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the number of sampling steps completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Returns `true` while the sampling thread is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the tick while the monitor is not running.
    pub fn get(&self) -> Option<&T> {
        match &self.state {
            State::Idle(tick) => Some(tick),
            _ => None,
        }
    }

    /// Starts the sampling thread.
    ///
    /// Starting a running monitor does nothing. A monitor whose thread
    /// panicked cannot be started again.
    pub fn start(&mut self) -> MonitorResult<()> {
        let tick = match mem::replace(&mut self.state, State::Poisoned) {
            State::Idle(tick) => tick,
            running @ State::Running { .. } => {
                log::warn!("[{}] '{}' is already running", self.group, self.name);
                self.state = running;
                return Ok(());
            }
            State::Poisoned => {
                return Err(MonitorError::Panicked(format!(
                    "'{}' lost its state in an earlier panic",
                    self.name
                )));
            }
        };

        let (signals, wakeup) = Wakeup::channel();
        let interval = self.interval;
        let ticks = Arc::clone(&self.ticks);
        let running = Arc::clone(&self.running);
        let group = self.group;

        running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(format!("{}: {}", group, self.name))
            .spawn(move || {
                let _guard = RunningGuard(running);
                run_loop(tick, &wakeup, interval, &ticks)
            });

        match spawned {
            Ok(handle) => {
                log::debug!("[{}] started '{}'", self.group, self.name);
                self.state = State::Running { signals, handle };
                Ok(())
            }
            Err(e) => {
                // The closure, and the tick inside it, is gone with the failed spawn.
                self.running.store(false, Ordering::SeqCst);
                Err(MonitorError::Spawn(e))
            }
        }
    }

    /// Wakes the sampling thread for an immediate tick.
    pub fn poke(&self) {
        if let State::Running { signals, .. } = &self.state {
            let _ = signals.send(Signal::Poke);
        }
    }

    /// Stops the sampling thread and waits for it to exit.
    ///
    /// Returns the error that ended the loop early, if any. Calling `stop`
    /// on a monitor that is not running does nothing.
    pub fn stop(&mut self) -> MonitorResult<()> {
        let (signals, handle) = match mem::replace(&mut self.state, State::Poisoned) {
            State::Running { signals, handle } => (signals, handle),
            other => {
                self.state = other;
                return Ok(());
            }
        };

        // Fails only when the loop already ended on its own.
        let _ = signals.send(Signal::Stop);

        match handle.join() {
            Ok((tick, outcome)) => {
                self.state = State::Idle(tick);
                log::debug!(
                    "[{}] stopped '{}' after {} ticks",
                    self.group,
                    self.name,
                    self.ticks()
                );
                outcome
            }
            Err(payload) => {
                let message = panic_message(payload);
                log::error!("[{}] '{}' panicked: {}", self.group, self.name, message);
                Err(MonitorError::Panicked(message))
            }
        }
    }

    /// Stops the monitor and returns its tick, unless the thread panicked.
    pub fn into_inner(mut self) -> Option<T> {
        if let Err(e) = self.stop() {
            log::debug!("[{}] '{}' ended with: {}", self.group, self.name, e);
        }
        match mem::replace(&mut self.state, State::Poisoned) {
            State::Idle(tick) => Some(tick),
            _ => None,
        }
    }
}

impl<T: Tick> Drop for PollMonitor<T> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("[{}] '{}' ended with: {}", self.group, self.name, e);
        }
    }
}

fn run_loop<T: Tick>(
    mut tick: T,
    wakeup: &Wakeup,
    interval: Duration,
    ticks: &AtomicU64,
) -> (T, MonitorResult<()>) {
    let mut deadline = Instant::now() + interval;

    loop {
        match wakeup.wait_until(deadline) {
            Wake::Stopped => break,
            Wake::Poked => {}
            Wake::Elapsed => {
                deadline += interval;
                // Skip the ticks a slow sampling step made us miss.
                let now = Instant::now();
                if deadline <= now {
                    deadline = now + interval;
                }
            }
        }

        match tick.tick() {
            Ok(()) => {
                ticks.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_recoverable() => {
                log::debug!("[{}] '{}': {}", tick.group(), tick.name(), e);
                ticks.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                log::error!("[{}] '{}' failed: {}", tick.group(), tick.name(), e);
                return (tick, Err(e));
            }
        }
    }

    (tick, Ok(()))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonde_core::SourceError;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct CountingTick {
        count: Arc<AtomicU64>,
        fail_at: Option<u64>,
        recoverable: bool,
    }

    impl Tick for CountingTick {
        fn name(&self) -> &str {
            "counter"
        }

        fn group(&self) -> &'static str {
            "test::CountingTick"
        }

        fn tick(&mut self) -> MonitorResult<()> {
            let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            match self.fail_at {
                Some(at) if n >= at && self.recoverable => Err(MonitorError::EntityResolution {
                    entity: "1".to_string(),
                    source: SourceError::new("name", "gone"),
                }),
                Some(at) if n >= at => Err(MonitorError::Read {
                    resource: "counter".to_string(),
                    source: SourceError::new("read", "broken"),
                }),
                _ => Ok(()),
            }
        }
    }

    fn config(ms: u64) -> MonitorConfig {
        MonitorConfig::new(Duration::from_millis(ms))
    }

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_monitor_ticks_until_stopped() {
        let count = Arc::new(AtomicU64::new(0));
        let mut monitor = PollMonitor::new(
            CountingTick {
                count: Arc::clone(&count),
                ..Default::default()
            },
            &config(5),
        );

        monitor.start().unwrap();
        assert!(monitor.is_running());
        assert!(wait_for(|| count.load(Ordering::SeqCst) >= 3));

        monitor.stop().unwrap();
        assert!(!monitor.is_running());
        let after_stop = count.load(Ordering::SeqCst);
        assert_eq!(monitor.ticks(), after_stop);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_stop_without_ticks() {
        let count = Arc::new(AtomicU64::new(0));
        let mut monitor = PollMonitor::new(
            CountingTick {
                count: Arc::clone(&count),
                ..Default::default()
            },
            &config(60_000),
        );

        monitor.start().unwrap();
        monitor.stop().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(monitor.ticks(), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut monitor = PollMonitor::new(CountingTick::default(), &config(60_000));
        assert!(monitor.stop().is_ok());
        monitor.start().unwrap();
        assert!(monitor.stop().is_ok());
        assert!(monitor.stop().is_ok());
        assert!(monitor.get().is_some());
    }

    #[test]
    fn test_poke_triggers_immediate_tick() {
        let count = Arc::new(AtomicU64::new(0));
        let mut monitor = PollMonitor::new(
            CountingTick {
                count: Arc::clone(&count),
                ..Default::default()
            },
            &config(60_000),
        );

        monitor.start().unwrap();
        monitor.poke();
        assert!(wait_for(|| count.load(Ordering::SeqCst) == 1));
        monitor.stop().unwrap();
        assert_eq!(monitor.ticks(), 1);
    }

    #[test]
    fn test_fatal_error_ends_loop_and_is_reported_on_stop() {
        let count = Arc::new(AtomicU64::new(0));
        let mut monitor = PollMonitor::new(
            CountingTick {
                count: Arc::clone(&count),
                fail_at: Some(2),
                recoverable: false,
            },
            &config(2),
        );

        monitor.start().unwrap();
        assert!(wait_for(|| !monitor.is_running()));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(monitor.ticks(), 1);

        let err = monitor.stop().unwrap_err();
        assert!(matches!(err, MonitorError::Read { .. }));
        // The fault is reported once.
        assert!(monitor.stop().is_ok());
    }

    #[test]
    fn test_recoverable_error_keeps_loop_alive() {
        let count = Arc::new(AtomicU64::new(0));
        let mut monitor = PollMonitor::new(
            CountingTick {
                count: Arc::clone(&count),
                fail_at: Some(1),
                recoverable: true,
            },
            &config(2),
        );

        monitor.start().unwrap();
        assert!(wait_for(|| count.load(Ordering::SeqCst) >= 3));
        assert!(monitor.is_running());
        assert!(monitor.stop().is_ok());
    }

    #[test]
    fn test_stop_waits_for_tick_in_progress() {
        struct SlowTick {
            log: Arc<Mutex<Vec<&'static str>>>,
        }

        impl Tick for SlowTick {
            fn name(&self) -> &str {
                "slow"
            }

            fn group(&self) -> &'static str {
                "test::SlowTick"
            }

            fn tick(&mut self) -> MonitorResult<()> {
                self.log.lock().unwrap().push("begin");
                thread::sleep(Duration::from_millis(50));
                self.log.lock().unwrap().push("end");
                Ok(())
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut monitor = PollMonitor::new(
            SlowTick {
                log: Arc::clone(&log),
            },
            &config(60_000),
        );

        monitor.start().unwrap();
        monitor.poke();
        assert!(wait_for(|| !log.lock().unwrap().is_empty()));
        monitor.stop().unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["begin", "end"]);
    }

    #[test]
    fn test_panicking_tick_is_reported() {
        struct PanicTick;

        impl Tick for PanicTick {
            fn name(&self) -> &str {
                "panic"
            }

            fn group(&self) -> &'static str {
                "test::PanicTick"
            }

            fn tick(&mut self) -> MonitorResult<()> {
                panic!("counter source exploded");
            }
        }

        let mut monitor = PollMonitor::new(PanicTick, &config(60_000));
        monitor.start().unwrap();
        monitor.poke();
        assert!(wait_for(|| !monitor.is_running()));

        match monitor.stop() {
            Err(MonitorError::Panicked(message)) => {
                assert!(message.contains("exploded"))
            }
            other => panic!("expected a panic report, got {other:?}"),
        }
        assert!(monitor.into_inner().is_none());
    }

    #[test]
    fn test_into_inner_returns_tick() {
        let count = Arc::new(AtomicU64::new(0));
        let mut monitor = PollMonitor::new(
            CountingTick {
                count: Arc::clone(&count),
                ..Default::default()
            },
            &config(60_000),
        );
        monitor.start().unwrap();
        monitor.poke();
        assert!(wait_for(|| count.load(Ordering::SeqCst) == 1));

        let tick = monitor.into_inner().unwrap();
        assert_eq!(tick.count.load(Ordering::SeqCst), 1);
    }
}
