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

//! Runs alone in its own test binary: it raises SIGTERM at the process.

mod common;

use anyhow::Result;
use common::CounterSampler;
use signal_hook::consts::signal::SIGTERM;
use sonde_core::{CpuId, MonitorConfig};
use sonde_telemetry::{MemoryTrace, MonitorFleet, SingleResourceRecorder};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_run_stops_on_termination_signal() -> Result<()> {
    // --- 1. ARRANGE ---
    let trace = Arc::new(MemoryTrace::new());
    let config = MonitorConfig::new(Duration::from_millis(5));
    let mut fleet = MonitorFleet::new([CpuId(0), CpuId(1)], &config, |cpu| {
        SingleResourceRecorder::new(CounterSampler::new(cpu), trace.as_ref())
    })?;

    let raiser = thread::spawn(|| {
        thread::sleep(Duration::from_millis(200));
        signal_hook::low_level::raise(SIGTERM)
    });

    // --- 2. ACT ---
    let faults = fleet.run()?;

    // --- 3. ASSERT ---
    raiser.join().expect("raiser thread panicked")?;
    assert!(faults.is_empty());
    assert!(trace.events_named("cpu 0").len() > 1);
    assert!(fleet
        .resources()
        .all(|cpu| fleet.monitor(cpu).is_some_and(|m| !m.is_running())));
    Ok(())
}
