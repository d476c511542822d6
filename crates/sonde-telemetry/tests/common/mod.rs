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

//! Scripted counter sources shared by the integration tests.

#![allow(dead_code)]

use sonde_core::telemetry::{MetricChannel, SystemTreeNode};
use sonde_core::{CpuId, Pid, SourceError};
use sonde_telemetry::{EntitySample, PopulationSnapshot, PopulationSource, ResourceSampler};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A CPU sampler reporting its read count, optionally failing after `fail_after` reads.
#[derive(Debug, Clone)]
pub struct CounterSampler {
    pub cpu: CpuId,
    pub reads: Arc<AtomicU32>,
    pub fail_after: Option<u32>,
}

impl CounterSampler {
    pub fn new(cpu: CpuId) -> Self {
        Self {
            cpu,
            reads: Arc::new(AtomicU32::new(0)),
            fail_after: None,
        }
    }

    pub fn failing_after(cpu: CpuId, reads: u32) -> Self {
        Self {
            fail_after: Some(reads),
            ..Self::new(cpu)
        }
    }
}

impl ResourceSampler for CounterSampler {
    fn name(&self) -> String {
        self.cpu.to_string()
    }

    fn group(&self) -> &'static str {
        "test::CounterSampler"
    }

    fn node(&self) -> SystemTreeNode {
        SystemTreeNode::Cpu(self.cpu)
    }

    fn channels(&self) -> Vec<MetricChannel> {
        vec![
            MetricChannel::point("CPU Usage", "reads so far", "%"),
            MetricChannel::point("CPU Frequency", "fixed frequency", "MHz"),
        ]
    }

    fn read(&mut self, values: &mut [f64]) -> Result<(), SourceError> {
        let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        values[0] = f64::from(reads);
        if matches!(self.fail_after, Some(limit) if reads > limit) {
            return Err(SourceError::new("cpu_frequency", "cpu went offline"));
        }
        values[1] = 2000.0;
        Ok(())
    }
}

/// A population source replaying queued snapshots.
#[derive(Debug, Default)]
pub struct ScriptedPopulation {
    pub snapshots: VecDeque<PopulationSnapshot<Pid>>,
    /// Number of label lookups that fail before one succeeds, per pid.
    pub label_failures: HashMap<Pid, u32>,
    pub label_calls: Vec<Pid>,
    pub watermarks: Vec<u64>,
}

impl ScriptedPopulation {
    pub fn push(&mut self, samples: Vec<EntitySample<Pid>>) {
        self.snapshots.push_back(PopulationSnapshot::new(samples));
    }
}

pub fn sample(pid: u32, timestamp: u64, load: f64) -> EntitySample<Pid> {
    EntitySample::new(Pid(pid), timestamp, vec![Some(load), Some(load * 2.0)])
}

impl PopulationSource for ScriptedPopulation {
    type Entity = Pid;

    fn name(&self) -> String {
        "gpu 0 (Mock)".to_string()
    }

    fn group(&self) -> &'static str {
        "test::ScriptedPopulation"
    }

    fn node(&self) -> SystemTreeNode {
        SystemTreeNode::Host
    }

    fn channels(&self, label: &str) -> Vec<MetricChannel> {
        vec![
            MetricChannel::point(format!("SM Utilization, {label}"), "sm", "%"),
            MetricChannel::point(format!("Used GPU Memory, {label}"), "memory", "MB"),
        ]
    }

    fn read_population(&mut self, watermark: u64) -> Result<PopulationSnapshot<Pid>, SourceError> {
        self.watermarks.push(watermark);
        Ok(self.snapshots.pop_front().unwrap_or_default())
    }

    fn resolve_label(&mut self, pid: Pid) -> Result<String, SourceError> {
        self.label_calls.push(pid);
        if let Some(remaining) = self.label_failures.get_mut(&pid) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SourceError::new("process_name", "process not found"));
            }
        }
        Ok(format!("proc{pid}"))
    }
}
