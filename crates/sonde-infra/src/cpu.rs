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

//! Per-CPU load and frequency sampling.

use sonde_core::telemetry::{MetricChannel, SystemTreeNode};
use sonde_core::{CpuId, MonitorError, MonitorResult, SourceError};
use sonde_telemetry::ResourceSampler;
use sysinfo::{CpuRefreshKind, RefreshKind, System};

/// Samples the usage and frequency of one logical CPU.
///
/// Each sampler owns its `System` so monitors never contend for it. Usage
/// is computed by sysinfo between two consecutive reads.
#[derive(Debug)]
pub struct SysinfoCpuSampler {
    cpu: CpuId,
    index: usize,
    system: System,
}

impl SysinfoCpuSampler {
    /// The log group of CPU recorders.
    pub const GROUP: &'static str = "sysinfo::CpuRecorder";

    /// Resolves `cpu`, failing if the machine has no such CPU.
    pub fn new(cpu: CpuId) -> MonitorResult<Self> {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage()),
        );
        let index = cpu.as_u32() as usize;

        if index >= system.cpus().len() {
            return Err(MonitorError::Resolution {
                resource: cpu.to_string(),
                source: SourceError::new(
                    "cpu_handle",
                    format!("only {} cpus online", system.cpus().len()),
                ),
            });
        }

        Ok(Self { cpu, index, system })
    }

    /// Returns the sampled CPU.
    pub fn cpu(&self) -> CpuId {
        self.cpu
    }
}

impl ResourceSampler for SysinfoCpuSampler {
    fn name(&self) -> String {
        self.cpu.to_string()
    }

    fn group(&self) -> &'static str {
        Self::GROUP
    }

    fn node(&self) -> SystemTreeNode {
        SystemTreeNode::Cpu(self.cpu)
    }

    fn channels(&self) -> Vec<MetricChannel> {
        vec![
            MetricChannel::point("CPU Usage", "Share of time this CPU was busy", "%"),
            MetricChannel::point("CPU Frequency", "Current clock frequency", "MHz"),
        ]
    }

    fn read(&mut self, values: &mut [f64]) -> Result<(), SourceError> {
        self.system
            .refresh_cpu_specifics(CpuRefreshKind::nothing().with_cpu_usage().with_frequency());

        let cpu = self
            .system
            .cpus()
            .get(self.index)
            .ok_or_else(|| SourceError::new("cpu_usage", format!("{} went offline", self.cpu)))?;

        values[0] = f64::from(cpu.cpu_usage());
        values[1] = cpu.frequency() as f64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cpu_resolves() {
        let sampler = SysinfoCpuSampler::new(CpuId(0)).unwrap();
        assert_eq!(sampler.name(), "cpu 0");
        assert_eq!(sampler.node(), SystemTreeNode::Cpu(CpuId(0)));
        assert_eq!(sampler.channels().len(), 2);
    }

    #[test]
    fn test_missing_cpu_is_a_resolution_error() {
        let err = SysinfoCpuSampler::new(CpuId(u32::MAX)).unwrap_err();
        match err {
            MonitorError::Resolution { resource, source } => {
                assert_eq!(resource, "cpu 4294967295");
                assert_eq!(source.call, "cpu_handle");
            }
            other => panic!("expected a resolution error, got {other:?}"),
        }
    }

    #[test]
    fn test_read_reports_usage_in_percent() {
        let mut sampler = SysinfoCpuSampler::new(CpuId(0)).unwrap();
        let mut values = [0.0; 2];

        sampler.read(&mut values).unwrap();

        assert!((0.0..=100.0).contains(&values[0]));
        assert!(values[1] >= 0.0);
    }
}
