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

//! Accelerator device recorders built on a [`DeviceCounterSource`].
//!
//! [`GpuDeviceSampler`] reads the full device counter vector for a
//! [`SingleResourceRecorder`](crate::SingleResourceRecorder);
//! [`GpuProcessSource`] reports per-process utilization for a
//! [`MultiEntityRecorder`](crate::MultiEntityRecorder).

use super::population::{EntitySample, PopulationSnapshot, PopulationSource};
use super::resource::ResourceSampler;
use sonde_core::telemetry::{
    ClockDomain, DeviceCounterSource, MetricChannel, PcieDirection, ProcessMemoryInfo,
    SystemTreeNode,
};
use sonde_core::{GpuId, MonitorError, MonitorResult, Pid, SourceError};
use std::fmt;
use std::sync::Arc;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Resolves `gpu` and builds its display name, `"gpu N (product)"`.
///
/// A failing product-name lookup falls back to `"gpu N"`.
fn resolve<D: DeviceCounterSource>(
    source: &D,
    gpu: GpuId,
    group: &str,
) -> MonitorResult<(D::Device, String)> {
    let device = source
        .device_handle(gpu)
        .map_err(|source| MonitorError::Resolution {
            resource: gpu.to_string(),
            source,
        })?;

    let name = match source.device_name(&device) {
        Ok(product) => format!("{gpu} ({product})"),
        Err(err) => {
            log::debug!("[{group}] no product name for {gpu}: {err}");
            gpu.to_string()
        }
    };
    Ok((device, name))
}

/// Reads the device-level counters of one accelerator.
pub struct GpuDeviceSampler<D: DeviceCounterSource> {
    source: Arc<D>,
    device: D::Device,
    gpu: GpuId,
    name: String,
}

impl<D: DeviceCounterSource> GpuDeviceSampler<D> {
    /// The log group of device recorders.
    pub const GROUP: &'static str = "nvml::MetricRecorder";

    /// Resolves `gpu` through `source`.
    pub fn new(source: Arc<D>, gpu: GpuId) -> MonitorResult<Self> {
        let (device, name) = resolve(source.as_ref(), gpu, Self::GROUP)?;
        Ok(Self {
            source,
            device,
            gpu,
            name,
        })
    }

    /// Returns the sampled device.
    pub fn gpu(&self) -> GpuId {
        self.gpu
    }
}

impl<D: DeviceCounterSource> fmt::Debug for GpuDeviceSampler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuDeviceSampler")
            .field("gpu", &self.gpu)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<D: DeviceCounterSource> ResourceSampler for GpuDeviceSampler<D> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn group(&self) -> &'static str {
        Self::GROUP
    }

    fn node(&self) -> SystemTreeNode {
        SystemTreeNode::Gpu(self.gpu)
    }

    fn channels(&self) -> Vec<MetricChannel> {
        vec![
            MetricChannel::point("Power Usage", "Board power draw", "W"),
            MetricChannel::point("Temperature", "GPU core temperature", "C"),
            MetricChannel::point("Fan Speed", "Intended fan speed", "%"),
            MetricChannel::point("Graphics Clock", "Graphics clock frequency", "MHz"),
            MetricChannel::point("SM Clock", "Streaming multiprocessor clock frequency", "MHz"),
            MetricChannel::point("Memory Clock", "Memory clock frequency", "MHz"),
            MetricChannel::point("Video Clock", "Video encoder/decoder clock frequency", "MHz"),
            MetricChannel::point("GPU Utilization", "Time spent executing kernels", "%"),
            MetricChannel::point("Memory Utilization", "Time spent accessing device memory", "%"),
            MetricChannel::point("Performance State", "Current P-state", "#"),
            MetricChannel::point("PCIe TX Throughput", "PCIe transmit throughput", "KiB/s"),
            MetricChannel::point("PCIe RX Throughput", "PCIe receive throughput", "KiB/s"),
            MetricChannel::accumulated("Total Energy", "Energy consumed since driver load", "J"),
            MetricChannel::point("Throttle Reasons", "Clock throttle reason bitmask", "#"),
        ]
    }

    fn read(&mut self, values: &mut [f64]) -> Result<(), SourceError> {
        let source = self.source.as_ref();
        let device = &self.device;

        values[0] = f64::from(source.power_usage_mw(device)?) / 1000.0;
        values[1] = f64::from(source.temperature_c(device)?);
        values[2] = f64::from(source.fan_speed_pct(device)?);
        values[3] = f64::from(source.clock_khz(device, ClockDomain::Graphics)?) / 1000.0;
        values[4] = f64::from(source.clock_khz(device, ClockDomain::Sm)?) / 1000.0;
        values[5] = f64::from(source.clock_khz(device, ClockDomain::Memory)?) / 1000.0;
        values[6] = f64::from(source.clock_khz(device, ClockDomain::Video)?) / 1000.0;

        let utilization = source.utilization(device)?;
        values[7] = f64::from(utilization.gpu);
        values[8] = f64::from(utilization.memory);

        values[9] = f64::from(source.performance_state(device)?);
        values[10] = source.pcie_throughput_bps(device, PcieDirection::Tx)? as f64 / 1024.0;
        values[11] = source.pcie_throughput_bps(device, PcieDirection::Rx)? as f64 / 1024.0;
        // Whole joules.
        values[12] = (source.total_energy_mj(device)? / 1000) as f64;
        values[13] = source.throttle_reasons(device)? as f64;
        Ok(())
    }
}

/// Reports per-process utilization of one accelerator.
pub struct GpuProcessSource<D: DeviceCounterSource> {
    source: Arc<D>,
    device: D::Device,
    gpu: GpuId,
    name: String,
}

impl<D: DeviceCounterSource> GpuProcessSource<D> {
    /// The log group of process recorders.
    pub const GROUP: &'static str = "nvml::ProcessMonitor";

    /// Resolves `gpu` through `source`.
    pub fn new(source: Arc<D>, gpu: GpuId) -> MonitorResult<Self> {
        let (device, name) = resolve(source.as_ref(), gpu, Self::GROUP)?;
        Ok(Self {
            source,
            device,
            gpu,
            name,
        })
    }

    /// Returns the sampled device.
    pub fn gpu(&self) -> GpuId {
        self.gpu
    }
}

impl<D: DeviceCounterSource> fmt::Debug for GpuProcessSource<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuProcessSource")
            .field("gpu", &self.gpu)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn used_memory_mb(memory: &[ProcessMemoryInfo], pid: Pid) -> Option<f64> {
    memory
        .iter()
        .rev()
        .find(|info| info.pid == pid)
        .and_then(|info| info.used_gpu_memory)
        .map(|bytes| (bytes / BYTES_PER_MB) as f64)
}

impl<D: DeviceCounterSource> PopulationSource for GpuProcessSource<D> {
    type Entity = Pid;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn group(&self) -> &'static str {
        Self::GROUP
    }

    fn node(&self) -> SystemTreeNode {
        SystemTreeNode::Gpu(self.gpu)
    }

    fn channels(&self, label: &str) -> Vec<MetricChannel> {
        vec![
            MetricChannel::point(
                format!("Decoder Utilization, {label}"),
                "GPU decoder utilization by this process",
                "%",
            ),
            MetricChannel::point(
                format!("Encoder Utilization, {label}"),
                "GPU encoder utilization by this process",
                "%",
            ),
            MetricChannel::point(
                format!("Memory Utilization, {label}"),
                "GPU memory utilization by this process",
                "%",
            ),
            MetricChannel::point(
                format!("SM Utilization, {label}"),
                "GPU SM utilization by this process",
                "%",
            ),
            MetricChannel::point(
                format!("Used GPU Memory, {label}"),
                "GPU memory used by this process",
                "MB",
            ),
        ]
    }

    fn read_population(&mut self, watermark: u64) -> Result<PopulationSnapshot<Pid>, SourceError> {
        let samples = self.source.process_utilization(&self.device, watermark)?;

        // The driver reports a zeroed sample set when it has nothing new.
        match samples.first() {
            Some(first) if first.pid != Pid(0) => {}
            _ => return Ok(PopulationSnapshot::empty()),
        }

        let (memory, deferred) = match self.source.running_processes(&self.device) {
            Ok(memory) => (memory, None),
            Err(err) => (Vec::new(), Some(err)),
        };

        let samples = samples
            .iter()
            .map(|sample| {
                EntitySample::new(
                    sample.pid,
                    sample.timestamp,
                    vec![
                        Some(f64::from(sample.dec_util)),
                        Some(f64::from(sample.enc_util)),
                        Some(f64::from(sample.mem_util)),
                        Some(f64::from(sample.sm_util)),
                        used_memory_mb(&memory, sample.pid),
                    ],
                )
            })
            .collect();

        let snapshot = PopulationSnapshot::new(samples);
        Ok(match deferred {
            Some(fault) => snapshot.with_deferred(fault),
            None => snapshot,
        })
    }

    fn resolve_label(&mut self, pid: Pid) -> Result<String, SourceError> {
        self.source.process_name(pid)
    }
}
