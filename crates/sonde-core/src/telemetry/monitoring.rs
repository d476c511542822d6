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

//! Contracts for the counter sources and topology a monitor polls.
//!
//! "Monitoring" here means actively calling into a vendor or kernel API to
//! get a snapshot of a resource's state. Every call is synchronous and may
//! fail; failures are reported as [`SourceError`]s naming the call.

use crate::error::SourceError;
use crate::types::{CpuId, GpuId, Pid};
use std::collections::BTreeSet;

/// A specialized `Result` type for counter source calls.
pub type SourceResult<T> = Result<T, SourceError>;

/// The clock domains of an accelerator device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockDomain {
    /// The graphics engine clock.
    Graphics,
    /// The streaming multiprocessor clock.
    Sm,
    /// The memory clock.
    Memory,
    /// The video encoder/decoder clock.
    Video,
}

/// The direction of PCIe traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcieDirection {
    /// Device to host.
    Tx,
    /// Host to device.
    Rx,
}

/// Device-wide utilization over the last sample period, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UtilizationRates {
    /// Percentage of time a kernel was executing.
    pub gpu: u32,
    /// Percentage of time device memory was being read or written.
    pub memory: u32,
}

/// One per-process utilization sample of an accelerator device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessUtilizationSample {
    /// The sampled process. A pid of 0 marks an invalid sample set.
    pub pid: Pid,
    /// Device timestamp of the sample, in microseconds.
    pub timestamp: u64,
    /// Streaming multiprocessor utilization, in percent.
    pub sm_util: u32,
    /// Frame buffer memory utilization, in percent.
    pub mem_util: u32,
    /// Encoder utilization, in percent.
    pub enc_util: u32,
    /// Decoder utilization, in percent.
    pub dec_util: u32,
}

/// Device memory held by one running process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessMemoryInfo {
    /// The process holding the memory.
    pub pid: Pid,
    /// Bytes of device memory in use, if the driver reports it.
    pub used_gpu_memory: Option<u64>,
}

/// A vendor device-management API exposing accelerator counters.
///
/// All counters are reported in the source's native units; recorders
/// convert them when they build records.
pub trait DeviceCounterSource: Send + Sync + 'static {
    /// A handle to one physical device.
    type Device: Send + 'static;

    /// Resolves a device index to a handle.
    fn device_handle(&self, gpu: GpuId) -> SourceResult<Self::Device>;

    /// Returns the product name of the device.
    fn device_name(&self, device: &Self::Device) -> SourceResult<String>;

    /// Board power draw, in milliwatts.
    fn power_usage_mw(&self, device: &Self::Device) -> SourceResult<u32>;

    /// Die temperature, in degrees Celsius.
    fn temperature_c(&self, device: &Self::Device) -> SourceResult<u32>;

    /// Fan speed, in percent of the maximum.
    fn fan_speed_pct(&self, device: &Self::Device) -> SourceResult<u32>;

    /// Current clock of a clock domain, in kilohertz.
    fn clock_khz(&self, device: &Self::Device, domain: ClockDomain) -> SourceResult<u32>;

    /// Device-wide utilization rates.
    fn utilization(&self, device: &Self::Device) -> SourceResult<UtilizationRates>;

    /// Current performance state (0 is the maximum performance state).
    fn performance_state(&self, device: &Self::Device) -> SourceResult<u32>;

    /// PCIe throughput in one direction, in bytes per second.
    fn pcie_throughput_bps(
        &self,
        device: &Self::Device,
        direction: PcieDirection,
    ) -> SourceResult<u64>;

    /// Energy consumed since the driver was loaded, in millijoules.
    fn total_energy_mj(&self, device: &Self::Device) -> SourceResult<u64>;

    /// Bitmask of the reasons currently throttling the clocks.
    fn throttle_reasons(&self, device: &Self::Device) -> SourceResult<u64>;

    /// Per-process utilization samples newer than `since` (a device
    /// timestamp in microseconds). An empty vector means no new data.
    fn process_utilization(
        &self,
        device: &Self::Device,
        since: u64,
    ) -> SourceResult<Vec<ProcessUtilizationSample>>;

    /// Device memory usage of the processes currently running on the device.
    fn running_processes(&self, device: &Self::Device) -> SourceResult<Vec<ProcessMemoryInfo>>;

    /// Resolves the name of a process using the device.
    fn process_name(&self, pid: Pid) -> SourceResult<String>;
}

/// Discovery of the machine's static resources.
pub trait TopologyProvider: Send + Sync {
    /// Returns the online logical CPUs, in ascending order.
    fn cpus(&self) -> BTreeSet<CpuId>;
}

/// Best-effort resolution of process names from the operating system.
pub trait NameResolver: Send {
    /// Returns the name of a process.
    fn name_of(&mut self, pid: Pid) -> SourceResult<String>;
}
