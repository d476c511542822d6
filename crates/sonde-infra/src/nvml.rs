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

//! Accelerator counters from the NVIDIA Management Library.

use nvml_wrapper::enum_wrappers::device::{
    Clock, PcieUtilCounter, PerformanceState, TemperatureSensor,
};
use nvml_wrapper::enums::device::UsedGpuMemory;
use nvml_wrapper::error::NvmlError;
use nvml_wrapper::{Device, Nvml};
use sonde_core::telemetry::{
    ClockDomain, DeviceCounterSource, PcieDirection, ProcessMemoryInfo, ProcessUtilizationSample,
    SourceResult, UtilizationRates,
};
use sonde_core::{GpuId, Pid, SourceError};
use std::collections::BTreeSet;
use std::fmt;

/// Longest process name requested from the driver.
const MAX_PROCESS_NAME: usize = 64;

/// `NVML_PSTATE_UNKNOWN`.
const UNKNOWN_PSTATE: u32 = 32;

fn failed(call: &'static str) -> impl FnOnce(NvmlError) -> SourceError {
    move |err| SourceError::new(call, err.to_string())
}

fn clock(domain: ClockDomain) -> Clock {
    match domain {
        ClockDomain::Graphics => Clock::Graphics,
        ClockDomain::Sm => Clock::SM,
        ClockDomain::Memory => Clock::Memory,
        ClockDomain::Video => Clock::Video,
    }
}

fn pcie_counter(direction: PcieDirection) -> PcieUtilCounter {
    match direction {
        PcieDirection::Tx => PcieUtilCounter::Send,
        PcieDirection::Rx => PcieUtilCounter::Receive,
    }
}

fn pstate_number(state: PerformanceState) -> u32 {
    match state {
        PerformanceState::Zero => 0,
        PerformanceState::One => 1,
        PerformanceState::Two => 2,
        PerformanceState::Three => 3,
        PerformanceState::Four => 4,
        PerformanceState::Five => 5,
        PerformanceState::Six => 6,
        PerformanceState::Seven => 7,
        PerformanceState::Eight => 8,
        PerformanceState::Nine => 9,
        PerformanceState::Ten => 10,
        PerformanceState::Eleven => 11,
        PerformanceState::Twelve => 12,
        PerformanceState::Thirteen => 13,
        PerformanceState::Fourteen => 14,
        PerformanceState::Fifteen => 15,
        PerformanceState::Unknown => UNKNOWN_PSTATE,
    }
}

fn used_bytes(memory: UsedGpuMemory) -> Option<u64> {
    match memory {
        UsedGpuMemory::Used(bytes) => Some(bytes),
        UsedGpuMemory::Unavailable => None,
    }
}

/// A [`DeviceCounterSource`] backed by the NVIDIA driver.
///
/// The library is loaded at runtime, so machines without the driver fail
/// in [`NvmlSource::init`] rather than at link time. Device handles are
/// device indices; every call looks the device up again.
pub struct NvmlSource {
    nvml: Nvml,
}

impl NvmlSource {
    /// Loads and initializes the driver library.
    pub fn init() -> SourceResult<Self> {
        let nvml = Nvml::init().map_err(failed("init"))?;
        Ok(Self { nvml })
    }

    /// Returns every device the driver can see.
    pub fn gpus(&self) -> SourceResult<BTreeSet<GpuId>> {
        let count = self.nvml.device_count().map_err(failed("device_count"))?;
        Ok((0..count).map(GpuId).collect())
    }

    fn on_device<T>(
        &self,
        gpu: &GpuId,
        call: &'static str,
        read: impl FnOnce(&Device<'_>) -> Result<T, NvmlError>,
    ) -> SourceResult<T> {
        let device = self
            .nvml
            .device_by_index(gpu.as_u32())
            .map_err(failed("device_handle"))?;
        read(&device).map_err(failed(call))
    }
}

impl fmt::Debug for NvmlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NvmlSource").finish_non_exhaustive()
    }
}

impl DeviceCounterSource for NvmlSource {
    type Device = GpuId;

    fn device_handle(&self, gpu: GpuId) -> SourceResult<GpuId> {
        self.on_device(&gpu, "device_handle", |_| Ok(()))?;
        Ok(gpu)
    }

    fn device_name(&self, gpu: &GpuId) -> SourceResult<String> {
        self.on_device(gpu, "device_name", |device| device.name())
    }

    fn power_usage_mw(&self, gpu: &GpuId) -> SourceResult<u32> {
        self.on_device(gpu, "power_usage", |device| device.power_usage())
    }

    fn temperature_c(&self, gpu: &GpuId) -> SourceResult<u32> {
        self.on_device(gpu, "temperature", |device| {
            device.temperature(TemperatureSensor::Gpu)
        })
    }

    fn fan_speed_pct(&self, gpu: &GpuId) -> SourceResult<u32> {
        self.on_device(gpu, "fan_speed", |device| device.fan_speed(0))
    }

    fn clock_khz(&self, gpu: &GpuId, domain: ClockDomain) -> SourceResult<u32> {
        let mhz = self.on_device(gpu, "clock_info", |device| device.clock_info(clock(domain)))?;
        Ok(mhz.saturating_mul(1000))
    }

    fn utilization(&self, gpu: &GpuId) -> SourceResult<UtilizationRates> {
        let rates = self.on_device(gpu, "utilization_rates", |device| {
            device.utilization_rates()
        })?;
        Ok(UtilizationRates {
            gpu: rates.gpu,
            memory: rates.memory,
        })
    }

    fn performance_state(&self, gpu: &GpuId) -> SourceResult<u32> {
        let state = self.on_device(gpu, "performance_state", |device| {
            device.performance_state()
        })?;
        Ok(pstate_number(state))
    }

    fn pcie_throughput_bps(&self, gpu: &GpuId, direction: PcieDirection) -> SourceResult<u64> {
        // The driver reports KB/s.
        let kb = self.on_device(gpu, "pcie_throughput", |device| {
            device.pcie_throughput(pcie_counter(direction))
        })?;
        Ok(u64::from(kb) * 1024)
    }

    fn total_energy_mj(&self, gpu: &GpuId) -> SourceResult<u64> {
        self.on_device(gpu, "total_energy_consumption", |device| {
            device.total_energy_consumption()
        })
    }

    fn throttle_reasons(&self, gpu: &GpuId) -> SourceResult<u64> {
        let reasons = self.on_device(gpu, "current_throttle_reasons", |device| {
            device.current_throttle_reasons()
        })?;
        Ok(reasons.bits())
    }

    fn process_utilization(
        &self,
        gpu: &GpuId,
        since: u64,
    ) -> SourceResult<Vec<ProcessUtilizationSample>> {
        let samples = self.on_device(gpu, "process_utilization", |device| {
            match device.process_utilization_stats(since) {
                Err(NvmlError::NotFound) => Ok(Vec::new()),
                other => other,
            }
        })?;

        Ok(samples
            .into_iter()
            .map(|sample| ProcessUtilizationSample {
                pid: Pid(sample.pid),
                timestamp: sample.timestamp,
                sm_util: sample.sm_util,
                mem_util: sample.mem_util,
                enc_util: sample.enc_util,
                dec_util: sample.dec_util,
            })
            .collect())
    }

    fn running_processes(&self, gpu: &GpuId) -> SourceResult<Vec<ProcessMemoryInfo>> {
        let processes = self.on_device(gpu, "running_graphics_processes", |device| {
            device.running_graphics_processes()
        })?;

        Ok(processes
            .into_iter()
            .map(|info| ProcessMemoryInfo {
                pid: Pid(info.pid),
                used_gpu_memory: used_bytes(info.used_gpu_memory),
            })
            .collect())
    }

    fn process_name(&self, pid: Pid) -> SourceResult<String> {
        self.nvml
            .sys_process_name(pid.as_u32(), MAX_PROCESS_NAME)
            .map_err(failed("process_name"))
    }
}
