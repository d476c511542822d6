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

//! Concrete implementations of the sonde external interfaces.
//!
//! - [`topology`]: static resource discovery through `sysinfo`.
//! - [`cpu`]: a per-CPU [`ResourceSampler`](sonde_telemetry::ResourceSampler).
//! - [`process`]: a per-process [`PopulationSource`](sonde_telemetry::PopulationSource).
//! - [`nvml`]: NVIDIA accelerator counters for the GPU recorders.
//! - [`trace`]: file-backed trace sinks.

#![warn(missing_docs)]

pub mod cpu;
pub mod nvml;
pub mod process;
pub mod topology;
pub mod trace;

pub use cpu::SysinfoCpuSampler;
pub use nvml::NvmlSource;
pub use process::SysinfoProcessSource;
pub use topology::SysinfoTopology;
pub use trace::JsonLinesTrace;
