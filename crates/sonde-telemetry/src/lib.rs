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

//! Polling monitors, monitor fleets, and metric stream registries.
//!
//! A [`PollMonitor`](monitor::PollMonitor) runs one sampling loop on its own
//! thread. What a loop samples is supplied by a [`Tick`](monitor::Tick): a
//! [`SingleResourceRecorder`](recorder::SingleResourceRecorder) for one fixed
//! resource, or a [`MultiEntityRecorder`](recorder::MultiEntityRecorder) for a
//! changing population of processes. A [`MonitorFleet`](monitor::MonitorFleet)
//! binds one monitor to each member of a static resource set.

pub mod monitor;
pub mod recorder;
pub mod registry;
pub mod storage;
pub mod stream;

pub use monitor::{MonitorFleet, PollMonitor, Tick};
pub use recorder::gpu::{GpuDeviceSampler, GpuProcessSource};
pub use recorder::{
    EntitySample, MultiEntityRecorder, PopulationSnapshot, PopulationSource, ResourceSampler,
    SingleResourceRecorder,
};
pub use registry::EntityMetricRegistry;
pub use storage::{MemoryTrace, TraceStats};
pub use stream::MetricStream;
