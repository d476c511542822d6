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

//! Provides the foundational traits and data structures for sampling.
//!
//! This module defines the "common language" shared by recorders, counter
//! sources, and trace sinks: schemas and records ([`metrics`]), the sources a
//! monitor polls ([`monitoring`]), and the trace store it writes to
//! ([`trace`]).

pub mod metrics;
pub mod monitoring;
pub mod trace;

pub use self::metrics::{MetricChannel, MetricClass, MetricClassId, MetricEvent, MetricMode};
pub use self::monitoring::{
    ClockDomain, DeviceCounterSource, NameResolver, PcieDirection, ProcessMemoryInfo,
    ProcessUtilizationSample, SourceResult, TopologyProvider, UtilizationRates,
};
pub use self::trace::{
    Location, MetricInstance, MetricInstanceId, MetricWriter, SystemTreeNode, TraceSink,
};
