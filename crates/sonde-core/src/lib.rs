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

//! # Sonde Core
//!
//! Foundational crate containing the traits, core types, and interface
//! contracts shared by every part of the collector.
//!
//! This crate defines the abstract "what" of sampling: the shape of a
//! measurement schema, the trace sink a recorder writes into, and the
//! counter sources a recorder reads from. `sonde-telemetry` provides the
//! polling machinery built on top of these contracts, and `sonde-infra`
//! provides concrete implementations backed by the operating system.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use config::MonitorConfig;
pub use error::{MonitorError, MonitorResult, SourceError, TraceError, TraceResult};
pub use types::{CpuId, GpuId, Pid, Timestamp};
pub use utils::timer::Stopwatch;
