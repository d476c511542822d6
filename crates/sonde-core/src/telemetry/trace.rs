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

//! The contract between recorders and the trace store they write into.
//!
//! A trace sink hands out one [`MetricWriter`] per output stream, defines
//! schemas, and binds schemas to writer locations and system tree nodes.
//! Sinks are shared by every monitor thread of a session, so writer creation
//! must be safe to call concurrently; a writer itself is owned by the one
//! recorder that created it.

use crate::error::TraceResult;
use crate::telemetry::metrics::{MetricChannel, MetricClass, MetricEvent};
use crate::types::{CpuId, GpuId};
use serde::Serialize;
use std::fmt::{self, Debug, Display};

/// The output location of one writer: a sink-assigned id plus the stream name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    /// Sink-assigned, unique within one trace.
    pub id: u64,
    /// The stream name the writer was created with.
    pub name: String,
}

impl Location {
    /// Creates a location.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.name, self.id)
    }
}

/// The placement of a stream in the trace's hardware topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum SystemTreeNode {
    /// The machine as a whole.
    Host,
    /// One logical CPU.
    Cpu(CpuId),
    /// One accelerator device.
    Gpu(GpuId),
}

impl Display for SystemTreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemTreeNode::Host => write!(f, "host"),
            SystemTreeNode::Cpu(cpu) => write!(f, "{cpu}"),
            SystemTreeNode::Gpu(gpu) => write!(f, "{gpu}"),
        }
    }
}

/// The sink-assigned identifier of a [`MetricInstance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MetricInstanceId(pub u64);

/// A schema bound to a writer location and a system tree node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricInstance {
    id: MetricInstanceId,
    metric_class: MetricClass,
    location: Location,
    node: SystemTreeNode,
}

impl MetricInstance {
    /// Creates an instance. Only trace sinks should call this.
    pub fn new(
        id: MetricInstanceId,
        metric_class: MetricClass,
        location: Location,
        node: SystemTreeNode,
    ) -> Self {
        Self {
            id,
            metric_class,
            location,
            node,
        }
    }

    /// Returns the sink-assigned identifier.
    pub fn id(&self) -> MetricInstanceId {
        self.id
    }

    /// Returns the schema of this instance.
    pub fn metric_class(&self) -> &MetricClass {
        &self.metric_class
    }

    /// Returns the location of the writer this instance is bound to.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Returns the system tree node this instance is attached to.
    pub fn node(&self) -> SystemTreeNode {
        self.node
    }
}

/// An output stream of a trace.
pub trait MetricWriter: Send + Debug {
    /// Returns the location of this writer.
    fn location(&self) -> &Location;

    /// Appends one record to the stream.
    fn write(&mut self, event: &MetricEvent) -> TraceResult<()>;
}

/// A shared trace store.
pub trait TraceSink: Send + Sync + Debug + 'static {
    /// Creates a writer for a new stream with the given name.
    ///
    /// Called concurrently from every monitor thread.
    fn create_writer(&self, name: &str) -> TraceResult<Box<dyn MetricWriter>>;

    /// Defines a new schema from an ordered channel list.
    fn define_metric_class(&self, channels: Vec<MetricChannel>) -> TraceResult<MetricClass>;

    /// Binds a schema to a writer location and a system tree node.
    fn metric_instance(
        &self,
        metric_class: &MetricClass,
        location: &Location,
        node: SystemTreeNode,
    ) -> TraceResult<MetricInstance>;
}
