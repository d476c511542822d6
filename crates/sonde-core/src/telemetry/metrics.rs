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

//! Abstract definitions for measurement schemas and records.
//!
//! A [`MetricClass`] is an ordered list of [`MetricChannel`]s. Its order is the
//! contract for the value order of every [`MetricEvent`] written for it, and
//! it never changes once the class has been defined.

use crate::telemetry::trace::{MetricInstance, MetricInstanceId};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::sync::Arc;

/// How the values of a channel relate to each other over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricMode {
    /// An instantaneous value valid at the record's timestamp (e.g. a temperature).
    AbsolutePoint,
    /// A counter accumulated since an arbitrary origin (e.g. total energy).
    Accumulated,
}

/// One named, unit-tagged channel of a schema.
///
/// Every channel carries `f64` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricChannel {
    /// The channel name (e.g. "Power Usage").
    pub name: String,
    /// A human-readable description of what the channel measures.
    pub description: String,
    /// The unit of the values (e.g. "W", "%").
    pub unit: String,
    /// The semantic kind of the values.
    pub mode: MetricMode,
}

impl MetricChannel {
    /// Creates a channel carrying instantaneous values.
    pub fn point(
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            unit: unit.into(),
            mode: MetricMode::AbsolutePoint,
        }
    }

    /// Creates a channel carrying an accumulating counter.
    pub fn accumulated(
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            unit: unit.into(),
            mode: MetricMode::Accumulated,
        }
    }
}

/// The sink-assigned identifier of a [`MetricClass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetricClassId(pub u64);

impl Display for MetricClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// An ordered, immutable list of channels, defined once by a trace sink.
///
/// Cloning a class is cheap; clones share the same channel list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricClass {
    id: MetricClassId,
    channels: Arc<[MetricChannel]>,
}

impl MetricClass {
    /// Creates a class from an id and its ordered channels.
    ///
    /// Only trace sinks should call this; recorders obtain classes through
    /// [`TraceSink::define_metric_class`](crate::telemetry::trace::TraceSink::define_metric_class).
    pub fn new(id: MetricClassId, channels: Vec<MetricChannel>) -> Self {
        Self {
            id,
            channels: channels.into(),
        }
    }

    /// Returns the sink-assigned identifier.
    pub fn id(&self) -> MetricClassId {
        self.id
    }

    /// Returns the channels in record order.
    pub fn channels(&self) -> &[MetricChannel] {
        &self.channels
    }

    /// Returns the number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` if the class has no channels.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Returns the position of the channel with the given name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }
}

/// One timestamped record of a metric instance: a value per channel, in
/// channel order.
///
/// Recorders keep one event per stream and overwrite it in place on every
/// tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    timestamp: Timestamp,
    instance: MetricInstanceId,
    values: Vec<f64>,
}

impl MetricEvent {
    /// Creates a zeroed event for the given instance, stamped at
    /// [`Timestamp::GENESIS`].
    pub fn new(instance: &MetricInstance) -> Self {
        Self {
            timestamp: Timestamp::GENESIS,
            instance: instance.id(),
            values: vec![0.0; instance.metric_class().len()],
        }
    }

    /// Returns the event's timestamp.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Sets the event's timestamp.
    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Returns the id of the instance this event belongs to.
    pub fn instance(&self) -> MetricInstanceId {
        self.instance
    }

    /// Returns the values in channel order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns the values for in-place update. The length is fixed by the
    /// schema.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }
}
