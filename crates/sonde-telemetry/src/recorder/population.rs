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

//! Recording of a changing population of entities, one stream per entity.
//!
//! A [`PopulationSource`] reports which entities were active since a
//! watermark, together with their measurements. The
//! [`MultiEntityRecorder`] registers each entity the first time it shows up
//! and forwards every later measurement to the entity's own stream.

use crate::monitor::Tick;
use crate::registry::EntityMetricRegistry;
use crate::stream::MetricStream;
use sonde_core::telemetry::{MetricChannel, SystemTreeNode, TraceSink};
use sonde_core::{MonitorError, MonitorResult, SourceError, Timestamp};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::Arc;

/// One measurement of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySample<E> {
    /// The measured entity.
    pub entity: E,
    /// When the measurement was taken, in microseconds since the UNIX epoch.
    pub timestamp: u64,
    /// One value per channel. `None` keeps the channel's previous value.
    pub values: Vec<Option<f64>>,
}

impl<E> EntitySample<E> {
    /// Creates a sample.
    pub fn new(entity: E, timestamp: u64, values: Vec<Option<f64>>) -> Self {
        Self {
            entity,
            timestamp,
            values,
        }
    }
}

/// The result of one population query.
///
/// A snapshot may carry a deferred fault: a secondary source call that
/// failed after the samples themselves were obtained. The recorder handles
/// every sample first and only then escalates the fault.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationSnapshot<E> {
    samples: Vec<EntitySample<E>>,
    deferred: Option<SourceError>,
}

impl<E> PopulationSnapshot<E> {
    /// A snapshot with no active entities.
    pub fn empty() -> Self {
        Self {
            samples: Vec::new(),
            deferred: None,
        }
    }

    /// A snapshot holding `samples`, in source order.
    pub fn new(samples: Vec<EntitySample<E>>) -> Self {
        Self {
            samples,
            deferred: None,
        }
    }

    /// Attaches a fault to be escalated once the samples are recorded.
    pub fn with_deferred(mut self, fault: SourceError) -> Self {
        self.deferred = Some(fault);
        self
    }

    /// Returns the samples.
    pub fn samples(&self) -> &[EntitySample<E>] {
        &self.samples
    }

    /// Returns the deferred fault, if any.
    pub fn deferred(&self) -> Option<&SourceError> {
        self.deferred.as_ref()
    }

    /// Returns `true` if the snapshot holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the most recent sample timestamp.
    pub fn latest_timestamp(&self) -> Option<u64> {
        self.samples.iter().map(|sample| sample.timestamp).max()
    }

    fn into_parts(self) -> (Vec<EntitySample<E>>, Option<SourceError>) {
        (self.samples, self.deferred)
    }
}

impl<E> Default for PopulationSnapshot<E> {
    fn default() -> Self {
        Self::empty()
    }
}

/// A source of per-entity measurements for a changing set of entities.
pub trait PopulationSource: Send + 'static {
    /// The identity of one entity, e.g. a process id.
    type Entity: Copy + Eq + Hash + Debug + Display + Send;

    /// The recorder name; per-entity writers are named `"{name} {label}"`.
    fn name(&self) -> String;

    /// The kind of monitor, used to group log output.
    fn group(&self) -> &'static str;

    /// Where every entity stream sits in the system tree.
    fn node(&self) -> SystemTreeNode;

    /// The channels of one entity, named after its label.
    fn channels(&self, label: &str) -> Vec<MetricChannel>;

    /// Returns the entities active since `watermark` (microseconds) along
    /// with their measurements.
    fn read_population(
        &mut self,
        watermark: u64,
    ) -> Result<PopulationSnapshot<Self::Entity>, SourceError>;

    /// Resolves the human-readable label of a newly seen entity.
    fn resolve_label(&mut self, entity: Self::Entity) -> Result<String, SourceError>;
}

/// Samples a [`PopulationSource`] into one stream per entity.
///
/// Only population-level failures end the monitor. Failures that concern a
/// single entity are logged and the entity is skipped for that tick; an
/// entity whose label could not be resolved is retried when it shows up
/// again.
#[derive(Debug)]
pub struct MultiEntityRecorder<P: PopulationSource> {
    source: P,
    name: String,
    sink: Arc<dyn TraceSink>,
    registry: EntityMetricRegistry<P::Entity>,
    watermark: u64,
}

impl<P: PopulationSource> MultiEntityRecorder<P> {
    /// Creates a recorder with an empty registry and a zero watermark.
    pub fn new(source: P, sink: Arc<dyn TraceSink>) -> Self {
        let name = source.name();
        Self {
            source,
            name,
            sink,
            registry: EntityMetricRegistry::new(),
            watermark: 0,
        }
    }

    /// Returns the source.
    pub fn source(&self) -> &P {
        &self.source
    }

    /// Returns the registry of entity streams.
    pub fn registry(&self) -> &EntityMetricRegistry<P::Entity> {
        &self.registry
    }

    /// Returns the most recent sample timestamp seen so far, in microseconds.
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    fn record(&mut self, sample: EntitySample<P::Entity>) {
        let EntitySample {
            entity,
            timestamp,
            values,
        } = sample;
        let timestamp = Timestamp::from_micros(timestamp);

        let result = match self.registry.update(&entity, timestamp, &values) {
            Some(result) => result,
            None => self.register(entity, timestamp, &values),
        };

        match result {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => {
                log::debug!("[{}] skipping {}: {}", self.source.group(), entity, err);
            }
            Err(err) => {
                log::warn!(
                    "[{}] failed to record {} of '{}': {}",
                    self.source.group(),
                    entity,
                    self.name,
                    err
                );
            }
        }
    }

    fn register(
        &mut self,
        entity: P::Entity,
        timestamp: Timestamp,
        values: &[Option<f64>],
    ) -> MonitorResult<()> {
        let label =
            self.source
                .resolve_label(entity)
                .map_err(|source| MonitorError::EntityResolution {
                    entity: entity.to_string(),
                    source,
                })?;

        let writer_name = format!("{} {}", self.name, label);
        let channels = self.source.channels(&label);
        let node = self.source.node();
        let sink = self.sink.as_ref();

        let (stream, _) = self.registry.get_or_try_insert_with(entity, || {
            MetricStream::create(sink, &writer_name, channels, node)
        })?;

        log::debug!(
            "[{}] new entity {} as '{}'",
            self.source.group(),
            entity,
            writer_name
        );
        stream.forward(timestamp, values)
    }
}

impl<P: PopulationSource> Tick for MultiEntityRecorder<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> &'static str {
        self.source.group()
    }

    fn tick(&mut self) -> MonitorResult<()> {
        let snapshot = self
            .source
            .read_population(self.watermark)
            .map_err(|source| MonitorError::PopulationQuery {
                recorder: self.name.clone(),
                source,
            })?;

        if let Some(latest) = snapshot.latest_timestamp() {
            self.watermark = self.watermark.max(latest);
        }

        let (samples, deferred) = snapshot.into_parts();
        log::trace!(
            "[{}] {} samples for '{}'",
            self.source.group(),
            samples.len(),
            self.name
        );
        for sample in samples {
            self.record(sample);
        }

        match deferred {
            Some(source) => Err(MonitorError::PopulationQuery {
                recorder: self.name.clone(),
                source,
            }),
            None => Ok(()),
        }
    }
}
