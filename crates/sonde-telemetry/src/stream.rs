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

//! One output stream: a metric instance, its writer, and its reusable record.

use sonde_core::telemetry::{
    Location, MetricChannel, MetricEvent, MetricInstance, MetricWriter, SystemTreeNode, TraceSink,
};
use sonde_core::{MonitorResult, Timestamp, TraceError};

/// A {metric instance, writer, record} triple.
///
/// The instance and writer are fixed for the life of the stream; only the
/// record's timestamp and values change between writes.
#[derive(Debug)]
pub struct MetricStream {
    instance: MetricInstance,
    writer: Box<dyn MetricWriter>,
    event: MetricEvent,
    writes: u64,
}

impl MetricStream {
    /// Defines a schema from `channels`, creates a writer named `name`, and
    /// binds them at `node`.
    ///
    /// The schema is defined first, so a rejected schema leaves no writer
    /// behind. A failure to bind the instance leaves the new writer in the
    /// sink.
    pub fn create(
        sink: &dyn TraceSink,
        name: &str,
        channels: Vec<MetricChannel>,
        node: SystemTreeNode,
    ) -> MonitorResult<Self> {
        let metric_class = sink.define_metric_class(channels)?;
        let writer = sink.create_writer(name)?;
        let instance = sink.metric_instance(&metric_class, writer.location(), node)?;
        let event = MetricEvent::new(&instance);

        Ok(Self {
            instance,
            writer,
            event,
            writes: 0,
        })
    }

    /// Returns the metric instance of this stream.
    pub fn instance(&self) -> &MetricInstance {
        &self.instance
    }

    /// Returns the writer's location.
    pub fn location(&self) -> &Location {
        self.writer.location()
    }

    /// Returns the last record written (or the zeroed initial record).
    pub fn event(&self) -> &MetricEvent {
        &self.event
    }

    /// Returns the number of records written so far.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Overwrites every value of the record and writes it.
    ///
    /// `values` must hold one value per channel, in channel order. A
    /// timestamp at or before the previous record's is moved to just after
    /// it.
    pub fn record(&mut self, timestamp: Timestamp, values: &[f64]) -> MonitorResult<()> {
        self.check_len(values.len())?;
        self.event.values_mut().copy_from_slice(values);
        self.write(timestamp)
    }

    /// Overwrites the values that are present and writes the record.
    ///
    /// A `None` keeps the channel's previous value.
    pub fn forward(&mut self, timestamp: Timestamp, values: &[Option<f64>]) -> MonitorResult<()> {
        self.check_len(values.len())?;
        for (slot, value) in self.event.values_mut().iter_mut().zip(values) {
            if let Some(value) = value {
                *slot = *value;
            }
        }
        self.write(timestamp)
    }

    fn check_len(&self, found: usize) -> MonitorResult<()> {
        let expected = self.instance.metric_class().len();
        if found != expected {
            return Err(TraceError::SchemaMismatch {
                instance: self.location().name.clone(),
                expected,
                found,
            }
            .into());
        }
        Ok(())
    }

    fn write(&mut self, timestamp: Timestamp) -> MonitorResult<()> {
        // Records of one stream are strictly ordered in time.
        let last = self.event.timestamp();
        let timestamp = if self.writes > 0 && timestamp <= last {
            log::trace!(
                "'{}' clamped record at {} to follow {}",
                self.location().name,
                timestamp.0,
                last.0
            );
            Timestamp(last.0.saturating_add(1))
        } else {
            timestamp
        };
        self.event.set_timestamp(timestamp);
        self.writer.write(&self.event)?;
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTrace;
    use sonde_core::telemetry::MetricClass;

    /// A sink that rejects every schema.
    #[derive(Debug, Default)]
    struct RejectingTrace {
        inner: MemoryTrace,
    }

    impl TraceSink for RejectingTrace {
        fn create_writer(&self, name: &str) -> sonde_core::TraceResult<Box<dyn MetricWriter>> {
            self.inner.create_writer(name)
        }

        fn define_metric_class(
            &self,
            _channels: Vec<MetricChannel>,
        ) -> sonde_core::TraceResult<MetricClass> {
            Err(TraceError::Storage("schema rejected".to_string()))
        }

        fn metric_instance(
            &self,
            metric_class: &MetricClass,
            location: &Location,
            node: SystemTreeNode,
        ) -> sonde_core::TraceResult<MetricInstance> {
            self.inner.metric_instance(metric_class, location, node)
        }
    }

    fn channels() -> Vec<MetricChannel> {
        vec![
            MetricChannel::point("A", "first", "%"),
            MetricChannel::point("B", "second", "%"),
        ]
    }

    #[test]
    fn test_create_binds_instance_to_writer() {
        let trace = MemoryTrace::new();
        let stream = MetricStream::create(&trace, "cpu 0", channels(), SystemTreeNode::Host)
            .unwrap();

        assert_eq!(stream.location().name, "cpu 0");
        assert_eq!(stream.instance().location(), stream.location());
        assert_eq!(stream.instance().metric_class().len(), 2);
        assert_eq!(stream.writes(), 0);
        assert_eq!(trace.writer_count(), 1);
    }

    #[test]
    fn test_forward_keeps_missing_values() {
        let trace = MemoryTrace::new();
        let mut stream =
            MetricStream::create(&trace, "s", channels(), SystemTreeNode::Host).unwrap();

        stream.record(Timestamp(1), &[1.0, 2.0]).unwrap();
        stream.forward(Timestamp(2), &[Some(3.0), None]).unwrap();

        assert_eq!(stream.event().values(), &[3.0, 2.0]);
        assert_eq!(stream.event().timestamp(), Timestamp(2));
        assert_eq!(stream.writes(), 2);

        let events = trace.events_at(stream.location().id);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].values(), &[1.0, 2.0]);
        assert_eq!(events[1].values(), &[3.0, 2.0]);
    }

    #[test]
    fn test_wrong_value_count_is_rejected() {
        let trace = MemoryTrace::new();
        let mut stream =
            MetricStream::create(&trace, "s", channels(), SystemTreeNode::Host).unwrap();

        let err = stream.record(Timestamp(1), &[1.0]).unwrap_err();
        assert!(err.to_string().contains("has 1 values"));
        assert_eq!(stream.writes(), 0);
        assert_eq!(trace.event_count(), 0);
    }

    #[test]
    fn test_rejected_schema_leaves_no_writer() {
        let trace = RejectingTrace::default();

        let err = MetricStream::create(&trace, "s", channels(), SystemTreeNode::Host).unwrap_err();

        assert!(err.to_string().contains("schema rejected"));
        assert_eq!(trace.inner.writer_count(), 0);
    }

    #[test]
    fn test_stale_timestamps_follow_the_last_record() {
        let trace = MemoryTrace::new();
        let mut stream =
            MetricStream::create(&trace, "s", channels(), SystemTreeNode::Host).unwrap();

        stream.record(Timestamp(500), &[1.0, 1.0]).unwrap();
        stream.record(Timestamp(300), &[2.0, 2.0]).unwrap();
        stream.forward(Timestamp(501), &[Some(3.0), None]).unwrap();
        stream.record(Timestamp(900), &[4.0, 4.0]).unwrap();

        let stamps: Vec<_> = trace
            .events_at(stream.location().id)
            .iter()
            .map(|event| event.timestamp().0)
            .collect();
        assert_eq!(stamps, vec![500, 501, 502, 900]);
    }
}
