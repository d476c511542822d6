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

//! Recording of one fixed resource's full counter vector.

use crate::monitor::Tick;
use crate::stream::MetricStream;
use sonde_core::telemetry::{MetricChannel, SystemTreeNode, TraceSink};
use sonde_core::{MonitorError, MonitorResult, SourceError, Stopwatch, Timestamp};

/// Reads the counters of one resource whose handle has already been resolved.
pub trait ResourceSampler: Send + 'static {
    /// The stream name, e.g. `"gpu 0 (A100)"` or `"cpu 3"`.
    fn name(&self) -> String;

    /// The kind of monitor, used to group log output.
    fn group(&self) -> &'static str;

    /// Where the resource sits in the system tree.
    fn node(&self) -> SystemTreeNode;

    /// The channels this sampler reads, in read order.
    fn channels(&self) -> Vec<MetricChannel>;

    /// Reads every channel into `values`, which has one slot per channel.
    ///
    /// Values are converted to the channel's unit before being stored.
    fn read(&mut self, values: &mut [f64]) -> Result<(), SourceError>;
}

/// The derived channel holding the wall-clock cost of one read sequence.
pub fn sampling_time_channel() -> MetricChannel {
    MetricChannel::point(
        "Sampling Time",
        "Time spent reading all counters of this sample",
        "ms",
    )
}

/// Samples a [`ResourceSampler`] into a single stream, one record per tick.
///
/// Records are all-or-nothing: if any counter read fails, nothing is written
/// for that tick and the error ends the monitor.
#[derive(Debug)]
pub struct SingleResourceRecorder<S> {
    sampler: S,
    name: String,
    stream: MetricStream,
}

impl<S: ResourceSampler> SingleResourceRecorder<S> {
    /// Defines the schema and creates the stream for `sampler`.
    ///
    /// The schema is the sampler's channels followed by
    /// [`sampling_time_channel`].
    pub fn new(sampler: S, sink: &dyn TraceSink) -> MonitorResult<Self> {
        let name = sampler.name();
        let mut channels = sampler.channels();
        channels.push(sampling_time_channel());
        let stream = MetricStream::create(sink, &name, channels, sampler.node())?;

        log::debug!("[{}] created stream for '{}'", sampler.group(), name);

        Ok(Self {
            sampler,
            name,
            stream,
        })
    }

    /// Returns the sampler.
    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    /// Returns the stream this recorder writes to.
    pub fn stream(&self) -> &MetricStream {
        &self.stream
    }
}

impl<S: ResourceSampler> Tick for SingleResourceRecorder<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> &'static str {
        self.sampler.group()
    }

    fn tick(&mut self) -> MonitorResult<()> {
        let timestamp = Timestamp::now();
        let stopwatch = Stopwatch::new();

        // The last slot is the sampling time channel appended in `new`.
        let mut values = vec![0.0; self.stream.instance().metric_class().len()];
        let counters = values.len() - 1;

        self.sampler
            .read(&mut values[..counters])
            .map_err(|source| MonitorError::Read {
                resource: self.name.clone(),
                source,
            })?;
        values[counters] = stopwatch.elapsed_ms();

        log::trace!("[{}] sampled '{}'", self.sampler.group(), self.name);
        self.stream.record(timestamp, &values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTrace;
    use sonde_core::CpuId;

    struct FixedSampler {
        reads: u32,
        fail_on: Option<u32>,
    }

    impl ResourceSampler for FixedSampler {
        fn name(&self) -> String {
            "cpu 2".to_string()
        }

        fn group(&self) -> &'static str {
            "test::FixedSampler"
        }

        fn node(&self) -> SystemTreeNode {
            SystemTreeNode::Cpu(CpuId(2))
        }

        fn channels(&self) -> Vec<MetricChannel> {
            vec![
                MetricChannel::point("A", "a", "%"),
                MetricChannel::point("B", "b", "MHz"),
            ]
        }

        fn read(&mut self, values: &mut [f64]) -> Result<(), SourceError> {
            self.reads += 1;
            values[0] = f64::from(self.reads);
            if self.fail_on == Some(self.reads) {
                return Err(SourceError::new("b", "unavailable"));
            }
            values[1] = 1000.0;
            Ok(())
        }
    }

    #[test]
    fn test_schema_appends_sampling_time() {
        let trace = MemoryTrace::new();
        let recorder = SingleResourceRecorder::new(
            FixedSampler {
                reads: 0,
                fail_on: None,
            },
            &trace,
        )
        .unwrap();

        let class = recorder.stream().instance().metric_class();
        let names: Vec<_> = class.channels().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "Sampling Time"]);
        assert_eq!(
            recorder.stream().instance().node(),
            SystemTreeNode::Cpu(CpuId(2))
        );
        assert_eq!(Tick::name(&recorder), "cpu 2");
    }

    #[test]
    fn test_tick_writes_one_full_record() {
        let trace = MemoryTrace::new();
        let mut recorder = SingleResourceRecorder::new(
            FixedSampler {
                reads: 0,
                fail_on: None,
            },
            &trace,
        )
        .unwrap();

        let before = Timestamp::now();
        recorder.tick().unwrap();
        recorder.tick().unwrap();

        let events = trace.events_named("cpu 2");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].values()[0], 2.0);
        assert_eq!(events[1].values()[1], 1000.0);
        assert!(events[1].values()[2] >= 0.0);
        assert!(events[0].timestamp() >= before);
        assert!(events[1].timestamp() >= events[0].timestamp());
    }

    #[test]
    fn test_failed_read_writes_nothing() {
        let trace = MemoryTrace::new();
        let mut recorder = SingleResourceRecorder::new(
            FixedSampler {
                reads: 0,
                fail_on: Some(2),
            },
            &trace,
        )
        .unwrap();

        recorder.tick().unwrap();
        let err = recorder.tick().unwrap_err();

        match err {
            MonitorError::Read { resource, source } => {
                assert_eq!(resource, "cpu 2");
                assert_eq!(source.call, "b");
            }
            other => panic!("expected a read error, got {other:?}"),
        }
        assert_eq!(trace.event_count(), 1);
        // The record still holds the last complete sample.
        assert_eq!(recorder.stream().event().values()[0], 1.0);
    }
}
