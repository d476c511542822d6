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

use sonde_core::telemetry::{
    Location, MetricChannel, MetricClass, MetricClassId, MetricEvent, MetricInstance,
    MetricInstanceId, MetricWriter, SystemTreeNode, TraceSink,
};
use sonde_core::{TraceError, TraceResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Counts of everything stored in a [`MemoryTrace`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    /// Number of writers created.
    pub writers: usize,
    /// Number of schemas defined.
    pub classes: usize,
    /// Number of metric instances created.
    pub instances: usize,
    /// Number of records written across all writers.
    pub events: usize,
}

#[derive(Debug, Default)]
struct Storage {
    locations: Vec<Location>,
    classes: Vec<MetricClass>,
    instances: HashMap<MetricInstanceId, MetricInstance>,
    events: HashMap<u64, Vec<MetricEvent>>,
}

/// Thread-safe in-memory trace sink.
///
/// Every definition and every record is kept, so the whole session can be
/// inspected afterwards. Writers created from different monitor threads
/// share one `RwLock`ed store; queries take the read lock.
#[derive(Debug, Default)]
pub struct MemoryTrace {
    storage: Arc<RwLock<Storage>>,
    next_id: AtomicU64,
}

impl MemoryTrace {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the number of writers created.
    pub fn writer_count(&self) -> usize {
        self.storage.read().map(|s| s.locations.len()).unwrap_or(0)
    }

    /// Returns the number of records written across all writers.
    pub fn event_count(&self) -> usize {
        self.storage
            .read()
            .map(|s| s.events.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Returns the locations of all writers, in creation order.
    pub fn locations(&self) -> Vec<Location> {
        if let Ok(storage) = self.storage.read() {
            storage.locations.clone()
        } else {
            Vec::new()
        }
    }

    /// Returns all metric instances, ordered by id.
    pub fn instances(&self) -> Vec<MetricInstance> {
        if let Ok(storage) = self.storage.read() {
            let mut instances: Vec<_> = storage.instances.values().cloned().collect();
            instances.sort_by_key(|i| i.id());
            instances
        } else {
            Vec::new()
        }
    }

    /// Returns every record written through the writer at `location_id`.
    pub fn events_at(&self, location_id: u64) -> Vec<MetricEvent> {
        if let Ok(storage) = self.storage.read() {
            storage.events.get(&location_id).cloned().unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    /// Returns every record written through writers named `name`.
    pub fn events_named(&self, name: &str) -> Vec<MetricEvent> {
        let Ok(storage) = self.storage.read() else {
            return Vec::new();
        };
        storage
            .locations
            .iter()
            .filter(|l| l.name == name)
            .filter_map(|l| storage.events.get(&l.id))
            .flatten()
            .cloned()
            .collect()
    }

    /// Returns counts of everything stored.
    pub fn stats(&self) -> TraceStats {
        let Ok(storage) = self.storage.read() else {
            return TraceStats::default();
        };
        TraceStats {
            writers: storage.locations.len(),
            classes: storage.classes.len(),
            instances: storage.instances.len(),
            events: storage.events.values().map(Vec::len).sum(),
        }
    }
}

impl TraceSink for MemoryTrace {
    fn create_writer(&self, name: &str) -> TraceResult<Box<dyn MetricWriter>> {
        let location = Location::new(self.next_id(), name);
        let mut storage = self
            .storage
            .write()
            .map_err(|_| TraceError::Storage("Failed to acquire write lock".to_string()))?;
        storage.locations.push(location.clone());
        storage.events.insert(location.id, Vec::new());

        Ok(Box::new(MemoryWriter {
            location,
            storage: Arc::clone(&self.storage),
        }))
    }

    fn define_metric_class(&self, channels: Vec<MetricChannel>) -> TraceResult<MetricClass> {
        let metric_class = MetricClass::new(MetricClassId(self.next_id()), channels);
        let mut storage = self
            .storage
            .write()
            .map_err(|_| TraceError::Storage("Failed to acquire write lock".to_string()))?;
        storage.classes.push(metric_class.clone());
        Ok(metric_class)
    }

    fn metric_instance(
        &self,
        metric_class: &MetricClass,
        location: &Location,
        node: SystemTreeNode,
    ) -> TraceResult<MetricInstance> {
        let instance = MetricInstance::new(
            MetricInstanceId(self.next_id()),
            metric_class.clone(),
            location.clone(),
            node,
        );
        let mut storage = self
            .storage
            .write()
            .map_err(|_| TraceError::Storage("Failed to acquire write lock".to_string()))?;
        storage.instances.insert(instance.id(), instance.clone());
        Ok(instance)
    }
}

#[derive(Debug)]
struct MemoryWriter {
    location: Location,
    storage: Arc<RwLock<Storage>>,
}

impl MetricWriter for MemoryWriter {
    fn location(&self) -> &Location {
        &self.location
    }

    fn write(&mut self, event: &MetricEvent) -> TraceResult<()> {
        let mut storage = self
            .storage
            .write()
            .map_err(|_| TraceError::Storage("Failed to acquire write lock".to_string()))?;

        let expected = storage
            .instances
            .get(&event.instance())
            .map(|i| i.metric_class().len())
            .ok_or_else(|| {
                TraceError::Storage(format!("unknown metric instance {:?}", event.instance()))
            })?;
        if expected != event.values().len() {
            return Err(TraceError::SchemaMismatch {
                instance: self.location.name.clone(),
                expected,
                found: event.values().len(),
            });
        }

        storage
            .events
            .entry(self.location.id)
            .or_default()
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonde_core::{CpuId, Timestamp};
    use std::thread;

    #[test]
    fn test_memory_trace_creation() {
        let trace = MemoryTrace::new();
        assert_eq!(trace.stats(), TraceStats::default());
    }

    #[test]
    fn test_definitions_and_events_are_recorded() {
        let trace = MemoryTrace::new();
        let mut writer = trace.create_writer("cpu 0").unwrap();
        let class = trace
            .define_metric_class(vec![MetricChannel::point("CPU Usage", "usage", "%")])
            .unwrap();
        let instance = trace
            .metric_instance(&class, writer.location(), SystemTreeNode::Cpu(CpuId(0)))
            .unwrap();

        let mut event = MetricEvent::new(&instance);
        event.values_mut()[0] = 12.5;
        event.set_timestamp(Timestamp(5));
        writer.write(&event).unwrap();

        assert_eq!(
            trace.stats(),
            TraceStats {
                writers: 1,
                classes: 1,
                instances: 1,
                events: 1,
            }
        );
        let events = trace.events_named("cpu 0");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].values(), &[12.5]);
        assert_eq!(trace.instances()[0].node(), SystemTreeNode::Cpu(CpuId(0)));
    }

    #[test]
    fn test_writer_rejects_foreign_event_shape() {
        let trace = MemoryTrace::new();
        let mut writer = trace.create_writer("w").unwrap();
        let wide = trace
            .define_metric_class(vec![
                MetricChannel::point("A", "a", "%"),
                MetricChannel::point("B", "b", "%"),
            ])
            .unwrap();
        let narrow = trace
            .define_metric_class(vec![MetricChannel::point("A", "a", "%")])
            .unwrap();
        let wide_instance = trace
            .metric_instance(&wide, writer.location(), SystemTreeNode::Host)
            .unwrap();
        let narrow_instance = MetricInstance::new(
            wide_instance.id(),
            narrow,
            writer.location().clone(),
            SystemTreeNode::Host,
        );

        let result = writer.write(&MetricEvent::new(&narrow_instance));
        assert!(matches!(result, Err(TraceError::SchemaMismatch { .. })));
        assert_eq!(trace.event_count(), 0);
    }

    #[test]
    fn test_concurrent_writer_creation() {
        let trace = Arc::new(MemoryTrace::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let trace = Arc::clone(&trace);
                thread::spawn(move || {
                    let writer = trace.create_writer(&format!("cpu {i}")).unwrap();
                    writer.location().id
                })
            })
            .collect();

        let mut ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(trace.writer_count(), 8);
    }
}
