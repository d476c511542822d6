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

//! A trace sink writing one JSON-lines file per writer.
//!
//! Layout of the output directory:
//!
//! ```text
//! <id>-<name>.jsonl    one serialized MetricEvent per line
//! definitions.json     locations, metric classes and instances
//! ```
//!
//! `definitions.json` is written by [`JsonLinesTrace::finish`], after which
//! the trace accepts no more writers or records.

use serde::Serialize;
use sonde_core::telemetry::{
    Location, MetricChannel, MetricClass, MetricClassId, MetricEvent, MetricInstance,
    MetricInstanceId, MetricWriter, SystemTreeNode, TraceSink,
};
use sonde_core::{TraceError, TraceResult};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// The name of the definitions file.
pub const DEFINITIONS_FILE: &str = "definitions.json";

#[derive(Debug, Default, Serialize)]
struct Definitions {
    locations: Vec<Location>,
    classes: Vec<MetricClass>,
    instances: Vec<MetricInstance>,
    #[serde(skip)]
    widths: HashMap<MetricInstanceId, usize>,
}

/// Replaces everything but ASCII alphanumerics, `-` and `_` with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn lock_error() -> TraceError {
    TraceError::Storage("Failed to acquire definitions lock".to_string())
}

/// Thread-safe sink writing JSON-lines files into one directory.
#[derive(Debug)]
pub struct JsonLinesTrace {
    dir: PathBuf,
    definitions: Arc<Mutex<Definitions>>,
    next_id: AtomicU64,
    finished: Arc<AtomicBool>,
}

impl JsonLinesTrace {
    /// Creates the output directory if needed and opens a trace in it.
    pub fn create(dir: impl Into<PathBuf>) -> TraceResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        log::info!("Writing trace to '{}'", dir.display());

        Ok(Self {
            dir,
            definitions: Arc::new(Mutex::new(Definitions::default())),
            next_id: AtomicU64::new(0),
            finished: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Returns the output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the file a writer at `location` writes to.
    pub fn path_of(&self, location: &Location) -> PathBuf {
        self.dir
            .join(format!("{}-{}.jsonl", location.id, sanitize(&location.name)))
    }

    /// Writes `definitions.json` and closes the trace.
    ///
    /// Returns the path of the definitions file. Finishing twice is an error.
    pub fn finish(&self) -> TraceResult<PathBuf> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return Err(TraceError::Finished);
        }

        let definitions = self.definitions.lock().map_err(|_| lock_error())?;
        let path = self.dir.join(DEFINITIONS_FILE);
        let mut out = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut out, &*definitions)
            .map_err(|e| TraceError::Serialization(e.to_string()))?;
        out.flush()?;

        log::info!(
            "Finished trace with {} writers in '{}'",
            definitions.locations.len(),
            self.dir.display()
        );
        Ok(path)
    }

    fn ensure_open(&self) -> TraceResult<()> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(TraceError::Finished);
        }
        Ok(())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl TraceSink for JsonLinesTrace {
    fn create_writer(&self, name: &str) -> TraceResult<Box<dyn MetricWriter>> {
        self.ensure_open()?;
        let location = Location::new(self.next_id(), name);
        let file = File::create(self.path_of(&location))?;

        self.definitions
            .lock()
            .map_err(|_| lock_error())?
            .locations
            .push(location.clone());

        Ok(Box::new(JsonLinesWriter {
            location,
            out: BufWriter::new(file),
            definitions: Arc::clone(&self.definitions),
            finished: Arc::clone(&self.finished),
        }))
    }

    fn define_metric_class(&self, channels: Vec<MetricChannel>) -> TraceResult<MetricClass> {
        self.ensure_open()?;
        let metric_class = MetricClass::new(MetricClassId(self.next_id()), channels);
        self.definitions
            .lock()
            .map_err(|_| lock_error())?
            .classes
            .push(metric_class.clone());
        Ok(metric_class)
    }

    fn metric_instance(
        &self,
        metric_class: &MetricClass,
        location: &Location,
        node: SystemTreeNode,
    ) -> TraceResult<MetricInstance> {
        self.ensure_open()?;
        let instance = MetricInstance::new(
            MetricInstanceId(self.next_id()),
            metric_class.clone(),
            location.clone(),
            node,
        );

        let mut definitions = self.definitions.lock().map_err(|_| lock_error())?;
        definitions
            .widths
            .insert(instance.id(), metric_class.len());
        definitions.instances.push(instance.clone());
        Ok(instance)
    }
}

#[derive(Debug)]
struct JsonLinesWriter {
    location: Location,
    out: BufWriter<File>,
    definitions: Arc<Mutex<Definitions>>,
    finished: Arc<AtomicBool>,
}

impl MetricWriter for JsonLinesWriter {
    fn location(&self) -> &Location {
        &self.location
    }

    fn write(&mut self, event: &MetricEvent) -> TraceResult<()> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(TraceError::Finished);
        }

        let expected = self
            .definitions
            .lock()
            .map_err(|_| lock_error())?
            .widths
            .get(&event.instance())
            .copied()
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

        serde_json::to_writer(&mut self.out, event)
            .map_err(|e| TraceError::Serialization(e.to_string()))?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_separators() {
        assert_eq!(sanitize("cpu 0"), "cpu_0");
        assert_eq!(
            sanitize("gpu 0 (A100) python3/train.py"),
            "gpu_0__A100__python3_train_py"
        );
        assert_eq!(sanitize("procs-1_a"), "procs-1_a");
    }
}
