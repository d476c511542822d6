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

//! Error types shared by counter sources, trace sinks, and monitors.
//!
//! Monitor errors fall into two classes. Fatal errors end the loop of the
//! monitor that raised them (and only that monitor); recoverable errors are
//! logged where they occur and swallowed. [`MonitorError::is_recoverable`]
//! tells them apart.

use std::io;
use thiserror::Error;

/// A specialized `Result` type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

/// A specialized `Result` type for trace sink operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// A failed call into a counter source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{call} failed: {message}")]
pub struct SourceError {
    /// The name of the source call that failed (e.g. `"power_usage"`).
    pub call: &'static str,
    /// The source's own description of the failure.
    pub message: String,
}

impl SourceError {
    /// Creates a new source error for the given call.
    pub fn new(call: &'static str, message: impl Into<String>) -> Self {
        Self {
            call,
            message: message.into(),
        }
    }
}

/// An error raised by a trace sink.
#[derive(Debug, Error)]
pub enum TraceError {
    /// A record did not match the schema of the instance it was written for.
    #[error("record for '{instance}' has {found} values, schema has {expected} channels")]
    SchemaMismatch {
        /// The name of the writer the record was written through.
        instance: String,
        /// The number of channels in the schema.
        expected: usize,
        /// The number of values in the record.
        found: usize,
    },
    /// The sink has already been finished and accepts no more data.
    #[error("trace has already been finished")]
    Finished,
    /// The sink's internal state was poisoned by a panicking writer.
    #[error("trace storage error: {0}")]
    Storage(String),
    /// An I/O error from a file-backed sink.
    #[error("trace I/O error: {0}")]
    Io(#[from] io::Error),
    /// A serialization error from a file-backed sink.
    #[error("trace serialization error: {0}")]
    Serialization(String),
}

/// An error raised while constructing or running a monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A physical resource handle could not be obtained.
    #[error("failed to resolve {resource}: {source}")]
    Resolution {
        /// The resource that could not be resolved (e.g. `"gpu 1"`).
        resource: String,
        /// The failing source call.
        #[source]
        source: SourceError,
    },
    /// A full-vector read of a single resource failed.
    #[error("failed to read counters of {resource}: {source}")]
    Read {
        /// The resource being sampled.
        resource: String,
        /// The failing source call.
        #[source]
        source: SourceError,
    },
    /// The population query of a multi-entity recorder failed.
    #[error("population query of {recorder} failed: {source}")]
    PopulationQuery {
        /// The name of the recorder that issued the query.
        recorder: String,
        /// The failing source call.
        #[source]
        source: SourceError,
    },
    /// The label of a newly observed entity could not be resolved.
    #[error("failed to resolve a label for entity {entity}: {source}")]
    EntityResolution {
        /// The entity whose label lookup failed.
        entity: String,
        /// The failing source call.
        #[source]
        source: SourceError,
    },
    /// The trace sink rejected an operation.
    #[error(transparent)]
    Trace(#[from] TraceError),
    /// The monitor thread could not be spawned.
    #[error("failed to spawn monitor thread: {0}")]
    Spawn(#[source] io::Error),
    /// Termination signals could not be registered.
    #[error("failed to register signal handler: {0}")]
    Signal(#[source] io::Error),
    /// The monitor thread panicked.
    #[error("monitor thread panicked: {0}")]
    Panicked(String),
}

impl MonitorError {
    /// Returns `true` for errors that are logged and swallowed rather than
    /// ending the monitor that raised them.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MonitorError::EntityResolution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        let err = SourceError::new("power_usage", "not supported");
        assert_eq!(err.to_string(), "power_usage failed: not supported");
    }

    #[test]
    fn test_monitor_error_context() {
        let err = MonitorError::Read {
            resource: "gpu 1 (Test)".to_string(),
            source: SourceError::new("temperature", "gpu is lost"),
        };
        let message = err.to_string();
        assert!(message.contains("gpu 1 (Test)"));
        assert!(message.contains("temperature"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_only_entity_resolution_is_recoverable() {
        let entity = MonitorError::EntityResolution {
            entity: "100".to_string(),
            source: SourceError::new("process_name", "no such process"),
        };
        assert!(entity.is_recoverable());
        assert!(!MonitorError::Panicked("boom".to_string()).is_recoverable());
    }
}
