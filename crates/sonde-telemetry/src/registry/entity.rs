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

//! Registry mapping dynamically discovered entities to their streams.

use crate::stream::MetricStream;
use sonde_core::{MonitorResult, Timestamp};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

/// An append-only map from entity identity to its [`MetricStream`].
///
/// Each entity gets at most one stream, created on first observation and
/// kept until the registry is dropped. Entities that disappear keep their
/// stream and last record; they simply stop receiving updates.
#[derive(Debug)]
pub struct EntityMetricRegistry<E> {
    streams: HashMap<E, MetricStream>,
}

impl<E: Eq + Hash> EntityMetricRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
        }
    }

    /// Returns the number of registered entities.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Returns `true` if no entity has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Returns `true` if `entity` has a stream.
    pub fn contains(&self, entity: &E) -> bool {
        self.streams.contains_key(entity)
    }

    /// Returns the stream of `entity`.
    pub fn get(&self, entity: &E) -> Option<&MetricStream> {
        self.streams.get(entity)
    }

    /// Returns the registered entities, in no particular order.
    pub fn entities(&self) -> impl Iterator<Item = &E> {
        self.streams.keys()
    }

    /// Updates the stream of a known entity and writes its record.
    ///
    /// Returns `None`, without touching anything, when `entity` is unknown.
    pub fn update(
        &mut self,
        entity: &E,
        timestamp: Timestamp,
        values: &[Option<f64>],
    ) -> Option<MonitorResult<()>> {
        self.streams
            .get_mut(entity)
            .map(|stream| stream.forward(timestamp, values))
    }

    /// Returns the stream of `entity`, creating it with `create` if needed.
    ///
    /// The flag is `true` when the stream was created by this call. If
    /// `create` fails the registry is left unchanged.
    pub fn get_or_try_insert_with<F>(
        &mut self,
        entity: E,
        create: F,
    ) -> MonitorResult<(&mut MetricStream, bool)>
    where
        F: FnOnce() -> MonitorResult<MetricStream>,
    {
        match self.streams.entry(entity) {
            Entry::Occupied(entry) => Ok((entry.into_mut(), false)),
            Entry::Vacant(entry) => {
                let stream = create()?;
                Ok((entry.insert(stream), true))
            }
        }
    }
}

impl<E: Eq + Hash> Default for EntityMetricRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
