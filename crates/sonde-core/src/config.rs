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

//! Configuration shared by every monitor.

use std::time::Duration;

/// Configuration for a polling monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Time between two consecutive sampling steps of one monitor.
    pub read_interval: Duration,
}

impl MonitorConfig {
    /// Creates a configuration with the given read interval.
    pub fn new(read_interval: Duration) -> Self {
        Self { read_interval }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            read_interval: Duration::from_millis(100),
        }
    }
}
