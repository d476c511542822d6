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

//! A monotonic stopwatch for timing sampling work.

use std::time::{Duration, Instant};

/// A simple stopwatch started on creation.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    /// Creates a new stopwatch and starts it immediately.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns the time elapsed since the stopwatch was started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the elapsed time in milliseconds, at microsecond resolution.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_micros() as f64 / 1000.0
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_stopwatch_measures_sleep() {
        let stopwatch = Stopwatch::new();
        thread::sleep(Duration::from_millis(5));
        assert!(stopwatch.elapsed() >= Duration::from_millis(5));
        assert!(stopwatch.elapsed_ms() >= 5.0);
    }
}
