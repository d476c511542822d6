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

//! sysinfo-based implementation of the TopologyProvider trait.

use sonde_core::telemetry::TopologyProvider;
use sonde_core::CpuId;
use std::collections::BTreeSet;
use sysinfo::{CpuRefreshKind, RefreshKind, System};

/// Discovers the logical CPUs of the machine with the `sysinfo` crate.
#[derive(Debug, Default)]
pub struct SysinfoTopology;

impl SysinfoTopology {
    /// Creates a new SysinfoTopology.
    pub fn new() -> Self {
        Self
    }
}

impl TopologyProvider for SysinfoTopology {
    fn cpus(&self) -> BTreeSet<CpuId> {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()),
        );
        (0..system.cpus().len())
            .filter_map(|index| u32::try_from(index).ok())
            .map(CpuId)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpus_are_dense_from_zero() {
        let cpus = SysinfoTopology::new().cpus();
        assert!(!cpus.is_empty());
        let expected: BTreeSet<_> = (0..cpus.len() as u32).map(CpuId).collect();
        assert_eq!(cpus, expected);
    }
}
