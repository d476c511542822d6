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

//! Per-process CPU, memory, and disk sampling.
//!
//! The population of a tick is every process that used the CPU since the
//! previous refresh, optionally restricted to a fixed set of pids.

use sonde_core::telemetry::{MetricChannel, NameResolver, SourceResult, SystemTreeNode};
use sonde_core::{Pid, SourceError, Timestamp};
use sonde_telemetry::{EntitySample, PopulationSnapshot, PopulationSource};
use std::collections::BTreeSet;
use std::time::Instant;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::nothing()
        .with_cpu()
        .with_memory()
        .with_disk_usage()
}

fn sysinfo_pid(pid: Pid) -> sysinfo::Pid {
    sysinfo::Pid::from_u32(pid.as_u32())
}

/// Reports the active processes of the machine.
#[derive(Debug)]
pub struct SysinfoProcessSource {
    system: System,
    filter: Option<BTreeSet<Pid>>,
    last_refresh: Instant,
}

impl SysinfoProcessSource {
    /// The log group of process recorders.
    pub const GROUP: &'static str = "sysinfo::ProcessMonitor";

    /// Creates a source watching every process.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());
        Self {
            system,
            filter: None,
            last_refresh: Instant::now(),
        }
    }

    /// Restricts the population to `pids`.
    pub fn with_filter(mut self, pids: impl IntoIterator<Item = Pid>) -> Self {
        self.filter = Some(pids.into_iter().collect());
        self
    }

    /// Returns the pid filter, if any.
    pub fn filter(&self) -> Option<&BTreeSet<Pid>> {
        self.filter.as_ref()
    }

    fn is_watched(&self, pid: Pid) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter.contains(&pid))
    }
}

impl Default for SysinfoProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PopulationSource for SysinfoProcessSource {
    type Entity = Pid;

    fn name(&self) -> String {
        "processes".to_string()
    }

    fn group(&self) -> &'static str {
        Self::GROUP
    }

    fn node(&self) -> SystemTreeNode {
        SystemTreeNode::Host
    }

    fn channels(&self, label: &str) -> Vec<MetricChannel> {
        vec![
            MetricChannel::point(
                format!("CPU Usage, {label}"),
                "CPU time used by this process",
                "%",
            ),
            MetricChannel::point(
                format!("Resident Memory, {label}"),
                "Resident memory of this process",
                "MiB",
            ),
            MetricChannel::point(
                format!("Disk Read, {label}"),
                "Disk read rate of this process",
                "KiB/s",
            ),
            MetricChannel::point(
                format!("Disk Write, {label}"),
                "Disk write rate of this process",
                "KiB/s",
            ),
        ]
    }

    fn read_population(&mut self, watermark: u64) -> Result<PopulationSnapshot<Pid>, SourceError> {
        let refreshed = self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            refresh_kind(),
        );
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refresh).as_secs_f64();
        self.last_refresh = now;

        if refreshed == 0 {
            return Err(SourceError::new("refresh_processes", "no process could be read"));
        }

        // Samples of one refresh share its timestamp, kept past the watermark.
        let timestamp = Timestamp::now()
            .as_micros()
            .max(watermark.saturating_add(1));
        let per_second = |bytes: u64| {
            if elapsed > 0.0 {
                bytes as f64 / 1024.0 / elapsed
            } else {
                0.0
            }
        };

        let mut samples: Vec<_> = self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| (Pid(pid.as_u32()), process))
            .filter(|(pid, process)| process.cpu_usage() > 0.0 && self.is_watched(*pid))
            .map(|(pid, process)| {
                let disk = process.disk_usage();
                EntitySample::new(
                    pid,
                    timestamp,
                    vec![
                        Some(f64::from(process.cpu_usage())),
                        Some(process.memory() as f64 / BYTES_PER_MIB),
                        Some(per_second(disk.read_bytes)),
                        Some(per_second(disk.written_bytes)),
                    ],
                )
            })
            .collect();
        samples.sort_by_key(|sample| sample.entity);

        Ok(PopulationSnapshot::new(samples))
    }

    fn resolve_label(&mut self, pid: Pid) -> Result<String, SourceError> {
        let name = self.name_of(pid)?;
        Ok(format!("{name} ({pid})"))
    }
}

impl NameResolver for SysinfoProcessSource {
    fn name_of(&mut self, pid: Pid) -> SourceResult<String> {
        let target = sysinfo_pid(pid);
        if self.system.process(target).is_none() {
            self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[target]),
                false,
                ProcessRefreshKind::nothing(),
            );
        }

        self.system
            .process(target)
            .map(|process| process.name().to_string_lossy().into_owned())
            .ok_or_else(|| SourceError::new("process_name", format!("no process {pid}")))
    }
}
