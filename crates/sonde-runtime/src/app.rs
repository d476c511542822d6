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

//! Wiring of the trace sink and every configured monitor.

use crate::config::SondeConfig;
use anyhow::{Context, Result};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use sonde_core::telemetry::{TopologyProvider, TraceSink};
use sonde_core::{GpuId, MonitorConfig, MonitorResult};
use sonde_infra::{
    JsonLinesTrace, NvmlSource, SysinfoCpuSampler, SysinfoProcessSource, SysinfoTopology,
};
use sonde_telemetry::{
    GpuDeviceSampler, GpuProcessSource, MemoryTrace, MonitorFleet, MultiEntityRecorder,
    PollMonitor, SingleResourceRecorder,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Where the trace goes.
#[derive(Debug)]
pub enum TraceOutput {
    /// Kept in memory and summarized on exit.
    Memory(Arc<MemoryTrace>),
    /// Written as JSON-lines files.
    JsonLines(Arc<JsonLinesTrace>),
}

impl TraceOutput {
    /// Opens the output selected by `config`.
    pub fn open(config: &SondeConfig) -> Result<Self> {
        if config.is_dry_run() {
            return Ok(Self::Memory(Arc::new(MemoryTrace::new())));
        }
        let trace = JsonLinesTrace::create(&config.output_dir).with_context(|| {
            format!(
                "Failed to create trace directory '{}'",
                config.output_dir.display()
            )
        })?;
        Ok(Self::JsonLines(Arc::new(trace)))
    }

    /// Returns the sink monitors write to.
    pub fn sink(&self) -> Arc<dyn TraceSink> {
        match self {
            Self::Memory(trace) => Arc::clone(trace) as Arc<dyn TraceSink>,
            Self::JsonLines(trace) => Arc::clone(trace) as Arc<dyn TraceSink>,
        }
    }

    /// Closes the trace.
    pub fn finish(&self) -> Result<()> {
        match self {
            Self::Memory(trace) => {
                let stats = trace.stats();
                log::info!(
                    "Recorded {} records from {} writers ({} schemas)",
                    stats.events,
                    stats.writers,
                    stats.classes
                );
            }
            Self::JsonLines(trace) => {
                let definitions = trace.finish().context("Failed to finish the trace")?;
                log::info!("Trace definitions written to '{}'", definitions.display());
            }
        }
        Ok(())
    }
}

type GpuDeviceFleet = MonitorFleet<GpuId, SingleResourceRecorder<GpuDeviceSampler<NvmlSource>>>;
type GpuProcessMonitor = PollMonitor<MultiEntityRecorder<GpuProcessSource<NvmlSource>>>;

/// One device monitor per GPU plus one process monitor per GPU.
struct GpuMonitors {
    devices: GpuDeviceFleet,
    processes: Vec<GpuProcessMonitor>,
}

impl GpuMonitors {
    /// Loads the driver and builds idle monitors for every visible GPU.
    fn open(sink: &Arc<dyn TraceSink>, config: &MonitorConfig) -> Result<Self> {
        let nvml = Arc::new(NvmlSource::init().context("Failed to load the NVIDIA driver")?);
        let gpus = nvml.gpus().context("Failed to enumerate the GPUs")?;

        let devices = MonitorFleet::new(gpus.iter().copied(), config, |gpu| {
            let sampler = GpuDeviceSampler::new(Arc::clone(&nvml), gpu)?;
            SingleResourceRecorder::new(sampler, sink.as_ref())
        })
        .context("Failed to set up the GPU monitors")?;

        let processes = gpus
            .into_iter()
            .map(|gpu| {
                let source = GpuProcessSource::new(Arc::clone(&nvml), gpu)?;
                Ok(PollMonitor::new(
                    MultiEntityRecorder::new(source, Arc::clone(sink)),
                    config,
                ))
            })
            .collect::<MonitorResult<Vec<_>>>()
            .context("Failed to set up the GPU process monitors")?;

        Ok(Self { devices, processes })
    }

    fn start(&mut self) -> Result<()> {
        self.devices
            .start_all()
            .context("Failed to start the GPU monitors")?;
        for monitor in &mut self.processes {
            monitor
                .start()
                .with_context(|| format!("Failed to start '{}'", monitor.name()))?;
        }
        Ok(())
    }

    fn stop(&mut self, faults: &mut Vec<String>) {
        faults.extend(
            self.devices
                .stop_all()
                .into_iter()
                .map(|(gpu, e)| format!("{gpu}: {e}")),
        );
        for monitor in &mut self.processes {
            if let Err(e) = monitor.stop() {
                faults.push(format!("{}: {}", monitor.name(), e));
            }
        }
    }
}

/// What happened during one collection run.
#[derive(Debug, Default)]
pub struct Summary {
    /// Number of CPU monitors that ran.
    pub cpus: usize,
    /// Number of GPUs that were sampled.
    pub gpus: usize,
    /// Whether the process monitor ran.
    pub processes: bool,
    /// One line per monitor that ended with a fault.
    pub faults: Vec<String>,
}

/// Runs every configured monitor until SIGINT or SIGTERM.
pub fn run(config: &SondeConfig) -> Result<Summary> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;

    let output = TraceOutput::open(config)?;
    let sink = output.sink();
    let monitor_config = config.monitor_config();

    let cpus = if config.cpu {
        SysinfoTopology::new().cpus()
    } else {
        BTreeSet::new()
    };
    let mut fleet = MonitorFleet::new(cpus, &monitor_config, |cpu| {
        SingleResourceRecorder::new(SysinfoCpuSampler::new(cpu)?, sink.as_ref())
    })
    .context("Failed to set up the CPU monitors")?;

    let mut processes = config.processes.then(|| {
        let source = match config.pid_filter() {
            Some(pids) => SysinfoProcessSource::new().with_filter(pids),
            None => SysinfoProcessSource::new(),
        };
        PollMonitor::new(
            MultiEntityRecorder::new(source, Arc::clone(&sink)),
            &monitor_config,
        )
    });

    let mut gpus = if config.gpu {
        Some(GpuMonitors::open(&sink, &monitor_config)?)
    } else {
        None
    };

    if let Some(monitor) = processes.as_mut() {
        monitor
            .start()
            .context("Failed to start the process monitor")?;
    }
    if let Some(gpus) = gpus.as_mut() {
        gpus.start()?;
    }

    log::info!(
        "Sampling every {} ms, press Ctrl+C to stop",
        config.read_interval_ms
    );
    let fleet_faults = fleet.run_until(|| {
        if let Some(signal) = signals.forever().next() {
            log::info!("Received signal {}, shutting down", signal);
        }
    });

    let mut summary = Summary {
        cpus: fleet.len(),
        gpus: gpus.as_ref().map_or(0, |gpus| gpus.devices.len()),
        processes: processes.is_some(),
        faults: Vec::new(),
    };
    if let Some(monitor) = processes.as_mut() {
        if let Err(e) = monitor.stop() {
            summary.faults.push(format!("{}: {}", monitor.name(), e));
        }
    }
    if let Some(gpus) = gpus.as_mut() {
        gpus.stop(&mut summary.faults);
    }
    let fleet_faults = fleet_faults.context("Failed to start the CPU monitors")?;
    summary
        .faults
        .extend(fleet_faults.into_iter().map(|(cpu, e)| format!("{cpu}: {e}")));

    output.finish()?;
    Ok(summary)
}
