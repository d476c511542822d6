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

//! Command-line interface of the collector.

use clap::Parser;
use std::path::PathBuf;

/// Samples CPU, process and GPU telemetry into a trace until interrupted.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "sonde", version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file. `Sonde.toml` is used if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Sampling interval of every monitor, in milliseconds.
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Output directory of the trace, or `-` to keep it in memory.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Do not sample the CPUs.
    #[arg(long)]
    pub no_cpu: bool,

    /// Do not sample processes.
    #[arg(long)]
    pub no_processes: bool,

    /// Sample the NVIDIA GPUs and the processes using them.
    #[arg(long)]
    pub gpu: bool,

    /// Only sample these processes. May be repeated.
    #[arg(long = "pid", value_name = "PID")]
    pub pids: Vec<u32>,

    /// Log filter, e.g. `debug` or `sonde_telemetry=trace`. Overrides `RUST_LOG`.
    #[arg(long)]
    pub log_level: Option<String>,
}
