//! This library implements parameter-sweep job orchestration for an external
//! particle simulation binary.
//!
//! A sweep is described by a small configuration file listing job names,
//! parameter lines and (optionally) cluster host allocations. The pipeline
//! goes through four stages:
//!
//! 1. [`config::parse`] reads the file into a raw [`Config`],
//! 2. [`validate::validate`] checks it and returns a resolved [`Sweep`],
//! 3. [`materialize::materialize`] lays out per-job directories together with
//!    the generated execution or submission scripts,
//! 4. [`dispatch::Dispatcher`] runs or submits the aggregate script.
//!
//! Logs written by the simulations can later be looked at using
//! [`inspect::show`].
//!
//! # Config format
//!
//! ```text
//! # comment
//! %set_job
//! run_a
//! run_b
//!
//! %param units si
//! %param processors 2 1 1
//!
//! %set_param
//! variable vibration equal 10
//! variable vibration equal 20
//!
//! %set_cluster
//! node01 slots=2
//! node02 slots=1 + node03 slots=1
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sweep_core::{config, materialize, validate, Mode, Options, Settings};
//!
//! let config = config::parse("sweeps/amplitude.ini")?;
//! let sweep = validate::validate(&config, Mode::Local)?;
//! let jobs_dir = materialize::materialize(&sweep, &Options::default(), &Settings::default())?;
//! ```
//!
//! [`Config`]: config/struct.Config.html
//! [`Sweep`]: validate/struct.Sweep.html

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

// reexports
pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use inspect::{LogKind, LogSide};
pub use materialize::Options;
pub use settings::Settings;
pub use validate::{ClusterAllocation, Job, ParameterGroup, Sweep};

pub mod batch;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod inspect;
pub mod materialize;
pub mod settings;
pub mod validate;

mod util;

/// Name of the input script written into every job directory.
pub const INPUT_SCRIPT_FILE: &str = "in.script";
/// Name of the MPI hostfile written into job directories in cluster mode.
pub const HOSTFILE_FILE: &str = "hostfile";
/// Per-job script for direct execution.
pub const LOCAL_JOB_SCRIPT: &str = "sim.sh";
/// Per-job batch-queue submission script.
pub const CLUSTER_JOB_SCRIPT: &str = "qsub_sim.sh";
/// Aggregate script running all jobs of a sweep locally.
pub const LOCAL_AGGREGATE_SCRIPT: &str = "sim_all.sh";
/// Aggregate array-job submission script.
pub const CLUSTER_AGGREGATE_SCRIPT: &str = "qsub_sim_all.sh";
/// Log written by the simulation binary.
pub const SIMULATION_LOG_FILE: &str = "log.liggghts";
/// Log written by the rendering stage.
pub const POST_LOG_FILE: &str = "log.post";
/// Sub-directory holding the rendering scripts.
pub const RENDER_DIR_NAME: &str = "animate";
/// Sub-directory the simulation dumps its visualization artifacts into.
pub const POST_DIR_NAME: &str = "post";
/// Default extension of config files picked up from directories.
pub const CONFIG_FILE_EXTENSION: &str = "ini";

/// Execution backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Direct shell execution on the local machine.
    Local,
    /// Submission to a batch queue.
    Cluster,
}

impl Mode {
    pub fn is_cluster(&self) -> bool {
        *self == Mode::Cluster
    }

    /// File name of the per-job script for this mode.
    pub fn job_script(&self) -> &'static str {
        match self {
            Mode::Local => LOCAL_JOB_SCRIPT,
            Mode::Cluster => CLUSTER_JOB_SCRIPT,
        }
    }

    /// File name of the aggregate script for this mode.
    pub fn aggregate_script(&self) -> &'static str {
        match self {
            Mode::Local => LOCAL_AGGREGATE_SCRIPT,
            Mode::Cluster => CLUSTER_AGGREGATE_SCRIPT,
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Local
    }
}
