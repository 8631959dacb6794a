//! Launcher settings.
//!
//! Settings name the external programs referenced by generated scripts. They
//! are read from an optional toml file, every missing entry falls back to the
//! default. Values are written into scripts verbatim, so shell variables
//! such as `$HOME` are expanded when the scripts run.

use std::path::Path;

use crate::error::{Error, Result};
use crate::util;

/// Default name of the settings file looked up in the working directory.
pub const SETTINGS_FILE: &str = "sweep.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Simulation binary reading the generated input script.
    pub simulation_binary: String,
    /// MPI launcher used for local execution.
    pub mpirun: String,
    /// MPI launcher used on cluster nodes.
    pub cluster_mpirun: String,
    /// Appended to `LD_LIBRARY_PATH` for cluster runs.
    pub library_path: String,
    /// Shell used for running scripts.
    pub shell: String,
    /// Batch queue submission command.
    pub submit_command: String,
    /// Parallel environment requested from the batch queue.
    pub parallel_environment: String,
    /// Stack size limit in kilobytes set before starting the binary on the
    /// cluster.
    pub stack_size_kb: u64,
    /// Address notified by the batch queue when a job ends or aborts.
    pub mail: Option<String>,
    /// Offscreen batch visualization program running the render script.
    pub render_binary: String,
    /// Encoder turning rendered frames into a video.
    pub encoder_binary: String,
    pub frame_rate: u32,
    /// Extension of the visualization dumps found in the post directory.
    pub post_extension: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            simulation_binary: "$HOME/local/bin/lmp_auto".to_string(),
            mpirun: "mpirun".to_string(),
            cluster_mpirun: "/usr/mpi/gcc/openmpi-1.10.5a1/bin/mpirun".to_string(),
            library_path: "$HOME/build/LIGGGHTS-PUBLIC/lib/vtk/install/lib".to_string(),
            shell: "bash".to_string(),
            submit_command: "qsub".to_string(),
            parallel_environment: "orte".to_string(),
            stack_size_kb: 10240,
            mail: None,
            render_binary: "pvbatch".to_string(),
            encoder_binary: "ffmpeg".to_string(),
            frame_rate: 20,
            post_extension: "vtk".to_string(),
        }
    }
}

impl Settings {
    /// Reads settings from the toml file at the given path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = util::read_text_file(path)?;
        toml::from_str(&text).map_err(|e| Error::SettingsError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Reads settings from the given path if provided, otherwise from the
    /// default settings file in the working directory if it exists, falling
    /// back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_path(p),
            None => {
                let default_path = Path::new(SETTINGS_FILE);
                if default_path.is_file() {
                    info!("using settings from {}", default_path.display());
                    Self::from_path(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[test]
fn partial_settings_fall_back_to_defaults() {
    let settings: Settings = toml::from_str(
        r#"
        simulation_binary = "/opt/liggghts/bin/lmp"
        mail = "someone@example.org"
        "#,
    )
    .unwrap();
    assert_eq!(settings.simulation_binary, "/opt/liggghts/bin/lmp");
    assert_eq!(settings.mail.as_deref(), Some("someone@example.org"));
    assert_eq!(settings.mpirun, "mpirun");
    assert_eq!(settings.stack_size_kb, 10240);
}

#[test]
fn bad_settings_file_names_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweep.toml");
    std::fs::write(&path, "frame_rate = \"fast\"").unwrap();
    match Settings::from_path(&path) {
        Err(Error::SettingsError { path: p, .. }) => assert_eq!(p, path),
        other => panic!("unexpected: {:?}", other),
    }
}
