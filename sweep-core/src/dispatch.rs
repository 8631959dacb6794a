//! Running and submitting generated scripts.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::Mode;

/// Hands generated scripts over to the shell or the batch queue.
pub struct Dispatcher {
    settings: Settings,
}

impl Dispatcher {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Runs the script locally or submits it to the batch queue.
    ///
    /// Returns `Ok(false)` if the script doesn't exist. Local runs block
    /// until the shell returns (the aggregate script itself only starts the
    /// jobs in the background). Submissions are not waited for, the queue
    /// takes over from there.
    pub fn run(&self, script: &Path, mode: Mode) -> Result<bool> {
        if !script.is_file() {
            error!("{}", Error::ArtifactMissing(script.to_path_buf()));
            return Ok(false);
        }
        let program = match mode {
            Mode::Local => &self.settings.shell,
            Mode::Cluster => &self.settings.submit_command,
        };

        // scripts are run from their own directory
        let mut command = Command::new(program);
        match (script.parent(), script.file_name()) {
            (Some(dir), Some(name)) if !dir.as_os_str().is_empty() => {
                command.current_dir(dir).arg(name);
            }
            _ => {
                command.arg(script);
            }
        }

        let spawn_error = |e: std::io::Error| Error::Spawn {
            command: format!("{} {}", program, script.display()),
            message: e.to_string(),
        };

        match mode {
            Mode::Local => {
                info!("running {}", script.display());
                let status = command.status().map_err(spawn_error)?;
                if !status.success() {
                    warn!("{} exited with {}", script.display(), status);
                }
            }
            Mode::Cluster => {
                info!("submitting {}", script.display());
                command
                    .stdin(Stdio::null())
                    .spawn()
                    .map_err(spawn_error)?;
            }
        }
        Ok(true)
    }
}

#[test]
fn missing_script_is_not_run() {
    let dispatcher = Dispatcher::new(Settings::default());
    let ran = dispatcher
        .run(Path::new("/nonexistent/sim_all.sh"), Mode::Local)
        .unwrap();
    assert!(!ran);
}

#[cfg(unix)]
#[test]
fn local_run_blocks_until_shell_returns() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("sim_all.sh");
    std::fs::write(&script, "touch ran\n").unwrap();
    let dispatcher = Dispatcher::new(Settings {
        shell: "sh".to_string(),
        ..Settings::default()
    });
    assert!(dispatcher.run(&script, Mode::Local).unwrap());
    assert!(dir.path().join("ran").is_file());
}

#[cfg(unix)]
#[test]
fn submission_uses_submit_command() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("qsub_sim_all.sh");
    std::fs::write(&script, "#!/bin/bash\n").unwrap();
    let dispatcher = Dispatcher::new(Settings {
        submit_command: "true".to_string(),
        ..Settings::default()
    });
    assert!(dispatcher.run(&script, Mode::Cluster).unwrap());

    let dispatcher = Dispatcher::new(Settings {
        submit_command: "/nonexistent/qsub".to_string(),
        ..Settings::default()
    });
    assert!(matches!(
        dispatcher.run(&script, Mode::Cluster),
        Err(Error::Spawn { .. })
    ));
}
