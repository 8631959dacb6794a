//! Job materialization.
//!
//! Turns a validated [`Sweep`] into a directory tree next to the config
//! file:
//!
//! ```text
//! <config-stem>/
//!     sim_all.sh | qsub_sim_all.sh
//!     <job>/
//!         in.script
//!         hostfile                  (cluster)
//!         sim.sh | qsub_sim.sh
//!         animate/render.py         (render)
//!         animate/encode.sh         (render)
//! ```
//!
//! Job directories are always rebuilt from scratch, see
//! [`reset_job_directory`].
//!
//! [`Sweep`]: ../validate/struct.Sweep.html
//! [`reset_job_directory`]: fn.reset_job_directory.html

mod render;
mod script;

use std::fs;
use std::path::{Path, PathBuf};

use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::settings::Settings;
use crate::validate::{self, Sweep};
use crate::{Mode, HOSTFILE_FILE, INPUT_SCRIPT_FILE, RENDER_DIR_NAME};

pub use render::{ENCODE_SCRIPT, RENDER_SCRIPT};

/// Options selected for a materialization run.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Options {
    pub mode: Mode,
    /// Chain the rendering stage after each simulation.
    pub render: bool,
    /// Run or submit the aggregate script once everything is written.
    pub execute: bool,
}

/// Job directory being built in a staging location.
///
/// The staging directory replaces the job directory on [`commit`]. If the
/// guard is dropped without committing, the staging directory is removed
/// and any existing job directory is left as it was.
///
/// [`commit`]: #method.commit
pub struct StagedJobDir {
    staging: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedJobDir {
    /// Path files should be written to.
    pub fn path(&self) -> &Path {
        &self.staging
    }

    /// Final location of the job directory.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Swaps the staged contents into place, removing the previous job
    /// directory.
    pub fn commit(mut self) -> Result<PathBuf> {
        if self.target.exists() {
            fs::remove_dir_all(&self.target)?;
        }
        fs::rename(&self.staging, &self.target)?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedJobDir {
    fn drop(&mut self) {
        if !self.committed && self.staging.exists() {
            if let Err(e) = fs::remove_dir_all(&self.staging) {
                warn!(
                    "failed removing staging directory {}: {}",
                    self.staging.display(),
                    e
                );
            }
        }
    }
}

/// Starts rebuilding the directory of the named job inside `jobs_dir`.
///
/// Fails for names that would resolve outside of `jobs_dir`.
pub fn reset_job_directory(jobs_dir: &Path, job_name: &str) -> Result<StagedJobDir> {
    if !validate::is_plain_dir_name(job_name) {
        return Err(Error::Other(format!(
            "refusing to reset job directory \"{}\" in {}",
            job_name,
            jobs_dir.display()
        )));
    }
    let staging = jobs_dir.join(format!(".{}.staging", job_name));
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;
    Ok(StagedJobDir {
        staging,
        target: jobs_dir.join(job_name),
        committed: false,
    })
}

/// Writes job directories and scripts for the sweep, returning the jobs
/// directory.
///
/// The sweep must have been validated with the same mode as requested in
/// `options`.
pub fn materialize(sweep: &Sweep, options: &Options, settings: &Settings) -> Result<PathBuf> {
    let allocations = match (options.mode, &sweep.cluster) {
        (Mode::Cluster, None) => {
            return Err(Error::Other(format!(
                "{}: no cluster allocations, sweep was not validated for cluster mode",
                sweep.path.display()
            )))
        }
        (Mode::Cluster, Some(a)) => Some(a),
        (Mode::Local, _) => None,
    };

    let jobs_dir = sweep.jobs_dir();
    fs::create_dir_all(&jobs_dir)?;
    let jobs_dir = dunce::canonicalize(&jobs_dir)?;
    info!(
        "creating {} jobs in {}",
        sweep.jobs.len(),
        jobs_dir.display()
    );

    let mut job_dirs = Vec::with_capacity(sweep.jobs.len());
    for (idx, job) in sweep.jobs.iter().enumerate() {
        let staged = reset_job_directory(&jobs_dir, &job.name)?;
        let job_dir = staged.target().to_path_buf();

        let mut input = sweep.input_lines(idx).join("\n");
        input.push('\n');
        fs::write(staged.path().join(INPUT_SCRIPT_FILE), input)?;

        if options.render {
            let render_dir = staged.path().join(RENDER_DIR_NAME);
            fs::create_dir_all(&render_dir)?;
            fs::write(
                render_dir.join(RENDER_SCRIPT),
                render::render_script(&job.name, &job_dir, settings),
            )?;
            write_script(
                &render_dir.join(ENCODE_SCRIPT),
                &render::encode_script(&job.name, &job_dir, settings),
            )?;
        }

        let job_script = match allocations {
            Some(allocations) => {
                fs::write(
                    staged.path().join(HOSTFILE_FILE),
                    script::hostfile(&allocations[idx]),
                )?;
                script::cluster_job(job, &job_dir, options.render, settings)
            }
            None => script::local_job(job, &job_dir, options.render, settings),
        };
        write_script(&staged.path().join(options.mode.job_script()), &job_script)?;

        let job_dir = staged.commit()?;
        debug!("created job directory {}", job_dir.display());
        job_dirs.push(job_dir);
    }

    let aggregate_path = jobs_dir.join(options.mode.aggregate_script());
    let aggregate = match options.mode {
        Mode::Local => script::local_aggregate(sweep, &job_dirs, settings),
        Mode::Cluster => script::cluster_aggregate(sweep, &jobs_dir, &job_dirs, settings),
    };
    write_script(&aggregate_path, &aggregate)?;
    info!("wrote {}", aggregate_path.display());

    if options.execute {
        Dispatcher::new(settings.clone()).run(&aggregate_path, options.mode)?;
    }

    Ok(jobs_dir)
}

/// Writes an executable script file.
fn write_script(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

#[cfg(test)]
fn validated(dir: &Path, text: &str, mode: Mode) -> Sweep {
    let path = dir.join("sweep.ini");
    fs::write(&path, text).unwrap();
    let config = crate::config::parse(&path).unwrap();
    crate::validate::validate(&config, mode).unwrap()
}

#[test]
fn single_local_job() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = validated(
        dir.path(),
        "%set_job\nrun1\n%param units si\n%param boundary p p p\n",
        Mode::Local,
    );
    let jobs_dir = materialize(&sweep, &Options::default(), &Settings::default()).unwrap();
    assert_eq!(jobs_dir.file_name().unwrap(), "sweep");

    let input = fs::read_to_string(jobs_dir.join("run1/in.script")).unwrap();
    assert_eq!(input, "units si\nboundary p p p\n");
    let sim = fs::read_to_string(jobs_dir.join("run1/sim.sh")).unwrap();
    assert!(sim.contains("mpirun -np 1 "));
    assert!(sim.contains("> log.liggghts 2>&1"));
    assert!(!jobs_dir.join("run1/hostfile").exists());
    assert!(!jobs_dir.join("run1/animate").exists());
    assert!(jobs_dir.join("sim_all.sh").is_file());
    assert!(!jobs_dir.join(".run1.staging").exists());
}

#[test]
fn input_script_follows_group_order_per_job() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = validated(
        dir.path(),
        "%set_job\na\nb\n%param units si\n%set_param\nvariable v equal 1\nvariable v equal 2\n%param run 1000\n",
        Mode::Local,
    );
    let jobs_dir = materialize(&sweep, &Options::default(), &Settings::default()).unwrap();
    for (idx, name) in ["a", "b"].iter().enumerate() {
        let input = fs::read_to_string(jobs_dir.join(name).join(INPUT_SCRIPT_FILE)).unwrap();
        let lines: Vec<&str> = input.lines().collect();
        assert_eq!(lines, sweep.input_lines(idx));
    }
    let input = fs::read_to_string(jobs_dir.join("b").join(INPUT_SCRIPT_FILE)).unwrap();
    assert_eq!(input, "units si\nvariable v equal 2\nrun 1000\n");
}

#[test]
fn materialize_twice_is_identical_and_drops_stale_files() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = validated(
        dir.path(),
        "%set_job\na\nb\n%param processors 2 1 1\n%set_cluster\nh1 slots=2\nh2 slots=1 + h3 slots=1\n",
        Mode::Cluster,
    );
    let options = Options {
        mode: Mode::Cluster,
        render: true,
        execute: false,
    };
    let jobs_dir = materialize(&sweep, &options, &Settings::default()).unwrap();
    let files = [
        "a/in.script",
        "a/hostfile",
        "a/qsub_sim.sh",
        "a/animate/render.py",
        "a/animate/encode.sh",
        "b/hostfile",
        "qsub_sim_all.sh",
    ];
    let first: Vec<String> = files
        .iter()
        .map(|f| fs::read_to_string(jobs_dir.join(f)).unwrap())
        .collect();
    fs::write(jobs_dir.join("a/log.liggghts"), "old run").unwrap();

    let again = materialize(&sweep, &options, &Settings::default()).unwrap();
    assert_eq!(again, jobs_dir);
    let second: Vec<String> = files
        .iter()
        .map(|f| fs::read_to_string(jobs_dir.join(f)).unwrap())
        .collect();
    assert_eq!(first, second);
    assert!(!jobs_dir.join("a/log.liggghts").exists());

    assert_eq!(first[1], "h1\n");
    assert_eq!(first[5], "h2\nh3\n");
}

#[test]
fn cluster_mode_needs_cluster_validation() {
    let dir = tempfile::tempdir().unwrap();
    let sweep = validated(dir.path(), "%set_job\na\n%param units si\n", Mode::Local);
    let options = Options {
        mode: Mode::Cluster,
        ..Options::default()
    };
    assert!(materialize(&sweep, &options, &Settings::default()).is_err());
    assert!(!dir.path().join("sweep").exists());
}

#[test]
fn dropped_staging_keeps_previous_directory() {
    let dir = tempfile::tempdir().unwrap();
    let job_dir = dir.path().join("a");
    fs::create_dir_all(&job_dir).unwrap();
    fs::write(job_dir.join(INPUT_SCRIPT_FILE), "previous").unwrap();
    {
        let staged = reset_job_directory(dir.path(), "a").unwrap();
        fs::write(staged.path().join(INPUT_SCRIPT_FILE), "half written").unwrap();
    }
    assert!(!dir.path().join(".a.staging").exists());
    assert_eq!(
        fs::read_to_string(job_dir.join(INPUT_SCRIPT_FILE)).unwrap(),
        "previous"
    );
}

#[test]
fn job_directory_outside_jobs_dir_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let jobs_dir = dir.path().join("jobs");
    fs::create_dir_all(&jobs_dir).unwrap();
    fs::write(dir.path().join("precious.dat"), "keep").unwrap();

    for name in &["..", ".", "../x", "a/b", ""] {
        assert!(reset_job_directory(&jobs_dir, name).is_err(), "{}", name);
    }
    assert!(dir.path().join("precious.dat").is_file());
}

#[test]
fn dot_dot_job_name_leaves_config_dir_intact() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("precious.dat"), "keep").unwrap();
    let path = dir.path().join("work.ini");
    fs::write(&path, "%set_job\n..\n%param units si\n").unwrap();

    let config = crate::config::parse(&path).unwrap();
    let result = validate::validate(&config, Mode::Local);
    assert!(matches!(result, Err(Error::InvalidJobName { .. })));
    assert!(dir.path().join("precious.dat").is_file());
    assert!(path.is_file());
}
