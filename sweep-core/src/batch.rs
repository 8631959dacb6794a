//! Processing multiple config files.
//!
//! A failure in one config is logged and the remaining configs are still
//! processed.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::inspect::{self, LogKind, LogSide};
use crate::materialize::{self, Options};
use crate::settings::Settings;
use crate::{config, validate};

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct Summary {
    /// Jobs directories of the configs handled successfully.
    pub succeeded: Vec<PathBuf>,
    /// Configs that failed, with the error message.
    pub failed: Vec<(PathBuf, String)>,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Parses, validates and materializes a single config.
pub fn create(path: &Path, options: &Options, settings: &Settings) -> Result<PathBuf> {
    let config = config::parse(path)?;
    let sweep = validate::validate(&config, options.mode)?;
    materialize::materialize(&sweep, options, settings)
}

/// Creates jobs for every config in turn.
pub fn create_all<P: AsRef<Path>>(paths: &[P], options: &Options, settings: &Settings) -> Summary {
    let mut summary = Summary::default();
    for path in paths {
        let path = path.as_ref();
        match create(path, options, settings) {
            Ok(jobs_dir) => summary.succeeded.push(jobs_dir),
            Err(e) => {
                if e.is_validation() {
                    error!("invalid config, skipping: {}", e);
                } else {
                    error!("{}", e);
                }
                summary.failed.push((path.to_path_buf(), e.to_string()));
            }
        }
    }
    summary
}

/// Shows job logs for every config in turn.
pub fn inspect_all<P: AsRef<Path>, W: Write>(
    paths: &[P],
    kind: LogKind,
    side: LogSide,
    line_count: usize,
    out: &mut W,
) -> Summary {
    let mut summary = Summary::default();
    for path in paths {
        let path = path.as_ref();
        let result = config::parse(path)
            .and_then(|config| inspect::show(&config, kind, side, line_count, &mut *out));
        match result {
            Ok(_) => summary.succeeded.push(config::jobs_dir_of(path)),
            Err(e) => {
                error!("{}", e);
                summary.failed.push((path.to_path_buf(), e.to_string()));
            }
        }
    }
    summary
}

#[test]
fn bad_config_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.ini");
    let bad = dir.path().join("bad.ini");
    let missing = dir.path().join("missing.ini");
    std::fs::write(&good, "%set_job\nrun1\n%param units si\n").unwrap();
    std::fs::write(
        &bad,
        "%set_job\nrun1\n%param fix cad all mesh/surface file nonexistent.stl type 1\n",
    )
    .unwrap();

    let summary = create_all(
        &[&bad, &missing, &good],
        &Options::default(),
        &Settings::default(),
    );
    assert_eq!(summary.succeeded.len(), 1);
    assert!(summary.succeeded[0].ends_with("good"));
    assert_eq!(summary.failed.len(), 2);
    assert!(summary.failed[0].1.contains("nonexistent.stl"));
    assert!(!dir.path().join("bad").exists());
    assert!(!summary.is_success());
}
