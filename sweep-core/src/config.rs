//! Sweep config file parsing.
//!
//! Config files are plain text. Lines starting with `#` are comments, blank
//! lines are ignored and lines starting with `%` are directives switching the
//! parser between accumulation modes:
//!
//! - `%param <text>` adds a single parameter line shared by all jobs
//! - `%set_job` starts the list of job names
//! - `%set_param` starts a parameter group, one line per job or a single line
//! - `%set_cluster` starts the list of host allocations, one line per job
//!
//! Any other line is appended to the list selected by the last directive.

use std::mem;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::util;

static DIRECTIVE_SYMBOL: char = '%';
static COMMENT_SYMBOL: char = '#';

const PARAM_DIRECTIVE: &str = "%param";
const SET_JOB_DIRECTIVE: &str = "%set_job";
const LEGACY_JOB_DIRECTIVE: &str = "%job";
const SET_PARAM_DIRECTIVE: &str = "%set_param";
const SET_CLUSTER_DIRECTIVE: &str = "%set_cluster";

const KNOWN_DIRECTIVES: [&str; 4] = [
    PARAM_DIRECTIVE,
    SET_JOB_DIRECTIVE,
    SET_PARAM_DIRECTIVE,
    SET_CLUSTER_DIRECTIVE,
];

/// Raw contents of a single config file.
///
/// Parameter groups are kept exactly as written. Checking their sizes against
/// the job list is the job of the validator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Path to the config file the contents were read from.
    pub path: PathBuf,
    pub jobs: Vec<String>,
    pub groups: Vec<Vec<String>>,
    pub cluster: Vec<String>,
}

impl Config {
    /// Directory holding the job directories of this config.
    pub fn jobs_dir(&self) -> PathBuf {
        jobs_dir_of(&self.path)
    }

    /// Directory containing the config file, used for resolving relative
    /// paths found inside it.
    pub fn base_dir(&self) -> PathBuf {
        base_dir_of(&self.path)
    }
}

/// Job directories of a config live in a sibling of the config file named
/// after its stem.
pub fn jobs_dir_of(config_path: &Path) -> PathBuf {
    let stem = config_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    base_dir_of(config_path).join(stem)
}

fn base_dir_of(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Accumulation mode of the parser.
#[derive(Debug, PartialEq)]
enum Mode {
    None,
    Job,
    /// Lines of the parameter group being accumulated.
    Param(Vec<String>),
    Cluster,
}

/// Parses the config file at the given path.
pub fn parse<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let text = util::read_text_file(path).map_err(|e| Error::ParseIo {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parse_str(&text, path))
}

/// Parses config text. `path` is only recorded in the returned config.
pub fn parse_str(text: &str, path: &Path) -> Config {
    let mut config = Config {
        path: path.to_path_buf(),
        ..Config::default()
    };
    let mut mode = Mode::None;

    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT_SYMBOL) {
            continue;
        }

        if line.starts_with(DIRECTIVE_SYMBOL) {
            // any directive concludes a pending parameter group
            if let Mode::Param(lines) = mem::replace(&mut mode, Mode::None) {
                flush_group(&mut config, lines);
            }
            mode = directive_mode(&mut config, line, n + 1);
            continue;
        }

        match &mut mode {
            Mode::Job => config.jobs.push(line.to_string()),
            Mode::Param(lines) => lines.push(line.to_string()),
            Mode::Cluster => config.cluster.push(line.to_string()),
            Mode::None => debug!(
                "{}:{}: line outside of any directive, ignoring",
                path.display(),
                n + 1
            ),
        }
    }

    if let Mode::Param(lines) = mode {
        flush_group(&mut config, lines);
    }

    config
}

fn flush_group(config: &mut Config, lines: Vec<String>) {
    if !lines.is_empty() {
        config.groups.push(lines);
    }
}

/// Applies a directive line, returning the mode the parser switches to.
fn directive_mode(config: &mut Config, line: &str, line_number: usize) -> Mode {
    if line.contains(PARAM_DIRECTIVE) {
        let text = line.replacen(PARAM_DIRECTIVE, "", 1).trim().to_string();
        config.groups.push(vec![text]);
        Mode::None
    } else if line.contains(SET_JOB_DIRECTIVE) || line.contains(LEGACY_JOB_DIRECTIVE) {
        Mode::Job
    } else if line.contains(SET_PARAM_DIRECTIVE) {
        Mode::Param(Vec::new())
    } else if line.contains(SET_CLUSTER_DIRECTIVE) {
        Mode::Cluster
    } else {
        let directive = line.split_whitespace().next().unwrap_or(line);
        match suggest_directive(directive) {
            Some(s) => warn!(
                "{}:{}: unknown directive `{}`, did you mean `{}`?",
                config.path.display(),
                line_number,
                directive,
                s
            ),
            None => warn!(
                "{}:{}: unknown directive `{}`",
                config.path.display(),
                line_number,
                directive
            ),
        }
        Mode::None
    }
}

/// Finds the known directive closest to the given one.
fn suggest_directive(directive: &str) -> Option<&'static str> {
    KNOWN_DIRECTIVES
        .iter()
        .map(|known| (*known, strsim::jaro_winkler(directive, known)))
        .filter(|(_, score)| *score > 0.8)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(known, _)| known)
}

/// Expands the given paths into a list of config files. Directories are
/// searched (non-recursively) for files with the config file extension.
pub fn discover<P: AsRef<Path>>(paths: &[P]) -> Vec<PathBuf> {
    let mut configs = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            let found =
                util::find_files_with_extension(path, crate::CONFIG_FILE_EXTENSION, false);
            if found.is_empty() {
                warn!("no config files found in {}", path.display());
            }
            configs.extend(found);
        } else {
            configs.push(path.to_path_buf());
        }
    }
    configs
}

#[test]
fn parse_directives_and_groups() {
    let text = r###"
        # amplitude sweep
        %set_job
        amp_10
        amp_20

        %param units si
        %param processors 2 1 1
        %set_param
        variable amp equal 10
        variable amp equal 20
        %set_cluster
        node01 slots=2
        node02 slots=1 + node03 slots=1
    "###;
    let config = parse_str(text, Path::new("sweeps/amp.ini"));
    assert_eq!(config.jobs, vec!["amp_10", "amp_20"]);
    assert_eq!(
        config.groups,
        vec![
            vec!["units si".to_string()],
            vec!["processors 2 1 1".to_string()],
            vec![
                "variable amp equal 10".to_string(),
                "variable amp equal 20".to_string()
            ],
        ]
    );
    assert_eq!(
        config.cluster,
        vec!["node01 slots=2", "node02 slots=1 + node03 slots=1"]
    );
    assert_eq!(config.jobs_dir(), PathBuf::from("sweeps/amp"));
}

#[test]
fn param_group_is_flushed_by_next_directive() {
    let text = "%set_param\na 1\na 2\n%param b\n%set_param\nc 1\n";
    let config = parse_str(text, Path::new("x.ini"));
    assert_eq!(
        config.groups,
        vec![
            vec!["a 1".to_string(), "a 2".to_string()],
            vec!["b".to_string()],
            vec!["c 1".to_string()],
        ]
    );
}

#[test]
fn lines_without_mode_are_ignored() {
    let text = "orphan line\n%bogus\nstill orphan\n%job\nrun\n";
    let config = parse_str(text, Path::new("x.ini"));
    assert_eq!(config.jobs, vec!["run"]);
    assert!(config.groups.is_empty());
    assert_eq!(config.jobs_dir(), PathBuf::from("./x"));
}

#[test]
fn unknown_directive_gets_suggestion() {
    assert_eq!(suggest_directive("%set_parm"), Some(SET_PARAM_DIRECTIVE));
    assert_eq!(suggest_directive("%zzz"), None);
}

#[test]
fn unreadable_file_is_parse_io_error() {
    match parse("/nonexistent/sweep.ini") {
        Err(Error::ParseIo { path, .. }) => assert_eq!(path, PathBuf::from("/nonexistent/sweep.ini")),
        other => panic!("unexpected: {:?}", other),
    }
}
