//! Config validation.
//!
//! Validation checks the raw [`Config`] for consistency between jobs,
//! parameter groups and cluster allocations, and produces a new resolved
//! [`Sweep`] value. The raw config is left untouched.
//!
//! [`Config`]: ../config/struct.Config.html
//! [`Sweep`]: struct.Sweep.html

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use crate::config::{self, Config};
use crate::error::{Error, Result};
use crate::Mode;

/// Token marking the parameter line the process count is derived from.
const PROCESSORS_TOKEN: &str = "processors";
/// Directive referencing a surface mesh file.
const MESH_TOKEN: &str = "mesh/surface";
/// Keyword preceding the mesh file path.
const MESH_FILE_KEYWORD: &str = "file";
/// Directive reading a restart file, followed by its path.
const RESTART_TOKEN: &str = "read_restart";

/// Parameter lines shared by all jobs or given for each job.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterGroup {
    Shared(String),
    PerJob(Vec<String>),
}

impl ParameterGroup {
    /// Returns the line used for the job at the given index.
    pub fn line(&self, job_index: usize) -> &str {
        match self {
            ParameterGroup::Shared(line) => line,
            ParameterGroup::PerJob(lines) => &lines[job_index],
        }
    }

    fn lines_mut(&mut self) -> Vec<&mut String> {
        match self {
            ParameterGroup::Shared(line) => vec![line],
            ParameterGroup::PerJob(lines) => lines.iter_mut().collect(),
        }
    }
}

/// Single job of a sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub name: String,
    /// Number of MPI processes the job runs with.
    pub processes: u32,
}

/// Host with the number of slots allocated on it.
#[derive(Debug, Clone, PartialEq)]
pub struct HostSlots {
    pub host: String,
    pub slots: u32,
}

/// Cluster hosts allocated to a single job.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAllocation {
    pub hosts: Vec<HostSlots>,
}

impl ClusterAllocation {
    /// Parses an allocation line such as `node01 slots=2 + node02 slots=4`.
    ///
    /// Returns `None` if any `slots=` value is not an integer or the slots
    /// of a host do not fit in a `u32`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut hosts = Vec::new();
        for segment in line.split('+') {
            let mut tokens = segment.split_whitespace();
            let host = match tokens.next() {
                Some(h) => h.to_string(),
                None => continue,
            };
            let mut slots = 0;
            for token in tokens {
                if let Some(value) = token.strip_prefix("slots=") {
                    slots = value.parse::<u32>().ok()?.checked_add(slots)?;
                }
            }
            hosts.push(HostSlots { host, slots });
        }
        Some(Self { hosts })
    }

    /// Sum of slots over all hosts, `None` on overflow.
    pub fn total_slots(&self) -> Option<u32> {
        self.hosts
            .iter()
            .try_fold(0u32, |total, h| total.checked_add(h.slots))
    }
}

/// Validated and resolved sweep config.
#[derive(Debug, Clone, PartialEq)]
pub struct Sweep {
    /// Path to the source config file.
    pub path: PathBuf,
    pub jobs: Vec<Job>,
    pub groups: Vec<ParameterGroup>,
    /// Host allocations, one per job, present only in cluster mode.
    pub cluster: Option<Vec<ClusterAllocation>>,
}

impl Sweep {
    pub fn jobs_dir(&self) -> PathBuf {
        config::jobs_dir_of(&self.path)
    }

    /// Lines of the input script for the job at the given index, in group
    /// order.
    pub fn input_lines(&self, job_index: usize) -> Vec<&str> {
        self.groups.iter().map(|g| g.line(job_index)).collect()
    }

    pub fn process_counts(&self) -> Vec<u32> {
        self.jobs.iter().map(|j| j.processes).collect()
    }
}

/// Validates the config, returning the resolved sweep.
///
/// Checks are run category by category, stopping at the first category with
/// violations. Cluster allocations are only checked for `Mode::Cluster`.
pub fn validate(config: &Config, mode: Mode) -> Result<Sweep> {
    let path = config.path.clone();

    check_jobs(config)?;

    if config.groups.is_empty() {
        return Err(Error::NoParameters { config: path });
    }
    let mut groups = build_groups(config)?;
    resolve_file_references(&mut groups, config)?;

    let processes = process_counts(config, &groups)?;
    let jobs: Vec<Job> = config
        .jobs
        .iter()
        .zip(processes.iter())
        .map(|(name, np)| Job {
            name: name.clone(),
            processes: *np,
        })
        .collect();

    let cluster = match mode {
        Mode::Cluster => Some(check_cluster(config, &processes)?),
        Mode::Local => None,
    };

    debug!(
        "{}: {} jobs, {} parameter groups, processes: {:?}",
        path.display(),
        jobs.len(),
        groups.len(),
        processes
    );

    Ok(Sweep {
        path,
        jobs,
        groups,
        cluster,
    })
}

fn check_jobs(config: &Config) -> Result<()> {
    let path = config.path.clone();
    if config.jobs.is_empty() {
        return Err(Error::NoJobs { config: path });
    }

    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for job in &config.jobs {
        if !seen.insert(job.as_str()) {
            duplicates.insert(job.clone());
        }
    }
    if !duplicates.is_empty() {
        return Err(Error::DuplicateJobs {
            config: path,
            names: duplicates.into_iter().collect(),
        });
    }

    let spaced: Vec<String> = config
        .jobs
        .iter()
        .filter(|j| j.chars().any(char::is_whitespace))
        .cloned()
        .collect();
    if !spaced.is_empty() {
        return Err(Error::WhitespaceInJobName {
            config: path,
            names: spaced,
        });
    }

    let invalid: Vec<String> = config
        .jobs
        .iter()
        .filter(|j| !is_plain_dir_name(j))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        return Err(Error::InvalidJobName {
            config: path,
            names: invalid,
        });
    }
    Ok(())
}

/// Returns true if the name is a single normal path component, so that
/// joining it onto the jobs directory stays inside of it.
pub fn is_plain_dir_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(std::path::is_separator)
}

/// Turns raw groups into shared or per-job groups.
fn build_groups(config: &Config) -> Result<Vec<ParameterGroup>> {
    let job_count = config.jobs.len();
    let mut groups = Vec::with_capacity(config.groups.len());
    let mut mismatched = Vec::new();
    for (n, raw) in config.groups.iter().enumerate() {
        if raw.len() == 1 {
            groups.push(ParameterGroup::Shared(raw[0].clone()));
        } else if raw.len() == job_count {
            groups.push(ParameterGroup::PerJob(raw.clone()));
        } else {
            mismatched.push((n, raw.len()));
        }
    }
    if !mismatched.is_empty() {
        return Err(Error::CardinalityMismatch {
            config: config.path.clone(),
            jobs: job_count,
            groups: mismatched,
        });
    }
    Ok(groups)
}

/// Returns the file path token referenced by the line, if any.
fn referenced_file(line: &str) -> Option<&str> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let keyword = if tokens.contains(&MESH_TOKEN) {
        MESH_FILE_KEYWORD
    } else if tokens.contains(&RESTART_TOKEN) {
        RESTART_TOKEN
    } else {
        return None;
    };
    let idx = tokens.iter().position(|t| *t == keyword)?;
    tokens.get(idx + 1).copied()
}

/// Resolves file references against the config directory, rewriting them to
/// absolute paths.
fn resolve_file_references(groups: &mut [ParameterGroup], config: &Config) -> Result<()> {
    let base_dir = config.base_dir();
    let mut missing = Vec::new();
    for group in groups.iter_mut() {
        for line in group.lines_mut() {
            let raw = match referenced_file(line) {
                Some(r) => r.to_string(),
                None => continue,
            };
            match resolve_path(&base_dir, &raw) {
                Some(resolved) => {
                    let resolved = resolved.to_string_lossy().to_string();
                    if resolved != raw {
                        trace!("resolved {} to {}", raw, resolved);
                        *line = replace_token(line, &raw, &resolved);
                    }
                }
                None => missing.push(raw),
            }
        }
    }
    if !missing.is_empty() {
        return Err(Error::MissingReferencedFile {
            config: config.path.clone(),
            files: missing,
        });
    }
    Ok(())
}

fn resolve_path(base_dir: &Path, raw: &str) -> Option<PathBuf> {
    let path = base_dir.join(raw);
    if !path.is_file() {
        return None;
    }
    dunce::canonicalize(path).ok()
}

/// Replaces the first whitespace-delimited token equal to `from`, keeping
/// the rest of the line intact.
fn replace_token(line: &str, from: &str, to: &str) -> String {
    let mut start = 0;
    while let Some(pos) = line[start..].find(from) {
        let begin = start + pos;
        let end = begin + from.len();
        let before_ok = line[..begin]
            .chars()
            .last()
            .map_or(true, char::is_whitespace);
        let after_ok = line[end..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace);
        if before_ok && after_ok {
            return format!("{}{}{}", &line[..begin], to, &line[end..]);
        }
        start = end;
    }
    line.to_string()
}

/// Derives the process count of every job from `processors` lines.
///
/// The count is the product of all purely numeric tokens on the line, so
/// `processors 2 3 1` gives 6. Any other number on that line is multiplied
/// in as well. A product of zero or one overflowing `u32` is an error.
fn process_counts(config: &Config, groups: &[ParameterGroup]) -> Result<Vec<u32>> {
    let mut counts = vec![1; config.jobs.len()];
    for group in groups {
        match group {
            ParameterGroup::Shared(line) => {
                if let Some(np) = processors_product(config, line)? {
                    counts.iter_mut().for_each(|c| *c = np);
                }
            }
            ParameterGroup::PerJob(lines) => {
                for (idx, line) in lines.iter().enumerate() {
                    if let Some(np) = processors_product(config, line)? {
                        counts[idx] = np;
                    }
                }
            }
        }
    }
    Ok(counts)
}

fn processors_product(config: &Config, line: &str) -> Result<Option<u32>> {
    if !line.contains(PROCESSORS_TOKEN) {
        return Ok(None);
    }
    let invalid = || Error::InvalidProcessCount {
        config: config.path.clone(),
        line: line.to_string(),
    };
    let mut product: Option<u32> = None;
    for token in line.split_whitespace() {
        if !token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let n = token.parse::<u32>().map_err(|_| invalid())?;
        product = Some(product.unwrap_or(1).checked_mul(n).ok_or_else(invalid)?);
    }
    match product {
        Some(0) => Err(invalid()),
        p => Ok(p),
    }
}

fn check_cluster(config: &Config, processes: &[u32]) -> Result<Vec<ClusterAllocation>> {
    if config.cluster.is_empty() || config.cluster.len() != config.jobs.len() {
        return Err(Error::ClusterCardinalityMismatch {
            config: config.path.clone(),
            expected: config.jobs.len(),
            actual: config.cluster.len(),
        });
    }

    let mut allocations = Vec::with_capacity(config.cluster.len());
    for line in &config.cluster {
        match ClusterAllocation::parse(line) {
            Some(a) => allocations.push(a),
            None => {
                return Err(Error::MalformedClusterLine {
                    config: config.path.clone(),
                    line: line.clone(),
                })
            }
        }
    }

    let mut slots = Vec::with_capacity(allocations.len());
    for (allocation, line) in allocations.iter().zip(config.cluster.iter()) {
        match allocation.total_slots() {
            Some(total) => slots.push(total),
            None => {
                return Err(Error::MalformedClusterLine {
                    config: config.path.clone(),
                    line: line.clone(),
                })
            }
        }
    }
    if slots != processes {
        return Err(Error::ClusterSlotMismatch {
            config: config.path.clone(),
            expected: processes.to_vec(),
            actual: slots,
        });
    }
    Ok(allocations)
}

#[cfg(test)]
fn config_with(jobs: &[&str], groups: &[&[&str]], cluster: &[&str]) -> Config {
    Config {
        path: PathBuf::from("sweeps/test.ini"),
        jobs: jobs.iter().map(|s| s.to_string()).collect(),
        groups: groups
            .iter()
            .map(|g| g.iter().map(|s| s.to_string()).collect())
            .collect(),
        cluster: cluster.iter().map(|s| s.to_string()).collect(),
    }
}

#[test]
fn job_list_checks() {
    let c = config_with(&[], &[&["units si"]], &[]);
    assert!(matches!(validate(&c, Mode::Local), Err(Error::NoJobs { .. })));

    let c = config_with(&["a", "b", "a"], &[&["units si"]], &[]);
    match validate(&c, Mode::Local) {
        Err(Error::DuplicateJobs { names, .. }) => assert_eq!(names, vec!["a"]),
        other => panic!("unexpected: {:?}", other),
    }

    let c = config_with(&["a b"], &[&["units si"]], &[]);
    assert!(matches!(
        validate(&c, Mode::Local),
        Err(Error::WhitespaceInJobName { .. })
    ));

    let c = config_with(&["ok", "..", ".", "a/b", "../x", "/abs"], &[&["units si"]], &[]);
    match validate(&c, Mode::Local) {
        Err(Error::InvalidJobName { names, .. }) => {
            assert_eq!(names, vec!["..", ".", "a/b", "../x", "/abs"])
        }
        other => panic!("unexpected: {:?}", other),
    }

    let c = config_with(&["a"], &[], &[]);
    assert!(matches!(
        validate(&c, Mode::Local),
        Err(Error::NoParameters { .. })
    ));
}

#[test]
fn group_size_must_be_one_or_job_count() {
    let c = config_with(
        &["a", "b", "c"],
        &[&["units si"], &["x 1", "x 2"], &["y 1", "y 2", "y 3"], &["z 1", "z 2"]],
        &[],
    );
    match validate(&c, Mode::Local) {
        Err(Error::CardinalityMismatch { jobs, groups, .. }) => {
            assert_eq!(jobs, 3);
            assert_eq!(groups, vec![(1, 2), (3, 2)]);
        }
        other => panic!("unexpected: {:?}", other),
    }

    let c = config_with(&["a", "b", "c"], &[&["units si"], &["y 1", "y 2", "y 3"]], &[]);
    let sweep = validate(&c, Mode::Local).unwrap();
    assert_eq!(sweep.groups[0], ParameterGroup::Shared("units si".to_string()));
    assert_eq!(sweep.input_lines(2), vec!["units si", "y 3"]);
}

#[test]
fn processors_line_gives_process_count() {
    let c = config_with(&["a", "b"], &[&["processors 2 3 1"]], &[]);
    let sweep = validate(&c, Mode::Local).unwrap();
    assert_eq!(sweep.process_counts(), vec![6, 6]);

    let c = config_with(
        &["a", "b", "c"],
        &[&["processors 2 2 1", "processors 1 1 1", "processors * * *"]],
        &[],
    );
    let sweep = validate(&c, Mode::Local).unwrap();
    assert_eq!(sweep.process_counts(), vec![4, 1, 1]);

    let c = config_with(&["a"], &[&["units si"]], &[]);
    assert_eq!(validate(&c, Mode::Local).unwrap().process_counts(), vec![1]);
}

#[test]
fn process_count_must_be_positive_and_fit() {
    let c = config_with(&["a"], &[&["processors 0 1 1"]], &[]);
    assert!(matches!(
        validate(&c, Mode::Local),
        Err(Error::InvalidProcessCount { .. })
    ));

    let c = config_with(&["a"], &[&["processors 65536 65536 1"]], &[]);
    match validate(&c, Mode::Local) {
        Err(Error::InvalidProcessCount { line, .. }) => {
            assert_eq!(line, "processors 65536 65536 1")
        }
        other => panic!("unexpected: {:?}", other),
    }

    // too large for u32 on its own
    let c = config_with(&["a"], &[&["processors 99999999999 1 1"]], &[]);
    assert!(matches!(
        validate(&c, Mode::Local),
        Err(Error::InvalidProcessCount { .. })
    ));
}

#[test]
fn overflowing_slots_are_malformed() {
    let groups: &[&[&str]] = &[&["processors 1 1 1"]];
    let c = config_with(&["a"], groups, &["h1 slots=4294967295 + h2 slots=1"]);
    assert!(matches!(
        validate(&c, Mode::Cluster),
        Err(Error::MalformedClusterLine { .. })
    ));

    let c = config_with(&["a"], groups, &["h1 slots=4294967295 slots=1"]);
    assert!(matches!(
        validate(&c, Mode::Cluster),
        Err(Error::MalformedClusterLine { .. })
    ));
}

#[test]
fn cluster_slots_must_match_process_counts() {
    let groups: &[&[&str]] = &[&["processors 4 1 1", "processors 2 1 1"]];
    let c = config_with(&["a", "b"], groups, &["h1 slots=4", "h2 slots=1 + h3 slots=1"]);
    let sweep = validate(&c, Mode::Cluster).unwrap();
    let cluster = sweep.cluster.unwrap();
    assert_eq!(cluster[1].hosts.len(), 2);
    assert_eq!(cluster[1].hosts[1].host, "h3");

    let c = config_with(&["a", "b"], groups, &["h1 slots=4", "h2 slots=1 + h3 slots=2"]);
    match validate(&c, Mode::Cluster) {
        Err(Error::ClusterSlotMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, vec![4, 2]);
            assert_eq!(actual, vec![4, 3]);
        }
        other => panic!("unexpected: {:?}", other),
    }

    // allocations are ignored outside of cluster mode
    assert!(validate(&c, Mode::Local).unwrap().cluster.is_none());
}

#[test]
fn cluster_allocation_count_checked() {
    let c = config_with(&["a", "b"], &[&["units si"]], &["h1 slots=1"]);
    match validate(&c, Mode::Cluster) {
        Err(Error::ClusterCardinalityMismatch {
            expected, actual, ..
        }) => assert_eq!((expected, actual), (2, 1)),
        other => panic!("unexpected: {:?}", other),
    }

    let c = config_with(&["a"], &[&["units si"]], &["h1 slots=x"]);
    assert!(matches!(
        validate(&c, Mode::Cluster),
        Err(Error::MalformedClusterLine { .. })
    ));
}

#[test]
fn missing_mesh_file_is_reported() {
    let c = config_with(
        &["a"],
        &[&["fix cad all mesh/surface file nonexistent.stl type 1"]],
        &[],
    );
    match validate(&c, Mode::Local) {
        Err(Error::MissingReferencedFile { files, .. }) => {
            assert_eq!(files, vec!["nonexistent.stl"])
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn referenced_files_resolve_to_absolute_paths() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("pump.stl"), "solid").unwrap();
    std::fs::write(dir.path().join("state.restart"), "").unwrap();
    let mut c = config_with(
        &["a", "b"],
        &[
            &["fix cad all mesh/surface file pump.stl type 1 scale 0.001"],
            &["read_restart state.restart", "units si"],
        ],
        &[],
    );
    c.path = dir.path().join("sweep.ini");

    let sweep = validate(&c, Mode::Local).unwrap();
    let base = dunce::canonicalize(dir.path()).unwrap();
    let stl = base.join("pump.stl").to_string_lossy().to_string();
    assert_eq!(
        sweep.groups[0].line(0),
        format!("fix cad all mesh/surface file {} type 1 scale 0.001", stl)
    );
    assert_eq!(
        sweep.groups[1].line(0),
        format!("read_restart {}", base.join("state.restart").display())
    );
    assert_eq!(sweep.groups[1].line(1), "units si");
    // raw config stays as written
    assert_eq!(c.groups[1][0], "read_restart state.restart");

    // absolute paths resolve to themselves
    let mut again = c.clone();
    again.groups[0] = vec![sweep.groups[0].line(0).to_string()];
    let resolved = validate(&again, Mode::Local).unwrap();
    assert_eq!(resolved.groups[0], sweep.groups[0]);
}

#[test]
fn replace_token_matches_whole_tokens() {
    assert_eq!(
        replace_token("file a.stl.bak a.stl", "a.stl", "/x/a.stl"),
        "file a.stl.bak /x/a.stl"
    );
}

#[test]
fn demo_sweep_is_valid() {
    let config = crate::config::parse("../demos/vibration.ini").unwrap();
    let sweep = validate(&config, Mode::Cluster).unwrap();
    assert_eq!(sweep.process_counts(), vec![4, 4, 4]);
    assert_eq!(sweep.cluster.as_ref().unwrap()[1].total_slots(), Some(4));
    let pump = dunce::canonicalize("../demos/pump.stl").unwrap();
    assert!(sweep
        .input_lines(0)
        .contains(&format!("fix pump all mesh/surface file {} type 1 scale 0.001", pump.display()).as_str()));
}
