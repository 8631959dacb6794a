//! Looking at job logs.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;
use crate::{POST_LOG_FILE, SIMULATION_LOG_FILE};

/// Number of lines shown when not specified otherwise.
pub const DEFAULT_LINE_COUNT: usize = 15;

/// Log written into every job directory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogKind {
    /// Output of the simulation binary.
    Simulation,
    /// Output of the rendering stage.
    PostProcess,
}

impl LogKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            LogKind::Simulation => SIMULATION_LOG_FILE,
            LogKind::PostProcess => POST_LOG_FILE,
        }
    }
}

/// Part of the log to show.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogSide {
    Head,
    Tail,
}

/// Log paths of every job of the config, in job order.
pub fn log_paths(config: &Config, kind: LogKind) -> Vec<PathBuf> {
    let jobs_dir = config.jobs_dir();
    config
        .jobs
        .iter()
        .map(|job| jobs_dir.join(job).join(kind.file_name()))
        .collect()
}

/// Writes the head or tail of each job's log to `out`.
///
/// Missing logs are reported and skipped. Returns the number of logs shown.
pub fn show<W: Write>(
    config: &Config,
    kind: LogKind,
    side: LogSide,
    line_count: usize,
    out: &mut W,
) -> Result<usize> {
    let mut shown = 0;
    for path in log_paths(config, kind) {
        if !path.is_file() {
            writeln!(out, "{} does not exist", path.display())?;
            continue;
        }
        writeln!(out, "==> {} <==", path.display())?;
        let lines = match read_lines(&path, side, line_count) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("failed reading {}: {}", path.display(), e);
                writeln!(out, "{} could not be read: {}", path.display(), e)?;
                continue;
            }
        };
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        shown += 1;
    }
    Ok(shown)
}

fn read_lines(path: &Path, side: LogSide, line_count: usize) -> std::io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    match side {
        LogSide::Head => head(reader, line_count),
        LogSide::Tail => tail(reader, line_count),
    }
}

/// Lines of the reader, with invalid UTF-8 replaced rather than rejected.
fn lossy_lines<R: BufRead>(reader: R) -> impl Iterator<Item = std::io::Result<String>> {
    reader.split(b'\n').map(|line| {
        let mut line = line?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    })
}

fn head<R: BufRead>(reader: R, count: usize) -> std::io::Result<Vec<String>> {
    lossy_lines(reader).take(count).collect()
}

fn tail<R: BufRead>(reader: R, count: usize) -> std::io::Result<Vec<String>> {
    let mut window = VecDeque::with_capacity(count);
    for line in lossy_lines(reader) {
        let line = line?;
        if count == 0 {
            continue;
        }
        if window.len() == count {
            window.pop_front();
        }
        window.push_back(line);
    }
    Ok(window.into_iter().collect())
}

#[cfg(test)]
fn config_in(dir: &Path, jobs: &[&str]) -> Config {
    Config {
        path: dir.join("amp.ini"),
        jobs: jobs.iter().map(|j| j.to_string()).collect(),
        ..Config::default()
    }
}

#[test]
fn tail_longer_than_log_prints_everything() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), &["a"]);
    std::fs::create_dir_all(dir.path().join("amp/a")).unwrap();
    std::fs::write(dir.path().join("amp/a/log.liggghts"), "one\ntwo\nthree\n").unwrap();

    let mut out = Vec::new();
    let shown = show(&config, LogKind::Simulation, LogSide::Tail, 5, &mut out).unwrap();
    assert_eq!(shown, 1);
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("==> ") && lines[0].ends_with("log.liggghts <=="));
    assert_eq!(&lines[1..], &["one", "two", "three"]);
}

#[test]
fn head_and_tail_select_lines() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), &["a"]);
    std::fs::create_dir_all(dir.path().join("amp/a")).unwrap();
    let log: String = (1..=40).map(|n| format!("step {}\n", n)).collect();
    std::fs::write(dir.path().join("amp/a/log.post"), log).unwrap();

    let mut out = Vec::new();
    show(&config, LogKind::PostProcess, LogSide::Head, DEFAULT_LINE_COUNT, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().count(), 16);
    assert_eq!(text.lines().nth(1), Some("step 1"));
    assert_eq!(text.lines().last(), Some("step 15"));

    let mut out = Vec::new();
    show(&config, LogKind::PostProcess, LogSide::Tail, 2, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.lines().skip(1).collect::<Vec<_>>(), vec!["step 39", "step 40"]);
}

#[test]
fn missing_logs_are_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), &["a", "b"]);
    std::fs::create_dir_all(dir.path().join("amp/b")).unwrap();
    std::fs::write(dir.path().join("amp/b/log.liggghts"), "done\n").unwrap();

    let mut out = Vec::new();
    let shown = show(&config, LogKind::Simulation, LogSide::Head, 15, &mut out).unwrap();
    assert_eq!(shown, 1);
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].ends_with("a/log.liggghts does not exist"));
    assert!(lines[1].ends_with("b/log.liggghts <=="));
    assert_eq!(lines[2], "done");
}

#[test]
fn invalid_utf8_in_log_does_not_stop_other_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path(), &["a", "b"]);
    std::fs::create_dir_all(dir.path().join("amp/a")).unwrap();
    std::fs::create_dir_all(dir.path().join("amp/b")).unwrap();
    std::fs::write(dir.path().join("amp/a/log.liggghts"), b"step 1\r\nbad \xff\xfe\n").unwrap();
    std::fs::write(dir.path().join("amp/b/log.liggghts"), "done\n").unwrap();

    let mut out = Vec::new();
    let shown = show(&config, LogKind::Simulation, LogSide::Tail, 15, &mut out).unwrap();
    assert_eq!(shown, 2);
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[1], "step 1");
    assert_eq!(lines[2], "bad \u{fffd}\u{fffd}");
    assert!(lines[3].ends_with("b/log.liggghts <=="));
    assert_eq!(lines[4], "done");
}
