//! Application definition.

extern crate simplelog;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Error, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;

use sweep::batch::{self, Summary};
use sweep::inspect::DEFAULT_LINE_COUNT;
use sweep::{config, LogKind, LogSide, Mode, Options, Settings};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("sweep")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .version(VERSION)
        .about("Create, run and inspect parameter-sweep simulation jobs.")
        .arg(Arg::with_name("verbosity")
            .long("verbosity")
            .short("v")
            .takes_value(true)
            .default_value("info")
            .value_name("verb")
            .global(true)
            .help("Set the verbosity of the log output"))
        .arg(Arg::with_name("settings")
            .long("settings")
            .short("s")
            .takes_value(true)
            .value_name("path")
            .global(true)
            .help("Path to the launcher settings file (defaults to ./sweep.toml if present)"))

        // create subcommand
        .subcommand(SubCommand::with_name("create")
            .display_order(10)
            .about("Create job directories and scripts from sweep config files")
            .arg(Arg::with_name("paths")
                .value_name("path")
                .required(true)
                .multiple(true)
                .help("Config files, or directories containing .ini config files"))
            .arg(Arg::with_name("cluster")
                .long("cluster")
                .short("c")
                .help("Generate batch queue submission scripts and hostfiles"))
            .arg(Arg::with_name("render")
                .long("render")
                .short("r")
                .help("Render frames and encode a video after each simulation"))
            .arg(Arg::with_name("exec")
                .long("exec")
                .short("x")
                .help("Run (or submit) the generated jobs right away"))
        )

        // log subcommand
        .subcommand(SubCommand::with_name("log")
            .display_order(20)
            .about("Show the beginning or end of job logs")
            .arg(Arg::with_name("paths")
                .value_name("path")
                .required(true)
                .multiple(true)
                .help("Config files, or directories containing .ini config files"))
            .arg(Arg::with_name("post")
                .long("post")
                .short("p")
                .help("Show the post-processing log instead of the simulation log"))
            .arg(Arg::with_name("head")
                .long("head")
                .help("Show the first lines instead of the last ones"))
            .arg(Arg::with_name("lines")
                .long("lines")
                .short("n")
                .takes_value(true)
                .value_name("count")
                .help("Number of lines to show per log [default: 15]"))
        )
}

pub fn app_matches() -> ArgMatches<'static> {
    app().get_matches()
}

/// Runs based on specified subcommand.
pub fn start(matches: ArgMatches) -> Result<()> {
    match matches.subcommand() {
        ("create", Some(m)) => start_create(m),
        ("log", Some(m)) => start_log(m),
        _ => Ok(()),
    }
}

fn start_create(matches: &ArgMatches) -> Result<()> {
    setup_log_verbosity(matches);
    let settings = load_settings(matches)?;
    let paths = config_paths(matches)?;

    let options = Options {
        mode: if matches.is_present("cluster") {
            Mode::Cluster
        } else {
            Mode::Local
        },
        render: matches.is_present("render"),
        execute: matches.is_present("exec"),
    };
    debug!("{:?}", options);

    let summary = batch::create_all(&paths, &options, &settings);
    for jobs_dir in &summary.succeeded {
        println!("{} {}", "created".green(), jobs_dir.display());
    }
    report(summary, paths.len())
}

fn start_log(matches: &ArgMatches) -> Result<()> {
    setup_log_verbosity(matches);
    let paths = config_paths(matches)?;

    let kind = if matches.is_present("post") {
        LogKind::PostProcess
    } else {
        LogKind::Simulation
    };
    let side = if matches.is_present("head") {
        LogSide::Head
    } else {
        LogSide::Tail
    };
    let line_count = match matches.value_of("lines") {
        Some(n) => n
            .parse::<usize>()
            .map_err(|e| Error::msg(format!("invalid line count \"{}\": {}", n, e)))?,
        None => DEFAULT_LINE_COUNT,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = batch::inspect_all(&paths, kind, side, line_count, &mut out);
    report(summary, paths.len())
}

fn load_settings(matches: &ArgMatches) -> Result<Settings> {
    let path = matches.value_of("settings").map(Path::new);
    Ok(Settings::load(path)?)
}

fn config_paths(matches: &ArgMatches) -> Result<Vec<PathBuf>> {
    let args: Vec<PathBuf> = matches
        .values_of("paths")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default();
    let paths = config::discover(&args);
    if paths.is_empty() {
        return Err(Error::msg("no config files given"));
    }
    Ok(paths)
}

fn report(summary: Summary, total: usize) -> Result<()> {
    if summary.is_success() {
        return Ok(());
    }
    for (path, _) in &summary.failed {
        println!("{} {}", "failed".red(), path.display());
    }
    Err(Error::msg(format!(
        "{} of {} config files failed",
        summary.failed.len(),
        total
    )))
}

fn setup_log_verbosity(matches: &ArgMatches) {
    use self::simplelog::{LevelFilter, SimpleLogger, TermLogger};
    let level_filter = match matches.value_of("verbosity") {
        Some(s) => match s {
            "0" | "none" => LevelFilter::Off,
            "1" | "err" | "error" | "min" => LevelFilter::Error,
            "2" | "warn" | "warning" | "default" => LevelFilter::Warn,
            "3" | "info" => LevelFilter::Info,
            "4" | "debug" => LevelFilter::Debug,
            "5" | "trace" | "max" | "all" => LevelFilter::Trace,
            _ => LevelFilter::Warn,
        },
        _ => LevelFilter::Warn,
    };
    let mut config_builder = simplelog::ConfigBuilder::new();
    let logger_conf = config_builder
        .set_time_level(LevelFilter::Error)
        .set_target_level(LevelFilter::Debug)
        .set_location_level(LevelFilter::Error)
        .set_time_format_str("%H:%M:%S%.6f")
        .build();
    // no terminal when output is piped
    if TermLogger::init(level_filter, logger_conf.clone(), simplelog::TerminalMode::Mixed).is_err()
    {
        let _ = SimpleLogger::init(level_filter, logger_conf);
    }
}

#[test]
fn create_flags_are_parsed() {
    let m = app()
        .get_matches_from_safe(vec!["sweep", "create", "a.ini", "sweeps", "-c", "--render"])
        .unwrap();
    let (name, sub) = m.subcommand();
    let sub = sub.unwrap();
    assert_eq!(name, "create");
    assert_eq!(sub.values_of("paths").unwrap().collect::<Vec<_>>(), vec!["a.ini", "sweeps"]);
    assert!(sub.is_present("cluster"));
    assert!(sub.is_present("render"));
    assert!(!sub.is_present("exec"));
}

#[test]
fn log_requires_paths() {
    assert!(app().get_matches_from_safe(vec!["sweep", "log"]).is_err());
}
