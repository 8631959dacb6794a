use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn sweep() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sweep"))
}

#[test]
fn create_writes_jobs_for_every_config_in_directory() {
    let tmp = TempDir::new().expect("temp dir");
    fs::write(
        tmp.path().join("amp.ini"),
        "%set_job\namp_10\namp_20\n%param units si\n%param processors 2 1 1\n\
         %set_param\nvariable amp equal 10\nvariable amp equal 20\n",
    )
    .unwrap();
    fs::write(
        tmp.path().join("freq.ini"),
        "%set_job\nfreq_5\n%param units si\n",
    )
    .unwrap();

    let output = sweep()
        .current_dir(tmp.path())
        .arg("create")
        .arg(tmp.path())
        .arg("-v")
        .arg("none")
        .output()
        .expect("run sweep");
    assert!(output.status.success(), "create should succeed");

    let input = fs::read_to_string(tmp.path().join("amp/amp_20/in.script")).unwrap();
    assert_eq!(input, "units si\nprocessors 2 1 1\nvariable amp equal 20\n");
    let sim = fs::read_to_string(tmp.path().join("amp/amp_20/sim.sh")).unwrap();
    assert!(sim.contains("-np 2 "));
    assert!(tmp.path().join("amp/sim_all.sh").is_file());
    assert!(tmp.path().join("freq/freq_5/sim.sh").is_file());
}

#[test]
fn failing_config_is_reported_but_others_are_created() {
    let tmp = TempDir::new().expect("temp dir");
    let bad = tmp.path().join("bad.ini");
    let good = tmp.path().join("good.ini");
    fs::write(&bad, "%set_job\na\nb\n%set_param\nx 1\nx 2\nx 3\n").unwrap();
    fs::write(&good, "%set_job\na\n%param units si\n").unwrap();

    let output = sweep()
        .current_dir(tmp.path())
        .arg("create")
        .arg(&bad)
        .arg(&good)
        .output()
        .expect("run sweep");
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 of 2 config files failed"));
    assert!(!tmp.path().join("bad").exists());
    assert!(tmp.path().join("good/a/in.script").is_file());
}

#[test]
fn cluster_mode_requires_allocations() {
    let tmp = TempDir::new().expect("temp dir");
    let config = tmp.path().join("amp.ini");
    fs::write(
        &config,
        "%set_job\na\nb\n%param processors 2 1 1\n%set_cluster\nh1 slots=2\nh2 slots=1\n",
    )
    .unwrap();

    let output = sweep()
        .current_dir(tmp.path())
        .args(&["create", "--cluster"])
        .arg(&config)
        .output()
        .expect("run sweep");
    assert!(!output.status.success());
    assert!(!tmp.path().join("amp").exists());

    fs::write(
        &config,
        "%set_job\na\nb\n%param processors 2 1 1\n%set_cluster\nh1 slots=2\nh2 slots=1 + h3 slots=1\n",
    )
    .unwrap();
    let status = sweep()
        .current_dir(tmp.path())
        .args(&["create", "--cluster"])
        .arg(&config)
        .status()
        .expect("run sweep");
    assert!(status.success());
    assert_eq!(
        fs::read_to_string(tmp.path().join("amp/b/hostfile")).unwrap(),
        "h2\nh3\n"
    );
    assert!(tmp.path().join("amp/qsub_sim_all.sh").is_file());
}

#[test]
fn log_shows_tail_of_existing_logs() {
    let tmp = TempDir::new().expect("temp dir");
    let config = tmp.path().join("amp.ini");
    fs::write(&config, "%set_job\na\nb\n%param units si\n").unwrap();
    fs::create_dir_all(tmp.path().join("amp/a")).unwrap();
    fs::write(tmp.path().join("amp/a/log.liggghts"), "step 1\nstep 2\nstep 3\n").unwrap();

    let output = sweep()
        .current_dir(tmp.path())
        .args(&["log", "-n", "2"])
        .arg(&config)
        .output()
        .expect("run sweep");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("step 2\nstep 3\n"));
    assert!(!stdout.contains("step 1"));
    assert!(stdout.contains("b/log.liggghts does not exist"));
}
