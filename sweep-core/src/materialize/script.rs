//! Generated shell scripts.

use std::path::{Path, PathBuf};

use super::render;
use crate::settings::Settings;
use crate::util::quote;
use crate::validate::{ClusterAllocation, Job, Sweep};
use crate::{
    CLUSTER_JOB_SCRIPT, HOSTFILE_FILE, INPUT_SCRIPT_FILE, LOCAL_JOB_SCRIPT, SIMULATION_LOG_FILE,
};

const SHEBANG: &str = "#!/bin/bash\n\n";

fn path_str(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

/// Hostfile listing one host per line.
pub(crate) fn hostfile(allocation: &ClusterAllocation) -> String {
    let mut out = String::new();
    for host in &allocation.hosts {
        out.push_str(&host.host);
        out.push('\n');
    }
    out
}

/// Script running a single job on the local machine.
pub(crate) fn local_job(job: &Job, job_dir: &Path, render: bool, settings: &Settings) -> String {
    let mut out = String::from(SHEBANG);
    out.push_str(&format!("cd {}\n", path_str(job_dir)));
    out.push_str(&format!(
        "{} -np {} {} -in {} > {} 2>&1\n",
        settings.mpirun, job.processes, settings.simulation_binary, INPUT_SCRIPT_FILE,
        SIMULATION_LOG_FILE
    ));
    if render {
        out.push_str(&render::chain(job_dir, settings));
    }
    out
}

/// Batch queue submission script for a single job.
pub(crate) fn cluster_job(job: &Job, job_dir: &Path, render: bool, settings: &Settings) -> String {
    let dir = path_str(job_dir);
    let hostfile = path_str(&job_dir.join(HOSTFILE_FILE));
    let script = path_str(&job_dir.join(INPUT_SCRIPT_FILE));

    let mut out = String::from(SHEBANG);
    out.push_str(&format!("#$ -wd {}\n", dir));
    out.push_str(&format!("#$ -N {}\n", job.name));
    out.push_str(&format!("#$ -o {}\n", path_str(&job_dir.join("stdout"))));
    out.push_str(&format!("#$ -e {}\n", path_str(&job_dir.join("stderr"))));
    out.push_str(&format!(
        "#$ -pe {} {}\n",
        settings.parallel_environment, job.processes
    ));
    out.push_str(&format!("#$ -v SWEEP_HOSTFILE={}\n", hostfile));
    write_mail_directives(&mut out, settings);
    out.push('\n');

    out.push_str(&format!("cd {}\n", dir));
    out.push_str(&format!(
        "{mpirun} -x LD_LIBRARY_PATH=$LD_LIBRARY_PATH:{lib} -x HCOLL_ENABLE_MCAST_ALL=0 \\\n",
        mpirun = settings.cluster_mpirun,
        lib = settings.library_path,
    ));
    out.push_str(&format!("    -np {} --hostfile {} \\\n", job.processes, hostfile));
    out.push_str("    --mca opal_event_include poll --mca orte_base_help_aggregate 0 \\\n");
    out.push_str("    --mca btl_openib_warn_default_gid_prefix 0 \\\n");
    out.push_str(&format!(
        "    bash -c \"ulimit -s {} && {} -in {}\" > {} 2>&1\n",
        settings.stack_size_kb,
        settings.simulation_binary,
        script,
        SIMULATION_LOG_FILE
    ));
    if render {
        out.push_str(&render::chain(job_dir, settings));
    }
    out
}

fn write_mail_directives(out: &mut String, settings: &Settings) {
    if let Some(mail) = &settings.mail {
        out.push_str(&format!("#$ -M {}\n", mail));
        out.push_str("#$ -m ae\n");
    }
}

/// Lookup arrays with the directory and process count of every job.
fn lookup_tables(sweep: &Sweep, job_dirs: &[PathBuf]) -> String {
    let mut out = String::from("dirs=(\n");
    for dir in job_dirs {
        out.push_str(&format!("    {}\n", path_str(dir)));
    }
    out.push_str(")\n");
    let nps: Vec<String> = sweep
        .process_counts()
        .iter()
        .map(|np| np.to_string())
        .collect();
    out.push_str(&format!("nps=({})\n", nps.join(" ")));
    out
}

/// Script starting every job of the sweep in the background.
///
/// The script does not wait for the jobs, their progress is visible in the
/// per-job logs.
pub(crate) fn local_aggregate(sweep: &Sweep, job_dirs: &[PathBuf], settings: &Settings) -> String {
    let mut out = String::from(SHEBANG);
    out.push_str(&lookup_tables(sweep, job_dirs));
    out.push('\n');
    out.push_str("run_job() {\n");
    out.push_str("    echo \"starting ${dirs[$1]} (np=${nps[$1]})\"\n");
    out.push_str(&format!(
        "    cd \"${{dirs[$1]}}\" && {} {}\n",
        settings.shell, LOCAL_JOB_SCRIPT
    ));
    out.push_str("}\n\n");
    out.push_str("for i in \"${!dirs[@]}\"; do\n");
    out.push_str("    run_job \"$i\" &\n");
    out.push_str("done\n");
    out
}

/// Array job submission script, one task per job.
pub(crate) fn cluster_aggregate(
    sweep: &Sweep,
    jobs_dir: &Path,
    job_dirs: &[PathBuf],
    settings: &Settings,
) -> String {
    let name = jobs_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "sweep".to_string());
    let max_np = sweep.process_counts().into_iter().max().unwrap_or(1);

    let mut out = String::from(SHEBANG);
    out.push_str(&format!("#$ -wd {}\n", path_str(jobs_dir)));
    out.push_str(&format!("#$ -N {}\n", name));
    out.push_str(&format!("#$ -o {}\n", path_str(jobs_dir)));
    out.push_str(&format!("#$ -e {}\n", path_str(jobs_dir)));
    out.push_str(&format!("#$ -t 1-{}\n", sweep.jobs.len()));
    out.push_str(&format!("#$ -pe {} {}\n", settings.parallel_environment, max_np));
    write_mail_directives(&mut out, settings);
    out.push('\n');
    out.push_str(&lookup_tables(sweep, job_dirs));
    out.push('\n');
    out.push_str("idx=$((SGE_TASK_ID - 1))\n");
    out.push_str("export SWEEP_NP=${nps[$idx]}\n");
    out.push_str(&format!(
        "cd \"${{dirs[$idx]}}\" && {} {}\n",
        settings.shell, CLUSTER_JOB_SCRIPT
    ));
    out
}

#[cfg(test)]
fn job(name: &str, processes: u32) -> Job {
    Job {
        name: name.to_string(),
        processes,
    }
}

#[test]
fn cluster_job_carries_directives_and_launcher_flags() {
    let settings = Settings {
        mail: Some("someone@example.org".to_string()),
        ..Settings::default()
    };
    let script = cluster_job(&job("amp_10", 4), Path::new("/work/amp/amp_10"), false, &settings);
    assert!(script.starts_with("#!/bin/bash\n\n#$ -wd /work/amp/amp_10\n"));
    assert!(script.contains("#$ -N amp_10\n"));
    assert!(script.contains("#$ -o /work/amp/amp_10/stdout\n"));
    assert!(script.contains("#$ -pe orte 4\n"));
    assert!(script.contains("#$ -v SWEEP_HOSTFILE=/work/amp/amp_10/hostfile\n"));
    assert!(script.contains("#$ -M someone@example.org\n#$ -m ae\n"));
    assert!(script.contains("-np 4 --hostfile /work/amp/amp_10/hostfile"));
    assert!(script.contains("-x HCOLL_ENABLE_MCAST_ALL=0"));
    assert!(script.contains("bash -c \"ulimit -s 10240 && $HOME/local/bin/lmp_auto -in /work/amp/amp_10/in.script\""));
    assert!(!script.contains("render.py"));
}

#[test]
fn local_aggregate_backgrounds_every_job() {
    let sweep = Sweep {
        path: PathBuf::from("/work/amp.ini"),
        jobs: vec![job("a", 1), job("b", 6)],
        groups: vec![],
        cluster: None,
    };
    let dirs = vec![PathBuf::from("/work/amp/a"), PathBuf::from("/work/my amp/b")];
    let script = local_aggregate(&sweep, &dirs, &Settings::default());
    assert!(script.contains("dirs=(\n    /work/amp/a\n    '/work/my amp/b'\n)\nnps=(1 6)\n"));
    assert!(script.contains("    run_job \"$i\" &\n"));
    assert!(script.contains("&& bash sim.sh"));
    assert!(!script.contains("wait"));
}

#[test]
fn cluster_aggregate_is_array_job() {
    let sweep = Sweep {
        path: PathBuf::from("/work/amp.ini"),
        jobs: vec![job("a", 2), job("b", 4), job("c", 1)],
        groups: vec![],
        cluster: None,
    };
    let dirs: Vec<PathBuf> = ["a", "b", "c"]
        .iter()
        .map(|n| PathBuf::from("/work/amp").join(n))
        .collect();
    let script = cluster_aggregate(&sweep, Path::new("/work/amp"), &dirs, &Settings::default());
    assert!(script.contains("#$ -N amp\n"));
    assert!(script.contains("#$ -t 1-3\n"));
    assert!(script.contains("#$ -pe orte 4\n"));
    assert!(script.contains("nps=(2 4 1)\n"));
    assert!(script.contains("idx=$((SGE_TASK_ID - 1))\n"));
    assert!(script.contains("&& bash qsub_sim.sh\n"));
}
