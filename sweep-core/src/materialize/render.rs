//! Rendering stage chained after a simulation.
//!
//! The simulation dumps visualization files into the job's post directory.
//! After it finishes, the render script is run by an offscreen batch
//! visualization program producing one frame per dump, the frames are
//! encoded into a video and then deleted.

use std::path::Path;

use crate::settings::Settings;
use crate::util::quote;
use crate::{POST_DIR_NAME, POST_LOG_FILE, RENDER_DIR_NAME};

pub const RENDER_SCRIPT: &str = "render.py";
pub const ENCODE_SCRIPT: &str = "encode.sh";
const FRAMES_DIR_NAME: &str = "frames";
const FRAME_PATTERN: &str = "frame_%05d.png";

/// Lines appended to a job script running the rendering stage.
pub(crate) fn chain(job_dir: &Path, settings: &Settings) -> String {
    let render_dir = job_dir.join(RENDER_DIR_NAME);
    let log = quote(&job_dir.join(POST_LOG_FILE).to_string_lossy());
    let mut out = String::from("\n# render frames and encode them into a video\n");
    out.push_str(&format!("cd {}\n", quote(&render_dir.to_string_lossy())));
    out.push_str(&format!(
        "{} {} > {} 2>&1\n",
        settings.render_binary, RENDER_SCRIPT, log
    ));
    out.push_str(&format!(
        "{} {} >> {} 2>&1\n",
        settings.shell, ENCODE_SCRIPT, log
    ));
    out.push_str(&format!(
        "rm -rf {}\n",
        quote(&render_dir.join(FRAMES_DIR_NAME).to_string_lossy())
    ));
    out
}

/// Visualization script saving one frame per dump. Dumps are ordered by the
/// number at the end of their file name.
pub(crate) fn render_script(job_name: &str, job_dir: &Path, settings: &Settings) -> String {
    format!(
        r##"# offscreen rendering of the dumps written by job {job}
import glob
import os
import re

from paraview.simple import *

POST_DIR = {post}
FRAME_DIR = {frames}
EXTENSION = {ext}


def frame_index(path):
    stem = os.path.splitext(os.path.basename(path))[0]
    match = re.search(r"(\d+)$", stem)
    return int(match.group(1)) if match else -1


dumps = sorted(glob.glob(os.path.join(POST_DIR, "*." + EXTENSION)), key=frame_index)
if not dumps:
    raise SystemExit("no dumps found in " + POST_DIR)
os.makedirs(FRAME_DIR, exist_ok=True)

view = CreateRenderView()
view.ViewSize = [1280, 720]
view.OrientationAxesVisibility = 0
for n, dump in enumerate(dumps):
    reader = OpenDataFile(dump)
    Show(reader, view)
    view.ResetCamera()
    SaveScreenshot(os.path.join(FRAME_DIR, "{pattern}" % n), view)
    Hide(reader, view)
    Delete(reader)
"##,
        job = job_name,
        post = py_str(&job_dir.join(POST_DIR_NAME).to_string_lossy()),
        frames = py_str(&job_dir.join(RENDER_DIR_NAME).join(FRAMES_DIR_NAME).to_string_lossy()),
        ext = py_str(&settings.post_extension),
        pattern = FRAME_PATTERN,
    )
}

/// Python string literal for `s`.
fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Script encoding rendered frames into `<job>.mp4`.
pub(crate) fn encode_script(job_name: &str, job_dir: &Path, settings: &Settings) -> String {
    format!(
        "#!/bin/bash\n\ncd {dir}\n{encoder} -y -framerate {fps} -i {frames}/{pattern} \
         -c:v libx264 -pix_fmt yuv420p {job}.mp4\n",
        dir = quote(&job_dir.join(RENDER_DIR_NAME).to_string_lossy()),
        encoder = settings.encoder_binary,
        fps = settings.frame_rate,
        frames = FRAMES_DIR_NAME,
        pattern = FRAME_PATTERN,
        job = job_name,
    )
}

#[test]
fn chain_runs_render_then_encode_then_cleans_frames() {
    let chain = chain(Path::new("/work/amp/a"), &Settings::default());
    let render = chain.find("pvbatch render.py > /work/amp/a/log.post").unwrap();
    let encode = chain.find("bash encode.sh >> /work/amp/a/log.post").unwrap();
    let cleanup = chain.find("rm -rf /work/amp/a/animate/frames").unwrap();
    assert!(render < encode && encode < cleanup);
}

#[test]
fn render_script_sorts_dumps_numerically() {
    let script = render_script("a", Path::new("/work/amp/a"), &Settings::default());
    let lines: Vec<&str> = script.lines().collect();
    assert!(lines.contains(&"POST_DIR = \"/work/amp/a/post\""));
    assert!(lines.contains(&"EXTENSION = \"vtk\""));
    let key = lines.iter().position(|l| *l == "def frame_index(path):").unwrap();
    assert_eq!(
        &lines[key + 1..key + 4],
        &[
            "    stem = os.path.splitext(os.path.basename(path))[0]",
            "    match = re.search(r\"(\\d+)$\", stem)",
            "    return int(match.group(1)) if match else -1",
        ]
    );
    assert!(lines.contains(
        &"dumps = sorted(glob.glob(os.path.join(POST_DIR, \"*.\" + EXTENSION)), key=frame_index)"
    ));
    assert!(script.contains("\"frame_%05d.png\" % n"));

    // same key in Rust: trailing digits of the file stem
    let frame_index = |name: &str| -> i64 {
        let stem = name.rsplitn(2, '.').last().unwrap_or(name);
        let digits: String = stem
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        digits.parse().unwrap_or(-1)
    };
    let mut dumps = vec!["dump10000.vtk", "dump2000.vtk", "dump0.vtk", "dump100.vtk"];
    dumps.sort_by_key(|d| frame_index(d));
    assert_eq!(dumps, vec!["dump0.vtk", "dump100.vtk", "dump2000.vtk", "dump10000.vtk"]);
}

#[test]
fn render_script_escapes_paths() {
    let script = render_script("a", Path::new("/work/my \"amp\"\\x/a"), &Settings::default());
    assert!(script.contains(r#"POST_DIR = "/work/my \"amp\"\\x/a/post""#));
    assert_eq!(py_str("plain"), "\"plain\"");
}

#[test]
fn encode_script_names_video_after_job() {
    let script = encode_script("amp_10", Path::new("/work/amp/amp_10"), &Settings::default());
    assert!(script.contains("ffmpeg -y -framerate 20 -i frames/frame_%05d.png"));
    assert!(script.ends_with("amp_10.mp4\n"));
}
