//! Contains a collection of useful utility functions.

use std::ffi::OsStr;
use std::fs::{read_dir, File};
use std::io::Read;
use std::path::{Path, PathBuf};

pub(crate) fn read_text_file(file_path: &Path) -> std::io::Result<String> {
    debug!("reading {:?}", file_path);
    let mut fd = File::open(file_path)?;
    let mut content = String::new();
    fd.read_to_string(&mut content)?;
    Ok(content)
}

/// Get paths to files with the given extension in the provided directory,
/// sorted by path.
pub fn find_files_with_extension(dir: &Path, extension: &str, recursive: bool) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    if dir.is_dir() {
        let dir_entry = match read_dir(dir) {
            Ok(d) => d,
            _ => {
                error!("couldn't read directory at path: {}", dir.to_string_lossy());
                return Vec::new();
            }
        };
        for entry in dir_entry {
            let path = match entry {
                Ok(p) => p.path(),
                _ => continue,
            };
            if path.is_dir() && recursive {
                paths.extend(find_files_with_extension(&path, extension, recursive));
            } else if path.is_file() {
                let ext = path
                    .extension()
                    .unwrap_or_else(|| OsStr::new(""))
                    .to_str()
                    .unwrap_or("");
                if ext == extension {
                    paths.push(path);
                }
            }
        }
    };
    paths.sort();
    paths
}

/// Shell-quotes a string with single quotes.
pub(crate) fn quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[test]
fn quote_leaves_plain_paths_alone() {
    assert_eq!(quote("/home/user/run_1"), "/home/user/run_1");
    assert_eq!(quote("/home/my dir"), "'/home/my dir'");
    assert_eq!(quote("it's"), r"'it'\''s'");
}
