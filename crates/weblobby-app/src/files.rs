//! Filesystem helpers exposed to the UI layer
//!
//! Small, synchronous file operations the lobby front end needs around the
//! game install: directory listings, log tails, start scripts, and the
//! engine's `uikeys.txt` / `springsettings.cfg` files. Every failure is an
//! [`Error::Filesystem`] naming the path.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use weblobby_core::prelude::*;

/// Separator used when a listing is handed to the UI as one string
pub const LISTING_SEPARATOR: &str = "||";

/// The only file name [`delete_spring_settings`] will remove
pub const SPRING_SETTINGS_FILE: &str = "springsettings.cfg";

/// Names of the subdirectories of `path`, sorted
pub fn list_dirs(path: &Path) -> Result<Vec<String>> {
    list_entries(path, true)
}

/// Names of the non-directory entries of `path`, sorted
pub fn list_files(path: &Path) -> Result<Vec<String>> {
    list_entries(path, false)
}

fn list_entries(path: &Path, want_dirs: bool) -> Result<Vec<String>> {
    if !path.is_dir() {
        return Err(Error::filesystem(path, "not a directory"));
    }

    let entries = fs::read_dir(path).map_err(|e| Error::filesystem(path, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::filesystem(path, e))?;
        // Follows symlinks, so a link to a directory lists as a directory
        if entry.path().is_dir() == want_dirs {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Join a listing the way the UI expects it: `a||b||c`
pub fn join_listing(names: &[String]) -> String {
    names.join(LISTING_SEPARATOR)
}

/// The last `lines` lines of a text file, each terminated by `\n`
pub fn read_tail(path: &Path, lines: usize) -> Result<String> {
    let file = fs::File::open(path).map_err(|e| Error::filesystem(path, e))?;

    let mut tail = VecDeque::with_capacity(lines.min(1024));
    for line in BufReader::new(file).split(b'\n') {
        let line = line.map_err(|e| Error::filesystem(path, e))?;
        if lines == 0 {
            continue;
        }
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    let mut out = String::new();
    for line in tail {
        let text = String::from_utf8_lossy(&line);
        out.push_str(text.strip_suffix('\r').unwrap_or(&*text));
        out.push('\n');
    }
    Ok(out)
}

/// Write `script` to `path`, replacing any previous content
pub fn create_script(path: &Path, script: &str) -> Result<()> {
    fs::write(path, script)
        .map_err(|e| Error::filesystem(path, format!("could not create script: {e}")))
}

/// Append `line` plus a newline to `path`, creating the file if needed
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::filesystem(path, e))?;
    writeln!(file, "{line}").map_err(|e| Error::filesystem(path, e))
}

/// Create an empty key bindings file unless one exists. Returns whether the
/// file was created.
pub fn create_ui_keys(path: &Path) -> Result<bool> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => {
            info!("Creating empty uikeys: {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(Error::filesystem(path, e)),
    }
}

/// Remove the engine settings file at `path`. Refuses any other file name.
pub fn delete_spring_settings(path: &Path) -> Result<()> {
    let is_settings_file = path
        .file_name()
        .is_some_and(|name| name == SPRING_SETTINGS_FILE);
    if !is_settings_file {
        return Err(Error::filesystem(path, "not a spring settings file"));
    }

    fs::remove_file(path).map_err(|e| Error::filesystem(path, e))?;
    info!("Deleted spring settings: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_listings_split_dirs_and_files() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("maps")).unwrap();
        fs::create_dir(temp.path().join("games")).unwrap();
        fs::write(temp.path().join("springsettings.cfg"), "").unwrap();
        fs::write(temp.path().join("infolog.txt"), "").unwrap();

        let dirs = list_dirs(temp.path()).unwrap();
        let files = list_files(temp.path()).unwrap();

        assert_eq!(join_listing(&dirs), "games||maps");
        assert_eq!(join_listing(&files), "infolog.txt||springsettings.cfg");
    }

    #[test]
    fn test_listing_empty_dir_is_empty_string() {
        let temp = tempdir().unwrap();
        assert_eq!(join_listing(&list_files(temp.path()).unwrap()), "");
    }

    #[test]
    fn test_listing_non_directory_is_error() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("infolog.txt");
        fs::write(&file, "x").unwrap();

        assert!(matches!(list_dirs(&file), Err(Error::Filesystem { .. })));
        assert!(matches!(
            list_files(&temp.path().join("missing")),
            Err(Error::Filesystem { .. })
        ));
    }

    #[test]
    fn test_read_tail_keeps_last_lines() {
        let temp = tempdir().unwrap();
        let log = temp.path().join("infolog.txt");
        fs::write(&log, "one\ntwo\r\nthree\nfour\n").unwrap();

        assert_eq!(read_tail(&log, 2).unwrap(), "three\nfour\n");
        assert_eq!(read_tail(&log, 10).unwrap(), "one\ntwo\nthree\nfour\n");
        assert_eq!(read_tail(&log, 0).unwrap(), "");
    }

    #[test]
    fn test_read_tail_missing_file_is_error() {
        let temp = tempdir().unwrap();
        assert!(read_tail(&temp.path().join("nope.txt"), 5).is_err());
    }

    #[test]
    fn test_create_script_replaces_content() {
        let temp = tempdir().unwrap();
        let script = temp.path().join("script.txt");
        fs::write(&script, "old").unwrap();

        create_script(&script, "[GAME]\n{\n}\n").unwrap();

        assert_eq!(fs::read_to_string(&script).unwrap(), "[GAME]\n{\n}\n");
    }

    #[test]
    fn test_append_line_creates_then_appends() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("chat.log");

        append_line(&path, "first").unwrap();
        append_line(&path, "second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_create_ui_keys_only_when_absent() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("uikeys.txt");

        assert!(create_ui_keys(&path).unwrap());
        fs::write(&path, "bind Ctrl+q quit").unwrap();
        assert!(!create_ui_keys(&path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "bind Ctrl+q quit");
    }

    #[test]
    fn test_delete_spring_settings_refuses_other_files() {
        let temp = tempdir().unwrap();
        let other = temp.path().join("config.cfg");
        fs::write(&other, "x").unwrap();

        assert!(matches!(
            delete_spring_settings(&other),
            Err(Error::Filesystem { .. })
        ));
        assert!(other.exists());
    }

    #[test]
    fn test_delete_spring_settings_removes_file() {
        let temp = tempdir().unwrap();
        let settings = temp.path().join(SPRING_SETTINGS_FILE);
        fs::write(&settings, "XResolution=1920").unwrap();

        delete_spring_settings(&settings).unwrap();

        assert!(!settings.exists());
        assert!(delete_spring_settings(&settings).is_err());
    }
}
