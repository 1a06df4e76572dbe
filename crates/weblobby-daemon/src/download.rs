//! Conditional HTTP downloads
//!
//! `fetch` sends `If-Modified-Since` with the target's modification time,
//! streams the body into a scratch file and only then moves it over the
//! target. The target never holds partial content.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tempfile::NamedTempFile;
use url::Url;

use weblobby_core::prelude::*;

/// `Dow, DD Mon YYYY HH:MM:SS GMT`
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Where bodies are staged and which targets become executable
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub scratch_dir: PathBuf,
    /// Targets whose path contains this marker get mode `0o774` (unix)
    pub executable_marker: String,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("weblobby_dl"),
            executable_marker: "pr-downloader".to_string(),
        }
    }
}

/// Result of a successful [`ConditionalDownloader::fetch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The target was replaced with `bytes` of new content
    Updated { bytes: u64 },
    /// The server reported no newer content; the target is untouched
    NotModified,
}

#[derive(Debug, Clone, Default)]
pub struct ConditionalDownloader {
    options: DownloadOptions,
}

impl ConditionalDownloader {
    pub fn new(options: DownloadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Download `url` into `target` unless the local copy is current.
    ///
    /// Blocks the calling thread for the whole transfer; must not be called
    /// from inside an async context.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] for a bad URL, a network failure, a truncated
    ///   body or a non-success status. `target` is untouched.
    /// - [`Error::Filesystem`] if staging or finalizing the file fails.
    pub fn fetch(&self, url: &str, target: impl AsRef<Path>) -> Result<FetchOutcome> {
        let target = target.as_ref();
        let parsed = Url::parse(url).map_err(|e| Error::transport(url, e))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(None::<std::time::Duration>)
            .build()
            .map_err(|e| Error::transport(url, e))?;
        let mut request = client.get(parsed);

        let cached = modified_time(target);
        if let Some(modified) = cached {
            let since = http_date(modified);
            debug!("{}: If-Modified-Since {}", url, since);
            request = request.header(reqwest::header::IF_MODIFIED_SINCE, since);
        }

        info!("Downloading {} to {}", url, target.display());
        let mut response = request.send().map_err(|e| Error::transport(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            debug!("{} not modified", url);
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(Error::transport(url, format!("server returned {status}")));
        }

        let mut staged = self.scratch_file()?;
        let bytes = response
            .copy_to(staged.as_file_mut())
            .map_err(|e| Error::transport(url, e))?;

        // Servers that ignore the conditional status but send nothing
        if bytes == 0 && cached.is_some() {
            debug!("{} returned an empty body, keeping cached file", url);
            return Ok(FetchOutcome::NotModified);
        }

        self.finalize(staged, target)?;
        info!("Downloaded {} ({} bytes)", target.display(), bytes);
        Ok(FetchOutcome::Updated { bytes })
    }

    fn scratch_file(&self) -> Result<NamedTempFile> {
        let dir = &self.options.scratch_dir;
        fs::create_dir_all(dir)
            .map_err(|e| Error::filesystem(dir, format!("creating scratch directory failed: {e}")))?;
        staging_file_in(dir)
            .map_err(|e| Error::filesystem(dir, format!("creating scratch file failed: {e}")))
    }

    /// Move the staged body over `target`: rename when possible, otherwise
    /// copy into a sibling temp file and rename that.
    fn finalize(&self, staged: NamedTempFile, target: &Path) -> Result<()> {
        let parent = parent_dir(target);
        fs::create_dir_all(parent)
            .map_err(|e| Error::filesystem(parent, format!("creating folders failed: {e}")))?;

        staged
            .as_file()
            .sync_all()
            .map_err(|e| Error::filesystem(staged.path(), e))?;

        if let Err(err) = staged.persist(target) {
            debug!(
                "rename to {} failed ({}), copying instead",
                target.display(),
                err.error
            );
            copy_into_place(err.file, parent, target)?;
        }

        self.apply_permissions(target)
    }

    /// Only tool downloads are touched; everything else keeps the mode it
    /// was created with.
    #[cfg(unix)]
    fn apply_permissions(&self, target: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if !self.is_executable_target(target) {
            return Ok(());
        }
        fs::set_permissions(target, fs::Permissions::from_mode(0o774))
            .map_err(|e| Error::filesystem(target, format!("setting permissions failed: {e}")))
    }

    #[cfg(not(unix))]
    fn apply_permissions(&self, _target: &Path) -> Result<()> {
        Ok(())
    }

    fn is_executable_target(&self, target: &Path) -> bool {
        let marker = &self.options.executable_marker;
        !marker.is_empty() && target.to_string_lossy().contains(marker.as_str())
    }
}

/// Cross-filesystem fallback. The staged file is deleted when `source` drops.
/// Temp file created like an ordinary file, so the umask decides its mode
#[cfg(unix)]
fn staging_file_in(dir: &Path) -> std::io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;

    tempfile::Builder::new()
        .permissions(fs::Permissions::from_mode(0o666))
        .tempfile_in(dir)
}

#[cfg(not(unix))]
fn staging_file_in(dir: &Path) -> std::io::Result<NamedTempFile> {
    NamedTempFile::new_in(dir)
}

fn copy_into_place(source: NamedTempFile, parent: &Path, target: &Path) -> Result<()> {
    let mut sibling = staging_file_in(parent)
        .map_err(|e| Error::filesystem(parent, format!("creating temp file failed: {e}")))?;
    let mut reader = source
        .reopen()
        .map_err(|e| Error::filesystem(source.path(), e))?;
    io::copy(&mut reader, sibling.as_file_mut())
        .map_err(|e| Error::filesystem(target, format!("copying download failed: {e}")))?;
    sibling
        .as_file()
        .sync_all()
        .map_err(|e| Error::filesystem(sibling.path(), e))?;
    sibling
        .persist(target)
        .map_err(|e| Error::filesystem(target, format!("replacing file failed: {}", e.error)))?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
}

/// Format a timestamp as an HTTP date in GMT.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{hours_ago, MockHttpReply, MockHttpServer};
    use std::time::Duration;

    fn downloader(scratch: &Path) -> ConditionalDownloader {
        ConditionalDownloader::new(DownloadOptions {
            scratch_dir: scratch.to_path_buf(),
            ..DownloadOptions::default()
        })
    }

    #[test]
    fn test_http_date_format() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_missing_target_downloads_full_body() {
        let temp = tempfile::tempdir().unwrap();
        let server = MockHttpServer::start(MockHttpReply::conditional(b"map data", hours_ago(24)));
        let target = temp.path().join("maps").join("y.sd7");

        let outcome = downloader(&temp.path().join("scratch"))
            .fetch(&server.url("/y.sd7"), &target)
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Updated { bytes: 8 });
        assert_eq!(fs::read(&target).unwrap(), b"map data");
        assert!(server
            .requests()
            .iter()
            .all(|r| !r.to_ascii_lowercase().contains("if-modified-since")));
    }

    #[test]
    fn test_target_newer_than_remote_is_kept() {
        let temp = tempfile::tempdir().unwrap();
        let server = MockHttpServer::start(MockHttpReply::conditional(b"new", hours_ago(24)));
        let target = temp.path().join("y.zip");
        fs::write(&target, b"old").unwrap();
        let before = fs::metadata(&target).unwrap().modified().unwrap();

        let outcome = downloader(temp.path())
            .fetch(&server.url("/y.zip"), &target)
            .unwrap();

        assert_eq!(outcome, FetchOutcome::NotModified);
        assert_eq!(fs::read(&target).unwrap(), b"old");
        assert_eq!(fs::metadata(&target).unwrap().modified().unwrap(), before);

        let requests = server.requests();
        let expected = format!("if-modified-since: {}", http_date(before)).to_ascii_lowercase();
        assert!(requests[0].to_ascii_lowercase().contains(&expected));
    }

    #[test]
    fn test_target_older_than_remote_is_replaced() {
        let temp = tempfile::tempdir().unwrap();
        let server = MockHttpServer::start(MockHttpReply::conditional(b"new", hours_ago(1)));
        let target = temp.path().join("y.zip");
        fs::write(&target, b"old").unwrap();
        fs::File::options()
            .write(true)
            .open(&target)
            .unwrap()
            .set_modified(hours_ago(48))
            .unwrap();

        let outcome = downloader(temp.path())
            .fetch(&server.url("/y.zip"), &target)
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Updated { bytes: 3 });
        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(server.requests()[0]
            .to_ascii_lowercase()
            .contains("if-modified-since"));
    }

    #[test]
    fn test_empty_body_with_cached_target_is_cache_hit() {
        let temp = tempfile::tempdir().unwrap();
        let server = MockHttpServer::start(MockHttpReply::Ok(Vec::new()));
        let target = temp.path().join("y.zip");
        fs::write(&target, b"cached").unwrap();

        let outcome = downloader(temp.path())
            .fetch(&server.url("/y.zip"), &target)
            .unwrap();

        assert_eq!(outcome, FetchOutcome::NotModified);
        assert_eq!(fs::read(&target).unwrap(), b"cached");
    }

    #[test]
    fn test_existing_target_replaced_when_server_sends_content() {
        let temp = tempfile::tempdir().unwrap();
        let server = MockHttpServer::start(MockHttpReply::Ok(b"fresh".to_vec()));
        let target = temp.path().join("y.zip");
        fs::write(&target, b"stale").unwrap();

        let outcome = downloader(temp.path())
            .fetch(&server.url("/y.zip"), &target)
            .unwrap();

        assert_eq!(outcome, FetchOutcome::Updated { bytes: 5 });
        assert_eq!(fs::read(&target).unwrap(), b"fresh");
    }

    #[test]
    fn test_error_status_leaves_target_untouched() {
        let temp = tempfile::tempdir().unwrap();
        let server = MockHttpServer::start(MockHttpReply::Status(404));
        let target = temp.path().join("y.zip");
        fs::write(&target, b"keep").unwrap();

        let err = downloader(temp.path())
            .fetch(&server.url("/y.zip"), &target)
            .unwrap_err();

        assert!(matches!(err, Error::Transport { .. }));
        assert_eq!(fs::read(&target).unwrap(), b"keep");
    }

    #[test]
    fn test_truncated_body_leaves_missing_target_absent() {
        let temp = tempfile::tempdir().unwrap();
        let scratch = temp.path().join("scratch");
        let server = MockHttpServer::start(MockHttpReply::Truncated {
            declared: 1024,
            sent: b"partial".to_vec(),
        });
        let target = temp.path().join("y.zip");

        let err = downloader(&scratch)
            .fetch(&server.url("/y.zip"), &target)
            .unwrap_err();

        assert!(matches!(err, Error::Transport { .. }));
        assert!(!target.exists());
        // Staged file cleaned up
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_unreachable_server_is_transport_error() {
        let temp = tempfile::tempdir().unwrap();
        let port = MockHttpServer::unused_port();
        let target = temp.path().join("y.zip");

        let err = downloader(temp.path())
            .fetch(&format!("http://127.0.0.1:{port}/y.zip"), &target)
            .unwrap_err();

        assert!(matches!(err, Error::Transport { .. }));
        assert!(!target.exists());
    }

    #[test]
    fn test_invalid_url_is_transport_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = downloader(temp.path())
            .fetch("not a url", temp.path().join("y.zip"))
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_marker_path_becomes_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let server = MockHttpServer::start(MockHttpReply::Ok(b"#!/bin/sh\n".to_vec()));
        let dl = downloader(temp.path());

        let tool = temp.path().join("pr-downloader");
        dl.fetch(&server.url("/pr-downloader"), &tool).unwrap();
        let mode = fs::metadata(&tool).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o774);

    }

    #[cfg(unix)]
    #[test]
    fn test_other_downloads_keep_default_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let server = MockHttpServer::start(MockHttpReply::Ok(b"archive".to_vec()));
        let dl = downloader(temp.path());

        // What a plain file create gets under the current umask
        let reference = temp.path().join("reference");
        fs::write(&reference, b"x").unwrap();
        let default_mode = fs::metadata(&reference).unwrap().permissions().mode() & 0o777;

        let archive = temp.path().join("y.zip");
        dl.fetch(&server.url("/y.zip"), &archive).unwrap();
        let mode = fs::metadata(&archive).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, default_mode);
        assert_eq!(mode & 0o111, 0);
    }

    #[test]
    fn test_parent_dir_of_bare_file_name() {
        assert_eq!(parent_dir(Path::new("y.zip")), Path::new("."));
        assert_eq!(parent_dir(Path::new("/tmp/y.zip")), Path::new("/tmp"));
    }
}
