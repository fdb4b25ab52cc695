// Resource loading for documents read from disk: relative paths, file and
// data URLs, and http(s) URLs.

use crate::walker::ResourceLoader;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use curl::easy::Easy;
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::{Position, Url};

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Loads resources referenced from an HTML file, resolving relative
/// references against the file's directory.
#[derive(Debug, Clone)]
pub struct FileLoader {
    base: Option<Url>,
    remote: bool,
}

impl FileLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let dir = base_dir.into();
        let dir = if dir.is_absolute() {
            dir
        } else {
            match std::env::current_dir() {
                Ok(cwd) => cwd.join(dir),
                Err(err) => {
                    debug!(error = %err, "no current directory, relative references unavailable");
                    dir
                }
            }
        };
        // components() drops interior `.` segments
        let dir: PathBuf = dir.components().collect();
        Self {
            base: Url::from_directory_path(&dir).ok(),
            remote: true,
        }
    }

    /// Loader for resources of the document at `html_file`.
    pub fn for_document(html_file: &Path) -> Self {
        let base = html_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base)
    }

    /// Never go to the network; remote references are unavailable.
    pub fn offline(mut self) -> Self {
        self.remote = false;
        self
    }

    /// Absolute URL for `reference`. Protocol-relative references are https.
    fn resolve(&self, reference: &str) -> Option<Url> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        let parsed = if reference.starts_with("//") {
            Url::parse(&format!("https:{reference}"))
        } else {
            match &self.base {
                Some(base) => base.join(reference),
                None => Url::parse(reference),
            }
        };
        match parsed {
            // `C:\img.png` parses with scheme "c"
            Ok(url) if url.scheme().len() == 1 => Url::from_file_path(reference).ok(),
            Ok(url) => Some(url),
            Err(err) => {
                debug!(reference, error = %err, "unresolvable reference");
                None
            }
        }
    }

    fn load(&self, reference: &str) -> Option<Vec<u8>> {
        let url = self.resolve(reference)?;
        match url.scheme() {
            "data" => decode_data_url(&url),
            "http" | "https" if self.remote => fetch(&url),
            "http" | "https" => {
                debug!(url = %url, "offline, remote resource not fetched");
                None
            }
            "file" => {
                let Ok(path) = url.to_file_path() else {
                    debug!(url = %url, "file URL names no local path");
                    return None;
                };
                match std::fs::read(&path) {
                    Ok(bytes) => Some(bytes),
                    Err(err) => {
                        debug!(path = %path.display(), error = %err, "read failed");
                        None
                    }
                }
            }
            scheme => {
                debug!(scheme, "unsupported scheme");
                None
            }
        }
    }
}

impl ResourceLoader for FileLoader {
    fn load_image(&self, src: &str) -> Option<Vec<u8>> {
        self.load(src)
    }

    fn load_stylesheet(&self, href: &str) -> Option<String> {
        let bytes = self.load(href)?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Payload of a `data:` URL. The fragment is not part of the data.
fn decode_data_url(url: &Url) -> Option<Vec<u8>> {
    let (meta, payload) = url[Position::BeforePath..Position::AfterQuery].split_once(',')?;
    let bytes: Vec<u8> = percent_decode_str(payload).collect();
    if !meta.split(';').any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Some(bytes);
    }
    let compact: Vec<u8> = bytes.into_iter().filter(|b| !b.is_ascii_whitespace()).collect();
    match BASE64.decode(compact) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            debug!(error = %err, "bad base64 in data URL");
            None
        }
    }
}

fn fetch(url: &Url) -> Option<Vec<u8>> {
    match try_fetch(url.as_str()) {
        Ok((status, bytes)) if (200..300).contains(&status) => Some(bytes),
        Ok((status, _)) => {
            debug!(url = %url, status, "non-success status");
            None
        }
        Err(err) => {
            debug!(url = %url, error = %err, "fetch failed");
            None
        }
    }
}

fn try_fetch(url: &str) -> Result<(u32, Vec<u8>), curl::Error> {
    let mut easy = Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.timeout(FETCH_TIMEOUT)?;
    easy.useragent(concat!("html4docx/", env!("CARGO_PKG_VERSION")))?;

    let mut body = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }

    Ok((easy.response_code()?, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("html4docx-{name}-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("img")).unwrap();
        dir
    }

    #[test]
    fn data_urls() {
        let loader = FileLoader::new(".");
        assert_eq!(loader.load_image("data:image/png;base64,aGVs bG8="), Some(b"hello".to_vec()));
        assert_eq!(loader.load_stylesheet("data:text/css,p%20%7B%20color:red%20%7D").as_deref(), Some("p { color:red }"));
        assert_eq!(loader.load_image("data:image/png;base64,***"), None);
        assert_eq!(loader.load_image("data:no-comma"), None);
    }

    #[test]
    fn binary_data_url_payload_survives() {
        let loader = FileLoader::new(".");
        assert_eq!(loader.load_image("data:image/png,%89PNG"), Some(vec![0x89, b'P', b'N', b'G']));
        assert_eq!(loader.load_image("data:,a%2Cb#frag"), Some(b"a,b".to_vec()));
    }

    #[test]
    fn relative_paths_resolve_against_the_document() {
        let dir = scratch_dir("rel");
        std::fs::write(dir.join("img/a b.png"), b"bytes").unwrap();
        std::fs::write(dir.join("site.css"), "p { color: red }").unwrap();
        let loader = FileLoader::for_document(&dir.join("page.html"));
        assert_eq!(loader.load_image("img/a%20b.png?v=2"), Some(b"bytes".to_vec()));
        assert_eq!(loader.load_image("./img/a b.png#top"), Some(b"bytes".to_vec()));
        assert_eq!(loader.load_stylesheet("site.css").as_deref(), Some("p { color: red }"));
        assert_eq!(loader.load_image("missing.png"), None);

        let absolute = Url::from_file_path(dir.join("img/a b.png")).unwrap();
        assert_eq!(FileLoader::new(".").load_image(absolute.as_str()), Some(b"bytes".to_vec()));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn file_urls_with_localhost() {
        let loader = FileLoader::new("/srv/site");
        let url = loader.resolve("file://localhost/tmp/a.png").unwrap();
        assert_eq!(url.to_file_path().unwrap(), PathBuf::from("/tmp/a.png"));
        let url = loader.resolve("/tmp/b%20c.png").unwrap();
        assert_eq!(url.to_file_path().unwrap(), PathBuf::from("/tmp/b c.png"));
    }

    #[test]
    fn protocol_relative_references_are_remote() {
        let loader = FileLoader::new(".").offline();
        let url = loader.resolve("//cdn.test/a.png").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("cdn.test"));
        assert_eq!(loader.load_image("//cdn.test/a.png"), None);
    }

    #[test]
    fn unsupported_and_offline_references() {
        let loader = FileLoader::new(".").offline();
        assert_eq!(loader.load_image("ftp://example.test/a.png"), None);
        assert_eq!(loader.load_image("https://example.test/a.png"), None);
        assert_eq!(loader.load_image("   "), None);
    }

    #[test]
    fn document_in_current_directory() {
        let loader = FileLoader::for_document(Path::new("page.html"));
        let cwd = Url::from_directory_path(std::env::current_dir().unwrap()).unwrap();
        assert_eq!(loader.base, Some(cwd));
    }
}
