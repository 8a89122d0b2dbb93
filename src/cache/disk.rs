//! Disk-backed cache storage
//!
//! Each named cache is a directory under the storage root. Each entry is a
//! pair of files named by the SHA-256 of the request URL: `<hash>.json`
//! holding the URL, status, headers and the time it was cached, and
//! `<hash>.body` holding the raw body. The metadata file is written last, so
//! an entry exists exactly when both files do.
//!
//! Operations on one named cache are serialised through a lock shared by
//! every handle `open` returns for that name: `put` and `delete` take it
//! exclusively, `match_request` and `keys` shared.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{CacheError, CacheStorage, CacheStore};
use crate::network::{Request, Response};

const META_EXT: &str = "json";
const BODY_EXT: &str = "body";

/// One lock per cache name, shared by all stores opened on it
type CacheLocks = Arc<Mutex<HashMap<String, Arc<RwLock<()>>>>>;

/// Metadata stored alongside each cached body
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    /// Request URL (the cache key)
    url: String,
    /// Response status
    status: u16,
    /// Response headers
    headers: Vec<(String, String)>,
    /// When the entry was written
    cached_at: DateTime<Utc>,
}

/// Cache storage persisted to the filesystem
///
/// Uses `~/.cache/swcache/` on Linux, or the equivalent XDG path on other
/// platforms, unless a custom root is given.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    /// Directory holding one subdirectory per named cache
    root: PathBuf,
    locks: CacheLocks,
}

impl DiskCacheStorage {
    /// Creates storage under the XDG-compliant cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "swcache")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates storage under a custom root directory
    pub fn with_dir(root: PathBuf) -> Self {
        Self {
            root,
            locks: CacheLocks::default(),
        }
    }

    /// Root directory of this storage
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(escape(name))
    }

    fn lock_for(&self, name: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(name.to_string()).or_default())
    }
}

/// A named cache stored in one directory
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    dir: PathBuf,
    lock: Arc<RwLock<()>>,
}

impl DiskCacheStore {
    fn meta_path(&self, request: &Request) -> PathBuf {
        self.dir
            .join(format!("{}.{}", entry_stem(request), META_EXT))
    }

    fn body_path(&self, request: &Request) -> PathBuf {
        self.dir
            .join(format!("{}.{}", entry_stem(request), BODY_EXT))
    }

    async fn read_meta(path: &Path) -> Result<Option<EntryMeta>, CacheError> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| CacheError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn match_request(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        let _guard = self.lock.read().await;

        let Some(meta) = Self::read_meta(&self.meta_path(request)).await? else {
            return Ok(None);
        };
        let body = match fs::read(self.body_path(request)).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(url = %request.key(), "entry has no body, treating as a miss");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(Response {
            status: meta.status,
            headers: meta.headers,
            body,
        }))
    }

    async fn put(&self, request: &Request, response: Response) -> Result<(), CacheError> {
        let _guard = self.lock.write().await;
        fs::create_dir_all(&self.dir).await?;

        let meta = EntryMeta {
            url: request.key().to_string(),
            status: response.status,
            headers: response.headers,
            cached_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;

        fs::write(self.body_path(request), &response.body).await?;
        fs::write(self.meta_path(request), json).await?;
        Ok(())
    }

    async fn delete(&self, request: &Request) -> Result<bool, CacheError> {
        let _guard = self.lock.write().await;

        let existed = match fs::remove_file(self.meta_path(request)).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        match fs::remove_file(self.body_path(request)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(existed)
    }

    async fn keys(&self) -> Result<Vec<Request>, CacheError> {
        let _guard = self.lock.read().await;

        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(META_EXT) {
                continue;
            }
            let meta = match Self::read_meta(&path).await {
                Ok(Some(meta)) => meta,
                Ok(None) => continue,
                Err(CacheError::Corrupt { path, source }) => {
                    warn!(path = %path.display(), error = %source, "skipping corrupt cache entry");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match Url::parse(&meta.url) {
                Ok(url) => keys.push(Request::get(url)),
                Err(e) => {
                    warn!(path = %path.display(), url = %meta.url, error = %e, "skipping cache entry with invalid url");
                }
            }
        }
        keys.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(keys)
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    type Store = DiskCacheStore;

    async fn open(&self, name: &str) -> Result<Self::Store, CacheError> {
        let dir = self.cache_dir(name);
        fs::create_dir_all(&dir).await?;
        Ok(DiskCacheStore {
            dir,
            lock: self.lock_for(name),
        })
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str().and_then(unescape) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let lock = self.lock_for(name);
        let _guard = lock.write().await;

        match fs::remove_dir_all(self.cache_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// File stem for an entry: hex SHA-256 of the request URL
///
/// Fixed length, so arbitrarily long URLs stay within file name limits.
fn entry_stem(request: &Request) -> String {
    hex::encode(Sha256::digest(request.key().as_bytes()))
}

/// Reversibly maps a cache name to a safe directory name
///
/// ASCII alphanumerics, `-` and non-leading `.` pass through; every other
/// byte becomes `_XX` (uppercase hex).
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, b) in s.bytes().enumerate() {
        if b.is_ascii_alphanumeric() || b == b'-' || (b == b'.' && i > 0) {
            out.push(b as char);
        } else {
            out.push_str(&format!("_{:02X}", b));
        }
    }
    out
}

/// Inverse of [`escape`]; `None` for names this storage did not produce
fn unescape(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'_' {
            let hex = s.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (DiskCacheStorage, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = DiskCacheStorage::with_dir(temp_dir.path().to_path_buf());
        (storage, temp_dir)
    }

    fn request(s: &str) -> Request {
        Request::get(Url::parse(s).unwrap())
    }

    #[test]
    fn test_escape_roundtrip_for_cache_names() {
        for s in [
            "actus-v2.2",
            "tennis-lab-v50",
            "swcache/v1 beta",
            ".hidden",
            "éclair",
        ] {
            let escaped = escape(s);
            assert!(!escaped.contains('/'), "escaped name must be a single path component");
            assert!(!escaped.starts_with('.'));
            assert_eq!(unescape(&escaped).as_deref(), Some(s));
        }
    }

    #[test]
    fn test_unescape_rejects_truncated_sequences() {
        assert_eq!(unescape("abc_4"), None);
        assert_eq!(unescape("abc_ZZ"), None);
    }

    #[tokio::test]
    async fn test_put_writes_meta_and_body_files() {
        let (storage, temp_dir) = create_test_storage();
        let store = storage.open("actus-v2.2").await.unwrap();
        let req = request("https://example.org/actus/manifest.json");

        let mut response = Response::ok(r#"{"name":"Actus"}"#);
        response
            .headers
            .push(("content-type".to_string(), "application/json".to_string()));
        store.put(&req, response).await.expect("Write should succeed");

        let cache_dir = temp_dir.path().join(escape("actus-v2.2"));
        let stem = entry_stem(&req);
        assert_eq!(stem.len(), 64);
        let meta_path = cache_dir.join(format!("{}.json", stem));
        let body_path = cache_dir.join(format!("{}.body", stem));
        assert!(meta_path.exists(), "Metadata file should exist");
        assert!(body_path.exists(), "Body file should exist");

        let meta = std::fs::read_to_string(&meta_path).unwrap();
        assert!(meta.contains("\"url\""));
        assert!(meta.contains("manifest.json"));
        assert!(meta.contains("\"cached_at\""));
        assert_eq!(std::fs::read(&body_path).unwrap(), br#"{"name":"Actus"}"#);
    }

    #[tokio::test]
    async fn test_match_returns_stored_response() {
        let (storage, _temp_dir) = create_test_storage();
        let store = storage.open("v1").await.unwrap();
        let req = request("https://example.org/data.csv");

        let mut response = Response::with_status(203, vec![0u8, 159, 146, 150]);
        response
            .headers
            .push(("etag".to_string(), "\"abc\"".to_string()));
        store.put(&req, response.clone()).await.unwrap();

        assert_eq!(store.match_request(&req).await.unwrap(), Some(response));
    }

    #[tokio::test]
    async fn test_match_returns_none_for_missing_entry() {
        let (storage, _temp_dir) = create_test_storage();
        let store = storage.open("v1").await.unwrap();

        let result = store
            .match_request(&request("https://example.org/missing.json"))
            .await
            .unwrap();

        assert!(result.is_none(), "Should return None for missing key");
    }

    #[tokio::test]
    async fn test_corrupt_meta_is_reported() {
        let (storage, temp_dir) = create_test_storage();
        let store = storage.open("v1").await.unwrap();
        let req = request("https://example.org/a.json");

        let meta_path = temp_dir
            .path()
            .join("v1")
            .join(format!("{}.json", entry_stem(&req)));
        std::fs::write(&meta_path, "not json").unwrap();

        let result = store.match_request(&req).await;
        assert!(matches!(result, Err(CacheError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_overwrite_existing_entry() {
        let (storage, _temp_dir) = create_test_storage();
        let store = storage.open("v1").await.unwrap();
        let req = request("https://example.org/feed.csv");

        store.put(&req, Response::ok("first")).await.unwrap();
        store.put(&req, Response::ok("second")).await.unwrap();

        let result = store.match_request(&req).await.unwrap().unwrap();
        assert_eq!(result.body, b"second", "Cache should contain latest data");
        assert_eq!(store.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_both_files() {
        let (storage, _temp_dir) = create_test_storage();
        let store = storage.open("v1").await.unwrap();
        let req = request("https://example.org/feed.csv");

        store.put(&req, Response::ok("x")).await.unwrap();
        assert!(store.delete(&req).await.unwrap());
        assert!(!store.delete(&req).await.unwrap());
        assert!(!store.body_path(&req).exists());
        assert!(store.match_request(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_lists_entries_sorted() {
        let (storage, _temp_dir) = create_test_storage();
        let store = storage.open("v1").await.unwrap();

        store
            .put(&request("https://example.org/b.png"), Response::ok("b"))
            .await
            .unwrap();
        store
            .put(&request("https://example.org/a.json"), Response::ok("a"))
            .await
            .unwrap();

        let keys: Vec<String> = store
            .keys()
            .await
            .unwrap()
            .iter()
            .map(|r| r.key().to_string())
            .collect();
        assert_eq!(
            keys,
            vec!["https://example.org/a.json", "https://example.org/b.png"]
        );
    }

    #[tokio::test]
    async fn test_storage_keys_and_delete() {
        let (storage, _temp_dir) = create_test_storage();
        storage.open("tennis-lab-v49").await.unwrap();
        storage.open("tennis-lab-v50").await.unwrap();

        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["tennis-lab-v49".to_string(), "tennis-lab-v50".to_string()]
        );

        assert!(storage.delete("tennis-lab-v49").await.unwrap());
        assert!(!storage.delete("tennis-lab-v49").await.unwrap());
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["tennis-lab-v50".to_string()]
        );
    }

    #[tokio::test]
    async fn test_keys_on_missing_root_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskCacheStorage::with_dir(temp_dir.path().join("nested").join("dir"));

        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_creates_directory_if_missing() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("nested").join("cache");
        let storage = DiskCacheStorage::with_dir(nested_path.clone());

        storage.open("v1").await.unwrap();

        assert!(nested_path.join("v1").exists(), "Nested directory should be created");
    }

    #[tokio::test]
    async fn test_url_longer_than_file_name_limit_is_cached() {
        let (storage, temp_dir) = create_test_storage();
        let store = storage.open("tennis-lab-v50").await.unwrap();
        let url = format!(
            "https://example.org/tennis/ytd_matches_2024.csv?players={}&token={}",
            "djokovic,alcaraz,sinner,".repeat(8),
            "a1b2c3d4".repeat(16)
        );
        assert!(url.len() > 255);
        let req = request(&url);

        store.put(&req, Response::ok("player,wins\n")).await.unwrap();

        let cached = store.match_request(&req).await.unwrap().unwrap();
        assert_eq!(cached.body, b"player,wins\n");
        let keys = store.keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key(), url);
        for entry in std::fs::read_dir(temp_dir.path().join("tennis-lab-v50")).unwrap() {
            let name = entry.unwrap().file_name();
            assert!(name.len() < 80, "entry file name too long: {:?}", name);
        }
    }

    #[tokio::test]
    async fn test_meta_without_body_is_a_miss() {
        let (storage, _temp_dir) = create_test_storage();
        let store = storage.open("v1").await.unwrap();
        let req = request("https://example.org/feed.csv");

        store.put(&req, Response::ok("x")).await.unwrap();
        std::fs::remove_file(store.body_path(&req)).unwrap();

        assert!(store.match_request(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_skips_corrupt_entries() {
        let (storage, temp_dir) = create_test_storage();
        let store = storage.open("v1").await.unwrap();
        store
            .put(&request("https://example.org/a.json"), Response::ok("a"))
            .await
            .unwrap();

        let cache_dir = temp_dir.path().join("v1");
        std::fs::write(cache_dir.join("broken.json"), "{ not json").unwrap();
        std::fs::write(
            cache_dir.join("badurl.json"),
            r#"{"url":"not a url","status":200,"headers":[],"cached_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let keys = store.keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key(), "https://example.org/a.json");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_put_delete_and_match_stay_consistent() {
        let (storage, _temp_dir) = create_test_storage();
        // Separate handles on the same cache share one lock
        let writer = storage.open("v1").await.unwrap();
        let other = storage.open("v1").await.unwrap();
        let req = request("https://example.org/actu_2024-01-01.json");

        let mut tasks = Vec::new();
        for i in 0..40u32 {
            let store = if i % 2 == 0 { writer.clone() } else { other.clone() };
            let req = req.clone();
            tasks.push(tokio::spawn(async move {
                match i % 4 {
                    0 => store
                        .put(&req, Response::with_status(200, vec![b'a'; 4096]))
                        .await
                        .map(|_| None),
                    1 => store
                        .put(&req, Response::with_status(203, vec![b'b'; 16]))
                        .await
                        .map(|_| None),
                    2 => store.delete(&req).await.map(|_| None),
                    _ => store.match_request(&req).await,
                }
            }));
        }

        for task in tasks {
            let result = task.await.unwrap().expect("cache operation failed");
            if let Some(response) = result {
                match response.status {
                    200 => assert_eq!(response.body, vec![b'a'; 4096]),
                    203 => assert_eq!(response.body, vec![b'b'; 16]),
                    other => panic!("unexpected status {}", other),
                }
            }
        }

        // Whatever the final state, meta and body agree
        let meta_exists = writer.meta_path(&req).exists();
        let body_exists = writer.body_path(&req).exists();
        assert_eq!(meta_exists, body_exists);
        if let Some(response) = writer.match_request(&req).await.unwrap() {
            assert!(response.status == 200 || response.status == 203);
        }
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(storage) = DiskCacheStorage::new() {
            let path_str = storage.root().to_string_lossy();
            assert!(
                path_str.contains("swcache"),
                "Cache path should contain project name"
            );
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }
}
