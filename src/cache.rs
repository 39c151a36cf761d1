//! Storage for issued certificate bundles, keyed by domain.

use std::{
    collections::HashMap,
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

/// Raw certificate bundle storage supplied by the embedding application.
///
/// The bytes are opaque to the cache. A failed read and an unparseable entry are both treated as
/// a miss by the fetcher; a failed write is logged and otherwise ignored.
pub trait CertificateCache: Send + Sync + 'static {
    /// Load the stored bundle for `domain`, if there is one.
    fn read(&self, domain: &str) -> impl Future<Output = io::Result<Option<Vec<u8>>>> + Send;

    /// Store `bytes` as the bundle for `domain`, replacing any previous entry.
    fn write(&self, domain: &str, bytes: &[u8]) -> impl Future<Output = io::Result<()>> + Send;
}

/// Keeps one `<domain>.pem` file per domain in a directory.
#[derive(Debug, Clone)]
pub struct DirCache {
    dir: PathBuf,
}

impl DirCache {
    /// Use `dir` for cache files; it is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the cache files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, domain: &str) -> PathBuf {
        let name = domain
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' => c,
                _ => '_',
            })
            .collect::<String>();

        self.dir.join(format!("{name}.pem"))
    }
}

impl CertificateCache for DirCache {
    async fn read(&self, domain: &str) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(domain)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn write(&self, domain: &str, bytes: &[u8]) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(domain);
        let tmp = path.with_extension("pem.tmp");

        let mut opts = tokio::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        opts.mode(0o600);

        {
            use tokio::io::AsyncWriteExt as _;

            let mut file = opts.open(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
        }

        // rename is atomic, readers never see a partial bundle
        tokio::fs::rename(&tmp, &path).await
    }
}

/// In-process cache; clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CertificateCache for MemoryCache {
    async fn read(&self, domain: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(domain).cloned())
    }

    async fn write(&self, domain: &str, bytes: &[u8]) -> io::Result<()> {
        self.entries
            .lock()
            .insert(domain.to_owned(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache() {
        let cache = MemoryCache::new();
        let shared = cache.clone();

        assert_eq!(cache.read("example.org").await.unwrap(), None);

        cache.write("example.org", b"bundle").await.unwrap();
        assert_eq!(
            shared.read("example.org").await.unwrap().as_deref(),
            Some(&b"bundle"[..])
        );
        assert_eq!(shared.read("example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dir_cache() {
        let dir = std::env::temp_dir().join(format!("autotls-dir-cache-{}", std::process::id()));
        let cache = DirCache::new(&dir);

        assert_eq!(cache.read("example.org").await.unwrap(), None);

        cache.write("example.org", b"first").await.unwrap();
        cache.write("example.org", b"second").await.unwrap();
        assert_eq!(
            cache.read("example.org").await.unwrap().as_deref(),
            Some(&b"second"[..])
        );
        assert!(dir.join("example.org.pem").exists());
        assert!(!dir.join("example.org.pem.tmp").exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn test_dir_cache_file_names() {
        let cache = DirCache::new("/var/cache/autotls");
        assert_eq!(
            cache.path_for("example.org"),
            Path::new("/var/cache/autotls/example.org.pem")
        );
        assert_eq!(
            cache.path_for("../etc/passwd"),
            Path::new("/var/cache/autotls/.._etc_passwd.pem")
        );
    }
}
