//! Script repository
//!
//! Titles and scripts come from the local `scripts` table and, optionally, a
//! remote bucket serving a JSON title index plus one JSON script per title.
//! Remote failures never hide local scripts.

use std::path::Path;

use async_trait::async_trait;
use cuecannon_core::{Database, Script, ScriptSource};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::CanonConfig;
use crate::error::{AppError, Result};

/// Source of play scripts for the engine
#[async_trait]
pub trait ScriptRepository: Send + Sync + 'static {
    /// Every known title, stored scripts first
    async fn list_titles(&self) -> Result<Vec<String>>;

    async fn fetch_script(&self, title: &str) -> Result<Script>;
}

/// Remote store of scripts
#[async_trait]
pub trait ScriptBucket: Send + Sync + 'static {
    async fn index(&self) -> Result<Vec<String>>;

    async fn script(&self, title: &str) -> Result<Script>;
}

/// Bucket served over HTTP
pub struct HttpBucket {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

impl HttpBucket {
    pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            index: index.into(),
        }
    }

    pub fn from_config(config: &CanonConfig) -> Self {
        Self::new(config.bucket_url.clone(), config.index.clone())
    }

    fn url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }
}

#[async_trait]
impl ScriptBucket for HttpBucket {
    async fn index(&self) -> Result<Vec<String>> {
        let titles = self
            .client
            .get(self.url(&self.index))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<String>>()
            .await?;
        Ok(titles)
    }

    async fn script(&self, title: &str) -> Result<Script> {
        let script = self
            .client
            .get(self.url(title))
            .send()
            .await?
            .error_for_status()?
            .json::<Script>()
            .await?;
        Ok(script)
    }
}

/// Local script cache backed by an optional remote bucket
pub struct Canon<B = HttpBucket> {
    db: Mutex<Database>,
    bucket: Option<B>,
}

impl Canon<HttpBucket> {
    /// Local-only repository
    pub fn local(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            bucket: None,
        }
    }

    pub fn from_config(db: Database, config: &CanonConfig) -> Self {
        if config.remote {
            Self::with_bucket(db, HttpBucket::from_config(config))
        } else {
            Self::local(db)
        }
    }
}

impl<B: ScriptBucket> Canon<B> {
    pub fn with_bucket(db: Database, bucket: B) -> Self {
        Self {
            db: Mutex::new(db),
            bucket: Some(bucket),
        }
    }

    /// Store or replace a locally authored script
    pub async fn add_local_script(&self, title: &str, script: &Script) -> Result<()> {
        let db = self.db.lock().await;
        db.scripts().upsert(title, script, ScriptSource::Local)?;
        info!(title, lines = script.len(), "Added local script");
        Ok(())
    }

    /// Read a JSON array of `{s, t, l}` lines from `path` and store it as `title`
    pub async fn add_script_file(&self, title: &str, path: &Path) -> Result<Script> {
        let contents = tokio::fs::read_to_string(path).await?;
        let script: Script = serde_json::from_str(&contents)?;
        self.add_local_script(title, &script).await?;
        Ok(script)
    }

    async fn remote_titles(&self) -> Vec<String> {
        let Some(bucket) = &self.bucket else {
            return Vec::new();
        };
        match bucket.index().await {
            Ok(titles) => titles,
            Err(e) => {
                warn!(error = %e, "Remote script index unavailable, using local titles only");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl<B: ScriptBucket> ScriptRepository for Canon<B> {
    #[instrument(skip(self))]
    async fn list_titles(&self) -> Result<Vec<String>> {
        let mut titles = self.db.lock().await.scripts().all_titles()?;

        for title in self.remote_titles().await {
            if !titles.contains(&title) {
                titles.push(title);
            }
        }
        Ok(titles)
    }

    #[instrument(skip(self))]
    async fn fetch_script(&self, title: &str) -> Result<Script> {
        if let Some(stored) = self.db.lock().await.scripts().find(title)? {
            debug!(source = stored.source.as_str(), "Script found locally");
            return Ok(stored.script);
        }

        let bucket = self
            .bucket
            .as_ref()
            .ok_or_else(|| AppError::ScriptNotFound(title.to_string()))?;
        let script = bucket.script(title).await?;

        self.db
            .lock()
            .await
            .scripts()
            .upsert(title, &script, ScriptSource::Remote)?;
        info!(lines = script.len(), "Cached remote script");
        Ok(script)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cuecannon_core::ScriptLine;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn script(speakers: &[&str]) -> Script {
        speakers
            .iter()
            .enumerate()
            .map(|(i, s)| ScriptLine::new(*s, format!("line {}", i), format!("1.1.{}", i + 1)))
            .collect::<Vec<_>>()
            .into()
    }

    /// Bucket answering from a fixed map
    #[derive(Default)]
    pub(crate) struct StaticBucket {
        scripts: BTreeMap<String, Script>,
        fetches: AtomicUsize,
    }

    impl StaticBucket {
        pub(crate) fn with(mut self, title: &str, script: Script) -> Self {
            self.scripts.insert(title.to_string(), script);
            self
        }
    }

    #[async_trait]
    impl ScriptBucket for StaticBucket {
        async fn index(&self) -> Result<Vec<String>> {
            Ok(self.scripts.keys().cloned().collect())
        }

        async fn script(&self, title: &str) -> Result<Script> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.scripts
                .get(title)
                .cloned()
                .ok_or_else(|| AppError::ScriptNotFound(title.to_string()))
        }
    }

    struct DownBucket;

    #[async_trait]
    impl ScriptBucket for DownBucket {
        async fn index(&self) -> Result<Vec<String>> {
            Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "bucket down",
            )))
        }

        async fn script(&self, title: &str) -> Result<Script> {
            Err(AppError::ScriptNotFound(title.to_string()))
        }
    }

    #[tokio::test]
    async fn test_local_titles_come_first() {
        let bucket = StaticBucket::default()
            .with("Hamlet", script(&["A"]))
            .with("Macbeth", script(&["B"]));
        let canon = Canon::with_bucket(Database::open_in_memory().unwrap(), bucket);
        canon
            .add_local_script("Macbeth", &script(&["WITCH"]))
            .await
            .unwrap();

        let titles = canon.list_titles().await.unwrap();
        assert_eq!(titles, vec!["Macbeth".to_string(), "Hamlet".to_string()]);
    }

    #[tokio::test]
    async fn test_remote_failure_degrades_to_local() {
        let canon = Canon::with_bucket(Database::open_in_memory().unwrap(), DownBucket);
        canon.add_local_script("Lear", &script(&["LEAR"])).await.unwrap();

        assert_eq!(canon.list_titles().await.unwrap(), vec!["Lear".to_string()]);
        assert!(canon.fetch_script("Othello").await.is_err());
    }

    #[tokio::test]
    async fn test_cached_remote_listed_when_bucket_down() {
        let db = Database::open_in_memory().unwrap();
        db.scripts()
            .upsert("Hamlet", &script(&["HAMLET"]), ScriptSource::Remote)
            .unwrap();
        let canon = Canon::with_bucket(db, DownBucket);
        canon.add_local_script("Lear", &script(&["LEAR"])).await.unwrap();

        assert_eq!(
            canon.list_titles().await.unwrap(),
            vec!["Hamlet".to_string(), "Lear".to_string()]
        );
        assert_eq!(canon.fetch_script("Hamlet").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_prefers_local_then_caches_remote() {
        let bucket = StaticBucket::default().with("Hamlet", script(&["HAMLET", "HORATIO"]));
        let canon = Canon::with_bucket(Database::open_in_memory().unwrap(), bucket);

        let first = canon.fetch_script("Hamlet").await.unwrap();
        let second = canon.fetch_script("Hamlet").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);

        let bucket = canon.bucket.as_ref().unwrap();
        assert_eq!(bucket.fetches.load(Ordering::SeqCst), 1);

        let db = canon.db.lock().await;
        let stored = db.scripts().find("Hamlet").unwrap().unwrap();
        assert_eq!(stored.source, ScriptSource::Remote);
    }

    #[tokio::test]
    async fn test_local_only_missing_script() {
        let canon = Canon::local(Database::open_in_memory().unwrap());
        assert!(canon.list_titles().await.unwrap().is_empty());
        assert!(matches!(
            canon.fetch_script("Hamlet").await,
            Err(AppError::ScriptNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_script_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tempest.json");
        std::fs::write(
            &path,
            r#"[{"s":"PROSPERO","t":"Now does my project gather to a head","l":"5.1.1"},
                {"s":"ARIEL","t":"On the sixth hour","l":"5.1.4"}]"#,
        )
        .unwrap();

        let canon = Canon::local(Database::open_in_memory().unwrap());
        let added = canon
            .add_script_file("The Tempest", &path)
            .await
            .unwrap();
        assert_eq!(added.len(), 2);

        assert_eq!(canon.list_titles().await.unwrap(), vec!["The Tempest".to_string()]);
        let fetched = canon.fetch_script("The Tempest").await.unwrap();
        assert_eq!(fetched.line(1).unwrap().speaker, "ARIEL");
        assert_eq!(fetched.line(0).unwrap().scene_ref, "5.1.1");
    }

    #[tokio::test]
    async fn test_add_script_file_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, r#"{"s":"PROSPERO"}"#).unwrap();

        let canon = Canon::local(Database::open_in_memory().unwrap());
        assert!(matches!(
            canon.add_script_file("Broken", &path).await,
            Err(AppError::ScriptFormat(_))
        ));
        assert!(matches!(
            canon.add_script_file("Missing", &dir.path().join("nope.json")).await,
            Err(AppError::Io(_))
        ));
        assert!(canon.list_titles().await.unwrap().is_empty());
    }

    #[test]
    fn test_bucket_url() {
        let bucket = HttpBucket::new("https://example.com/plays/", "play_list.json");
        assert_eq!(bucket.url("play_list.json"), "https://example.com/plays/play_list.json");
    }
}
