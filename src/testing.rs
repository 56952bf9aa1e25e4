//! In-process stand-ins for the remote services, shared by the unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{AppConfig, AppContext};
use crate::error::{LockerError, LockerResult};
use crate::remote::{ContentFetcher, DiscordUser, RemoteContent, UserDirectory};

#[derive(Default)]
pub struct FakeDirectory {
    users: Mutex<HashMap<String, DiscordUser>>,
    pub lookups: AtomicUsize,
}

impl FakeDirectory {
    pub fn with_user(self, id: &str, username: &str) -> Self {
        self.users.lock().unwrap().insert(
            id.to_string(),
            DiscordUser {
                id: id.to_string(),
                username: username.to_string(),
                avatar: Some(format!("hash{}", id)),
            },
        );
        self
    }
}

#[async_trait]
impl UserDirectory for FakeDirectory {
    async fn fetch_user(&self, user_id: &str) -> LockerResult<Option<DiscordUser>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.users.lock().unwrap().get(user_id).cloned())
    }
}

/// Serves registered URLs, with optional per-URL latency and failures
#[derive(Default)]
pub struct FakeFetcher {
    content: Mutex<HashMap<String, (String, Vec<u8>)>>,
    latency: Mutex<HashMap<String, Duration>>,
    broken: Mutex<HashSet<String>>,
    pub downloads: AtomicUsize,
}

impl FakeFetcher {
    pub fn serve(&self, url: &str, content_type: &str, bytes: Vec<u8>) {
        self.content
            .lock()
            .unwrap()
            .insert(url.to_string(), (content_type.to_string(), bytes));
    }

    pub fn delay(&self, url: &str, latency: Duration) {
        self.latency.lock().unwrap().insert(url.to_string(), latency);
    }

    pub fn break_url(&self, url: &str) {
        self.broken.lock().unwrap().insert(url.to_string());
    }

    /// Avatar URLs are CDN URLs; serve any of them
    fn lookup(&self, url: &str) -> Option<(String, Vec<u8>)> {
        let content = self.content.lock().unwrap();
        content.get(url).cloned().or_else(|| {
            url.starts_with("https://cdn.discordapp.com/")
                .then(|| content.get("avatar").cloned())
                .flatten()
        })
    }
}

#[async_trait]
impl ContentFetcher for FakeFetcher {
    async fn probe(&self, url: &str) -> LockerResult<Option<RemoteContent>> {
        Ok(self.lookup(url).map(|(content_type, bytes)| RemoteContent {
            content_type,
            size: bytes.len() as i64,
        }))
    }

    async fn download(&self, url: &str) -> LockerResult<Vec<u8>> {
        let latency = self.latency.lock().unwrap().get(url).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.broken.lock().unwrap().contains(url) {
            return Err(LockerError::RemoteStatus {
                url: url.to_string(),
                status: 500,
            });
        }

        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.lookup(url)
            .map(|(_, bytes)| bytes)
            .ok_or_else(|| LockerError::RemoteStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// A context rooted in `dir`, with the fakes behind it
pub fn context(
    dir: &Path,
    users: Arc<FakeDirectory>,
    fetcher: Arc<FakeFetcher>,
) -> AppContext {
    let config = AppConfig {
        database_path: dir.join("locker.db"),
        cache_dir: dir.join("cache"),
        hydration_concurrency: 4,
        ..AppConfig::default()
    };
    AppContext::with_services(config, users, fetcher).unwrap()
}
