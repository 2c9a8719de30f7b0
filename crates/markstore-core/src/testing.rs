//! Test doubles shared by the unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::fetch::{FetchResult, Fetcher};
use crate::models::NewBookmark;
use crate::storage::{BookmarkStore, Commit};

/// Fetcher answering from a fixed table; unknown URLs get no response
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: HashMap<String, FetchResult>,
    calls: AtomicUsize,
    heads: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests for `result.url` with `result`
    pub fn with(self, result: FetchResult) -> Self {
        let url = result.url.clone();
        self.with_for(&url, result)
    }

    /// Answer requests for `url` with `result`
    pub fn with_for(mut self, url: &str, result: FetchResult) -> Self {
        self.responses.insert(url.to_string(), result);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// URLs fetched with a HEAD request, in call order
    pub fn head_requests(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, url: &str, head_only: bool) -> FetchResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if head_only {
            self.heads.lock().unwrap().push(url.to_string());
        }
        self.responses
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchResult::network_failure(url))
    }
}

/// A successful page fetch
pub fn page(url: &str, title: &str) -> FetchResult {
    FetchResult {
        url: url.to_string(),
        title: title.to_string(),
        status: Some(200),
        ..Default::default()
    }
}

/// In-memory store holding one untitled record per URL, ids in order
pub fn seeded_store(urls: &[&str]) -> BookmarkStore {
    let store = BookmarkStore::open_in_memory().unwrap();
    for url in urls {
        store.insert(&NewBookmark::new(*url), Commit::Now).unwrap();
    }
    store
}
