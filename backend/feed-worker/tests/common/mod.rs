#![allow(dead_code)]

use async_trait::async_trait;
use feed_worker::error::{ResolveError, StoreError};
use feed_worker::grpc::FollowerResolver;
use feed_worker::models::Follower;
use feed_worker::FeedStore;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const EVENT: &[u8] = br#"{"user_id":"author1","tweet_id":"tweet123"}"#;

pub fn event(author_id: &str, post_id: &str) -> Vec<u8> {
    serde_json::json!({ "user_id": author_id, "tweet_id": post_id })
        .to_string()
        .into_bytes()
}

/// Redis list semantics in memory, with per-key push failure injection.
#[derive(Default)]
pub struct InMemoryFeedStore {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    failing_pushes: Mutex<HashSet<String>>,
    pushes: AtomicUsize,
}

impl InMemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_pushes_to(&self, key: &str) {
        self.failing_pushes.lock().unwrap().insert(key.to_string());
    }

    pub fn heal(&self) {
        self.failing_pushes.lock().unwrap().clear();
    }

    pub fn feed(&self, key: &str) -> Vec<String> {
        self.lists
            .lock()
            .unwrap()
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }
}

/// Resolves a Redis list index (negative counts from the tail) against `len`.
fn index(len: usize, i: isize) -> isize {
    if i < 0 {
        len as isize + i
    } else {
        i
    }
}

#[async_trait]
impl FeedStore for InMemoryFeedStore {
    async fn push_front(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        if self.failing_pushes.lock().unwrap().contains(key) {
            return Err(StoreError::Unavailable("injected push failure".into()));
        }
        self.pushes.fetch_add(1, Ordering::SeqCst);

        let mut lists = self.lists.lock().unwrap();
        let list = lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        Ok(list.len())
    }

    async fn trim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        let mut lists = self.lists.lock().unwrap();
        if let Some(list) = lists.get_mut(key) {
            let len = list.len();
            let start = index(len, start).max(0) as usize;
            let stop = index(len, stop);
            if stop < 0 || start >= len || start as isize > stop {
                list.clear();
                return Ok(());
            }
            let stop = (stop as usize).min(len - 1);
            let kept: VecDeque<String> = list.drain(start..=stop).collect();
            *list = kept;
        }
        Ok(())
    }

    async fn range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let lists = self.lists.lock().unwrap();
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        let len = list.len();
        let start = index(len, start).max(0) as usize;
        let stop = index(len, stop);
        if stop < 0 || start >= len || start as isize > stop {
            return Ok(Vec::new());
        }
        let stop = (stop as usize).min(len - 1);
        Ok(list.range(start..=stop).cloned().collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Returns the same follower list for every author.
pub struct StaticResolver {
    followers: Vec<String>,
    pub calls: AtomicUsize,
}

impl StaticResolver {
    pub fn new(followers: &[&str]) -> Self {
        Self {
            followers: followers.iter().map(|f| f.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FollowerResolver for StaticResolver {
    async fn resolve(&self, _author_id: &str) -> Result<Vec<Follower>, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.followers.iter().cloned().map(Follower::new).collect())
    }
}

pub struct FailingResolver {
    code: tonic::Code,
}

impl FailingResolver {
    pub fn unavailable() -> Self {
        Self {
            code: tonic::Code::Unavailable,
        }
    }

    pub fn not_found() -> Self {
        Self {
            code: tonic::Code::NotFound,
        }
    }
}

#[async_trait]
impl FollowerResolver for FailingResolver {
    async fn resolve(&self, _author_id: &str) -> Result<Vec<Follower>, ResolveError> {
        Err(ResolveError::Rpc {
            code: self.code,
            message: "injected".into(),
        })
    }
}
