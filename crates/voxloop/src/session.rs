//! Session identity: an opaque client-generated id grouping turns into one
//! conversation from the endpoint's perspective.
//!
//! Ids are time-seeded and pseudo-random; uniqueness is not cryptographic and
//! collisions are accepted as negligible. Persistence goes through a
//! `SessionStore` so the id survives whatever "navigation state" means for the
//! host: in-process memory, or a `session=` query parameter on a page URL.

use chrono::Utc;
use rand::Rng;
use tracing::info;

/// Where the active session id lives between turns.
pub trait SessionStore {
    fn load(&self) -> Option<String>;
    fn store(&mut self, id: &str);
}

/// In-process store; the id lives for the life of the manager.
#[derive(Debug, Default)]
pub struct MemoryStore {
    id: Option<String>,
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Option<String> {
        self.id.clone()
    }

    fn store(&mut self, id: &str) {
        self.id = Some(id.to_string());
    }
}

/// Persists the id as a `session=` query parameter on a URL, mirroring the
/// browser behavior of rewriting navigation state in place.
#[derive(Debug, Clone)]
pub struct QueryStringStore {
    url: String,
}

impl QueryStringStore {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The URL with the current session parameter applied.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SessionStore for QueryStringStore {
    fn load(&self) -> Option<String> {
        let query = self.url.split_once('?')?.1;
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("session="))
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    }

    fn store(&mut self, id: &str) {
        let (path, query) = match self.url.split_once('?') {
            Some((p, q)) => (p.to_string(), q),
            None => (self.url.clone(), ""),
        };
        let mut pairs: Vec<String> = query
            .split('&')
            .filter(|p| !p.is_empty() && !p.starts_with("session="))
            .map(|p| p.to_string())
            .collect();
        pairs.push(format!("session={}", id));
        self.url = format!("{}?{}", path, pairs.join("&"));
    }
}

/// Generate a fresh id: `sess_{unix_millis}_{4-digit random}`.
fn generate_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
    format!("sess_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// Owns the active conversation identifier.
pub struct SessionManager {
    store: Box<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(store: Box<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// The active session id, creating and persisting one if none exists.
    pub fn current_id(&mut self) -> String {
        if let Some(id) = self.store.load() {
            return id;
        }
        let id = generate_id();
        info!("Session created: {}", id);
        self.store.store(&id);
        id
    }

    /// Replace the persisted id with a fresh one; subsequent turns belong to
    /// a new conversation. Guaranteed to differ from the prior id.
    pub fn rotate(&mut self) -> String {
        let prior = self.store.load();
        let id = loop {
            let candidate = generate_id();
            if prior.as_deref() != Some(candidate.as_str()) {
                break candidate;
            }
        };
        info!("Session rotated: {}", id);
        self.store.store(&id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_format() {
        let id = generate_id();
        assert!(id.starts_with("sess_"));
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].parse::<i64>().is_ok());
        let suffix: u32 = parts[2].parse().unwrap();
        assert!((1000..10000).contains(&suffix));
    }

    #[test]
    fn current_id_is_stable() {
        let mut mgr = SessionManager::new(Box::new(MemoryStore::default()));
        let a = mgr.current_id();
        let b = mgr.current_id();
        assert_eq!(a, b);
    }

    #[test]
    fn rotate_yields_different_id() {
        let mut mgr = SessionManager::new(Box::new(MemoryStore::default()));
        let a = mgr.current_id();
        mgr.rotate();
        assert_ne!(mgr.current_id(), a);
    }

    #[test]
    fn query_store_reads_existing_session() {
        let store = QueryStringStore::new("/chat?session=sess_1_2345&theme=dark");
        assert_eq!(store.load().as_deref(), Some("sess_1_2345"));
    }

    #[test]
    fn query_store_rewrites_url() {
        let mut store = QueryStringStore::new("/chat?theme=dark");
        store.store("sess_9_1111");
        assert_eq!(store.url(), "/chat?theme=dark&session=sess_9_1111");
        store.store("sess_9_2222");
        assert_eq!(store.load().as_deref(), Some("sess_9_2222"));
        assert!(!store.url().contains("sess_9_1111"));
    }

    #[test]
    fn query_store_without_query() {
        let mut store = QueryStringStore::new("/chat");
        assert_eq!(store.load(), None);
        store.store("sess_1_1000");
        assert_eq!(store.url(), "/chat?session=sess_1_1000");
    }
}
