use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque refresh token. Never stored, so it is not accepted as a bearer
/// token.
pub fn refresh_token() -> String {
    Uuid::new_v4().to_string()
}

/// Bearer tokens handed out by the login endpoint, valid for `ttl`.
#[derive(Debug)]
pub struct TokenStore {
    ttl: Duration,
    issued: HashMap<String, Instant>,
}

impl TokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            issued: HashMap::new(),
        }
    }

    pub fn issue(&mut self) -> String {
        self.issue_at(Instant::now())
    }

    pub fn is_valid(&self, token: &str) -> bool {
        self.is_valid_at(token, Instant::now())
    }

    fn issue_at(&mut self, now: Instant) -> String {
        let ttl = self.ttl;
        self.issued.retain(|_, issued| now.duration_since(*issued) < ttl);

        let token = Uuid::new_v4().to_string();
        self.issued.insert(token.clone(), now);
        token
    }

    fn is_valid_at(&self, token: &str, now: Instant) -> bool {
        self.issued
            .get(token)
            .is_some_and(|issued| now.duration_since(*issued) < self.ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_valid_until_ttl() {
        let mut store = TokenStore::new(Duration::from_secs(60));
        let now = Instant::now();
        let token = store.issue_at(now);

        assert!(store.is_valid_at(&token, now + Duration::from_secs(59)));
        assert!(!store.is_valid_at(&token, now + Duration::from_secs(60)));
        assert!(!store.is_valid_at("unknown", now));
    }

    #[test]
    fn test_expired_tokens_are_pruned() {
        let mut store = TokenStore::new(Duration::from_secs(1));
        let now = Instant::now();
        store.issue_at(now);
        store.issue_at(now + Duration::from_secs(5));

        assert_eq!(store.issued.len(), 1);
    }

    #[test]
    fn test_refresh_token_is_not_a_bearer_token() {
        let mut store = TokenStore::new(Duration::from_secs(60));
        let access = store.issue();
        let refresh = refresh_token();

        assert_ne!(access, refresh);
        assert!(store.is_valid(&access));
        assert!(!store.is_valid(&refresh));
        assert_eq!(store.issued.len(), 1);
    }
}
