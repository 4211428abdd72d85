//! Bucket key generation.

/// Prefix shared by every bucket key.
const KEY_PREFIX: &str = "rate";

/// Identifies the bucket of one identity under one route.
///
/// The remote layout is two keys, `rate:{route}:{identity}:tokens` and
/// `rate:{route}:{identity}:lastRefill`. Routes never contain ':', so the
/// route segment is unambiguous even when the identity is an IPv6 address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// The route namespace
    pub route: String,
    /// The caller identity, e.g. a client address
    pub identity: String,
}

impl BucketKey {
    /// Create a new bucket key.
    pub fn new(route: &str, identity: &str) -> Self {
        Self {
            route: route.to_string(),
            identity: identity.to_string(),
        }
    }

    /// Key holding the token count.
    pub fn tokens_key(&self) -> String {
        format!("{}:{}:{}:tokens", KEY_PREFIX, self.route, self.identity)
    }

    /// Key holding the unix time of the last successful consume.
    pub fn last_refill_key(&self) -> String {
        format!("{}:{}:{}:lastRefill", KEY_PREFIX, self.route, self.identity)
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.route, self.identity)
    }
}
