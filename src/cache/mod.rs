//! Cache layer
//!
//! Process-local cache (moka) for hot read paths: the published course
//! catalog, course and post pages by slug, and active subscription plans.
//! Values are stored as JSON so any serializable type can be cached.
//!
//! ```rust,ignore
//! let cache = kalpla::cache::create_cache(&config.cache);
//! cache.set("courses:slug:rust", &detail, cache.default_ttl()).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache operations
///
/// Generic over the cached value, so implementations are used concretely
/// rather than as trait objects.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching a glob (`*`, `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Cache shared between services
pub type SharedCache = Arc<MemoryCache>;

/// Key layout. Invalidation relies on the prefixes.
pub mod keys {
    pub const COURSE_LIST_PATTERN: &str = "courses:list:*";
    pub const COURSES_PATTERN: &str = "courses:*";
    pub const POSTS_PATTERN: &str = "posts:*";
    pub const PLANS_ACTIVE: &str = "plans:active";

    pub fn course_list(page: u32, per_page: u32, filter: &str) -> String {
        format!("courses:list:{}:{}:{}", page, per_page, filter)
    }

    pub fn course_slug(slug: &str) -> String {
        format!("courses:slug:{}", slug)
    }

    pub fn post_slug(slug: &str) -> String {
        format!("posts:slug:{}", slug)
    }
}

pub fn create_cache(config: &CacheConfig) -> SharedCache {
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}
