//! Typed caches and their key functions

use super::TtlCache;
use crate::config::CacheConfig;
use spacegate_services::{
    Code, CreateStorageSpaceResponse, ListStorageProvidersResponse, Reference, ResourceId,
    StatResponse, WithStatus, SHARES_SPACE_ID, SHARES_STORAGE_ID,
};
use std::collections::BTreeMap;

fn is_shares_id(id: &ResourceId) -> bool {
    id.storage_id == SHARES_STORAGE_ID || id.space_id == SHARES_SPACE_ID
}

/// Per-user stat results
pub struct StatCache {
    cache: TtlCache<StatResponse>,
}

impl StatCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            cache: TtlCache::new(config),
        }
    }

    /// Key of a stat call, `None` when the result must not be cached.
    ///
    /// Only id based references with a known storage are cacheable; anything
    /// under the shares space depends on the caller and is never cached.
    pub fn key(user: &str, reference: &Reference, metadata_keys: &[String]) -> Option<String> {
        let id = reference.resource_id.as_ref()?;
        if id.storage_id.is_empty() || is_shares_id(id) {
            return None;
        }
        let mut key = format!(
            "uid:{user}!sid:{}!oid:{}!path:{}",
            id.space_ref_id(),
            id.opaque_id,
            reference.path
        );
        for k in metadata_keys {
            key.push_str("!mdk:");
            key.push_str(k);
        }
        Some(key)
    }

    pub fn pull(&self, key: &str) -> Option<StatResponse> {
        self.cache.pull(key)
    }

    /// Store a stat result unless it is a failure or still being processed
    pub fn push(&self, key: String, res: &StatResponse) {
        if res.status().code != Code::Ok {
            return;
        }
        match &res.info {
            Some(info) if !info.processing && !is_shares_id(&info.id) => {
                self.cache.push(key, res.clone())
            }
            _ => {}
        }
    }

    /// Forget every stat `user` made inside the space of `id`
    pub fn invalidate(&self, user: &str, id: &ResourceId) -> usize {
        let prefix = format!("uid:{user}!sid:");
        self.cache.remove_matching(|key| {
            key.strip_prefix(&prefix)
                .and_then(|rest| rest.split('!').next())
                .and_then(|sid| sid.rsplit('$').next())
                .is_some_and(|space| space == id.space_id)
        })
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Registry lookups by space id, per user
pub struct ProviderCache {
    cache: TtlCache<ListStorageProvidersResponse>,
}

impl ProviderCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            cache: TtlCache::new(config),
        }
    }

    /// Key of a registry lookup; only lookups purely by space id are cacheable
    pub fn key(user: &str, filters: &BTreeMap<String, String>) -> Option<String> {
        let by_id_only = filters.keys().all(|k| {
            matches!(
                k.as_str(),
                "mask"
                    | "storage_id"
                    | "space_id"
                    | "opaque_id"
                    | "unique"
                    | "unrestricted"
                    | "requester_idp"
                    | "requester_id"
            )
        });
        if !by_id_only {
            return None;
        }
        let space_id = filters.get("space_id").filter(|s| !s.is_empty())?;
        if space_id == SHARES_SPACE_ID {
            return None;
        }
        let storage_id = filters.get("storage_id").map(String::as_str).unwrap_or("");
        if storage_id == SHARES_STORAGE_ID {
            return None;
        }
        let unique = filters.get("unique").map(String::as_str) == Some("true");
        let unrestricted = filters.get("unrestricted").map(String::as_str) == Some("true");
        let mask = match filters.get("mask").filter(|m| !m.is_empty()) {
            Some(mask) => format!("{mask}|"),
            None => String::new(),
        };
        Some(format!(
            "{user}!{}{}{mask}{storage_id}${space_id}",
            if unique { "u:" } else { "" },
            if unrestricted { "a:" } else { "" }
        ))
    }

    pub fn pull(&self, key: &str) -> Option<ListStorageProvidersResponse> {
        self.cache.pull(key)
    }

    /// Store a lookup that found at least one real provider
    pub fn push(&self, key: String, res: &ListStorageProvidersResponse) {
        let cacheable = res.status().code == Code::Ok
            && !res.providers.is_empty()
            && res.providers.iter().all(|p| {
                p.spaces
                    .iter()
                    .all(|s| !s.root.storage_id.is_empty() && !is_shares_id(&s.root))
            });
        if cacheable {
            self.cache.push(key, res.clone());
        }
    }

    /// Forget the lookups of every user for the space `space_id`
    pub fn invalidate(&self, space_id: &str) -> usize {
        self.cache.remove_matching(|key| {
            key.rsplit('$')
                .next()
                .is_some_and(|space| space == space_id)
        })
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Space creation results per user, so repeated creations skip the backend
pub struct SpaceCreationCache {
    cache: TtlCache<CreateStorageSpaceResponse>,
}

impl SpaceCreationCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            cache: TtlCache::new(config),
        }
    }

    pub fn key(user: &str) -> Option<String> {
        if user.is_empty() {
            None
        } else {
            Some(format!("uid:{user}"))
        }
    }

    pub fn pull(&self, key: &str) -> Option<CreateStorageSpaceResponse> {
        self.cache.pull(key)
    }

    /// Store a creation that left the space in place
    pub fn push(&self, key: String, res: &CreateStorageSpaceResponse) {
        if matches!(res.status().code, Code::Ok | Code::AlreadyExists) {
            self.cache.push(key, res.clone());
        }
    }

    pub fn invalidate(&self, user: &str) {
        if let Some(key) = Self::key(user) {
            self.cache.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use spacegate_services::{ProviderInfo, ResourceInfo, Status};

    fn stat_ok(id: ResourceId) -> StatResponse {
        StatResponse {
            status: Status::ok(),
            info: Some(ResourceInfo {
                id,
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_stat_key_includes_metadata_keys() {
        let reference = Reference::relative(ResourceId::new("st", "sp", "sp"), "./docs");
        let key = StatCache::key("einstein", &reference, &["etag".into(), "size".into()]).unwrap();
        assert_eq!(key, "uid:einstein!sid:st$sp!oid:sp!path:./docs!mdk:etag!mdk:size");
    }

    #[test]
    fn test_stat_key_refuses_uncacheable_references() {
        assert!(StatCache::key("u", &Reference::from_path("/users/u"), &[]).is_none());
        let no_storage = Reference::from_id(ResourceId::new("", "sp", "n"));
        assert!(StatCache::key("u", &no_storage, &[]).is_none());
        let shares = Reference::from_id(ResourceId::space_root(SHARES_STORAGE_ID, SHARES_SPACE_ID));
        assert!(StatCache::key("u", &shares, &[]).is_none());
    }

    #[test]
    fn test_stat_push_skips_failures_and_processing() {
        let cache = StatCache::new(&CacheConfig::default());
        cache.push("a".into(), &StatResponse::from_status(Status::not_found("gone")));
        assert!(cache.pull("a").is_none());

        let mut processing = stat_ok(ResourceId::new("st", "sp", "n"));
        if let Some(info) = processing.info.as_mut() {
            info.processing = true;
        }
        cache.push("b".into(), &processing);
        assert!(cache.pull("b").is_none());

        cache.push("c".into(), &stat_ok(ResourceId::new("st", "sp", "n")));
        assert!(cache.pull("c").is_some());
    }

    #[test]
    fn test_stat_invalidation_is_per_user_and_space() {
        let cache = StatCache::new(&CacheConfig::default());
        let id = ResourceId::new("st", "sp", "sp");
        for (user, space) in [("u1", "sp"), ("u1", "other"), ("u2", "sp")] {
            let reference = Reference::relative(ResourceId::new("st", space, "n"), ".");
            let key = StatCache::key(user, &reference, &[]).unwrap();
            cache.push(key, &stat_ok(ResourceId::new("st", space, "n")));
        }
        assert_eq!(cache.invalidate("u1", &id), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_provider_key_and_invalidation() {
        let mut filters = BTreeMap::new();
        assert!(ProviderCache::key("u", &filters).is_none());
        filters.insert("storage_id".to_string(), "st".to_string());
        filters.insert("space_id".to_string(), "sp".to_string());
        let key = ProviderCache::key("u", &filters).unwrap();
        assert_eq!(key, "u!st$sp");
        let mut root_mask = filters.clone();
        root_mask.insert("mask".to_string(), "root".to_string());
        let mut any_mask = filters.clone();
        any_mask.insert("mask".to_string(), "*".to_string());
        let root_key = ProviderCache::key("u", &root_mask).unwrap();
        assert_eq!(root_key, "u!root|st$sp");
        assert_ne!(root_key, ProviderCache::key("u", &any_mask).unwrap());
        any_mask.insert("requester_id".to_string(), "u".to_string());
        assert_eq!(ProviderCache::key("u", &any_mask).unwrap(), "u!*|st$sp");
        any_mask.insert("unrestricted".to_string(), "true".to_string());
        assert_eq!(ProviderCache::key("u", &any_mask).unwrap(), "u!a:*|st$sp");
        let mut by_owner = filters.clone();
        by_owner.insert("owner_id".to_string(), "einstein".to_string());
        assert!(ProviderCache::key("u", &by_owner).is_none());

        let cache = ProviderCache::new(&CacheConfig::default());
        let res = ListStorageProvidersResponse {
            status: Status::ok(),
            providers: vec![ProviderInfo {
                address: "localhost:9142".into(),
                ..Default::default()
            }],
        };
        cache.push(key.clone(), &res);
        assert!(cache.pull(&key).is_some());
        assert_eq!(cache.invalidate("other"), 0);
        assert_eq!(cache.invalidate("sp"), 1);
        assert!(cache.pull(&key).is_none());
    }

    #[test]
    fn test_space_creation_cache_keeps_already_exists() {
        let cache = SpaceCreationCache::new(&CacheConfig::default());
        let key = SpaceCreationCache::key("einstein").unwrap();
        cache.push(key.clone(), &CreateStorageSpaceResponse::from_status(Status::internal("x")));
        assert!(cache.pull(&key).is_none());
        cache.push(
            key.clone(),
            &CreateStorageSpaceResponse::from_status(Status::already_exists("exists")),
        );
        assert!(cache.pull(&key).is_some());
        cache.invalidate("einstein");
        assert!(cache.pull(&key).is_none());
        assert!(SpaceCreationCache::key("").is_none());
    }

    proptest! {
        #[test]
        fn prop_shares_space_never_cacheable(opaque in "[a-z0-9-]{0,12}", path in "[a-z./]{0,16}") {
            let reference = Reference::relative(
                ResourceId::new(SHARES_STORAGE_ID, SHARES_SPACE_ID, opaque),
                path,
            );
            prop_assert!(StatCache::key("u", &reference, &[]).is_none());
        }

        #[test]
        fn prop_stat_key_distinguishes_users(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
            prop_assume!(a != b);
            let reference = Reference::from_id(ResourceId::new("st", "sp", "n"));
            prop_assert_ne!(
                StatCache::key(&a, &reference, &[]),
                StatCache::key(&b, &reference, &[])
            );
        }
    }
}
