//! In-memory storage registry over in-process providers

use super::{respond, MemoryStorageProvider};
use crate::*;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Spaces registry answering from the live state of its providers
#[derive(Default)]
pub struct MemoryStorageRegistry {
    providers: RwLock<Vec<(String, Arc<MemoryStorageProvider>)>>,
}

impl MemoryStorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under the address the gateway will dial
    pub fn register(&self, address: impl Into<String>, provider: Arc<MemoryStorageProvider>) {
        self.providers.write().push((address.into(), provider));
    }

    fn providers(&self) -> Vec<(String, Arc<MemoryStorageProvider>)> {
        self.providers.read().clone()
    }
}

fn filter<'a>(filters: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    filters
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Translate the free-form filter map into space filters
fn space_filters(
    filters: &BTreeMap<String, String>,
) -> std::result::Result<Vec<SpaceFilter>, Status> {
    let mut out = Vec::new();
    if let Some(space_id) = filter(filters, "space_id") {
        out.push(SpaceFilter::Id(ResourceId::new(
            filter(filters, "storage_id").unwrap_or_default(),
            space_id,
            "",
        )));
    }
    if let Some(owner) = filter(filters, "owner_id") {
        out.push(SpaceFilter::Owner(UserId::new(
            filter(filters, "owner_idp").unwrap_or_default(),
            owner,
        )));
    }
    if let Some(space_type) = filter(filters, "space_type") {
        let space_type = SpaceType::parse(space_type)
            .ok_or_else(|| Status::invalid_argument(format!("unknown space type {space_type}")))?;
        out.push(SpaceFilter::SpaceType(space_type));
    }
    if let Some(user) = filter(filters, "user_id") {
        out.push(SpaceFilter::User(UserId::new(
            filter(filters, "user_idp").unwrap_or_default(),
            user,
        )));
    }
    Ok(out)
}

fn mount_matches(mount: &str, path: &str, unique: bool) -> bool {
    let mount = mount.trim_end_matches('/');
    let contains = |outer: &str, inner: &str| {
        inner == outer || outer.is_empty() || inner.starts_with(&format!("{outer}/"))
    };
    contains(mount, path) || (!unique && contains(path.trim_end_matches('/'), mount))
}

#[async_trait::async_trait]
impl StorageRegistry for MemoryStorageRegistry {
    async fn list_storage_providers(
        &self,
        req: ListStorageProvidersRequest,
    ) -> Result<ListStorageProvidersResponse> {
        let filters = match space_filters(&req.filters) {
            Ok(filters) => filters,
            Err(status) => return respond(Err(status)),
        };
        let unique = filter(&req.filters, "unique") == Some("true");
        let path = filter(&req.filters, "path");
        // lookups naming no requester resolve against every space
        let requester = filter(&req.filters, "requester_id").map(|id| {
            UserId::new(filter(&req.filters, "requester_idp").unwrap_or_default(), id)
        });
        let unrestricted =
            requester.is_none() || filter(&req.filters, "unrestricted") == Some("true");

        let mut providers = Vec::new();
        for (address, provider) in self.providers() {
            let res = provider
                .list_storage_spaces(ListStorageSpacesRequest {
                    filters: filters.clone(),
                    unrestricted,
                    requester: requester.clone(),
                })
                .await?;
            let spaces: Vec<StorageSpace> = res
                .spaces
                .into_iter()
                .filter(|s| s.root.space_id != SHARES_SPACE_ID)
                .filter(|s| match (path, s.path.as_deref()) {
                    (Some(path), Some(mount)) => mount_matches(mount, path, unique),
                    (Some(_), None) => false,
                    (None, _) => true,
                })
                .collect();
            if !spaces.is_empty() {
                providers.push(ProviderInfo {
                    address,
                    provider_path: "/".to_string(),
                    provider_id: provider.storage_id().to_string(),
                    spaces,
                });
            }
        }

        if unique {
            // keep only the most specific mount
            let best = providers
                .iter()
                .flat_map(|p| p.spaces.iter().map(move |s| (p, s)))
                .max_by_key(|(_, s)| s.path.as_deref().map(str::len).unwrap_or(0))
                .map(|(p, s)| ProviderInfo {
                    spaces: vec![s.clone()],
                    ..p.clone()
                });
            providers = best.into_iter().collect();
        }

        if providers.is_empty() {
            return respond(Err(Status::not_found("no storage provider found")));
        }
        Ok(ListStorageProvidersResponse {
            status: Status::ok(),
            providers,
        })
    }

    async fn get_storage_providers(
        &self,
        req: GetStorageProvidersRequest,
    ) -> Result<GetStorageProvidersResponse> {
        let found = self
            .providers()
            .into_iter()
            .find(|(_, p)| p.hosts(req.space.space_type))
            .map(|(address, provider)| ProviderInfo {
                address,
                provider_path: "/".to_string(),
                provider_id: provider.storage_id().to_string(),
                spaces: vec![],
            });
        match found {
            Some(provider) => Ok(GetStorageProvidersResponse {
                status: Status::ok(),
                providers: vec![provider],
            }),
            None => respond(Err(Status::not_found(format!(
                "no provider hosts {} spaces",
                req.space.space_type
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (MemoryStorageRegistry, StorageSpace) {
        let provider = Arc::new(MemoryStorageProvider::new("storage-1", "http://data"));
        let space = provider
            .create_storage_space(CreateStorageSpaceRequest {
                owner: Some(User {
                    id: UserId::new("idp", "einstein"),
                    username: "einstein".into(),
                    ..Default::default()
                }),
                space_type: SpaceType::Personal,
                name: "Albert Einstein".into(),
                quota: None,
                space_id: Some("einstein".into()),
            })
            .await
            .unwrap()
            .space
            .unwrap();
        provider
            .create_storage_space(CreateStorageSpaceRequest {
                owner: None,
                space_type: SpaceType::Project,
                name: "physics".into(),
                quota: None,
                space_id: None,
            })
            .await
            .unwrap();
        let registry = MemoryStorageRegistry::new();
        registry.register("localhost:9142", provider);
        (registry, space)
    }

    fn filters(pairs: &[(&str, &str)]) -> ListStorageProvidersRequest {
        ListStorageProvidersRequest {
            filters: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_mount_matches() {
        assert!(mount_matches("/users/einstein", "/users/einstein/docs", true));
        assert!(mount_matches("/users/einstein", "/users/einstein", true));
        assert!(!mount_matches("/users/einstein", "/users/einsteinium", true));
        assert!(mount_matches("/users/einstein", "/users", false));
        assert!(!mount_matches("/users/einstein", "/users", true));
    }

    #[tokio::test]
    async fn test_requester_scopes_listing() {
        let (registry, space) = setup().await;
        let res = registry
            .list_storage_providers(filters(&[("requester_id", "einstein")]))
            .await
            .unwrap();
        let spaces: Vec<_> = res.providers.iter().flat_map(|p| &p.spaces).collect();
        assert_eq!(spaces.len(), 1);
        assert_eq!(spaces[0].root, space.root);

        let res = registry
            .list_storage_providers(filters(&[("requester_id", "marie")]))
            .await
            .unwrap();
        assert!(res.providers.is_empty());

        let res = registry
            .list_storage_providers(filters(&[("requester_id", "marie"), ("unrestricted", "true")]))
            .await
            .unwrap();
        assert_eq!(res.providers[0].spaces.len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_by_path() {
        let (registry, space) = setup().await;
        let res = registry
            .list_storage_providers(filters(&[("path", "/users/einstein/docs"), ("unique", "true")]))
            .await
            .unwrap();
        assert!(res.status.is_ok());
        assert_eq!(res.providers.len(), 1);
        assert_eq!(res.providers[0].address, "localhost:9142");
        assert_eq!(res.providers[0].spaces, vec![space]);
    }

    #[tokio::test]
    async fn test_lookup_by_space_id() {
        let (registry, space) = setup().await;
        let res = registry
            .list_storage_providers(filters(&[
                ("storage_id", "storage-1"),
                ("space_id", "einstein"),
                ("opaque_id", "some-file"),
            ]))
            .await
            .unwrap();
        assert_eq!(res.providers[0].spaces[0].root, space.root);
    }

    #[tokio::test]
    async fn test_unknown_space_is_not_found() {
        let (registry, _) = setup().await;
        let res = registry
            .list_storage_providers(filters(&[("space_id", "nobody")]))
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::NotFound);
        assert!(res.providers.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_space_type() {
        let (registry, _) = setup().await;
        let res = registry
            .list_storage_providers(filters(&[("space_type", "galaxy")]))
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_filter_by_owner_and_type() {
        let (registry, _) = setup().await;
        let res = registry
            .list_storage_providers(filters(&[("owner_id", "einstein"), ("space_type", "personal")]))
            .await
            .unwrap();
        assert_eq!(res.providers[0].spaces.len(), 1);

        let res = registry
            .list_storage_providers(filters(&[("space_type", "project")]))
            .await
            .unwrap();
        assert_eq!(res.providers[0].spaces[0].name, "physics");
    }
}
