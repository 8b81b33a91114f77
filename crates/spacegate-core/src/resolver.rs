//! Provider resolution
//!
//! Every storage call starts by asking the registry which provider serves the
//! reference, then rewrites the reference relative to the root of the matched
//! space before forwarding it.

use crate::context::CallContext;
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use spacegate_services::{
    ListStorageProvidersRequest, ProviderInfo, Reference, ResourceId, StorageProvider,
    StorageSpace,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

/// A reference routed to its provider
pub struct Resolved {
    pub provider: Arc<dyn StorageProvider>,
    pub info: ProviderInfo,
    /// Reference relative to the root of the matched space
    pub reference: Reference,
}

impl Resolved {
    pub fn address(&self) -> &str {
        &self.info.address
    }
}

impl Gateway {
    /// Providers the registry reports for `reference`
    #[instrument(skip(self, ctx), fields(reference = %reference))]
    pub async fn find_providers(
        &self,
        ctx: &CallContext,
        reference: &Reference,
        unique: bool,
    ) -> Result<Vec<ProviderInfo>> {
        let filters = registry_filters(reference, unique)?;
        let res = self
            .registry(ctx)?
            .list_storage_providers(ListStorageProvidersRequest { filters })
            .await
            .map_err(GatewayError::service("ListStorageProviders"))?;

        if !res.status.is_ok() {
            let err = GatewayError::from_registry(&res.status);
            if err.is_expected() {
                tracing::debug!(status = %res.status, "no provider for reference");
            } else {
                tracing::error!(status = %res.status, "registry lookup failed");
            }
            return Err(err);
        }
        if res.providers.is_empty() {
            return Err(GatewayError::NotFound(format!(
                "no storage provider found for {reference}"
            )));
        }
        Ok(res.providers)
    }

    /// Route `reference` and rewrite it relative to its space root
    pub async fn find_and_unwrap(&self, ctx: &CallContext, reference: &Reference) -> Result<Resolved> {
        self.resolve(ctx, reference, false).await
    }

    /// Like [`Gateway::find_and_unwrap`], asking the registry for exactly one match
    pub async fn find_and_unwrap_unique(
        &self,
        ctx: &CallContext,
        reference: &Reference,
    ) -> Result<Resolved> {
        self.resolve(ctx, reference, true).await
    }

    async fn resolve(&self, ctx: &CallContext, reference: &Reference, unique: bool) -> Result<Resolved> {
        let providers = self.find_providers(ctx, reference, unique).await?;
        let (info, space) = select_space(&providers, reference).ok_or_else(|| {
            GatewayError::NotFound(format!("no storage provider found for {reference}"))
        })?;
        let mount = space
            .and_then(|s| s.path.as_deref())
            .unwrap_or(&info.provider_path);
        let unwrapped = unwrap(reference, mount, space.map(|s| &s.root));
        tracing::trace!(address = %info.address, reference = %unwrapped, "reference resolved");
        Ok(Resolved {
            provider: self.storage_provider(ctx, &info.address)?,
            info: info.clone(),
            reference: unwrapped,
        })
    }
}

/// Filter map sent to the registry for `reference`
pub fn registry_filters(reference: &Reference, unique: bool) -> Result<BTreeMap<String, String>> {
    let mut filters = BTreeMap::new();
    filters.insert("mask".to_string(), "root".to_string());
    match &reference.resource_id {
        Some(id) if !id.space_id.is_empty() => {
            let opaque_id = if id.opaque_id.is_empty() {
                &id.space_id
            } else {
                &id.opaque_id
            };
            filters.insert("storage_id".to_string(), id.storage_id.clone());
            filters.insert("space_id".to_string(), id.space_id.clone());
            filters.insert("opaque_id".to_string(), opaque_id.clone());
        }
        _ if reference.path.starts_with('/') => {
            filters.insert("path".to_string(), reference.path.clone());
        }
        _ => {
            return Err(GatewayError::BadRequest(
                "invalid reference, at least path or id must be set".to_string(),
            ))
        }
    }
    if unique {
        filters.insert("unique".to_string(), "true".to_string());
    }
    Ok(filters)
}

fn mount_of<'a>(info: &'a ProviderInfo, space: &'a StorageSpace) -> &'a str {
    space.path.as_deref().unwrap_or(&info.provider_path)
}

fn mount_contains(mount: &str, path: &str) -> bool {
    let mount = mount.trim_end_matches('/');
    mount.is_empty() || path == mount || path.starts_with(&format!("{mount}/"))
}

/// The space serving `reference` among the registry answer.
///
/// Id references pick the space with the same space id, path references the
/// most specific mount containing the path. Falls back to the first space.
pub fn select_space<'a>(
    providers: &'a [ProviderInfo],
    reference: &Reference,
) -> Option<(&'a ProviderInfo, Option<&'a StorageSpace>)> {
    let spaces = || {
        providers
            .iter()
            .flat_map(|p| p.spaces.iter().map(move |s| (p, s)))
    };
    let matched = match &reference.resource_id {
        Some(id) => spaces().find(|(_, s)| s.root.space_id == id.space_id),
        None => spaces()
            .filter(|(p, s)| mount_contains(mount_of(p, s), &reference.path))
            .max_by_key(|(p, s)| mount_of(p, s).len()),
    };
    match matched.or_else(|| spaces().next()) {
        Some((p, s)) => Some((p, Some(s))),
        None => providers.first().map(|p| (p, None)),
    }
}

/// Rewrite `reference` relative to a space mounted at `mount_path`.
///
/// Absolute paths lose the mount prefix and, when the space root is known,
/// become relative to it. Id references keep their id with an empty opaque id
/// meaning the space root.
pub fn unwrap(reference: &Reference, mount_path: &str, root: Option<&ResourceId>) -> Reference {
    if reference.is_absolute_path() {
        let mount = mount_path.trim_end_matches('/');
        let relative = reference
            .path
            .strip_prefix(mount)
            .unwrap_or(&reference.path);
        return match root {
            Some(root) => Reference::relative(root.clone(), make_relative_path(relative)),
            None => Reference::from_path(clean_path(relative)),
        };
    }
    let mut unwrapped = reference.clone();
    if let Some(id) = unwrapped.resource_id.as_mut() {
        if id.opaque_id.is_empty() {
            id.opaque_id = id.space_id.clone();
        }
    }
    unwrapped
}

/// `.` for the root, `./a/b` below it
pub fn make_relative_path(path: &str) -> String {
    let cleaned = clean_path(path);
    if cleaned == "/" {
        ".".to_string()
    } else {
        format!(".{cleaned}")
    }
}

/// Absolute, normalized form of `path`
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }
    format!("/{}", parts.join("/"))
}
