//! Storage space lifecycle

use crate::cache::SpaceCreationCache;
use crate::context::CallContext;
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use spacegate_services::*;
use std::collections::BTreeMap;
use tracing::instrument;

fn space_filters(filters: &[SpaceFilter]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    out.insert("mask".to_string(), "*".to_string());
    for filter in filters {
        match filter {
            SpaceFilter::Id(id) => {
                out.insert("storage_id".to_string(), id.storage_id.clone());
                out.insert("space_id".to_string(), id.space_id.clone());
                out.insert("opaque_id".to_string(), id.opaque_id.clone());
            }
            SpaceFilter::Owner(owner) => {
                out.insert("owner_idp".to_string(), owner.idp.clone());
                out.insert("owner_id".to_string(), owner.opaque_id.clone());
            }
            SpaceFilter::SpaceType(space_type) => {
                out.insert("space_type".to_string(), space_type.to_string());
            }
            SpaceFilter::User(user) => {
                out.insert("user_idp".to_string(), user.idp.clone());
                out.insert("user_id".to_string(), user.opaque_id.clone());
            }
        }
    }
    out
}

/// Scope a registry listing to the spaces `user` owns or was granted
fn restrict_to(filters: &mut BTreeMap<String, String>, user: &UserId) {
    filters.insert("requester_idp".to_string(), user.idp.clone());
    filters.insert("requester_id".to_string(), user.opaque_id.clone());
}

impl Gateway {
    /// Create a space on the provider the registry picks for it
    #[instrument(skip(self, ctx, req), fields(space_type = %req.space_type, name = %req.name))]
    pub async fn create_storage_space(
        &self,
        ctx: &CallContext,
        req: CreateStorageSpaceRequest,
    ) -> Result<CreateStorageSpaceResponse> {
        let space = StorageSpace {
            id: req.space_id.clone().unwrap_or_default(),
            space_type: req.space_type,
            name: req.name.clone(),
            owner: req.owner.clone(),
            root: ResourceId::default(),
            quota: req.quota,
            path: None,
            trashed: false,
            mtime: None,
        };
        let res = self
            .registry(ctx)?
            .get_storage_providers(GetStorageProvidersRequest { space })
            .await
            .map_err(GatewayError::service("GetStorageProviders"))?;
        if !res.status.is_ok() {
            return Ok(CreateStorageSpaceResponse::from_status(res.status));
        }
        let Some(info) = res.providers.first() else {
            return Ok(CreateStorageSpaceResponse::from_status(Status::not_found(
                "no storage providers found for space",
            )));
        };
        self.storage_provider(ctx, &info.address)?
            .create_storage_space(req)
            .await
            .map_err(GatewayError::service("CreateStorageSpace"))
    }

    /// Create the caller's personal space; its id is the caller's user id
    #[instrument(skip(self, ctx, req))]
    pub async fn create_home(
        &self,
        ctx: &CallContext,
        req: CreateHomeRequest,
    ) -> Result<CreateStorageSpaceResponse> {
        let user = ctx.user.clone().ok_or_else(|| {
            GatewayError::PermissionDenied("can't create home for anonymous user".to_string())
        })?;
        let key = SpaceCreationCache::key(&user.id.opaque_id);
        if let Some(key) = &key {
            if let Some(res) = self.caches.create_home.pull(key) {
                return Ok(res);
            }
        }
        let res = self
            .create_storage_space(
                ctx,
                CreateStorageSpaceRequest {
                    space_id: Some(user.id.opaque_id.clone()),
                    name: user.display_name.clone(),
                    owner: Some(user),
                    space_type: SpaceType::Personal,
                    quota: req.quota,
                },
            )
            .await?;
        if let Some(key) = key {
            self.caches.create_home.push(key, &res);
        }
        Ok(res)
    }

    /// Mount path of the caller's personal space
    #[instrument(skip(self, ctx))]
    pub async fn get_home(&self, ctx: &CallContext) -> Result<GetHomeResponse> {
        let user = ctx
            .user_id()
            .ok_or_else(|| GatewayError::Unauthenticated("missing user".to_string()))?;
        let mut filters = space_filters(&[
            SpaceFilter::Owner(user.clone()),
            SpaceFilter::SpaceType(SpaceType::Personal),
        ]);
        restrict_to(&mut filters, user);
        let res = self
            .registry(ctx)?
            .list_storage_providers(ListStorageProvidersRequest { filters })
            .await
            .map_err(GatewayError::service("ListStorageProviders"))?;
        if !res.status.is_ok() {
            return Ok(GetHomeResponse::from_status(res.status));
        }
        let path = res
            .providers
            .iter()
            .flat_map(|p| p.spaces.iter().map(move |s| s.path.clone().unwrap_or_else(|| p.provider_path.clone())))
            .next();
        match path {
            Some(path) => Ok(GetHomeResponse {
                status: Status::ok(),
                path,
            }),
            None => Ok(GetHomeResponse::from_status(Status::not_found(
                "personal space not found",
            ))),
        }
    }

    /// Spaces of every provider matching the filters
    #[instrument(skip(self, ctx, req))]
    pub async fn list_storage_spaces(
        &self,
        ctx: &CallContext,
        req: ListStorageSpacesRequest,
    ) -> Result<ListStorageSpacesResponse> {
        let mut filters = space_filters(&req.filters);
        if req.unrestricted {
            filters.insert("unrestricted".to_string(), "true".to_string());
        } else {
            // anonymous callers can reach no space
            let Some(user) = ctx.user_id() else {
                return Ok(ListStorageSpacesResponse {
                    status: Status::ok(),
                    spaces: vec![],
                });
            };
            restrict_to(&mut filters, user);
        }
        let res = self
            .registry(ctx)?
            .list_storage_providers(ListStorageProvidersRequest { filters })
            .await
            .map_err(GatewayError::service("ListStorageProviders"))?;
        match res.status.code {
            Code::Ok => {}
            Code::NotFound => {
                return Ok(ListStorageSpacesResponse {
                    status: Status::ok(),
                    spaces: vec![],
                })
            }
            _ => return Ok(ListStorageSpacesResponse::from_status(res.status)),
        }
        let spaces = res
            .providers
            .into_iter()
            .flat_map(|p| p.spaces)
            .collect();
        Ok(ListStorageSpacesResponse {
            status: Status::ok(),
            spaces,
        })
    }

    #[instrument(skip(self, ctx, req), fields(space = %req.id))]
    pub async fn update_storage_space(
        &self,
        ctx: &CallContext,
        req: UpdateStorageSpaceRequest,
    ) -> Result<UpdateStorageSpaceResponse> {
        let resolved = self
            .find_and_unwrap(ctx, &Reference::from_id(req.id.clone()))
            .await?;
        let root = req.id.clone();
        let res = resolved
            .provider
            .update_storage_space(req)
            .await
            .map_err(GatewayError::service("UpdateStorageSpace"))?;
        if res.status.is_ok() {
            self.invalidate_space(ctx, &root);
        }
        Ok(res)
    }

    /// Delete a space; with `purge` also remove every share rooted in it
    #[instrument(skip(self, ctx, req), fields(space = %req.id, purge = req.purge))]
    pub async fn delete_storage_space(
        &self,
        ctx: &CallContext,
        req: DeleteStorageSpaceRequest,
    ) -> Result<StatusResponse> {
        let resolved = self
            .find_and_unwrap(ctx, &Reference::from_id(req.id.clone()))
            .await?;
        let owner = resolved
            .info
            .spaces
            .iter()
            .find(|s| s.root.space_id == req.id.space_id && s.space_type == SpaceType::Personal)
            .and_then(|s| s.owner.as_ref())
            .map(|o| o.id.opaque_id.clone());

        let res = resolved
            .provider
            .delete_storage_space(req.clone())
            .await
            .map_err(GatewayError::service("DeleteStorageSpace"))?;
        self.invalidate_space(ctx, &req.id);
        if let Some(owner) = owner {
            self.caches.create_home.invalidate(&owner);
            self.caches.create_personal_space.invalidate(&owner);
        }

        if !res.status.is_ok() || !req.purge {
            return Ok(res);
        }
        self.purge_space_shares(&req.id.space_id).await?;
        Ok(StatusResponse::ok())
    }

    /// Best-effort removal of the shares and link shares of a deleted space
    async fn purge_space_shares(&self, space_id: &str) -> Result<()> {
        let filters = vec![ShareFilter::SpaceId(space_id.to_string())];

        let shares = self.share_manager()?;
        let listed = shares
            .list_shares(ListSharesRequest {
                filters: filters.clone(),
            })
            .await
            .map_err(GatewayError::service("ListShares"))?;
        if !listed.status.is_ok() {
            tracing::error!(status = %listed.status, "listing shares of deleted space failed");
            return Err(GatewayError::Internal(
                "gateway could not delete shares of StorageSpace".to_string(),
            ));
        }
        for share in listed.shares {
            let removed = shares
                .remove_share(ShareReferenceRequest {
                    reference: ShareReference::Id(share.id.clone()),
                })
                .await;
            match removed {
                Ok(res) if res.status.is_ok() => {}
                Ok(res) => {
                    tracing::warn!(share = %share.id, status = %res.status, "could not remove share of deleted space")
                }
                Err(err) => {
                    tracing::warn!(share = %share.id, error = %err, "could not remove share of deleted space")
                }
            }
        }

        let public_shares = self.public_share_manager()?;
        let listed = public_shares
            .list_public_shares(ListSharesRequest { filters })
            .await
            .map_err(GatewayError::service("ListPublicShares"))?;
        if !listed.status.is_ok() {
            tracing::error!(status = %listed.status, "listing link shares of deleted space failed");
            return Err(GatewayError::Internal(
                "gateway could not delete link shares of StorageSpace".to_string(),
            ));
        }
        for share in listed.shares {
            let removed = public_shares
                .remove_public_share(IdRequest::new(share.id.clone()))
                .await;
            match removed {
                Ok(res) if res.status.is_ok() => {}
                Ok(res) => {
                    tracing::warn!(share = %share.id, status = %res.status, "could not remove link share of deleted space")
                }
                Err(err) => {
                    tracing::warn!(share = %share.id, error = %err, "could not remove link share of deleted space")
                }
            }
        }
        Ok(())
    }

    /// The personal space of `user`, if any; more than one is a consistency bug
    async fn find_personal_space(
        &self,
        ctx: &CallContext,
        user: &UserId,
    ) -> Result<Option<StorageSpace>> {
        let res = self
            .list_storage_spaces(
                ctx,
                ListStorageSpacesRequest {
                    filters: vec![
                        SpaceFilter::Owner(user.clone()),
                        SpaceFilter::SpaceType(SpaceType::Personal),
                    ],
                    unrestricted: true,
                    requester: None,
                },
            )
            .await?;
        if !res.status.is_ok() {
            return Err(GatewayError::from_status(&res.status));
        }
        let mut spaces = res.spaces;
        match spaces.len() {
            0 | 1 => Ok(spaces.pop()),
            n => Err(GatewayError::Internal(format!(
                "found {n} personal spaces for user {}",
                user.opaque_id
            ))),
        }
    }

    /// Trash the personal space of a user; a missing or trashed space is fine
    #[instrument(skip(self, ctx, req), fields(user = %req.user_id.opaque_id))]
    pub async fn disable_personal_space(
        &self,
        ctx: &CallContext,
        req: PersonalSpaceRequest,
    ) -> Result<StatusResponse> {
        match self.find_personal_space(ctx, &req.user_id).await? {
            Some(space) if !space.trashed => {
                self.delete_storage_space(
                    ctx,
                    DeleteStorageSpaceRequest {
                        id: space.root,
                        purge: false,
                    },
                )
                .await
            }
            _ => Ok(StatusResponse::ok()),
        }
    }

    /// Bring a trashed personal space back; anything else is left alone
    #[instrument(skip(self, ctx, req), fields(user = %req.user_id.opaque_id))]
    pub async fn restore_personal_space(
        &self,
        ctx: &CallContext,
        req: PersonalSpaceRequest,
    ) -> Result<StatusResponse> {
        match self.find_personal_space(ctx, &req.user_id).await? {
            Some(space) if space.trashed => {
                let res = self
                    .update_storage_space(
                        ctx,
                        UpdateStorageSpaceRequest {
                            id: space.root,
                            restore: true,
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(StatusResponse { status: res.status })
            }
            _ => Ok(StatusResponse::ok()),
        }
    }
}
