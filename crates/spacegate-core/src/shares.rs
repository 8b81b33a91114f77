//! Shares and the storage grants backing them
//!
//! A share lives in the share manager's ledger; when committing to storage is
//! enabled the provider holding the resource also gets a matching grant. The two
//! writes are not transactional: a failed grant commit leaves the ledger entry in
//! place and is reported to the caller.
//!
//! Sharing the root of a space is different. It is a space membership and only
//! exists as a grant carrying the `space_grant` marker.

use crate::context::CallContext;
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use chrono::Utc;
use spacegate_services::*;
use tracing::instrument;

/// Grant-commit outcome that should not fail the share operation
fn tolerated(status: &Status) -> bool {
    match status.code {
        Code::Ok => true,
        Code::Unimplemented => {
            tracing::debug!(status = %status, "storage has no grants, not committing share");
            true
        }
        _ => false,
    }
}

impl Gateway {
    /// Add a grant for `grantee`, or deny access when `permissions` is empty
    pub(crate) async fn commit_grant(
        &self,
        ctx: &CallContext,
        resource_id: &ResourceId,
        grantee: &Grantee,
        permissions: ResourcePermissions,
        space_grant: bool,
    ) -> Result<StatusResponse> {
        let reference = Reference::from_id(resource_id.clone());
        if permissions.is_empty() {
            return self
                .deny_grant(
                    ctx,
                    DenyGrantRequest {
                        reference,
                        grantee: grantee.clone(),
                        space_grant,
                    },
                )
                .await;
        }
        let grant = Grant {
            creator: ctx.user_id().cloned(),
            ..Grant::new(grantee.clone(), permissions)
        };
        self.add_grant(
            ctx,
            GrantRequest {
                reference,
                grant,
                space_grant,
            },
        )
        .await
    }

    /// Drop the grant of `grantee` on `resource_id`
    pub(crate) async fn revoke_grant(
        &self,
        ctx: &CallContext,
        resource_id: &ResourceId,
        grantee: &Grantee,
        permissions: ResourcePermissions,
        space_grant: bool,
    ) -> Result<StatusResponse> {
        self.remove_grant(
            ctx,
            GrantRequest {
                reference: Reference::from_id(resource_id.clone()),
                grant: Grant::new(grantee.clone(), permissions),
                space_grant,
            },
        )
        .await
    }

    /// Share a resource with a user or group
    #[instrument(skip(self, ctx, req), fields(resource = %req.resource_info.id, grantee = %req.grant.grantee))]
    pub async fn create_share(
        &self,
        ctx: &CallContext,
        mut req: CreateShareRequest,
    ) -> Result<ShareResponse> {
        let user = ctx
            .user_id()
            .cloned()
            .ok_or_else(|| GatewayError::Unauthenticated("missing user".to_string()))?;
        if req.resource_info.id.is_space_root() {
            return self.share_space(ctx, req, user).await;
        }

        req.creator = Some(user);
        let res = self
            .share_manager()?
            .create_share(req)
            .await
            .map_err(GatewayError::service("CreateShare"))?;
        let Some(share) = res.share.as_ref().filter(|_| res.status.is_ok()) else {
            return Ok(res);
        };

        if self.config.commit_share_to_storage_grant {
            let granted = self
                .commit_grant(ctx, &share.resource_id, &share.grantee, share.permissions, false)
                .await?;
            if !tolerated(&granted.status) {
                tracing::warn!(
                    share = %share.id,
                    status = %granted.status,
                    "grant commit failed, share stays in the ledger"
                );
                return Ok(ShareResponse {
                    status: granted.status,
                    share: res.share,
                });
            }
        }
        self.invalidate_stat(ctx, Some(&share.resource_id));
        Ok(res)
    }

    /// Space membership: a grant on the space root, no ledger entry
    async fn share_space(
        &self,
        ctx: &CallContext,
        req: CreateShareRequest,
        creator: UserId,
    ) -> Result<ShareResponse> {
        let id = &req.resource_info.id;
        let root = ResourceId::space_root(id.storage_id.clone(), id.space_id.clone());
        let granted = self
            .commit_grant(ctx, &root, &req.grant.grantee, req.grant.permissions, true)
            .await?;
        if !granted.status.is_ok() {
            return Ok(ShareResponse::from_status(granted.status));
        }
        self.invalidate_space(ctx, &root);

        let now = Utc::now();
        let share = Share {
            id: format!("{}:{}", root.space_ref_id(), req.grant.grantee.opaque_id()),
            resource_id: root,
            grantee: req.grant.grantee,
            permissions: req.grant.permissions,
            owner: req
                .resource_info
                .owner
                .unwrap_or_else(|| creator.clone()),
            creator,
            ctime: Some(now),
            mtime: Some(now),
        };
        Ok(ShareResponse {
            status: Status::ok(),
            share: Some(share),
        })
    }

    /// Remove a share from the ledger and its grant from storage
    #[instrument(skip(self, ctx, req), fields(share = %req.reference))]
    pub async fn remove_share(
        &self,
        ctx: &CallContext,
        req: ShareReferenceRequest,
    ) -> Result<StatusResponse> {
        if let ShareReference::Key(key) = &req.reference {
            if key.resource_id.is_space_root() {
                return self.unshare_space(ctx, key).await;
            }
        }

        let shares = self.share_manager()?;
        let found = shares
            .get_share(req.clone())
            .await
            .map_err(GatewayError::service("GetShare"))?;
        let Some(share) = found.share.filter(|_| found.status.is_ok()) else {
            return Ok(StatusResponse {
                status: found.status,
            });
        };

        let removed = shares
            .remove_share(ShareReferenceRequest {
                reference: ShareReference::Id(share.id.clone()),
            })
            .await
            .map_err(GatewayError::service("RemoveShare"))?;
        if !removed.status.is_ok() {
            return Ok(removed);
        }

        // reshares do not own the grantee's view of the original share
        if let Some(actor) = ctx.user_id() {
            let owns = actor.opaque_id == share.owner.opaque_id
                && actor.opaque_id == share.creator.opaque_id;
            if let (true, Grantee::User { id }) = (owns, &share.grantee) {
                self.caches.stat.invalidate(&id.opaque_id, &share.resource_id);
            }
        }

        if self.config.commit_share_to_storage_grant {
            let revoked = self
                .revoke_grant(ctx, &share.resource_id, &share.grantee, share.permissions, false)
                .await?;
            if !tolerated(&revoked.status) {
                tracing::warn!(
                    share = %share.id,
                    status = %revoked.status,
                    "share removed from the ledger but its grant remains"
                );
                return Ok(revoked);
            }
        }
        self.invalidate_stat(ctx, Some(&share.resource_id));
        Ok(StatusResponse::ok())
    }

    /// Remove exactly the grant a space share created
    async fn unshare_space(&self, ctx: &CallContext, key: &ShareKey) -> Result<StatusResponse> {
        let root = ResourceId::space_root(
            key.resource_id.storage_id.clone(),
            key.resource_id.space_id.clone(),
        );
        let listed = self
            .list_grants(ctx, ReferenceRequest::new(Reference::from_id(root.clone())))
            .await?;
        if !listed.status.is_ok() {
            return Ok(StatusResponse {
                status: listed.status,
            });
        }
        // stored grants may lack idp and user type
        let Some(grant) = listed
            .grants
            .into_iter()
            .find(|g| g.grantee.same_subject(&key.grantee))
        else {
            return Ok(StatusResponse {
                status: Status::not_found(format!(
                    "no grant for {} on space {}",
                    key.grantee, root
                )),
            });
        };
        let res = self
            .revoke_grant(ctx, &root, &grant.grantee, grant.permissions, true)
            .await?;
        if res.status.is_ok() {
            self.invalidate_space(ctx, &root);
        }
        Ok(res)
    }

    /// Change the permissions of a share and of its grant
    #[instrument(skip(self, ctx, req), fields(share = %req.reference))]
    pub async fn update_share(
        &self,
        ctx: &CallContext,
        req: UpdateShareRequest,
    ) -> Result<ShareResponse> {
        let res = self
            .share_manager()?
            .update_share(req)
            .await
            .map_err(GatewayError::service("UpdateShare"))?;
        let Some(share) = res.share.as_ref().filter(|_| res.status.is_ok()) else {
            return Ok(res);
        };
        if !self.config.commit_share_to_storage_grant {
            return Ok(res);
        }

        let updated = if share.permissions.is_empty() {
            self.commit_grant(ctx, &share.resource_id, &share.grantee, share.permissions, false)
                .await?
        } else {
            self.update_grant(
                ctx,
                GrantRequest {
                    reference: Reference::from_id(share.resource_id.clone()),
                    grant: Grant::new(share.grantee.clone(), share.permissions),
                    space_grant: false,
                },
            )
            .await?
        };
        if !tolerated(&updated.status) {
            tracing::warn!(
                share = %share.id,
                status = %updated.status,
                "share updated in the ledger but not in storage"
            );
            return Ok(ShareResponse {
                status: updated.status,
                share: res.share,
            });
        }
        Ok(res)
    }

    #[instrument(skip(self, _ctx, req), fields(share = %req.reference))]
    pub async fn get_share(
        &self,
        _ctx: &CallContext,
        req: ShareReferenceRequest,
    ) -> Result<ShareResponse> {
        self.share_manager()?
            .get_share(req)
            .await
            .map_err(GatewayError::service("GetShare"))
    }

    #[instrument(skip(self, _ctx, req))]
    pub async fn list_shares(
        &self,
        _ctx: &CallContext,
        req: ListSharesRequest,
    ) -> Result<ListSharesResponse> {
        self.share_manager()?
            .list_shares(req)
            .await
            .map_err(GatewayError::service("ListShares"))
    }

    #[instrument(skip(self, ctx))]
    pub async fn list_received_shares(&self, ctx: &CallContext) -> Result<ListReceivedSharesResponse> {
        self.share_manager()?
            .list_received_shares(ListReceivedSharesRequest {
                user: ctx.user.clone(),
            })
            .await
            .map_err(GatewayError::service("ListReceivedShares"))
    }

    #[instrument(skip(self, ctx, req), fields(share = %req.reference))]
    pub async fn get_received_share(
        &self,
        ctx: &CallContext,
        mut req: GetReceivedShareRequest,
    ) -> Result<ReceivedShareResponse> {
        req.user = ctx.user.clone();
        self.share_manager()?
            .get_received_share(req)
            .await
            .map_err(GatewayError::service("GetReceivedShare"))
    }

    /// Accept, reject or remount a received share
    #[instrument(skip(self, ctx, req))]
    pub async fn update_received_share(
        &self,
        ctx: &CallContext,
        mut req: UpdateReceivedShareRequest,
    ) -> Result<ReceivedShareResponse> {
        let resource_id = match &req.share {
            Some(received) if !received.share.id.is_empty() => received.share.resource_id.clone(),
            Some(_) => {
                return Err(GatewayError::BadRequest(
                    "updating requires a received share with an id".to_string(),
                ))
            }
            None => {
                return Err(GatewayError::BadRequest(
                    "updating requires a received share object".to_string(),
                ))
            }
        };
        req.user = ctx.user.clone();
        self.invalidate_stat(ctx, Some(&resource_id));
        self.share_manager()?
            .update_received_share(req)
            .await
            .map_err(GatewayError::service("UpdateReceivedShare"))
    }

    /// Create a link share; the caller becomes its creator
    #[instrument(skip(self, ctx, req), fields(resource = %req.resource_info.id))]
    pub async fn create_public_share(
        &self,
        ctx: &CallContext,
        mut req: CreatePublicShareRequest,
    ) -> Result<PublicShareResponse> {
        let user = ctx
            .user_id()
            .cloned()
            .ok_or_else(|| GatewayError::Unauthenticated("missing user".to_string()))?;
        req.creator = Some(user);
        self.public_share_manager()?
            .create_public_share(req)
            .await
            .map_err(GatewayError::service("CreatePublicShare"))
    }

    #[instrument(skip(self, _ctx, req), fields(share = %req.id))]
    pub async fn get_public_share(&self, _ctx: &CallContext, req: IdRequest) -> Result<PublicShareResponse> {
        self.public_share_manager()?
            .get_public_share(req)
            .await
            .map_err(GatewayError::service("GetPublicShare"))
    }

    #[instrument(skip(self, _ctx, req))]
    pub async fn list_public_shares(
        &self,
        _ctx: &CallContext,
        req: ListSharesRequest,
    ) -> Result<ListPublicSharesResponse> {
        self.public_share_manager()?
            .list_public_shares(req)
            .await
            .map_err(GatewayError::service("ListPublicShares"))
    }

    #[instrument(skip(self, _ctx, req), fields(share = %req.id))]
    pub async fn remove_public_share(&self, _ctx: &CallContext, req: IdRequest) -> Result<StatusResponse> {
        self.public_share_manager()?
            .remove_public_share(req)
            .await
            .map_err(GatewayError::service("RemovePublicShare"))
    }
}
