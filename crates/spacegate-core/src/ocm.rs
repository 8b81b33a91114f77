//! Federated (OCM) shares
//!
//! Outgoing shares follow the same ledger-then-grant sequence as local shares.
//! Accepting an incoming share either mounts it as a `webdav://` reference in
//! the caller's share folder or, for transfer shares, asks the data transfer
//! service to copy the data over.

use crate::context::CallContext;
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use crate::resolver::clean_path;
use spacegate_services::*;
use tracing::instrument;
use url::Url;

/// `scheme`, `host[:port]` and base path of a webdav endpoint
struct WebdavEndpoint {
    scheme: String,
    host: String,
    base: String,
}

impl WebdavEndpoint {
    fn parse(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint).map_err(|e| {
            GatewayError::Internal(format!("invalid webdav endpoint {endpoint}: {e}"))
        })?;
        let host = url.host_str().ok_or_else(|| {
            GatewayError::Internal(format!("webdav endpoint {endpoint} has no host"))
        })?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            base: url.path().to_string(),
        })
    }

    /// Target uri of `path` below the endpoint, authorized by `token`
    fn target(&self, token: &str, path: &str) -> String {
        format!(
            "{}://{}@{}?name={}",
            self.scheme,
            token,
            self.host,
            clean_path(&format!("{}/{}", self.base, path))
        )
    }
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

impl Gateway {
    /// Share a resource with a user of another organisation
    #[instrument(skip(self, ctx, req), fields(resource = %req.resource_info.id, grantee = %req.grantee))]
    pub async fn create_ocm_share(
        &self,
        ctx: &CallContext,
        mut req: CreateOcmShareRequest,
    ) -> Result<OcmShareResponse> {
        let user = ctx
            .user_id()
            .cloned()
            .ok_or_else(|| GatewayError::Unauthenticated("missing user".to_string()))?;
        req.creator = Some(user);
        let res = self
            .ocm_share_manager()?
            .create_ocm_share(req)
            .await
            .map_err(GatewayError::service("CreateOCMShare"))?;
        let Some(share) = res.share.as_ref().filter(|_| res.status.is_ok()) else {
            return Ok(res);
        };

        if self.config.commit_share_to_storage_grant {
            let granted = self
                .commit_grant(ctx, &share.resource_id, &share.grantee, share.permissions, false)
                .await?;
            match granted.status.code {
                Code::Ok => {}
                Code::Unimplemented => {
                    tracing::debug!(status = %granted.status, "storage has no grants, not committing ocm share")
                }
                _ => {
                    tracing::warn!(
                        share = %share.id,
                        status = %granted.status,
                        "grant commit failed, ocm share stays in the ledger"
                    );
                    return Ok(OcmShareResponse {
                        status: granted.status,
                        share: res.share,
                    });
                }
            }
        }
        self.invalidate_stat(ctx, Some(&share.resource_id));
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(share = %req.id))]
    pub async fn remove_ocm_share(&self, ctx: &CallContext, req: IdRequest) -> Result<StatusResponse> {
        let shares = self.ocm_share_manager()?;
        let found = shares
            .get_ocm_share(req.clone())
            .await
            .map_err(GatewayError::service("GetOCMShare"))?;
        let Some(share) = found.share.filter(|_| found.status.is_ok()) else {
            return Ok(StatusResponse {
                status: found.status,
            });
        };
        let removed = shares
            .remove_ocm_share(req)
            .await
            .map_err(GatewayError::service("RemoveOCMShare"))?;
        if !removed.status.is_ok() || !self.config.commit_share_to_storage_grant {
            return Ok(removed);
        }

        let revoked = self
            .revoke_grant(ctx, &share.resource_id, &share.grantee, share.permissions, false)
            .await?;
        match revoked.status.code {
            Code::Ok | Code::Unimplemented => {
                self.invalidate_stat(ctx, Some(&share.resource_id));
                Ok(StatusResponse::ok())
            }
            _ => {
                tracing::warn!(
                    share = %share.id,
                    status = %revoked.status,
                    "ocm share removed from the ledger but its grant remains"
                );
                Ok(revoked)
            }
        }
    }

    #[instrument(skip(self, _ctx, req), fields(share = %req.id))]
    pub async fn get_ocm_share(&self, _ctx: &CallContext, req: IdRequest) -> Result<OcmShareResponse> {
        self.ocm_share_manager()?
            .get_ocm_share(req)
            .await
            .map_err(GatewayError::service("GetOCMShare"))
    }

    #[instrument(skip(self, _ctx, req))]
    pub async fn list_ocm_shares(
        &self,
        _ctx: &CallContext,
        req: ListSharesRequest,
    ) -> Result<ListOcmSharesResponse> {
        self.ocm_share_manager()?
            .list_ocm_shares(req)
            .await
            .map_err(GatewayError::service("ListOCMShares"))
    }

    #[instrument(skip(self, ctx))]
    pub async fn list_received_ocm_shares(
        &self,
        ctx: &CallContext,
    ) -> Result<ListReceivedOcmSharesResponse> {
        self.ocm_share_manager()?
            .list_received_ocm_shares(ListReceivedSharesRequest {
                user: ctx.user.clone(),
            })
            .await
            .map_err(GatewayError::service("ListReceivedOCMShares"))
    }

    #[instrument(skip(self, ctx, req), fields(share = %req.id))]
    pub async fn get_received_ocm_share(
        &self,
        ctx: &CallContext,
        mut req: GetReceivedOcmShareRequest,
    ) -> Result<ReceivedOcmShareResponse> {
        req.user = ctx.user.clone();
        self.ocm_share_manager()?
            .get_received_ocm_share(req)
            .await
            .map_err(GatewayError::service("GetReceivedOCMShare"))
    }

    /// Accept a received federated share.
    ///
    /// Rejecting or remounting is not supported for federated shares.
    #[instrument(skip(self, ctx, req))]
    pub async fn update_received_ocm_share(
        &self,
        ctx: &CallContext,
        mut req: UpdateReceivedOcmShareRequest,
    ) -> Result<ReceivedOcmShareResponse> {
        let update = match &req.share {
            Some(received) if !received.share.id.is_empty() => received.clone(),
            _ => {
                return Err(GatewayError::BadRequest(
                    "updating requires a received share with an id".to_string(),
                ))
            }
        };
        let manager = self.ocm_share_manager()?;
        let current = manager
            .get_received_ocm_share(GetReceivedOcmShareRequest {
                id: update.share.id.clone(),
                user: ctx.user.clone(),
            })
            .await
            .map_err(GatewayError::service("GetReceivedOCMShare"))?;
        let Some(current) = current.share.filter(|_| current.status.is_ok()) else {
            return Ok(ReceivedOcmShareResponse::from_status(current.status));
        };

        for field in &req.update_mask {
            match (field, update.state) {
                (ReceivedShareField::State, ShareState::Accepted) => {
                    let status = match current.share.share_type {
                        OcmShareType::Transfer => {
                            if current.state == ShareState::Accepted {
                                return Err(GatewayError::FailedPrecondition(
                                    "transfer share already accepted".to_string(),
                                ));
                            }
                            self.start_transfer(ctx, &current.share, req.destination.as_deref())
                                .await?
                        }
                        OcmShareType::Regular => self.mount_ocm_share(ctx, &current.share).await?,
                    };
                    if !status.is_ok() {
                        return Ok(ReceivedOcmShareResponse::from_status(status));
                    }
                }
                (ReceivedShareField::State, state) => {
                    return Err(GatewayError::NotSupported(format!(
                        "updating ocm share state to {state:?}"
                    )))
                }
                (ReceivedShareField::MountPoint, _) => {
                    return Err(GatewayError::NotSupported(
                        "updating the mount point of an ocm share".to_string(),
                    ))
                }
            }
        }

        req.user = ctx.user.clone();
        manager
            .update_received_ocm_share(req)
            .await
            .map_err(GatewayError::service("UpdateReceivedOCMShare"))
    }

    /// Create a `webdav://` reference to the remote resource in the share folder
    async fn mount_ocm_share(&self, ctx: &CallContext, share: &OcmShare) -> Result<Status> {
        let token = share.token.as_deref().ok_or_else(|| {
            GatewayError::FailedPrecondition(format!("ocm share {} carries no token", share.id))
        })?;
        let home = self.get_home(ctx).await?;
        if !home.status.is_ok() {
            return Ok(home.status);
        }
        let path = clean_path(&format!(
            "{}/{}/{}",
            home.path, self.config.share_folder, share.name
        ));
        let target_uri = format!("webdav://{token}@{}?name={}", share.owner.idp, share.name);

        let resolved = self.find_and_unwrap(ctx, &Reference::from_path(path)).await?;
        let res = resolved
            .provider
            .create_reference(CreateReferenceRequest {
                reference: resolved.reference.clone(),
                target_uri,
            })
            .await
            .map_err(GatewayError::service("CreateReference"))?;
        if res.status.is_ok() {
            self.invalidate_stat(ctx, resolved.reference.resource_id.as_ref());
        }
        Ok(res.status)
    }

    /// Webdav endpoint a mesh provider publishes for `domain`
    async fn webdav_endpoint(&self, domain: &str) -> Result<WebdavEndpoint> {
        let res = self
            .mesh_directory()?
            .get_info_by_domain(GetInfoByDomainRequest {
                domain: domain.to_string(),
            })
            .await
            .map_err(GatewayError::service("GetInfoByDomain"))?;
        let provider = res
            .provider
            .filter(|_| res.status.is_ok())
            .ok_or_else(|| GatewayError::from_status(&res.status))?;
        let service = provider.service("webdav").ok_or_else(|| {
            GatewayError::NotFound(format!("no webdav service for domain {domain}"))
        })?;
        WebdavEndpoint::parse(&service.path)
    }

    /// Ask the data transfer service to pull a transfer share into the caller's home
    async fn start_transfer(
        &self,
        ctx: &CallContext,
        share: &OcmShare,
        destination: Option<&str>,
    ) -> Result<Status> {
        let user = ctx
            .user_id()
            .ok_or_else(|| GatewayError::Unauthenticated("missing user".to_string()))?;
        let token = share.token.as_deref().ok_or_else(|| {
            GatewayError::FailedPrecondition(format!("ocm share {} carries no token", share.id))
        })?;
        let source = self.webdav_endpoint(&share.owner.idp).await?;
        let sink = self.webdav_endpoint(&user.idp).await?;

        let home = self.get_home(ctx).await?;
        if !home.status.is_ok() {
            return Ok(home.status);
        }
        let folder = destination
            .filter(|d| !d.is_empty())
            .unwrap_or(self.config.data_transfers_folder.as_str());
        let folder = clean_path(&format!("{}/{folder}", home.path));
        let created = self.ensure_container(ctx, &folder).await?;
        if !created.is_ok() {
            return Ok(created);
        }

        let src_target_uri = source.target(token, &share.name);
        let dest_target_uri =
            sink.target(&ctx.token, &format!("{folder}/{}", basename(&share.name)));
        tracing::debug!(share = %share.id, dest = %folder, "requesting data transfer");
        let res = self
            .data_transfer()?
            .create_transfer(CreateTransferRequest {
                src_target_uri,
                dest_target_uri,
                share_id: share.id.clone(),
            })
            .await
            .map_err(GatewayError::service("CreateTransfer"))?;
        if !res.status.is_ok() {
            tracing::error!(share = %share.id, status = %res.status, "data transfer refused");
        }
        Ok(res.status)
    }

    /// Create the folder at `path` unless it exists
    async fn ensure_container(&self, ctx: &CallContext, path: &str) -> Result<Status> {
        let reference = Reference::from_path(path);
        let stat = self
            .stat(
                ctx,
                StatRequest {
                    reference: reference.clone(),
                    metadata_keys: vec![],
                },
            )
            .await?;
        match stat.status.code {
            Code::Ok => Ok(Status::ok()),
            Code::NotFound => Ok(self
                .create_container(ctx, ReferenceRequest::new(reference))
                .await?
                .status),
            _ => Ok(stat.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, LOCAL_DOMAIN, PARTNER_DOMAIN};

    fn inbound(id: &str, name: &str, share_type: OcmShareType) -> OcmShare {
        OcmShare {
            id: id.into(),
            name: name.into(),
            resource_id: ResourceId::new("remote-storage", "remote-space", "remote-file"),
            grantee: Grantee::user(UserId::new(LOCAL_DOMAIN, "einstein")),
            permissions: ResourcePermissions::viewer(),
            owner: UserId::new(PARTNER_DOMAIN, "marie"),
            creator: UserId::new(PARTNER_DOMAIN, "marie"),
            share_type,
            token: Some("s3cr3t".into()),
        }
    }

    fn accept(share: OcmShare, state: ShareState) -> UpdateReceivedOcmShareRequest {
        UpdateReceivedOcmShareRequest {
            share: Some(ReceivedOcmShare {
                share,
                state,
                mount_point: None,
            }),
            update_mask: vec![ReceivedShareField::State],
            user: None,
            destination: None,
        }
    }

    #[tokio::test]
    async fn test_outgoing_share_commits_grant() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        let root = fx.home("einstein").await;
        let file = fx.file(&ctx, &root, "./data.csv").await;
        let grantee = Grantee::user(UserId::new(PARTNER_DOMAIN, "marie"));

        let res = fx
            .gateway
            .create_ocm_share(
                &ctx,
                CreateOcmShareRequest {
                    resource_info: ResourceInfo {
                        id: file.clone(),
                        ..Default::default()
                    },
                    grantee,
                    permissions: ResourcePermissions::viewer(),
                    name: "data.csv".into(),
                    share_type: OcmShareType::Regular,
                    creator: None,
                },
            )
            .await
            .unwrap();
        assert!(res.status.is_ok());
        assert_eq!(fx.provider.grants_of(&file).len(), 1);

        let removed = fx
            .gateway
            .remove_ocm_share(&ctx, IdRequest::new(res.share.unwrap().id))
            .await
            .unwrap();
        assert!(removed.status.is_ok());
        assert!(fx.provider.grants_of(&file).is_empty());
    }

    #[tokio::test]
    async fn test_failed_grant_removal_still_drops_ocm_share() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        let root = fx.home("einstein").await;
        let file = fx.file(&ctx, &root, "./data.csv").await;
        let share = fx
            .gateway
            .create_ocm_share(
                &ctx,
                CreateOcmShareRequest {
                    resource_info: ResourceInfo {
                        id: file.clone(),
                        ..Default::default()
                    },
                    grantee: Grantee::user(UserId::new(PARTNER_DOMAIN, "marie")),
                    permissions: ResourcePermissions::viewer(),
                    name: "data.csv".into(),
                    share_type: OcmShareType::Regular,
                    creator: None,
                },
            )
            .await
            .unwrap()
            .share
            .unwrap();
        fx.provider.fail_grants_with(Some(Status::internal("acl backend down")));

        let removed = fx
            .gateway
            .remove_ocm_share(&ctx, IdRequest::new(share.id.clone()))
            .await
            .unwrap();
        assert_eq!(removed.status.code, Code::Internal);
        assert_eq!(fx.provider.grants_of(&file).len(), 1);
        let found = fx
            .gateway
            .get_ocm_share(&ctx, IdRequest::new(share.id))
            .await
            .unwrap();
        assert_eq!(found.status.code, Code::NotFound);
    }

    #[tokio::test]
    async fn test_accepting_regular_share_mounts_reference() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        fx.home("einstein").await;
        let share = inbound("ocm-1", "results.csv", OcmShareType::Regular);
        fx.ocm.receive(share.clone());

        let res = fx
            .gateway
            .update_received_ocm_share(&ctx, accept(share, ShareState::Accepted))
            .await
            .unwrap();
        assert!(res.status.is_ok());
        assert_eq!(res.share.unwrap().state, ShareState::Accepted);

        let stat = fx
            .gateway
            .stat(
                &ctx,
                StatRequest {
                    reference: Reference::from_path("/users/einstein/Shares/results.csv"),
                    metadata_keys: vec![],
                },
            )
            .await
            .unwrap();
        let info = stat.info.unwrap();
        assert_eq!(info.resource_type, ResourceType::Reference);
        assert_eq!(info.target.as_deref(), Some("webdav://s3cr3t@cesnet.cz?name=results.csv"));
    }

    #[tokio::test]
    async fn test_accepting_transfer_share_starts_one_transfer() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        fx.home("einstein").await;
        let share = inbound("ocm-2", "results.csv", OcmShareType::Transfer);
        fx.ocm.receive(share.clone());

        let res = fx
            .gateway
            .update_received_ocm_share(&ctx, accept(share.clone(), ShareState::Accepted))
            .await
            .unwrap();
        assert!(res.status.is_ok());

        let requests = fx.transfers.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].share_id, "ocm-2");
        assert_eq!(
            requests[0].src_target_uri,
            "https://s3cr3t@dav.cesnet.cz:8443?name=/webdav/results.csv"
        );
        assert_eq!(
            requests[0].dest_target_uri,
            format!(
                "https://{}@cloud.example.org?name=/remote.php/dav/users/einstein/DataTransfers/results.csv",
                ctx.token
            )
        );

        let err = fx
            .gateway
            .update_received_ocm_share(&ctx, accept(share, ShareState::Accepted))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::FailedPrecondition);
        assert_eq!(fx.transfers.requests().len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_transfer_leaves_share_pending() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        fx.home("einstein").await;
        let share = inbound("ocm-3", "results.csv", OcmShareType::Transfer);
        fx.ocm.receive(share.clone());
        fx.transfers.fail_with(Some(Status::internal("queue full")));

        let res = fx
            .gateway
            .update_received_ocm_share(&ctx, accept(share, ShareState::Accepted))
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::Internal);
        let current = fx
            .gateway
            .get_received_ocm_share(
                &ctx,
                GetReceivedOcmShareRequest {
                    id: "ocm-3".into(),
                    user: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(current.share.unwrap().state, ShareState::Pending);
    }

    #[tokio::test]
    async fn test_rejecting_ocm_share_is_unsupported() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        let share = inbound("ocm-4", "results.csv", OcmShareType::Regular);
        fx.ocm.receive(share.clone());
        let err = fx
            .gateway
            .update_received_ocm_share(&ctx, accept(share, ShareState::Rejected))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);

        let listed = fx.gateway.list_received_ocm_shares(&ctx).await.unwrap();
        assert_eq!(listed.shares.len(), 1);
        assert!(fx
            .gateway
            .list_received_ocm_shares(&fx.ctx("marie"))
            .await
            .unwrap()
            .shares
            .is_empty());
    }

    #[test]
    fn test_webdav_target_keeps_port_and_base() {
        let endpoint = WebdavEndpoint::parse("https://cernbox.cern.ch:8443/remote.php/webdav/").unwrap();
        assert_eq!(
            endpoint.target("tok", "/reports/q1.csv"),
            "https://tok@cernbox.cern.ch:8443?name=/remote.php/webdav/reports/q1.csv"
        );
    }

    #[test]
    fn test_webdav_endpoint_needs_host() {
        assert!(WebdavEndpoint::parse("not a url").is_err());
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("/a/b/results.csv"), "results.csv");
        assert_eq!(basename("results.csv"), "results.csv");
        assert_eq!(basename("/a/dir/"), "dir");
    }
}
