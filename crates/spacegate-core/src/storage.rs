//! Storage operations forwarded to the provider serving the reference

use crate::context::CallContext;
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use crate::resolver::Resolved;
use spacegate_services::*;
use tracing::instrument;

impl Gateway {
    /// Invalidate the caller's cached stats after a successful write
    fn after_write(&self, ctx: &CallContext, resolved: &Resolved, status: &Status) {
        if status.is_ok() {
            self.invalidate_stat(ctx, resolved.reference.resource_id.as_ref());
        }
    }

    /// Stat a resource; unresolvable references are reported as not found
    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn stat(&self, ctx: &CallContext, req: StatRequest) -> Result<StatResponse> {
        let resolved = match self.find_and_unwrap_unique(ctx, &req.reference).await {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::debug!(error = %err, "stat: reference not resolved");
                return Ok(StatResponse::from_status(Status::not_found(format!(
                    "gateway could not find reference {}",
                    req.reference
                ))));
            }
        };
        resolved
            .provider
            .stat(StatRequest {
                reference: resolved.reference,
                metadata_keys: req.metadata_keys,
            })
            .await
            .map_err(GatewayError::service("Stat"))
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn list_container(
        &self,
        ctx: &CallContext,
        req: ListContainerRequest,
    ) -> Result<ListContainerResponse> {
        let resolved = match self.find_and_unwrap(ctx, &req.reference).await {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::debug!(error = %err, "list container: reference not resolved");
                return Ok(ListContainerResponse::from_status(Status::not_found(format!(
                    "gateway could not find reference {}",
                    req.reference
                ))));
            }
        };
        resolved
            .provider
            .list_container(ListContainerRequest {
                reference: resolved.reference,
                metadata_keys: req.metadata_keys,
            })
            .await
            .map_err(GatewayError::service("ListContainer"))
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn create_container(
        &self,
        ctx: &CallContext,
        req: ReferenceRequest,
    ) -> Result<StatusResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let res = resolved
            .provider
            .create_container(ReferenceRequest::new(resolved.reference.clone()))
            .await
            .map_err(GatewayError::service("CreateContainer"))?;
        self.after_write(ctx, &resolved, &res.status);
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn touch_file(&self, ctx: &CallContext, req: ReferenceRequest) -> Result<StatusResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let res = resolved
            .provider
            .touch_file(ReferenceRequest::new(resolved.reference.clone()))
            .await
            .map_err(GatewayError::service("TouchFile"))?;
        self.after_write(ctx, &resolved, &res.status);
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn delete(&self, ctx: &CallContext, req: DeleteRequest) -> Result<StatusResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let res = resolved
            .provider
            .delete(DeleteRequest {
                reference: resolved.reference.clone(),
                deleting_shared_resource: req.deleting_shared_resource,
            })
            .await
            .map_err(GatewayError::service("Delete"))?;
        self.after_write(ctx, &resolved, &res.status);
        Ok(res)
    }

    /// Move within one provider; cross provider moves are refused
    #[instrument(skip(self, ctx, req), fields(source = %req.source, destination = %req.destination))]
    pub async fn move_resource(&self, ctx: &CallContext, req: MoveRequest) -> Result<StatusResponse> {
        let source = self.find_and_unwrap(ctx, &req.source).await?;
        let destination = self.find_and_unwrap(ctx, &req.destination).await?;
        if source.address() != destination.address() {
            return Err(GatewayError::NotSupported(
                "gateway does not support cross storage move, use copy and delete".to_string(),
            ));
        }
        let res = source
            .provider
            .move_resource(MoveRequest {
                source: source.reference.clone(),
                destination: destination.reference.clone(),
            })
            .await
            .map_err(GatewayError::service("Move"))?;
        self.after_write(ctx, &source, &res.status);
        self.after_write(ctx, &destination, &res.status);
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn set_arbitrary_metadata(
        &self,
        ctx: &CallContext,
        req: SetArbitraryMetadataRequest,
    ) -> Result<StatusResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let res = resolved
            .provider
            .set_arbitrary_metadata(SetArbitraryMetadataRequest {
                reference: resolved.reference.clone(),
                metadata: req.metadata,
            })
            .await
            .map_err(GatewayError::service("SetArbitraryMetadata"))?;
        self.after_write(ctx, &resolved, &res.status);
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn unset_arbitrary_metadata(
        &self,
        ctx: &CallContext,
        req: UnsetArbitraryMetadataRequest,
    ) -> Result<StatusResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let res = resolved
            .provider
            .unset_arbitrary_metadata(UnsetArbitraryMetadataRequest {
                reference: resolved.reference.clone(),
                keys: req.keys,
            })
            .await
            .map_err(GatewayError::service("UnsetArbitraryMetadata"))?;
        self.after_write(ctx, &resolved, &res.status);
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn set_lock(&self, ctx: &CallContext, req: LockRequest) -> Result<StatusResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let res = resolved
            .provider
            .set_lock(LockRequest {
                reference: resolved.reference.clone(),
                lock: req.lock,
            })
            .await
            .map_err(GatewayError::service("SetLock"))?;
        self.after_write(ctx, &resolved, &res.status);
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn get_lock(&self, ctx: &CallContext, req: ReferenceRequest) -> Result<GetLockResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        resolved
            .provider
            .get_lock(ReferenceRequest::new(resolved.reference))
            .await
            .map_err(GatewayError::service("GetLock"))
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn refresh_lock(&self, ctx: &CallContext, req: LockRequest) -> Result<StatusResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let res = resolved
            .provider
            .refresh_lock(LockRequest {
                reference: resolved.reference.clone(),
                lock: req.lock,
            })
            .await
            .map_err(GatewayError::service("RefreshLock"))?;
        self.after_write(ctx, &resolved, &res.status);
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn unlock(&self, ctx: &CallContext, req: LockRequest) -> Result<StatusResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let res = resolved
            .provider
            .unlock(LockRequest {
                reference: resolved.reference.clone(),
                lock: req.lock,
            })
            .await
            .map_err(GatewayError::service("Unlock"))?;
        self.after_write(ctx, &resolved, &res.status);
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(resource = %req.resource_id))]
    pub async fn get_path(&self, ctx: &CallContext, req: GetPathRequest) -> Result<GetPathResponse> {
        let resolved = self
            .find_and_unwrap(ctx, &Reference::from_id(req.resource_id.clone()))
            .await?;
        let resource_id = resolved
            .reference
            .resource_id
            .clone()
            .unwrap_or(req.resource_id);
        resolved
            .provider
            .get_path(GetPathRequest { resource_id })
            .await
            .map_err(GatewayError::service("GetPath"))
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn get_quota(&self, ctx: &CallContext, req: ReferenceRequest) -> Result<GetQuotaResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        resolved
            .provider
            .get_quota(ReferenceRequest::new(resolved.reference))
            .await
            .map_err(GatewayError::service("GetQuota"))
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn add_grant(&self, ctx: &CallContext, req: GrantRequest) -> Result<StatusResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let res = resolved
            .provider
            .add_grant(GrantRequest {
                reference: resolved.reference.clone(),
                ..req
            })
            .await
            .map_err(GatewayError::service("AddGrant"))?;
        self.after_write(ctx, &resolved, &res.status);
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn deny_grant(&self, ctx: &CallContext, req: DenyGrantRequest) -> Result<StatusResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let res = resolved
            .provider
            .deny_grant(DenyGrantRequest {
                reference: resolved.reference.clone(),
                ..req
            })
            .await
            .map_err(GatewayError::service("DenyGrant"))?;
        self.after_write(ctx, &resolved, &res.status);
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn update_grant(&self, ctx: &CallContext, req: GrantRequest) -> Result<StatusResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let res = resolved
            .provider
            .update_grant(GrantRequest {
                reference: resolved.reference.clone(),
                ..req
            })
            .await
            .map_err(GatewayError::service("UpdateGrant"))?;
        self.after_write(ctx, &resolved, &res.status);
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn remove_grant(&self, ctx: &CallContext, req: GrantRequest) -> Result<StatusResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let res = resolved
            .provider
            .remove_grant(GrantRequest {
                reference: resolved.reference.clone(),
                ..req
            })
            .await
            .map_err(GatewayError::service("RemoveGrant"))?;
        self.after_write(ctx, &resolved, &res.status);
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn list_grants(&self, ctx: &CallContext, req: ReferenceRequest) -> Result<ListGrantsResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        resolved
            .provider
            .list_grants(ReferenceRequest::new(resolved.reference))
            .await
            .map_err(GatewayError::service("ListGrants"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use std::collections::BTreeMap;

    fn stat_request(reference: Reference) -> StatRequest {
        StatRequest {
            reference,
            metadata_keys: vec![],
        }
    }

    #[tokio::test]
    async fn test_unresolvable_reference_is_not_found() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        let res = fx
            .gateway
            .stat(&ctx, stat_request(Reference::from_path("/nowhere/file.txt")))
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::NotFound);

        let listing = fx
            .gateway
            .list_container(
                &ctx,
                ListContainerRequest {
                    reference: Reference::from_path("/nowhere"),
                    metadata_keys: vec![],
                },
            )
            .await
            .unwrap();
        assert_eq!(listing.status.code, Code::NotFound);
    }

    #[tokio::test]
    async fn test_path_and_id_references_reach_same_resource() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        let root = fx.home("einstein").await;
        let folder = Reference::relative(root.clone(), "./papers");
        fx.gateway
            .create_container(&ctx, ReferenceRequest::new(folder))
            .await
            .unwrap();
        let file = fx.file(&ctx, &root, "./papers/gr.txt").await;

        let by_path = fx
            .gateway
            .stat(&ctx, stat_request(Reference::from_path("/users/einstein/papers/gr.txt")))
            .await
            .unwrap();
        assert_eq!(by_path.info.unwrap().id, file);

        let path = fx
            .gateway
            .get_path(&ctx, GetPathRequest { resource_id: file })
            .await
            .unwrap();
        assert_eq!(path.path, "/users/einstein/papers/gr.txt");

        let listing = fx
            .gateway
            .list_container(
                &ctx,
                ListContainerRequest {
                    reference: Reference::from_path("/users/einstein/papers"),
                    metadata_keys: vec![],
                },
            )
            .await
            .unwrap();
        let names: Vec<_> = listing.infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["gr.txt"]);
    }

    #[tokio::test]
    async fn test_move_and_delete_refresh_stat() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        let root = fx.home("einstein").await;
        let file = fx.file(&ctx, &root, "./draft.txt").await;

        let moved = fx
            .gateway
            .move_resource(
                &ctx,
                MoveRequest {
                    source: Reference::relative(root.clone(), "./draft.txt"),
                    destination: Reference::relative(root.clone(), "./final.txt"),
                },
            )
            .await
            .unwrap();
        assert!(moved.status.is_ok());
        let stat = fx
            .gateway
            .stat(&ctx, stat_request(Reference::from_id(file.clone())))
            .await
            .unwrap();
        assert_eq!(stat.info.unwrap().name, "final.txt");

        let deleted = fx
            .gateway
            .delete(
                &ctx,
                DeleteRequest {
                    reference: Reference::from_id(file.clone()),
                    deleting_shared_resource: false,
                },
            )
            .await
            .unwrap();
        assert!(deleted.status.is_ok());
        let gone = fx
            .gateway
            .stat(&ctx, stat_request(Reference::from_id(file)))
            .await
            .unwrap();
        assert_eq!(gone.status.code, Code::NotFound);
    }

    #[tokio::test]
    async fn test_metadata_and_locks() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        let root = fx.home("einstein").await;
        let file = fx.file(&ctx, &root, "./notes.txt").await;
        let reference = Reference::from_id(file);

        let mut metadata = BTreeMap::new();
        metadata.insert("favorite".to_string(), "1".to_string());
        fx.gateway
            .set_arbitrary_metadata(
                &ctx,
                SetArbitraryMetadataRequest {
                    reference: reference.clone(),
                    metadata,
                },
            )
            .await
            .unwrap();
        let stat = fx
            .gateway
            .stat(&ctx, stat_request(reference.clone()))
            .await
            .unwrap();
        assert_eq!(stat.info.unwrap().metadata.get("favorite").map(String::as_str), Some("1"));

        let lock = |id: &str| LockRequest {
            reference: reference.clone(),
            lock: Lock {
                lock_id: id.to_string(),
                lock_type: LockType::Write,
                user: None,
                app_name: "office".to_string(),
                expiration: None,
            },
        };
        assert!(fx.gateway.set_lock(&ctx, lock("l1")).await.unwrap().status.is_ok());
        let held = fx.gateway.set_lock(&ctx, lock("l2")).await.unwrap();
        assert_eq!(held.status.code, Code::FailedPrecondition);
        let current = fx
            .gateway
            .get_lock(&ctx, ReferenceRequest::new(reference.clone()))
            .await
            .unwrap();
        assert_eq!(current.lock.unwrap().lock_id, "l1");
        assert!(fx.gateway.unlock(&ctx, lock("l1")).await.unwrap().status.is_ok());
    }
}
