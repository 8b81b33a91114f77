//! In-memory ledger of federated shares

use super::respond;
use crate::*;
use dashmap::DashMap;

#[derive(Debug, Clone, Default)]
struct GranteeState {
    state: ShareState,
    mount_point: Option<String>,
}

/// Holds both the shares this organisation offered and the ones it received
#[derive(Default)]
pub struct MemoryOcmShareManager {
    shares: DashMap<String, OcmShare>,
    received: DashMap<String, OcmShare>,
    states: DashMap<(String, String), GranteeState>,
}

impl MemoryOcmShareManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a share another organisation offered to one of our users
    pub fn receive(&self, share: OcmShare) {
        self.received.insert(share.id.clone(), share);
    }

    fn received_share(&self, id: &str, user: &User) -> std::result::Result<ReceivedOcmShare, Status> {
        let share = self
            .received
            .get(id)
            .map(|s| s.value().clone())
            .filter(|s| s.grantee.includes(user))
            .ok_or_else(|| Status::not_found(format!("received ocm share {id} not found")))?;
        let state = self
            .states
            .get(&(share.id.clone(), user.id.opaque_id.clone()))
            .map(|s| s.clone())
            .unwrap_or_default();
        Ok(ReceivedOcmShare {
            share,
            state: state.state,
            mount_point: state.mount_point,
        })
    }
}

fn require_user(user: Option<&User>) -> std::result::Result<&User, Status> {
    user.ok_or_else(|| Status::unauthenticated("missing user"))
}

#[async_trait::async_trait]
impl OcmShareManager for MemoryOcmShareManager {
    async fn create_ocm_share(&self, req: CreateOcmShareRequest) -> Result<OcmShareResponse> {
        let Some(creator) = req.creator.clone() else {
            return respond(Err(Status::invalid_argument("missing share creator")));
        };
        let resource_id = req.resource_info.id.clone();
        let duplicate = self
            .shares
            .iter()
            .any(|s| s.resource_id == resource_id && s.grantee.same_subject(&req.grantee));
        if duplicate {
            return respond(Err(Status::already_exists(format!(
                "{} already has access to {resource_id}",
                req.grantee
            ))));
        }
        let share = OcmShare {
            id: uuid::Uuid::new_v4().to_string(),
            name: req.name.clone(),
            owner: req.resource_info.owner.clone().unwrap_or_else(|| creator.clone()),
            creator,
            resource_id,
            grantee: req.grantee.clone(),
            permissions: req.permissions,
            share_type: req.share_type,
            token: Some(uuid::Uuid::new_v4().simple().to_string()),
        };
        self.shares.insert(share.id.clone(), share.clone());
        Ok(OcmShareResponse {
            status: Status::ok(),
            share: Some(share),
        })
    }

    async fn get_ocm_share(&self, req: IdRequest) -> Result<OcmShareResponse> {
        match self.shares.get(&req.id) {
            Some(share) => Ok(OcmShareResponse {
                status: Status::ok(),
                share: Some(share.clone()),
            }),
            None => respond(Err(Status::not_found(format!(
                "ocm share {} not found",
                req.id
            )))),
        }
    }

    async fn remove_ocm_share(&self, req: IdRequest) -> Result<StatusResponse> {
        match self.shares.remove(&req.id) {
            Some(_) => Ok(StatusResponse::ok()),
            None => respond(Err(Status::not_found(format!(
                "ocm share {} not found",
                req.id
            )))),
        }
    }

    async fn list_ocm_shares(&self, req: ListSharesRequest) -> Result<ListOcmSharesResponse> {
        let shares = self
            .shares
            .iter()
            .filter(|s| {
                req.filters
                    .iter()
                    .all(|f| f.matches(&s.resource_id, &s.owner, &s.creator))
            })
            .map(|s| s.value().clone())
            .collect();
        Ok(ListOcmSharesResponse {
            status: Status::ok(),
            shares,
        })
    }

    async fn list_received_ocm_shares(
        &self,
        req: ListReceivedSharesRequest,
    ) -> Result<ListReceivedOcmSharesResponse> {
        respond(require_user(req.user.as_ref()).map(|user| {
            let ids: Vec<String> = self.received.iter().map(|s| s.key().clone()).collect();
            ListReceivedOcmSharesResponse {
                status: Status::ok(),
                shares: ids
                    .iter()
                    .filter_map(|id| self.received_share(id, user).ok())
                    .collect(),
            }
        }))
    }

    async fn get_received_ocm_share(
        &self,
        req: GetReceivedOcmShareRequest,
    ) -> Result<ReceivedOcmShareResponse> {
        respond(require_user(req.user.as_ref()).and_then(|user| {
            Ok(ReceivedOcmShareResponse {
                status: Status::ok(),
                share: Some(self.received_share(&req.id, user)?),
            })
        }))
    }

    async fn update_received_ocm_share(
        &self,
        req: UpdateReceivedOcmShareRequest,
    ) -> Result<ReceivedOcmShareResponse> {
        respond(require_user(req.user.as_ref()).and_then(|user| {
            let update = req
                .share
                .as_ref()
                .ok_or_else(|| Status::invalid_argument("missing received share"))?;
            let current = self.received_share(&update.share.id, user)?;
            {
                let mut entry = self
                    .states
                    .entry((current.share.id.clone(), user.id.opaque_id.clone()))
                    .or_default();
                for field in &req.update_mask {
                    match field {
                        ReceivedShareField::State => entry.state = update.state,
                        ReceivedShareField::MountPoint => {
                            entry.mount_point = update.mount_point.clone()
                        }
                    }
                }
            }
            Ok(ReceivedOcmShareResponse {
                status: Status::ok(),
                share: Some(self.received_share(&current.share.id, user)?),
            })
        }))
    }
}
