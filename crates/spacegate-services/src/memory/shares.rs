//! In-memory share ledgers

use super::respond;
use crate::*;
use chrono::Utc;
use dashmap::DashMap;

#[derive(Debug, Clone, Default)]
struct GranteeState {
    state: ShareState,
    mount_point: Option<String>,
}

/// Ledger of user and group shares
#[derive(Default)]
pub struct MemoryShareManager {
    shares: DashMap<String, Share>,
    received: DashMap<(String, String), GranteeState>,
    remove_failures: DashMap<String, Status>,
}

impl MemoryShareManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make removing share `id` answer with `status`
    pub fn fail_removal_of(&self, id: impl Into<String>, status: Status) {
        self.remove_failures.insert(id.into(), status);
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    fn find(&self, reference: &ShareReference) -> std::result::Result<Share, Status> {
        self.shares
            .iter()
            .find(|s| reference.matches(s.value()))
            .map(|s| s.value().clone())
            .ok_or_else(|| Status::not_found(format!("share {reference} not found")))
    }

    fn received(&self, share: Share, user: &User) -> ReceivedShare {
        let grantee_state = self
            .received
            .get(&(share.id.clone(), user.id.opaque_id.clone()))
            .map(|s| s.clone())
            .unwrap_or_default();
        ReceivedShare {
            share,
            state: grantee_state.state,
            mount_point: grantee_state.mount_point,
        }
    }
}

fn require_user(user: Option<&User>) -> std::result::Result<&User, Status> {
    user.ok_or_else(|| Status::unauthenticated("missing user"))
}

#[async_trait::async_trait]
impl ShareManager for MemoryShareManager {
    async fn create_share(&self, req: CreateShareRequest) -> Result<ShareResponse> {
        let Some(creator) = req.creator.clone() else {
            return respond(Err(Status::invalid_argument("missing share creator")));
        };
        let resource_id = req.resource_info.id.clone();
        let duplicate = self.shares.iter().any(|s| {
            s.resource_id == resource_id && s.grantee.same_subject(&req.grant.grantee)
        });
        if duplicate {
            return respond(Err(Status::already_exists(format!(
                "{} already has access to {resource_id}",
                req.grant.grantee
            ))));
        }
        let now = Utc::now();
        let share = Share {
            id: uuid::Uuid::new_v4().to_string(),
            owner: req.resource_info.owner.clone().unwrap_or_else(|| creator.clone()),
            creator,
            resource_id,
            grantee: req.grant.grantee.clone(),
            permissions: req.grant.permissions,
            ctime: Some(now),
            mtime: Some(now),
        };
        self.shares.insert(share.id.clone(), share.clone());
        Ok(ShareResponse {
            status: Status::ok(),
            share: Some(share),
        })
    }

    async fn get_share(&self, req: ShareReferenceRequest) -> Result<ShareResponse> {
        respond(self.find(&req.reference).map(|share| ShareResponse {
            status: Status::ok(),
            share: Some(share),
        }))
    }

    async fn remove_share(&self, req: ShareReferenceRequest) -> Result<StatusResponse> {
        let share = match self.find(&req.reference) {
            Ok(share) => share,
            Err(status) => return respond(Err(status)),
        };
        if let Some(status) = self.remove_failures.get(&share.id) {
            return respond(Err(status.clone()));
        }
        self.shares.remove(&share.id);
        self.received.retain(|(id, _), _| id != &share.id);
        Ok(StatusResponse::ok())
    }

    async fn update_share(&self, req: UpdateShareRequest) -> Result<ShareResponse> {
        let share = match self.find(&req.reference) {
            Ok(share) => share,
            Err(status) => return respond(Err(status)),
        };
        let mut entry = match self.shares.get_mut(&share.id) {
            Some(entry) => entry,
            None => return respond(Err(Status::not_found("share vanished"))),
        };
        entry.permissions = req.permissions;
        entry.mtime = Some(Utc::now());
        Ok(ShareResponse {
            status: Status::ok(),
            share: Some(entry.clone()),
        })
    }

    async fn list_shares(&self, req: ListSharesRequest) -> Result<ListSharesResponse> {
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
        Ok(ListSharesResponse {
            status: Status::ok(),
            shares,
        })
    }

    async fn list_received_shares(
        &self,
        req: ListReceivedSharesRequest,
    ) -> Result<ListReceivedSharesResponse> {
        let user = match require_user(req.user.as_ref()) {
            Ok(user) => user,
            Err(status) => return respond(Err(status)),
        };
        let shares: Vec<Share> = self
            .shares
            .iter()
            .filter(|s| s.grantee.includes(user))
            .map(|s| s.value().clone())
            .collect();
        Ok(ListReceivedSharesResponse {
            status: Status::ok(),
            shares: shares
                .into_iter()
                .map(|share| self.received(share, user))
                .collect(),
        })
    }

    async fn get_received_share(
        &self,
        req: GetReceivedShareRequest,
    ) -> Result<ReceivedShareResponse> {
        respond(require_user(req.user.as_ref()).and_then(|user| {
            let share = self.find(&req.reference)?;
            if !share.grantee.includes(user) {
                return Err(Status::not_found(format!("share {} not found", req.reference)));
            }
            Ok(ReceivedShareResponse {
                status: Status::ok(),
                share: Some(self.received(share, user)),
            })
        }))
    }

    async fn update_received_share(
        &self,
        req: UpdateReceivedShareRequest,
    ) -> Result<ReceivedShareResponse> {
        respond(require_user(req.user.as_ref()).and_then(|user| {
            let update = req
                .share
                .as_ref()
                .ok_or_else(|| Status::invalid_argument("missing received share"))?;
            let share = self.find(&ShareReference::Id(update.share.id.clone()))?;
            if !share.grantee.includes(user) {
                return Err(Status::not_found(format!("share {} not found", share.id)));
            }
            {
                let mut entry = self
                    .received
                    .entry((share.id.clone(), user.id.opaque_id.clone()))
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
            Ok(ReceivedShareResponse {
                status: Status::ok(),
                share: Some(self.received(share, user)),
            })
        }))
    }
}

/// Ledger of link shares
#[derive(Default)]
pub struct MemoryPublicShareManager {
    shares: DashMap<String, PublicShare>,
    remove_failures: DashMap<String, Status>,
}

impl MemoryPublicShareManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make removing link share `id` answer with `status`
    pub fn fail_removal_of(&self, id: impl Into<String>, status: Status) {
        self.remove_failures.insert(id.into(), status);
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }
}

#[async_trait::async_trait]
impl PublicShareManager for MemoryPublicShareManager {
    async fn create_public_share(
        &self,
        req: CreatePublicShareRequest,
    ) -> Result<PublicShareResponse> {
        let Some(creator) = req.creator.clone() else {
            return respond(Err(Status::invalid_argument("missing share creator")));
        };
        let share = PublicShare {
            id: uuid::Uuid::new_v4().to_string(),
            token: uuid::Uuid::new_v4().simple().to_string(),
            resource_id: req.resource_info.id.clone(),
            permissions: req.permissions,
            owner: req.resource_info.owner.clone().unwrap_or_else(|| creator.clone()),
            creator,
            display_name: req.display_name.clone(),
            password_protected: req.password.as_deref().is_some_and(|p| !p.is_empty()),
            expiration: req.expiration,
        };
        self.shares.insert(share.id.clone(), share.clone());
        Ok(PublicShareResponse {
            status: Status::ok(),
            share: Some(share),
        })
    }

    async fn get_public_share(&self, req: IdRequest) -> Result<PublicShareResponse> {
        let found = self
            .shares
            .iter()
            .find(|s| s.id == req.id || s.token == req.id)
            .map(|s| s.value().clone());
        match found {
            Some(share) => Ok(PublicShareResponse {
                status: Status::ok(),
                share: Some(share),
            }),
            None => respond(Err(Status::not_found(format!(
                "link share {} not found",
                req.id
            )))),
        }
    }

    async fn list_public_shares(&self, req: ListSharesRequest) -> Result<ListPublicSharesResponse> {
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
        Ok(ListPublicSharesResponse {
            status: Status::ok(),
            shares,
        })
    }

    async fn remove_public_share(&self, req: IdRequest) -> Result<StatusResponse> {
        if let Some(status) = self.remove_failures.get(&req.id) {
            return respond(Err(status.clone()));
        }
        match self.shares.remove(&req.id) {
            Some(_) => Ok(StatusResponse::ok()),
            None => respond(Err(Status::not_found(format!(
                "link share {} not found",
                req.id
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, groups: &[&str]) -> User {
        User {
            id: UserId::new("idp", name),
            username: name.into(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            ..Default::default()
        }
    }

    fn share_request(grantee: Grantee) -> CreateShareRequest {
        CreateShareRequest {
            resource_info: ResourceInfo {
                id: ResourceId::new("storage-1", "einstein", "file-1"),
                owner: Some(UserId::new("idp", "einstein")),
                ..Default::default()
            },
            grant: ShareGrant {
                grantee,
                permissions: ResourcePermissions::viewer(),
            },
            creator: Some(UserId::new("idp", "einstein")),
        }
    }

    #[tokio::test]
    async fn test_duplicate_share_rejected() {
        let ledger = MemoryShareManager::new();
        let grantee = Grantee::user(UserId::new("idp", "marie"));
        let res = ledger.create_share(share_request(grantee.clone())).await.unwrap();
        assert!(res.status.is_ok());
        let res = ledger.create_share(share_request(grantee)).await.unwrap();
        assert_eq!(res.status.code, Code::AlreadyExists);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_received_state_is_per_grantee() {
        let ledger = MemoryShareManager::new();
        let group = Grantee::group(GroupId {
            idp: "idp".into(),
            opaque_id: "physics".into(),
        });
        let share = ledger
            .create_share(share_request(group))
            .await
            .unwrap()
            .share
            .unwrap();
        let marie = user("marie", &["physics"]);
        let richard = user("richard", &["physics"]);

        let res = ledger
            .update_received_share(UpdateReceivedShareRequest {
                share: Some(ReceivedShare {
                    share: share.clone(),
                    state: ShareState::Accepted,
                    mount_point: Some("relativity".into()),
                }),
                update_mask: vec![ReceivedShareField::State, ReceivedShareField::MountPoint],
                user: Some(marie.clone()),
            })
            .await
            .unwrap();
        assert_eq!(res.share.unwrap().state, ShareState::Accepted);

        let res = ledger
            .list_received_shares(ListReceivedSharesRequest {
                user: Some(richard),
            })
            .await
            .unwrap();
        assert_eq!(res.shares.len(), 1);
        assert_eq!(res.shares[0].state, ShareState::Pending);
    }

    #[tokio::test]
    async fn test_lookup_by_key() {
        let ledger = MemoryShareManager::new();
        let grantee = Grantee::user(UserId::new("idp", "marie"));
        ledger.create_share(share_request(grantee.clone())).await.unwrap();
        let res = ledger
            .get_share(ShareReferenceRequest {
                reference: ShareReference::Key(ShareKey {
                    owner: UserId::new("idp", "einstein"),
                    resource_id: ResourceId::new("storage-1", "einstein", "file-1"),
                    grantee,
                }),
            })
            .await
            .unwrap();
        assert!(res.status.is_ok());
    }

    #[tokio::test]
    async fn test_injected_removal_failure() {
        let ledger = MemoryPublicShareManager::new();
        let share = ledger
            .create_public_share(CreatePublicShareRequest {
                resource_info: ResourceInfo::default(),
                permissions: ResourcePermissions::viewer(),
                display_name: "link".into(),
                password: None,
                expiration: None,
                creator: Some(UserId::new("idp", "einstein")),
            })
            .await
            .unwrap()
            .share
            .unwrap();
        ledger.fail_removal_of(share.id.clone(), Status::internal("disk full"));
        let res = ledger
            .remove_public_share(IdRequest::new(share.id))
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::Internal);
        assert_eq!(ledger.len(), 1);
    }
}
