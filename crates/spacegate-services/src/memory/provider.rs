//! In-memory storage provider

use super::respond;
use crate::*;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What deleting a space without purge does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpaceDeletion {
    /// Mark the space trashed; it can be restored or purged later
    #[default]
    Trash,
    /// Remove the space immediately
    Remove,
}

#[derive(Debug, Clone)]
struct Node {
    id: String,
    /// Path relative to the space root, `.` for the root itself
    path: String,
    resource_type: ResourceType,
    mime_type: String,
    size: u64,
    mtime: chrono::DateTime<Utc>,
    metadata: BTreeMap<String, String>,
    lock: Option<Lock>,
    target: Option<String>,
    processing: bool,
}

impl Node {
    fn new(id: String, path: String, resource_type: ResourceType) -> Self {
        let mime_type = match resource_type {
            ResourceType::Container => "httpd/unix-directory".to_string(),
            _ => guess_mime_type(&path),
        };
        Self {
            id,
            path,
            resource_type,
            mime_type,
            size: 0,
            mtime: Utc::now(),
            metadata: BTreeMap::new(),
            lock: None,
            target: None,
            processing: false,
        }
    }
}

struct SpaceState {
    space: StorageSpace,
    nodes: BTreeMap<String, Node>,
    grants: BTreeMap<String, Vec<Grant>>,
}

impl SpaceState {
    fn mount(&self) -> &str {
        self.space.path.as_deref().unwrap_or("/")
    }

    fn root_id(&self) -> &str {
        &self.space.root.opaque_id
    }

    /// Space-relative path addressed by an id based reference
    fn resolve(&self, reference: &Reference) -> std::result::Result<String, Status> {
        let id = reference
            .resource_id
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("reference must carry a resource id"))?;
        let base = if id.opaque_id.is_empty() || id.opaque_id == self.root_id() {
            ".".to_string()
        } else {
            self.nodes
                .get(&id.opaque_id)
                .map(|n| n.path.clone())
                .ok_or_else(|| Status::not_found(format!("resource {id} not found")))?
        };
        Ok(join(&base, &reference.path))
    }

    fn find(&self, path: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.path == path)
    }

    fn find_id(&self, path: &str) -> Option<String> {
        self.find(path).map(|n| n.id.clone())
    }

    fn lookup(&self, reference: &Reference) -> std::result::Result<&Node, Status> {
        let path = self.resolve(reference)?;
        self.find(&path)
            .ok_or_else(|| Status::not_found(format!("{reference} not found")))
    }

    fn lookup_id(&self, reference: &Reference) -> std::result::Result<String, Status> {
        self.lookup(reference).map(|n| n.id.clone())
    }

    fn require_parent(&self, path: &str) -> std::result::Result<(), Status> {
        let parent = parent(path).ok_or_else(|| Status::already_exists("space root exists"))?;
        match self.find(parent) {
            Some(n) if n.resource_type == ResourceType::Container => Ok(()),
            Some(_) => Err(Status::failed_precondition(format!("{parent} is not a container"))),
            None => Err(Status::failed_precondition(format!("parent {parent} does not exist"))),
        }
    }

    fn insert(&mut self, path: String, resource_type: ResourceType) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.nodes
            .insert(id.clone(), Node::new(id.clone(), path, resource_type));
        id
    }

    fn info(&self, node: &Node, metadata_keys: &[String]) -> ResourceInfo {
        let metadata = node
            .metadata
            .iter()
            .filter(|(k, _)| metadata_keys.is_empty() || metadata_keys.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let name = if node.path == "." {
            self.space.name.clone()
        } else {
            base_name(&node.path).to_string()
        };
        ResourceInfo {
            id: ResourceId::new(
                self.space.root.storage_id.clone(),
                self.space.root.space_id.clone(),
                node.id.clone(),
            ),
            name,
            path: absolute(self.mount(), &node.path),
            resource_type: node.resource_type,
            mime_type: node.mime_type.clone(),
            size: node.size,
            mtime: Some(node.mtime),
            owner: self.space.owner.as_ref().map(|o| o.id.clone()),
            target: node.target.clone(),
            metadata,
            processing: node.processing,
        }
    }

    fn has_grant_for(&self, user: &UserId) -> bool {
        self.grants
            .get(self.root_id())
            .is_some_and(|grants| {
                grants.iter().any(|g| {
                    matches!(&g.grantee, Grantee::User { id } if id.opaque_id == user.opaque_id)
                        && !g.permissions.is_empty()
                })
            })
    }

    /// Restricted listings only show spaces the requester owns or was granted
    fn visible_to(&self, requester: Option<&UserId>) -> bool {
        requester.is_some_and(|user| self.space.is_owned_by(user) || self.has_grant_for(user))
    }

    fn matches(&self, filter: &SpaceFilter) -> bool {
        match filter {
            SpaceFilter::Id(id) => {
                self.space.root.space_id == id.space_id
                    && (id.storage_id.is_empty() || self.space.root.storage_id == id.storage_id)
            }
            SpaceFilter::Owner(owner) => self.space.is_owned_by(owner),
            SpaceFilter::SpaceType(space_type) => self.space.space_type == *space_type,
            SpaceFilter::User(user) => self.space.is_owned_by(user) || self.has_grant_for(user),
        }
    }
}

/// A storage provider keeping its whole tree in memory
pub struct MemoryStorageProvider {
    storage_id: String,
    data_endpoint: String,
    expose_transfers: bool,
    upload_expiration: Option<Duration>,
    deletion: SpaceDeletion,
    space_types: Vec<SpaceType>,
    spaces: DashMap<String, SpaceState>,
    grant_failure: Mutex<Option<Status>>,
    stat_calls: AtomicUsize,
}

impl MemoryStorageProvider {
    /// Create a provider with the given storage id and data endpoint
    pub fn new(storage_id: impl Into<String>, data_endpoint: impl Into<String>) -> Self {
        Self {
            storage_id: storage_id.into(),
            data_endpoint: data_endpoint.into(),
            expose_transfers: false,
            upload_expiration: None,
            deletion: SpaceDeletion::default(),
            space_types: vec![SpaceType::Personal, SpaceType::Project, SpaceType::Virtual],
            spaces: DashMap::new(),
            grant_failure: Mutex::new(None),
            stat_calls: AtomicUsize::new(0),
        }
    }

    /// Hand out raw data endpoints instead of asking for a data gateway
    pub fn with_exposed_transfers(mut self, expose: bool) -> Self {
        self.expose_transfers = expose;
        self
    }

    /// Upload endpoints expire after `lifetime`
    pub fn with_upload_expiration(mut self, lifetime: Duration) -> Self {
        self.upload_expiration = Some(lifetime);
        self
    }

    pub fn with_deletion(mut self, deletion: SpaceDeletion) -> Self {
        self.deletion = deletion;
        self
    }

    /// Restrict the space types this provider hosts
    pub fn with_space_types(mut self, space_types: Vec<SpaceType>) -> Self {
        self.space_types = space_types;
        self
    }

    pub fn storage_id(&self) -> &str {
        &self.storage_id
    }

    pub fn hosts(&self, space_type: SpaceType) -> bool {
        self.space_types.contains(&space_type)
    }

    /// Make every grant operation answer with `status`, `None` to heal
    pub fn fail_grants_with(&self, status: Option<Status>) {
        *self.grant_failure.lock() = status;
    }

    /// Number of stat calls served
    pub fn stat_count(&self) -> usize {
        self.stat_calls.load(Ordering::SeqCst)
    }

    /// Flag a resource as being processed
    pub fn set_processing(&self, id: &ResourceId, processing: bool) -> bool {
        self.spaces
            .get_mut(&id.space_id)
            .and_then(|mut state| {
                state.nodes.get_mut(&id.opaque_id).map(|node| {
                    node.processing = processing;
                })
            })
            .is_some()
    }

    /// Grants stored on a resource
    pub fn grants_of(&self, id: &ResourceId) -> Vec<Grant> {
        self.spaces
            .get(&id.space_id)
            .and_then(|state| state.grants.get(&id.opaque_id).cloned())
            .unwrap_or_default()
    }

    /// Snapshot of every space, trashed ones included
    pub fn spaces(&self) -> Vec<StorageSpace> {
        self.spaces.iter().map(|s| s.space.clone()).collect()
    }

    fn check_grant_failure(&self) -> std::result::Result<(), Status> {
        match self.grant_failure.lock().clone() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn space_id(reference: &Reference) -> std::result::Result<&str, Status> {
        reference
            .resource_id
            .as_ref()
            .map(|id| id.space_id.as_str())
            .ok_or_else(|| Status::invalid_argument("reference must carry a resource id"))
    }

    fn read<T>(
        &self,
        reference: &Reference,
        f: impl FnOnce(&SpaceState) -> std::result::Result<T, Status>,
    ) -> std::result::Result<T, Status> {
        let space_id = Self::space_id(reference)?;
        let state = self
            .spaces
            .get(space_id)
            .ok_or_else(|| Status::not_found(format!("space {space_id} not found")))?;
        f(&state)
    }

    fn write<T>(
        &self,
        reference: &Reference,
        f: impl FnOnce(&mut SpaceState) -> std::result::Result<T, Status>,
    ) -> std::result::Result<T, Status> {
        let space_id = Self::space_id(reference)?;
        let mut state = self
            .spaces
            .get_mut(space_id)
            .ok_or_else(|| Status::not_found(format!("space {space_id} not found")))?;
        if state.space.trashed {
            return Err(Status::failed_precondition(format!(
                "space {space_id} is trashed"
            )));
        }
        f(&mut state)
    }

    fn transfer_endpoint(&self, space_id: &str, node_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.data_endpoint.trim_end_matches('/'),
            space_id,
            node_id
        )
    }

    fn mount_path(req: &CreateStorageSpaceRequest, space_id: &str) -> String {
        match req.space_type {
            SpaceType::Personal => {
                let owner = req
                    .owner
                    .as_ref()
                    .map(|o| {
                        if o.username.is_empty() {
                            o.id.opaque_id.clone()
                        } else {
                            o.username.clone()
                        }
                    })
                    .unwrap_or_else(|| space_id.to_string());
                format!("/users/{owner}")
            }
            SpaceType::Project => format!("/projects/{}", req.name),
            SpaceType::Virtual => format!("/virtual/{space_id}"),
        }
    }
}

#[async_trait::async_trait]
impl StorageProvider for MemoryStorageProvider {
    async fn stat(&self, req: StatRequest) -> Result<StatResponse> {
        self.stat_calls.fetch_add(1, Ordering::SeqCst);
        respond(self.read(&req.reference, |state| {
            let node = state.lookup(&req.reference)?;
            Ok(StatResponse {
                status: Status::ok(),
                info: Some(state.info(node, &req.metadata_keys)),
            })
        }))
    }

    async fn list_container(&self, req: ListContainerRequest) -> Result<ListContainerResponse> {
        respond(self.read(&req.reference, |state| {
            let node = state.lookup(&req.reference)?;
            if node.resource_type != ResourceType::Container {
                return Err(Status::failed_precondition(format!(
                    "{} is not a container",
                    req.reference
                )));
            }
            let infos = state
                .nodes
                .values()
                .filter(|n| parent(&n.path) == Some(node.path.as_str()))
                .map(|n| state.info(n, &req.metadata_keys))
                .collect();
            Ok(ListContainerResponse {
                status: Status::ok(),
                infos,
            })
        }))
    }

    async fn create_container(&self, req: ReferenceRequest) -> Result<StatusResponse> {
        respond(self.write(&req.reference, |state| {
            let path = state.resolve(&req.reference)?;
            if state.find(&path).is_some() {
                return Err(Status::already_exists(format!("{} exists", req.reference)));
            }
            state.require_parent(&path)?;
            state.insert(path, ResourceType::Container);
            Ok(StatusResponse::ok())
        }))
    }

    async fn touch_file(&self, req: ReferenceRequest) -> Result<StatusResponse> {
        respond(self.write(&req.reference, |state| {
            let path = state.resolve(&req.reference)?;
            match state.find_id(&path) {
                Some(id) => {
                    if let Some(node) = state.nodes.get_mut(&id) {
                        node.mtime = Utc::now();
                    }
                }
                None => {
                    state.require_parent(&path)?;
                    state.insert(path, ResourceType::File);
                }
            }
            Ok(StatusResponse::ok())
        }))
    }

    async fn delete(&self, req: DeleteRequest) -> Result<StatusResponse> {
        respond(self.write(&req.reference, |state| {
            let path = state.resolve(&req.reference)?;
            if path == "." {
                return Err(Status::permission_denied("the space root cannot be deleted"));
            }
            if state.find(&path).is_none() {
                return Err(Status::not_found(format!("{} not found", req.reference)));
            }
            let removed: Vec<String> = state
                .nodes
                .values()
                .filter(|n| n.path == path || is_descendant(&n.path, &path))
                .map(|n| n.id.clone())
                .collect();
            for id in removed {
                state.nodes.remove(&id);
                state.grants.remove(&id);
            }
            Ok(StatusResponse::ok())
        }))
    }

    async fn move_resource(&self, req: MoveRequest) -> Result<StatusResponse> {
        let source_space = Self::space_id(&req.source).map(str::to_string);
        let target_space = Self::space_id(&req.destination).map(str::to_string);
        if let (Ok(source), Ok(target)) = (&source_space, &target_space) {
            if source != target {
                return respond(Err(Status::unimplemented("cross space move not supported")));
            }
        }
        respond(self.write(&req.source, |state| {
            let from = state.resolve(&req.source)?;
            let to = state.resolve(&req.destination)?;
            if from == "." {
                return Err(Status::permission_denied("the space root cannot be moved"));
            }
            if state.find(&from).is_none() {
                return Err(Status::not_found(format!("{} not found", req.source)));
            }
            if state.find(&to).is_some() {
                return Err(Status::already_exists(format!("{} exists", req.destination)));
            }
            if is_descendant(&to, &from) {
                return Err(Status::failed_precondition("cannot move a folder into itself"));
            }
            state.require_parent(&to)?;
            for node in state.nodes.values_mut() {
                if node.path == from {
                    node.path = to.clone();
                } else if is_descendant(&node.path, &from) {
                    node.path = format!("{to}{}", &node.path[from.len()..]);
                }
            }
            Ok(StatusResponse::ok())
        }))
    }

    async fn set_arbitrary_metadata(
        &self,
        req: SetArbitraryMetadataRequest,
    ) -> Result<StatusResponse> {
        respond(self.write(&req.reference, |state| {
            let id = state.lookup_id(&req.reference)?;
            if let Some(node) = state.nodes.get_mut(&id) {
                node.metadata.extend(req.metadata.clone());
            }
            Ok(StatusResponse::ok())
        }))
    }

    async fn unset_arbitrary_metadata(
        &self,
        req: UnsetArbitraryMetadataRequest,
    ) -> Result<StatusResponse> {
        respond(self.write(&req.reference, |state| {
            let id = state.lookup_id(&req.reference)?;
            if let Some(node) = state.nodes.get_mut(&id) {
                for key in &req.keys {
                    node.metadata.remove(key);
                }
            }
            Ok(StatusResponse::ok())
        }))
    }

    async fn set_lock(&self, req: LockRequest) -> Result<StatusResponse> {
        respond(self.write(&req.reference, |state| {
            let id = state.lookup_id(&req.reference)?;
            let node = state
                .nodes
                .get_mut(&id)
                .ok_or_else(|| Status::not_found(format!("{} not found", req.reference)))?;
            let held = node
                .lock
                .as_ref()
                .filter(|lock| !is_expired(lock))
                .map(|lock| lock.lock_id.clone());
            match held {
                Some(lock_id) if lock_id != req.lock.lock_id => {
                    Err(Status::failed_precondition("resource is locked"))
                }
                _ => {
                    node.lock = Some(req.lock.clone());
                    Ok(StatusResponse::ok())
                }
            }
        }))
    }

    async fn get_lock(&self, req: ReferenceRequest) -> Result<GetLockResponse> {
        respond(self.read(&req.reference, |state| {
            let node = state.lookup(&req.reference)?;
            match &node.lock {
                Some(lock) if !is_expired(lock) => Ok(GetLockResponse {
                    status: Status::ok(),
                    lock: Some(lock.clone()),
                }),
                _ => Err(Status::not_found("no lock found")),
            }
        }))
    }

    async fn refresh_lock(&self, req: LockRequest) -> Result<StatusResponse> {
        respond(self.write(&req.reference, |state| {
            let id = state.lookup_id(&req.reference)?;
            let node = state
                .nodes
                .get_mut(&id)
                .ok_or_else(|| Status::not_found(format!("{} not found", req.reference)))?;
            let held = node.lock.as_ref().map(|lock| lock.lock_id.clone());
            match held {
                Some(lock_id) if lock_id == req.lock.lock_id => {
                    node.lock = Some(req.lock.clone());
                    Ok(StatusResponse::ok())
                }
                Some(_) => Err(Status::failed_precondition("mismatching lock id")),
                None => Err(Status::not_found("no lock found")),
            }
        }))
    }

    async fn unlock(&self, req: LockRequest) -> Result<StatusResponse> {
        respond(self.write(&req.reference, |state| {
            let id = state.lookup_id(&req.reference)?;
            let node = state
                .nodes
                .get_mut(&id)
                .ok_or_else(|| Status::not_found(format!("{} not found", req.reference)))?;
            let held = node.lock.as_ref().map(|lock| lock.lock_id.clone());
            match held {
                Some(lock_id) if lock_id == req.lock.lock_id => {
                    node.lock = None;
                    Ok(StatusResponse::ok())
                }
                Some(_) => Err(Status::failed_precondition("mismatching lock id")),
                None => Err(Status::not_found("no lock found")),
            }
        }))
    }

    async fn get_path(&self, req: GetPathRequest) -> Result<GetPathResponse> {
        let reference = Reference::from_id(req.resource_id.clone());
        respond(self.read(&reference, |state| {
            let node = state.lookup(&reference)?;
            Ok(GetPathResponse {
                status: Status::ok(),
                path: absolute(state.mount(), &node.path),
            })
        }))
    }

    async fn get_quota(&self, req: ReferenceRequest) -> Result<GetQuotaResponse> {
        respond(self.read(&req.reference, |state| {
            Ok(GetQuotaResponse {
                status: Status::ok(),
                total_bytes: state.space.quota.unwrap_or(0),
                used_bytes: state.nodes.values().map(|n| n.size).sum(),
            })
        }))
    }

    async fn create_reference(&self, req: CreateReferenceRequest) -> Result<StatusResponse> {
        respond(self.write(&req.reference, |state| {
            let path = state.resolve(&req.reference)?;
            if state.find(&path).is_some() {
                return Err(Status::already_exists(format!("{} exists", req.reference)));
            }
            // create missing parent folders
            let mut missing = Vec::new();
            let mut current = parent(&path);
            while let Some(p) = current {
                if state.find(p).is_some() {
                    break;
                }
                missing.push(p.to_string());
                current = parent(p);
            }
            for folder in missing.into_iter().rev() {
                state.insert(folder, ResourceType::Container);
            }
            let id = state.insert(path, ResourceType::Reference);
            if let Some(node) = state.nodes.get_mut(&id) {
                node.target = Some(req.target_uri.clone());
            }
            Ok(StatusResponse::ok())
        }))
    }

    async fn create_storage_space(
        &self,
        req: CreateStorageSpaceRequest,
    ) -> Result<CreateStorageSpaceResponse> {
        if !self.hosts(req.space_type) {
            return respond(Err(Status::invalid_argument(format!(
                "space type {} not supported",
                req.space_type
            ))));
        }
        if req.space_type == SpaceType::Personal {
            let Some(owner) = &req.owner else {
                return respond(Err(Status::invalid_argument(
                    "personal spaces need an owner",
                )));
            };
            let existing = self
                .spaces
                .iter()
                .find(|s| {
                    s.space.space_type == SpaceType::Personal && s.space.is_owned_by(&owner.id)
                })
                .map(|s| s.space.clone());
            if let Some(space) = existing {
                return Ok(CreateStorageSpaceResponse {
                    status: Status::already_exists("personal space already exists"),
                    space: Some(space),
                });
            }
        }

        let space_id = req
            .space_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if let Some(existing) = self.spaces.get(&space_id) {
            return Ok(CreateStorageSpaceResponse {
                status: Status::already_exists(format!("space {space_id} already exists")),
                space: Some(existing.space.clone()),
            });
        }

        let root = ResourceId::space_root(self.storage_id.clone(), space_id.clone());
        let space = StorageSpace {
            id: root.space_ref_id(),
            space_type: req.space_type,
            name: req.name.clone(),
            owner: req.owner.clone(),
            root: root.clone(),
            quota: req.quota,
            path: Some(Self::mount_path(&req, &space_id)),
            trashed: false,
            mtime: Some(Utc::now()),
        };
        let mut nodes = BTreeMap::new();
        nodes.insert(
            space_id.clone(),
            Node::new(space_id.clone(), ".".to_string(), ResourceType::Container),
        );
        self.spaces.insert(
            space_id,
            SpaceState {
                space: space.clone(),
                nodes,
                grants: BTreeMap::new(),
            },
        );
        tracing::debug!(space = %space.id, space_type = %space.space_type, "space created");
        Ok(CreateStorageSpaceResponse {
            status: Status::ok(),
            space: Some(space),
        })
    }

    async fn list_storage_spaces(
        &self,
        req: ListStorageSpacesRequest,
    ) -> Result<ListStorageSpacesResponse> {
        let spaces = self
            .spaces
            .iter()
            .filter(|state| req.unrestricted || state.visible_to(req.requester.as_ref()))
            .filter(|state| req.filters.iter().all(|f| state.matches(f)))
            .map(|state| state.space.clone())
            .collect();
        Ok(ListStorageSpacesResponse {
            status: Status::ok(),
            spaces,
        })
    }

    async fn update_storage_space(
        &self,
        req: UpdateStorageSpaceRequest,
    ) -> Result<UpdateStorageSpaceResponse> {
        let Some(mut state) = self.spaces.get_mut(&req.id.space_id) else {
            return respond(Err(Status::not_found(format!(
                "space {} not found",
                req.id
            ))));
        };
        if state.space.trashed && !req.restore {
            return respond(Err(Status::failed_precondition(format!(
                "space {} is trashed",
                req.id
            ))));
        }
        if req.restore {
            state.space.trashed = false;
        }
        if let Some(name) = &req.name {
            state.space.name = name.clone();
        }
        if let Some(quota) = req.quota {
            state.space.quota = Some(quota);
        }
        state.space.mtime = Some(Utc::now());
        Ok(UpdateStorageSpaceResponse {
            status: Status::ok(),
            space: Some(state.space.clone()),
        })
    }

    async fn delete_storage_space(&self, req: DeleteStorageSpaceRequest) -> Result<StatusResponse> {
        let space_id = req.id.space_id.clone();
        let trashed = match self.spaces.get(&space_id) {
            Some(state) => state.space.trashed,
            None => {
                return respond(Err(Status::not_found(format!(
                    "space {} not found",
                    req.id
                ))))
            }
        };
        match (req.purge, self.deletion) {
            (true, SpaceDeletion::Trash) if !trashed => respond(Err(Status::failed_precondition(
                "space must be disabled before it can be purged",
            ))),
            (true, _) | (false, SpaceDeletion::Remove) => {
                self.spaces.remove(&space_id);
                Ok(StatusResponse::ok())
            }
            (false, SpaceDeletion::Trash) => {
                if let Some(mut state) = self.spaces.get_mut(&space_id) {
                    state.space.trashed = true;
                }
                Ok(StatusResponse::ok())
            }
        }
    }

    async fn add_grant(&self, req: GrantRequest) -> Result<StatusResponse> {
        respond(self.check_grant_failure().and_then(|_| {
            self.write(&req.reference, |state| {
                let id = state.lookup_id(&req.reference)?;
                let grants = state.grants.entry(id).or_default();
                if grants
                    .iter()
                    .any(|g| g.grantee.same_subject(&req.grant.grantee))
                {
                    return Err(Status::already_exists("grant already exists"));
                }
                grants.push(req.grant.clone());
                Ok(StatusResponse::ok())
            })
        }))
    }

    async fn deny_grant(&self, req: DenyGrantRequest) -> Result<StatusResponse> {
        respond(self.check_grant_failure().and_then(|_| {
            self.write(&req.reference, |state| {
                let id = state.lookup_id(&req.reference)?;
                let grants = state.grants.entry(id).or_default();
                grants.retain(|g| !g.grantee.same_subject(&req.grantee));
                grants.push(Grant::new(req.grantee.clone(), ResourcePermissions::none()));
                Ok(StatusResponse::ok())
            })
        }))
    }

    async fn update_grant(&self, req: GrantRequest) -> Result<StatusResponse> {
        respond(self.check_grant_failure().and_then(|_| {
            self.write(&req.reference, |state| {
                let id = state.lookup_id(&req.reference)?;
                let grant = state
                    .grants
                    .get_mut(&id)
                    .and_then(|grants| {
                        grants
                            .iter_mut()
                            .find(|g| g.grantee.same_subject(&req.grant.grantee))
                    })
                    .ok_or_else(|| Status::not_found("grant not found"))?;
                grant.permissions = req.grant.permissions;
                Ok(StatusResponse::ok())
            })
        }))
    }

    async fn remove_grant(&self, req: GrantRequest) -> Result<StatusResponse> {
        respond(self.check_grant_failure().and_then(|_| {
            self.write(&req.reference, |state| {
                let id = state.lookup_id(&req.reference)?;
                let grants = state
                    .grants
                    .get_mut(&id)
                    .ok_or_else(|| Status::not_found("grant not found"))?;
                let before = grants.len();
                grants.retain(|g| !g.grantee.same_subject(&req.grant.grantee));
                if grants.len() == before {
                    return Err(Status::not_found("grant not found"));
                }
                Ok(StatusResponse::ok())
            })
        }))
    }

    async fn list_grants(&self, req: ReferenceRequest) -> Result<ListGrantsResponse> {
        respond(self.read(&req.reference, |state| {
            let node = state.lookup(&req.reference)?;
            Ok(ListGrantsResponse {
                status: Status::ok(),
                grants: state.grants.get(&node.id).cloned().unwrap_or_default(),
            })
        }))
    }

    async fn initiate_file_upload(
        &self,
        req: InitiateFileUploadRequest,
    ) -> Result<InitiateFileUploadResponse> {
        let expiration = self.upload_expiration.map(|lifetime| Utc::now() + lifetime);
        respond(self.write(&req.reference, |state| {
            let path = state.resolve(&req.reference)?;
            let node_id = match state.find(&path) {
                Some(node) if node.resource_type == ResourceType::Container => {
                    return Err(Status::failed_precondition(format!(
                        "{} is a container",
                        req.reference
                    )))
                }
                Some(node) => node.id.clone(),
                None => {
                    state.require_parent(&path)?;
                    state.insert(path, ResourceType::File)
                }
            };
            if let (Some(node), Some(length)) = (state.nodes.get_mut(&node_id), req.length) {
                node.size = length;
            }
            let endpoint = self.transfer_endpoint(&state.space.root.space_id, &node_id);
            let protocols = ["simple", "tus"]
                .into_iter()
                .map(|protocol| FileUploadProtocol {
                    protocol: protocol.to_string(),
                    upload_endpoint: endpoint.clone(),
                    token: None,
                    expose: self.expose_transfers,
                    expiration,
                    available_checksums: vec!["sha1".to_string(), "md5".to_string()],
                })
                .collect();
            Ok(InitiateFileUploadResponse {
                status: Status::ok(),
                protocols,
            })
        }))
    }

    async fn initiate_file_download(
        &self,
        req: ReferenceRequest,
    ) -> Result<InitiateFileDownloadResponse> {
        respond(self.read(&req.reference, |state| {
            let node = state.lookup(&req.reference)?;
            if node.resource_type == ResourceType::Container {
                return Err(Status::failed_precondition(format!(
                    "{} is a container",
                    req.reference
                )));
            }
            Ok(InitiateFileDownloadResponse {
                status: Status::ok(),
                protocols: vec![FileDownloadProtocol {
                    protocol: "simple".to_string(),
                    download_endpoint: self
                        .transfer_endpoint(&state.space.root.space_id, &node.id),
                    token: None,
                    expose: self.expose_transfers,
                    expiration: None,
                }],
            })
        }))
    }
}

fn is_expired(lock: &Lock) -> bool {
    lock.expiration.is_some_and(|exp| exp < Utc::now())
}

/// Join a path relative to `base`; `./x`, `/x` and `x` are all relative
fn join(base: &str, rel: &str) -> String {
    let mut rel = rel;
    while let Some(rest) = rel.strip_prefix("./") {
        rel = rest;
    }
    let rel = rel.trim_start_matches('/').trim_end_matches('/');
    if rel.is_empty() || rel == "." {
        base.to_string()
    } else if base == "." {
        format!("./{rel}")
    } else {
        format!("{base}/{rel}")
    }
}

fn parent(path: &str) -> Option<&str> {
    if path == "." {
        None
    } else {
        path.rsplit_once('/').map(|(p, _)| p)
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

fn absolute(mount: &str, rel: &str) -> String {
    let rel = rel.trim_start_matches('.').trim_start_matches('/');
    if rel.is_empty() {
        mount.to_string()
    } else {
        format!("{}/{}", mount.trim_end_matches('/'), rel)
    }
}

fn guess_mime_type(path: &str) -> String {
    let mime_type = match path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "txt" || ext == "md" => "text/plain",
        Some(ext) if ext == "odt" => "application/vnd.oasis.opendocument.text",
        Some(ext) if ext == "docx" => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some(ext) if ext == "pdf" => "application/pdf",
        Some(ext) if ext == "png" => "image/png",
        _ => "application/octet-stream",
    };
    mime_type.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(name: &str) -> User {
        User {
            id: UserId::new("https://idp.example.org", name),
            username: name.to_string(),
            display_name: name.to_string(),
            ..Default::default()
        }
    }

    async fn personal_space(provider: &MemoryStorageProvider, name: &str) -> StorageSpace {
        provider
            .create_storage_space(CreateStorageSpaceRequest {
                owner: Some(owner(name)),
                space_type: SpaceType::Personal,
                name: name.to_string(),
                quota: None,
                space_id: Some(name.to_string()),
            })
            .await
            .unwrap()
            .space
            .unwrap()
    }

    fn at(space: &StorageSpace, path: &str) -> Reference {
        Reference::relative(space.root.clone(), path)
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(join(".", "./docs"), "./docs");
        assert_eq!(join("./docs", "a.txt"), "./docs/a.txt");
        assert_eq!(join("./docs", ""), "./docs");
        assert_eq!(join(".", "/docs/"), "./docs");
        assert_eq!(parent("./docs/a.txt"), Some("./docs"));
        assert_eq!(parent("./docs"), Some("."));
        assert_eq!(parent("."), None);
        assert!(is_descendant("./docs/a.txt", "./docs"));
        assert!(!is_descendant("./docs2", "./docs"));
        assert_eq!(absolute("/users/einstein", "./docs"), "/users/einstein/docs");
        assert_eq!(absolute("/users/einstein", "."), "/users/einstein");
    }

    #[tokio::test]
    async fn test_personal_space_is_unique_per_owner() {
        let provider = MemoryStorageProvider::new("storage-1", "http://data");
        let space = personal_space(&provider, "einstein").await;
        assert_eq!(space.root, ResourceId::space_root("storage-1", "einstein"));
        assert_eq!(space.path.as_deref(), Some("/users/einstein"));

        let again = provider
            .create_storage_space(CreateStorageSpaceRequest {
                owner: Some(owner("einstein")),
                space_type: SpaceType::Personal,
                name: "einstein".into(),
                quota: None,
                space_id: None,
            })
            .await
            .unwrap();
        assert_eq!(again.status.code, Code::AlreadyExists);
        assert_eq!(provider.spaces().len(), 1);
    }

    #[tokio::test]
    async fn test_tree_operations() {
        let provider = MemoryStorageProvider::new("storage-1", "http://data");
        let space = personal_space(&provider, "einstein").await;

        let res = provider
            .create_container(ReferenceRequest::new(at(&space, "./docs")))
            .await
            .unwrap();
        assert!(res.status.is_ok());
        provider
            .touch_file(ReferenceRequest::new(at(&space, "./docs/notes.txt")))
            .await
            .unwrap();

        let listing = provider
            .list_container(ListContainerRequest {
                reference: at(&space, "./docs"),
                metadata_keys: vec![],
            })
            .await
            .unwrap();
        assert_eq!(listing.infos.len(), 1);
        assert_eq!(listing.infos[0].path, "/users/einstein/docs/notes.txt");
        assert_eq!(listing.infos[0].mime_type, "text/plain");

        let moved = provider
            .move_resource(MoveRequest {
                source: at(&space, "./docs"),
                destination: at(&space, "./papers"),
            })
            .await
            .unwrap();
        assert!(moved.status.is_ok());
        let stat = provider
            .stat(StatRequest {
                reference: at(&space, "./papers/notes.txt"),
                metadata_keys: vec![],
            })
            .await
            .unwrap();
        assert!(stat.status.is_ok());

        let deleted = provider
            .delete(DeleteRequest {
                reference: at(&space, "./papers"),
                deleting_shared_resource: false,
            })
            .await
            .unwrap();
        assert!(deleted.status.is_ok());
        let stat = provider
            .stat(StatRequest {
                reference: at(&space, "./papers/notes.txt"),
                metadata_keys: vec![],
            })
            .await
            .unwrap();
        assert_eq!(stat.status.code, Code::NotFound);
    }

    #[tokio::test]
    async fn test_create_container_needs_parent() {
        let provider = MemoryStorageProvider::new("storage-1", "http://data");
        let space = personal_space(&provider, "einstein").await;
        let res = provider
            .create_container(ReferenceRequest::new(at(&space, "./a/b")))
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::FailedPrecondition);
    }

    #[tokio::test]
    async fn test_locks() {
        let provider = MemoryStorageProvider::new("storage-1", "http://data");
        let space = personal_space(&provider, "einstein").await;
        let file = at(&space, "./report.odt");
        provider
            .touch_file(ReferenceRequest::new(file.clone()))
            .await
            .unwrap();

        let lock = Lock {
            lock_id: "lock-1".into(),
            lock_type: LockType::Exclusive,
            user: None,
            app_name: "office".into(),
            expiration: None,
        };
        let res = provider
            .set_lock(LockRequest {
                reference: file.clone(),
                lock: lock.clone(),
            })
            .await
            .unwrap();
        assert!(res.status.is_ok());

        let other = Lock {
            lock_id: "lock-2".into(),
            ..lock.clone()
        };
        let res = provider
            .set_lock(LockRequest {
                reference: file.clone(),
                lock: other.clone(),
            })
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::FailedPrecondition);

        let res = provider
            .unlock(LockRequest {
                reference: file.clone(),
                lock: other,
            })
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::FailedPrecondition);

        let res = provider
            .unlock(LockRequest {
                reference: file.clone(),
                lock,
            })
            .await
            .unwrap();
        assert!(res.status.is_ok());
        let res = provider.get_lock(ReferenceRequest::new(file)).await.unwrap();
        assert_eq!(res.status.code, Code::NotFound);
    }

    #[tokio::test]
    async fn test_trash_then_purge() {
        let provider = MemoryStorageProvider::new("storage-1", "http://data");
        let space = personal_space(&provider, "einstein").await;

        let res = provider
            .delete_storage_space(DeleteStorageSpaceRequest {
                id: space.root.clone(),
                purge: true,
            })
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::FailedPrecondition);

        provider
            .delete_storage_space(DeleteStorageSpaceRequest {
                id: space.root.clone(),
                purge: false,
            })
            .await
            .unwrap();
        assert!(provider.spaces()[0].trashed);

        let res = provider
            .delete_storage_space(DeleteStorageSpaceRequest {
                id: space.root.clone(),
                purge: true,
            })
            .await
            .unwrap();
        assert!(res.status.is_ok());
        assert!(provider.spaces().is_empty());
    }

    #[tokio::test]
    async fn test_restore_trashed_space() {
        let provider = MemoryStorageProvider::new("storage-1", "http://data");
        let space = personal_space(&provider, "einstein").await;
        provider
            .delete_storage_space(DeleteStorageSpaceRequest {
                id: space.root.clone(),
                purge: false,
            })
            .await
            .unwrap();

        let res = provider
            .update_storage_space(UpdateStorageSpaceRequest {
                id: space.root.clone(),
                name: Some("renamed".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::FailedPrecondition);

        let res = provider
            .update_storage_space(UpdateStorageSpaceRequest {
                id: space.root.clone(),
                restore: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(res.status.is_ok());
        assert!(!res.space.unwrap().trashed);
    }

    #[tokio::test]
    async fn test_grants_match_on_subject() {
        let provider = MemoryStorageProvider::new("storage-1", "http://data");
        let space = personal_space(&provider, "einstein").await;
        let root = Reference::from_id(space.root.clone());
        let grant = Grant::new(
            Grantee::user(UserId::new("https://idp.example.org", "marie")),
            ResourcePermissions::viewer(),
        );
        provider
            .add_grant(GrantRequest {
                reference: root.clone(),
                grant: grant.clone(),
                space_grant: true,
            })
            .await
            .unwrap();

        let res = provider
            .remove_grant(GrantRequest {
                reference: root.clone(),
                grant: Grant::new(
                    Grantee::user(UserId::new("", "marie")),
                    ResourcePermissions::viewer(),
                ),
                space_grant: true,
            })
            .await
            .unwrap();
        assert!(res.status.is_ok());
        assert!(provider.grants_of(&space.root).is_empty());
    }

    #[tokio::test]
    async fn test_grant_failure_injection() {
        let provider = MemoryStorageProvider::new("storage-1", "http://data");
        let space = personal_space(&provider, "einstein").await;
        provider.fail_grants_with(Some(Status::unimplemented("no acls")));
        let res = provider
            .add_grant(GrantRequest {
                reference: Reference::from_id(space.root.clone()),
                grant: Grant::new(
                    Grantee::user(UserId::new("idp", "marie")),
                    ResourcePermissions::viewer(),
                ),
                space_grant: false,
            })
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_list_spaces_by_grantee() {
        let provider = MemoryStorageProvider::new("storage-1", "http://data");
        let space = personal_space(&provider, "einstein").await;
        personal_space(&provider, "marie").await;
        provider
            .add_grant(GrantRequest {
                reference: Reference::from_id(space.root.clone()),
                grant: Grant::new(
                    Grantee::user(UserId::new("idp", "richard")),
                    ResourcePermissions::viewer(),
                ),
                space_grant: true,
            })
            .await
            .unwrap();

        let res = provider
            .list_storage_spaces(ListStorageSpacesRequest {
                filters: vec![SpaceFilter::User(UserId::new("idp", "richard"))],
                unrestricted: true,
                requester: None,
            })
            .await
            .unwrap();
        assert_eq!(res.spaces.len(), 1);
        assert_eq!(res.spaces[0].root, space.root);
    }

    #[tokio::test]
    async fn test_restricted_listing_only_shows_accessible_spaces() {
        let provider = MemoryStorageProvider::new("storage-1", "http://data");
        let einstein = personal_space(&provider, "einstein").await;
        let marie = personal_space(&provider, "marie").await;
        provider
            .add_grant(GrantRequest {
                reference: Reference::from_id(einstein.root.clone()),
                grant: Grant::new(
                    Grantee::user(UserId::new("idp", "richard")),
                    ResourcePermissions::viewer(),
                ),
                space_grant: true,
            })
            .await
            .unwrap();
        let list = |requester: Option<&str>, unrestricted: bool| ListStorageSpacesRequest {
            filters: vec![],
            unrestricted,
            requester: requester.map(|id| UserId::new("idp", id)),
        };

        let res = provider.list_storage_spaces(list(Some("marie"), false)).await.unwrap();
        assert_eq!(res.spaces.len(), 1);
        assert_eq!(res.spaces[0].root, marie.root);

        let res = provider.list_storage_spaces(list(Some("richard"), false)).await.unwrap();
        assert_eq!(res.spaces.len(), 1);
        assert_eq!(res.spaces[0].root, einstein.root);

        let res = provider.list_storage_spaces(list(None, false)).await.unwrap();
        assert!(res.spaces.is_empty());

        let res = provider.list_storage_spaces(list(Some("marie"), true)).await.unwrap();
        assert_eq!(res.spaces.len(), 2);
    }

    #[tokio::test]
    async fn test_transfer_endpoints() {
        let provider = MemoryStorageProvider::new("storage-1", "http://data:9158/data")
            .with_upload_expiration(Duration::minutes(5));
        let space = personal_space(&provider, "einstein").await;
        let res = provider
            .initiate_file_upload(InitiateFileUploadRequest {
                reference: at(&space, "./upload.bin"),
                length: Some(42),
            })
            .await
            .unwrap();
        assert_eq!(res.protocols.len(), 2);
        assert!(res.protocols[0]
            .upload_endpoint
            .starts_with("http://data:9158/data/einstein/"));
        assert!(!res.protocols[0].expose);
        assert!(res.protocols[0].expiration.is_some());

        let res = provider
            .initiate_file_download(ReferenceRequest::new(at(&space, "./upload.bin")))
            .await
            .unwrap();
        assert!(res.status.is_ok());
        assert_eq!(res.protocols.len(), 1);
    }
}
