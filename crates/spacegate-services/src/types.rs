//! Entities exchanged between the gateway and its collaborators

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Storage and space id of the virtual provider that projects received shares.
///
/// Anything living under it depends on the caller, not on the resource.
pub const SHARES_STORAGE_ID: &str = "a0ca6a90-a365-4782-871e-d44447bbc668";
pub const SHARES_SPACE_ID: &str = SHARES_STORAGE_ID;

/// Separates storage id and space id in a formatted id
pub const STORAGE_ID_DELIMITER: char = '$';
/// Separates the space part and the opaque id in a formatted id
pub const OPAQUE_ID_DELIMITER: char = '!';

/// Opaque identifier of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct ResourceId {
    #[serde(default)]
    pub storage_id: String,
    #[serde(default)]
    pub space_id: String,
    #[serde(default)]
    pub opaque_id: String,
}

impl ResourceId {
    pub fn new(
        storage_id: impl Into<String>,
        space_id: impl Into<String>,
        opaque_id: impl Into<String>,
    ) -> Self {
        Self {
            storage_id: storage_id.into(),
            space_id: space_id.into(),
            opaque_id: opaque_id.into(),
        }
    }

    /// Root id of a space: the opaque id equals the space id
    pub fn space_root(storage_id: impl Into<String>, space_id: impl Into<String>) -> Self {
        let space_id = space_id.into();
        Self {
            storage_id: storage_id.into(),
            opaque_id: space_id.clone(),
            space_id,
        }
    }

    /// Whether this id addresses the root of its space; `storage$space` alone counts
    pub fn is_space_root(&self) -> bool {
        !self.space_id.is_empty() && (self.opaque_id.is_empty() || self.space_id == self.opaque_id)
    }

    /// `storage$space`, or just `space` when the storage id is unknown
    pub fn space_ref_id(&self) -> String {
        if self.storage_id.is_empty() {
            self.space_id.clone()
        } else {
            format!("{}{}{}", self.storage_id, STORAGE_ID_DELIMITER, self.space_id)
        }
    }

    /// Parse `storage$space!opaque`; storage and opaque parts are optional
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        let (space_part, opaque_id) = match s.split_once(OPAQUE_ID_DELIMITER) {
            Some((space, opaque)) => (space, opaque.to_string()),
            None => (s, String::new()),
        };
        let (storage_id, space_id) = match space_part.split_once(STORAGE_ID_DELIMITER) {
            Some((storage, space)) => (storage.to_string(), space.to_string()),
            None => (String::new(), space_part.to_string()),
        };
        if space_id.is_empty() {
            return None;
        }
        Some(Self {
            storage_id,
            space_id,
            opaque_id,
        })
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.space_ref_id())?;
        if !self.opaque_id.is_empty() {
            write!(f, "{}{}", OPAQUE_ID_DELIMITER, self.opaque_id)?;
        }
        Ok(())
    }
}

/// Pointer to a resource, by id (plus relative path) or by absolute path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl Reference {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            resource_id: None,
            path: path.into(),
        }
    }

    pub fn from_id(id: ResourceId) -> Self {
        Self {
            resource_id: Some(id),
            path: String::new(),
        }
    }

    /// Id based reference with a path relative to the id
    pub fn relative(id: ResourceId, path: impl Into<String>) -> Self {
        Self {
            resource_id: Some(id),
            path: path.into(),
        }
    }

    /// Neither a usable id nor a path
    pub fn is_empty(&self) -> bool {
        self.resource_id.is_none() && self.path.is_empty()
    }

    /// Absolute path reference without an id
    pub fn is_absolute_path(&self) -> bool {
        self.resource_id.is_none() && self.path.starts_with('/')
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource_id {
            Some(id) if self.path.is_empty() => write!(f, "{id}"),
            Some(id) => write!(f, "{id}:{}", self.path),
            None => f.write_str(&self.path),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    #[default]
    Primary,
    Guest,
    Federated,
    Service,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct UserId {
    #[serde(default)]
    pub idp: String,
    pub opaque_id: String,
    #[serde(default)]
    pub user_type: UserType,
}

impl UserId {
    pub fn new(idp: impl Into<String>, opaque_id: impl Into<String>) -> Self {
        Self {
            idp: idp.into(),
            opaque_id: opaque_id.into(),
            user_type: UserType::Primary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub mail: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct GroupId {
    #[serde(default)]
    pub idp: String,
    pub opaque_id: String,
}

/// Recipient of a share or grant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Grantee {
    User { id: UserId },
    Group { id: GroupId },
}

impl Grantee {
    pub fn user(id: UserId) -> Self {
        Self::User { id }
    }

    pub fn group(id: GroupId) -> Self {
        Self::Group { id }
    }

    pub fn opaque_id(&self) -> &str {
        match self {
            Self::User { id } => &id.opaque_id,
            Self::Group { id } => &id.opaque_id,
        }
    }

    /// Compares only grantee type and opaque id; stored grants may lack idp/type metadata
    pub fn same_subject(&self, other: &Grantee) -> bool {
        match (self, other) {
            (Self::User { id: a }, Self::User { id: b }) => a.opaque_id == b.opaque_id,
            (Self::Group { id: a }, Self::Group { id: b }) => a.opaque_id == b.opaque_id,
            _ => false,
        }
    }

    /// Whether `user` is this grantee or a member of it
    pub fn includes(&self, user: &User) -> bool {
        match self {
            Self::User { id } => id.opaque_id == user.id.opaque_id,
            Self::Group { id } => user.groups.iter().any(|g| g == &id.opaque_id),
        }
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User { id } => write!(f, "user:{}", id.opaque_id),
            Self::Group { id } => write!(f, "group:{}", id.opaque_id),
        }
    }
}

/// Permission set of a grant or share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResourcePermissions {
    pub stat: bool,
    pub list_container: bool,
    pub initiate_file_download: bool,
    pub initiate_file_upload: bool,
    pub create_container: bool,
    pub delete: bool,
    #[serde(rename = "move")]
    pub move_: bool,
    pub list_grants: bool,
    pub add_grant: bool,
    pub update_grant: bool,
    pub remove_grant: bool,
    pub deny_grant: bool,
}

impl ResourcePermissions {
    /// No permission at all; committing it denies access
    pub fn none() -> Self {
        Self::default()
    }

    pub fn viewer() -> Self {
        Self {
            stat: true,
            list_container: true,
            initiate_file_download: true,
            ..Self::default()
        }
    }

    pub fn editor() -> Self {
        Self {
            initiate_file_upload: true,
            create_container: true,
            delete: true,
            move_: true,
            ..Self::viewer()
        }
    }

    pub fn manager() -> Self {
        Self {
            list_grants: true,
            add_grant: true,
            update_grant: true,
            remove_grant: true,
            deny_grant: true,
            ..Self::editor()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::none()
    }
}

/// Access-control entry stored by a storage backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub grantee: Grantee,
    pub permissions: ResourcePermissions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl Grant {
    pub fn new(grantee: Grantee, permissions: ResourcePermissions) -> Self {
        Self {
            grantee,
            permissions,
            creator: None,
            expiration: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    #[default]
    File,
    Container,
    Reference,
    Symlink,
}

/// Metadata of a resource as returned by stat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceInfo {
    pub id: ResourceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserId>,
    /// Target uri of a reference resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Content is still being processed (e.g. post-processing of an upload)
    #[serde(default)]
    pub processing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceType {
    Personal,
    Project,
    Virtual,
}

impl SpaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Project => "project",
            Self::Virtual => "virtual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "personal" => Some(Self::Personal),
            "project" => Some(Self::Project),
            "virtual" => Some(Self::Virtual),
            _ => None,
        }
    }
}

impl fmt::Display for SpaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named, owned root of a file hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSpace {
    /// `storage$space`
    pub id: String,
    pub space_type: SpaceType,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<User>,
    pub root: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<u64>,
    /// Mount path of the space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub trashed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
}

impl StorageSpace {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.owner
            .as_ref()
            .is_some_and(|o| o.id.opaque_id == user.opaque_id)
    }
}

/// One backend instance and the spaces it serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderInfo {
    pub address: String,
    /// Mount path, used when the registry does not report spaces
    #[serde(default)]
    pub provider_path: String,
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub spaces: Vec<StorageSpace>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShareState {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// Ledger entry offering access to a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub id: String,
    pub resource_id: ResourceId,
    pub grantee: Grantee,
    pub permissions: ResourcePermissions,
    pub owner: UserId,
    pub creator: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctime: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,
}

/// Composite key of a share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareKey {
    pub owner: UserId,
    pub resource_id: ResourceId,
    pub grantee: Grantee,
}

/// Addresses a share by id or by composite key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareReference {
    Id(String),
    Key(ShareKey),
}

impl ShareReference {
    pub fn matches(&self, share: &Share) -> bool {
        match self {
            Self::Id(id) => &share.id == id,
            Self::Key(key) => {
                share.owner.opaque_id == key.owner.opaque_id
                    && share.resource_id == key.resource_id
                    && share.grantee.same_subject(&key.grantee)
            }
        }
    }
}

impl fmt::Display for ShareReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id:{id}"),
            Self::Key(key) => write!(f, "key:{}/{}", key.resource_id, key.grantee),
        }
    }
}

/// Grantee-side projection of a share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedShare {
    pub share: Share,
    #[serde(default)]
    pub state: ShareState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,
}

/// Fields of a received share a grantee may update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceivedShareField {
    State,
    MountPoint,
}

/// Filters for listing shares and link shares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareFilter {
    ResourceId(ResourceId),
    SpaceId(String),
    Owner(UserId),
    Creator(UserId),
}

impl ShareFilter {
    pub fn matches(&self, resource_id: &ResourceId, owner: &UserId, creator: &UserId) -> bool {
        match self {
            Self::ResourceId(id) => resource_id == id,
            Self::SpaceId(space_id) => &resource_id.space_id == space_id,
            Self::Owner(id) => owner.opaque_id == id.opaque_id,
            Self::Creator(id) => creator.opaque_id == id.opaque_id,
        }
    }
}

/// Link share, reachable by token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicShare {
    pub id: String,
    pub token: String,
    pub resource_id: ResourceId,
    pub permissions: ResourcePermissions,
    pub owner: UserId,
    pub creator: UserId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub password_protected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OcmShareType {
    #[default]
    Regular,
    Transfer,
}

/// Share offered to a user of another organisation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcmShare {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub resource_id: ResourceId,
    pub grantee: Grantee,
    pub permissions: ResourcePermissions,
    pub owner: UserId,
    pub creator: UserId,
    #[serde(default)]
    pub share_type: OcmShareType,
    /// Capability the grantee presents to the owner's side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedOcmShare {
    pub share: OcmShare,
    #[serde(default)]
    pub state: ShareState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,
}

/// Role granted by an authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScopeRole {
    #[default]
    Owner,
    Viewer,
    Editor,
    Machine,
    Federated,
    Guest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenScope {
    pub role: ScopeRole,
    /// Resource the scope is restricted to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceId>,
}

impl TokenScope {
    pub fn owner() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    Shared,
    #[default]
    Exclusive,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub lock_id: String,
    #[serde(default)]
    pub lock_type: LockType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserId>,
    #[serde(default)]
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileUploadProtocol {
    pub protocol: String,
    pub upload_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// The backend endpoint may be handed to the client as is
    #[serde(default)]
    pub expose: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_checksums: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FileDownloadProtocol {
    pub protocol: String,
    pub download_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub expose: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

/// Typed service endpoint of a mesh provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshService {
    /// Service type name, e.g. `webdav`, `gateway`, `ocm`
    pub service_type: String,
    /// Endpoint url
    pub path: String,
    #[serde(default)]
    pub host: String,
}

/// Organisation registered in the federation mesh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshProvider {
    pub domain: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub services: Vec<MeshService>,
}

impl MeshProvider {
    /// First service whose type name matches case-insensitively
    pub fn service(&self, service_type: &str) -> Option<&MeshService> {
        self.services
            .iter()
            .find(|s| s.service_type.eq_ignore_ascii_case(service_type))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    #[default]
    New,
    Queued,
    InProgress,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInfo {
    pub id: String,
    #[serde(default)]
    pub status: TransferStatus,
    #[serde(default)]
    pub share_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppProviderInfo {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub mime_types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    View,
    #[default]
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppUrl {
    pub app_url: String,
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub form_parameters: BTreeMap<String, String>,
}

/// Per-call TLS relaxations for dialing a federated partner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TransportOptions {
    pub insecure: bool,
    pub skip_verify: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_id() {
        let id = ResourceId::parse("storage-1$space-1!node-1").unwrap();
        assert_eq!(id, ResourceId::new("storage-1", "space-1", "node-1"));
        assert_eq!(id.to_string(), "storage-1$space-1!node-1");
    }

    #[test]
    fn test_parse_partial_ids() {
        let id = ResourceId::parse("storage-1$space-1").unwrap();
        assert_eq!(id.space_id, "space-1");
        assert!(id.opaque_id.is_empty());

        let id = ResourceId::parse("space-1!node").unwrap();
        assert!(id.storage_id.is_empty());
        assert_eq!(id.opaque_id, "node");

        assert!(ResourceId::parse("").is_none());
        assert!(ResourceId::parse("storage$").is_none());
    }

    #[test]
    fn test_space_root_detection() {
        assert!(ResourceId::space_root("s", "space").is_space_root());
        assert!(!ResourceId::new("s", "space", "file").is_space_root());
        assert!(!ResourceId::new("s", "", "").is_space_root());
        assert!(ResourceId::parse("s$space").unwrap().is_space_root());
    }

    #[test]
    fn test_user_ids_order_by_idp_then_id() {
        let mut ids = vec![
            UserId::new("idp-b", "ann"),
            UserId::new("idp-a", "zoe"),
            UserId {
                user_type: UserType::Guest,
                ..UserId::new("idp-a", "zoe")
            },
        ];
        ids.sort();
        assert_eq!(ids[0].user_type, UserType::Primary);
        assert_eq!(ids[1].user_type, UserType::Guest);
        assert_eq!(ids[2].idp, "idp-b");
    }

    #[test]
    fn test_grantee_same_subject_ignores_idp() {
        let stored = Grantee::user(UserId::new("", "einstein"));
        let requested = Grantee::user(UserId::new("https://idp.example.org", "einstein"));
        assert!(stored.same_subject(&requested));

        let group = Grantee::group(GroupId {
            idp: String::new(),
            opaque_id: "einstein".into(),
        });
        assert!(!group.same_subject(&requested));
    }

    #[test]
    fn test_grantee_includes_group_members() {
        let user = User {
            id: UserId::new("idp", "marie"),
            groups: vec!["physics".into()],
            ..Default::default()
        };
        let group = Grantee::group(GroupId {
            idp: "idp".into(),
            opaque_id: "physics".into(),
        });
        assert!(group.includes(&user));
        assert!(!Grantee::user(UserId::new("idp", "einstein")).includes(&user));
    }

    #[test]
    fn test_permissions_empty() {
        assert!(ResourcePermissions::none().is_empty());
        assert!(!ResourcePermissions::viewer().is_empty());
        assert!(ResourcePermissions::manager().add_grant);
    }

    #[test]
    fn test_mesh_service_lookup_is_case_insensitive() {
        let provider = MeshProvider {
            domain: "cernbox.cern.ch".into(),
            name: "CERNBox".into(),
            services: vec![MeshService {
                service_type: "GATEWAY".into(),
                path: "https://cernbox.cern.ch/gateway".into(),
                host: "cernbox.cern.ch".into(),
            }],
        };
        assert!(provider.service("gateway").is_some());
        assert!(provider.service("webdav").is_none());
    }
}
