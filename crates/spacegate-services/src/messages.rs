//! Request/response pairs of the RPC schema
//!
//! Every response carries a [`Status`]; payload fields are only meaningful when
//! the status is OK.

use crate::status::{Status, WithStatus};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

macro_rules! with_status {
    ($($t:ty),* $(,)?) => {
        $(
            impl WithStatus for $t {
                fn status(&self) -> &Status {
                    &self.status
                }

                fn from_status(status: Status) -> Self {
                    Self {
                        status,
                        ..Default::default()
                    }
                }
            }
        )*
    };
}

/// Response of operations that only report a status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: Status,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self::default()
    }
}

/// Request that only names a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRequest {
    pub reference: Reference,
}

impl ReferenceRequest {
    pub fn new(reference: Reference) -> Self {
        Self { reference }
    }
}

// Storage registry

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListStorageProvidersRequest {
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListStorageProvidersResponse {
    pub status: Status,
    #[serde(default)]
    pub providers: Vec<ProviderInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetStorageProvidersRequest {
    pub space: StorageSpace,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetStorageProvidersResponse {
    pub status: Status,
    #[serde(default)]
    pub providers: Vec<ProviderInfo>,
}

// Storage provider

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatRequest {
    pub reference: Reference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<ResourceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListContainerRequest {
    pub reference: Reference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListContainerResponse {
    pub status: Status,
    #[serde(default)]
    pub infos: Vec<ResourceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub reference: Reference,
    /// The resource is being deleted as part of unsharing it
    #[serde(default)]
    pub deleting_shared_resource: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub source: Reference,
    pub destination: Reference,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetArbitraryMetadataRequest {
    pub reference: Reference,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnsetArbitraryMetadataRequest {
    pub reference: Reference,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRequest {
    pub reference: Reference,
    pub lock: Lock,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetLockResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<Lock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetPathRequest {
    pub resource_id: ResourceId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetPathResponse {
    pub status: Status,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetQuotaResponse {
    pub status: Status,
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default)]
    pub used_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateReferenceRequest {
    pub reference: Reference,
    pub target_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateStorageSpaceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<User>,
    pub space_type: SpaceType,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<u64>,
    /// Requested space id, e.g. the owner's user id for a personal space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateStorageSpaceResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<StorageSpace>,
}

/// Filters accepted by `ListStorageSpaces`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceFilter {
    Id(ResourceId),
    Owner(UserId),
    SpaceType(SpaceType),
    User(UserId),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListStorageSpacesRequest {
    #[serde(default)]
    pub filters: Vec<SpaceFilter>,
    /// List spaces regardless of the caller's own access
    #[serde(default)]
    pub unrestricted: bool,
    /// User a restricted listing is scoped to; set by the gateway from the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListStorageSpacesResponse {
    pub status: Status,
    #[serde(default)]
    pub spaces: Vec<StorageSpace>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStorageSpaceRequest {
    /// Root of the space to update
    pub id: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<u64>,
    /// Bring a trashed space back
    #[serde(default)]
    pub restore: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStorageSpaceResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<StorageSpace>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteStorageSpaceRequest {
    /// Root of the space to delete
    pub id: ResourceId,
    /// Remove the space for good instead of trashing it
    #[serde(default)]
    pub purge: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRequest {
    pub reference: Reference,
    pub grant: Grant,
    /// The grant is a membership of the space rather than an ACL entry
    #[serde(default)]
    pub space_grant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenyGrantRequest {
    pub reference: Reference,
    pub grantee: Grantee,
    #[serde(default)]
    pub space_grant: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListGrantsResponse {
    pub status: Status,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitiateFileUploadRequest {
    pub reference: Reference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitiateFileUploadResponse {
    pub status: Status,
    #[serde(default)]
    pub protocols: Vec<FileUploadProtocol>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitiateFileDownloadResponse {
    pub status: Status,
    #[serde(default)]
    pub protocols: Vec<FileDownloadProtocol>,
}

// Authentication

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAuthProvidersRequest {
    pub auth_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAuthProvidersResponse {
    pub status: Status,
    #[serde(default)]
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderAuthenticateRequest {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderAuthenticateResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_scope: Option<TokenScope>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    /// Authentication type, selects the auth provider
    #[serde(rename = "type")]
    pub auth_type: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticateResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

// Spaces, gateway side

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateHomeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetHomeResponse {
    pub status: Status,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalSpaceRequest {
    pub user_id: UserId,
}

// Shares

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareGrant {
    pub grantee: Grantee,
    pub permissions: ResourcePermissions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateShareRequest {
    pub resource_info: ResourceInfo,
    pub grant: ShareGrant,
    /// Filled in by the gateway from the calling identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShareResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<Share>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareReferenceRequest {
    pub reference: ShareReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateShareRequest {
    pub reference: ShareReference,
    pub permissions: ResourcePermissions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListSharesRequest {
    #[serde(default)]
    pub filters: Vec<ShareFilter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListSharesResponse {
    pub status: Status,
    #[serde(default)]
    pub shares: Vec<Share>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListReceivedSharesRequest {
    /// Filled in by the gateway from the calling identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListReceivedSharesResponse {
    pub status: Status,
    #[serde(default)]
    pub shares: Vec<ReceivedShare>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetReceivedShareRequest {
    pub reference: ShareReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceivedShareResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<ReceivedShare>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateReceivedShareRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<ReceivedShare>,
    #[serde(default)]
    pub update_mask: Vec<ReceivedShareField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

// Link shares

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePublicShareRequest {
    pub resource_info: ResourceInfo,
    pub permissions: ResourcePermissions,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicShareResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<PublicShare>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdRequest {
    pub id: String,
}

impl IdRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListPublicSharesResponse {
    pub status: Status,
    #[serde(default)]
    pub shares: Vec<PublicShare>,
}

// Federated shares

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOcmShareRequest {
    pub resource_info: ResourceInfo,
    pub grantee: Grantee,
    pub permissions: ResourcePermissions,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub share_type: OcmShareType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcmShareResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<OcmShare>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListOcmSharesResponse {
    pub status: Status,
    #[serde(default)]
    pub shares: Vec<OcmShare>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetReceivedOcmShareRequest {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceivedOcmShareResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<ReceivedOcmShare>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListReceivedOcmSharesResponse {
    pub status: Status,
    #[serde(default)]
    pub shares: Vec<ReceivedOcmShare>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateReceivedOcmShareRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share: Option<ReceivedOcmShare>,
    #[serde(default)]
    pub update_mask: Vec<ReceivedShareField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Destination folder for transfer shares, relative to the home
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

// Mesh directory and data transfers

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetInfoByDomainRequest {
    pub domain: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetInfoByDomainResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<MeshProvider>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateTransferRequest {
    pub src_target_uri: String,
    pub dest_target_uri: String,
    pub share_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateTransferResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferInfo>,
}

// Apps

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAppProvidersRequest {
    pub resource_info: ResourceInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAppProvidersResponse {
    pub status: Status,
    #[serde(default)]
    pub providers: Vec<AppProviderInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetDefaultAppProviderRequest {
    pub mime_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetDefaultAppProviderResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<AppProviderInfo>,
}

/// Request to an app provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppOpenRequest {
    pub resource_info: ResourceInfo,
    #[serde(default)]
    pub view_mode: ViewMode,
    pub access_token: String,
}

/// Request to the gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenInAppRequest {
    pub reference: Reference,
    #[serde(default)]
    pub view_mode: ViewMode,
    /// Preferred app, empty for the default app of the mime type
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app: String,
    #[serde(default)]
    pub transport: TransportOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenInAppResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_url: Option<AppUrl>,
}

with_status!(
    StatusResponse,
    ListStorageProvidersResponse,
    GetStorageProvidersResponse,
    StatResponse,
    ListContainerResponse,
    GetLockResponse,
    GetPathResponse,
    GetQuotaResponse,
    CreateStorageSpaceResponse,
    ListStorageSpacesResponse,
    UpdateStorageSpaceResponse,
    ListGrantsResponse,
    InitiateFileUploadResponse,
    InitiateFileDownloadResponse,
    GetAuthProvidersResponse,
    ProviderAuthenticateResponse,
    AuthenticateResponse,
    GetHomeResponse,
    ShareResponse,
    ListSharesResponse,
    ListReceivedSharesResponse,
    ReceivedShareResponse,
    PublicShareResponse,
    ListPublicSharesResponse,
    OcmShareResponse,
    ListOcmSharesResponse,
    ReceivedOcmShareResponse,
    ListReceivedOcmSharesResponse,
    GetInfoByDomainResponse,
    CreateTransferResponse,
    GetAppProvidersResponse,
    GetDefaultAppProviderResponse,
    OpenInAppResponse,
);
