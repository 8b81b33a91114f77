//! JSON-over-HTTP clients for remote collaborators
//!
//! Every call is a `POST {base}/{Service}/{Method}` carrying the request as a
//! JSON body and answering with the JSON response, status included. A non-2xx
//! HTTP status is a transport failure, not a domain one.

use crate::*;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Client of one collaborator address; implements every contract
#[derive(Clone)]
pub struct HttpService {
    client: Client,
    base: Url,
}

impl HttpService {
    /// `address` is either a url or a bare `host:port`
    pub fn new(client: Client, address: &str) -> Result<Self> {
        let base = if address.contains("://") {
            Url::parse(address)?
        } else {
            Url::parse(&format!("http://{address}"))?
        };
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, service: &str, method: &str) -> Result<Url> {
        let base = self.base.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{service}/{method}"))?)
    }

    #[instrument(skip(self, req), fields(base = %self.base))]
    async fn call<Req, Resp>(&self, service: &str, method: &str, req: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(service, method)?;
        let response = self.client.post(url).json(req).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http(format!(
                "{service}/{method} failed ({status}): {error}"
            )));
        }
        let body = response.bytes().await?;
        debug!(bytes = body.len(), "collaborator response");
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait::async_trait]
impl StorageRegistry for HttpService {
    async fn list_storage_providers(
        &self,
        req: ListStorageProvidersRequest,
    ) -> Result<ListStorageProvidersResponse> {
        self.call("StorageRegistry", "ListStorageProviders", &req).await
    }

    async fn get_storage_providers(
        &self,
        req: GetStorageProvidersRequest,
    ) -> Result<GetStorageProvidersResponse> {
        self.call("StorageRegistry", "GetStorageProviders", &req).await
    }
}

#[async_trait::async_trait]
impl StorageProvider for HttpService {
    async fn stat(&self, req: StatRequest) -> Result<StatResponse> {
        self.call("StorageProvider", "Stat", &req).await
    }

    async fn list_container(&self, req: ListContainerRequest) -> Result<ListContainerResponse> {
        self.call("StorageProvider", "ListContainer", &req).await
    }

    async fn create_container(&self, req: ReferenceRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "CreateContainer", &req).await
    }

    async fn touch_file(&self, req: ReferenceRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "TouchFile", &req).await
    }

    async fn delete(&self, req: DeleteRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "Delete", &req).await
    }

    async fn move_resource(&self, req: MoveRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "Move", &req).await
    }

    async fn set_arbitrary_metadata(
        &self,
        req: SetArbitraryMetadataRequest,
    ) -> Result<StatusResponse> {
        self.call("StorageProvider", "SetArbitraryMetadata", &req).await
    }

    async fn unset_arbitrary_metadata(
        &self,
        req: UnsetArbitraryMetadataRequest,
    ) -> Result<StatusResponse> {
        self.call("StorageProvider", "UnsetArbitraryMetadata", &req).await
    }

    async fn set_lock(&self, req: LockRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "SetLock", &req).await
    }

    async fn get_lock(&self, req: ReferenceRequest) -> Result<GetLockResponse> {
        self.call("StorageProvider", "GetLock", &req).await
    }

    async fn refresh_lock(&self, req: LockRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "RefreshLock", &req).await
    }

    async fn unlock(&self, req: LockRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "Unlock", &req).await
    }

    async fn get_path(&self, req: GetPathRequest) -> Result<GetPathResponse> {
        self.call("StorageProvider", "GetPath", &req).await
    }

    async fn get_quota(&self, req: ReferenceRequest) -> Result<GetQuotaResponse> {
        self.call("StorageProvider", "GetQuota", &req).await
    }

    async fn create_reference(&self, req: CreateReferenceRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "CreateReference", &req).await
    }

    async fn create_storage_space(
        &self,
        req: CreateStorageSpaceRequest,
    ) -> Result<CreateStorageSpaceResponse> {
        self.call("StorageProvider", "CreateStorageSpace", &req).await
    }

    async fn list_storage_spaces(
        &self,
        req: ListStorageSpacesRequest,
    ) -> Result<ListStorageSpacesResponse> {
        self.call("StorageProvider", "ListStorageSpaces", &req).await
    }

    async fn update_storage_space(
        &self,
        req: UpdateStorageSpaceRequest,
    ) -> Result<UpdateStorageSpaceResponse> {
        self.call("StorageProvider", "UpdateStorageSpace", &req).await
    }

    async fn delete_storage_space(&self, req: DeleteStorageSpaceRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "DeleteStorageSpace", &req).await
    }

    async fn add_grant(&self, req: GrantRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "AddGrant", &req).await
    }

    async fn deny_grant(&self, req: DenyGrantRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "DenyGrant", &req).await
    }

    async fn update_grant(&self, req: GrantRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "UpdateGrant", &req).await
    }

    async fn remove_grant(&self, req: GrantRequest) -> Result<StatusResponse> {
        self.call("StorageProvider", "RemoveGrant", &req).await
    }

    async fn list_grants(&self, req: ReferenceRequest) -> Result<ListGrantsResponse> {
        self.call("StorageProvider", "ListGrants", &req).await
    }

    async fn initiate_file_upload(
        &self,
        req: InitiateFileUploadRequest,
    ) -> Result<InitiateFileUploadResponse> {
        self.call("StorageProvider", "InitiateFileUpload", &req).await
    }

    async fn initiate_file_download(
        &self,
        req: ReferenceRequest,
    ) -> Result<InitiateFileDownloadResponse> {
        self.call("StorageProvider", "InitiateFileDownload", &req).await
    }
}

#[async_trait::async_trait]
impl AuthRegistry for HttpService {
    async fn get_auth_providers(
        &self,
        req: GetAuthProvidersRequest,
    ) -> Result<GetAuthProvidersResponse> {
        self.call("AuthRegistry", "GetAuthProviders", &req).await
    }
}

#[async_trait::async_trait]
impl AuthProvider for HttpService {
    async fn authenticate(
        &self,
        req: ProviderAuthenticateRequest,
    ) -> Result<ProviderAuthenticateResponse> {
        self.call("AuthProvider", "Authenticate", &req).await
    }
}

#[async_trait::async_trait]
impl ShareManager for HttpService {
    async fn create_share(&self, req: CreateShareRequest) -> Result<ShareResponse> {
        self.call("ShareManager", "CreateShare", &req).await
    }

    async fn get_share(&self, req: ShareReferenceRequest) -> Result<ShareResponse> {
        self.call("ShareManager", "GetShare", &req).await
    }

    async fn remove_share(&self, req: ShareReferenceRequest) -> Result<StatusResponse> {
        self.call("ShareManager", "RemoveShare", &req).await
    }

    async fn update_share(&self, req: UpdateShareRequest) -> Result<ShareResponse> {
        self.call("ShareManager", "UpdateShare", &req).await
    }

    async fn list_shares(&self, req: ListSharesRequest) -> Result<ListSharesResponse> {
        self.call("ShareManager", "ListShares", &req).await
    }

    async fn list_received_shares(
        &self,
        req: ListReceivedSharesRequest,
    ) -> Result<ListReceivedSharesResponse> {
        self.call("ShareManager", "ListReceivedShares", &req).await
    }

    async fn get_received_share(
        &self,
        req: GetReceivedShareRequest,
    ) -> Result<ReceivedShareResponse> {
        self.call("ShareManager", "GetReceivedShare", &req).await
    }

    async fn update_received_share(
        &self,
        req: UpdateReceivedShareRequest,
    ) -> Result<ReceivedShareResponse> {
        self.call("ShareManager", "UpdateReceivedShare", &req).await
    }
}

#[async_trait::async_trait]
impl PublicShareManager for HttpService {
    async fn create_public_share(
        &self,
        req: CreatePublicShareRequest,
    ) -> Result<PublicShareResponse> {
        self.call("PublicShareManager", "CreatePublicShare", &req).await
    }

    async fn get_public_share(&self, req: IdRequest) -> Result<PublicShareResponse> {
        self.call("PublicShareManager", "GetPublicShare", &req).await
    }

    async fn list_public_shares(&self, req: ListSharesRequest) -> Result<ListPublicSharesResponse> {
        self.call("PublicShareManager", "ListPublicShares", &req).await
    }

    async fn remove_public_share(&self, req: IdRequest) -> Result<StatusResponse> {
        self.call("PublicShareManager", "RemovePublicShare", &req).await
    }
}

#[async_trait::async_trait]
impl OcmShareManager for HttpService {
    async fn create_ocm_share(&self, req: CreateOcmShareRequest) -> Result<OcmShareResponse> {
        self.call("OcmShareManager", "CreateOcmShare", &req).await
    }

    async fn get_ocm_share(&self, req: IdRequest) -> Result<OcmShareResponse> {
        self.call("OcmShareManager", "GetOcmShare", &req).await
    }

    async fn remove_ocm_share(&self, req: IdRequest) -> Result<StatusResponse> {
        self.call("OcmShareManager", "RemoveOcmShare", &req).await
    }

    async fn list_ocm_shares(&self, req: ListSharesRequest) -> Result<ListOcmSharesResponse> {
        self.call("OcmShareManager", "ListOcmShares", &req).await
    }

    async fn list_received_ocm_shares(
        &self,
        req: ListReceivedSharesRequest,
    ) -> Result<ListReceivedOcmSharesResponse> {
        self.call("OcmShareManager", "ListReceivedOcmShares", &req).await
    }

    async fn get_received_ocm_share(
        &self,
        req: GetReceivedOcmShareRequest,
    ) -> Result<ReceivedOcmShareResponse> {
        self.call("OcmShareManager", "GetReceivedOcmShare", &req).await
    }

    async fn update_received_ocm_share(
        &self,
        req: UpdateReceivedOcmShareRequest,
    ) -> Result<ReceivedOcmShareResponse> {
        self.call("OcmShareManager", "UpdateReceivedOcmShare", &req).await
    }
}

#[async_trait::async_trait]
impl MeshDirectory for HttpService {
    async fn get_info_by_domain(
        &self,
        req: GetInfoByDomainRequest,
    ) -> Result<GetInfoByDomainResponse> {
        self.call("MeshDirectory", "GetInfoByDomain", &req).await
    }
}

#[async_trait::async_trait]
impl DataTransfer for HttpService {
    async fn create_transfer(&self, req: CreateTransferRequest) -> Result<CreateTransferResponse> {
        self.call("DataTransfer", "CreateTransfer", &req).await
    }
}

#[async_trait::async_trait]
impl AppRegistry for HttpService {
    async fn get_app_providers(
        &self,
        req: GetAppProvidersRequest,
    ) -> Result<GetAppProvidersResponse> {
        self.call("AppRegistry", "GetAppProviders", &req).await
    }

    async fn get_default_app_provider(
        &self,
        req: GetDefaultAppProviderRequest,
    ) -> Result<GetDefaultAppProviderResponse> {
        self.call("AppRegistry", "GetDefaultAppProvider", &req).await
    }
}

#[async_trait::async_trait]
impl AppProvider for HttpService {
    async fn open_in_app(&self, req: AppOpenRequest) -> Result<OpenInAppResponse> {
        self.call("AppProvider", "OpenInApp", &req).await
    }
}

/// Client of a partner gateway's public RPC surface
pub struct HttpRemoteGateway {
    client: Client,
    endpoint: Url,
}

impl HttpRemoteGateway {
    pub fn new(endpoint: &str, options: TransportOptions, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(options.insecure || options.skip_verify)
            .build()
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
        })
    }
}

#[async_trait::async_trait]
impl RemoteGateway for HttpRemoteGateway {
    #[instrument(skip(self, token, req), fields(endpoint = %self.endpoint))]
    async fn open_in_app(&self, token: &str, req: OpenInAppRequest) -> Result<OpenInAppResponse> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        let url = Url::parse(&format!("{base}/rpc/OpenInApp"))?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&req)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        // the partner renders domain failures as a status body with a non-2xx code
        match serde_json::from_slice::<OpenInAppResponse>(&body) {
            Ok(res) => Ok(res),
            Err(_) if !status.is_success() => Err(ServiceError::Http(format!(
                "remote OpenInApp failed ({status}): {}",
                String::from_utf8_lossy(&body)
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

/// Dials collaborators over HTTP, sharing one connection pool
#[derive(Clone)]
pub struct HttpPool {
    client: Client,
    timeout: Duration,
}

impl HttpPool {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Configuration(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    fn service(&self, address: &str) -> Result<Arc<HttpService>> {
        if address.is_empty() {
            return Err(ServiceError::InvalidAddress("empty address".into()));
        }
        Ok(Arc::new(HttpService::new(self.client.clone(), address)?))
    }
}

impl ServicePool for HttpPool {
    fn storage_registry(&self, address: &str) -> Result<Arc<dyn StorageRegistry>> {
        Ok(self.service(address)?)
    }

    fn storage_provider(&self, address: &str) -> Result<Arc<dyn StorageProvider>> {
        Ok(self.service(address)?)
    }

    fn auth_registry(&self, address: &str) -> Result<Arc<dyn AuthRegistry>> {
        Ok(self.service(address)?)
    }

    fn auth_provider(&self, address: &str) -> Result<Arc<dyn AuthProvider>> {
        Ok(self.service(address)?)
    }

    fn share_manager(&self, address: &str) -> Result<Arc<dyn ShareManager>> {
        Ok(self.service(address)?)
    }

    fn public_share_manager(&self, address: &str) -> Result<Arc<dyn PublicShareManager>> {
        Ok(self.service(address)?)
    }

    fn ocm_share_manager(&self, address: &str) -> Result<Arc<dyn OcmShareManager>> {
        Ok(self.service(address)?)
    }

    fn mesh_directory(&self, address: &str) -> Result<Arc<dyn MeshDirectory>> {
        Ok(self.service(address)?)
    }

    fn data_transfer(&self, address: &str) -> Result<Arc<dyn DataTransfer>> {
        Ok(self.service(address)?)
    }

    fn app_registry(&self, address: &str) -> Result<Arc<dyn AppRegistry>> {
        Ok(self.service(address)?)
    }

    fn app_provider(&self, address: &str) -> Result<Arc<dyn AppProvider>> {
        Ok(self.service(address)?)
    }

    fn remote_gateway(
        &self,
        endpoint: &str,
        options: TransportOptions,
    ) -> Result<Arc<dyn RemoteGateway>> {
        Ok(Arc::new(HttpRemoteGateway::new(endpoint, options, self.timeout)?))
    }
}
