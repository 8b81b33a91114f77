//! Gateway wired to in-memory collaborators, for tests

use crate::config::GatewayConfig;
use crate::context::CallContext;
use crate::gateway::Gateway;
use spacegate_services::memory::*;
use spacegate_services::*;
use std::sync::Arc;

pub const PROVIDER_ADDRESS: &str = "localhost:19100";
pub const AUTH_PROVIDER_ADDRESS: &str = "localhost:19200";
pub const APP_PROVIDER_ADDRESS: &str = "localhost:19300";
pub const LOCAL_DOMAIN: &str = "example.org";
pub const PARTNER_DOMAIN: &str = "cesnet.cz";
pub const PARTNER_GATEWAY: &str = "https://gw.cesnet.cz/";
pub const ODT: &str = "application/vnd.oasis.opendocument.text";

pub struct Fixture {
    pub gateway: Gateway,
    pub pool: Arc<MemoryPool>,
    pub provider: Arc<MemoryStorageProvider>,
    pub shares: Arc<MemoryShareManager>,
    pub public_shares: Arc<MemoryPublicShareManager>,
    pub ocm: Arc<MemoryOcmShareManager>,
    pub transfers: Arc<MemoryDataTransfer>,
    pub app_provider: Arc<MemoryAppProvider>,
    pub remote: Arc<MemoryRemoteGateway>,
}

pub fn user(name: &str) -> User {
    User {
        id: UserId::new(LOCAL_DOMAIN, name),
        username: name.to_string(),
        display_name: name.to_string(),
        mail: format!("{name}@{LOCAL_DOMAIN}"),
        groups: vec!["physics".to_string()],
    }
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(
            GatewayConfig::default(),
            MemoryStorageProvider::new("storage-users", "http://localhost:19101/data"),
        )
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        Self::with(
            config,
            MemoryStorageProvider::new("storage-users", "http://localhost:19101/data"),
        )
    }

    pub fn with(config: GatewayConfig, provider: MemoryStorageProvider) -> Self {
        let pool = Arc::new(MemoryPool::new());
        let provider = Arc::new(provider);

        let registry = MemoryStorageRegistry::new();
        registry.register(PROVIDER_ADDRESS, provider.clone());
        pool.register_storage_registry(config.storage_registry.clone(), Arc::new(registry));
        pool.register_storage_provider(PROVIDER_ADDRESS, provider.clone());

        let auth_registry = MemoryAuthRegistry::new();
        auth_registry.register("basic", AUTH_PROVIDER_ADDRESS);
        let auth = MemoryAuthProvider::new();
        auth.add_account("einstein", "relativity", user("einstein"), TokenScope::owner());
        auth.add_account(
            "backup",
            "s3cr3t",
            user("backup"),
            TokenScope {
                role: ScopeRole::Machine,
                resource: None,
            },
        );
        pool.register_auth_registry(config.auth_registry.clone(), Arc::new(auth_registry));
        pool.register_auth_provider(AUTH_PROVIDER_ADDRESS, Arc::new(auth));

        let shares = Arc::new(MemoryShareManager::new());
        let public_shares = Arc::new(MemoryPublicShareManager::new());
        let ocm = Arc::new(MemoryOcmShareManager::new());
        pool.register_share_manager(config.share_manager.clone(), shares.clone());
        pool.register_public_share_manager(config.public_share_manager.clone(), public_shares.clone());
        pool.register_ocm_share_manager(config.ocm_share_manager.clone(), ocm.clone());

        let mesh = MemoryMeshDirectory::new();
        mesh.register(MeshProvider {
            domain: LOCAL_DOMAIN.to_string(),
            name: "Example".to_string(),
            services: vec![MeshService {
                service_type: "webdav".to_string(),
                path: "https://cloud.example.org/remote.php/dav/".to_string(),
                host: "cloud.example.org".to_string(),
            }],
        });
        mesh.register(MeshProvider {
            domain: PARTNER_DOMAIN.to_string(),
            name: "CESNET".to_string(),
            services: vec![
                MeshService {
                    service_type: "WebDAV".to_string(),
                    path: "https://dav.cesnet.cz:8443/webdav".to_string(),
                    host: "dav.cesnet.cz".to_string(),
                },
                MeshService {
                    service_type: "Gateway".to_string(),
                    path: PARTNER_GATEWAY.to_string(),
                    host: "gw.cesnet.cz".to_string(),
                },
            ],
        });
        pool.register_mesh_directory(config.mesh_directory.clone(), Arc::new(mesh));

        let transfers = Arc::new(MemoryDataTransfer::new());
        pool.register_data_transfer(config.data_transfer.clone(), transfers.clone());

        let apps = MemoryAppRegistry::new();
        apps.register(AppProviderInfo {
            name: "Collabora".to_string(),
            address: APP_PROVIDER_ADDRESS.to_string(),
            mime_types: vec![ODT.to_string()],
        });
        let app_provider = Arc::new(MemoryAppProvider::new("https://office.example.org"));
        pool.register_app_registry(config.app_registry.clone(), Arc::new(apps));
        pool.register_app_provider(APP_PROVIDER_ADDRESS, app_provider.clone());

        let remote = Arc::new(MemoryRemoteGateway::new());
        pool.register_remote_gateway(PARTNER_GATEWAY, remote.clone());

        let gateway = Gateway::new(config, pool.clone());
        Self {
            gateway,
            pool,
            provider,
            shares,
            public_shares,
            ocm,
            transfers,
            app_provider,
            remote,
        }
    }

    /// Context of `name` logged in as owner
    pub fn ctx(&self, name: &str) -> CallContext {
        let user = user(name);
        let scope = TokenScope::owner();
        let token = self
            .gateway
            .tokens()
            .mint_session(&user, &scope)
            .expect("mint session");
        CallContext::new(user, token, scope)
    }

    /// Create the home of `name` and return its root id
    pub async fn home(&self, name: &str) -> ResourceId {
        let res = self
            .gateway
            .create_home(&self.ctx(name), CreateHomeRequest::default())
            .await
            .expect("create home");
        res.space.expect("home space").root
    }

    /// Create a file below the root of `space` and return its id
    pub async fn file(&self, ctx: &CallContext, space: &ResourceId, path: &str) -> ResourceId {
        let reference = Reference::relative(space.clone(), path);
        let res = self
            .gateway
            .touch_file(ctx, ReferenceRequest::new(reference.clone()))
            .await
            .expect("touch file");
        assert!(res.status.is_ok(), "{}", res.status);
        let stat = self
            .gateway
            .stat(
                ctx,
                StatRequest {
                    reference,
                    metadata_keys: vec![],
                },
            )
            .await
            .expect("stat");
        stat.info.expect("file info").id
    }
}
