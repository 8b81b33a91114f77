//! In-memory app registry, app provider and remote gateway

use super::respond;
use crate::*;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;

/// App providers indexed by the mime types they open
#[derive(Default)]
pub struct MemoryAppRegistry {
    providers: RwLock<Vec<AppProviderInfo>>,
    defaults: RwLock<BTreeMap<String, String>>,
}

impl MemoryAppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: AppProviderInfo) {
        self.providers.write().push(provider);
    }

    /// Make the app named `app` the default for `mime_type`
    pub fn set_default(&self, mime_type: impl Into<String>, app: impl Into<String>) {
        self.defaults.write().insert(mime_type.into(), app.into());
    }

    fn for_mime(&self, mime_type: &str) -> Vec<AppProviderInfo> {
        self.providers
            .read()
            .iter()
            .filter(|p| p.mime_types.iter().any(|m| m == mime_type))
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl AppRegistry for MemoryAppRegistry {
    async fn get_app_providers(
        &self,
        req: GetAppProvidersRequest,
    ) -> Result<GetAppProvidersResponse> {
        let providers = self.for_mime(&req.resource_info.mime_type);
        if providers.is_empty() {
            return respond(Err(Status::not_found(format!(
                "no app provider for {}",
                req.resource_info.mime_type
            ))));
        }
        Ok(GetAppProvidersResponse {
            status: Status::ok(),
            providers,
        })
    }

    async fn get_default_app_provider(
        &self,
        req: GetDefaultAppProviderRequest,
    ) -> Result<GetDefaultAppProviderResponse> {
        let candidates = self.for_mime(&req.mime_type);
        let default = self.defaults.read().get(&req.mime_type).cloned();
        let provider = match default {
            Some(name) => candidates.into_iter().find(|p| p.name == name),
            None => candidates.into_iter().next(),
        };
        match provider {
            Some(provider) => Ok(GetDefaultAppProviderResponse {
                status: Status::ok(),
                provider: Some(provider),
            }),
            None => respond(Err(Status::not_found(format!(
                "no default app for {}",
                req.mime_type
            )))),
        }
    }
}

/// App provider handing out urls under a fixed base
pub struct MemoryAppProvider {
    base_url: String,
    requests: Mutex<Vec<AppOpenRequest>>,
}

impl MemoryAppProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, access tokens included
    pub fn requests(&self) -> Vec<AppOpenRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl AppProvider for MemoryAppProvider {
    async fn open_in_app(&self, req: AppOpenRequest) -> Result<OpenInAppResponse> {
        let mut form_parameters = BTreeMap::new();
        form_parameters.insert("access_token".to_string(), req.access_token.clone());
        let app_url = AppUrl {
            app_url: format!(
                "{}/open?file={}",
                self.base_url.trim_end_matches('/'),
                urlencoding::encode(&req.resource_info.id.to_string())
            ),
            method: "POST".to_string(),
            form_parameters,
        };
        self.requests.lock().push(req);
        Ok(OpenInAppResponse {
            status: Status::ok(),
            app_url: Some(app_url),
        })
    }
}

/// Stand-in for the gateway of a partner organisation
#[derive(Default)]
pub struct MemoryRemoteGateway {
    calls: Mutex<Vec<(String, OpenInAppRequest)>>,
}

impl MemoryRemoteGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls received so far with the token that authenticated each of them
    pub fn calls(&self) -> Vec<(String, OpenInAppRequest)> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl RemoteGateway for MemoryRemoteGateway {
    async fn open_in_app(&self, token: &str, req: OpenInAppRequest) -> Result<OpenInAppResponse> {
        if token.is_empty() {
            return respond(Err(Status::unauthenticated("missing remote token")));
        }
        let app_url = AppUrl {
            app_url: format!("https://remote.invalid/app?ref={}", urlencoding::encode(&req.reference.to_string())),
            method: "GET".to_string(),
            form_parameters: BTreeMap::new(),
        };
        self.calls.lock().push((token.to_string(), req));
        Ok(OpenInAppResponse {
            status: Status::ok(),
            app_url: Some(app_url),
        })
    }
}
