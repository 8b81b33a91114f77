//! Opening resources in apps, locally or on a federated partner's gateway

use crate::context::CallContext;
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use spacegate_services::*;
use tracing::instrument;
use url::Url;

/// A `webdav://{token}@{domain}?name={path}` reference target
#[derive(Debug, PartialEq, Eq)]
pub struct WebdavTarget {
    pub token: String,
    pub domain: String,
    pub path: String,
}

impl WebdavTarget {
    pub fn parse(target: &str) -> Result<Self> {
        let url = Url::parse(target)
            .map_err(|e| GatewayError::Internal(format!("invalid reference target {target}: {e}")))?;
        if url.scheme() != "webdav" {
            return Err(GatewayError::Internal(format!(
                "reference target {target} is not a webdav uri"
            )));
        }
        let domain = url.host_str().unwrap_or_default().to_string();
        let path = url
            .query_pairs()
            .find(|(k, _)| k == "name")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let token = urlencoding::decode(url.username())
            .map_err(|e| GatewayError::Internal(format!("invalid token in reference target: {e}")))?
            .into_owned();
        if token.is_empty() || domain.is_empty() {
            return Err(GatewayError::Internal(format!(
                "reference target {target} lacks token or domain"
            )));
        }
        Ok(Self {
            token,
            domain,
            path,
        })
    }
}

impl Gateway {
    /// App url for a resource; remote references open on the owner's gateway
    #[instrument(skip(self, ctx, req), fields(reference = %req.reference, app = %req.app))]
    pub async fn open_in_app(
        &self,
        ctx: &CallContext,
        req: OpenInAppRequest,
    ) -> Result<OpenInAppResponse> {
        let stat = self
            .stat(
                ctx,
                StatRequest {
                    reference: req.reference.clone(),
                    metadata_keys: vec![],
                },
            )
            .await?;
        if !stat.status.is_ok() {
            return Ok(OpenInAppResponse::from_status(stat.status));
        }
        let info = stat
            .info
            .ok_or_else(|| GatewayError::Internal("stat returned no resource info".to_string()))?;

        match info.target.as_deref() {
            Some(target) if info.resource_type == ResourceType::Reference && target.starts_with("webdav://") => {
                self.open_federated(WebdavTarget::parse(target)?, req).await
            }
            _ => self.open_local(ctx, info, req).await,
        }
    }

    /// Repeat the call on the remote gateway under the embedded token's identity
    async fn open_federated(&self, target: WebdavTarget, req: OpenInAppRequest) -> Result<OpenInAppResponse> {
        let res = self
            .mesh_directory()?
            .get_info_by_domain(GetInfoByDomainRequest {
                domain: target.domain.clone(),
            })
            .await
            .map_err(GatewayError::service("GetInfoByDomain"))?;
        if !res.status.is_ok() {
            return Ok(OpenInAppResponse::from_status(res.status));
        }
        let endpoint = res
            .provider
            .as_ref()
            .and_then(|p| p.service("gateway"))
            .map(|s| s.path.clone())
            .ok_or_else(|| {
                GatewayError::NotFound(format!("no gateway service for domain {}", target.domain))
            })?;

        tracing::debug!(domain = %target.domain, endpoint = %endpoint, "opening on remote gateway");
        let remote = self
            .pool
            .remote_gateway(&endpoint, req.transport)
            .map_err(GatewayError::service("GetRemoteGatewayClient"))?;
        remote
            .open_in_app(
                &target.token,
                OpenInAppRequest {
                    reference: Reference::from_path(target.path),
                    ..req
                },
            )
            .await
            .map_err(GatewayError::service("OpenInApp"))
    }

    async fn open_local(
        &self,
        ctx: &CallContext,
        info: ResourceInfo,
        req: OpenInAppRequest,
    ) -> Result<OpenInAppResponse> {
        let provider = self.find_app_provider(&info, &req.app).await?;
        if ctx.token.is_empty() {
            return Err(GatewayError::Unauthenticated(
                "no access token to hand to the app".to_string(),
            ));
        }
        let app = self
            .pool
            .app_provider(&provider.address)
            .map_err(GatewayError::service("GetAppProviderClient"))?;
        app.open_in_app(AppOpenRequest {
            resource_info: info,
            view_mode: req.view_mode,
            access_token: ctx.token.clone(),
        })
        .await
        .map_err(GatewayError::service("OpenInApp"))
    }

    /// The provider named `app`, else the default one for the mime type
    async fn find_app_provider(&self, info: &ResourceInfo, app: &str) -> Result<AppProviderInfo> {
        let registry = self.app_registry()?;
        if app.is_empty() {
            let res = registry
                .get_default_app_provider(GetDefaultAppProviderRequest {
                    mime_type: info.mime_type.clone(),
                })
                .await
                .map_err(GatewayError::service("GetDefaultAppProvider"))?;
            return res
                .provider
                .filter(|_| res.status.is_ok())
                .ok_or_else(|| GatewayError::from_status(&res.status));
        }

        let res = registry
            .get_app_providers(GetAppProvidersRequest {
                resource_info: info.clone(),
            })
            .await
            .map_err(GatewayError::service("GetAppProviders"))?;
        if !res.status.is_ok() {
            return Err(GatewayError::from_status(&res.status));
        }
        let mut matching: Vec<_> = res.providers.into_iter().filter(|p| p.name == app).collect();
        match matching.len() {
            0 => Err(GatewayError::NotFound(format!("app {app} not found"))),
            1 => Ok(matching.remove(0)),
            n => Err(GatewayError::Internal(format!(
                "found {n} app providers named {app}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, LOCAL_DOMAIN, PARTNER_DOMAIN, PARTNER_GATEWAY};

    fn open(reference: Reference, app: &str) -> OpenInAppRequest {
        OpenInAppRequest {
            reference,
            app: app.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_open_local_with_default_app() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        let root = fx.home("einstein").await;
        let file = fx.file(&ctx, &root, "./paper.odt").await;

        let res = fx
            .gateway
            .open_in_app(&ctx, open(Reference::from_id(file.clone()), ""))
            .await
            .unwrap();
        assert!(res.status.is_ok());
        assert!(res.app_url.unwrap().app_url.starts_with("https://office.example.org/open"));

        let requests = fx.app_provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].access_token, ctx.token);
        assert_eq!(requests[0].resource_info.id, file);
    }

    #[tokio::test]
    async fn test_open_local_with_named_app() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        let root = fx.home("einstein").await;
        let file = fx.file(&ctx, &root, "./paper.odt").await;

        let res = fx
            .gateway
            .open_in_app(&ctx, open(Reference::from_id(file.clone()), "Collabora"))
            .await
            .unwrap();
        assert!(res.status.is_ok());

        let err = fx
            .gateway
            .open_in_app(&ctx, open(Reference::from_id(file), "OnlyOffice"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn test_open_missing_resource_returns_status() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        fx.home("einstein").await;

        let res = fx
            .gateway
            .open_in_app(&ctx, open(Reference::from_path("/users/einstein/missing.odt"), ""))
            .await
            .unwrap();
        assert_eq!(res.status.code, Code::NotFound);
        assert!(fx.app_provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_open_federated_reference_on_partner_gateway() {
        let fx = Fixture::new();
        let ctx = fx.ctx("einstein");
        fx.home("einstein").await;
        let share = OcmShare {
            id: "ocm-odt".into(),
            name: "report.odt".into(),
            resource_id: ResourceId::new("remote-storage", "remote-space", "remote-file"),
            grantee: Grantee::user(UserId::new(LOCAL_DOMAIN, "einstein")),
            permissions: ResourcePermissions::viewer(),
            owner: UserId::new(PARTNER_DOMAIN, "marie"),
            creator: UserId::new(PARTNER_DOMAIN, "marie"),
            share_type: OcmShareType::Regular,
            token: Some("s3cr3t".into()),
        };
        fx.ocm.receive(share.clone());
        let accepted = fx
            .gateway
            .update_received_ocm_share(
                &ctx,
                UpdateReceivedOcmShareRequest {
                    share: Some(ReceivedOcmShare {
                        share,
                        state: ShareState::Accepted,
                        mount_point: None,
                    }),
                    update_mask: vec![ReceivedShareField::State],
                    user: None,
                    destination: None,
                },
            )
            .await
            .unwrap();
        assert!(accepted.status.is_ok());

        let transport = TransportOptions {
            insecure: true,
            skip_verify: false,
        };
        let res = fx
            .gateway
            .open_in_app(
                &ctx,
                OpenInAppRequest {
                    transport,
                    ..open(Reference::from_path("/users/einstein/Shares/report.odt"), "")
                },
            )
            .await
            .unwrap();
        assert!(res.status.is_ok());

        let calls = fx.remote.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "s3cr3t");
        assert_eq!(calls[0].1.reference, Reference::from_path("report.odt"));
        assert_eq!(fx.pool.remote_dials(), vec![(PARTNER_GATEWAY.to_string(), transport)]);
        assert!(fx.app_provider.requests().is_empty());
    }

    #[test]
    fn test_parse_webdav_target() {
        let target = WebdavTarget::parse("webdav://s3cr3t@cesnet.cz?name=/reports/q1.odt").unwrap();
        assert_eq!(
            target,
            WebdavTarget {
                token: "s3cr3t".into(),
                domain: "cesnet.cz".into(),
                path: "/reports/q1.odt".into(),
            }
        );
    }

    #[test]
    fn test_webdav_target_needs_token() {
        assert!(WebdavTarget::parse("webdav://cesnet.cz?name=/a").is_err());
        assert!(WebdavTarget::parse("https://t@cesnet.cz?name=/a").is_err());
    }
}
