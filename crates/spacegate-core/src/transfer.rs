//! Upload and download initiation through the data gateway
//!
//! Protocols the backend does not expose get their endpoint replaced with the
//! data gateway and a signed token naming the real endpoint.

use crate::context::CallContext;
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use chrono::{DateTime, Utc};
use spacegate_services::*;
use tracing::instrument;

impl Gateway {
    /// Endpoint and token a client uses instead of a hidden backend endpoint
    fn redirect(&self, target: &str, expiration: Option<DateTime<Utc>>) -> Result<(String, String)> {
        let expires_at = expiration.unwrap_or_else(|| self.tokens.default_transfer_expiry());
        let token = self.tokens.sign_transfer(target, expires_at)?;
        Ok((self.config.data_gateway_endpoint.clone(), token))
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn initiate_file_upload(
        &self,
        ctx: &CallContext,
        req: InitiateFileUploadRequest,
    ) -> Result<InitiateFileUploadResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let mut res = resolved
            .provider
            .initiate_file_upload(InitiateFileUploadRequest {
                reference: resolved.reference.clone(),
                length: req.length,
            })
            .await
            .map_err(GatewayError::service("InitiateFileUpload"))?;
        if !res.status.is_ok() {
            return Ok(res);
        }

        for protocol in res.protocols.iter_mut().filter(|p| !p.expose) {
            let (endpoint, token) = self.redirect(&protocol.upload_endpoint, protocol.expiration)?;
            protocol.upload_endpoint = endpoint;
            protocol.token = Some(token);
        }
        self.invalidate_stat(ctx, resolved.reference.resource_id.as_ref());
        Ok(res)
    }

    #[instrument(skip(self, ctx, req), fields(reference = %req.reference))]
    pub async fn initiate_file_download(
        &self,
        ctx: &CallContext,
        req: ReferenceRequest,
    ) -> Result<InitiateFileDownloadResponse> {
        let resolved = self.find_and_unwrap(ctx, &req.reference).await?;
        let mut res = resolved
            .provider
            .initiate_file_download(ReferenceRequest::new(resolved.reference))
            .await
            .map_err(GatewayError::service("InitiateFileDownload"))?;
        if !res.status.is_ok() {
            return Ok(res);
        }

        for protocol in res.protocols.iter_mut().filter(|p| !p.expose) {
            let (endpoint, token) = self.redirect(&protocol.download_endpoint, protocol.expiration)?;
            protocol.download_endpoint = endpoint;
            protocol.token = Some(token);
        }
        Ok(res)
    }
}
