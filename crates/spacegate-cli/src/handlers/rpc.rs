//! JSON RPC surface of the gateway: `POST /rpc/{Operation}`

use crate::{ApiError, AppState};
use axum::{
    extract::{Extension, Path, State},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use spacegate_core::{CallContext, Gateway};
use spacegate_services::AuthenticateRequest;
use std::sync::Arc;

/// Decode a request body; an empty body is an empty object
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn respond<T: Serialize>(res: T) -> Result<Response, ApiError> {
    Ok(Json(res).into_response())
}

macro_rules! operations {
    (
        with_request { $($name:literal => $method:ident),* $(,)? }
        context_only { $($ctx_name:literal => $ctx_method:ident),* $(,)? }
    ) => {
        /// Names of the operations served under `/rpc/{op}`
        pub const OPERATIONS: &[&str] = &[$($name,)* $($ctx_name,)*];

        async fn dispatch(
            gateway: &Gateway,
            ctx: &CallContext,
            op: &str,
            body: &[u8],
        ) -> Result<Response, ApiError> {
            match op {
                $($name => respond(gateway.$method(ctx, decode(body)?).await?),)*
                $($ctx_name => respond(gateway.$ctx_method(ctx).await?),)*
                other => Err(ApiError::UnknownOperation(other.to_string())),
            }
        }
    };
}

operations! {
    with_request {
        "OpenInApp" => open_in_app,

        "CreateOcmShare" => create_ocm_share,
        "RemoveOcmShare" => remove_ocm_share,
        "GetOcmShare" => get_ocm_share,
        "ListOcmShares" => list_ocm_shares,
        "GetReceivedOcmShare" => get_received_ocm_share,
        "UpdateReceivedOcmShare" => update_received_ocm_share,

        "CreateShare" => create_share,
        "RemoveShare" => remove_share,
        "GetShare" => get_share,
        "UpdateShare" => update_share,
        "ListShares" => list_shares,
        "GetReceivedShare" => get_received_share,
        "UpdateReceivedShare" => update_received_share,

        "CreatePublicShare" => create_public_share,
        "GetPublicShare" => get_public_share,
        "ListPublicShares" => list_public_shares,
        "RemovePublicShare" => remove_public_share,

        "CreateStorageSpace" => create_storage_space,
        "CreateHome" => create_home,
        "ListStorageSpaces" => list_storage_spaces,
        "UpdateStorageSpace" => update_storage_space,
        "DeleteStorageSpace" => delete_storage_space,
        "DisablePersonalSpace" => disable_personal_space,
        "RestorePersonalSpace" => restore_personal_space,

        "Stat" => stat,
        "ListContainer" => list_container,
        "CreateContainer" => create_container,
        "TouchFile" => touch_file,
        "Delete" => delete,
        "Move" => move_resource,
        "SetArbitraryMetadata" => set_arbitrary_metadata,
        "UnsetArbitraryMetadata" => unset_arbitrary_metadata,
        "SetLock" => set_lock,
        "GetLock" => get_lock,
        "RefreshLock" => refresh_lock,
        "Unlock" => unlock,
        "GetPath" => get_path,
        "GetQuota" => get_quota,

        "AddGrant" => add_grant,
        "DenyGrant" => deny_grant,
        "UpdateGrant" => update_grant,
        "RemoveGrant" => remove_grant,
        "ListGrants" => list_grants,

        "InitiateFileUpload" => initiate_file_upload,
        "InitiateFileDownload" => initiate_file_download,
    }
    context_only {
        "GetHome" => get_home,
        "ListReceivedShares" => list_received_shares,
        "ListReceivedOcmShares" => list_received_ocm_shares,
    }
}

/// POST /rpc/Authenticate - exchange credentials for a session token
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: AuthenticateRequest = decode(&body)?;
    tracing::debug!(auth_type = %req.auth_type, client_id = %req.client_id, "authenticate");
    respond(state.gateway.authenticate(req).await?)
}

/// POST /rpc/{op} - any other gateway operation
pub async fn call(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<CallContext>,
    Path(op): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    tracing::debug!(op = %op, user = %ctx.user_key(), "rpc call");
    dispatch(&state.gateway, &ctx, &op, &body).await
}
