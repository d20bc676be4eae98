use anyhow::anyhow;
use axum::{debug_handler, extract::{Path, Query, State}, response::{IntoResponse, Redirect}};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::{info, warn};

use crate::{session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL, USER_ID}, AppError, AppResult, AppState};

use super::{clients::ClientProvider, resolve_identity, Clients};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[derive(Serialize)]
struct FirebaseRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseIdentity {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let (Some(state), Some(code)) = (state, code) else {
        return Err(AppError::Unauthenticated);
    };
    let state = CsrfToken::new(state);
    let code = AuthorizationCode::new(code);

    let stored_state = session.get::<String>(CSRF_STATE).await?;
    if stored_state.as_deref() != Some(state.secret().as_str()) {
        warn!(%provider, "oauth callback with mismatched csrf state");
        return Err(AppError::Unauthenticated);
    }

    let Some(pkce_verifier) = session.get::<String>(PKCE_VERIFIER).await? else {
        return Err(AppError::Unauthenticated);
    };

    let client = clients.get_client(provider)?;
    let firebase_idpurl = clients
        .firebase_idpurl
        .clone()
        .ok_or_else(|| anyhow!("identity toolkit not configured"))?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let identity: FirebaseIdentity = http_client.post(firebase_idpurl)
        .json(&FirebaseRequest {
            post_body: format!("access_token={access_token}&providerId={}", provider.id()),
            request_uri: "http://localhost/".to_owned(),
            return_idp_credential: true,
            return_secure_token: true,
        })
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let ctx = resolve_identity(
        &db_pool,
        &identity.local_id,
        identity.email.as_deref().unwrap_or_default(),
        identity.display_name.as_deref(),
    )
    .await?;

    session.remove::<String>(CSRF_STATE).await?;
    session.remove::<String>(PKCE_VERIFIER).await?;
    session.insert(USER_ID, identity.local_id).await?;

    info!(%provider, profile_id = %ctx.profile_id, "signed in");

    let return_url = session.remove::<String>(RETURN_URL).await?.unwrap_or("/me".to_string());
    Ok(Redirect::to(return_url.as_str()))
}
