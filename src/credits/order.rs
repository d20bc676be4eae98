use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{auth::AuthContext, db, payments::PaymentGateway, rewards, AppResult};

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    #[serde(alias = "packageType")]
    pub package_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order_id: String,
    pub amount: i64,
    pub currency: &'static str,
    pub credits: i64,
    pub package: &'static str,
    pub key_id: String,
}

pub async fn create_order(
    gateway: &dyn PaymentGateway,
    ctx: &AuthContext,
    OrderRequest { package_type }: OrderRequest,
) -> AppResult<PlacedOrder> {
    let package = rewards::package(&db::non_empty("packageType", package_type)?)?;

    let receipt = format!("credits_{}", &ctx.profile_id[..ctx.profile_id.len().min(24)]);
    let order_id = gateway
        .create_order(
            package.price,
            rewards::CURRENCY,
            &receipt,
            json!({ "profileId": ctx.profile_id, "packageType": package.id }),
        )
        .await?;

    info!(profile_id = %ctx.profile_id, %order_id, package = package.id, "order created");

    Ok(PlacedOrder {
        order_id,
        amount: package.price,
        currency: rewards::CURRENCY,
        credits: package.credits,
        package: package.id,
        key_id: gateway.key_id().to_owned(),
    })
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn order(
    State(gateway): State<Arc<dyn PaymentGateway>>,
    ctx: AuthContext,
    Json(request): Json<OrderRequest>,
) -> AppResult<Json<PlacedOrder>> {
    create_order(gateway.as_ref(), &ctx, request).await.map(Json)
}
