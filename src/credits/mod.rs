mod history;
mod order;
mod settle;

use axum::{debug_handler, routing::{get, post}, Json, Router};

use crate::{rewards::{CreditPackage, PACKAGES}, AppState};

pub use history::{credit_history, CreditHistory};
pub use order::{create_order, OrderRequest, PlacedOrder};
pub use settle::{verify_payment, PaymentConfirmation, Settlement};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/credits/packages", get(packages))
        .route("/credits/orders", post(order::order))
        .route("/credits/verify", post(settle::verify))
        .route("/credits/history", get(history::history))
}

#[debug_handler]
async fn packages() -> Json<&'static [CreditPackage]> {
    Json(PACKAGES)
}
