use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::AppError;
use crate::models::Seller;
use crate::util::extract_bearer_token;

/// The authenticated seller, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct SellerContext {
    pub seller: Seller,
}

impl SellerContext {
    pub fn seller_id(&self) -> &str {
        &self.seller.id
    }
}

/// Authenticate a seller by `Authorization: Bearer <api key>`.
pub async fn seller_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = extract_bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;

    let seller = {
        let conn = state.db.get()?;
        queries::get_seller_by_api_key(&conn, api_key)?
    };
    let Some(seller) = seller else {
        tracing::debug!("Rejected request with unknown API key");
        return Err(AppError::Unauthorized);
    };

    request.extensions_mut().insert(SellerContext { seller });
    Ok(next.run(request).await)
}
