use actix_web::{HttpResponse, Responder, get, post, web};
use log::{info, warn};

use super::models::{AppState, TransactRequest, TransactResponse};

/// Send from this node's wallet; folds into its pending transaction when
/// one exists.
#[post("/transact")]
pub async fn post_transact(
    state: web::Data<AppState>,
    body: web::Json<TransactRequest>,
) -> impl Responder {
    match state.node.transact(&body.recipient, body.amount) {
        Ok(transaction) => {
            info!(
                "POST /transact - txid={} -> {} ({})",
                transaction.id(),
                body.recipient,
                body.amount
            );
            HttpResponse::Ok().json(TransactResponse::Success { transaction })
        }
        Err(e) => {
            warn!("POST /transact - rejected: {e}");
            HttpResponse::BadRequest().json(TransactResponse::Error {
                message: e.to_string(),
            })
        }
    }
}

/// Current mempool, keyed by transaction id.
#[get("/transaction-pool-map")]
pub async fn get_pool_map(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.node.pool())
}
