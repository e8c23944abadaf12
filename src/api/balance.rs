use actix_web::{HttpResponse, Responder, get, web};

use super::models::AppState;
use crate::node::WalletInfo;

/// Chain-derived balance of any address.
#[get("/balance/{address}")]
pub async fn get_balance(state: web::Data<AppState>, path: web::Path<(String,)>) -> impl Responder {
    let address = path.into_inner().0;
    let balance = state.node.balance_of(&address);
    HttpResponse::Ok().json(WalletInfo { address, balance })
}
