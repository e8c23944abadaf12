use actix_web::http::header;
use actix_web::{HttpResponse, Responder, get, post, web};
use log::{error, info};

use super::models::{AppState, MineRequest};

fn redirect_to_blocks() -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, "/api/blocks"))
        .finish()
}

/// Get the full blockchain.
#[get("/blocks")]
pub async fn get_blocks(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.node.chain())
}

/// Mine a block holding the posted data and broadcast the new chain.
/// Proof of work runs on the blocking thread pool.
#[post("/mine")]
pub async fn mine_block(state: web::Data<AppState>, body: web::Json<MineRequest>) -> impl Responder {
    let node = state.node.clone();
    let data = body.into_inner().data;
    match web::block(move || node.add_block(data)).await {
        Ok(Some(block)) => {
            info!("POST /mine - sealed block {}", block.hash);
            redirect_to_blocks()
        }
        Ok(None) => {
            info!("POST /mine - result discarded, chain moved on");
            redirect_to_blocks()
        }
        Err(e) => {
            error!("POST /mine - mining task failed: {e}");
            HttpResponse::InternalServerError().body("mining failed")
        }
    }
}

/// Mine the valid pool transactions plus this node's reward.
#[get("/mine-transactions")]
pub async fn mine_transactions(state: web::Data<AppState>) -> impl Responder {
    let node = state.node.clone();
    match web::block(move || node.mine_transactions()).await {
        Ok(Some(block)) => {
            info!("GET /mine-transactions - sealed block {}", block.hash);
            redirect_to_blocks()
        }
        Ok(None) => {
            info!("GET /mine-transactions - result discarded, chain moved on");
            redirect_to_blocks()
        }
        Err(e) => {
            error!("GET /mine-transactions - mining task failed: {e}");
            HttpResponse::InternalServerError().body("mining failed")
        }
    }
}
