mod balance;
mod chain;
mod health;
pub mod models;
mod tx;
mod wallet;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(health::health_check)
            .service(chain::get_blocks)
            .service(chain::mine_block)
            .service(chain::mine_transactions)
            .service(tx::post_transact)
            .service(tx::get_pool_map)
            .service(wallet::wallet_info)
            .service(balance::get_balance),
    );
}
