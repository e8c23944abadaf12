mod api;
mod blockchain;
mod config;
mod crypto;
mod error;
mod node;
mod pubsub;
mod transaction;
mod wallet;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;

use api::AppState;
use config::Settings;
use node::Node;
use pubsub::LocalBus;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let settings = Settings::from_env();

    let bus = LocalBus::new();
    let node = Arc::new(Node::new(bus.clone()));
    bus.subscribe(node.clone());

    info!(
        "⛓️ Node {} (wallet {}) listening at http://{}:{} ({} peers on bus)",
        node.id(),
        node.wallet_info().address,
        settings.host,
        settings.port,
        bus.peer_count()
    );

    let state = web::Data::new(AppState { node });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((settings.host.as_str(), settings.port))?
    .run()
    .await
}
