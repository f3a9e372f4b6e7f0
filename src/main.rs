use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};

use tripsplit::config::{Config, StorageBackend};
use tripsplit::ledger::TripLedger;
use tripsplit::logger::init_logger;
use tripsplit::routes;
use tripsplit::store::{MemoryStore, MongoStore, TripStore};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    Config::load_dotenv();
    init_logger(&Config::log_level());

    let config = Config::from_env().map_err(std::io::Error::other)?;

    let store: Arc<dyn TripStore> = match (config.storage, &config.mongodb_uri) {
        (StorageBackend::Mongodb, Some(uri)) => {
            let store = MongoStore::connect(uri, &config.database_name)
                .await
                .map_err(std::io::Error::other)?;
            tracing::info!(database = %config.database_name, "connected to MongoDB");
            Arc::new(store)
        }
        _ => {
            tracing::warn!("using the in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let ledger = web::Data::new(TripLedger::new(store));

    tracing::info!(host = %config.http_host, port = config.http_port, "starting HTTP server");
    let allowed_origin = config.allowed_origin.clone();
    HttpServer::new(move || {
        let cors = match &allowed_origin {
            Some(origin) => Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header(),
            None => Cors::permissive(),
        };
        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(ledger.clone())
            .configure(routes::configure)
    })
    .bind((config.http_host.as_str(), config.http_port))?
    .run()
    .await
}
