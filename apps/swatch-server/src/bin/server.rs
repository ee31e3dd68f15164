use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing::info;

use swatch_core::config::Config;
use swatch_server::{build_orchestrator, init_tracing, routes, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let settings = Config::load()?.settings()?;
    let orchestrator = build_orchestrator(&settings).await?;
    let state = web::Data::new(AppState::new(orchestrator, settings.server.max_upload_bytes));

    let addr = (settings.server.host.clone(), settings.server.port);
    info!(host = %addr.0, port = addr.1, workers = settings.inference.workers, "swatch-server listening");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(routes)
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
