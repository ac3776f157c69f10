use actix_web::{web, App, HttpServer};
use tracing::info;

use classroom_scoreboard::api::{self, AppScoreboard};
use classroom_scoreboard::config::{self, AppConfig};
use classroom_scoreboard::database::{CsvGroupStore, GroupStore};
use classroom_scoreboard::logging;
use classroom_scoreboard::scoreboard::Scoreboard;

async fn start_api(board: AppScoreboard, config: &AppConfig) -> std::io::Result<()> {
    let board = web::Data::new(board);

    HttpServer::new(move || {
        App::new()
            .app_data(board.clone())
            .configure(api::configure)
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_from_env()?;
    logging::setup(&config.log_level);

    let store: Box<dyn GroupStore> = Box::new(CsvGroupStore::new(&config.store_path));
    let board = Scoreboard::from_config(store, &config);

    info!(
        store = %config.store_path.display(),
        rooms = ?config.rooms,
        clamp_at_zero = config.ledger.clamp_at_zero,
        "scoreboard ready"
    );
    info!("listening on http://{}:{}", config.bind_address, config.port);

    start_api(board, &config).await?;

    Ok(())
}
