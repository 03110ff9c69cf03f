use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use travelsplit::{routes, settings::Settings, store::Store};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let settings = Settings::new().map_err(std::io::Error::other)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("travelsplit={}", settings.level))),
        )
        .init();

    tracing::info!(database = %settings.database.name, "connecting to MongoDB");
    let store = Store::connect(&settings.database.uri, &settings.database.name)
        .await
        .map_err(std::io::Error::other)?;
    tracing::info!("connected");

    let rules = web::Data::new(settings.form_rules());
    let converter = web::Data::new(settings.converter());
    let store = web::Data::new(store);

    tracing::info!(
        "listening on {}:{}",
        settings.server.host,
        settings.server.port
    );
    HttpServer::new(move || {
        App::new()
            .app_data(store.clone())
            .app_data(rules.clone())
            .app_data(converter.clone())
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind((settings.server.host.as_str(), settings.server.port))?
    .run()
    .await
}
