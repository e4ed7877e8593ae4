/// VOD Service - process bootstrap
///
/// Wires every component explicitly at startup: database pool, search
/// index, storage presigner, broker gateway, the two queue consumers and
/// the HTTP server. No implicit registration anywhere.
use actix_cors::Cors;
use actix_web::{middleware as actix_middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vod_service::amqp::{AmqpGateway, Disposition, Subscription};
use vod_service::consumers::{TranscodeConsumer, UploadsConsumer};
use vod_service::db::PgVideoStore;
use vod_service::handlers;
use vod_service::services::{ElasticsearchIndex, StoragePresigner};
use vod_service::Config;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");
    let bind_address = format!("{}:{}", config.app.host, config.app.port);

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run migrations")?;

    let search = Arc::new(ElasticsearchIndex::new(
        &config.search.url,
        &config.search.videos_index,
    )?);
    search
        .ensure_index()
        .await
        .context("Failed to ensure search index")?;

    let presigner = Arc::new(StoragePresigner::new(&config.s3).await);

    let gateway = Arc::new(AmqpGateway::new(config.amqp.url.clone()));
    gateway
        .connect(Duration::from_secs(config.amqp.connect_wait_secs))
        .await
        .context("Failed to connect to broker")?;

    let store = Arc::new(PgVideoStore::new(db_pool.clone()));
    let message_timeout = Duration::from_secs(config.amqp.message_timeout_secs);

    // Transcode completions: the relational update must eventually succeed,
    // so unexpected failures (and timeouts) requeue.
    let transcode = Arc::new(TranscodeConsumer::new(store.clone(), search.clone()));
    gateway.spawn_subscriber(
        Subscription {
            exchange: config.amqp.events_exchange.clone(),
            queue: config.amqp.ready_queue.clone(),
            routing_key: config.amqp.ready_routing_key.clone(),
            prefetch: config.amqp.prefetch,
            timeout: message_timeout,
            on_timeout: Disposition::Requeue,
        },
        transcode,
    );

    // Raw upload notifications: a poison batch must not redeliver forever,
    // so unexpected failures (and timeouts) discard.
    let uploads = Arc::new(UploadsConsumer::new(
        store,
        gateway.clone(),
        config.amqp.events_exchange.clone(),
        config.amqp.uploaded_routing_key.clone(),
    ));
    gateway.spawn_subscriber(
        Subscription {
            exchange: config.amqp.uploads_exchange.clone(),
            queue: config.amqp.uploads_queue.clone(),
            routing_key: config.amqp.uploads_routing_key.clone(),
            prefetch: config.amqp.prefetch,
            timeout: message_timeout,
            on_timeout: Disposition::Discard,
        },
        uploads,
    );

    tracing::info!(%bind_address, "vod-service starting HTTP server");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::new(search.clone()))
            .app_data(web::Data::new(presigner.clone()))
            .wrap(Cors::permissive())
            .wrap(actix_middleware::Logger::default())
            .route(
                "/v1/health",
                web::get()
                    .to(|| async { HttpResponse::Ok().json(serde_json::json!({"status": "ok"})) }),
            )
            .route(
                "/v1/health/ready",
                web::get().to(|| async { HttpResponse::Ok().finish() }),
            )
            .route(
                "/v1/health/live",
                web::get().to(|| async { HttpResponse::Ok().finish() }),
            )
            .service(
                web::scope("/v1")
                    .service(web::scope("/auth").route("/login", web::post().to(handlers::login)))
                    .service(
                        web::scope("/videos")
                            .route("", web::post().to(handlers::create_video))
                            .route("", web::get().to(handlers::list_videos))
                            .route("/{id}", web::get().to(handlers::get_video))
                            .route("/{id}/publish", web::post().to(handlers::publish_video)),
                    )
                    .service(
                        web::scope("/uploads")
                            .route("/signed-url", web::post().to(handlers::signed_url)),
                    )
                    .route("/search", web::get().to(handlers::search)),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
    .context("HTTP server failed")?;

    tracing::info!("vod-service shutting down");
    Ok(())
}
