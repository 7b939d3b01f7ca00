use actix_web::{get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder};
use controller::controllers::cluster_controller::{self, State};
use controller::util::{config::Settings, probe::READYZ_ENDPOINT, telemetry};
use prometheus::{Encoder, TextEncoder};
use tracing::info;

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&metrics, &mut buffer).unwrap();
    HttpResponse::Ok().body(buffer)
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

async fn readyz(c: Data<State>) -> impl Responder {
    if c.readiness().is_ready() {
        HttpResponse::Ok().json("ready")
    } else {
        HttpResponse::InternalServerError().json("not ready")
    }
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init().await;
    let settings = Settings::from_env();
    info!("Starting cassandra-operator, listening on {}", settings.listen_addr);

    // Initiatilize Kubernetes controller state
    let state = State::default();
    let cassandra_controller = cluster_controller::run(state.clone(), settings.clone());

    // Start web server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health").exclude(READYZ_ENDPOINT))
            .service(index)
            .service(health)
            .service(metrics)
            .route(READYZ_ENDPOINT, actix_web::web::get().to(readyz))
    })
    .bind(settings.listen_addr.as_str())?
    .shutdown_timeout(5);

    // Both runtimes implements graceful shutdown, so poll until both are done
    tokio::join!(cassandra_controller, server.run()).1?;
    Ok(())
}
