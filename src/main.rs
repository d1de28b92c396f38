use atelier::{create_db_pool, create_router, AppState, Config};
use tracing::{info, warn};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    atelier::init_tracing(&config);

    info!(
        service = "atelier",
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting server"
    );

    let issues = config.validate_for_production();
    if !issues.is_empty() {
        for issue in &issues {
            warn!(issue = %issue, "Configuration warning");
        }
    }

    let db_pool = create_db_pool(&config);
    let state = AppState::new(db_pool, &config);

    if state.chat.is_none() {
        warn!("CHAT_API_KEY is not set; POST /chat will report the assistant as unavailable");
    }

    let app = create_router(state, &config);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind {}: {}", addr, e));

    info!(addr = %addr, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .expect("Server error");
}
