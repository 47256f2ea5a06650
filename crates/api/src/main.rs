#[tokio::main]
async fn main() {
    stagecraft_observability::init();

    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set (postgres://...)");
    let schema = std::env::var("DB_SCHEMA").unwrap_or_else(|_| "stagecraft".to_string());
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("failed to connect to postgres");

    let app = stagecraft_api::app::build_app(pool, &schema);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_addr}: {e}"));

    tracing::info!(schema = %schema, "listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
