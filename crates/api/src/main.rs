use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wholesale_observability::init();

    let services = wholesale_api::app::services::build_services()
        .await
        .context("failed to wire payment services")?;
    let app = wholesale_api::app::build_app(services);

    let addr = std::env::var("WH_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
