use docflow::ingest::{IngestConfig, IngestService, RetryPolicy};
use docflow::{api, chunking, config, embedding, fetch, index, logging, store};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    config::init_config();
    logging::init_tracing();

    let service = build_service().await.expect("Failed to assemble service");
    let app = api::create_router(Arc::new(service));

    let (listener, port) = bind_listener().await.expect("Failed to bind listener");
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.unwrap();
}

async fn build_service() -> anyhow::Result<IngestService> {
    let config = config::get_config();

    let store = store::DocumentStore::connect(&config.database_url).await?;
    let fetcher = fetch::SourceFetcher::new()?;
    let embedder = embedding::OpenAiEmbeddingClient::new(
        &config.embedding_api_url,
        config.embedding_api_key.clone(),
        &config.embedding_model,
        config.embedding_dimension,
    )?;
    let index = index::VectorIndex::new(
        &config.qdrant_url,
        config.qdrant_api_key.clone(),
        config.embedding_dimension as u64,
    )?;

    let chunk_size = chunking::determine_chunk_size(config.chunk_size, &config.embedding_model);
    let retry = RetryPolicy::new(config.ingest_max_attempts)
        .base_delay(config.ingest_retry_base)
        .max_delay(config.ingest_retry_max);

    Ok(IngestService::new(
        store,
        fetcher,
        Box::new(embedder),
        index,
        IngestConfig {
            chunk_size,
            embedding_model: config.embedding_model.clone(),
            retry,
            timeout: config.ingest_timeout,
        },
    ))
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
