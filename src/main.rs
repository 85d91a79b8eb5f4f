use spotcast::clock::SystemClock;
use spotcast::estimation::remote::RemoteClient;
use spotcast::estimation::{EnsembleWeights, create_predictor};
use spotcast::features::FeatureExtractor;
use spotcast::prediction::{PredictionService, ServiceSettings};
use spotcast::state::AppState;
use spotcast::store::memory::InMemoryStore;
use spotcast::{api, config};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::Level;

fn init_tracing(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn load_store(config: &config::Config) -> InMemoryStore {
    match config.snapshot_path() {
        Some(path) => match InMemoryStore::load_from_path(path) {
            Ok(store) => {
                tracing::info!(path = %path.display(), "Campus snapshot loaded");
                store
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Failed to load snapshot, starting empty");
                InMemoryStore::new()
            }
        },
        None => {
            tracing::warn!("No snapshot path configured, starting with an empty store");
            InMemoryStore::new()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(&config.logging.level);
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "spotcast starting"
    );

    let store = load_store(&config);
    let calendar = config.academic_calendar()?;
    let clock = SystemClock::new(config.utc_offset()?);

    let (tabular, temporal) = config.ensemble_weights()?;
    let ensemble = create_predictor(
        config.model_path(),
        EnsembleWeights { tabular, temporal },
        config.jitter_seed(),
    );

    let remote = match config.remote_endpoint() {
        Some(endpoint) => {
            tracing::info!(endpoint, "Remote inference enabled");
            Some(RemoteClient::new(endpoint.to_string(), config.remote_timeout()))
        }
        None => {
            tracing::info!("No remote endpoint configured, using local ensemble only");
            None
        }
    };

    let extractor = FeatureExtractor::new(Arc::new(store), calendar, Arc::new(clock));
    let service = PredictionService::new(
        extractor,
        ensemble,
        remote,
        ServiceSettings {
            cache_ttl: config.cache_ttl(),
            horizon_hours: config.horizon_hours(),
        },
    );
    tracing::info!(model_version = service.model_version(), "Prediction service ready");

    let state = Arc::new(AppState::new(Arc::new(service)));
    let app = api::router(state);
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_toml() -> Result<(), Box<dyn std::error::Error>> {
        let _config = config::load_default()?;
        Ok(())
    }

    #[test]
    fn bundled_snapshot_loads() -> Result<(), Box<dyn std::error::Error>> {
        let config = config::load_default()?;
        let store = load_store(&config);
        assert!(!spotcast::store::DataStore::lots(&store).is_empty());
        Ok(())
    }
}
