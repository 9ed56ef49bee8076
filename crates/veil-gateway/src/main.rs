use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use veil_assistant::{AssistantClient, OpenAiAssistantBackend};
use veil_audit::AuditLog;
use veil_operator::{BotConnectorChannel, EscalationNotifier, OperatorBridge};
use veil_scanner::{detector::EntityDetector, HttpDetector, NoopDetector, Scanner};
use veil_vault::{KvStore, MemoryStore, RedisStore, Vault};

mod app;
mod connections;
mod frames;
mod http;
mod pipeline;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "veil_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > VEIL_CONFIG env > ~/.veil/veil.toml
    let config_path = std::env::var("VEIL_CONFIG").ok();
    let config =
        veil_core::config::VeilConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
            warn!("Config load failed ({}), using defaults", e);
            veil_core::config::VeilConfig::default()
        });

    // PII store: Redis when configured, otherwise an in-process map.
    let store: Arc<dyn KvStore> = match &config.vault.host {
        Some(host) => {
            let store = RedisStore::connect(host, config.vault.port).await?;
            store.ping().await?;
            info!(host = %host, port = config.vault.port, "PII store connected");
            Arc::new(store)
        }
        None => {
            warn!("no PII store configured, using in-process memory store (development only)");
            Arc::new(MemoryStore::new())
        }
    };
    let vault = Arc::new(Vault::new(
        store,
        config.vault.entry_ttl_secs,
        config.vault.status_ttl_secs,
    ));

    let detector: Arc<dyn EntityDetector> = match &config.detector.url {
        Some(url) => {
            info!(url = %url, "entity detector configured");
            Arc::new(HttpDetector::new(url.clone()))
        }
        None => {
            warn!("no entity detector configured, regex-only PII filtering (development only)");
            Arc::new(NoopDetector)
        }
    };
    let scanner = Scanner::new(vault.clone(), detector, config.detector.score_threshold);

    let backend = OpenAiAssistantBackend::new(
        config.assistant.api_key.clone(),
        config.assistant.assistant_id.clone(),
        config.assistant.base_url.clone(),
    );
    let assistant = AssistantClient::new(Box::new(backend));

    let audit = AuditLog::open(&config.database.path)?;
    info!(path = %config.database.path, "audit store ready");

    let channel = BotConnectorChannel::new(
        config.operator.app_id.clone(),
        config.operator.app_password.clone(),
    );
    let operator = OperatorBridge::new(Box::new(channel));
    let notifier = EscalationNotifier::new(config.operator.webhook_url.clone());

    if config.admin.enabled {
        info!("admin backend enabled");
    }

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(
        config, vault, scanner, assistant, audit, operator, notifier,
    ));
    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("veil gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
