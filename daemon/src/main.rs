mod auth;
mod config;
mod protocol;
mod server;
mod store;
mod suggest;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use auth::HmacTokenVerifier;
use config::DaemonConfig;
use server::{ActivityServer, AppState};
use store::{ActivityStore, SqliteActivityStore};
use suggest::{ImageLinks, StaticCatalog, SuggestionResolver};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = DaemonConfig::load()?;
    let verifier = Arc::new(HmacTokenVerifier::new(&config.auth.secret)?);

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        None => {}
        Some("issue-token") => {
            let Some(owner) = args.next() else {
                bail!("usage: autonomy-daemon issue-token <owner-id>");
            };
            println!("{}", verifier.sign(&owner));
            return Ok(());
        }
        Some(other) => bail!("unknown command {other:?} (expected no command or issue-token)"),
    }

    info!(
        bind = %config.server.bind_addr,
        backend = ?config.effective_backend(),
        suggestion_count = config.suggest.count,
        static_base = config.suggest.static_base,
        generated_base = config.suggest.generated_base,
        seeded = config.suggest.seed.is_some(),
        generator_timeout_ms = config.generator.timeout_ms,
        database = %config.store.database_path.display(),
        "loaded autonomy config"
    );

    let store: Arc<dyn ActivityStore> =
        Arc::new(SqliteActivityStore::open(&config.store.database_path)?);
    let resolver = SuggestionResolver::new(
        config.suggest.clone(),
        StaticCatalog::builtin(),
        ImageLinks::new(&config.images)?,
        store.clone(),
        suggest::generator::from_config(&config),
        Duration::from_millis(config.generator.timeout_ms.max(1)),
    )?;
    let state = AppState::new(resolver, store, verifier, &config.server.allowed_origin)?;
    let server = ActivityServer::new(config.server.clone(), state);
    server.run().await
}
