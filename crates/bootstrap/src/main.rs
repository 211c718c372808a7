use anyhow::Context;
use tokio_util::sync::CancellationToken;

use idstore_auth::RoleManager;
use idstore_infra::{DatabaseConfig, SqliteRoleStore, db, ensure_default_roles};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    idstore_observability::init();

    let config = DatabaseConfig::from_env();
    let pool = db::connect(&config)
        .await
        .with_context(|| format!("failed to connect to {}", config.url))?;
    db::migrate(&pool).await.context("failed to apply schema")?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    let roles = RoleManager::new(SqliteRoleStore::new(pool.clone()));
    let created = ensure_default_roles(&roles, &cancel)
        .await
        .context("failed to seed default roles")?;
    roles.store().close();

    tracing::info!(created, url = %config.url, "identity store ready");
    pool.close().await;
    Ok(())
}
