// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{convert::Infallible, error::Error, path::Path, sync::Arc};

use diesel::Connection;
use ed25519_dalek::SigningKey;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpListener;

use flashpack_api::{
    api::{BaseContext, router},
    config::Config,
    db,
};

/// Loads the signing key, generating and saving a new one if the file does not exist.
fn load_signing_key(key_file: &Path) -> Result<SigningKey, Box<dyn Error + Send + Sync>> {
    if !key_file.exists() {
        let mut csprng = rand::rngs::OsRng;
        let signing_key: SigningKey = SigningKey::generate(&mut csprng);
        let keypair_json = serde_json::to_string_pretty(&signing_key)?;
        std::fs::write(key_file, keypair_json)?;
        tracing::info!("Generated new signing key and saved to {}", key_file.display());
    }
    let keypair_json = std::fs::read_to_string(key_file)?;
    Ok(serde_json::from_str(&keypair_json)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let signing_key = load_signing_key(&config.signing_key_file)?;

    {
        let mut pg_connection = diesel::pg::PgConnection::establish(&config.database_url)?;
        db::run_migrations(&mut pg_connection)?;
    }
    let store = db::PgStore::connect(&config.database_url).await?;

    let ctx = BaseContext {
        store: Arc::new(store),
        keypair: signing_key,
        access_token_ttl: config.access_token_ttl,
        first_user_admin: config.first_user_admin,
    };

    let listener = TcpListener::bind(config.listen_addr).await?;
    tracing::info!("Listening on http://{}", config.listen_addr);
    loop {
        let (stream, remote_addr) = listener.accept().await?;

        let io = TokioIo::new(stream);
        let ctx = ctx.clone();

        tokio::spawn(async move {
            if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                .serve_connection(
                    io,
                    service_fn(move |req| {
                        let ctx = ctx.clone();
                        async move { Ok::<_, Infallible>(router::handle(ctx, req).await) }
                    }),
                )
                .await
            {
                tracing::error!(%remote_addr, "Error serving connection: {e}");
            }
        });
    }
}
