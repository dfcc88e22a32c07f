mod cli;
mod config;

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use payload_codec::keys::parse_public_key;
use payload_codec::{ecies, KeyPair, KeySource, PayloadCodec};
use ws_relay::{MessageInspector, Relay, RelayConfig};

use crate::cli::{Cli, Command, EncryptArgs, ServeArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve(cli.serve)) {
        Command::Serve(args) => serve(args).await,
        Command::Keygen => keygen(),
        Command::Encrypt(args) => encrypt(args),
    }
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

async fn serve(args: ServeArgs) -> Result<()> {
    // 1. Load config, then merge CLI and environment overrides.
    let file = config::load(&args.config)?;
    let found = file.is_some();
    let mut cfg = file.unwrap_or_default();
    cfg.apply_overrides(&args);

    // 2. Init tracing-subscriber with JSON format.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    if !found {
        warn!(
            path = %args.config.display(),
            "configuration file not found; using defaults and environment"
        );
    }

    let listen_addr = cfg.listen_addr()?;
    let backend_url = cfg.backend_url()?.to_string();
    let shutdown_policy = cfg.shutdown_policy()?;

    info!(
        config_file = %args.config.display(),
        listen = %listen_addr,
        backend = %backend_url,
        path = cfg.network.path.as_deref().unwrap_or("*"),
        max_message_size = cfg.network.max_message_size,
        "credential-relay starting"
    );

    // 3. Key pair: supplied via SK/PK or generated for this run.
    let keys = KeyPair::obtain(args.secret_key.as_deref(), args.public_key.as_deref())
        .context("failed to load key pair from SK/PK")?;
    let keys = Arc::new(keys);

    let public_key = keys.public_key_hex();
    if keys.source() == KeySource::Generated {
        warn!("SK/PK not both set; generated a key pair that lasts only for this process");
    }
    info!(
        public_key = %public_key,
        encryptor = %cfg.encryptor_link(&public_key),
        "encrypt credentials for this public key"
    );

    // 4. Build inspector chain.
    let codec = PayloadCodec::new(Arc::clone(&keys)).context("failed to build payload codec")?;
    let inspectors: Vec<Arc<dyn MessageInspector>> = vec![Arc::new(codec)];

    // 5. Bind and serve until ctrl-c or SIGTERM.
    let relay = Relay::bind(RelayConfig {
        listen_addr,
        backend_url,
        path: cfg.network.path.clone(),
        max_message_size: cfg.network.max_message_size,
        handshake_timeout: cfg.handshake_timeout(),
        inspectors,
        shutdown_policy,
        grace_period: cfg.grace_period(),
    })
    .await?;

    info!(listen = %relay.local_addr()?, policy = ?shutdown_policy, "relay listening");

    relay.run(shutdown_signal()).await?;

    info!("credential-relay shutting down");
    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT (ctrl-c)"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to register SIGTERM handler");
                ctrl_c.await;
                info!("received SIGINT (ctrl-c)");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("received SIGINT (ctrl-c)");
    }
}

// ---------------------------------------------------------------------------
// keygen / encrypt
// ---------------------------------------------------------------------------

/// Print a fresh key pair in env-file form.
fn keygen() -> Result<()> {
    let keys = KeyPair::generate().context("failed to generate key pair")?;
    println!("SK={}", keys.secret_key_hex().as_str());
    println!("PK={}", keys.public_key_hex());
    Ok(())
}

fn encrypt(args: EncryptArgs) -> Result<()> {
    let plaintext = match (&args.value, &args.file) {
        (Some(value), _) => value.clone().into_bytes(),
        (None, Some(path)) => std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read plaintext from stdin")?;
            buf
        }
    };

    println!("{}", seal(&args.public_key, &plaintext, args.storage_state)?);
    Ok(())
}

/// Encrypt `plaintext` for `public_key` and render it the way the relay
/// expects to find it: bare hex, or a storage-state wrapper.
fn seal(public_key: &str, plaintext: &[u8], storage_state: bool) -> Result<String> {
    let recipient = parse_public_key(public_key).context("invalid public key")?;
    let ciphertext = hex::encode(ecies::encrypt(&recipient, plaintext)?);

    if storage_state {
        Ok(serde_json::json!({ "encoded_value": ciphertext }).to_string())
    } else {
        Ok(ciphertext)
    }
}
