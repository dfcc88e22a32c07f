use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "credential-relay",
    version,
    about = "Decrypts operator-encrypted credentials on their way to a remote browser"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Relay options used when no subcommand is given
    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay (default)
    Serve(ServeArgs),
    /// Generate a key pair and print it as SK=/PK= lines
    Keygen,
    /// Encrypt a credential for the relay's public key
    Encrypt(EncryptArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Listen host (overrides config file setting)
    #[arg(long, env = "PROXY_LISTEN_HOST")]
    pub listen_host: Option<String>,

    /// Listen port (overrides config file setting)
    #[arg(long, env = "PROXY_LISTEN_PORT")]
    pub port: Option<u16>,

    /// Upgrade path clients connect to; empty accepts any path
    #[arg(long, env = "PROXY_PATH")]
    pub path: Option<String>,

    /// WebSocket URL of the browser server (overrides config file setting)
    #[arg(long, env = "BROWSER_URL")]
    pub backend: Option<String>,

    /// Largest accepted message in bytes (overrides config file setting)
    #[arg(long, env = "MAX_MESSAGE_SIZE")]
    pub max_message_size: Option<u64>,

    /// Hex secret key; a fresh pair is generated unless both keys are set
    #[arg(long, env = "SK", hide_env_values = true, hide = true)]
    pub secret_key: Option<String>,

    /// Hex public key matching the secret key
    #[arg(long, env = "PK")]
    pub public_key: Option<String>,

    /// Log level (overrides config file setting; RUST_LOG wins over both)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Hex public key printed by the relay at startup
    #[arg(long, env = "PK")]
    pub public_key: String,

    /// Wrap the ciphertext as a storage-state file: {"encoded_value": "<hex>"}
    #[arg(long)]
    pub storage_state: bool,

    /// Read the plaintext from this file instead of the command line
    #[arg(long, conflicts_with = "value")]
    pub file: Option<PathBuf>,

    /// Plaintext to encrypt; read from stdin when neither this nor --file is given
    pub value: Option<String>,
}
