//! Transfer server binary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use netcopy::config::ServerConfig;
use netcopy::crypto::SecretKey;
use netcopy::server::Server;

#[derive(Parser, Debug)]
#[command(name = "netcopy-server", version, about = "NetCopy transfer server")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(long)]
    listen: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Allow writes beneath this base directory (repeatable)
    #[arg(long = "allow")]
    allowed_paths: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match ServerConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };

    if let Some(listen) = args.listen {
        config.listen_address = listen;
    }
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    if !args.allowed_paths.is_empty() {
        config.allowed_paths = args.allowed_paths;
    }

    let level = if args.verbose {
        "debug".to_string()
    } else {
        config.log_level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let key = match resolve_key(&config) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut server = Server::new(config, key);
    if let Err(e) = server.bind().and_then(|_| server.run()) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn resolve_key(config: &ServerConfig) -> Result<SecretKey, String> {
    if !config.secret_key.is_empty() {
        return SecretKey::from_hex(&config.secret_key).map_err(|e| e.to_string());
    }

    let password = rpassword::prompt_password(
        "No secret key configured. Please enter the master password: ",
    )
    .map_err(|e| e.to_string())?;
    if password.is_empty() {
        return Err("password cannot be empty".to_string());
    }

    if config.key_salt.is_empty() {
        Ok(SecretKey::derive_from_password(&password))
    } else {
        let salt = hex::decode(&config.key_salt).map_err(|_| "key_salt is not valid hex")?;
        Ok(SecretKey::derive_with_salt(&password, &salt))
    }
}
