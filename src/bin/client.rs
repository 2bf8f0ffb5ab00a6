//! Transfer client binary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use netcopy::client::Client;
use netcopy::config::ClientConfig;
use netcopy::core::DEFAULT_PORT;
use netcopy::crypto::SecurityLevel;

#[derive(Parser, Debug)]
#[command(name = "netcopy-client", version, about = "NetCopy transfer client")]
struct Args {
    /// Local file or directory to push
    source: PathBuf,

    /// Destination as host:/abs/path or host:port:/abs/path
    destination: String,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resume a partial transfer
    #[arg(short, long)]
    resume: bool,

    /// Transfer directories recursively
    #[arg(short = 'R', long)]
    recursive: bool,

    /// Security suite: high, fast, aes, aes-gcm
    #[arg(short, long, default_value = "high")]
    security: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), String> {
    let config = match &args.config {
        Some(path) => ClientConfig::load_from_file(path).map_err(|e| e.to_string())?,
        None => ClientConfig::default(),
    };

    let level = if args.verbose {
        "debug".to_string()
    } else {
        config.log_level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let security = SecurityLevel::from_name(&args.security)
        .ok_or_else(|| format!("unknown security suite: {}", args.security))?;
    let (host, port, remote_path) = parse_destination(&args.destination)?;

    let mut client = Client::new(config);
    client.set_security_level(security);
    client.set_password_prompt(Box::new(|| {
        rpassword::prompt_password(
            "No secret key configured. Please enter the master password: ",
        )
        .ok()
    }));

    client.connect(&host, port).map_err(|e| e.to_string())?;

    let result = if args.source.is_dir() {
        if !args.recursive {
            return Err(format!(
                "{} is a directory; use --recursive to push it",
                args.source.display()
            ));
        }
        client.transfer_directory(&args.source, &remote_path, args.resume)
    } else {
        client.transfer_file(&args.source, &remote_path, args.resume)
    };

    client.disconnect();
    result.map_err(|e| e.to_string())
}

/// Split `host:/abs/path` or `host:port:/abs/path`. The path keeps any
/// further colons, so Windows-style destinations like
/// `host:1245:D:/Work/file.txt` survive.
fn parse_destination(destination: &str) -> Result<(String, u16, String), String> {
    let (host, rest) = destination
        .split_once(':')
        .ok_or_else(|| format!("invalid destination: {destination}"))?;
    if host.is_empty() || rest.is_empty() {
        return Err(format!("invalid destination: {destination}"));
    }

    match rest.split_once(':') {
        Some((maybe_port, path)) => match maybe_port.parse::<u16>() {
            Ok(port) if !path.is_empty() => Ok((host.to_string(), port, path.to_string())),
            Ok(_) => Err(format!("invalid destination: {destination}")),
            Err(_) => Ok((host.to_string(), DEFAULT_PORT, rest.to_string())),
        },
        None => Ok((host.to_string(), DEFAULT_PORT, rest.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_destination_with_port() {
        let (host, port, path) = parse_destination("box:9400:/tmp/out/a.bin").unwrap();
        assert_eq!((host.as_str(), port, path.as_str()), ("box", 9400, "/tmp/out/a.bin"));
    }

    #[test]
    fn test_parse_destination_default_port() {
        let (host, port, path) = parse_destination("box:/tmp/out/a.bin").unwrap();
        assert_eq!(
            (host.as_str(), port, path.as_str()),
            ("box", DEFAULT_PORT, "/tmp/out/a.bin")
        );
    }

    #[test]
    fn test_parse_destination_windows_path() {
        let (host, port, path) = parse_destination("box:1245:D:/Work/file.txt").unwrap();
        assert_eq!(
            (host.as_str(), port, path.as_str()),
            ("box", 1245, "D:/Work/file.txt")
        );
    }

    #[test]
    fn test_parse_destination_rejects_garbage() {
        assert!(parse_destination("no-colon-here").is_err());
        assert!(parse_destination(":/tmp/x").is_err());
    }
}
