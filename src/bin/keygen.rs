//! Key generator: derives the shared secret key from a master password.

use std::process::ExitCode;

use clap::Parser;

use netcopy::core::VERSION_STRING;
use netcopy::crypto::SecretKey;

#[derive(Parser, Debug)]
#[command(
    name = "netcopy-keygen",
    version,
    about = "Generate the shared secret key from a master password"
)]
struct Args {
    /// Optional hex salt overriding the built-in derivation salt; both
    /// peers must configure the same value as key_salt
    #[arg(long)]
    salt: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    println!("{VERSION_STRING} - Key Generator");

    let password = match rpassword::prompt_password(
        "Please enter the master password to generate the secret key: ",
    ) {
        Ok(password) if !password.is_empty() => password,
        Ok(_) => {
            eprintln!("Error: Password cannot be empty");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let key = match &args.salt {
        Some(salt_hex) => match hex::decode(salt_hex) {
            Ok(salt) => SecretKey::derive_with_salt(&password, &salt),
            Err(_) => {
                eprintln!("Error: salt is not valid hex");
                return ExitCode::FAILURE;
            }
        },
        None => SecretKey::derive_from_password(&password),
    };

    println!(
        "Insert the \"{}\" to your client and server configuration.",
        key.to_hex()
    );
    ExitCode::SUCCESS
}
