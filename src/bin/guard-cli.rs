use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;

use request_guard::config::CsrfConfig;
use request_guard::security::{sign_hmac_sha256, verify_hmac_sha256_signature, CsrfGuard};

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Operator tooling for request-guard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign a webhook payload, printing `sha256=<hex>`
    Sign {
        #[arg(short, long, env = "GUARD_WEBHOOK_SECRET")]
        secret: String,
        /// Payload file; stdin when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Verify a webhook signature; exits non-zero on mismatch
    Verify {
        #[arg(short, long, env = "GUARD_WEBHOOK_SECRET")]
        secret: String,
        #[arg(long)]
        signature: String,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print a fresh CSRF token
    Token,
    /// Query a running server's health endpoint
    Health {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sign { secret, file } => {
            let payload = read_payload(file.as_ref())?;
            println!("sha256={}", sign_hmac_sha256(&payload, secret.as_bytes()));
        }
        Commands::Verify { secret, signature, file } => {
            let payload = read_payload(file.as_ref())?;
            if !verify_hmac_sha256_signature(&payload, Some(signature.as_str()), secret.as_bytes()) {
                eprintln!("Signature mismatch");
                return Ok(ExitCode::FAILURE);
            }
            println!("Signature valid");
        }
        Commands::Token => {
            let guard = CsrfGuard::new(&CsrfConfig::default(), false);
            println!("{}", guard.generate_token());
        }
        Commands::Health { url } => {
            let res = reqwest::Client::new()
                .get(format!("{}/api/health", url.trim_end_matches('/')))
                .send()
                .await?;
            let status = res.status();
            if !status.is_success() {
                eprintln!("Error: health endpoint returned status {}", status);
                if let Ok(text) = res.text().await {
                    eprintln!("Response: {}", text);
                }
                return Ok(ExitCode::FAILURE);
            }
            let json: Value = res.json().await?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn read_payload(file: Option<&PathBuf>) -> std::io::Result<Vec<u8>> {
    match file {
        Some(path) => std::fs::read(path),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}
