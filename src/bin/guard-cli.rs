use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Management CLI for the health-guard dependency monitor", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "HEALTH_GUARD_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Overall health: uptime, compliance, per-service status
    Status,
    /// List monitored services with their current health
    Services {
        /// Show a single service
        name: Option<String>,
    },
    /// List incidents
    Incidents {
        /// Only incidents at or after this unix timestamp (ms)
        #[arg(long)]
        since: Option<u64>,
    },
    /// Show circuit breaker metrics
    Breakers,
    /// Force a circuit breaker closed
    Reset {
        /// Breaker (service) name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let (method, path) = match &cli.command {
        Commands::Status => (Method::GET, "/admin/health".to_string()),
        Commands::Services { name: None } => (Method::GET, "/admin/services".to_string()),
        Commands::Services { name: Some(name) } => (Method::GET, format!("/admin/services/{}", name)),
        Commands::Incidents { since: None } => (Method::GET, "/admin/incidents".to_string()),
        Commands::Incidents { since: Some(since) } => (Method::GET, format!("/admin/incidents?since={}", since)),
        Commands::Breakers => (Method::GET, "/admin/breakers".to_string()),
        Commands::Reset { name } => (Method::POST, format!("/admin/breakers/{}/reset", name)),
    };

    let res = client
        .request(method, format!("{}{}", base, path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    // /admin/health reports an unhealthy system as 503 with a full body.
    if !status.is_success() && status != reqwest::StatusCode::SERVICE_UNAVAILABLE {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
