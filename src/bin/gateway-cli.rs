use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Route management CLI for the event gateway", long_about = None)]
struct Cli {
    /// Control-plane base URL.
    #[arg(short, long, default_value = "http://127.0.0.1:8889")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a host/method/path to a backend endpoint
    Register(RouteArgs),
    /// Remove a registered route
    Unregister(RouteArgs),
    /// List registered routes
    Routes,
    /// Check gateway status
    Status,
}

#[derive(clap::Args)]
struct RouteArgs {
    /// Host label, without the primary domain
    #[arg(long)]
    host: String,
    /// Path pattern, e.g. /users/:id
    #[arg(long)]
    path: String,
    #[arg(short, long, default_value = "GET")]
    method: String,
    /// Backend URL the event is POSTed to
    #[arg(short, long)]
    endpoint: String,
}

impl RouteArgs {
    fn body(&self) -> Value {
        json!({
            "endpoint": self.endpoint,
            "data": {
                "host": self.host,
                "path": self.path,
                "method": self.method,
            }
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Register(args) => {
            let res = client
                .post(format!("{}/register", cli.url))
                .json(&args.body())
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Unregister(args) => {
            let res = client
                .post(format!("{}/unregister", cli.url))
                .json(&args.body())
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Routes => {
            let res = client.get(format!("{}/routes", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Status => {
            let res = client.get(format!("{}/status", cli.url)).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: control plane returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
