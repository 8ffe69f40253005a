use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gatewayctl")]
#[command(about = "Management CLI for the gateway control plane", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_CONTROL_URL", default_value = "http://127.0.0.1:9850")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show gateway status
    Status,
    /// Start the gateway and rewrite a client config
    Setup {
        /// Client config file to rewrite
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Client config JSON to convert without touching disk
        #[arg(short, long, conflicts_with = "file")]
        content: Option<String>,
        /// Only route these servers through the gateway
        #[arg(short, long, value_delimiter = ',')]
        select: Vec<String>,
    },
    /// Stop the gateway and restore the client config
    Stop,
    /// Ask the control plane to clean up and exit
    Shutdown,
    /// List config backups
    Backups,
    /// Print a backup's content
    View { backup: String },
    /// Copy a backup over its original file
    Restore {
        backup: String,
        #[arg(long)]
        to: Option<String>,
    },
    /// Delete a backup
    Delete { backup: String },
    /// Print buffered gateway logs
    Logs {
        /// Clear the buffer instead of printing it
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let api = format!("{}/api", cli.url.trim_end_matches('/'));

    let res = match cli.command {
        Commands::Status => client.get(format!("{api}/status")).send().await?,
        Commands::Setup { file, content, select } => {
            let file_path = file
                .map(|path| std::fs::canonicalize(&path).unwrap_or(path))
                .map(|path| path.display().to_string());
            let selected = (!select.is_empty()).then_some(select);
            client
                .post(format!("{api}/setup"))
                .json(&json!({
                    "filePath": file_path,
                    "fileContent": content,
                    "selectedServices": selected,
                }))
                .send()
                .await?
        }
        Commands::Stop => client.post(format!("{api}/stop")).send().await?,
        Commands::Shutdown => client.post(format!("{api}/shutdown")).send().await?,
        Commands::Backups => client.get(format!("{api}/backups")).send().await?,
        Commands::View { backup } => {
            client
                .get(format!("{api}/backup/view"))
                .query(&[("backupPath", backup)])
                .send()
                .await?
        }
        Commands::Restore { backup, to } => {
            client
                .post(format!("{api}/restore"))
                .json(&json!({ "backupPath": backup, "originalPath": to }))
                .send()
                .await?
        }
        Commands::Delete { backup } => {
            client
                .post(format!("{api}/backup/delete"))
                .json(&json!({ "backupPath": backup }))
                .send()
                .await?
        }
        Commands::Logs { clear: true } => client.post(format!("{api}/logs/clear")).send().await?,
        Commands::Logs { clear: false } => client.get(format!("{api}/logs")).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: control API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
