use anyhow::Context;
use browser_act::{ChromeBrowser, Config, Dispatcher};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Drive a browser through numbered element refs.
///
/// Without --action, reads one JSON request per line from stdin, e.g.
/// {"action":"navigate","url":"example.com"}, and prints each result.
#[derive(Parser)]
#[command(name = "browser-act")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Browser profile directory (cookies and logins persist here)
    #[arg(long)]
    profile_dir: Option<PathBuf>,

    /// Directory screenshots are written to
    #[arg(long)]
    screenshot_dir: Option<PathBuf>,

    /// Run a single action and exit
    #[arg(short, long)]
    action: Option<String>,

    /// JSON params for --action
    #[arg(short, long, default_value = "{}", requires = "action")]
    params: String,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => Config::default(),
        };
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(dir) = &self.profile_dir {
            config.browser.profile_dir = dir.clone();
        }
        if let Some(dir) = &self.screenshot_dir {
            config.paths.screenshot_dir = dir.clone();
        }
        Ok(config)
    }
}

fn split_request(line: &str) -> Result<(String, Value), String> {
    let mut request: Value = serde_json::from_str(line).map_err(|e| format!("Error: invalid JSON: {}", e))?;
    let action = request
        .as_object_mut()
        .and_then(|obj| obj.remove("action"))
        .and_then(|a| a.as_str().map(str::to_string))
        .ok_or_else(|| "Error: request needs an \"action\" field".to_string())?;
    Ok((action, request))
}

async fn serve_stdin(dispatcher: &Dispatcher<ChromeBrowser>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("reading stdin")?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                None
            }
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let result = match split_request(line) {
            Ok((action, params)) => dispatcher.act(&action, params).await,
            Err(message) => message,
        };
        println!("{}\n", result);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("browser_act=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let dispatcher = Dispatcher::new(ChromeBrowser::new(), config);

    if let Some(action) = &cli.action {
        let params: Value = serde_json::from_str(&cli.params).context("--params must be a JSON object")?;
        println!("{}", dispatcher.act(action, params).await);
    } else if let Err(e) = serve_stdin(&dispatcher).await {
        warn!("stdin loop ended: {:#}", e);
    }

    dispatcher.act("close", Value::Null).await;
    Ok(())
}
