use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "devlink")]
#[command(about = "devlink CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json.
    Init {
        /// Config file path (default: DEVLINK_CONFIG_PATH or ~/.devlink/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Connect to a device through the signaling server. Inbound device messages are printed as
    /// JSON lines; each stdin line is forwarded to the device (JSON, or a plain string otherwise).
    Connect {
        /// Config file path (default: DEVLINK_CONFIG_PATH or ~/.devlink/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Signaling server base URL (overrides config and DEVLINK_SERVER_URL)
        #[arg(long, short, value_name = "URL")]
        server: Option<String>,

        /// Device to connect to.
        #[arg(long, value_name = "ID", conflicts_with = "page_url")]
        device_id: Option<String>,

        /// Client page URL carrying the device in its `deviceId` query parameter.
        #[arg(long, value_name = "URL")]
        page_url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("devlink {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Connect {
            config,
            server,
            device_id,
            page_url,
        }) => {
            if let Err(e) = run_connect(config, server, device_id, page_url).await {
                log::error!("connect failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(devlink::config::default_config_path);
    let dir = devlink::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn resolve_device_id(device_id: Option<String>, page_url: Option<String>) -> anyhow::Result<String> {
    if let Some(id) = device_id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        return Ok(id);
    }
    match page_url {
        Some(url) => devlink::device::device_id_from_url(&url)
            .ok_or_else(|| anyhow::anyhow!("no deviceId query parameter in {}", url)),
        None => anyhow::bail!("pass --device-id or --page-url"),
    }
}

/// Stdin line to payload: JSON when it parses, otherwise the raw line as a JSON string.
fn line_to_payload(line: &str) -> serde_json::Value {
    serde_json::from_str(line).unwrap_or_else(|_| serde_json::Value::String(line.to_string()))
}

async fn run_connect(
    config_path: Option<std::path::PathBuf>,
    server: Option<String>,
    device_id: Option<String>,
    page_url: Option<String>,
) -> anyhow::Result<()> {
    use std::io::{self, BufRead};

    let device_id = resolve_device_id(device_id, page_url)?;
    let (mut config, path) = devlink::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    config.server.url = server.unwrap_or_else(|| devlink::config::resolve_server_url(&config));

    let connector = devlink::create_connector(&config).await;
    eprintln!("transport: {}", connector.transport());

    connector.on_device_msg(Box::new(|payload| println!("{}", payload)));

    let session = connector.request_device(&device_id).await?;
    println!("{}", serde_json::to_string(&session)?);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/quit") || input.eq_ignore_ascii_case("/exit") {
            break;
        }
        if let Err(e) = connector.send_to_device(line_to_payload(input)).await {
            eprintln!("send error: {}", e);
        }
    }

    Ok(())
}
