use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hushh_a2a::payload::{DEFAULT_MIME_TYPE, new_session_id};
use hushh_a2a::{
    AgentRequest, BatchProgress, Dispatcher, HttpTransport, ProfileQuery, analyze_profile,
    phone_looks_valid,
};
use hushh_core::{AgentKind, DispatchResult, extract_text_or};
use hushh_gateway::GatewayServer;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::HushhConfig;

const NO_RESPONSE: &str = "No response";
const NOT_AVAILABLE: &str = "Not available";

#[derive(Parser)]
#[command(name = "hushh")]
#[command(version)]
#[command(about = "hushh: console and relay for personal data agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration (secrets masked)
    Config,

    /// List configured agents
    Agents,

    /// Send one prompt to an agent
    Ask {
        /// Agent id
        agent: String,
        /// The prompt to send
        message: String,
        /// Reuse a session id
        #[arg(long)]
        session: Option<String>,
        /// Also print the raw response
        #[arg(long)]
        raw: bool,
    },

    /// Interactive chat with one agent
    Chat {
        /// Agent id
        agent: String,
        /// Start with the raw-data inspector on
        #[arg(long)]
        raw: bool,
    },

    /// Run a full profile analysis across the analysis agents
    Analyze {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a WhatsApp template message
    Whatsapp {
        /// Recipient phone number, any formatting
        #[arg(long)]
        to: String,
        /// Approved template name
        #[arg(long)]
        template: String,
        /// Template language code (defaults to config)
        #[arg(long)]
        language: Option<String>,
        /// Body parameter, repeatable
        #[arg(long = "param")]
        params: Vec<String>,
    },

    /// Send a transactional email
    Email {
        #[arg(long)]
        to: String,
        #[arg(long)]
        subject: String,
        /// Inline body
        #[arg(long, conflicts_with = "body_file", required_unless_present = "body_file")]
        body: Option<String>,
        /// Read the body from a file
        #[arg(long)]
        body_file: Option<PathBuf>,
        #[arg(long, default_value = DEFAULT_MIME_TYPE)]
        mime: String,
    },

    /// Start the pass-through proxy
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Agents => cmd_agents(&cli.config).await,
        Commands::Ask { agent, message, session, raw } => {
            cmd_ask(&cli.config, &agent, &message, session, raw).await
        }
        Commands::Chat { agent, raw } => cmd_chat(&cli.config, &agent, raw).await,
        Commands::Analyze { name, email, phone, json } => {
            cmd_analyze(&cli.config, ProfileQuery { name, email, phone }, json).await
        }
        Commands::Whatsapp { to, template, language, params } => {
            cmd_whatsapp(&cli.config, &to, &template, language, params).await
        }
        Commands::Email { to, subject, body, body_file, mime } => {
            cmd_email(&cli.config, &to, &subject, body, body_file, &mime).await
        }
        Commands::Serve { port } => cmd_serve(&cli.config, port).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("hushh initialized at {}", config_dir.display());
    println!(
        "Set the HUSHH_*_URL environment variables or edit {} to point at your agents.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = HushhConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

async fn cmd_agents(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = HushhConfig::load(config_path)?;
    let registry = cfg.registry()?;
    if registry.is_empty() {
        println!(
            "No agents configured. Set the HUSHH_*_URL environment variables \
             or add [[agents]] to your config."
        );
        return Ok(());
    }
    for agent in registry.iter() {
        println!(
            "  {:<10} {:<18} {:<22} {}",
            agent.id,
            agent.kind.to_string(),
            agent.display_name(),
            agent.base_url
        );
        if !agent.description.is_empty() {
            println!("  {:<10} {}", "", agent.description);
        }
    }
    Ok(())
}

fn build_dispatcher(cfg: &HushhConfig) -> Result<Dispatcher> {
    let registry = Arc::new(cfg.registry()?);
    let transport = Arc::new(HttpTransport::new());
    Ok(Dispatcher::new(registry, transport).with_route(cfg.route()))
}

/// Reply card: extracted text, timing, and the raw payload when inspecting
fn print_result(agent_id: &str, result: &DispatchResult, raw: bool) {
    if result.success {
        let data = result.data.clone().unwrap_or(Value::Null);
        println!("{}", extract_text_or(&data, NO_RESPONSE));
        println!("  [{} · {}]", agent_id, result.response_time_label());
    } else {
        println!(
            "Request failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
        println!("  [{} · {}]", agent_id, result.response_time_label());
    }
    if raw {
        if let Some(data) = &result.data {
            println!(
                "{}",
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
            );
        }
    }
}

async fn cmd_ask(
    config_path: &Option<PathBuf>,
    agent_id: &str,
    message: &str,
    session: Option<String>,
    raw: bool,
) -> Result<()> {
    let cfg = HushhConfig::load(config_path)?;
    let dispatcher = build_dispatcher(&cfg)?;

    let request = AgentRequest::Text {
        text: message.to_string(),
        session_id: session,
    };
    let result = dispatcher.send(agent_id, &request).await;
    print_result(agent_id, &result, raw);
    Ok(())
}

async fn cmd_chat(config_path: &Option<PathBuf>, agent_id: &str, raw: bool) -> Result<()> {
    use std::io::{self, BufRead};

    let cfg = HushhConfig::load(config_path)?;
    let dispatcher = build_dispatcher(&cfg)?;
    let Some(agent) = dispatcher.registry().get(agent_id) else {
        anyhow::bail!(
            "Unknown agent '{}'. Configured agents: {}",
            agent_id,
            dispatcher.registry().ids().join(", ")
        );
    };
    if agent.kind != AgentKind::JsonrpcText {
        anyhow::bail!("Agent '{}' is a {} agent and cannot chat", agent_id, agent.kind);
    }

    let session_id = new_session_id();
    let mut raw = raw;
    println!("\n  Chatting with {} (session {})", agent.display_name(), session_id);
    println!("  /raw toggles the raw-data inspector, /quit exits.\n");

    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/raw" => {
                raw = !raw;
                println!("  raw inspector {}", if raw { "on" } else { "off" });
                continue;
            }
            _ => {}
        }

        let request = AgentRequest::Text {
            text: line.to_string(),
            session_id: Some(session_id.clone()),
        };
        let result = dispatcher.send(agent_id, &request).await;
        print_result(agent_id, &result, raw);
        println!();
    }

    Ok(())
}

async fn cmd_analyze(config_path: &Option<PathBuf>, query: ProfileQuery, json: bool) -> Result<()> {
    let cfg = HushhConfig::load(config_path)?;
    let dispatcher = build_dispatcher(&cfg)?;
    let plan = cfg.analysis_plan();

    let report = analyze_profile(&dispatcher, &query, &plan, |event| match event {
        BatchProgress::Started { index, total, agent_id } => {
            let name = dispatcher
                .registry()
                .get(agent_id)
                .map(|a| a.display_name().to_string())
                .unwrap_or_else(|| agent_id.clone());
            eprint!("  [{}/{}] {} ... ", index + 1, total, name);
        }
        BatchProgress::Finished { success, response_time_ms, .. } => {
            let time = response_time_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_else(|| "N/A".to_string());
            if *success {
                eprintln!("done ({})", time);
            } else {
                eprintln!("failed ({})", time);
            }
        }
    })
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    for outcome in report.outcomes.iter().filter(|o| !o.result.success) {
        println!(
            "  {} contributed nothing: {}",
            outcome.agent_id,
            outcome.result.error.as_deref().unwrap_or("unknown error")
        );
    }
    let sources = if report.profile.contributors.is_empty() {
        "none".to_string()
    } else {
        report.profile.contributors.join(" → ")
    };
    println!(
        "\n  Resolved profile: {} of {} fields known ({} of {} agents, sources: {})",
        report.summary.known_count(),
        report.summary.rows().len(),
        report.succeeded(),
        report.outcomes.len(),
        sources
    );
    println!("  ────────────────");
    for (label, value) in report.summary.rows() {
        println!("  {:<11} {}", label, value.unwrap_or(NOT_AVAILABLE));
    }
    println!();
    Ok(())
}

async fn cmd_whatsapp(
    config_path: &Option<PathBuf>,
    to: &str,
    template: &str,
    language: Option<String>,
    params: Vec<String>,
) -> Result<()> {
    if !phone_looks_valid(to) {
        anyhow::bail!("'{}' does not look like a phone number (expected 10 to 15 digits)", to);
    }

    let cfg = HushhConfig::load(config_path)?;
    let dispatcher = build_dispatcher(&cfg)?;
    let agent_id = dispatcher
        .registry()
        .first_of_kind(AgentKind::WhatsappTemplate)
        .map(|a| a.id.clone())
        .context("No whatsapp-template agent configured")?;

    let request = AgentRequest::WhatsAppTemplate {
        phone: to.to_string(),
        template: template.to_string(),
        language: language.unwrap_or_else(|| cfg.whatsapp.default_language.clone()),
        parameters: params,
    };
    let result = dispatcher.send(&agent_id, &request).await;
    if result.success {
        println!("WhatsApp message sent ({})", result.response_time_label());
    } else {
        print_result(&agent_id, &result, false);
    }
    Ok(())
}

async fn cmd_email(
    config_path: &Option<PathBuf>,
    to: &str,
    subject: &str,
    body: Option<String>,
    body_file: Option<PathBuf>,
    mime: &str,
) -> Result<()> {
    let body = match (body, body_file) {
        (Some(body), _) => body,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read email body from {}", path.display()))?,
        (None, None) => anyhow::bail!("Provide --body or --body-file"),
    };

    let cfg = HushhConfig::load(config_path)?;
    let dispatcher = build_dispatcher(&cfg)?;
    let agent_id = dispatcher
        .registry()
        .first_of_kind(AgentKind::Email)
        .map(|a| a.id.clone())
        .context("No email agent configured")?;

    let request = AgentRequest::Email {
        to: to.to_string(),
        subject: subject.to_string(),
        body,
        mime_type: mime.to_string(),
    };
    let result = dispatcher.send(&agent_id, &request).await;
    if result.success {
        println!("Email sent to {} ({})", to, result.response_time_label());
    } else {
        print_result(&agent_id, &result, false);
    }
    Ok(())
}

async fn cmd_serve(config_path: &Option<PathBuf>, port: Option<u16>) -> Result<()> {
    let cfg = HushhConfig::load(config_path)?;
    let addr = cfg.gateway_addr(port)?;
    let registry = Arc::new(cfg.registry()?);
    let server = GatewayServer::new(addr, registry, Arc::new(HttpTransport::new()))
        .with_user_details_url(cfg.gateway.user_details_url.clone());

    println!("hushh proxy running on http://{}. Press Ctrl+C to stop.", addr);
    tokio::select! {
        result = server.run() => result?,
        _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
    }
    Ok(())
}
