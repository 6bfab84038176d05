use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;

use contracts::ModConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vocab_api::{serve, LobbyApi, HOST_PLAYER_ID};
use vocab_core::VocabularyCatalogue;

const CONFIG_ENV: &str = "VOCAB_CONFIG_PATH";
/// Clock advance after the scripted chat, long enough for every delayed
/// punishment to resolve.
const SIMULATE_SETTLE_MS: u64 = 20_000;

fn print_usage() {
    println!("vocab-cli [--config <path>] <command>");
    println!("commands:");
    println!("  catalogue");
    println!("    lists every category and its banned words");
    println!("  settings");
    println!("    prints the effective session settings as JSON");
    println!("  simulate <location_id> [message...]");
    println!("    starts a round as the host, says each message in chat, prints the event log");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
    println!("config: --config <path> or ${CONFIG_ENV}; defaults apply when neither is set");
}

/// Splits `--config <path>` out of the argument list.
fn take_config_flag(args: Vec<String>) -> Result<(Option<PathBuf>, Vec<String>), String> {
    let mut path = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let value = iter.next().ok_or_else(|| "missing value for --config".to_string())?;
            path = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("--config=") {
            path = Some(PathBuf::from(value));
        } else {
            rest.push(arg);
        }
    }
    Ok((path, rest))
}

fn config_path(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(|| {
        env::var(CONFIG_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
    })
}

fn load_config(path: Option<PathBuf>) -> Result<ModConfig, String> {
    let Some(path) = path else {
        return Ok(ModConfig::default());
    };
    let raw = fs::read_to_string(&path)
        .map_err(|err| format!("failed to read config {}: {err}", path.display()))?;
    let config: ModConfig = serde_json::from_str(&raw)
        .map_err(|err| format!("invalid config {}: {err}", path.display()))?;
    info!(path = %path.display(), "config loaded");
    Ok(config)
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn print_catalogue(config: &ModConfig) {
    let catalogue = VocabularyCatalogue::from_config(config);
    for entry in catalogue.entries() {
        println!("{}: {}", entry.category_name, entry.words);
    }
}

fn print_settings(config: &ModConfig) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(&config.settings)
        .map_err(|err| format!("failed to render settings: {err}"))?;
    println!("{rendered}");
    Ok(())
}

fn run_simulation(config: &ModConfig, args: &[String]) -> Result<(), String> {
    let location_id = args
        .get(1)
        .ok_or_else(|| "missing location_id".to_string())?;
    let mut lobby = LobbyApi::new(config).map_err(|err| err.to_string())?;
    let round_id = lobby.start_round(location_id).map_err(|err| err.to_string())?;
    println!("round={round_id} {}", lobby.status());

    for message in &args[2..] {
        let passthrough = lobby
            .chat(HOST_PLAYER_ID, message)
            .map_err(|err| err.to_string())?;
        let outcome = if passthrough.is_empty() { "blocked" } else { "sent" };
        println!("chat {outcome}: {message}");
    }
    lobby.advance_clock(SIMULATE_SETTLE_MS);

    for event in lobby.events() {
        let line = serde_json::to_string(event).map_err(|err| format!("failed to render event: {err}"))?;
        println!("{line}");
    }
    println!("{}", lobby.status());
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let (flag, args) = match take_config_flag(env::args().skip(1).collect()) {
        Ok(split) => split,
        Err(err) => {
            eprintln!("error: {err}");
            print_usage();
            std::process::exit(2);
        }
    };
    let config = match load_config(config_path(flag)) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration rejected");
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };

    match args.first().map(String::as_str) {
        Some("catalogue") => print_catalogue(&config),
        Some("settings") => {
            if let Err(err) = print_settings(&config) {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        Some("simulate") => {
            if let Err(err) = run_simulation(&config, &args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        Some("serve") => match parse_socket_addr(args.get(1)) {
            Ok(addr) => {
                let lobby = match LobbyApi::new(&config) {
                    Ok(lobby) => lobby,
                    Err(err) => {
                        eprintln!("error: {err}");
                        std::process::exit(2);
                    }
                };
                println!("serving lobby api on http://{addr}");
                if let Err(err) = serve(addr, lobby).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        _ => {
            print_usage();
        }
    }
}
