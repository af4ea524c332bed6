use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};

use clusterlights::prelude::*;

/// Control a BLE cluster-light fixture.
#[derive(Parser, Debug)]
#[command(name = "clusterlights", version, about)]
struct Cli {
    /// Bluetooth address of the fixture (overrides the config file).
    #[arg(short, long, global = true)]
    address: Option<String>,

    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG still takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Seconds to wait for the link before giving up.
    #[arg(long, default_value_t = 30, global = true)]
    wait: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn the fixture on.
    On,
    /// Turn the fixture off.
    Off,
    /// Set brightness (0-255).
    Brightness { value: u8 },
    /// Make one effect the only active pattern.
    Effect { name: Effect },
    /// Switch a single pattern on or off, keeping the others.
    Pattern { name: Effect, state: Toggle },
    /// Print power, brightness and pattern.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Read commands from stdin until `q` or EOF.
    Interactive,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(t: Toggle) -> bool {
        t == Toggle::On
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging ───────────────────────────────────────────────────────────────
    // RUST_LOG overrides, e.g. RUST_LOG=clusterlights=trace
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config = load_config(&cli)?;
    let wait = Duration::from_secs(cli.wait);

    // ── Connect ───────────────────────────────────────────────────────────────
    let lights = ClusterLights::new(config);
    lights.connect()?;

    let outcome = match cli.command {
        Command::Interactive => interactive(&lights).await,
        command => match wait_connected(&lights, wait).await {
            Ok(()) => run(&lights, command).await,
            Err(e) => Err(e),
        },
    };

    // Flushes anything still queued before the link is closed.
    lights.disconnect().await;
    outcome
}

fn load_config(cli: &Cli) -> Result<ClusterLightsConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ClusterLightsConfig::from_json(&json)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => ClusterLightsConfig::default(),
    };
    if let Some(address) = &cli.address {
        config.address = address.clone();
    }
    if config.address.is_empty() {
        bail!("no fixture address: pass --address or set \"address\" in --config");
    }
    Ok(config)
}

async fn wait_connected(lights: &ClusterLights, wait: Duration) -> Result<()> {
    info!("Connecting to {} …", lights.address());
    let mut session = lights.watch_session();
    let connected = tokio::time::timeout(
        wait,
        session.wait_for(|state| *state == SessionState::Connected),
    )
    .await
    .map(|r| r.is_ok());
    match connected {
        Ok(true) => Ok(()),
        Ok(false) => bail!("session ended before connecting"),
        Err(_) => bail!("{}: not connected after {wait:?}", lights.address()),
    }
}

async fn run(lights: &ClusterLights, command: Command) -> Result<()> {
    match command {
        Command::On => lights.on().await?,
        Command::Off => lights.off().await?,
        Command::Brightness { value } => lights.set_brightness(value).await?,
        Command::Effect { name } => lights.apply_effect(name).await?,
        Command::Pattern { name, state } => lights.set_pattern(name.pattern(), state.into()).await?,
        Command::Status { json } => {
            refresh(lights).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status_json(lights))?);
            } else {
                print_status(lights);
            }
        }
        Command::Interactive => interactive(lights).await?,
    }
    Ok(())
}

async fn refresh(lights: &ClusterLights) -> Result<()> {
    lights.get_state().await?;
    lights.get_information().await?;
    Ok(())
}

fn status_json(lights: &ClusterLights) -> serde_json::Value {
    let snapshot = lights.snapshot();
    let active: Vec<&str> = Effect::ALL
        .into_iter()
        .filter(|e| snapshot.pattern.intersects(e.pattern()))
        .map(Effect::name)
        .collect();
    serde_json::json!({
        "address": lights.address(),
        "session": lights.session_state().to_string(),
        "on": snapshot.power,
        "brightness": snapshot.brightness,
        "pattern": snapshot.pattern.bits(),
        "patterns": active,
        "effect": lights.current_effect().name(),
    })
}

fn print_status(lights: &ClusterLights) {
    let snapshot = lights.snapshot();
    println!("[STATUS] {}  session={}", lights.address(), lights.session_state());
    println!("  power       {}", if snapshot.power { "on" } else { "off" });
    println!("  brightness  {}", snapshot.brightness);
    println!("  pattern     0x{:02x}", snapshot.pattern);
    println!("  effect      {}", lights.current_effect());
}

// ── Interactive mode ──────────────────────────────────────────────────────────

/// One parsed stdin line.
#[derive(Debug, PartialEq, Eq)]
enum Line {
    Quit,
    Help,
    Status,
    Power(bool),
    Brightness(u8),
    Effect(Effect),
    Pattern(Effect, bool),
}

fn parse_line(line: &str) -> std::result::Result<Line, String> {
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match word {
        "q" | "quit" => Ok(Line::Quit),
        "h" | "help" | "?" => Ok(Line::Help),
        "s" | "status" => Ok(Line::Status),
        "on" => Ok(Line::Power(true)),
        "off" => Ok(Line::Power(false)),
        "b" | "brightness" => rest
            .parse()
            .map(Line::Brightness)
            .map_err(|_| format!("brightness must be 0-255, got '{rest}'")),
        "e" | "effect" => rest.parse().map(Line::Effect).map_err(|e| e.to_string()),
        "p" | "pattern" => {
            let Some((name, toggle)) = rest.rsplit_once(char::is_whitespace) else {
                return Err("usage: p <effect> on|off".into());
            };
            let active = match toggle {
                "on" => true,
                "off" => false,
                other => return Err(format!("expected on|off, got '{other}'")),
            };
            let effect = name.parse().map_err(|e: clusterlights::effect::UnknownEffect| e.to_string())?;
            Ok(Line::Pattern(effect, active))
        }
        other => Err(format!("unknown command '{other}' (h for help)")),
    }
}

fn print_help() {
    info!("Commands (type + Enter):");
    info!("  on | off             – power");
    info!("  b <0-255>            – brightness");
    info!("  e <effect>           – select a single effect");
    info!("  p <effect> on|off    – toggle one pattern");
    info!("  s                    – refresh and print status");
    info!("  q                    – quit");
    let names: Vec<&str> = Effect::ALL.into_iter().map(Effect::name).collect();
    info!("Effects: {}", names.join(", "));
}

async fn interactive(lights: &ClusterLights) -> Result<()> {
    print_help();

    // ── Stdin command loop ────────────────────────────────────────────────────
    // Lines are read on a dedicated OS thread (StdinLock is not Send) and
    // relayed to the async loop below.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l.trim().to_owned()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut session = lights.watch_session();
    loop {
        tokio::select! {
            line = line_rx.recv() => {
                let Some(line) = line else { break };
                if line.is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Ok(Line::Quit) => {
                        info!("Quit requested.");
                        break;
                    }
                    Ok(parsed) => {
                        if let Err(e) = execute(lights, parsed).await {
                            error!("{line}: {e}");
                        }
                    }
                    Err(msg) => warn!("{msg}"),
                }
            }
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *session.borrow_and_update();
                info!("Session: {state}");
            }
        }
    }
    Ok(())
}

async fn execute(lights: &ClusterLights, line: Line) -> clusterlights::Result<()> {
    match line {
        Line::Quit => {}
        Line::Help => print_help(),
        Line::Status => {
            lights.get_state().await?;
            lights.get_information().await?;
            print_status(lights);
        }
        Line::Power(true) => lights.on().await?,
        Line::Power(false) => lights.off().await?,
        Line::Brightness(value) => lights.set_brightness(value).await?,
        Line::Effect(effect) => lights.apply_effect(effect).await?,
        Line::Pattern(effect, active) => lights.set_pattern(effect.pattern(), active).await?,
    }
    Ok(())
}
