// src/main.rs

//! Agent entry-point: xHCI interrupt moderation from the command line.
//!
//! 1. Parse arguments & load `imod-agent.toml`
//! 2. Set up structured logging
//! 3. Resolve Startup-folder / driver paths
//! 4. Dispatch: apply, list, or edit-and-persist the IMOD config
//!
// ───── std / 3rd-party imports ──────────────────────────────────────────────
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process,
};

// ───── local imports ────────────────────────────────────────────────────────
use imod::config::model::override_key_for;
use imod::config::parser::{format_u32, parse_u32};
use imod::config::{ImodConfig, ImodPaths, load_agent_settings};
use imod::devices::CM_PROB_DISABLED;
use imod::driver_image::DriverImage;
use imod::engine::runner::{Platform, apply_imod, summarize};
use imod::entry::{EXIT_FAILURE, EXIT_SUCCESS, apply_from_script};
use imod::logging::setup_logging;
use imod::persist::{self, PersistOutcome};
use imod::platform::NativePlatform;

// ───── constants ────────────────────────────────────────────────────────────
const SETTINGS_FILE: &str = "imod-agent.toml";

// ───── helpers ──────────────────────────────────────────────────────────────

/// Print an error with context and terminate the process.
macro_rules! fatal {
    ($ctx:expr, $($arg:tt)+) => {{
        eprintln!(
            "[{}][ERROR][{}] {}",
            chrono::Local::now().to_rfc3339(),
            $ctx,
            format!($($arg)+)
        );
        std::process::exit(1);
    }};
}

/// Executable path and the directory that contains it.
fn exe_location() -> Result<(PathBuf, PathBuf)> {
    let exe = std::env::current_exe().context("cannot determine executable path")?;
    let dir = exe
        .parent()
        .map(Path::to_path_buf)
        .context("executable must live in some directory")?;
    Ok((exe, dir))
}

fn parse_value(text: &str) -> std::result::Result<u32, String> {
    parse_u32(text).ok_or_else(|| format!("'{text}' is not a decimal or 0x-prefixed 32-bit value"))
}

// ───── command line ─────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "imod-agent", version, about = "Program xHCI interrupt moderation intervals")]
struct Cli {
    /// Log at DEBUG level regardless of imod-agent.toml.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply the persisted (or given) config to every xHCI controller.
    Apply {
        /// Config file to apply instead of the Startup-folder script.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Print a JSON report instead of the one-line note.
        #[arg(long)]
        json: bool,
    },
    /// List xHCI controllers with their resolved base and effective settings.
    List,
    /// Change the global register values.
    Set {
        #[command(flatten)]
        values: RegisterArgs,
        /// Apply the resulting config right away.
        #[arg(long)]
        apply: bool,
    },
    /// Add, change or remove a per-device override.
    Device {
        /// Hardware-id substring, e.g. DEV_A36D.
        hwid: String,
        #[command(flatten)]
        values: RegisterArgs,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// Drop the override entirely.
        #[arg(long, conflicts_with_all = ["enable", "disable", "interval", "hcsparams_offset", "rtsoff"])]
        remove: bool,
        #[arg(long)]
        apply: bool,
    },
    /// Restore defaults and remove the startup files.
    Reset {
        #[arg(long)]
        apply: bool,
    },
}

#[derive(Debug, Args)]
struct RegisterArgs {
    /// IMOD interval in 250 ns units.
    #[arg(long, value_parser = parse_value)]
    interval: Option<u32>,
    /// Offset of HCSPARAMS1 from the capability base.
    #[arg(long, value_parser = parse_value)]
    hcsparams_offset: Option<u32>,
    /// Offset of RTSOFF from the capability base.
    #[arg(long, value_parser = parse_value)]
    rtsoff: Option<u32>,
}

// ───── commands ─────────────────────────────────────────────────────────────

struct AgentContext {
    paths: ImodPaths,
    platform: NativePlatform,
    image: DriverImage,
}

fn list(ctx: &AgentContext) -> Result<i32> {
    let controllers = ctx.platform.enumerate_controllers()?;
    let config = persist::load(&ctx.paths);
    if controllers.is_empty() {
        println!("No xHCI controllers found.");
        return Ok(EXIT_SUCCESS);
    }

    for controller in &controllers {
        let settings = config.effective_for(&controller.device_id);
        let status = match controller.problem_code {
            0 => "ok".to_string(),
            CM_PROB_DISABLED => "disabled".to_string(),
            code => format!("problem {code:#X}"),
        };
        let base = match controller.base_address {
            Some(addr) => format!("{addr:#X}"),
            None => format!("missing ({})", controller.base_error.as_deref().unwrap_or("unknown")),
        };
        println!("{}", controller.caption);
        println!("  id:       {}", controller.device_id);
        println!("  key:      {}", override_key_for(&controller.device_id));
        println!("  status:   {status}");
        println!("  base:     {base}");
        println!(
            "  settings: interval={} hcsparams={} rtsoff={} enabled={}",
            format_u32(settings.interval),
            format_u32(settings.hcsparams_offset),
            format_u32(settings.rtsoff),
            settings.enabled
        );
    }
    Ok(EXIT_SUCCESS)
}

/// Persist `config`, then optionally apply it.
fn commit(ctx: &AgentContext, mut config: ImodConfig, apply: bool) -> Result<i32> {
    let outcome = persist::persist(&mut config, &ctx.paths)
        .with_context(|| format!("failed to update {}", ctx.paths.startup_script.display()))?;
    match outcome {
        PersistOutcome::Written => println!("Saved {}", ctx.paths.startup_script.display()),
        PersistOutcome::Removed => println!("Settings match defaults; startup files removed."),
    }
    if !apply {
        return Ok(EXIT_SUCCESS);
    }

    match apply_imod(&ctx.platform, &config, &ctx.image, config.has_persisted_script) {
        Ok(stats) => {
            println!("{}", summarize(&stats));
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            println!("IMOD failed: {e}");
            Ok(EXIT_FAILURE)
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    // 1 ─ Context
    let (exe, exe_dir) = exe_location()?;
    let settings_path = exe_dir.join(SETTINGS_FILE);
    let settings = load_agent_settings(&settings_path)
        .with_context(|| format!("failed to load {}", settings_path.display()))?;

    // 2 ─ Logging
    setup_logging(&exe_dir, &settings.logging, cli.verbose).context("logging setup failed")?;
    imod::imod_log!(log::Level::Debug, "imod", "imod-agent {} starting", env!("CARGO_PKG_VERSION"));

    // 3 ─ Paths
    let paths = ImodPaths::resolve(&exe, &settings.paths);
    let ctx = AgentContext {
        image: DriverImage::for_paths(&paths),
        paths,
        platform: NativePlatform::new(),
    };

    // 4 ─ Dispatch
    match cli.command {
        Command::Apply { config, json } => {
            let outcome = apply_from_script(&ctx.platform, config.as_deref(), &ctx.paths, &ctx.image);
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.report())?);
            } else {
                println!("{}", outcome.note);
            }
            Ok(outcome.exit_code)
        }
        Command::List => list(&ctx),
        Command::Set { values, apply } => {
            let mut config = persist::load(&ctx.paths);
            if let Some(v) = values.interval {
                config.global_interval = if v == 0 { imod::config::model::DEFAULT_INTERVAL } else { v };
            }
            if let Some(v) = values.hcsparams_offset {
                config.global_hcsparams_offset = v;
            }
            if let Some(v) = values.rtsoff {
                config.global_rtsoff = v;
            }
            commit(&ctx, config, apply)
        }
        Command::Device { hwid, values, enable, disable, remove, apply } => {
            let mut config = persist::load(&ctx.paths);
            if remove {
                if !config.remove_override(&hwid) {
                    println!("No override for {hwid}.");
                }
            } else {
                let entry = config.override_entry(&hwid);
                if values.interval.is_some() {
                    entry.interval = values.interval;
                }
                if values.hcsparams_offset.is_some() {
                    entry.hcsparams_offset = values.hcsparams_offset;
                }
                if values.rtsoff.is_some() {
                    entry.rtsoff = values.rtsoff;
                }
                if enable {
                    entry.enabled = Some(true);
                } else if disable {
                    entry.enabled = Some(false);
                }
            }
            commit(&ctx, config, apply)
        }
        Command::Reset { apply } => {
            let mut config = persist::load(&ctx.paths);
            config.reset();
            commit(&ctx, config, apply)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => fatal!("main", "{:#}", e),
    }
}
