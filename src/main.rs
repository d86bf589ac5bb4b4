use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use apple1_emulator::config::{self, Settings};
use apple1_emulator::machine::Machine;
use apple1_emulator::runner::{DEFAULT_FREQUENCY_KHZ, DEFAULT_SYNC_MILLIS};
use apple1_emulator::terminal::Output;
use apple1_emulator::{metrics, server, snapshots};

#[derive(Parser, Debug)]
#[command(name = "apple1", about = "Apple 1 emulator with a terminal on stdin/stdout")]
struct Args {
    /// Directory holding monitor.rom and basic.rom (or krusader.rom)
    #[arg(long, value_name = "PATH")]
    rom_dir: Option<PathBuf>,

    /// Configuration file (default: $HOME/.apple1/apple1.cfg)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Limit writable RAM to the first 8K
    #[arg(long)]
    ram8k: bool,

    /// Allow writes to the monitor page at $FF00
    #[arg(long, conflicts_with = "protect_rom")]
    write_in_rom: bool,

    /// Write protect the monitor page at $FF00
    #[arg(long)]
    protect_rom: bool,

    /// Boot the combined Krusader ROM instead of monitor + BASIC
    #[arg(long)]
    krusader: bool,

    /// Display speed in characters per second (1-120)
    #[arg(long, value_name = "CPS")]
    terminal_speed: Option<u32>,

    #[arg(long, default_value_t = DEFAULT_FREQUENCY_KHZ)]
    frequency_khz: u32,

    #[arg(long, default_value_t = DEFAULT_SYNC_MILLIS)]
    sync_millis: u32,

    /// Control server address
    #[arg(long, default_value = "127.0.0.1:6502")]
    listen: SocketAddr,

    #[arg(long)]
    no_server: bool,

    /// Memory file to load after boot (hex dump, or .bin/.rom image)
    #[arg(long, value_name = "PATH")]
    load: Option<PathBuf>,

    /// Hex start address for binary --load files
    #[arg(long, value_name = "ADDR", default_value = "0", value_parser = parse_address)]
    load_address: u16,

    /// Text file typed in as keyboard input after boot
    #[arg(long, value_name = "PATH")]
    type_file: Option<PathBuf>,
}

fn parse_address(text: &str) -> std::result::Result<u16, String> {
    let digits = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix("0x"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).map_err(|e| format!("bad address \"{}\": {}", text, e))
}

fn apply_args(settings: &mut Settings, args: &Args) {
    if args.ram8k {
        settings.ram8k = true;
    }
    if args.write_in_rom {
        settings.write_in_rom = true;
    }
    if args.protect_rom {
        settings.write_in_rom = false;
    }
    if args.krusader {
        settings.krusader_rom = true;
    }
    if let Some(speed) = args.terminal_speed {
        settings.terminal_speed = speed;
    }
}

fn spawn_stdin_reader(machine: Arc<Machine>) -> Result<()> {
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => machine.keyboard().queue_text(&format!("{}\r", line)),
                    Err(e) => {
                        warn!("Stopped reading stdin: {}", e);
                        break;
                    }
                }
            }
        })
        .context("spawning the stdin reader")?;
    Ok(())
}

/// Feeds the keyboard and copies display output to stdout at terminal
/// speed until `running` is cleared.
fn run_terminal(machine: &Machine, running: &AtomicBool) -> io::Result<()> {
    let stdout = io::stdout();
    while running.load(Ordering::Acquire) {
        machine.pump_keyboard();
        match machine.poll_display() {
            Some(output) => {
                let mut out = stdout.lock();
                match output {
                    Output::Glyph(c) => {
                        write!(out, "{}", c)?;
                        // Wrapped at the right margin
                        if machine.cursor().0 == 0 {
                            writeln!(out)?;
                        }
                    }
                    Output::NewLine => writeln!(out)?,
                    Output::Ignored => {}
                }
                out.flush()?;
                drop(out);
                thread::sleep(machine.output_delay());
            }
            None => thread::sleep(Duration::from_millis(1)),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut settings = Settings::load(&config_path)
        .with_context(|| format!("reading configuration \"{}\"", config_path.display()))?;
    apply_args(&mut settings, &args);

    metrics::init_metrics();
    let machine = Arc::new(Machine::new(settings, config::rom_dir(args.rom_dir.clone()))?);
    machine.runner().set_speed(args.frequency_khz, args.sync_millis)?;
    machine.power_on().context("starting the machine")?;

    if let Some(path) = &args.load {
        if let Err(e) = machine.load_file(path, args.load_address) {
            warn!("Could not load \"{}\": {}", path.display(), e);
        }
    }
    if let Some(path) = &args.type_file {
        if let Err(e) = machine.keyboard().queue_file(path) {
            warn!("Could not type \"{}\": {}", path.display(), e);
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let runtime = tokio::runtime::Runtime::new().context("creating the tokio runtime")?;
    if !args.no_server {
        runtime.spawn(server::serve(
            args.listen,
            Arc::clone(&machine),
            snapshots::new_store(),
        ));
    }
    {
        let running = Arc::clone(&running);
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, shutting down");
                running.store(false, Ordering::Release);
            }
        });
    }

    spawn_stdin_reader(Arc::clone(&machine))?;
    run_terminal(&machine, &running).context("writing to the terminal")?;

    machine.shutdown();
    if let Err(e) = machine.settings().save(&config_path) {
        warn!("Could not save configuration: {}", e);
    }
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}
