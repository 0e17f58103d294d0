use anyhow::Context;
use clap::Parser;
use gaybar::bar::Bar;
use gaybar::config::Config;
use gaybar::modules::ModuleRegistry;
use std::fs::File;
use std::path::PathBuf;

/// Status bar for Wayland compositors with layer-shell support
#[derive(Parser, Debug)]
#[command(name = "gaybar", version, about)]
struct Args {
    /// Configuration file [default: $XDG_CONFIG_HOME/gaybar/config.jsonc]
    #[arg(short = 'c', long, env = "GAYBAR_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides RUST_LOG
    #[arg(short = 'L', long)]
    log_level: Option<log::LevelFilter>,

    /// Write the log to this file instead of stderr
    #[arg(short = 'f', long)]
    log_file: Option<PathBuf>,
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = args.log_level {
        builder.filter_level(level);
    }
    if let Some(path) = &args.log_file {
        let file = File::create(path).with_context(|| format!("could not open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
        builder.write_style(env_logger::WriteStyle::Never);
    }
    builder.init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    log::debug!("{:?}", args);

    let config = Config::load(args.config.as_deref()).context("could not load configuration")?;
    let registry = ModuleRegistry::builtin();

    let mut bar = Bar::new(&config, &registry).context("could not start the bar")?;
    let result = bar.run();
    bar.shutdown();
    result.context("bar stopped")
}
