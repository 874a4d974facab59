use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "Drive and inspect session trackers")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of ~/.tether/config.toml / ./tether.toml.
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SimulateArgs {
    /// Lifecycle script, one step per line. `-` reads stdin.
    pub script: String,

    /// Keep snapshots in memory instead of the configured store.
    #[arg(long, default_value_t = false)]
    pub ephemeral: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct InspectArgs {
    /// Emit a single JSON document instead of pretty output.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ClearArgs {
    /// Only clear this key.
    #[arg(long)]
    pub key: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a lifecycle script against both trackers and print tracked events.
    Simulate(SimulateArgs),
    /// Show persisted sessions and their derived metrics.
    Inspect(InspectArgs),
    /// Remove persisted session state.
    Clear(ClearArgs),
}
