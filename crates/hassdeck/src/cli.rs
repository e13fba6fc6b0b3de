//! Clap derive structures for the `hassdeck` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hassdeck -- Home Assistant from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "hassdeck",
    version,
    about = "Control a Home Assistant hub from the command line",
    long_about = "Inspect entity states, call services, and stream state changes from a\n\
        Home Assistant hub over its realtime WebSocket API.\n\n\
        Hubs are configured as named profiles; run `hassdeck config init` to add one.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Hub profile to use
    #[arg(long, short = 'p', env = "HASSDECK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Hub URL (overrides profile)
    #[arg(long, short = 'H', env = "HASSDECK_HUB", global = true)]
    pub hub: Option<String>,

    /// Long-lived access token (overrides profile)
    #[arg(long, env = "HASSDECK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HASSDECK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates from the admin backend
    #[arg(long, short = 'k', env = "HASSDECK_INSECURE", global = true)]
    pub insecure: bool,

    /// Connect and request timeout in seconds (overrides profile)
    #[arg(long, env = "HASSDECK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List entity states
    #[command(alias = "ls")]
    States(StatesArgs),

    /// Show one entity's state and attributes
    State {
        /// Entity id (e.g., light.kitchen)
        entity_id: String,
    },

    /// Call a hub service
    Call(CallArgs),

    /// Stream state changes until interrupted
    Watch(WatchArgs),

    /// List areas
    Areas,

    /// List devices
    #[command(alias = "dev")]
    Devices,

    /// List registered entities
    Entities(EntitiesArgs),

    /// List available services
    Services(ServicesArgs),

    /// Show hub information
    Info,

    /// Measure the hub round-trip time
    Ping,

    /// Query the admin backend
    Admin(AdminArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  STATES / CALL / WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct StatesArgs {
    /// Only entities in this domain (e.g., light)
    #[arg(long, short = 'd')]
    pub domain: Option<String>,
}

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Service domain (e.g., light)
    pub domain: String,

    /// Service name (e.g., turn_on)
    pub service: String,

    /// Target entity (repeatable)
    #[arg(long, short = 'e')]
    pub entity: Vec<String>,

    /// Service data as a JSON object
    #[arg(long)]
    pub data: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only changes in this domain
    #[arg(long, short = 'd')]
    pub domain: Option<String>,

    /// Only changes to these entities (comma-separated)
    #[arg(long, short = 'e', value_delimiter = ',')]
    pub entity: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  REGISTRY
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct EntitiesArgs {
    /// Only entities in this domain
    #[arg(long, short = 'd')]
    pub domain: Option<String>,

    /// Only entities in this area (id)
    #[arg(long, short = 'a')]
    pub area: Option<String>,

    /// Include disabled entities
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct ServicesArgs {
    /// Only services in this domain
    #[arg(long, short = 'd')]
    pub domain: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ADMIN
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct AdminArgs {
    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    /// Entity-to-room mappings
    Mappings,

    /// Dashboard preferences
    Preferences,

    /// Backend usage statistics
    Stats,

    /// Camera configuration and stream URLs
    Camera {
        /// Camera name; omit to show the camera configuration
        name: Option<String>,

        /// Number of recent events to link
        #[arg(long, default_value = "20")]
        events: u32,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Add a hub profile with guided setup
    Init,

    /// List configured profiles
    #[command(alias = "profiles")]
    List,

    /// Make a profile the active one
    Use {
        /// Profile id
        name: String,
    },

    /// Delete a profile and its stored token
    #[command(alias = "rm")]
    Remove {
        /// Profile id
        name: String,
    },

    /// Store a profile's access token in the system keyring
    SetToken {
        /// Profile id (defaults to the active profile)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Display the resolved configuration
    Show,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
