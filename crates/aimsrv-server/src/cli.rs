//! Command-line surface (`SPEC_FULL.md` §4.13).

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "aimsrv", version, about = "OSCAR protocol server")]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Starts all configured listeners (the default when no subcommand is given).
    Serve(ServeArgs),
    /// Provisions an account directly against the configured repository.
    CreateAccount {
        #[arg(long)]
        screen_name: String,
        #[arg(long)]
        password_hash: String,
    },
    /// Prints persisted public chat rooms.
    ListRooms,
}

/// One override flag per listener host/port plus the cross-cutting
/// settings (`SPEC_FULL.md` §4.13: "one flag per listener host/port, DSN,
/// and log level").
#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[arg(long)]
    pub auth_bind_host: Option<String>,
    #[arg(long)]
    pub auth_bind_port: Option<u16>,
    #[arg(long)]
    pub bos_bind_host: Option<String>,
    #[arg(long)]
    pub bos_bind_port: Option<u16>,
    #[arg(long)]
    pub chat_bind_host: Option<String>,
    #[arg(long)]
    pub chat_bind_port: Option<u16>,
    #[arg(long)]
    pub chat_nav_bind_host: Option<String>,
    #[arg(long)]
    pub chat_nav_bind_port: Option<u16>,
    #[arg(long)]
    pub bart_bind_host: Option<String>,
    #[arg(long)]
    pub bart_bind_port: Option<u16>,
    #[arg(long)]
    pub admin_bind_host: Option<String>,
    #[arg(long)]
    pub admin_bind_port: Option<u16>,
    #[arg(long)]
    pub alert_bind_host: Option<String>,
    #[arg(long)]
    pub alert_bind_port: Option<u16>,
    #[arg(long)]
    pub odir_bind_host: Option<String>,
    #[arg(long)]
    pub odir_bind_port: Option<u16>,
    #[arg(long)]
    pub advertised_host: Option<String>,
    #[arg(long)]
    pub dsn: Option<String>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub registration_open: Option<bool>,
}
