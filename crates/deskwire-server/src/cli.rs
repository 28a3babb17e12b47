use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "deskwire-server")]
#[command(
    author,
    version,
    about = "Helpdesk API with realtime ticket and notice notifications"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "deskwire.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Origins allowed to open realtime connections (comma-separated, `*` for any)
    #[arg(long, env = "DESKWIRE_ALLOWED_ORIGINS")]
    pub allowed_origins: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
