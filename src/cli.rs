use clap::Parser;

#[derive(clap::Parser, Debug)]
#[command(author, version, about = "Passive URL discovery from code search, web archives and threat-intel indexes", long_about = None)]
pub struct Cli {
    /// Target domain (e.g. example.com)
    #[arg(short = 'd', long, required_unless_present = "list_sources")]
    pub domain: Option<String>,

    /// Treat subdomains of the target as in scope
    #[arg(long = "include-subdomains", default_value_t = false)]
    pub include_subdomains: bool,

    /// Comma-separated sources to use (default: all, or `sources` from the config file)
    #[arg(short = 's', long, value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Comma-separated sources to skip
    #[arg(short = 'e', long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Path to a JSON config file (default: ~/.config/url_hunter/config.json)
    #[arg(long, value_name = "FILE")]
    pub config: Option<String>,

    /// Also append results to this file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<String>,

    /// Write JSON lines ({"source","url"}) instead of bare URLs
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Stop the whole run after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// List available sources and exit
    #[arg(long, default_value_t = false)]
    pub list_sources: bool,

    /// Enable detailed debug logging (global)
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Enable verbose logging (global)
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
