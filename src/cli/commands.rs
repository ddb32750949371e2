use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "payrace", version, about = "Race-condition and idempotency tester for payment endpoints")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run race and idempotency tests against payment endpoints
    Scan(ScanArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
    /// Print build information
    Version,
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Endpoint URL to test (repeatable, added to the configured endpoints)
    #[arg(short, long = "target")]
    pub targets: Vec<String>,

    /// HTTP method for --target endpoints
    #[arg(short, long, default_value = "POST")]
    pub method: String,

    /// Concurrent requests per race round
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Cookie string, e.g. "sid=abc; csrf=xyz"
    #[arg(long)]
    pub cookie: Option<String>,

    /// Session token sent as Bearer and X-Session-Token
    #[arg(long)]
    pub token: Option<String>,

    /// Extra header "Name: value" (repeatable)
    #[arg(long = "header")]
    pub headers: Vec<String>,

    /// Test every endpoint, not only payment-related ones
    #[arg(long)]
    pub all_endpoints: bool,

    /// Build and log requests without sending anything
    #[arg(long)]
    pub dry_run: bool,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}
