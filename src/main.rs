use anyhow::Result;
use clap::Parser;
use pslist::{MalformedRows, Platform, ProcQuery, QueryConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pslist", version, about = "List running processes as JSON")]
struct Cli {
    /// Only report this process id.
    pid: Option<String>,

    /// Platform family to dispatch on (unix, windows); defaults to the host.
    #[arg(long)]
    platform: Option<Platform>,

    /// Program used on Unix hosts.
    #[arg(long, default_value = "ps")]
    ps: String,

    /// Program used on Windows hosts.
    #[arg(long, default_value = "wmic")]
    wmic: String,

    /// Fail on the first unparsable row instead of skipping it.
    #[arg(long)]
    strict: bool,

    #[arg(long)]
    pretty: bool,

    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("pslist=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pslist=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = QueryConfig::default()
        .ps_program(cli.ps)
        .wmic_program(cli.wmic);
    if let Some(platform) = cli.platform {
        config = config.platform(platform);
    }
    if cli.strict {
        config = config.malformed_rows(MalformedRows::Fail);
    }

    let query = ProcQuery::new(Some(config));
    let records = query.query(cli.pid.map(Into::into)).await?;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&records)?
    } else {
        serde_json::to_string(&records)?
    };
    println!("{json}");

    Ok(())
}
