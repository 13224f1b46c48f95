use clap::Parser;
use tabou_config::{ParentProxy, ProxyConfig};
use tabou_core::master::Master;
use utils::init_tracing;

/// Forwarding HTTP proxy.
#[derive(Debug, Parser)]
#[command(name = "tabou", version, about)]
struct Cli {
    /// Port to listen on (default 8080)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Parent proxy URL; when set every request is relayed through it
    #[arg(short = 'P', long = "parent-proxy", value_name = "URL")]
    parent_proxy: Option<ParentProxy>,

    /// Configuration file (INI); missing file means defaults
    #[arg(short, long, default_value = "tabou.conf")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = ProxyConfig::from_file_or_default(&cli.config);
    cfg.apply_overrides(cli.port, cli.parent_proxy.as_ref());

    init_tracing(cfg.global.log_level());
    cfg.print();

    let master = Master::new(cfg)?;
    master.run().await?;

    Ok(())
}
