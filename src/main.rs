use clap::Parser;

use fanrelay::config::{BrokerBackend, Cli, Config};
use fanrelay::relay::{DeliveryMode, RelayOptions};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanrelay=debug,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().apply_cli(&cli);
    let options = RelayOptions::from_config(&config);
    print_banner(&config, &options);

    if let Err(e) = fanrelay::server::run(config, options, None).await {
        tracing::error!("relay stopped: {e}");
        std::process::exit(1);
    }
}

fn print_banner(config: &Config, options: &RelayOptions) {
    let version = env!("CARGO_PKG_VERSION");
    let broker = match config.broker {
        BrokerBackend::Redis => config.redis.url(),
        BrokerBackend::Memory => "memory (single node)".to_string(),
    };
    let delivery = match options.delivery {
        DeliveryMode::Push => "push".to_string(),
        DeliveryMode::Poll(interval) => format!("poll every {}ms", interval.as_millis()),
    };
    let mut origins: Vec<&str> = options.allowed_origins.iter().map(String::as_str).collect();
    origins.sort_unstable();

    eprintln!();
    eprintln!("  \x1b[1;36mfanrelay\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mbroker\x1b[0m       {broker}");
    eprintln!("  \x1b[2mdelivery\x1b[0m     {delivery}");
    eprintln!("  \x1b[2morigins\x1b[0m      {}", origins.join(", "));
    eprintln!("  \x1b[2mroute\x1b[0m        ws://{}:{}/handler/{{channel}}", config.host, config.port);
    eprintln!();
}
