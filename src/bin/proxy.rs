use argh::FromArgs;
use infernum_gateway::{
    config::{Env, ProxyConfig},
    logging,
    proxy::{self, ProxyState},
    shutdown_signal,
};
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(FromArgs)]
/// Infernum web proxy: serves the UI and forwards its requests to the gateway.
struct ProxyArgs {
    /// the host to run the proxy on (default: $WEB_HOST or 0.0.0.0)
    #[argh(option, short = 'h')]
    host: Option<String>,

    /// the port to run the proxy on (default: $WEB_PORT or 8080)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// the gateway base URL (default: $API_URL or http://localhost:8000)
    #[argh(option, short = 'u')]
    api_url: Option<String>,

    /// directory holding index.html (default: $WEB_DIR or web)
    #[argh(option, short = 'w')]
    web_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ProxyArgs = argh::from_env();

    let mut config = ProxyConfig::from_env(&Env::process())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(api_url) = args.api_url {
        config.api_url = api_url.trim_end_matches('/').to_string();
    }
    if let Some(web_dir) = args.web_dir {
        config.web_dir = web_dir;
    }
    logging::init(&config.log)?;

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    log::info!("🌐 Web server: http://{}", addr);
    log::info!("🔗 API backend: {}", config.api_url);

    let state = ProxyState::new(config)?;
    proxy::run(listener, state, shutdown_signal()).await?;

    Ok(())
}
