use argh::FromArgs;
use infernum_gateway::{
    backends::{self, BackendKind},
    config::{Env, GatewayConfig},
    gateway::{self, GatewayState},
    logging, shutdown_signal,
};
use tokio::net::TcpListener;

#[derive(FromArgs)]
/// Infernum gateway: analyzes uploaded images with a vision-language model.
struct GatewayArgs {
    /// the host to run the server on (default: $API_HOST or 0.0.0.0)
    #[argh(option, short = 'h')]
    host: Option<String>,

    /// the port to run the server on (default: $API_PORT or 8000)
    #[argh(option, short = 'p')]
    port: Option<u16>,

    /// the backend to load, "stats" or "paligemma" (default: $GATEWAY_BACKEND)
    #[argh(option, short = 'b')]
    backend: Option<BackendKind>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: GatewayArgs = argh::from_env();

    let mut config = GatewayConfig::from_env(&Env::process())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(backend) = args.backend {
        config.select_backend(backend);
    }
    logging::init(&config.log)?;

    // format the host and port
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    log::info!("🚀 Starting the gateway");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🧠 Backend: {} ({})", config.backend, config.model_name());
    log::info!("🔧 Press Ctrl+C to stop the server");

    let kind = config.backend;
    let backend_config = config.backend_config.clone();
    let state = GatewayState::new(config);

    gateway::run(
        listener,
        state,
        move || backends::load_engine(kind, &backend_config),
        shutdown_signal(),
    )
    .await?;

    Ok(())
}
