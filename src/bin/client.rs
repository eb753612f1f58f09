use argh::FromArgs;
use infernum_gateway::{
    client::{FixedDelay, RetryPolicy, VisionClient},
    config::{ClientConfig, Env},
    logging, validation,
};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

#[derive(FromArgs)]
/// Infernum client for analyzing images through the gateway
struct ClientArgs {
    /// the gateway base URL (default: $API_URL or http://localhost:8000)
    #[argh(option, short = 'u')]
    url: Option<String>,

    /// request timeout in seconds (default: $API_TIMEOUT or 60)
    #[argh(option, short = 't')]
    timeout: Option<u64>,

    /// attempts per image (default: $API_MAX_RETRIES or 3)
    #[argh(option, short = 'r')]
    retries: Option<u32>,

    /// do not retry failures that cannot succeed later, like a rejected format
    #[argh(switch)]
    no_retry_client_errors: bool,

    /// command to execute: "analyze" or "batch"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Analyze(AnalyzeCommand),
    Batch(BatchCommand),
}

#[derive(FromArgs)]
/// Analyze a single image
#[argh(subcommand, name = "analyze")]
struct AnalyzeCommand {
    /// the path to the image
    #[argh(positional)]
    image_path: PathBuf,

    /// the prompt to use
    #[argh(option, short = 'p')]
    prompt: Option<String>,
}

#[derive(FromArgs)]
/// Analyze many images in order and export the results
#[argh(subcommand, name = "batch")]
struct BatchCommand {
    /// images to analyze
    #[argh(positional)]
    images: Vec<PathBuf>,

    /// analyze every supported image in this directory (default: images)
    #[argh(option, short = 'd')]
    dir: Option<PathBuf>,

    /// the prompt to use for every image
    #[argh(option, short = 'p')]
    prompt: Option<String>,

    /// where to write the JSON export
    #[argh(option, default = "PathBuf::from(\"results.json\")")]
    json: PathBuf,

    /// where to write the CSV export
    #[argh(option, default = "PathBuf::from(\"results.csv\")")]
    csv: PathBuf,

    /// pause between images in milliseconds
    #[argh(option, default = "500")]
    pause_ms: u64,
}

/// Supported images directly inside `dir`, sorted by path.
fn scan_dir(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let supported = path.file_name().and_then(|name| name.to_str()).is_some_and(|name| {
            validation::is_supported_format(name, &validation::SUPPORTED_FORMATS)
        });
        if path.is_file() && supported {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

async fn analyze(client: &VisionClient, command: AnalyzeCommand) -> ExitCode {
    if !command.image_path.exists() {
        eprintln!("Error: File '{}' not found", command.image_path.display());
        return ExitCode::FAILURE;
    }

    println!("Sending image: {}", command.image_path.display());
    let Some(result) = client
        .analyze(&command.image_path, command.prompt.as_deref())
        .await
    else {
        eprintln!(
            "Error: no result after {} attempts",
            client.retry_policy().max_attempts
        );
        return ExitCode::FAILURE;
    };

    if !result.success {
        eprintln!("Error: {}", result.message);
        return ExitCode::FAILURE;
    }

    let rule = "=".repeat(60);
    println!("\n{rule}");
    println!("ANALYSIS RESULT");
    println!("{rule}");
    println!("Analysis:\n{}", result.analysis.unwrap_or_default());
    if let Some(time) = result.inference_time {
        println!("\nTime: {time:.2}s");
    }
    println!("{rule}");
    ExitCode::SUCCESS
}

async fn batch(
    client: VisionClient,
    command: BatchCommand,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut images = command.images;
    if images.is_empty() || command.dir.is_some() {
        let dir = command.dir.unwrap_or_else(|| PathBuf::from("images"));
        images.extend(scan_dir(&dir)?);
    }
    if images.is_empty() {
        eprintln!("No images to analyze");
        return Ok(ExitCode::FAILURE);
    }

    let mut client = client.with_pacing(FixedDelay(Duration::from_millis(command.pause_ms)));
    let records = client
        .batch_analyze(&images, command.prompt.as_deref())
        .await;
    println!("Analyzed {}/{} images", records.len(), images.len());

    if client.export_json(&command.json)? > 0 {
        println!("Exported: {}", command.json.display());
    }
    if client.export_csv(&command.csv)? > 0 {
        println!("Exported: {}", command.csv.display());
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let mut config = ClientConfig::from_env(&Env::process())?;
    if let Some(url) = args.url {
        config.api_url = url.trim_end_matches('/').to_string();
    }
    if let Some(timeout) = args.timeout {
        config.timeout = Duration::from_secs(timeout);
    }
    if let Some(retries) = args.retries {
        config.max_retries = retries;
    }
    logging::init(&config.log)?;

    let client = VisionClient::from_config(&config)?.with_retry(RetryPolicy {
        max_attempts: config.max_retries,
        retry_client_errors: !args.no_retry_client_errors,
        ..RetryPolicy::default()
    });

    match args.command {
        ClientCommands::Analyze(command) => Ok(analyze(&client, command).await),
        ClientCommands::Batch(command) => batch(client, command).await,
    }
}
