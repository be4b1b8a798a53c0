// postgrab - print post metadata as JSON, or stream the media to a file

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use postgrab::{
    describe, open_media, DeliveryIntent, ErrorResponse, PostResolver, ResolutionFailure,
    ResolverConfig, StrategyKind,
};

#[derive(Debug, Parser)]
#[command(name = "postgrab", version)]
#[command(about = "Resolve a post link into watermark-free media and metadata", long_about = None)]
struct Cli {
    /// Post URL (shortened links are followed)
    #[arg(value_name = "URL")]
    url: String,

    /// Download the media instead of printing metadata
    #[arg(short, long)]
    download: bool,

    /// Download one gallery image by position (0-based)
    #[arg(short, long, value_name = "N")]
    index: Option<usize>,

    /// Output file or directory (default: the download directory)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Config file (default: <config dir>/postgrab/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SOCKS5/HTTP proxy URL
    #[arg(long, value_name = "URL")]
    proxy: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Strategy order, comma separated (web,mobile,bulk,html,aggregator)
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    strategies: Option<Vec<StrategyKind>>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("postgrab=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!(error = %e, "failed to serialize response"),
    }
}

fn report_failure(failure: &ResolutionFailure) -> ExitCode {
    if let Some(detail) = failure.detail() {
        warn!(detail = %detail, "request failed");
    }
    print_json(&ErrorResponse::from(failure));
    if failure.is_client_error() {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

/// Explicit file, a file inside an explicit directory, or the download directory
fn output_path(output: Option<&Path>, filename: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(filename),
        Some(path) => path.to_path_buf(),
        None => dirs::download_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(filename),
    }
}

async fn download(
    resolver: &PostResolver,
    post: &postgrab::ResolvedPost,
    intent: DeliveryIntent,
    output: Option<&Path>,
) -> Result<PathBuf, ResolutionFailure> {
    let media = open_media(resolver, post, intent).await?;
    let path = output_path(output, &media.filename);

    let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
        ResolutionFailure::MediaFetchFailed(format!("cannot create {}: {}", path.display(), e))
    })?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    info!(path = %path.display(), content_type = %media.content_type, size = ?media.content_length, "downloading");
    match media.relay(&mut file, &cancel).await {
        Ok(_) => Ok(path),
        Err(e) => {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            Err(e)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match ResolverConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    if cli.proxy.is_some() {
        config = config.with_proxy(cli.proxy.clone());
    }
    if let Some(secs) = cli.timeout {
        config = config.with_timeout(secs);
    }
    if let Some(strategies) = cli.strategies.clone() {
        config = config.with_strategies(strategies);
    }

    let resolver = match PostResolver::new(config) {
        Ok(resolver) => resolver,
        Err(e) => {
            error!(error = %e, "cannot build resolver");
            return ExitCode::FAILURE;
        }
    };

    let post = match resolver.resolve_post(&cli.url).await {
        Ok(post) => post,
        Err(failure) => return report_failure(&failure),
    };

    match DeliveryIntent::from_params(cli.download, cli.index) {
        DeliveryIntent::Metadata => {
            print_json(&describe(&resolver, &post).await);
            ExitCode::SUCCESS
        }
        intent => match download(&resolver, &post, intent, cli.output.as_deref()).await {
            Ok(path) => {
                println!("{}", path.display());
                ExitCode::SUCCESS
            }
            Err(failure) => report_failure(&failure),
        },
    }
}
