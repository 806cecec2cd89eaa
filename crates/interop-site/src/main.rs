use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use interop_site::SiteConfig;

#[derive(Parser, Debug)]
#[command(name = "interop-site")]
#[command(about = "Echo site for HTTP/2 interop testing")]
struct Args {
    /// Address to listen on (port 0 = ephemeral)
    #[arg(long, default_value = "[::]:0")]
    bind: SocketAddr,

    /// Directory containing post.html (defaults to the working directory)
    #[arg(long)]
    content_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let content_root = match args.content_root {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let site = interop_site::start(SiteConfig {
        bind: args.bind,
        content_root,
        ..Default::default()
    })
    .await?;

    // The deployer watches stdout for this line; nothing else goes there.
    println!("{}", site.ready_line());

    let handle = site.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        handle.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
    });

    site.wait().await?;
    info!("Interop site stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
