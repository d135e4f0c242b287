mod cli;
mod error;
mod overlay;
mod pipeline;
mod playback;
mod pose;
mod session;
mod video;
mod web;

use anyhow::{Context, Result};
use cli::{Args, Command};
use session::Session;
use web::server::run_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    match args.command {
        Command::Serve {
            host,
            port,
            video_root,
            pipeline: options,
        } => {
            let session = Session::new(tokio::runtime::Handle::current(), options.settings());
            run_server(host, port, video_root, session).await?;
        }
        Command::Extract {
            video,
            pipeline: options,
        } => {
            let request = options.request(video);
            // the pipeline blocks on decode and inference
            let summary = tokio::task::spawn_blocking(move || pipeline::extract::extract(request))
                .await
                .context("Extraction task panicked")??;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
