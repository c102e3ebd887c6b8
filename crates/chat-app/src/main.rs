use assistant::{AppError, cli::Cli};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Logs go to stderr so they never interleave with streamed replies.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    assistant::app::run(cli).await
}
