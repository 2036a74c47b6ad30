use clap::Parser;

use books_api::config::Config;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info")),
    )
    .init();

  let config = Config::parse();
  if let Err(err) = books_api::run(config).await {
    log::error!("books-api failed: {}", err);
    std::process::exit(1);
  }
}
