use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use repolens::app::App;
use repolens::config::Config;
use repolens::event::EventHandler;
use repolens::logging;
use repolens::remote::RemoteClient;
use repolens::session::Session;
use repolens::store::Action;

#[derive(Parser, Debug)]
#[command(name = "repolens")]
#[command(about = "Search repositories from the terminal, with a shared fetch cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/repolens/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Search service URL, overriding the config file
  #[arg(long)]
  api_url: Option<String>,

  /// Initial search query
  #[arg(short, long)]
  query: Option<String>,

  /// Results per page
  #[arg(long)]
  page_size: Option<NonZeroU32>,

  /// Run the initial query, print the results and exit
  #[arg(long, requires = "query")]
  once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(url) = args.api_url {
    config.api.url = url;
  }
  if let Some(page_size) = args.page_size {
    config.search.page_size = page_size;
  }
  config.validate()?;

  let _guard = logging::init(&config.log)?;
  info!(api = %config.api.url, "starting repolens");

  let client = RemoteClient::new(&config.api)?;
  let mut session = Session::from_config(client, &config);
  if let Some(query) = args.query {
    session.dispatch(Action::SetSearchQuery(query));
  }

  let mut app = App::new(session);
  if args.once {
    if app.session().search().key().is_none() {
      return Err(eyre!("--once needs a non-empty --query"));
    }
    return app.run_once().await;
  }

  app.run(EventHandler::new(Duration::from_millis(250))).await
}
