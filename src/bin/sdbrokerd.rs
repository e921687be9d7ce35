use clap::Parser;
use sdbroker::{Config, Server};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> sdbroker::Result<()> {
	setup_tracing()?;

	let arguments = Arguments::parse();
	let config = Config::new(arguments.listen);

	let server = Server::new(config);
	server.run(shutdown_signal()).await?;

	Ok(())
}

async fn shutdown_signal() {
	if let Err(error) = tokio::signal::ctrl_c().await {
		tracing::warn!(%error, "failed to install ctrl-c handler");
		std::future::pending::<()>().await;
	}
}

fn setup_tracing() -> sdbroker::Result<()> {
	let filter = EnvFilter::builder()
		.with_default_directive(LevelFilter::INFO.into())
		.with_env_var("SDBROKER_LOG")
		.try_from_env();

	let subscriber = tracing_subscriber::fmt()
		.with_file(true)
		.with_target(false)
		.with_env_filter(filter.unwrap_or_default())
		.finish();

	tracing::subscriber::set_global_default(subscriber)
		.map_err(|_| sdbroker::Error::InvalidAddress("failed to install global tracing subscriber".into()))
}

/// `sdbrokerd`: the service-discovery broker daemon.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Arguments {
	/// Address to listen on. May be given more than once to bind
	/// multiple addresses.
	#[arg(long, short = 'l', env = "SDBROKER_LISTEN", default_value = "0.0.0.0:7890")]
	listen: Vec<String>,
}
