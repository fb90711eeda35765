use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = casafind_worker::Args::parse();
	casafind_worker::run(args).await
}
