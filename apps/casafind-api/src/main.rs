use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = casafind_api::Args::parse();
	casafind_api::run(args).await
}
