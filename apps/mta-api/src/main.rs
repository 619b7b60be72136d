use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = mta_api::Args::parse();

	mta_api::run(args).await
}
