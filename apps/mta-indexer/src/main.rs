use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = mta_indexer::Args::parse();

	mta_indexer::run(args).await
}
