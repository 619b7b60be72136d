use std::{fs, path::PathBuf, sync::Arc};

use clap::Parser;
use color_eyre::eyre::{self, WrapErr};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use mta_domain::article::{self, RawArticle};
use mta_service::{HttpEmbedding, IndexWriter, Indexer};
use mta_storage::qdrant::QdrantStore;

#[derive(Debug, Parser)]
#[command(
	version = mta_cli::VERSION,
	rename_all = "kebab",
	styles = mta_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// JSON file holding an array of articles or a news API response with an `articles` field.
	#[arg(long, short = 'a', value_name = "FILE")]
	pub articles: PathBuf,
	/// Drop every indexed chunk before indexing.
	#[arg(long)]
	pub recreate: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArticlesFile {
	List(Vec<RawArticle>),
	Envelope { articles: Vec<RawArticle> },
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = mta_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let raw = fs::read_to_string(&args.articles)
		.wrap_err_with(|| format!("Failed to read {}.", args.articles.display()))?;
	let articles = parse_articles(&raw)?;
	let normalized = article::normalize_articles(&articles, config.ingest.min_body_chars);

	for (position, code) in &normalized.rejected {
		tracing::info!(position, ?code, "Article rejected.");
	}

	tracing::info!(
		received = articles.len(),
		accepted = normalized.documents.len(),
		rejected = normalized.rejected.len(),
		duplicates = normalized.duplicates,
		"Articles normalized."
	);

	let store = Arc::new(QdrantStore::new(&config.storage.qdrant)?);

	if args.recreate {
		store.recreate_collection().await?;

		tracing::info!(collection = %config.storage.qdrant.collection, "Collection recreated.");
	} else {
		store.ensure_collection().await?;
	}

	let indexer = Indexer::new(
		&config,
		Arc::new(HttpEmbedding::new(config.providers.embedding.clone())),
		store.clone(),
		mta_service::build_estimator(&config),
	);
	let report = indexer.index_documents(&normalized.documents).await?;
	let stats = store.stats().await?;

	tracing::info!(
		documents = report.documents,
		chunks = report.chunks,
		rejected = report.rejected + normalized.rejected.len(),
		indexed_chunks = stats.chunks,
		"Index updated."
	);

	Ok(())
}

pub fn parse_articles(raw: &str) -> color_eyre::Result<Vec<RawArticle>> {
	let parsed: ArticlesFile =
		serde_json::from_str(raw).map_err(|err| eyre::eyre!("Articles file is not valid: {err}."))?;

	Ok(match parsed {
		ArticlesFile::List(articles) => articles,
		ArticlesFile::Envelope { articles } => articles,
	})
}
