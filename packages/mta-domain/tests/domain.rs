use time::macros::datetime;

use mta_domain::{
	Citation, IndexedChunk, RetrievedPassage,
	article::{self, RawArticle, RejectCode},
};

const LONG_CONTENT: &str = "The Federal Reserve held interest rates steady on Wednesday while \
	signalling that two cuts remain likely before the end of the year, citing cooling inflation.";

fn raw_article(json: serde_json::Value) -> RawArticle {
	serde_json::from_value(json).expect("Failed to decode raw article.")
}

#[test]
fn normalizes_news_api_shape() {
	let raw = raw_article(serde_json::json!({
		"title": "Fed holds rates",
		"description": "<b>Markets</b> react",
		"content": format!("{LONG_CONTENT} [+2048 chars]"),
		"url": "https://news.example.com/fed",
		"source": { "id": null, "name": "Reuters" },
		"publishedAt": "2024-05-01T14:30:00Z"
	}));
	let document = article::normalize_article(&raw, 100).expect("Article must be accepted.");

	assert_eq!(document.title, "Fed holds rates");
	assert_eq!(document.source, "Reuters");
	assert_eq!(document.published_at, datetime!(2024-05-01 14:30:00 UTC));
	assert_eq!(document.url.as_deref(), Some("https://news.example.com/fed"));
	assert!(document.body.starts_with("Fed holds rates Markets react The Federal Reserve"));
	assert!(!document.body.contains("chars]"));
	assert!(document.is_indexable());
}

#[test]
fn accepts_flat_source_name() {
	let raw = raw_article(serde_json::json!({
		"title": "Oil climbs",
		"content": LONG_CONTENT,
		"url": "https://news.example.com/oil",
		"source": "Bloomberg",
		"published_at": "2024-05-02T09:00:00+00:00"
	}));
	let document = article::normalize_article(&raw, 100).expect("Article must be accepted.");

	assert_eq!(document.source, "Bloomberg");
}

#[test]
fn missing_source_becomes_unknown() {
	let raw = raw_article(serde_json::json!({
		"content": LONG_CONTENT,
		"publishedAt": "2024-05-02T09:00:00Z"
	}));
	let document = article::normalize_article(&raw, 10).expect("Article must be accepted.");

	assert_eq!(document.source, "Unknown");
	assert!(document.url.is_none());
}

#[test]
fn rejects_empty_short_and_undated_articles() {
	let empty = raw_article(serde_json::json!({ "title": "  ", "content": "<p></p>" }));
	let short = raw_article(serde_json::json!({
		"title": "Brief",
		"publishedAt": "2024-05-02T09:00:00Z"
	}));
	let undated = raw_article(serde_json::json!({ "content": LONG_CONTENT }));

	assert_eq!(article::normalize_article(&empty, 1), Err(RejectCode::RejectEmpty));
	assert_eq!(article::normalize_article(&short, 100), Err(RejectCode::RejectTooShort));
	assert_eq!(article::normalize_article(&undated, 10), Err(RejectCode::RejectMissingTimestamp));
}

#[test]
fn batch_normalization_drops_duplicate_urls() {
	let article = serde_json::json!({
		"title": "Tech earnings",
		"content": LONG_CONTENT,
		"url": "https://news.example.com/tech",
		"publishedAt": "2024-05-03T10:00:00Z"
	});
	let raw = vec![
		raw_article(article.clone()),
		raw_article(article),
		raw_article(serde_json::json!({ "title": "x" })),
	];
	let report = article::normalize_articles(&raw, 50);

	assert_eq!(report.documents.len(), 1);
	assert_eq!(report.duplicates, 1);
	assert_eq!(report.rejected, vec![(2, RejectCode::RejectTooShort)]);
}

#[test]
fn citation_copies_passage_metadata() {
	let published_at = datetime!(2024-05-01 00:00:00 UTC);
	let passage = RetrievedPassage {
		chunk: IndexedChunk {
			chunk_id: "c-1".to_string(),
			document_id: "doc-1".to_string(),
			chunk_index: 0,
			vector: Vec::new(),
			text: "Body".to_string(),
			metadata: mta_domain::ChunkMetadata {
				title: "Title".to_string(),
				source: "Reuters".to_string(),
				published_at,
				url: None,
			},
		},
		vector_score: 0.9,
		keyword_score: 3.0,
		fused_score: 0.75,
		rank: 1,
	};
	let citation = Citation::from(&passage);

	assert_eq!(citation.document_id, "doc-1");
	assert_eq!(citation.source, "Reuters");
	assert_eq!(citation.relevance_score, 0.75);

	let json = serde_json::to_value(&citation).expect("Failed to encode citation.");

	assert_eq!(json["published_at"], "2024-05-01T00:00:00Z");
}
