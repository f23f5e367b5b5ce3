use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER: &str = "text_with_stopwords";
pub const KIND_FRAGMENT: &str = "fragment";
pub const KIND_DOCUMENT: &str = "document";

/// Field handles of the single tantivy index holding fragments and documents.
/// `kind` separates the two record types; `payload` is the JSON form of the
/// record, returned as-is on retrieval.
#[derive(Debug, Clone, Copy)]
pub struct Fields {
	pub kind: Field,
	pub id: Field,
	pub parent_id: Field,
	pub text: Field,
	pub title: Field,
	pub keywords: Field,
	pub authors: Field,
	pub payload: Field,
}

impl Fields {
	pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			kind: schema.get_field("kind")?,
			id: schema.get_field("id")?,
			parent_id: schema.get_field("parent_id")?,
			text: schema.get_field("text")?,
			title: schema.get_field("title")?,
			keywords: schema.get_field("keywords")?,
			authors: schema.get_field("authors")?,
			payload: schema.get_field("payload")?,
		})
	}

	/// Searchable field for a logical lexical field name.
	pub fn searchable(&self, logical: &str) -> Option<Field> {
		match logical {
			"text" => Some(self.text),
			"title" => Some(self.title),
			"keywords" => Some(self.keywords),
			"authors" => Some(self.authors),
			_ => None,
		}
	}
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("kind", STRING);
	schema_builder.add_text_field("id", STRING | STORED);
	schema_builder.add_text_field("parent_id", STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	for name in ["text", "title", "keywords", "authors"] {
		schema_builder.add_text_field(name, text_options.clone());
	}
	schema_builder.add_text_field("payload", STORED);
	schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
	let stop_words = vec![
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}
