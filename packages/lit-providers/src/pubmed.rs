use std::time::Duration;

use quick_xml::{
	Reader,
	events::{BytesStart, Event},
};
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::{
	BoxFuture, Error, Result,
	connector::{self, SourceConnector, YearRange},
	http::{HttpFetcher, RetryPolicy, StatsSnapshot},
};
use lit_domain::{AbstractSection, PubMedArticle, PubMedReference, RawRecord, SourceTag};

const TOOL: &str = "lit";

/// NCBI E-utilities: `esearch` for PMIDs, then `efetch` for article XML.
pub struct PubMedConnector {
	fetcher: HttpFetcher,
	api_base: String,
	api_key: Option<String>,
	email: Option<String>,
	years: YearRange,
	max_results: u32,
}
impl PubMedConnector {
	pub fn new(cfg: &lit_config::SourceConfig, retry: RetryPolicy) -> Result<Self> {
		Ok(Self {
			fetcher: HttpFetcher::new(SourceTag::PubMed, cfg, retry, HeaderMap::new())?,
			api_base: cfg.api_base.trim_end_matches('/').to_string(),
			api_key: cfg.api_key.clone(),
			email: cfg.contact_email.clone(),
			years: YearRange::from_config(cfg),
			max_results: cfg.max_results,
		})
	}

	async fn search(&self, term: &str, limit: u32) -> Result<Vec<RawRecord>> {
		let term = connector::validate_term(term)?;
		let pmids = self.search_ids(term, limit.min(self.max_results)).await?;

		if pmids.is_empty() {
			return Ok(Vec::new());
		}

		self.fetch_articles(&pmids).await
	}

	async fn search_ids(&self, term: &str, limit: u32) -> Result<Vec<String>> {
		let url = format!("{}/esearch.fcgi", self.api_base);
		let mut params = self.common_params();

		params.push(("term", term.to_string()));
		params.push(("retmax", limit.to_string()));
		params.push(("retmode", "json".to_string()));
		params.push(("sort", "relevance".to_string()));

		if !self.years.is_empty() {
			params.push(("datetype", "pdat".to_string()));
			params.push(("mindate", self.years.from.unwrap_or(1800).to_string()));
			params.push(("maxdate", self.years.to.unwrap_or(3000).to_string()));
		}

		let json = self.fetcher.get_json(|client| client.get(&url).query(&params)).await?;

		parse_search_ids(&json)
	}

	async fn fetch_articles(&self, pmids: &[String]) -> Result<Vec<RawRecord>> {
		let url = format!("{}/efetch.fcgi", self.api_base);
		let mut params = self.common_params();

		params.push(("id", pmids.join(",")));
		params.push(("retmode", "xml".to_string()));

		let xml = self.fetcher.get_text(|client| client.get(&url).query(&params)).await?;

		Ok(parse_articles(&xml)?.into_iter().map(RawRecord::PubMed).collect())
	}

	async fn fetch_one(&self, id: &str) -> Result<Option<RawRecord>> {
		let pmid = match connector::split_id(id) {
			(Some("pmid") | None, pmid) if !pmid.is_empty() => pmid.to_string(),
			_ => return Ok(None),
		};

		Ok(self.fetch_articles(&[pmid]).await?.into_iter().next())
	}

	fn common_params(&self) -> Vec<(&'static str, String)> {
		let mut params = vec![("db", "pubmed".to_string()), ("tool", TOOL.to_string())];

		if let Some(key) = &self.api_key {
			params.push(("api_key", key.clone()));
		}
		if let Some(email) = &self.email {
			params.push(("email", email.clone()));
		}

		params
	}
}

impl SourceConnector for PubMedConnector {
	fn tag(&self) -> SourceTag {
		SourceTag::PubMed
	}

	fn query<'a>(&'a self, term: &'a str, limit: u32) -> BoxFuture<'a, Vec<RawRecord>> {
		Box::pin(async move {
			connector::settle(self.tag(), "query", self.search(term, limit).await)
		})
	}

	fn fetch_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Option<RawRecord>> {
		Box::pin(async move {
			connector::settle(self.tag(), "fetch_by_id", self.fetch_one(id).await)
		})
	}

	fn stats(&self) -> StatsSnapshot {
		self.fetcher.stats()
	}

	fn min_interval(&self) -> Duration {
		self.fetcher.min_interval()
	}
}

fn parse_search_ids(json: &Value) -> Result<Vec<String>> {
	let ids = json
		.pointer("/esearchresult/idlist")
		.and_then(Value::as_array)
		.ok_or_else(|| Error::InvalidResponse {
			message: "PubMed search response is missing esearchresult.idlist.".to_string(),
		})?;

	Ok(ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
}

#[derive(Default)]
struct AuthorParts {
	last: String,
	fore: String,
	collective: String,
}
impl AuthorParts {
	fn display(&self) -> Option<String> {
		let name = match (self.fore.trim(), self.last.trim()) {
			("", "") => self.collective.trim().to_string(),
			("", last) => last.to_string(),
			(fore, "") => fore.to_string(),
			(fore, last) => format!("{fore} {last}"),
		};

		(!name.is_empty()).then_some(name)
	}
}

/// Parses an `efetch` `PubmedArticleSet` document.
pub fn parse_articles(xml: &str) -> Result<Vec<PubMedArticle>> {
	let mut reader = Reader::from_str(xml);
	let mut buf = Vec::new();
	let mut stack: Vec<String> = Vec::new();
	let mut articles = Vec::new();
	let mut article: Option<PubMedArticle> = None;
	let mut finished: Option<PubMedArticle> = None;
	let mut author = AuthorParts::default();
	let mut section = AbstractSection::default();
	let mut reference: Option<PubMedReference> = None;
	let mut article_id_type: Option<String> = None;
	let mut eloc_type: Option<String> = None;
	let mut medline_date = String::new();
	let mut text = String::new();

	loop {
		match reader.read_event_into(&mut buf)? {
			Event::Start(e) => {
				let name = local_name(&e);

				match name.as_str() {
					"PubmedArticle" => article = Some(PubMedArticle::default()),
					"Author" => author = AuthorParts::default(),
					"AbstractText" => {
						let label = attribute(&e, "Label")?;

						section = AbstractSection { label, text: String::new() };
					},
					"Reference" => reference = Some(PubMedReference::default()),
					"ArticleId" => article_id_type = attribute(&e, "IdType")?,
					"ELocationID" => eloc_type = attribute(&e, "EIdType")?,
					_ => {},
				}

				stack.push(name);
				text.clear();
			},
			Event::Text(t) => {
				let piece = t.unescape().map(|cow| cow.into_owned()).unwrap_or_else(|_| {
					String::from_utf8_lossy(&t).into_owned()
				});

				capture(&stack, &mut article, &mut author, &mut section, &piece);
				text.push_str(&piece);
			},
			Event::CData(t) => {
				let piece = String::from_utf8_lossy(&t).into_owned();

				capture(&stack, &mut article, &mut author, &mut section, &piece);
				text.push_str(&piece);
			},
			Event::End(_) => {
				let Some(name) = stack.pop() else { continue };
				let parent = stack.last().map(String::as_str).unwrap_or_default();
				let grandparent = stack.iter().rev().nth(1).map(String::as_str);
				let value = text.trim().to_string();

				if let Some(current) = article.as_mut() {
					match name.as_str() {
						"PMID" if parent == "MedlineCitation" => current.pmid = value,
						"Author" => current.authors.extend(author.display()),
						"AbstractText" =>
							current.abstract_sections.push(std::mem::take(&mut section)),
						"Year" if parent == "PubDate" => current.year = value.parse().ok(),
						"MedlineDate" if parent == "PubDate" => medline_date = value,
						"Title" if parent == "Journal" => current.journal = non_empty(value),
						"DescriptorName" => current.mesh_terms.extend(non_empty(value)),
						"PublicationType" => current.publication_types.extend(non_empty(value)),
						"ELocationID"
							if eloc_type.as_deref() == Some("doi") && current.doi.is_none() =>
							current.doi = non_empty(value),
						"ArticleId"
							if parent == "ArticleIdList" && grandparent == Some("PubmedData") =>
						{
							match article_id_type.as_deref() {
								Some("doi") => current.doi = non_empty(value),
								Some("pmc") => current.pmc = non_empty(value),
								_ => {},
							}
						},
						"ArticleId"
							if parent == "ArticleIdList" && grandparent == Some("Reference") =>
						{
							if let Some(cited) = reference.as_mut() {
								match article_id_type.as_deref() {
									Some("pubmed") => cited.pmid = non_empty(value),
									Some("doi") => cited.doi = non_empty(value),
									Some("pmc") => cited.pmc = non_empty(value),
									_ => {},
								}
							}
						},
						"Reference" => {
							if let Some(cited) = reference.take()
								&& cited != PubMedReference::default()
							{
								current.references.push(cited);
							}
						},
						"PubmedArticle" => finished = Some(std::mem::take(current)),
						_ => {},
					}
				}

				if let Some(mut done) = finished.take() {
					if done.year.is_none() {
						done.year = medline_date.get(..4).and_then(|year| year.parse().ok());
					}

					done.title = collapse(&done.title);

					medline_date.clear();

					if !done.pmid.is_empty() {
						articles.push(done);
					}

					article = None;
				}

				text.clear();
			},
			Event::Eof => break,
			_ => {},
		}

		buf.clear();
	}

	Ok(articles)
}

/// Appends mixed-content text to whichever multi-part field is open.
fn capture(
	stack: &[String],
	article: &mut Option<PubMedArticle>,
	author: &mut AuthorParts,
	section: &mut AbstractSection,
	piece: &str,
) {
	let Some(current) = article.as_mut() else { return };
	let within = |name: &str| stack.iter().any(|open| open == name);

	if within("ArticleTitle") {
		current.title.push_str(piece);
	} else if within("AbstractText") {
		section.text.push_str(piece);
	} else if within("Author") {
		match stack.last().map(String::as_str) {
			Some("LastName") => author.last.push_str(piece),
			Some("ForeName") => author.fore.push_str(piece),
			Some("CollectiveName") => author.collective.push_str(piece),
			_ => {},
		}
	}
}

fn local_name(e: &BytesStart<'_>) -> String {
	String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
	let Some(attr) = e.try_get_attribute(key).map_err(quick_xml::Error::from)? else {
		return Ok(None);
	};

	Ok(Some(attr.unescape_value()?.into_owned()))
}

fn non_empty(value: String) -> Option<String> {
	(!value.is_empty()).then_some(value)
}

fn collapse(raw: &str) -> String {
	raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
