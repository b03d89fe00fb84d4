//! Question classification and dispatch
//!
//! The router is the single entry point for a question. Classification runs
//! an ordered list of matchers, most specific first; the first match wins and
//! selects a deterministic handler. Questions nothing matches go to the
//! generative fallback when the caller allows it.
//!
//! `process` is also the error boundary for the whole pipeline: every typed
//! failure from the store or the synthesizer becomes a failure envelope here,
//! and nothing below this layer surfaces to the caller directly.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error, info};

use crate::envelope::{GraphQuery, Record, ResultEnvelope};
use crate::error::{QueryError, Result};
use crate::store::{EntityKind, GraphStore};
use crate::synthesizer::Synthesizer;

/// The classified purpose of a question
#[derive(Debug, Clone, PartialEq)]
pub enum QueryIntent {
    /// Entities within a radius of a place
    SpatialProximity {
        city: String,
        radius_meters: Option<f64>,
        kind: EntityKind,
    },
    /// Relevance-ranked name search
    FullTextSearch { phrase: String },
    /// Form 10-K business description for one company
    CompanyDescription { company: String },
    /// Aggregation over entity locations
    Analytical { kind: EntityKind },
    /// Entities whose address is in a named city
    LocationLookup { city: String, kind: EntityKind },
    /// No direct pattern matched
    Generic,
}

/// Tunable defaults for the direct handlers
#[derive(Debug, Clone)]
pub struct RouterDefaults {
    /// Result cap for the location-lookup template
    pub max_results: i64,
    /// Result cap for full-text searches
    pub fulltext_limit: i64,
    /// Radius used when a spatial question names no distance
    pub spatial_radius_meters: f64,
    /// Result cap for analytical aggregations
    pub analytical_limit: i64,
    /// Full-text index backing phrase searches
    pub fulltext_index: String,
}

impl Default for RouterDefaults {
    fn default() -> Self {
        Self {
            max_results: 50,
            fulltext_limit: 10,
            spatial_radius_meters: 10_000.0,
            analytical_limit: 10,
            fulltext_index: "fullTextCompanyNames".to_string(),
        }
    }
}

/// Classify a question against the ordered matcher list.
///
/// Order matters: spatial before location lookup, so "firms near Santa
/// Clara" never degrades to an exact-city match even though both matchers'
/// keywords appear. Fallthrough is `Generic`.
pub fn classify(question: &str) -> QueryIntent {
    match_spatial(question)
        .or_else(|| match_full_text(question))
        .or_else(|| match_description(question))
        .or_else(|| match_analytical(question))
        .or_else(|| match_location(question))
        .unwrap_or(QueryIntent::Generic)
}

/// "investment firms near Santa Clara", "companies within 5 km of San Jose"
fn match_spatial(question: &str) -> Option<QueryIntent> {
    let lowered = question.to_lowercase();
    if !has_word(&lowered, "near") && !lowered.contains("within") {
        return None;
    }
    let kind = detect_entity_kind(&lowered)?;
    let city = extract_city(question)?;
    let radius_meters = extract_radius_meters(&lowered);
    Some(QueryIntent::SpatialProximity {
        city,
        radius_meters,
        kind,
    })
}

/// "search for Palo Alto Networks"
fn match_full_text(question: &str) -> Option<QueryIntent> {
    let lowered = question.to_lowercase();
    let start = lowered.find("search for")?;
    // Offsets into the lowered copy are only safe on the original for
    // ASCII; bail out rather than split a multi-byte character
    let phrase = question
        .get(start + "search for".len()..)?
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .trim_matches(['"', '\''])
        .trim();
    if phrase.is_empty() {
        return None;
    }
    Some(QueryIntent::FullTextSearch {
        phrase: phrase.to_string(),
    })
}

/// "What does Palo Alto Networks do?"
fn match_description(question: &str) -> Option<QueryIntent> {
    let company = extract_company(question)?;
    Some(QueryIntent::CompanyDescription { company })
}

/// "Which state has the most investment firms?"
fn match_analytical(question: &str) -> Option<QueryIntent> {
    let lowered = question.to_lowercase();
    if !lowered.contains("state") || !lowered.contains("most") {
        return None;
    }
    let kind = detect_entity_kind(&lowered)?;
    Some(QueryIntent::Analytical { kind })
}

/// "What investment firms are in San Francisco?"
fn match_location(question: &str) -> Option<QueryIntent> {
    let lowered = question.to_lowercase();
    if !has_word(&lowered, "in") && !has_word(&lowered, "at") {
        return None;
    }
    let kind = detect_entity_kind(&lowered)?;
    let city = extract_city(question)?;
    Some(QueryIntent::LocationLookup { city, kind })
}

/// Map entity vocabulary in the question to a graph label
fn detect_entity_kind(lowered: &str) -> Option<EntityKind> {
    if lowered.contains("investment firm")
        || lowered.contains("manager")
        || has_word(lowered, "firms")
        || has_word(lowered, "firm")
    {
        Some(EntityKind::Manager)
    } else if lowered.contains("compan") {
        Some(EntityKind::Company)
    } else {
        None
    }
}

fn has_word(lowered: &str, word: &str) -> bool {
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

/// Take the token sequence following the first location preposition.
///
/// Best-effort: a miss returns `None` and the question falls through toward
/// the generative path. Trailing punctuation is stripped so "Francisco?"
/// still resolves.
fn extract_city(question: &str) -> Option<String> {
    const PREPOSITIONS: [&str; 4] = ["in", "near", "at", "of"];

    let tokens: Vec<&str> = question.split_whitespace().collect();
    let position = tokens
        .iter()
        .position(|token| PREPOSITIONS.contains(&token.to_lowercase().as_str()))?;

    let city = tokens[position + 1..]
        .join(" ")
        .trim_end_matches(['.', ',', '!', '?'])
        .trim()
        .to_string();
    if city.is_empty() {
        None
    } else {
        Some(city)
    }
}

static RADIUS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(km|kilometers?|mi|miles?|m|meters?)\b").unwrap()
});

/// Pull a "number + unit" distance out of the question, converted to meters
fn extract_radius_meters(lowered: &str) -> Option<f64> {
    let captures = RADIUS_PATTERN.captures(lowered)?;
    let value: f64 = captures[1].parse().ok()?;
    let meters = match captures[2].chars().next()? {
        'k' => value * 1_000.0,
        // "mi"/"miles" vs bare "m"/"meters"
        'm' if captures[2].starts_with("mi") => value * 1_609.34,
        _ => value,
    };
    Some(meters)
}

/// Text between "what does" and the trailing "do"
fn extract_company(question: &str) -> Option<String> {
    let lowered = question.to_lowercase();
    let start = lowered.find("what does")? + "what does".len();
    let tail = lowered.get(start..)?;
    let end = tail.rfind("do")?;
    let company = question.get(start..start + end)?.trim().to_string();
    if company.is_empty() {
        None
    } else {
        Some(company)
    }
}

/// Routes questions onto the graph store, with the synthesizer as fallback
pub struct QueryRouter {
    store: Arc<dyn GraphStore>,
    synthesizer: Arc<dyn Synthesizer>,
    defaults: RouterDefaults,
}

impl QueryRouter {
    pub fn new(
        store: Arc<dyn GraphStore>,
        synthesizer: Arc<dyn Synthesizer>,
        defaults: RouterDefaults,
    ) -> Self {
        Self {
            store,
            synthesizer,
            defaults,
        }
    }

    /// Answer a question, always returning an envelope.
    ///
    /// Classification picks a direct handler where one applies; otherwise
    /// the question goes through query generation when `allow_generative`
    /// is set, or fails as unroutable when it is not.
    pub async fn process(&self, question: &str, allow_generative: bool) -> ResultEnvelope {
        info!(question, "Processing question");

        let intent = classify(question);
        debug!(?intent, "Classified question");

        match self.dispatch(question, intent, allow_generative).await {
            Ok(records) => {
                info!(count = records.len(), "Question answered");
                ResultEnvelope::ok(question, records)
            }
            Err(err) => {
                error!(error = %err, "Question failed");
                ResultEnvelope::fail(question, err.to_string())
            }
        }
    }

    async fn dispatch(
        &self,
        question: &str,
        intent: QueryIntent,
        allow_generative: bool,
    ) -> Result<Vec<Record>> {
        match intent {
            QueryIntent::SpatialProximity {
                city,
                radius_meters,
                kind,
            } => {
                let radius = radius_meters.unwrap_or(self.defaults.spatial_radius_meters);
                self.store.spatial_query(&city, radius, kind).await
            }
            QueryIntent::FullTextSearch { phrase } => {
                self.store
                    .full_text_search(
                        &self.defaults.fulltext_index,
                        &phrase,
                        self.defaults.fulltext_limit,
                    )
                    .await
            }
            QueryIntent::CompanyDescription { company } => {
                self.store.company_description(&company).await
            }
            QueryIntent::Analytical { kind } => {
                self.store
                    .execute(analytical_query(kind, self.defaults.analytical_limit))
                    .await
            }
            QueryIntent::LocationLookup { city, kind } => {
                self.store
                    .execute(location_lookup_query(&city, kind, self.defaults.max_results))
                    .await
            }
            QueryIntent::Generic => {
                if !allow_generative {
                    return Err(QueryError::Unroutable);
                }
                let generated = self.synthesizer.synthesize(question).await?;
                debug!(query = %generated.text, "Executing generated query");
                self.store.execute(generated).await
            }
        }
    }
}

/// Entities of one kind located in an exactly-named city
fn location_lookup_query(city: &str, kind: EntityKind, limit: i64) -> GraphQuery {
    let text = format!(
        r#"
        MATCH (entity:{label})-[:LOCATED_AT]->(address:Address)
        WHERE address.city = $city
        RETURN entity.{name} AS {name}
        LIMIT $limit
        "#,
        label = kind.label(),
        name = kind.name_property(),
    );
    GraphQuery::new(text).param("city", city).param("limit", limit)
}

/// Entity counts per state, highest first.
///
/// Rows with no state are excluded, counting is distinct per entity, and
/// equal counts tie-break alphabetically so repeated runs return identical
/// orderings.
fn analytical_query(kind: EntityKind, limit: i64) -> GraphQuery {
    let text = format!(
        r#"
        MATCH (entity:{label})-[:LOCATED_AT]->(address:Address)
        WHERE address.state IS NOT NULL
        RETURN address.state AS state, count(DISTINCT entity) AS entityCount
        ORDER BY entityCount DESC, state ASC
        LIMIT $limit
        "#,
        label = kind.label(),
    );
    GraphQuery::new(text).param("limit", limit)
}
