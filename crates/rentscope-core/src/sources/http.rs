use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use url::{Url, form_urlencoded};

use crate::codec::{self, QueryParams};
use crate::config::EngineConfig;
use crate::fetch::normalize::{bool_field, number_field, string_field, u64_field, unwrap_data};
use crate::models::{
    CoreError, CoreErrorKind, HistoryEntryId, NewSavedSearch, NewSearchHistoryEntry, Operation,
    SavedSearch, SavedSearchId, SearchHistoryEntry,
};
use crate::persistence::{PersistenceResult, SavedSearchStore, SearchHistoryStore};
use crate::sources::{ListingSource, SourceResult};

const ERROR_BODY_PREVIEW: usize = 200;

/// Blocking REST client for the listing service.
pub struct HttpListingSource {
    agent: ureq::Agent,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpListingSource {
    pub fn new(config: &EngineConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout())
            .build();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config
                .auth_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Joins `segments` onto the base URL, percent-encoding each one.
    fn resource_url(&self, operation: Operation, segments: &[&str]) -> SourceResult<String> {
        let mut url = Url::parse(&self.base_url).map_err(|error| {
            CoreError::invalid_input(operation, format!("invalid base url: {error}"))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                CoreError::invalid_input(operation, "base url cannot carry a path")
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    fn get(&self, operation: Operation, url: &str) -> SourceResult<String> {
        self.send(operation, self.agent.get(url), None)
    }

    fn send(
        &self,
        operation: Operation,
        request: ureq::Request,
        body: Option<&Value>,
    ) -> SourceResult<String> {
        let request = match &self.auth_token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        };
        let request = request.set("Accept", "application/json");

        let result = match body {
            Some(body) => request
                .set("Content-Type", "application/json")
                .send_string(&body.to_string()),
            None => request.call(),
        };

        match result {
            Ok(response) => response.into_string().map_err(|error| {
                CoreError::new(
                    CoreErrorKind::Transport,
                    format!("failed to read response body: {error}"),
                )
                .during(operation)
            }),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
                Err(CoreError::new(
                    CoreErrorKind::HttpStatus,
                    format!("request failed with status {status}: {preview}"),
                )
                .during(operation)
                .with_status(status))
            }
            Err(ureq::Error::Transport(transport)) => Err(CoreError::new(
                CoreErrorKind::Transport,
                format!("request failed: {transport}"),
            )
            .during(operation)),
        }
    }
}

impl ListingSource for HttpListingSource {
    fn search_listings(&self, query_string: &str) -> SourceResult<String> {
        let url = if query_string.is_empty() {
            self.url("/listings")
        } else {
            format!("{}?{query_string}", self.url("/listings"))
        };
        self.get(Operation::SearchListings, &url)
    }

    fn search_suggestions(&self, text: &str) -> SourceResult<String> {
        let encoded: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("q", text)
            .finish();
        let url = format!("{}?{encoded}", self.url("/search/suggestions"));
        self.get(Operation::Suggestions, &url)
    }

    fn favorites(&self) -> SourceResult<String> {
        self.get(Operation::Favorites, &self.url("/favorites"))
    }
}

impl SavedSearchStore for HttpListingSource {
    fn create_saved_search(&self, search: &NewSavedSearch) -> PersistenceResult<SavedSearch> {
        let body = json!({
            "name": search.name,
            "query": snapshot_to_json(&search.snapshot),
            "emailAlerts": search.email_alerts,
        });
        let raw = self.send(
            Operation::SaveSearch,
            self.agent.post(&self.url("/saved-searches")),
            Some(&body),
        )?;
        let json = parse_body(&raw, Operation::SaveSearch)?;
        saved_search_from_json(single_record(&json, "savedSearch")).ok_or_else(|| {
            malformed(Operation::SaveSearch, "saved search response is missing an id")
        })
    }

    fn saved_search(&self, id: &SavedSearchId) -> PersistenceResult<Option<SavedSearch>> {
        let url = self.resource_url(
            Operation::ApplySavedSearch,
            &["saved-searches", id.0.as_str()],
        )?;
        let raw = match self.get(Operation::ApplySavedSearch, &url) {
            Ok(raw) => raw,
            Err(error) if error.status == Some(404) => return Ok(None),
            Err(error) => return Err(error),
        };
        let json = parse_body(&raw, Operation::ApplySavedSearch)?;
        Ok(saved_search_from_json(single_record(&json, "savedSearch")))
    }

    fn list_saved_searches(&self) -> PersistenceResult<Vec<SavedSearch>> {
        let raw = self.get(Operation::ListSavedSearches, &self.url("/saved-searches"))?;
        let json = parse_body(&raw, Operation::ListSavedSearches)?;
        Ok(record_list(&json, "savedSearches")
            .iter()
            .filter_map(saved_search_from_json)
            .collect())
    }

    fn set_email_alerts(&self, id: &SavedSearchId, enabled: bool) -> PersistenceResult<()> {
        let url = self.resource_url(
            Operation::ToggleEmailAlerts,
            &["saved-searches", id.0.as_str(), "alerts"],
        )?;
        self.send(
            Operation::ToggleEmailAlerts,
            self.agent.put(&url),
            Some(&json!({ "emailAlerts": enabled })),
        )
        .map_err(|error| not_found_on_404(error, Operation::ToggleEmailAlerts, &id.0))?;
        Ok(())
    }

    fn delete_saved_search(&self, id: &SavedSearchId) -> PersistenceResult<()> {
        let url = self.resource_url(
            Operation::DeleteSavedSearch,
            &["saved-searches", id.0.as_str()],
        )?;
        self.send(Operation::DeleteSavedSearch, self.agent.delete(&url), None)
            .map_err(|error| not_found_on_404(error, Operation::DeleteSavedSearch, &id.0))?;
        Ok(())
    }
}

impl SearchHistoryStore for HttpListingSource {
    fn append_history(
        &self,
        entry: &NewSearchHistoryEntry,
    ) -> PersistenceResult<SearchHistoryEntry> {
        let body = json!({
            "searchText": entry.text,
            "filters": snapshot_to_json(&entry.filters),
            "resultsCount": entry.results_count,
        });
        let raw = self.send(
            Operation::RecordHistory,
            self.agent.post(&self.url("/search-history")),
            Some(&body),
        )?;
        let json = parse_body(&raw, Operation::RecordHistory)?;
        history_entry_from_json(single_record(&json, "entry")).ok_or_else(|| {
            malformed(Operation::RecordHistory, "history response is missing an id")
        })
    }

    fn list_history(&self, limit: usize) -> PersistenceResult<Vec<SearchHistoryEntry>> {
        let url = format!("{}?limit={limit}", self.url("/search-history"));
        let raw = self.get(Operation::ListHistory, &url)?;
        let json = parse_body(&raw, Operation::ListHistory)?;
        Ok(record_list(&json, "history")
            .iter()
            .filter_map(history_entry_from_json)
            .take(limit)
            .collect())
    }

    /// The service applies its own retention.
    fn prune_history(&self, _keep: usize) -> PersistenceResult<usize> {
        Ok(0)
    }

    fn delete_history_entry(&self, id: &HistoryEntryId) -> PersistenceResult<()> {
        let url = self.resource_url(
            Operation::DeleteHistoryEntry,
            &["search-history", id.0.as_str()],
        )?;
        self.send(Operation::DeleteHistoryEntry, self.agent.delete(&url), None)
            .map_err(|error| not_found_on_404(error, Operation::DeleteHistoryEntry, &id.0))?;
        Ok(())
    }

    fn clear_history(&self) -> PersistenceResult<()> {
        self.send(
            Operation::ClearHistory,
            self.agent.delete(&self.url("/search-history")),
            None,
        )?;
        Ok(())
    }
}

/// The service stores query parameters as a JSON object.
fn snapshot_to_json(snapshot: &str) -> Value {
    let params = QueryParams::parse(snapshot);
    let object: Map<String, Value> = params
        .iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect();
    Value::Object(object)
}

/// Accepts the object form written by [`snapshot_to_json`] or a raw query
/// string, and re-canonicalizes either.
fn snapshot_from_json(value: Option<&Value>) -> String {
    let params = match value {
        Some(Value::String(raw)) => QueryParams::parse(raw),
        Some(Value::Object(object)) => object
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::String(text) => text.clone(),
                    Value::Number(number) => number.to_string(),
                    Value::Bool(flag) => flag.to_string(),
                    Value::Array(items) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(","),
                    _ => return None,
                };
                Some((key.clone(), text))
            })
            .collect(),
        _ => QueryParams::new(),
    };
    codec::encode_string(&codec::decode(&params))
}

fn saved_search_from_json(record: &Value) -> Option<SavedSearch> {
    Some(SavedSearch {
        id: SavedSearchId(string_field(record, &["id", "_id"])?),
        name: string_field(record, &["name"]).unwrap_or_default(),
        snapshot: snapshot_from_json(record.get("query").or_else(|| record.get("filters"))),
        email_alerts: bool_field(record, &["emailAlerts", "email_alerts"]).unwrap_or(false),
        created_at: timestamp_field(record),
    })
}

fn history_entry_from_json(record: &Value) -> Option<SearchHistoryEntry> {
    Some(SearchHistoryEntry {
        id: HistoryEntryId(string_field(record, &["id", "_id"])?),
        text: string_field(record, &["searchText", "query", "text"]),
        filters: snapshot_from_json(record.get("filters")),
        results_count: u64_field(record, &["resultsCount", "results_count"]).unwrap_or(0),
        created_at: timestamp_field(record),
    })
}

fn timestamp_field(record: &Value) -> SystemTime {
    if let Some(raw) = record.get("createdAt").and_then(Value::as_str)
        && let Ok(parsed) = DateTime::parse_from_rfc3339(raw)
    {
        return SystemTime::from(parsed.with_timezone(&Utc));
    }
    number_field(record, &["createdAt", "created_at"])
        .filter(|millis| *millis >= 0.0)
        .map(|millis| UNIX_EPOCH + Duration::from_millis(millis as u64))
        .unwrap_or(UNIX_EPOCH)
}

fn single_record<'a>(json: &'a Value, key: &str) -> &'a Value {
    let envelope = unwrap_data(json);
    envelope
        .get(key)
        .filter(|inner| inner.is_object())
        .unwrap_or(envelope)
}

fn record_list<'a>(json: &'a Value, key: &str) -> &'a [Value] {
    let envelope = unwrap_data(json);
    envelope
        .as_array()
        .or_else(|| envelope.get(key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn parse_body(raw: &str, operation: Operation) -> PersistenceResult<Value> {
    serde_json::from_str(raw.trim())
        .map_err(|error| malformed(operation, &format!("invalid JSON response: {error}")))
}

fn malformed(operation: Operation, message: &str) -> CoreError {
    CoreError::new(CoreErrorKind::ParseFailure, message).during(operation)
}

fn not_found_on_404(error: CoreError, operation: Operation, id: &str) -> CoreError {
    if error.status == Some(404) {
        return CoreError::not_found(operation, format!("'{id}' does not exist"));
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_objects_are_canonicalized() {
        let value = json!({
            "page": 2,
            "city": "Boston",
            "amenities": ["WiFi", "Parking"],
            "minPrice": "900"
        });
        assert_eq!(
            snapshot_from_json(Some(&value)),
            "city=Boston&minPrice=900&amenities=Parking%2CWiFi&page=2"
        );
    }

    #[test]
    fn saved_search_records_accept_mongo_ids_and_iso_dates() {
        let record = json!({
            "_id": "abc123",
            "name": "Boston lofts",
            "query": "city=Boston",
            "emailAlerts": true,
            "createdAt": "2025-01-02T03:04:05.000Z"
        });
        let saved = saved_search_from_json(&record).unwrap();
        assert_eq!(saved.id, SavedSearchId("abc123".to_string()));
        assert!(saved.email_alerts);
        assert_eq!(saved.snapshot, "city=Boston&page=1");
        let secs = saved.created_at.duration_since(UNIX_EPOCH).unwrap().as_secs();
        assert_eq!(secs, 1_735_787_045);
    }

    #[test]
    fn record_list_reads_named_collections() {
        let json = json!({"data": {"history": [{"id": 1, "filters": {}}]}});
        assert_eq!(record_list(&json, "history").len(), 1);
        assert!(record_list(&json, "savedSearches").is_empty());
    }

    #[test]
    fn ids_are_escaped_in_paths() {
        let source = HttpListingSource::new(&EngineConfig {
            base_url: "https://rent.example/api".to_string(),
            ..EngineConfig::default()
        });
        let url = source
            .resource_url(Operation::DeleteSavedSearch, &["saved-searches", "a/b c"])
            .unwrap();
        assert_eq!(url, "https://rent.example/api/saved-searches/a%2Fb%20c");
    }

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let config = EngineConfig {
            base_url: "https://rent.example/api/".to_string(),
            ..EngineConfig::default()
        };
        assert_eq!(HttpListingSource::new(&config).base_url(), "https://rent.example/api");
    }
}
