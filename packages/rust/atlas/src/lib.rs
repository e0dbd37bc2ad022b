//! Client for the hosted embedding map that holds Debrief's headline feed.
//!
//! The map clusters headline embeddings into a topic hierarchy. Debrief
//! samples one headline per topic from the map's root tile so a briefing
//! covers every cluster once, then fetches the full records for those ids.

mod tile;

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use debrief_shared::{AtlasConfig, DebriefError, Headline, Result};

pub use tile::{TileRow, decode_tile, sample_topics};

/// User-Agent string for map requests.
const USER_AGENT: &str = concat!("Debrief/", env!("CARGO_PKG_VERSION"));

/// Root quadtree tile, which samples every cluster of the projection.
const ROOT_TILE: [&str; 3] = ["0", "0", "0.feather"];

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    id: String,
    #[serde(default)]
    atlas_indices: Vec<IndexResponse>,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    id: String,
    #[serde(default)]
    projections: Vec<ProjectionResponse>,
}

#[derive(Debug, Deserialize)]
struct ProjectionResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct DataRequest<'a> {
    project_id: &'a str,
    datum_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct DataResponse {
    datums: Vec<Headline>,
}

/// Identifiers needed to address a project's first projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub project_id: String,
    pub index_id: String,
    pub projection_id: String,
}

// ---------------------------------------------------------------------------
// AtlasClient
// ---------------------------------------------------------------------------

/// Authenticated client for the embedding-map REST API.
pub struct AtlasClient {
    client: Client,
    api_url: Url,
    topic_column: String,
    id_field: String,
    batch_size: usize,
}

impl AtlasClient {
    /// Create a client from config and the resolved API key.
    pub fn new(config: &AtlasConfig, api_key: &str) -> Result<Self> {
        let api_url = Url::parse(&config.api_url)
            .map_err(|e| DebriefError::config(format!("invalid atlas api_url: {e}")))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| DebriefError::config(format!("invalid atlas API key: {e}")))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DebriefError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url,
            topic_column: config.topic_column(),
            id_field: config.id_field.clone(),
            batch_size: config.fetch_batch_size.max(1),
        })
    }

    /// Look up a project by name and resolve its first projection.
    #[instrument(skip(self))]
    pub async fn find_project(&self, name: &str) -> Result<ProjectInfo> {
        let url = self.endpoint(&["v1", "project", "search", "name", name])?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DebriefError::Network(format!("{url}: {e}")))?;
        let response = check_status(response, &url)?;

        let project: ProjectResponse = response
            .json()
            .await
            .map_err(|e| DebriefError::parse(format!("{url}: invalid project payload: {e}")))?;

        let index = project
            .atlas_indices
            .into_iter()
            .next()
            .ok_or_else(|| DebriefError::Atlas(format!("project `{name}` has no map index")))?;
        let projection = index.projections.into_iter().next().ok_or_else(|| {
            DebriefError::Atlas(format!("project `{name}` has no projection"))
        })?;

        debug!(project_id = %project.id, projection_id = %projection.id, "resolved project");

        Ok(ProjectInfo {
            project_id: project.id,
            index_id: index.id,
            projection_id: projection.id,
        })
    }

    /// Download the root tile of the project's projection.
    #[instrument(skip_all, fields(project_id = %project.project_id))]
    pub async fn download_root_tile(&self, project: &ProjectInfo) -> Result<Vec<u8>> {
        let mut segments = vec![
            "v1",
            "project",
            project.project_id.as_str(),
            "index",
            "projection",
            project.projection_id.as_str(),
            "quadtree",
        ];
        segments.extend(ROOT_TILE);
        let url = self.endpoint(&segments)?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DebriefError::Network(format!("{url}: {e}")))?;
        let response = check_status(response, &url)?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DebriefError::Network(format!("{url}: body read failed: {e}")))?;

        debug!(bytes = bytes.len(), "downloaded root tile");
        Ok(bytes.to_vec())
    }

    /// Fetch full records for the given datum ids, in batches.
    #[instrument(skip_all, fields(ids = ids.len()))]
    pub async fn fetch_headlines(
        &self,
        project: &ProjectInfo,
        ids: &[String],
    ) -> Result<Vec<Headline>> {
        let url = self.endpoint(&["v1", "project", "data", "get"])?;
        let mut headlines = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(self.batch_size) {
            let request = DataRequest {
                project_id: &project.project_id,
                datum_ids: chunk,
            };

            let response = self
                .client
                .post(url.clone())
                .json(&request)
                .send()
                .await
                .map_err(|e| DebriefError::Network(format!("{url}: {e}")))?;
            let response = check_status(response, &url)?;

            let data: DataResponse = response
                .json()
                .await
                .map_err(|e| DebriefError::parse(format!("{url}: invalid data payload: {e}")))?;

            headlines.extend(data.datums);
        }

        Ok(headlines)
    }

    /// Sample one headline per topic cluster of the named project.
    ///
    /// find project → download root tile → decode → one id per topic → fetch records.
    #[instrument(skip(self))]
    pub async fn sample_headlines(&self, project_name: &str) -> Result<Vec<Headline>> {
        let project = self.find_project(project_name).await?;
        let tile = self.download_root_tile(&project).await?;
        let rows = decode_tile(&tile, &self.topic_column, &self.id_field)?;
        let ids = sample_topics(&rows);

        info!(
            points = rows.len(),
            topics = ids.len(),
            column = %self.topic_column,
            "sampled topics from map"
        );

        self.fetch_headlines(&project, &ids).await
    }

    /// Build an endpoint URL from path segments (each segment is percent-encoded).
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                DebriefError::config(format!("atlas api_url cannot be a base: {}", self.api_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Turn a non-success HTTP status into a network error.
fn check_status(response: reqwest::Response, url: &Url) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(DebriefError::Network(format!("{url}: HTTP {status}")));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> AtlasConfig {
        AtlasConfig {
            api_url: server.uri(),
            fetch_batch_size: 2,
            ..AtlasConfig::default()
        }
    }

    fn project_json() -> serde_json::Value {
        serde_json::json!({
            "id": "proj-1",
            "project_name": "Debrief",
            "atlas_indices": [
                { "id": "idx-1", "projections": [ { "id": "proj-map-1" } ] }
            ]
        })
    }

    #[test]
    fn endpoint_encodes_segments() {
        let config = AtlasConfig {
            api_url: "https://atlas.example.com/".into(),
            ..AtlasConfig::default()
        };
        let client = AtlasClient::new(&config, "key").unwrap();
        let url = client
            .endpoint(&["v1", "project", "search", "name", "Morning News"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://atlas.example.com/v1/project/search/name/Morning%20News"
        );
    }

    #[tokio::test]
    async fn find_project_resolves_projection() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/project/search/name/Debrief"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json()))
            .mount(&server)
            .await;

        let client = AtlasClient::new(&test_config(&server), "secret").unwrap();
        let project = client.find_project("Debrief").await.unwrap();

        assert_eq!(project.project_id, "proj-1");
        assert_eq!(project.index_id, "idx-1");
        assert_eq!(project.projection_id, "proj-map-1");
    }

    #[tokio::test]
    async fn find_project_without_projection_is_atlas_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/project/search/name/Debrief"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "proj-1",
                "atlas_indices": [ { "id": "idx-1", "projections": [] } ]
            })))
            .mount(&server)
            .await;

        let client = AtlasClient::new(&test_config(&server), "secret").unwrap();
        let err = client.find_project("Debrief").await.unwrap_err();
        assert!(matches!(err, DebriefError::Atlas(_)));
    }

    #[tokio::test]
    async fn find_project_http_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = AtlasClient::new(&test_config(&server), "bad").unwrap();
        let err = client.find_project("Debrief").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn fetch_headlines_batches_requests() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/project/data/get"))
            .and(body_partial_json(serde_json::json!({ "datum_ids": ["1", "2"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "datums": [
                    { "id_field": 1, "embed_text": "one", "feed_title": "A" },
                    { "id_field": 2, "embed_text": "two", "feed_title": "B" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/project/data/get"))
            .and(body_partial_json(serde_json::json!({ "datum_ids": ["3"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "datums": [ { "id_field": 3, "embed_text": "three", "feed_title": "C" } ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AtlasClient::new(&test_config(&server), "secret").unwrap();
        let project = ProjectInfo {
            project_id: "proj-1".into(),
            index_id: "idx-1".into(),
            projection_id: "proj-map-1".into(),
        };
        let ids = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        let headlines = client.fetch_headlines(&project, &ids).await.unwrap();

        let texts: Vec<&str> = headlines.iter().map(|h| h.embed_text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn fetch_headlines_empty_ids_makes_no_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = AtlasClient::new(&test_config(&server), "secret").unwrap();
        let project = ProjectInfo {
            project_id: "proj-1".into(),
            index_id: "idx-1".into(),
            projection_id: "proj-map-1".into(),
        };
        let headlines = client.fetch_headlines(&project, &[]).await.unwrap();
        assert!(headlines.is_empty());
    }

    #[tokio::test]
    async fn sample_headlines_end_to_end() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/project/search/name/Debrief"))
            .respond_with(ResponseTemplate::new(200).set_body_json(project_json()))
            .mount(&server)
            .await;

        let tile = tile::tests::build_tile(
            vec![Some("Tech"), Some("Tech"), Some("Markets"), None],
            vec![101, 102, 103, 104],
        );
        Mock::given(method("GET"))
            .and(path(
                "/v1/project/proj-1/index/projection/proj-map-1/quadtree/0/0/0.feather",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(tile))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/project/data/get"))
            .and(body_partial_json(serde_json::json!({
                "project_id": "proj-1",
                "datum_ids": ["101", "103"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "datums": [
                    { "id_field": 101, "embed_text": "New chip fab announced", "feed_title": "Tech Daily", "link": "https://news.example.com/chips" },
                    { "id_field": 103, "embed_text": "Stocks rally", "feed_title": "Twitter Feed" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AtlasClient::new(&test_config(&server), "secret").unwrap();
        let headlines = client.sample_headlines("Debrief").await.unwrap();

        assert_eq!(headlines.len(), 2);
        assert_eq!(headlines[0].feed_title, "Tech Daily");
        assert_eq!(
            headlines[0].link.as_deref(),
            Some("https://news.example.com/chips")
        );
        assert_eq!(headlines[1].feed_title, "Twitter Feed");
    }
}
