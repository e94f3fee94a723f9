use crate::error::Result;
use crate::types::{Millis, NodeDescriptor};
use serde::{Deserialize, Serialize};

/// Result of a `/loadtracks` lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadTracksResponse {
    pub load_type: LoadType,
    #[serde(default)]
    pub playlist_info: Option<PlaylistInfo>,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub exception: Option<LoadException>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    TrackLoaded,
    PlaylistLoaded,
    SearchResult,
    NoMatches,
    LoadFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub selected_track: Option<i64>,
}

/// A playable track: the opaque id to pass to `play` plus its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub track: String,
    pub info: TrackInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,
    pub length: Millis,
    pub is_stream: bool,
    pub position: Millis,
    pub title: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadException {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
}

/// `GET /loadtracks?identifier=...` against a node
pub(crate) async fn load_tracks(
    http: &reqwest::Client,
    node: &NodeDescriptor,
    identifier: &str,
) -> Result<LoadTracksResponse> {
    let url = format!("{}/loadtracks", node.http_url());
    tracing::debug!("Loading tracks from {} for {}", url, identifier);

    let response = http
        .get(&url)
        .header("Authorization", node.effective_password())
        .query(&[("identifier", identifier)])
        .send()
        .await?
        .error_for_status()?;

    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_result() {
        let body = r#"{
            "loadType": "SEARCH_RESULT",
            "playlistInfo": {},
            "tracks": [{
                "track": "QAAAjQIAJFJpY2sgQXN0bGV5",
                "info": {
                    "identifier": "dQw4w9WgXcQ",
                    "isSeekable": true,
                    "author": "RickAstleyVEVO",
                    "length": 212000,
                    "isStream": false,
                    "position": 0,
                    "title": "Never Gonna Give You Up",
                    "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                    "sourceName": "youtube"
                }
            }]
        }"#;

        let response: LoadTracksResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.load_type, LoadType::SearchResult);
        assert_eq!(response.tracks.len(), 1);
        assert_eq!(response.tracks[0].info.length, 212000);
        assert_eq!(response.tracks[0].info.source_name.as_deref(), Some("youtube"));
    }

    #[test]
    fn parses_load_failure() {
        let body = r#"{
            "loadType": "LOAD_FAILED",
            "playlistInfo": {},
            "tracks": [],
            "exception": {
                "message": "The uploader has not made this video available",
                "severity": "COMMON"
            }
        }"#;

        let response: LoadTracksResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.load_type, LoadType::LoadFailed);
        assert!(response.tracks.is_empty());
        assert_eq!(response.exception.unwrap().severity.as_deref(), Some("COMMON"));
    }
}
