//! Remote cache deletion
//!
//! A thin wrapper over `DELETE {base}/caches/{key}[/{version}][?prefix]`.

use crate::config::schema::{CacheApiConfig, JobConfig};
use crate::error::{StickyDiskError, StickyResult};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// API version negotiated through the `Accept` header
const ACCEPT: &str = "application/json; version=6.0-preview.1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// What to delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteCacheRequest {
    pub key: String,
    pub version: Option<String>,
    /// Treat `key` as a prefix and delete every matching entry
    pub prefix: bool,
}

impl DeleteCacheRequest {
    pub fn validate(&self) -> StickyResult<()> {
        let invalid = |msg: &str| Err(StickyDiskError::InvalidCacheRequest(msg.to_string()));

        if self.key.is_empty() && !self.prefix {
            return invalid("Cache key cannot be empty unless prefix is true");
        }
        if self.version.is_some() && self.key.is_empty() {
            return invalid("Cannot specify version when using empty key");
        }
        if self.version.is_some() && self.prefix {
            return invalid("Cannot specify version when using prefix");
        }
        Ok(())
    }

    /// Endpoint for this request under `base`
    pub fn url(&self, base: &str) -> String {
        let mut url = format!("{}/caches/{}", base.trim_end_matches('/'), self.key);
        if let Some(version) = &self.version {
            url.push('/');
            url.push_str(version);
        }
        if self.prefix {
            url.push_str("?prefix");
        }
        url
    }

    /// `key` or `key@version`
    fn label(&self) -> String {
        match &self.version {
            Some(version) => format!("{}@{}", self.key, version),
            None => self.key.clone(),
        }
    }
}

/// Result of a successful call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    NotFound,
    Deleted { count: Option<u64> },
}

impl DeleteOutcome {
    /// Summary lines for `request`; a reported count adds a second line
    pub fn messages(&self, request: &DeleteCacheRequest) -> Vec<String> {
        let count = match self {
            Self::NotFound => return vec![format!("Cache not found: {}", request.label())],
            Self::Deleted { count } => count,
        };

        let summary = if request.prefix {
            format!("Successfully deleted caches with prefix: {}", request.key)
        } else if request.version.is_some() {
            format!("Successfully deleted cache version: {}", request.label())
        } else {
            format!("Successfully deleted cache: {}", request.key)
        };

        let mut lines = vec![summary];
        if let Some(count) = count {
            lines.push(format!("Deleted {} cache entries", count));
        }
        lines
    }
}

#[derive(Debug, Default, Deserialize)]
struct DeleteResponseBody {
    #[serde(alias = "deletedCount", alias = "deleted")]
    deleted_count: Option<u64>,
}

/// Map an HTTP response to an outcome
///
/// 404 is informational; any other non-2xx status is an error.
pub fn interpret_response(status: u16, reason: &str, body: &str) -> StickyResult<DeleteOutcome> {
    match status {
        404 => Ok(DeleteOutcome::NotFound),
        200..=299 => {
            let count = serde_json::from_str::<DeleteResponseBody>(body)
                .map(|b| b.deleted_count)
                .unwrap_or_default();
            Ok(DeleteOutcome::Deleted { count })
        }
        _ => Err(StickyDiskError::CacheApi {
            status,
            reason: reason.to_string(),
        }),
    }
}

/// Blocking client for the cache API
pub struct CacheApiClient {
    base_url: String,
    token: String,
    repo_name: String,
    region: String,
    agent: ureq::Agent,
}

impl CacheApiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        repo_name: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();

        Self {
            base_url: base_url.into(),
            token: token.into(),
            repo_name: repo_name.into(),
            region: region.into(),
            agent,
        }
    }

    pub fn from_config(api: &CacheApiConfig, job: &JobConfig) -> StickyResult<Self> {
        let base_url = api.base_url.clone().ok_or_else(|| {
            StickyDiskError::Internal("cache API base URL is not configured".to_string())
        })?;

        Ok(Self::new(
            base_url,
            api.token.clone().unwrap_or_default(),
            job.repo_name.clone(),
            job.region.clone(),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue the DELETE; blocks the calling thread
    pub fn delete(&self, request: &DeleteCacheRequest) -> StickyResult<DeleteOutcome> {
        request.validate()?;

        let url = request.url(&self.base_url);
        debug!("DELETE {}", url);

        let mut response = self
            .agent
            .delete(&url)
            .header("Accept", ACCEPT)
            .header("X-GitHub-Repo-Name", &self.repo_name)
            .header("Authorization", &format!("Bearer {}", self.token))
            .header("X-Cache-Region", &self.region)
            .call()
            .map_err(|e| StickyDiskError::Transport(format!("DELETE {url}: {e}")))?;

        let status = response.status();
        let body = response.body_mut().read_to_string().unwrap_or_default();
        debug!("Cache API responded {}", status);

        interpret_response(
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            &body,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    const BASE: &str = "https://api.blacksmith.sh/cache";

    fn request(key: &str) -> DeleteCacheRequest {
        DeleteCacheRequest {
            key: key.to_string(),
            ..DeleteCacheRequest::default()
        }
    }

    #[test]
    fn url_for_key() {
        assert_eq!(
            request("npm-cache").url(BASE),
            "https://api.blacksmith.sh/cache/caches/npm-cache"
        );
    }

    #[test]
    fn url_for_prefix() {
        let req = DeleteCacheRequest {
            prefix: true,
            ..request("npm-")
        };
        assert_eq!(req.url(BASE), "https://api.blacksmith.sh/cache/caches/npm-?prefix");

        let all = DeleteCacheRequest {
            prefix: true,
            ..request("")
        };
        assert!(all.validate().is_ok());
        assert_eq!(all.url(BASE), "https://api.blacksmith.sh/cache/caches/?prefix");
    }

    #[test]
    fn url_for_version() {
        let req = DeleteCacheRequest {
            version: Some("v2".to_string()),
            ..request("npm-cache")
        };
        assert_eq!(req.url(BASE), "https://api.blacksmith.sh/cache/caches/npm-cache/v2");
    }

    #[test]
    fn empty_key_requires_prefix() {
        let err = request("").validate().unwrap_err();
        assert_eq!(err.to_string(), "Cache key cannot be empty unless prefix is true");
    }

    #[test]
    fn version_conflicts() {
        let empty_key = DeleteCacheRequest {
            version: Some("v1".to_string()),
            prefix: true,
            ..request("")
        };
        assert_eq!(
            empty_key.validate().unwrap_err().to_string(),
            "Cannot specify version when using empty key"
        );

        let with_prefix = DeleteCacheRequest {
            version: Some("v1".to_string()),
            prefix: true,
            ..request("npm-")
        };
        assert_eq!(
            with_prefix.validate().unwrap_err().to_string(),
            "Cannot specify version when using prefix"
        );
    }

    #[test]
    fn not_found_is_informational() {
        let outcome = interpret_response(404, "Not Found", "").unwrap();
        assert_eq!(outcome, DeleteOutcome::NotFound);
        let versioned = DeleteCacheRequest {
            version: Some("v3".to_string()),
            ..request("gems")
        };
        assert_eq!(outcome.messages(&versioned), vec!["Cache not found: gems@v3"]);
    }

    #[test]
    fn server_error_is_fatal() {
        let err = interpret_response(500, "Internal Server Error", "").unwrap_err();
        assert_eq!(err.to_string(), "Failed to delete cache: 500 Internal Server Error");
    }

    #[test]
    fn success_without_count_is_one_line() {
        let deleted = interpret_response(204, "No Content", "").unwrap();
        assert_eq!(
            deleted.messages(&request("npm-cache")),
            vec!["Successfully deleted cache: npm-cache"]
        );

        let prefix = DeleteCacheRequest {
            prefix: true,
            ..request("npm-")
        };
        assert_eq!(
            deleted.messages(&prefix),
            vec!["Successfully deleted caches with prefix: npm-"]
        );
    }

    #[test]
    fn keyed_delete_reports_count() {
        let deleted = interpret_response(200, "OK", r#"{"deleted": 1}"#).unwrap();
        assert_eq!(deleted, DeleteOutcome::Deleted { count: Some(1) });
        assert_eq!(
            deleted.messages(&request("npm-cache")),
            vec!["Successfully deleted cache: npm-cache", "Deleted 1 cache entries"]
        );

        let versioned = DeleteCacheRequest {
            version: Some("v1.0".to_string()),
            ..request("npm-cache")
        };
        assert_eq!(
            deleted.messages(&versioned),
            vec![
                "Successfully deleted cache version: npm-cache@v1.0",
                "Deleted 1 cache entries"
            ]
        );
    }

    #[test]
    fn prefix_delete_reports_count() {
        let deleted = interpret_response(200, "OK", r#"{"deleted_count": 5}"#).unwrap();
        let prefix = DeleteCacheRequest {
            prefix: true,
            ..request("npm-")
        };
        assert_eq!(
            deleted.messages(&prefix),
            vec!["Successfully deleted caches with prefix: npm-", "Deleted 5 cache entries"]
        );

        let all = DeleteCacheRequest {
            prefix: true,
            ..request("")
        };
        assert_eq!(deleted.messages(&all)[0], "Successfully deleted caches with prefix: ");
    }

    #[test]
    fn delete_sends_headers() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                head.push_str(&line);
            }
            let mut stream = stream;
            let response = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
            stream.write_all(response.as_bytes()).unwrap();
            head
        });

        let client =
            CacheApiClient::new(format!("http://{addr}"), "tok", "acme/widgets", "us-east");
        let outcome = client.delete(&request("npm-cache")).unwrap();
        let head = server.join().unwrap().to_lowercase();

        assert_eq!(outcome, DeleteOutcome::NotFound);
        assert!(head.starts_with("delete /caches/npm-cache http/1.1"));
        assert!(head.contains("accept: application/json; version=6.0-preview.1"));
        assert!(head.contains("x-github-repo-name: acme/widgets"));
        assert!(head.contains("authorization: bearer tok"));
        assert!(head.contains("x-cache-region: us-east"));
    }

    #[test]
    fn invalid_request_is_not_sent() {
        let client = CacheApiClient::new("http://127.0.0.1:1", "tok", "", "eu-central");
        let err = client.delete(&request("")).unwrap_err();
        assert!(matches!(err, StickyDiskError::InvalidCacheRequest(_)));
    }
}
