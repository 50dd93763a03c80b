use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use shared::{Error, Result, TtlSecs};
use std::time::Duration;

/// Which contract operation a transport failure happened in.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Op {
    Read,
    Write,
    Delete,
    List,
}

impl Op {
    fn error(self, message: String) -> Error {
        match self {
            Op::Read | Op::List => Error::Read(message),
            Op::Write => Error::Write(message),
            Op::Delete => Error::Delete(message),
        }
    }
}

/// Status and body of one call to the KV API.
#[derive(Debug)]
pub(crate) struct KvResponse {
    pub status: StatusCode,
    pub body: String,
}

impl KvResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Deserialize)]
pub struct ListedKey {
    pub name: String,
    #[serde(default)]
    pub expiration: Option<i64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultInfo {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListKeysResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub result: Option<Vec<ListedKey>>,
    #[serde(default)]
    pub result_info: Option<ResultInfo>,
}

impl ListKeysResponse {
    /// Cursor of the next page, if any.
    pub fn next_cursor(&self) -> Option<&str> {
        self.result_info
            .as_ref()
            .and_then(|info| info.cursor.as_deref())
            .filter(|c| !c.is_empty())
    }
}

/// Thin client for a namespace of the remote KV API. Every request carries the
/// bearer token.
#[derive(Clone, Debug)]
pub(crate) struct KvApi {
    client: Client,
    namespace_url: Url,
    api_token: String,
}

impl KvApi {
    pub fn new(namespace_url: Url, api_token: String, timeout: Duration) -> Result<Self> {
        if namespace_url.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "{namespace_url} cannot be used as an API base"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("could not build HTTP client: {e}")))?;

        Ok(Self {
            client,
            namespace_url,
            api_token,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.namespace_url.clone();
        // Checked in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn get_value(&self, key: &str) -> Result<KvResponse> {
        let url = self.url(&["values", key]);
        self.send(Op::Read, Method::GET, url, None).await
    }

    pub async fn put_value(&self, key: &str, ttl: TtlSecs, value: String) -> Result<KvResponse> {
        let mut url = self.url(&["values", key]);
        url.query_pairs_mut()
            .append_pair("expiration_ttl", &ttl.as_secs().to_string());
        self.send(Op::Write, Method::PUT, url, Some(value)).await
    }

    pub async fn delete_value(&self, key: &str) -> Result<KvResponse> {
        let url = self.url(&["values", key]);
        self.send(Op::Delete, Method::DELETE, url, None).await
    }

    /// One request removing every key; the body is a JSON array of names.
    pub async fn delete_bulk(&self, keys: &[String]) -> Result<KvResponse> {
        let request = self.request(Method::DELETE, self.url(&["bulk"])).json(keys);
        self.execute(Op::Delete, request).await
    }

    pub async fn list_keys(&self, prefix: Option<&str>, cursor: Option<&str>) -> Result<KvResponse> {
        let mut url = self.url(&["keys"]);
        {
            let mut query = url.query_pairs_mut();
            if let Some(prefix) = prefix {
                query.append_pair("prefix", prefix);
            }
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        self.send(Op::List, Method::GET, url, None).await
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.api_token)
    }

    async fn send(
        &self,
        op: Op,
        method: Method,
        url: Url,
        body: Option<String>,
    ) -> Result<KvResponse> {
        let mut request = self.request(method, url);
        if let Some(body) = body {
            request = request.body(body);
        }
        self.execute(op, request).await
    }

    async fn execute(&self, op: Op, request: RequestBuilder) -> Result<KvResponse> {
        let response = request.send().await.map_err(|e| transport_error(op, e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(op, e))?;
        Ok(KvResponse { status, body })
    }
}

fn transport_error(op: Op, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout(format!("{op:?} request to remote KV: {err}"))
    } else if err.is_connect() {
        Error::Connection(format!("{op:?} request to remote KV: {err}"))
    } else {
        op.error(format!("request to remote KV failed: {err}"))
    }
}
