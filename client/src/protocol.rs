use reqwest::Url;

use crate::ClientError;

/// Query parameter carrying the method override the broker honors on GET.
pub const METHOD_OVERRIDE: &str = "_method";

/// One request against the broker's `/event` endpoint.
///
/// Built fresh for every relay invocation and never mutated once handed to a
/// [`BrokerClient`](crate::BrokerClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRequest {
    base_url: String,
    topic: String,
    client_id: String,
    timeout_secs: Option<u64>,
    params: Vec<(String, String)>,
}

impl BrokerRequest {
    pub fn new(
        base_url: impl Into<String>,
        topic: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            topic: topic.into(),
            client_id: client_id.into(),
            timeout_secs: None,
            params: Vec::new(),
        }
    }

    /// Long-poll timeout the broker should hold the request for.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Turns the GET into a publish on the broker side.
    pub fn as_post(self) -> Self {
        self.with_param(METHOD_OVERRIDE, "POST")
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// `{base}/event?topic=..&clientID=..[&timeOut=..][&extra..]`, extras in
    /// insertion order.
    pub fn url(&self) -> Result<Url, ClientError> {
        let endpoint = format!("{}/event", self.base_url.trim_end_matches('/'));
        let mut url = Url::parse(&endpoint)
            .map_err(|e| ClientError::InvalidUrl(format!("{endpoint}: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("topic", &self.topic);
            query.append_pair("clientID", &self.client_id);
            if let Some(secs) = self.timeout_secs {
                query.append_pair("timeOut", &secs.to_string());
            }
            for (key, value) in &self.params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }
}
