//! Request context attached to events.

use std::collections::BTreeMap;

use serde::Serialize;

use super::Event;
use crate::core::Request;

/// Largest request body attached to an event, in bytes.
pub const MAX_REQUEST_BODY: usize = 10_000;

/// Headers dropped unless default PII is enabled.
const SENSITIVE_HEADERS: &[&str] = &["authorization", "proxy-authorization", "cookie", "set-cookie"];

/// Snapshot of the request that produced an event.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RequestData {
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
}

impl RequestData {
    /// Capture the parts of `req` worth reporting.
    ///
    /// Without `send_default_pii`, credentials, cookies, the body and the
    /// client address are left out.
    pub fn from_request(req: &Request, send_default_pii: bool) -> Self {
        let headers = req
            .headers()
            .iter()
            .filter(|(name, _)| send_default_pii || !SENSITIVE_HEADERS.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let data = if send_default_pii && !req.body().is_empty() && req.body().len() <= MAX_REQUEST_BODY
        {
            std::str::from_utf8(req.body()).ok().map(str::to_string)
        } else {
            None
        };

        Self {
            method: req.method().to_string(),
            url: absolute_url(req),
            query_string: req.query().map(str::to_string),
            headers,
            data,
            client_ip: send_default_pii
                .then(|| req.remote_addr().map(|addr| addr.ip().to_string()))
                .flatten(),
        }
    }

    /// Path portion of the URL, without the query string.
    pub fn path(&self) -> &str {
        let after_scheme = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        let path_start = after_scheme.find('/').unwrap_or(after_scheme.len());
        let path = &after_scheme[path_start..];
        let path = path.split('?').next().unwrap_or(path);
        if path.is_empty() {
            "/"
        } else {
            path
        }
    }
}

/// Attach `request` to `event`, naming the transaction after the route if unnamed.
pub fn parse_request(mut event: Event, request: &RequestData) -> Event {
    if event.transaction.is_none() {
        event.transaction = Some(format!("{} {}", request.method, request.path()));
    }
    event.request = Some(request.clone());
    event
}

fn absolute_url(req: &Request) -> String {
    let scheme = req.uri().scheme_str().unwrap_or("http");
    let host = req.host().unwrap_or("localhost");
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("{}://{}{}", scheme, host, path_and_query)
}
