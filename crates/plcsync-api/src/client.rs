// SCADA gateway HTTP client
//
// Wraps `reqwest::Client` with tag URL construction, Basic auth, status
// classification, and the single redirect correction the gateway's proxy
// needs. One client talks to exactly one PLC behind the gateway.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::models::{
    BatchOperation, BatchRequest, BatchResponse, TagReadResponse, TagWrite, TagWriteResponse,
    WriteOutcome,
};
use crate::tag::TagAddress;
use crate::throttle::Throttle;
use crate::transport::TransportConfig;

/// HTTP Basic credentials for the gateway.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

/// Raw HTTP client for one PLC behind the SCADA gateway.
///
/// Every request carries Basic auth. Redirects are inspected by hand: a hop
/// to the API host itself or to a known misspelling of it is replayed once
/// against the canonical host, anything else is a protocol error.
pub struct PlcClient {
    http: reqwest::Client,
    base_url: Url,
    plc_address: String,
    credentials: Credentials,
    batch_timeout: std::time::Duration,
    known_bad_hosts: Vec<String>,
    throttle: Throttle,
}

impl PlcClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the gateway API root (e.g.
    /// `https://automacao.example.gov.br/scadaweb/api`) and `plc_address` the
    /// controller's IP as the gateway knows it.
    pub fn new(
        base_url: Url,
        plc_address: impl Into<String>,
        credentials: Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            plc_address: plc_address.into(),
            credentials,
            batch_timeout: transport.batch_timeout,
            known_bad_hosts: Vec::new(),
            throttle: Throttle::default(),
        })
    }

    /// Hosts the gateway proxy is known to redirect to by mistake.
    pub fn with_known_bad_hosts(mut self, hosts: Vec<String>) -> Self {
        self.known_bad_hosts = hosts;
        self
    }

    /// Replace the inter-call throttle used by sequential reads and writes.
    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    /// The PLC address this client targets.
    pub fn plc_address(&self) -> &str {
        &self.plc_address
    }

    /// The gateway base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Register operations ──────────────────────────────────────────

    /// Read one register.
    pub async fn read(&self, address: &TagAddress) -> Result<i64, Error> {
        let url = self.endpoint(&["tag_read", &self.plc_address, &address.encoded()])?;
        let resp: TagReadResponse = self.get(url).await?;
        Ok(resp.valor)
    }

    /// Read several registers one call at a time, throttled.
    ///
    /// Stops at the first error; a partial read-back is not useful to callers.
    pub async fn read_many(&self, addresses: &[TagAddress]) -> Result<Vec<i64>, Error> {
        let mut values = Vec::with_capacity(addresses.len());
        for address in addresses {
            self.throttle.wait().await;
            values.push(self.read(address).await?);
        }
        Ok(values)
    }

    /// Write one register. A `{"sucesso": false}` answer is an error.
    pub async fn write(&self, op: &TagWrite) -> Result<(), Error> {
        let value = op.value.to_string();
        let url = self.endpoint(&[
            "tag_write",
            &self.plc_address,
            &op.address.encoded(),
            &value,
        ])?;
        let resp: TagWriteResponse = self.get(url).await?;
        if resp.sucesso {
            Ok(())
        } else {
            Err(Error::Rejected {
                address: op.address.to_string(),
            })
        }
    }

    /// Write every operation in one `POST /tag_write_batch` request.
    pub async fn write_batch(&self, operations: &[TagWrite]) -> Result<WriteOutcome, Error> {
        let url = self.endpoint(&["tag_write_batch"])?;
        let body = BatchRequest {
            clp_address: &self.plc_address,
            operations: operations
                .iter()
                .map(|op| BatchOperation {
                    tag_address: op.address.to_string(),
                    value: op.value.to_string(),
                })
                .collect(),
        };
        debug!(ops = operations.len(), "POST {}", url);

        let resp = self
            .send(url, |url| {
                self.authed(self.http.post(url))
                    .timeout(self.batch_timeout)
                    .json(&body)
            })
            .await?;
        let batch: BatchResponse = parse_json(resp).await?;

        if !batch.success && batch.results.is_empty() {
            return Err(Error::BatchRejected {
                message: batch.error.unwrap_or_else(|| "no results returned".into()),
            });
        }
        if let Some(summary) = &batch.summary {
            debug!(
                total = summary.total,
                successful = summary.successful,
                failed = summary.failed,
                "batch summary"
            );
        }
        Ok(WriteOutcome::from_batch(operations, &batch))
    }

    /// Write operations one request at a time with the throttle between calls.
    ///
    /// Auth, transport and protocol errors abort the pass; a per-register
    /// rejection or HTTP error is recorded and the remaining operations
    /// still go out.
    pub async fn write_sequential(&self, operations: &[TagWrite]) -> Result<WriteOutcome, Error> {
        let mut outcome = WriteOutcome::default();
        for op in operations {
            self.throttle.wait().await;
            match self.write(op).await {
                Ok(()) => outcome.record_success(),
                Err(e) if e.is_auth() || e.is_transient() || e.is_protocol() => return Err(e),
                Err(e) => {
                    warn!(address = %op.address, error = %e, "register write failed");
                    outcome.record_failure(op.address.clone(), e.to_string());
                }
            }
        }
        Ok(outcome)
    }

    /// Connectivity check: read `address` and discard the value.
    pub async fn probe(&self, address: &TagAddress) -> Result<(), Error> {
        self.read(address).await.map(|_| ())
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Join already-encoded path segments onto the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let full = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            segments.join("/")
        );
        Ok(Url::parse(&full)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.basic_auth(
            &self.credentials.username,
            Some(self.credentials.password.expose_secret()),
        )
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self
            .send(url, |url| self.authed(self.http.get(url)))
            .await?;
        parse_json(resp).await
    }

    /// Send a request, replaying it at most once after a correctable redirect.
    async fn send<F>(&self, url: Url, build: F) -> Result<reqwest::Response, Error>
    where
        F: Fn(Url) -> reqwest::RequestBuilder,
    {
        let resp = build(url.clone()).send().await?;
        if !resp.status().is_redirection() {
            return Ok(resp);
        }

        let location = redirect_location(&url, &resp)?;
        let corrected = self.correct_redirect(&location)?;
        warn!(from = %location, to = %corrected, "correcting gateway redirect");

        let retry = build(corrected).send().await?;
        if retry.status().is_redirection() {
            let location = redirect_location(&url, &retry)?;
            return Err(Error::UnexpectedRedirect {
                location: location.to_string(),
            });
        }
        Ok(retry)
    }

    /// Map a redirect target back onto the canonical API host.
    fn correct_redirect(&self, location: &Url) -> Result<Url, Error> {
        let unexpected = || Error::UnexpectedRedirect {
            location: location.to_string(),
        };
        let host = location.host_str().ok_or_else(unexpected)?;

        let same_host = Some(host) == self.base_url.host_str()
            && location.port_or_known_default() == self.base_url.port_or_known_default();
        if same_host {
            return Ok(location.clone());
        }

        if !self.known_bad_hosts.iter().any(|bad| host.contains(bad.as_str())) {
            return Err(unexpected());
        }

        let mut corrected = location.clone();
        corrected
            .set_scheme(self.base_url.scheme())
            .map_err(|()| unexpected())?;
        corrected
            .set_host(self.base_url.host_str())
            .map_err(|_| unexpected())?;
        corrected
            .set_port(self.base_url.port())
            .map_err(|()| unexpected())?;
        Ok(corrected)
    }
}

fn redirect_location(request_url: &Url, resp: &reqwest::Response) -> Result<Url, Error> {
    let raw = resp
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::UnexpectedRedirect {
            location: "<missing Location header>".into(),
        })?;
    Ok(request_url.join(raw)?)
}

/// Classify the status and decode the JSON body.
async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Authentication {
            status: status.as_u16(),
        });
    }

    let body = resp.text().await?;

    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }

    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> PlcClient {
        PlcClient::new(
            Url::parse(base).unwrap(),
            "10.0.0.1",
            Credentials::new("op", "pw".to_string().into()),
            &TransportConfig::default(),
        )
        .unwrap()
        .with_known_bad_hosts(vec!["automacao.example.br".into()])
    }

    #[test]
    fn endpoint_keeps_double_encoding() {
        let c = client("https://gw.example.gov.br/scadaweb/api/");
        let url = c
            .endpoint(&["tag_read", "10.0.0.1", &TagAddress::new("N33", 2).encoded()])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://gw.example.gov.br/scadaweb/api/tag_read/10.0.0.1/N33%253A2"
        );
    }

    #[test]
    fn misspelled_host_is_rewritten() {
        let c = client("https://automacao.example.gov.br/scadaweb/api");
        let loc = Url::parse("http://automacao.example.br/scadaweb/api/tag_read/x?y=1").unwrap();
        let fixed = c.correct_redirect(&loc).unwrap();
        assert_eq!(
            fixed.as_str(),
            "https://automacao.example.gov.br/scadaweb/api/tag_read/x?y=1"
        );
    }

    #[test]
    fn foreign_host_is_rejected() {
        let c = client("https://automacao.example.gov.br/scadaweb/api");
        let loc = Url::parse("https://login.example.com/sso").unwrap();
        assert!(matches!(
            c.correct_redirect(&loc),
            Err(Error::UnexpectedRedirect { .. })
        ));
    }
}
