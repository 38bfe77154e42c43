//! Request dispatch
//!
//! [`Dispatcher`] is the only place that talks to the network. It is built
//! once from the credentials and stays in the same mode for its lifetime:
//! `Live` signs and sends HTTP requests, `Simulated` answers from
//! [`Simulator`] and holds no HTTP client at all.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::{json, Value};

use crate::config::{Credentials, NetworkConfig};
use crate::errors::{Error, Result};
use crate::signature::RequestSigner;
use crate::simulation::Simulator;
use crate::types::{render_value, Instruction, Params};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Authenticated HTTP transport
#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    signer: RequestSigner,
}

impl HttpClient {
    pub fn new(network: &NetworkConfig, signer: RequestSigner) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(network.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: network.normalized_base_url().to_string(),
            signer,
        }
    }

    async fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        instruction: Instruction,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        let signing_input = params.or_else(|| body.and_then(Value::as_object));
        let headers = self.signer.sign(instruction, signing_input);

        let mut request = match method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Delete => self.client.delete(&url),
        };
        for (name, value) in headers.pairs() {
            request = request.header(name, value);
        }

        match method {
            HttpMethod::Post => {
                if let Some(body) = body {
                    request = request.json(body);
                }
            }
            HttpMethod::Get | HttpMethod::Delete => {
                if let Some(params) = params {
                    request = request.query(&query_pairs(params));
                }
            }
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        debug!("{method} {url} -> {}", status.as_u16());
        debug!("Response: {}", text.chars().take(500).collect::<String>());

        if status.as_u16() >= 400 {
            return Err(Error::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(json!({}));
        }

        Ok(serde_json::from_str(&text)?)
    }
}

fn query_pairs(params: &Params) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(k, v)| render_value(v).map(|v| (k.clone(), v)))
        .collect()
}

/// Single chokepoint for outbound calls
#[derive(Debug)]
pub enum Dispatcher {
    /// Signed requests against the exchange
    Live(HttpClient),
    /// Canned offline responses
    Simulated(Simulator),
}

impl Dispatcher {
    /// Pick the mode from the credentials.
    ///
    /// Missing credentials or a secret that does not decode to an Ed25519
    /// key yield a simulated dispatcher.
    pub fn new(credentials: &Credentials, network: &NetworkConfig) -> Self {
        match (credentials.api_key(), credentials.api_secret()) {
            (Some(api_key), Some(secret)) => {
                let window = network.window_ms.clone();
                match RequestSigner::from_base64_secret(api_key, secret, window) {
                    Ok(signer) => {
                        info!("Using live API at {}", network.normalized_base_url());
                        Dispatcher::Live(HttpClient::new(network, signer))
                    }
                    Err(e) => {
                        warn!("Failed to decode API secret: {e}");
                        warn!("Switching to simulated mode");
                        Dispatcher::Simulated(Simulator::new())
                    }
                }
            }
            _ => {
                info!("No API key/secret, starting in simulated mode");
                Dispatcher::Simulated(Simulator::new())
            }
        }
    }

    pub fn simulated() -> Self {
        Dispatcher::Simulated(Simulator::new())
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Dispatcher::Simulated(_))
    }

    /// [`Self::dispatch`] with the method given by name.
    ///
    /// Anything but GET, POST or DELETE fails with
    /// [`Error::UnsupportedMethod`] and never reaches the network.
    pub async fn request(
        &self,
        method: &str,
        endpoint: &str,
        instruction: Instruction,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let method = match method.parse::<HttpMethod>() {
            Ok(method) => method,
            Err(e) => {
                error!("{endpoint} rejected: {e}");
                return Err(e);
            }
        };
        self.dispatch(method, endpoint, instruction, params, body).await
    }

    /// Send one logical request.
    ///
    /// Transport failures and HTTP statuses >= 400 come back as `Err`; they
    /// are logged here and never panic.
    pub async fn dispatch(
        &self,
        method: HttpMethod,
        endpoint: &str,
        instruction: Instruction,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<Value> {
        match self {
            Dispatcher::Simulated(sim) => {
                debug!("[simulated] {method} {endpoint} params={params:?} body={body:?}");
                Ok(sim.respond(instruction, params, body))
            }
            Dispatcher::Live(http) => {
                let result = http.send(method, endpoint, instruction, params, body).await;
                if let Err(e) = &result {
                    error!("{method} {endpoint} failed: {e}");
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use ed25519_dalek::{Signature, SigningKey, Verifier};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    const SEED: [u8; 32] = [9u8; 32];

    fn valid_credentials() -> Credentials {
        Credentials::new(Some("test-key".into()), Some(STANDARD.encode(SEED)))
    }

    /// Value of a header in a raw HTTP request, name matched case-insensitively
    fn header(request: &str, name: &str) -> String {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        request
            .lines()
            .find(|l| l.to_ascii_lowercase().starts_with(&prefix))
            .map(|l| l[prefix.len()..].trim().to_string())
            .unwrap_or_else(|| panic!("missing header {name}"))
    }

    /// Check the request's signature against the expected canonical string
    fn assert_signed(
        request: &str,
        instruction: Instruction,
        signed: Option<&Params>,
        expected_fragment: &str,
    ) {
        let timestamp: i64 = header(request, "X-Timestamp").parse().unwrap();
        let signature = STANDARD.decode(header(request, "X-Signature")).unwrap();
        let signature = Signature::from_slice(&signature).unwrap();

        let message = crate::signature::canonical_string(instruction, signed, timestamp, "5000");
        assert!(message.contains(expected_fragment), "{message}");
        SigningKey::from_bytes(&SEED)
            .verifying_key()
            .verify(message.as_bytes(), &signature)
            .expect("signature should cover the canonical string");
    }

    fn network(base_url: &str) -> NetworkConfig {
        NetworkConfig {
            base_url: base_url.to_string(),
            window_ms: "5000".into(),
            timeout_secs: 5,
        }
    }

    /// Serve a single HTTP response and hand back the raw request text
    async fn one_shot_server(status_line: &str, body: &str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
        });

        (format!("http://{addr}"), rx)
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("DELETE".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!(matches!(
            "PATCH".parse::<HttpMethod>(),
            Err(Error::UnsupportedMethod(_))
        ));
    }

    #[tokio::test]
    async fn test_request_by_method_name() {
        // Nothing listens here; a rejected method must fail before connecting
        let dispatcher = Dispatcher::new(&valid_credentials(), &network("http://127.0.0.1:9"));
        let result = dispatcher
            .request("PATCH", "/api/v1/order", Instruction::OrderExecute, None, None)
            .await;
        assert!(matches!(result, Err(Error::UnsupportedMethod(m)) if m == "PATCH"));

        let simulated = Dispatcher::simulated();
        let result = simulated
            .request("delete", "/api/v1/orders", Instruction::OrderCancelAll, None, None)
            .await
            .unwrap();
        assert_eq!(result["cancelled"], 0);
    }

    #[test]
    fn test_mode_selection() {
        let net = network("https://api.backpack.exchange");
        assert!(Dispatcher::new(&Credentials::default(), &net).is_simulated());
        assert!(Dispatcher::new(&Credentials::new(Some("k".into()), None), &net).is_simulated());
        assert!(
            Dispatcher::new(&Credentials::new(Some("k".into()), Some("%%%".into())), &net)
                .is_simulated()
        );
        assert!(!Dispatcher::new(&valid_credentials(), &net).is_simulated());
    }

    #[tokio::test]
    async fn test_simulated_never_touches_network() {
        // Nothing listens here; any real request would fail
        let dispatcher = Dispatcher::new(&Credentials::default(), &network("http://127.0.0.1:9"));

        for instruction in [
            Instruction::BalanceQuery,
            Instruction::PositionQuery,
            Instruction::OrderQueryAll,
            Instruction::OrderExecute,
            Instruction::OrderCancel,
            Instruction::OrderCancelAll,
        ] {
            let result = dispatcher
                .dispatch(HttpMethod::Get, "/api/v1/anything", instruction, None, None)
                .await;
            assert!(result.is_ok(), "{instruction} should be simulated");
        }
    }

    #[tokio::test]
    async fn test_live_get_sends_signed_query() {
        let (base_url, rx) = one_shot_server("200 OK", r#"[{"symbol":"SOL_USDC_PERP"}]"#).await;
        let dispatcher = Dispatcher::new(&valid_credentials(), &network(&base_url));

        let mut params = Params::new();
        params.insert("symbol".into(), json!("SOL_USDC_PERP"));
        let result = dispatcher
            .dispatch(
                HttpMethod::Get,
                "/api/v1/position",
                Instruction::PositionQuery,
                Some(&params),
                None,
            )
            .await
            .unwrap();
        assert_eq!(result[0]["symbol"], "SOL_USDC_PERP");

        let raw = rx.await.unwrap();
        let request = raw.to_ascii_lowercase();
        assert!(request.starts_with("get /api/v1/position?symbol=sol_usdc_perp"));
        assert!(request.contains("x-api-key: test-key"));
        assert!(request.contains("x-window: 5000"));
        assert_signed(
            &raw,
            Instruction::PositionQuery,
            Some(&params),
            "instruction=positionQuery&symbol=SOL_USDC_PERP&timestamp=",
        );
    }

    #[tokio::test]
    async fn test_live_post_sends_json_body() {
        let (base_url, rx) = one_shot_server("200 OK", r#"{"id":"1","status":"Filled"}"#).await;
        let dispatcher = Dispatcher::new(&valid_credentials(), &network(&base_url));

        let body = json!({
            "symbol": "SOL_USDC",
            "side": "Bid",
            "orderType": "Market",
            "quantity": "0.01",
        });
        let result = dispatcher
            .dispatch(
                HttpMethod::Post,
                "/api/v1/order",
                Instruction::OrderExecute,
                None,
                Some(&body),
            )
            .await
            .unwrap();
        assert_eq!(result["status"], "Filled");

        let request = rx.await.unwrap();
        assert!(request.starts_with("POST /api/v1/order "));
        assert!(request.contains(r#""side":"Bid""#));
        // No params, so the body is what gets signed
        assert_signed(
            &request,
            Instruction::OrderExecute,
            body.as_object(),
            "orderType=Market&quantity=0.01&side=Bid&symbol=SOL_USDC",
        );
    }

    #[tokio::test]
    async fn test_live_empty_body_is_empty_result() {
        let (base_url, _rx) = one_shot_server("200 OK", "").await;
        let dispatcher = Dispatcher::new(&valid_credentials(), &network(&base_url));

        let result = dispatcher
            .dispatch(HttpMethod::Delete, "/api/v1/orders", Instruction::OrderCancelAll, None, None)
            .await
            .unwrap();
        assert_eq!(result, json!({}));
    }

    #[tokio::test]
    async fn test_live_error_status_is_failure() {
        let (base_url, _rx) = one_shot_server("400 Bad Request", "bad signature").await;
        let dispatcher = Dispatcher::new(&valid_credentials(), &network(&base_url));

        let result = dispatcher
            .dispatch(HttpMethod::Get, "/api/v1/capital", Instruction::BalanceQuery, None, None)
            .await;
        match result {
            Err(Error::Api { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad signature");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_live_transport_error_is_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dispatcher = Dispatcher::new(&valid_credentials(), &network(&format!("http://{addr}")));
        let result = dispatcher
            .dispatch(HttpMethod::Get, "/api/v1/capital", Instruction::BalanceQuery, None, None)
            .await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
