//! # Resilient Fetch Client
//!
//! Retrieves raw payloads from endpoints that actively block automated
//! clients. Every call goes through the same explicit loop:
//!
//! 1. Fail fast when the host's circuit is open.
//! 2. Seed a session from the target's seed page when the host has none.
//! 3. Pick an identity that is not cooling down for the target.
//! 4. Wait for the host gate, then issue the request under a timeout.
//! 5. Classify the response into an [`AttemptOutcome`].
//! 6. Back off and retry retryable outcomes up to the attempt budget.
//!
//! Shared state ([`FetchState`]) is only touched after a request has fully
//! completed, so dropping a fetch future mid-flight never leaves a session,
//! cooldown or breaker half-updated.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreakers;
use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::identity::{ClientIdentity, IdentityPool};
use crate::retry::RetryConfig;
use crate::session::SessionTable;
use crate::throttling::HostGate;
use crate::UtcDateTime;

/// Body substrings (lower-case) that mark an anti-bot interstitial.
pub const DEFAULT_BLOCK_SIGNATURES: [&str; 5] = [
    "access denied",
    "captcha",
    "just a moment",
    "request unsuccessful",
    "cf-browser-verification",
];

/// Expected payload format of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Json,
    Html,
}

/// One endpoint to retrieve, with its own timeout and attempt budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub url: String,
    pub content: ContentKind,
    pub timeout: Duration,
    pub referer: Option<String>,
    /// Page visited for cookies before the first call on a fresh session.
    pub session_seed: Option<String>,
}

impl FetchTarget {
    pub fn new(url: impl Into<String>, content: ContentKind) -> Self {
        Self {
            url: url.into(),
            content,
            timeout: Duration::from_secs(10),
            referer: None,
            session_seed: None,
        }
    }

    pub fn json(url: impl Into<String>) -> Self {
        Self::new(url, ContentKind::Json)
    }

    pub fn html(url: impl Into<String>) -> Self {
        Self::new(url, ContentKind::Html)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_session_seed(mut self, seed_url: impl Into<String>) -> Self {
        self.session_seed = Some(seed_url.into());
        self
    }

    pub fn host(&self) -> Result<String, FetchError> {
        host_of(&self.url)
    }
}

/// Failure classes surfaced by the fetch client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Blocked,
    Timeout,
    Network,
    Malformed,
}

impl FetchErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Malformed => "malformed",
        }
    }
}

/// Structured fetch failure. Transport faults never escape in any other form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    status: Option<u16>,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Blocked, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Malformed, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether a later attempt could succeed. Client-side statuses other
    /// than block and throttle codes are final.
    pub fn retryable(&self) -> bool {
        match self.status {
            Some(status) => !RetryConfig::is_terminal_status(status),
            None => true,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Blocked => "fetch.blocked",
            FetchErrorKind::Timeout => "fetch.timeout",
            FetchErrorKind::Network => "fetch.network",
            FetchErrorKind::Malformed => "fetch.malformed",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

/// Body of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    pub url: String,
    pub content: ContentKind,
    pub body: String,
    pub fetched_at: UtcDateTime,
}

impl RawPayload {
    pub fn new(url: impl Into<String>, content: ContentKind, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content,
            body: body.into(),
            fetched_at: UtcDateTime::now(),
        }
    }
}

/// Classified result of a single attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(RawPayload),
    Retryable(FetchError),
    Terminal(FetchError),
}

/// Client-wide fetch behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub retry: RetryConfig,
    /// Lower-case body substrings that mark a block page.
    pub block_signatures: Vec<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            block_signatures: DEFAULT_BLOCK_SIGNATURES
                .iter()
                .map(|signature| (*signature).to_owned())
                .collect(),
        }
    }
}

/// Mutable anti-bot bookkeeping shared by every fetch.
#[derive(Debug)]
pub struct FetchState {
    pub sessions: SessionTable,
    pub identities: IdentityPool,
    pub gate: HostGate,
    pub breakers: CircuitBreakers,
}

impl FetchState {
    pub fn new(
        sessions: SessionTable,
        identities: IdentityPool,
        gate: HostGate,
        breakers: CircuitBreakers,
    ) -> Self {
        Self {
            sessions,
            identities,
            gate,
            breakers,
        }
    }
}

impl Default for FetchState {
    fn default() -> Self {
        Self {
            sessions: SessionTable::new(Duration::from_secs(600)),
            identities: IdentityPool::default(),
            gate: HostGate::new(Duration::from_secs(2)),
            breakers: CircuitBreakers::default(),
        }
    }
}

/// HTTP retrieval with identity rotation, sessions, backoff, gating and breakers.
#[derive(Clone)]
pub struct FetchClient {
    http: Arc<dyn HttpClient>,
    state: Arc<FetchState>,
    settings: FetchSettings,
}

impl FetchClient {
    pub fn new(http: Arc<dyn HttpClient>, state: Arc<FetchState>, settings: FetchSettings) -> Self {
        let settings = FetchSettings {
            block_signatures: settings
                .block_signatures
                .into_iter()
                .map(|signature| signature.to_lowercase())
                .collect(),
            ..settings
        };
        Self {
            http,
            state,
            settings,
        }
    }

    pub fn state(&self) -> &Arc<FetchState> {
        &self.state
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub async fn fetch(&self, target: &FetchTarget) -> Result<RawPayload, FetchError> {
        let host = target.host()?;
        let breaker = self.state.breakers.for_host(&host);
        if let Err(kind) = breaker.allow_request() {
            debug!(host = %host, kind = kind.as_str(), "circuit open, failing fast");
            return Err(FetchError::new(
                kind,
                format!("circuit open for host '{host}'"),
            ));
        }

        let max_attempts = self.settings.retry.max_retries.max(1);
        let mut last_error = FetchError::network(format!("no attempt made for '{}'", target.url));

        for attempt in 1..=max_attempts {
            if let Some(seed_url) = &target.session_seed {
                if self.state.sessions.needs_seed(&host) {
                    self.seed_session(&host, seed_url, target).await;
                }
            }

            let identity = self.state.identities.select(&target.url);
            debug!(
                host = %host,
                attempt,
                identity = %identity.id,
                url = %target.url,
                "fetch attempt"
            );

            match self.attempt(&host, target, &identity).await {
                AttemptOutcome::Success(payload) => {
                    breaker.record_success();
                    if attempt > 1 {
                        info!(host = %host, attempt, "fetch recovered after retries");
                    }
                    return Ok(payload);
                }
                AttemptOutcome::Terminal(error) => {
                    warn!(host = %host, attempt, code = error.code(), "fetch failed terminally: {}", error.message());
                    breaker.record_failure(error.kind());
                    return Err(error);
                }
                AttemptOutcome::Retryable(error) => {
                    debug!(host = %host, attempt, code = error.code(), "attempt failed: {}", error.message());
                    last_error = error;
                }
            }

            if attempt < max_attempts {
                let delay = self.settings.retry.delay_for_attempt(attempt);
                tokio::time::sleep(delay).await;
            }
        }

        warn!(
            host = %host,
            attempts = max_attempts,
            code = last_error.code(),
            "fetch exhausted retries"
        );
        breaker.record_failure(last_error.kind());
        Err(last_error)
    }

    async fn attempt(
        &self,
        host: &str,
        target: &FetchTarget,
        identity: &ClientIdentity,
    ) -> AttemptOutcome {
        let mut request = HttpRequest::get(&target.url)
            .with_header("user-agent", &identity.user_agent)
            .with_timeout_ms(duration_ms(target.timeout));
        for (name, value) in &identity.headers {
            request = request.with_header(name, value);
        }
        if target.content == ContentKind::Json {
            request = request.with_header("accept", "application/json, text/plain, */*");
        }
        if let Some(referer) = &target.referer {
            request = request.with_header("referer", referer);
        }
        if let Some(cookie) = self.state.sessions.cookie_header(host) {
            request = request.with_header("cookie", cookie);
        }

        let result = self.execute(host, request, target.timeout).await;
        self.classify(host, target, identity, result)
    }

    async fn execute(
        &self,
        host: &str,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, HttpError> {
        self.state.gate.until_ready(host).await;
        match tokio::time::timeout(timeout, self.http.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(HttpError::timeout(format!(
                "no response within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    fn classify(
        &self,
        host: &str,
        target: &FetchTarget,
        identity: &ClientIdentity,
        result: Result<HttpResponse, HttpError>,
    ) -> AttemptOutcome {
        let response = match result {
            Ok(response) => response,
            Err(error) if error.timed_out() => {
                return AttemptOutcome::Retryable(FetchError::timeout(error.message()));
            }
            Err(error) if error.retryable() => {
                return AttemptOutcome::Retryable(FetchError::network(error.message()));
            }
            Err(error) => return AttemptOutcome::Terminal(FetchError::network(error.message())),
        };

        if let Some(reason) = self.block_reason(&response) {
            self.state.identities.record_block(&target.url, &identity.id);
            if self.state.sessions.record_block(host) {
                warn!(host = %host, "session discarded after consecutive blocks");
            }
            warn!(host = %host, identity = %identity.id, "blocked: {reason}");
            return AttemptOutcome::Retryable(
                FetchError::blocked(format!("blocked by '{host}': {reason}"))
                    .with_status(response.status),
            );
        }

        let status = response.status;
        if status == 408 {
            return AttemptOutcome::Retryable(
                FetchError::timeout(format!("upstream timeout from '{host}'")).with_status(status),
            );
        }
        if RetryConfig::is_terminal_status(status) {
            return AttemptOutcome::Terminal(
                FetchError::network(format!("'{}' returned status {status}", target.url))
                    .with_status(status),
            );
        }
        if !response.is_success() {
            return AttemptOutcome::Retryable(
                FetchError::network(format!("'{}' returned status {status}", target.url))
                    .with_status(status),
            );
        }

        if response.body.trim().is_empty() {
            return AttemptOutcome::Retryable(
                FetchError::malformed(format!("empty body from '{}'", target.url))
                    .with_status(status),
            );
        }
        if target.content == ContentKind::Json
            && serde_json::from_str::<serde_json::Value>(&response.body).is_err()
        {
            return AttemptOutcome::Retryable(
                FetchError::malformed(format!("body from '{}' is not valid JSON", target.url))
                    .with_status(status),
            );
        }

        self.state
            .sessions
            .record_success(host, &response.set_cookies);
        AttemptOutcome::Success(RawPayload::new(
            target.url.clone(),
            target.content,
            response.body,
        ))
    }

    fn block_reason(&self, response: &HttpResponse) -> Option<String> {
        if matches!(response.status, 403 | 429) {
            return Some(format!("status {}", response.status));
        }

        let lowered = response.body.to_lowercase();
        self.settings
            .block_signatures
            .iter()
            .find(|signature| !signature.is_empty() && lowered.contains(signature.as_str()))
            .map(|signature| format!("body matched '{signature}'"))
    }

    /// Seed failures are logged and left to the API call's own retry loop.
    async fn seed_session(&self, host: &str, seed_url: &str, target: &FetchTarget) {
        let seed_host = match host_of(seed_url) {
            Ok(seed_host) => seed_host,
            Err(error) => {
                warn!(host = %host, "skipping session seed: {}", error.message());
                return;
            }
        };

        let identity = self.state.identities.select(seed_url);
        let mut request = HttpRequest::get(seed_url)
            .with_header("user-agent", &identity.user_agent)
            .with_timeout_ms(duration_ms(target.timeout));
        for (name, value) in &identity.headers {
            request = request.with_header(name, value);
        }

        match self.execute(&seed_host, request, target.timeout).await {
            Ok(response) if response.is_success() && self.block_reason(&response).is_none() => {
                debug!(host = %host, cookies = response.set_cookies.len(), "session seeded");
                self.state.sessions.mark_seeded(host, &response.set_cookies);
            }
            Ok(response) => {
                debug!(host = %host, status = response.status, "session seed rejected");
            }
            Err(error) => {
                debug!(host = %host, "session seed failed: {}", error.message());
            }
        }
    }
}

impl std::fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchClient")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .finish()
    }
}

fn host_of(url: &str) -> Result<String, FetchError> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_owned))
        .ok_or_else(|| FetchError::network(format!("invalid url '{url}'")))
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::http_client::ScriptedHttpClient;
    use crate::retry::Backoff;

    const API: &str = "https://api.test/data";

    fn client(script: &ScriptedHttpClient, max_retries: u32) -> FetchClient {
        let state = FetchState::new(
            SessionTable::new(Duration::from_secs(600)),
            IdentityPool::from_user_agents(["ua-1", "ua-2", "ua-3"], Duration::from_secs(60))
                .expect("pool"),
            HostGate::disabled(),
            CircuitBreakers::new(CircuitBreakerConfig {
                failure_threshold: 2,
                open_timeout: Duration::from_secs(60),
            }),
        );
        FetchClient::new(
            Arc::new(script.clone()),
            Arc::new(state),
            FetchSettings {
                retry: RetryConfig::new(
                    max_retries,
                    Backoff {
                        base: Duration::from_millis(1),
                        max: Duration::from_millis(2),
                        jitter: false,
                    },
                ),
                ..FetchSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn retries_after_block_with_a_different_identity() {
        let script = ScriptedHttpClient::new();
        script.push(API, Ok(HttpResponse::new(403, "Access Denied")));
        script.push(API, Ok(HttpResponse::ok("[]")));
        let client = client(&script, 3);

        let payload = client.fetch(&FetchTarget::json(API)).await.expect("payload");
        assert_eq!(payload.body, "[]");

        let requests = script.requests_to(API);
        assert_eq!(requests.len(), 2);
        assert_ne!(
            requests[0].header("user-agent"),
            requests[1].header("user-agent")
        );
    }

    #[tokio::test]
    async fn block_signature_in_ok_body_counts_as_block() {
        let script = ScriptedHttpClient::new();
        script.always(API, Ok(HttpResponse::ok("<title>Just a moment...</title>")));
        let client = client(&script, 2);

        let err = client
            .fetch(&FetchTarget::html(API))
            .await
            .expect_err("blocked");
        assert_eq!(err.kind(), FetchErrorKind::Blocked);
        assert_eq!(client.state().identities.cooling_down(API).len(), 2);
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let script = ScriptedHttpClient::new();
        script.always(API, Ok(HttpResponse::ok("<html>oops</html>")));
        let client = client(&script, 1);

        let err = client.fetch(&FetchTarget::json(API)).await.expect_err("malformed");
        assert_eq!(err.kind(), FetchErrorKind::Malformed);
        assert_eq!(err.code(), "fetch.malformed");
    }

    #[tokio::test]
    async fn not_found_ends_loop_immediately() {
        let script = ScriptedHttpClient::new();
        script.always(API, Ok(HttpResponse::new(404, "missing")));
        let client = client(&script, 3);

        let err = client.fetch(&FetchTarget::json(API)).await.expect_err("terminal");
        assert_eq!(err.kind(), FetchErrorKind::Network);
        assert_eq!(err.status(), Some(404));
        assert_eq!(script.calls_to(API), 1);
    }

    #[tokio::test]
    async fn transport_timeouts_map_to_timeout_kind() {
        let script = ScriptedHttpClient::new();
        script.always(API, Err(HttpError::timeout("slow")));
        let client = client(&script, 2);

        let err = client.fetch(&FetchTarget::json(API)).await.expect_err("timeout");
        assert_eq!(err.kind(), FetchErrorKind::Timeout);
        assert_eq!(script.calls_to(API), 2);
    }

    #[tokio::test]
    async fn slow_transport_is_cut_by_target_timeout() {
        let script = ScriptedHttpClient::new().with_delay(Duration::from_millis(200));
        script.always(API, Ok(HttpResponse::ok("[]")));
        let client = client(&script, 1);

        let target = FetchTarget::json(API).with_timeout(Duration::from_millis(10));
        let err = client.fetch(&target).await.expect_err("timeout");
        assert_eq!(err.kind(), FetchErrorKind::Timeout);
    }

    #[tokio::test]
    async fn seeds_session_and_replays_cookies() {
        let script = ScriptedHttpClient::new();
        script.always(
            "https://api.test/home",
            Ok(HttpResponse::ok("<html></html>").with_cookie("nsit=abc; Path=/")),
        );
        script.always(API, Ok(HttpResponse::ok("{}")));
        let client = client(&script, 1);

        let target = FetchTarget::json(API).with_session_seed("https://api.test/home");
        client.fetch(&target).await.expect("payload");
        client.fetch(&target).await.expect("payload");

        assert_eq!(script.calls_to("https://api.test/home"), 1);
        let api_requests = script.requests_to(API);
        assert_eq!(api_requests[0].header("cookie"), Some("nsit=abc"));
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_with_last_kind() {
        let script = ScriptedHttpClient::new();
        script.always(API, Ok(HttpResponse::new(429, "")));
        let client = client(&script, 1);

        for _ in 0..2 {
            let _ = client.fetch(&FetchTarget::json(API)).await;
        }
        let breaker = client.state().breakers.for_host("api.test");
        assert_eq!(breaker.state(), CircuitState::Open);

        let calls_before = script.total_calls();
        let err = client.fetch(&FetchTarget::json(API)).await.expect_err("open");
        assert_eq!(err.kind(), FetchErrorKind::Blocked);
        assert_eq!(script.total_calls(), calls_before);
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_without_calls() {
        let script = ScriptedHttpClient::new();
        let client = client(&script, 3);

        let err = client
            .fetch(&FetchTarget::json("not a url"))
            .await
            .expect_err("invalid");
        assert_eq!(err.kind(), FetchErrorKind::Network);
        assert_eq!(script.total_calls(), 0);
    }
}
