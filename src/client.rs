//! Blocking HTTP client for the Carrier Infinity/Evolution cloud API.
//!
//! - Every request goes through build -> sign -> send; signing is OAuth1
//!   HMAC-SHA1 (see `crate::oauth1`).
//! - Responses are returned as `serde_json::Value` except where a typed model
//!   exists (`OduStatus`, `EnergyReport`, normalized locations).
//!
//! Authentication
//! - One POST to `users/authenticated` with an XML credentials document in the
//!   `data` form field, signed with the consumer credentials only.
//! - `result.accessToken` becomes the OAuth1 token secret (token key = user
//!   name) for every later call. It is kept for the life of the client.

use http::header::{ACCEPT, CONTENT_TYPE};
use http::{Method, Request};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::models::carrier::{AuthResponse, EnergyReport, OduStatus, SystemItem};
use crate::normalize::{Locations, NormalizeError, normalize_locations};
use crate::oauth1::{self, Credentials, FORM_CONTENT_TYPE, Placement, ProtocolParams, SigningContext, SigningError};
use crate::transport::{HttpTransport, RawResponse, TransportError, UreqTransport};
use crate::utils::decode_str;

pub const DEFAULT_BASE_URL: &str = "https://www.app-api.ing.carrier.com";
const FEATURESET_HEADER: &str = "featureset";
const FEATURESET: &str = "CONSUMER_PORTAL";
const ACCEPT_JSON: &str = "application/json";
const LOGIN_PATH: [&str; 2] = ["users", "authenticated"];

#[derive(Debug)]
pub enum CarrierClientError {
    Transport(TransportError),
    Signing(SigningError),
    Http { status: u16, reason: String, body: String },
    Decode { path: String, message: String },
    Malformed(NormalizeError),
    InvalidRequest(String),
}

impl CarrierClientError {
    /// Worth trying again later: connection trouble, throttling, server errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            CarrierClientError::Transport(_) => true,
            CarrierClientError::Http { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

impl fmt::Display for CarrierClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarrierClientError::Transport(e) => write!(f, "{}", e),
            CarrierClientError::Signing(e) => write!(f, "signing error: {}", e),
            CarrierClientError::Http { status, reason, body } => write!(f, "http {} {}: {}", status, reason, body),
            CarrierClientError::Decode { path, message } => write!(f, "unexpected response at {}: {}", path, message),
            CarrierClientError::Malformed(e) => write!(f, "malformed response: {}", e),
            CarrierClientError::InvalidRequest(s) => write!(f, "invalid request: {}", s),
        }
    }
}

impl std::error::Error for CarrierClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CarrierClientError::Transport(e) => Some(e),
            CarrierClientError::Signing(e) => Some(e),
            CarrierClientError::Malformed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for CarrierClientError {
    fn from(value: TransportError) -> Self {
        CarrierClientError::Transport(value)
    }
}

impl From<SigningError> for CarrierClientError {
    fn from(value: SigningError) -> Self {
        CarrierClientError::Signing(value)
    }
}

impl From<NormalizeError> for CarrierClientError {
    fn from(value: NormalizeError) -> Self {
        CarrierClientError::Malformed(value)
    }
}

impl From<(String, String)> for CarrierClientError {
    fn from((path, message): (String, String)) -> Self {
        CarrierClientError::Decode { path, message }
    }
}

impl From<http::Error> for CarrierClientError {
    fn from(value: http::Error) -> Self {
        CarrierClientError::InvalidRequest(value.to_string())
    }
}

/// End-user login.
#[derive(Clone)]
pub struct UserCredentials {
    pub user_name: String,
    pub password: String,
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
struct Session {
    access_token: String,
}

pub struct CarrierClient<T: HttpTransport = UreqTransport> {
    transport: T,
    base_url: String,
    consumer: Credentials,
    user: UserCredentials,
    placement: Placement,
    // `None` = unauthenticated; the lock is held for the whole login exchange.
    session: Mutex<Option<Session>>,
}

impl CarrierClient<UreqTransport> {
    pub fn new(base_url: impl Into<String>, consumer: Credentials, user: UserCredentials) -> Self {
        Self::with_transport(UreqTransport::default(), base_url, consumer, user)
    }
}

impl<T: HttpTransport> CarrierClient<T> {
    pub fn with_transport(transport: T, base_url: impl Into<String>, consumer: Credentials, user: UserCredentials) -> Self {
        CarrierClient {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            consumer,
            user,
            placement: Placement::Header,
            session: Mutex::new(None),
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn user_name(&self) -> &str {
        &self.user.user_name
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.push_str(&encode_path_segment(segment));
        }
        url
    }

    // ---- pipeline stages ----

    fn build_request(&self, method: Method, url: &str, form: Option<String>) -> Result<Request<String>, CarrierClientError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(url)
            .header(FEATURESET_HEADER, FEATURESET)
            .header(ACCEPT, ACCEPT_JSON);
        if form.is_some() {
            builder = builder.header(CONTENT_TYPE, FORM_CONTENT_TYPE);
        }
        Ok(builder.body(form.unwrap_or_default())?)
    }

    fn sign_request(&self, ctx: &SigningContext, mut req: Request<String>) -> Result<Request<String>, CarrierClientError> {
        oauth1::sign(ctx, &mut req, &ProtocolParams::fresh())?;
        Ok(req)
    }

    fn send_request(&self, req: Request<String>) -> Result<String, CarrierClientError> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let resp = self.transport.send(req)?;
        debug!("{} {} -> {}", method, path, resp.status.as_u16());
        ensure_ok(resp)
    }

    // ---- session ----

    pub fn is_authenticated(&self) -> bool {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Log in unless a token is already held; concurrent callers wait for the
    /// one in-flight login instead of starting their own.
    pub fn ensure_authenticated(&self) -> Result<(), CarrierClientError> {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.is_some() {
            return Ok(());
        }

        info!("Logging in to Carrier API as {}", self.user.user_name);
        let xml = credentials_xml(&self.user);
        let form = oauth1::form_encode(&[("data", xml.as_str())]);
        let req = self.build_request(Method::POST, &self.url(&LOGIN_PATH), Some(form))?;
        let ctx = SigningContext::two_legged(self.consumer.clone()).with_placement(self.placement);
        let req = self.sign_request(&ctx, req)?;
        let body = self.send_request(req)?;
        let auth: AuthResponse = decode_str(&body)?;

        *session = Some(Session {
            access_token: auth.result.access_token,
        });
        info!("Authenticated to Carrier API");
        Ok(())
    }

    fn signing_context(&self) -> SigningContext {
        let token = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| Credentials::new(self.user.user_name.clone(), s.access_token.clone()));
        SigningContext::three_legged(self.consumer.clone(), token).with_placement(self.placement)
    }

    // ---- requests ----

    fn request_json<R: DeserializeOwned>(&self, method: Method, segments: &[&str]) -> Result<R, CarrierClientError> {
        self.ensure_authenticated()?;
        let req = self.build_request(method, &self.url(segments), None)?;
        let req = self.sign_request(&self.signing_context(), req)?;
        let body = self.send_request(req)?;
        Ok(decode_str(&body)?)
    }

    fn get_json<R: DeserializeOwned>(&self, segments: &[&str]) -> Result<R, CarrierClientError> {
        self.request_json(Method::GET, segments)
    }

    pub fn get_user_info(&self) -> Result<Value, CarrierClientError> {
        self.get_json(&["users", self.user.user_name.as_str()])
    }

    pub fn get_locations_raw(&self) -> Result<Value, CarrierClientError> {
        self.get_json(&["users", self.user.user_name.as_str(), "locations"])
    }

    /// Locations keyed by id, each with its systems keyed by serial number.
    pub fn get_locations(&self) -> Result<Locations, CarrierClientError> {
        let raw = self.get_locations_raw()?;
        Ok(normalize_locations(&raw)?)
    }

    pub fn get_location(&self, location_id: &str) -> Result<Value, CarrierClientError> {
        self.get_json(&["locations", location_id])
    }

    /// `systems/{serial}/{item}`. Note the vendor fails `SystemItem::Status`.
    pub fn get_system_item(&self, serial_number: &str, item: SystemItem) -> Result<Value, CarrierClientError> {
        self.get_json(&["systems", serial_number, item.as_str()])
    }

    pub fn get_odu_status(&self, serial_number: &str) -> Result<OduStatus, CarrierClientError> {
        let raw = self.get_system_item(serial_number, SystemItem::OduStatus)?;
        Ok(OduStatus::from_payload(&raw)?)
    }

    pub fn get_energy(&self, serial_number: &str) -> Result<EnergyReport, CarrierClientError> {
        let raw = self.get_system_item(serial_number, SystemItem::Energy)?;
        Ok(EnergyReport::from_payload(&raw)?)
    }
}

fn ensure_ok(resp: RawResponse) -> Result<String, CarrierClientError> {
    if resp.status.as_u16() == 200 {
        Ok(resp.body)
    } else {
        Err(CarrierClientError::Http {
            status: resp.status.as_u16(),
            reason: resp.reason().to_string(),
            body: resp.body,
        })
    }
}

fn credentials_xml(user: &UserCredentials) -> String {
    format!(
        "<credentials><username>{}</username><password>{}</password></credentials>",
        xml_escape(&user.user_name),
        xml_escape(&user.password)
    )
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Percent-encode a path segment, leaving RFC 3986 `pchar`s (including `@`)
/// alone so user e-mails read naturally in the URL.
fn encode_path_segment(segment: &str) -> String {
    const KEEP: &[u8] = b"-._~!$&'()*+,;=:@";
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        if b.is_ascii_alphanumeric() || KEEP.contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}
