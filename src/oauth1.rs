//! OAuth1 (RFC 5849) request signing, HMAC-SHA1 only.
//!
//! Signing is a pure step between building and sending a request: a
//! [`SigningContext`] is assembled fresh for every request from the current
//! credentials and applied to an `http::Request` together with a
//! [`ProtocolParams`] (timestamp + nonce). Nothing here holds shared state.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use http::{Request, Uri};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha1::Sha1;
use std::borrow::Cow;
use std::fmt;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const OAUTH_VERSION: &str = "1.0";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const NONCE_LEN: usize = 32;

#[derive(Debug)]
pub enum SigningError {
    /// The request must be signed on behalf of a user but no token is held.
    MissingResourceOwner,
    InvalidUri(String),
    InvalidHeader(String),
}

impl fmt::Display for SigningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningError::MissingResourceOwner => {
                write!(f, "resource-owner credentials required but not available (not authenticated yet?)")
            }
            SigningError::InvalidUri(s) => write!(f, "cannot sign uri: {}", s),
            SigningError::InvalidHeader(s) => write!(f, "cannot build authorization header: {}", s),
        }
    }
}

impl std::error::Error for SigningError {}

/// A key/secret pair, used for both the consumer (application) and the
/// resource owner (user session).
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Credentials {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Where the protocol parameters end up on the signed request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Placement {
    #[default]
    Header,
    Query,
}

/// Everything needed to sign one request.
#[derive(Debug, Clone)]
pub struct SigningContext {
    consumer: Credentials,
    token: Option<Credentials>,
    require_token: bool,
    placement: Placement,
}

impl SigningContext {
    /// Consumer-only signing (no user session yet).
    pub fn two_legged(consumer: Credentials) -> Self {
        SigningContext {
            consumer,
            token: None,
            require_token: false,
            placement: Placement::Header,
        }
    }

    /// Signing on behalf of a user; `sign` fails when `token` is `None`.
    pub fn three_legged(consumer: Credentials, token: Option<Credentials>) -> Self {
        SigningContext {
            consumer,
            token,
            require_token: true,
            placement: Placement::Header,
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }
}

/// Per-request replay protection values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolParams {
    pub timestamp: i64,
    pub nonce: String,
}

impl ProtocolParams {
    pub fn fresh() -> Self {
        let nonce = rand::rng()
            .sample_iter(Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        ProtocolParams {
            timestamp: chrono::Utc::now().timestamp(),
            nonce,
        }
    }
}

/// Sign `req` in place. With [`Placement::Header`] an `Authorization` header is
/// set (replacing any previous one); with [`Placement::Query`] the protocol
/// parameters and signature are appended to the URI.
pub fn sign(ctx: &SigningContext, req: &mut Request<String>, params: &ProtocolParams) -> Result<(), SigningError> {
    let token = match (&ctx.token, ctx.require_token) {
        (Some(t), _) => Some(t),
        (None, true) => return Err(SigningError::MissingResourceOwner),
        (None, false) => None,
    };

    let mut oauth: Vec<(&str, String)> = vec![
        ("oauth_consumer_key", ctx.consumer.key.clone()),
        ("oauth_nonce", params.nonce.clone()),
        ("oauth_signature_method", SIGNATURE_METHOD.to_string()),
        ("oauth_timestamp", params.timestamp.to_string()),
    ];
    if let Some(t) = token {
        oauth.push(("oauth_token", t.key.clone()));
    }
    oauth.push(("oauth_version", OAUTH_VERSION.to_string()));

    let mut all: Vec<(String, String)> = oauth.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
    if let Some(query) = req.uri().query() {
        all.extend(form_pairs(query));
    }
    if is_form_body(req) {
        all.extend(form_pairs(req.body()));
    }

    let base = signature_base_string(req.method().as_str(), req.uri(), &all)?;
    let key = format!(
        "{}&{}",
        encode(&ctx.consumer.secret),
        encode(token.map(|t| t.secret.as_str()).unwrap_or(""))
    );
    let signature = hmac_sha1_base64(key.as_bytes(), base.as_bytes());
    oauth.push(("oauth_signature", signature));

    match ctx.placement {
        Placement::Header => {
            let realm = req.uri().to_string();
            let fields = oauth
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, encode(v)))
                .collect::<Vec<_>>()
                .join(", ");
            let value = format!("OAuth realm=\"{}\", {}", realm, fields);
            let header = HeaderValue::from_str(&value).map_err(|e| SigningError::InvalidHeader(e.to_string()))?;
            req.headers_mut().insert(AUTHORIZATION, header);
        }
        Placement::Query => {
            let extra = oauth
                .iter()
                .map(|(k, v)| format!("{}={}", k, encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            let current = req.uri().to_string();
            let sep = if req.uri().query().is_some() { '&' } else { '?' };
            let signed: Uri = format!("{}{}{}", current, sep, extra)
                .parse()
                .map_err(|e: http::uri::InvalidUri| SigningError::InvalidUri(e.to_string()))?;
            *req.uri_mut() = signed;
        }
    }
    Ok(())
}

/// `METHOD&enc(base-uri)&enc(normalized-params)` per RFC 5849 §3.4.1.
pub fn signature_base_string(method: &str, uri: &Uri, params: &[(String, String)]) -> Result<String, SigningError> {
    let mut encoded = params
        .iter()
        .map(|(k, v)| (encode(k).into_owned(), encode(v).into_owned()))
        .collect::<Vec<_>>();
    encoded.sort();
    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    Ok(format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(&base_string_uri(uri)?),
        encode(&normalized)
    ))
}

fn base_string_uri(uri: &Uri) -> Result<String, SigningError> {
    let scheme = uri
        .scheme_str()
        .ok_or_else(|| SigningError::InvalidUri(format!("{} has no scheme", uri)))?
        .to_ascii_lowercase();
    let host = uri
        .host()
        .ok_or_else(|| SigningError::InvalidUri(format!("{} has no host", uri)))?
        .to_ascii_lowercase();
    let port = match (scheme.as_str(), uri.port_u16()) {
        ("http", Some(80)) | ("https", Some(443)) | (_, None) => String::new(),
        (_, Some(p)) => format!(":{}", p),
    };
    let path = if uri.path().is_empty() { "/" } else { uri.path() };
    Ok(format!("{}://{}{}{}", scheme, host, port, path))
}

fn is_form_body(req: &Request<String>) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
        .unwrap_or(false)
}

pub(crate) fn hmac_sha1_base64(key: &[u8], data: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha1::new_from_slice(key) {
        Ok(m) => m,
        Err(_) => unreachable!("hmac key length is unrestricted"),
    };
    mac.update(data);
    BASE64.encode(mac.finalize().into_bytes())
}

/// RFC 3986 percent-encoding of everything outside the unreserved set.
pub fn encode(s: &str) -> Cow<'_, str> {
    urlencoding::encode(s)
}

/// Encode a form body (`k=v&k2=v2`) the way it is later decoded for signing.
pub fn form_encode(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn form_pairs(s: &str) -> Vec<(String, String)> {
    s.split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (form_decode(k), form_decode(v))
        })
        .collect()
}

fn form_decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced.clone(),
    }
}

/// Pull the protocol parameters back out of an `Authorization: OAuth ...`
/// header.
#[cfg(test)]
pub(crate) fn parse_authorization(value: &str) -> Vec<(String, String)> {
    value
        .trim()
        .strip_prefix("OAuth ")
        .unwrap_or(value)
        .split(", ")
        .filter_map(|field| {
            let (k, v) = field.split_once('=')?;
            let v = v.trim_matches('"');
            Some((k.trim().to_string(), form_decode(v)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn get(uri: &str) -> Request<String> {
        Request::builder().method(Method::GET).uri(uri).body(String::new()).unwrap()
    }

    fn fixed() -> ProtocolParams {
        ProtocolParams {
            timestamp: 1_700_000_000,
            nonce: "abc".to_string(),
        }
    }

    fn field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
        fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    #[test]
    fn base_string_normalizes_uri_and_sorts_params() {
        let uri: Uri = "https://Example.COM:443/users/bob?b=2&a=x%20y".parse().unwrap();
        let mut params = form_pairs(uri.query().unwrap());
        params.extend([
            ("oauth_consumer_key".to_string(), "ck".to_string()),
            ("oauth_nonce".to_string(), "abc".to_string()),
            ("oauth_signature_method".to_string(), SIGNATURE_METHOD.to_string()),
            ("oauth_timestamp".to_string(), "1700000000".to_string()),
            ("oauth_token".to_string(), "bob".to_string()),
            ("oauth_version".to_string(), OAUTH_VERSION.to_string()),
        ]);
        let base = signature_base_string("get", &uri, &params).unwrap();
        assert_eq!(
            base,
            "GET&https%3A%2F%2Fexample.com%2Fusers%2Fbob&a%3Dx%2520y%26b%3D2%26oauth_consumer_key%3Dck%26oauth_nonce%3Dabc%26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1700000000%26oauth_token%3Dbob%26oauth_version%3D1.0"
        );
    }

    #[test]
    fn non_default_port_is_kept() {
        let uri: Uri = "http://localhost:8080".parse().unwrap();
        assert_eq!(base_string_uri(&uri).unwrap(), "http://localhost:8080/");
    }

    #[test]
    fn matches_published_hmac_sha1_vector() {
        let ctx = SigningContext::three_legged(
            Credentials::new("xvz1evFS4wEEPTGEFPHBog", "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw"),
            Some(Credentials::new(
                "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
                "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
            )),
        );
        let mut req = Request::builder()
            .method(Method::POST)
            .uri("https://api.twitter.com/1.1/statuses/update.json?include_entities=true")
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body("status=Hello%20Ladies%20%2B%20Gentlemen%2C%20a%20signed%20OAuth%20request%21".to_string())
            .unwrap();
        let params = ProtocolParams {
            timestamp: 1_318_622_958,
            nonce: "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg".to_string(),
        };

        sign(&ctx, &mut req, &params).unwrap();

        let header = req.headers().get(AUTHORIZATION).unwrap().to_str().unwrap();
        let fields = parse_authorization(header);
        assert_eq!(field(&fields, "oauth_signature"), Some("hCtSmYh+iHYCEqBWrE7C7hYmtUk="));
    }

    #[test]
    fn header_carries_token_and_realm() {
        let ctx = SigningContext::three_legged(Credentials::new("ck", "cs"), Some(Credentials::new("bob", "tok")));
        let mut req = get("https://api.example.com/users/bob");
        sign(&ctx, &mut req, &fixed()).unwrap();

        let header = req.headers().get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert!(header.starts_with("OAuth realm=\"https://api.example.com/users/bob\", "));
        let fields = parse_authorization(header);
        assert_eq!(field(&fields, "oauth_token"), Some("bob"));
        assert_eq!(field(&fields, "oauth_consumer_key"), Some("ck"));
        assert_eq!(field(&fields, "oauth_nonce"), Some("abc"));

        let uri: Uri = "https://api.example.com/users/bob".parse().unwrap();
        let params = fields
            .iter()
            .filter(|(k, _)| k.starts_with("oauth_") && k != "oauth_signature")
            .cloned()
            .collect::<Vec<_>>();
        let base = signature_base_string("GET", &uri, &params).unwrap();
        assert_eq!(
            field(&fields, "oauth_signature").unwrap(),
            hmac_sha1_base64(b"cs&tok", base.as_bytes())
        );
    }

    #[test]
    fn three_legged_without_token_is_rejected() {
        let ctx = SigningContext::three_legged(Credentials::new("ck", "cs"), None);
        let mut req = get("https://api.example.com/users/bob");
        let err = sign(&ctx, &mut req, &fixed()).unwrap_err();
        assert!(matches!(err, SigningError::MissingResourceOwner));
        assert!(req.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn two_legged_omits_token() {
        let ctx = SigningContext::two_legged(Credentials::new("ck", "cs"));
        let mut req = get("https://api.example.com/users/authenticated");
        sign(&ctx, &mut req, &fixed()).unwrap();
        let header = req.headers().get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert!(field(&parse_authorization(header), "oauth_token").is_none());
    }

    #[test]
    fn query_placement_rewrites_uri() {
        let ctx = SigningContext::three_legged(Credentials::new("ck", "cs"), Some(Credentials::new("bob", "tok")))
            .with_placement(Placement::Query);
        let mut req = get("https://api.example.com/systems/S1/energy?x=1");
        sign(&ctx, &mut req, &fixed()).unwrap();

        assert!(req.headers().get(AUTHORIZATION).is_none());
        let query = req.uri().query().unwrap();
        assert!(query.starts_with("x=1&oauth_consumer_key=ck&"));
        assert!(query.contains("oauth_signature="));
        assert!(query.contains("oauth_token=bob"));
    }

    #[test]
    fn signatures_differ_per_nonce() {
        let ctx = SigningContext::three_legged(Credentials::new("ck", "cs"), Some(Credentials::new("bob", "tok")));
        let mut a = get("https://api.example.com/users/bob");
        let mut b = get("https://api.example.com/users/bob");
        sign(&ctx, &mut a, &ProtocolParams::fresh()).unwrap();
        sign(&ctx, &mut b, &ProtocolParams::fresh()).unwrap();
        assert_ne!(a.headers().get(AUTHORIZATION), b.headers().get(AUTHORIZATION));
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let dbg = format!("{:?}", Credentials::new("ck", "very-secret"));
        assert!(!dbg.contains("very-secret"));
    }
}
