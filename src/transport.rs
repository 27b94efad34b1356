//! HTTP transport seam. The client builds and signs `http::Request`s and hands
//! them to an [`HttpTransport`]; production uses a blocking `ureq` agent.

use http::{Request, StatusCode};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

impl From<ureq::Error> for TransportError {
    fn from(value: ureq::Error) -> Self {
        TransportError(value.to_string())
    }
}

/// Status and fully read body of a response, whatever its status code.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RawResponse {
    pub fn reason(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("<unknown status>")
    }
}

pub trait HttpTransport: Send + Sync {
    fn send(&self, request: Request<String>) -> Result<RawResponse, TransportError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        // Non-2xx responses come back as values so their bodies can be reported.
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();
        UreqTransport { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl HttpTransport for UreqTransport {
    fn send(&self, request: Request<String>) -> Result<RawResponse, TransportError> {
        let response = if request.body().is_empty() {
            self.agent.run(request.map(|_| ()))?
        } else {
            self.agent.run(request)?
        };
        let status = response.status();
        let body = match response.into_body().read_to_string() {
            Ok(body) => body,
            // A truncated error page still reports its status.
            Err(e) if !status.is_success() => format!("<body unreadable: {}>", e),
            Err(e) => return Err(e.into()),
        };
        Ok(RawResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one response that promises more body than it sends, then hang up.
    fn truncated_server(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let head = format!("{}\r\nContent-Type: application/json\r\nContent-Length: 1000\r\n\r\n", status_line);
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(b"{\"a\":").unwrap();
        });
        format!("http://{}/systems/S1/odu_status", addr)
    }

    fn get(url: &str) -> Request<String> {
        Request::builder().uri(url).body(String::new()).unwrap()
    }

    #[test]
    fn body_cut_short_on_success_is_a_transport_error() {
        let url = truncated_server("HTTP/1.1 200 OK");
        let err = UreqTransport::new(Duration::from_secs(5)).send(get(&url)).unwrap_err();
        assert!(!err.0.is_empty());
    }

    #[test]
    fn body_cut_short_on_error_status_keeps_status() {
        let url = truncated_server("HTTP/1.1 503 Service Unavailable");
        let resp = UreqTransport::new(Duration::from_secs(5)).send(get(&url)).unwrap();
        assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(resp.body.starts_with("<body unreadable"), "{}", resp.body);
    }
}

/// Recording in-process transport for unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    type Responder = dyn Fn(&Request<String>) -> Result<RawResponse, TransportError> + Send + Sync;

    pub(crate) struct FakeTransport {
        responder: Box<Responder>,
        pub(crate) requests: Mutex<Vec<Request<String>>>,
    }

    impl FakeTransport {
        pub(crate) fn new(
            responder: impl Fn(&Request<String>) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
        ) -> Self {
            FakeTransport {
                responder: Box::new(responder),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn count(&self, path: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.uri().path() == path)
                .count()
        }
    }

    impl HttpTransport for FakeTransport {
        fn send(&self, request: Request<String>) -> Result<RawResponse, TransportError> {
            let response = (self.responder)(&request);
            self.requests.lock().unwrap().push(request);
            response
        }
    }

    pub(crate) fn respond(status: u16, body: &str) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        })
    }
}
