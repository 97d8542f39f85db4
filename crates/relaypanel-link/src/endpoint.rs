//! Agent endpoint identity

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use crate::error::LinkError;

/// Address and credentials of one relay agent.
///
/// Two endpoints are the same agent only if every field matches, so changing
/// a node's address or credentials yields a fresh link.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AgentEndpoint {
    pub node_id: i64,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AgentEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEndpoint")
            .field("node_id", &self.node_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish()
    }
}

impl AgentEndpoint {
    pub fn new(node_id: i64, host: impl Into<String>, port: u16) -> Self {
        Self {
            node_id,
            host: host.into(),
            port,
            username: String::new(),
            password: String::new(),
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}:{}{}", self.host, self.port, path)
    }

    /// Build the WebSocket handshake request, with basic auth when a username is set
    pub(crate) fn handshake_request(&self, path: &str) -> Result<Request, LinkError> {
        let url = self.url(path);
        url::Url::parse(&url).map_err(|e| LinkError::InvalidEndpoint(format!("{}: {}", url, e)))?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| LinkError::InvalidEndpoint(format!("{}: {}", url, e)))?;

        if !self.username.is_empty() {
            let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
            let value = HeaderValue::from_str(&format!("Basic {}", token))
                .map_err(|e| LinkError::InvalidEndpoint(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url() {
        let endpoint = AgentEndpoint::new(1, "10.0.0.5", 18080);
        assert_eq!(endpoint.url("/api"), "ws://10.0.0.5:18080/api");
    }

    #[test]
    fn test_basic_auth_header() {
        let endpoint = AgentEndpoint::new(1, "10.0.0.5", 18080).with_credentials("admin", "pw");
        let request = endpoint.handshake_request("/api").unwrap();
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Basic YWRtaW46cHc="
        );
    }

    #[test]
    fn test_no_credentials_no_header() {
        let request = AgentEndpoint::new(1, "localhost", 80)
            .handshake_request("/api")
            .unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_invalid_host_rejected() {
        let result = AgentEndpoint::new(1, "bad host", 80).handshake_request("/api");
        assert!(matches!(result, Err(LinkError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_debug_hides_password() {
        let endpoint = AgentEndpoint::new(1, "h", 1).with_credentials("u", "secret-pw");
        assert!(!format!("{:?}", endpoint).contains("secret-pw"));
    }
}
