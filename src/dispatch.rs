//! Proxied request helper.

use std::sync::Arc;

use tracing::debug;

use crate::api::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::AuthError;
use crate::session::AuthSession;

/// Issues proxied requests with authentication headers attached, retrying
/// exactly once when the upstream demands a DPoP nonce.
pub struct RequestDispatcher {
    session: AuthSession,
    transport: Arc<dyn HttpTransport>,
}

impl RequestDispatcher {
    pub fn new(session: AuthSession, transport: Arc<dyn HttpTransport>) -> Self {
        Self { session, transport }
    }

    /// Send `method url`, attaching `Authorization`/`DPoP` plus
    /// `extra_headers`.
    ///
    /// On a `401` carrying a `DPoP-Nonce` header, fresh headers are obtained
    /// with that nonce and the request is resent once. Any other response is
    /// returned unchanged; there is never a second retry.
    pub async fn send(
        &self,
        method: &str,
        url: &str,
        body: Option<Vec<u8>>,
        extra_headers: &[(String, String)],
    ) -> Result<HttpResponse, AuthError> {
        let response = self
            .issue(method, url, body.clone(), extra_headers, None)
            .await?;

        if response.status == 401 {
            if let Some(nonce) = response.headers.get("DPoP-Nonce").map(str::to_string) {
                debug!(url, "upstream demanded a DPoP nonce; retrying once");
                return self.issue(method, url, body, extra_headers, Some(&nonce)).await;
            }
        }
        Ok(response)
    }

    async fn issue(
        &self,
        method: &str,
        url: &str,
        body: Option<Vec<u8>>,
        extra_headers: &[(String, String)],
        nonce: Option<&str>,
    ) -> Result<HttpResponse, AuthError> {
        let context = self.session.headers(url, method, nonce).await?;

        let mut request = HttpRequest::new(method, url)
            .header("Authorization", &format!("Bearer {}", context.bearer))
            .header("DPoP", &context.dpop);
        for (name, value) in extra_headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        Ok(self.transport.execute(request).await?)
    }
}
