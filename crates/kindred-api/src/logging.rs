use axum::http::{HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Mask the local part of an e-mail address for log output, keeping the
/// first `visible` characters: `ljd@hotmail.com` becomes `lj*@hotmail.com`.
/// Input without an `@` is masked entirely.
pub fn obfuscate_email(email: &str, visible: usize) -> String {
    let Some((local, domain)) = email.split_once('@') else {
        return "*".repeat(email.chars().count());
    };

    let shown: String = local.chars().take(visible).collect();
    let hidden = local.chars().count().saturating_sub(visible);
    format!("{}{}@{}", shown, "*".repeat(hidden), domain)
}

/// Generates the correlation id attached to every request as `x-request-id`.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId {
    len: usize,
}

impl CorrelationId {
    /// Ids are hex, between 1 and 32 characters long.
    pub fn new(len: usize) -> Self {
        Self { len: len.clamp(1, 32) }
    }
}

impl MakeRequestId for CorrelationId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().simple().to_string();
        HeaderValue::from_str(&id[..self.len]).ok().map(RequestId::new)
    }
}
