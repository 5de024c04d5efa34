use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderLink {
    pub href: String,
    pub rel: String,
    #[serde(default)]
    pub method: Option<String>,
}

/// Provider's answer to a payment creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPayment {
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub links: Vec<ProviderLink>,
}

impl CreatedPayment {
    /// Where the payer must be sent to approve the payment.
    pub fn approval_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "approval_url")
            .map(|l| l.href.as_str())
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.state.as_str(), "created" | "approved")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefundReceipt {
    #[serde(default)]
    pub id: Option<String>,
    pub state: String,
}

/// Anything that went wrong talking to the payment provider. Callers treat
/// every variant the same way; the detail is only for logs.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment provider is not configured")]
    NotConfigured,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider answered {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected provider response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(
        &self,
        method: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<CreatedPayment, GatewayError>;

    async fn refund_payment(
        &self,
        provider_ref: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<RefundReceipt, GatewayError>;
}
