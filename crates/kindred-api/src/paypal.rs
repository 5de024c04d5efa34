//! PayPal REST (v1 payments) client.

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

use kindred_core::gateway::{CreatedPayment, GatewayError, PaymentGateway, RefundReceipt};

pub const SANDBOX_URL: &str = "https://api-m.sandbox.paypal.com";

#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub base_url: String,
    pub client_id: Option<String>,
    pub secret: Option<String>,
    pub return_url: String,
    pub cancel_url: String,
}

pub struct PayPalClient {
    http: reqwest::Client,
    config: PayPalConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl PayPalClient {
    pub fn new(config: PayPalConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Client-credentials grant. A fresh token is requested per call.
    async fn access_token(&self) -> Result<String, GatewayError> {
        let (Some(client_id), Some(secret)) = (&self.config.client_id, &self.config.secret) else {
            return Err(GatewayError::NotConfigured);
        };

        let response = self
            .http
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(client_id, Some(secret))
            .header("Accept", "application/json")
            .header("Accept-Language", "en_US")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let token: TokenResponse = expect_status(response, StatusCode::OK).await?;
        Ok(token.access_token)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, GatewayError> {
        let token = self.access_token().await?;
        debug!("POST {}", path);

        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        expect_status(response, StatusCode::CREATED).await
    }
}

async fn expect_status<T: DeserializeOwned>(
    response: reqwest::Response,
    expected: StatusCode,
) -> Result<T, GatewayError> {
    let status = response.status();
    if status != expected {
        let body = response.text().await.unwrap_or_default();
        return Err(GatewayError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| GatewayError::Malformed(e.to_string()))
}

fn money(amount: Decimal, currency: &str) -> Value {
    json!({
        "total": format!("{:.2}", amount),
        "currency": currency,
    })
}

fn payment_body(method: &str, amount: Decimal, currency: &str, config: &PayPalConfig) -> Value {
    json!({
        "intent": "sale",
        "payer": { "payment_method": method },
        "transactions": [{
            "amount": money(amount, currency),
            "description": "Donation payment",
        }],
        "redirect_urls": {
            "return_url": config.return_url,
            "cancel_url": config.cancel_url,
        },
    })
}

fn refund_body(amount: Decimal, currency: &str) -> Value {
    json!({ "amount": money(amount, currency) })
}

#[async_trait]
impl PaymentGateway for PayPalClient {
    async fn create_payment(
        &self,
        method: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<CreatedPayment, GatewayError> {
        let body = payment_body(method, amount, currency, &self.config);
        let created: CreatedPayment = self.post_json("/v1/payments/payment", &body).await?;
        info!("PayPal payment {} is {}", created.id, created.state);
        Ok(created)
    }

    async fn refund_payment(
        &self,
        provider_ref: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<RefundReceipt, GatewayError> {
        let path = format!("/v1/payments/sale/{}/refund", provider_ref);
        self.post_json(&path, &refund_body(amount, currency)).await
    }
}
