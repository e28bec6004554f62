//! Stripe payment processor client.
//!
//! Implements the invoice operations the reconciler needs: fetch, void,
//! create, add line items, issue credit notes, finalize, and send. Every
//! call is scoped to the organization's Connect sub-account via the
//! `Stripe-Account` header, and the HTTP client carries a bounded timeout
//! so a processor outage surfaces as an error instead of hanging.

use crate::config::StripeConfig;
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const STRIPE_ACCOUNT_HEADER: &str = "Stripe-Account";

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("stripe rejected the request ({status}): {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("stripe request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected stripe response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Stripe invoice, reduced to the fields this subsystem reads.
/// All amounts are in the currency's minor unit.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    pub status: String,
    pub customer: String,
    pub currency: String,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub hosted_invoice_url: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceItemObject {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub invoice: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditNoteObject {
    pub id: String,
    pub amount: i64,
    pub invoice: String,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: String,
}

fn parse_error_body(body: &str) -> (String, String) {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let code = envelope
                .error
                .code
                .or(envelope.error.kind)
                .unwrap_or_else(|| "unknown".to_string());
            (code, envelope.error.message)
        }
        Err(_) => ("unknown".to_string(), body.to_string()),
    }
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    /// Check if Stripe is configured (a secret key is set).
    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    pub async fn get_invoice(
        &self,
        account: &str,
        invoice_id: &str,
    ) -> Result<InvoiceObject, StripeError> {
        let url = format!("{}/invoices/{}", self.config.api_base_url, invoice_id);
        self.execute(account, self.client.get(&url), "get_invoice")
            .await
    }

    /// Create an invoice in draft state. `auto_advance` stays off so the
    /// reconciler controls when it finalizes.
    pub async fn create_invoice(
        &self,
        account: &str,
        customer: &str,
        currency: &str,
        description: Option<&str>,
        metadata: &[(&str, String)],
    ) -> Result<InvoiceObject, StripeError> {
        let mut params: Vec<(String, String)> = vec![
            ("customer".to_string(), customer.to_string()),
            ("currency".to_string(), currency.to_string()),
            ("auto_advance".to_string(), "false".to_string()),
            ("collection_method".to_string(), "send_invoice".to_string()),
            ("days_until_due".to_string(), "30".to_string()),
        ];
        if let Some(description) = description {
            params.push(("description".to_string(), description.to_string()));
        }
        for (key, value) in metadata {
            params.push((format!("metadata[{}]", key), value.clone()));
        }

        let url = format!("{}/invoices", self.config.api_base_url);
        let invoice: InvoiceObject = self
            .execute(account, self.client.post(&url).form(&params), "create_invoice")
            .await?;
        tracing::info!(
            invoice_id = %invoice.id,
            customer = %customer,
            "Stripe invoice created"
        );
        Ok(invoice)
    }

    /// Add a line item to a draft invoice. `amount_minor` may be negative
    /// for quantity decreases.
    pub async fn create_invoice_item(
        &self,
        account: &str,
        customer: &str,
        invoice_id: &str,
        amount_minor: i64,
        currency: &str,
        description: &str,
    ) -> Result<InvoiceItemObject, StripeError> {
        let params = [
            ("customer", customer.to_string()),
            ("invoice", invoice_id.to_string()),
            ("amount", amount_minor.to_string()),
            ("currency", currency.to_string()),
            ("description", description.to_string()),
        ];
        let url = format!("{}/invoiceitems", self.config.api_base_url);
        self.execute(
            account,
            self.client.post(&url).form(&params),
            "create_invoice_item",
        )
        .await
    }

    /// Credit a previously paid amount back to the customer, referencing
    /// the invoice the payment was made against.
    pub async fn create_credit_note(
        &self,
        account: &str,
        invoice_id: &str,
        amount_minor: i64,
        memo: Option<&str>,
    ) -> Result<CreditNoteObject, StripeError> {
        let mut params = vec![
            ("invoice", invoice_id.to_string()),
            ("amount", amount_minor.to_string()),
        ];
        if let Some(memo) = memo {
            params.push(("memo", memo.to_string()));
        }
        let url = format!("{}/credit_notes", self.config.api_base_url);
        let note: CreditNoteObject = self
            .execute(
                account,
                self.client.post(&url).form(&params),
                "create_credit_note",
            )
            .await?;
        tracing::info!(
            credit_note_id = %note.id,
            invoice_id = %invoice_id,
            amount = amount_minor,
            "Stripe credit note issued"
        );
        Ok(note)
    }

    pub async fn finalize_invoice(
        &self,
        account: &str,
        invoice_id: &str,
    ) -> Result<InvoiceObject, StripeError> {
        let url = format!(
            "{}/invoices/{}/finalize",
            self.config.api_base_url, invoice_id
        );
        self.execute(account, self.client.post(&url), "finalize_invoice")
            .await
    }

    pub async fn void_invoice(
        &self,
        account: &str,
        invoice_id: &str,
    ) -> Result<InvoiceObject, StripeError> {
        let url = format!("{}/invoices/{}/void", self.config.api_base_url, invoice_id);
        let invoice: InvoiceObject = self
            .execute(account, self.client.post(&url), "void_invoice")
            .await?;
        tracing::info!(invoice_id = %invoice.id, "Stripe invoice voided");
        Ok(invoice)
    }

    pub async fn send_invoice(
        &self,
        account: &str,
        invoice_id: &str,
    ) -> Result<InvoiceObject, StripeError> {
        let url = format!("{}/invoices/{}/send", self.config.api_base_url, invoice_id);
        self.execute(account, self.client.post(&url), "send_invoice")
            .await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        account: &str,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<T, StripeError> {
        let response = request
            .basic_auth(self.config.secret_key.expose_secret(), None::<&str>)
            .header(STRIPE_ACCOUNT_HEADER, account)
            .send()
            .await
            .map_err(|err| {
                super::metrics::record_processor_call(operation, "transport_error");
                err
            })?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, operation = operation, "Stripe response");

        if status.is_success() {
            super::metrics::record_processor_call(operation, "ok");
            Ok(serde_json::from_str(&body)?)
        } else {
            super::metrics::record_processor_call(operation, "api_error");
            let (code, message) = parse_error_body(&body);
            tracing::error!(
                status = %status,
                code = %code,
                message = %message,
                operation = operation,
                "Stripe request failed"
            );
            Err(StripeError::Api {
                status: status.as_u16(),
                code,
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> StripeConfig {
        StripeConfig {
            secret_key: Secret::new("sk_test_123".to_string()),
            api_base_url: base_url.to_string(),
            timeout_seconds: 5,
            send_invoices: false,
        }
    }

    #[test]
    fn error_body_parsing_prefers_code_then_type() {
        let body = r#"{"error":{"type":"invalid_request_error","code":"invoice_not_editable","message":"This invoice is finalized."}}"#;
        let (code, message) = parse_error_body(body);
        assert_eq!(code, "invoice_not_editable");
        assert_eq!(message, "This invoice is finalized.");

        let no_code = r#"{"error":{"type":"api_error","message":"Something went wrong."}}"#;
        let (code, _) = parse_error_body(no_code);
        assert_eq!(code, "api_error");
    }

    #[test]
    fn error_body_parsing_falls_back_to_raw_body() {
        let (code, message) = parse_error_body("upstream proxy timeout");
        assert_eq!(code, "unknown");
        assert_eq!(message, "upstream proxy timeout");
    }

    #[test]
    fn invoice_object_tolerates_missing_optional_fields() {
        let body = json!({
            "id": "in_123",
            "status": "draft",
            "customer": "cus_9",
            "currency": "usd"
        });
        let invoice: InvoiceObject = serde_json::from_value(body).unwrap();
        assert_eq!(invoice.total, 0);
        assert!(invoice.hosted_invoice_url.is_none());
        assert!(invoice.metadata.is_empty());
    }

    #[test]
    fn is_configured_requires_a_secret_key() {
        let client = StripeClient::new(test_config("https://api.stripe.com/v1")).unwrap();
        assert!(client.is_configured());

        let empty = StripeConfig {
            secret_key: Secret::new(String::new()),
            api_base_url: "https://api.stripe.com/v1".to_string(),
            timeout_seconds: 5,
            send_invoices: false,
        };
        let client = StripeClient::new(empty).unwrap();
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn get_invoice_scopes_the_call_to_the_sub_account() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/invoices/in_123"))
            .and(header("Stripe-Account", "acct_42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "in_123",
                "status": "open",
                "customer": "cus_9",
                "currency": "usd",
                "total": 20000,
                "amount_paid": 5000,
                "amount_due": 15000
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripeClient::new(test_config(&format!("{}/v1", server.uri()))).unwrap();
        let invoice = client.get_invoice("acct_42", "in_123").await.unwrap();

        assert_eq!(invoice.status, "open");
        assert_eq!(invoice.amount_paid, 5000);
    }

    #[tokio::test]
    async fn api_errors_surface_status_and_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/invoices/in_123/void"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "error": {
                    "type": "invalid_request_error",
                    "code": "invoice_already_voided",
                    "message": "Invoice is already void."
                }
            })))
            .mount(&server)
            .await;

        let client = StripeClient::new(test_config(&format!("{}/v1", server.uri()))).unwrap();
        let err = client.void_invoice("acct_42", "in_123").await.unwrap_err();

        match err {
            StripeError::Api { status, code, .. } => {
                assert_eq!(status, 402);
                assert_eq!(code, "invoice_already_voided");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }
}
