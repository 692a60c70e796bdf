//! Route handlers for the guarded API.
//!
//! Every mutating handler walks the same ladder before its side effect:
//! same-origin, CSRF, rate limit. Webhooks skip the first two and verify a
//! signature over the raw body instead.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::http::context::{RequestContext, ResponseMutation};
use crate::http::error::GuardError;
use crate::http::gateway::RequestGateway;
use crate::observability::metrics;
use crate::security::identity::IdentityError;
use crate::security::origin::bearer_token;
use crate::security::verify_hmac_sha256_signature;

const MAX_CONTACT_MESSAGE_CHARS: usize = 5_000;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// The fields we log from a payment provider event. Everything else is ignored.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", alias = "event", default)]
    pub event_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub subject: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "request-guard",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Unmatched paths.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

fn ok_response(mut mutation: ResponseMutation, status: StatusCode) -> Response {
    mutation.status = Some(status);
    mutation.body = Some(json!({ "ok": true }));
    mutation.into_response()
}

/// Request a password reset email.
///
/// Always answers `200 {"ok":true}` once the origin and CSRF checks pass, whether
/// the email was malformed, rate limited, unknown or mailed. Only the
/// rate-limit headers differ. The email is sent after the response is built.
pub async fn password_reset(
    State(gateway): State<Arc<RequestGateway>>,
    request: Request<Body>,
) -> Response {
    let config = gateway.config();
    let (parts, body) = request.into_parts();
    let mut ctx = RequestContext::from_parts(&parts, config.security.trust_forwarded_for);

    if let Err(e) = gateway
        .enforce_same_origin(&ctx)
        .and_then(|_| gateway.enforce_csrf_token(&ctx))
    {
        return e.into_response();
    }

    let mut mutation = ResponseMutation::new();

    if let Err(e) = ctx.read_body(body, config.security.max_body_size).await {
        tracing::debug!(request_id = %ctx.request_id, error = %e, "Password reset body rejected");
        return ok_response(mutation, StatusCode::OK);
    }

    let email = match serde_json::from_slice::<PasswordResetRequest>(&ctx.body) {
        Ok(req) => normalize_email(&req.email),
        Err(e) => {
            tracing::debug!(request_id = %ctx.request_id, error = %e, "Password reset payload malformed");
            None
        }
    };
    let Some(email) = email else {
        return ok_response(mutation, StatusCode::OK);
    };

    let key = format!("password-reset:{}:{}", email, ctx.client_key());
    if let Some(decision) = gateway.check_rate_limit("password_reset", &key, config.rate_limit.password_reset) {
        decision.apply_headers(&mut mutation);
        if !decision.allowed {
            tracing::info!(
                request_id = %ctx.request_id,
                client = %ctx.client_key(),
                retry_after_secs = decision.retry_after_secs,
                "Password reset rate limited"
            );
            return ok_response(mutation, StatusCode::OK);
        }
    }

    // Detached: the reply must not depend on delivery time or outcome.
    let mailer = gateway.mailer().clone();
    let redirect_to = config.site.password_reset_redirect.clone();
    let request_id = ctx.request_id.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send_password_reset(&email, &redirect_to).await {
            tracing::warn!(request_id = %request_id, error = %e, "Password reset delivery failed");
        }
    });

    ok_response(mutation, StatusCode::OK)
}

/// Contact form submission. Unlike password reset, failures are reported.
pub async fn contact(
    State(gateway): State<Arc<RequestGateway>>,
    request: Request<Body>,
) -> Result<Response, Response> {
    let config = gateway.config();
    let (parts, body) = request.into_parts();
    let mut ctx = RequestContext::from_parts(&parts, config.security.trust_forwarded_for);

    gateway.enforce_same_origin(&ctx).map_err(IntoResponse::into_response)?;
    gateway.enforce_csrf_token(&ctx).map_err(IntoResponse::into_response)?;

    let mut mutation = ResponseMutation::new();
    let key = format!("contact:{}", ctx.client_key());
    if let Some(decision) = gateway.check_rate_limit("contact", &key, config.rate_limit.contact) {
        decision.apply_headers(&mut mutation);
        if !decision.allowed {
            let mut response = GuardError::RateLimited {
                retry_after_secs: decision.retry_after_secs,
            }
            .into_response();
            mutation.apply(&mut response);
            return Err(response);
        }
    }

    let with_headers = |e: GuardError| {
        let mut response = e.into_response();
        mutation.apply(&mut response);
        response
    };

    ctx.read_body(body, config.security.max_body_size)
        .await
        .map_err(with_headers)?;

    let form: ContactRequest = serde_json::from_slice(&ctx.body)
        .map_err(|e| with_headers(GuardError::MalformedPayload(e.to_string())))?;
    let form = validate_contact(form).map_err(with_headers)?;

    gateway
        .mailer()
        .send_contact_message(&form.name, &form.email, &form.message)
        .await
        .map_err(|e| {
            tracing::warn!(request_id = %ctx.request_id, error = %e, "Contact message delivery failed");
            with_headers(GuardError::Upstream)
        })?;

    tracing::info!(request_id = %ctx.request_id, client = %ctx.client_key(), "Contact message accepted");
    Ok(ok_response(mutation, StatusCode::ACCEPTED))
}

/// Inbound payment provider webhook, authenticated by HMAC signature.
pub async fn payment_webhook(
    State(gateway): State<Arc<RequestGateway>>,
    request: Request<Body>,
) -> Result<Json<serde_json::Value>, GuardError> {
    let config = gateway.config();
    let ctx = RequestContext::from_request(
        request,
        config.security.max_body_size,
        config.security.trust_forwarded_for,
    )
    .await?;

    if config.webhook.secret.is_empty() {
        tracing::error!(request_id = %ctx.request_id, "Webhook secret not configured; rejecting");
        metrics::record_signature_check(false);
        return Err(GuardError::SignatureInvalid);
    }

    let signature = ctx.header(&config.webhook.signature_header);
    let valid = verify_hmac_sha256_signature(&ctx.body, signature, config.webhook.secret.as_bytes());
    metrics::record_signature_check(valid);
    if !valid {
        tracing::warn!(
            request_id = %ctx.request_id,
            client = %ctx.client_key(),
            has_signature = signature.is_some(),
            "Webhook signature rejected"
        );
        return Err(GuardError::SignatureInvalid);
    }

    let event: WebhookEvent = serde_json::from_slice(&ctx.body)
        .map_err(|e| GuardError::MalformedPayload(e.to_string()))?;
    tracing::info!(
        request_id = %ctx.request_id,
        event_id = ?event.id,
        event_type = ?event.event_type,
        "Webhook accepted"
    );

    Ok(Json(json!({ "received": true })))
}

/// The authenticated caller's identity.
pub async fn account(
    State(gateway): State<Arc<RequestGateway>>,
    request: Request<Body>,
) -> Result<Json<AccountResponse>, GuardError> {
    let (parts, _) = request.into_parts();
    let ctx = RequestContext::from_parts(&parts, gateway.config().security.trust_forwarded_for);

    let token = bearer_token(&ctx).ok_or(GuardError::Unauthorized("bearer token required"))?;
    match gateway.identity().verify(token).await {
        Ok(identity) => Ok(Json(AccountResponse {
            subject: identity.subject,
        })),
        Err(IdentityError::InvalidToken) => Err(GuardError::Unauthorized("invalid bearer token")),
        Err(e) => {
            tracing::warn!(request_id = %ctx.request_id, error = %e, "Identity provider failure");
            Err(GuardError::Upstream)
        }
    }
}

/// Lowercased, trimmed email when it has a plausible shape.
fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_ascii_lowercase();
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return None;
    }
    let (local, domain) = email.split_once('@')?;
    let plausible = !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.');
    plausible.then_some(email)
}

fn validate_contact(form: ContactRequest) -> Result<ContactRequest, GuardError> {
    let name = form.name.trim().to_string();
    if name.is_empty() || name.chars().count() > 200 {
        return Err(GuardError::MalformedPayload("name must be 1-200 characters".into()));
    }
    let email = normalize_email(&form.email)
        .ok_or_else(|| GuardError::MalformedPayload("email is not valid".into()))?;
    let message = form.message.trim().to_string();
    if message.is_empty() || message.chars().count() > MAX_CONTACT_MESSAGE_CHARS {
        return Err(GuardError::MalformedPayload(format!(
            "message must be 1-{} characters",
            MAX_CONTACT_MESSAGE_CHARS
        )));
    }
    Ok(ContactRequest { name, email, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), Some("alice@example.com".into()));
        assert_eq!(normalize_email("no-at-sign"), None);
        assert_eq!(normalize_email("a@b"), None);
        assert_eq!(normalize_email("@example.com"), None);
        assert_eq!(normalize_email("a@@example.com"), None);
        assert_eq!(normalize_email("a b@example.com"), None);
        assert_eq!(normalize_email("a@example."), None);
    }

    #[test]
    fn test_validate_contact() {
        let ok = validate_contact(ContactRequest {
            name: " Ada ".into(),
            email: "ADA@example.com".into(),
            message: "Booking for two, please.".into(),
        })
        .unwrap();
        assert_eq!(ok.name, "Ada");
        assert_eq!(ok.email, "ada@example.com");

        let empty = validate_contact(ContactRequest {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            message: "   ".into(),
        });
        assert!(matches!(empty, Err(GuardError::MalformedPayload(_))));
    }

    #[test]
    fn test_webhook_event_accepts_type_or_event() {
        let a: WebhookEvent = serde_json::from_str(r#"{"id":"evt_1","type":"payment.completed"}"#).unwrap();
        assert_eq!(a.event_type.as_deref(), Some("payment.completed"));
        let b: WebhookEvent = serde_json::from_str(r#"{"event":"order.paid","amount":1}"#).unwrap();
        assert_eq!(b.event_type.as_deref(), Some("order.paid"));
        assert!(b.id.is_none());
    }
}
