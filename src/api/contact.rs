use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::Form;

use crate::mail::ContactMessage;
use crate::models::ContactForm;
use crate::state::AppState;

const MAX_FIELD_LEN: usize = 5000;

/// POST /contact — relay a contact-form message, rate limited per client IP.
pub async fn contact(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Form(form): Form<ContactForm>,
) -> Result<Redirect, (StatusCode, String)> {
    let client_id = peer.ip().to_string();
    if !state.contact_limiter.allow(&client_id) {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            "Too many messages. Please try again later.".to_string(),
        ));
    }

    validate(&form).map_err(|msg| (StatusCode::BAD_REQUEST, msg))?;

    let message = ContactMessage::from_form(&form, &state.config.mail.to_address);
    state.mailer.send(&message).await.map_err(|e| {
        tracing::error!("Contact message from {client_id} not delivered: {e:#}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Your message could not be sent. Please try again later.".to_string(),
        )
    })?;

    tracing::info!("Contact message from {client_id} relayed");
    Ok(Redirect::to("/?contact=sent"))
}

fn validate(form: &ContactForm) -> Result<(), String> {
    for (field, value) in [("name", &form.name), ("email", &form.email), ("message", &form.message)] {
        if value.trim().is_empty() {
            return Err(format!("The {field} field is required"));
        }
        if value.len() > MAX_FIELD_LEN {
            return Err(format!("The {field} field is too long"));
        }
    }
    if !form.email.contains('@') {
        return Err("Please provide a valid email address".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, email: &str, message: &str) -> ContactForm {
        ContactForm {
            name: name.into(),
            email: email.into(),
            message: message.into(),
        }
    }

    #[test]
    fn test_valid_form() {
        assert!(validate(&form("Ada", "ada@example.com", "Hi")).is_ok());
    }

    #[test]
    fn test_blank_fields_rejected() {
        assert!(validate(&form(" ", "ada@example.com", "Hi")).unwrap_err().contains("name"));
        assert!(validate(&form("Ada", "", "Hi")).unwrap_err().contains("email"));
        assert!(validate(&form("Ada", "ada@example.com", "\n")).unwrap_err().contains("message"));
    }

    #[test]
    fn test_email_needs_at_sign() {
        assert!(validate(&form("Ada", "ada.example.com", "Hi")).is_err());
    }

    #[test]
    fn test_oversized_message_rejected() {
        let long = "x".repeat(MAX_FIELD_LEN + 1);
        assert!(validate(&form("Ada", "ada@example.com", &long)).unwrap_err().contains("too long"));
    }
}
