//! Email service for trial usage alerts
//!
//! Sends the 50/80/100% quota emails over SMTP via the lettre crate. When no
//! SMTP server is configured the server falls back to `usage::LogNotifier`.

use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use thiserror::Error;

use super::config::SmtpConfig;
use super::usage::{UsageAlert, UsageNotifier};

/// SMTP-backed usage notifier
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_email: Mailbox,
    from_name: String,
}

/// Errors that can occur when sending emails
#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Failed to build email message: {0}")]
    MessageBuild(String),

    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("SMTP configuration error: {0}")]
    ConfigError(String),
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, EmailError> {
        let from_mailbox: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("Invalid from address: {}", e)))?;

        let tls_parameters = TlsParameters::builder(config.host.clone())
            .build()
            .map_err(|e| EmailError::ConfigError(format!("Failed to build TLS parameters: {}", e)))?;

        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| EmailError::ConfigError(format!("Failed to create SMTP transport: {}", e)))?
            .port(config.port)
            .credentials(credentials)
            .tls(Tls::Required(tls_parameters))
            .build();

        Ok(Self {
            mailer,
            from_email: from_mailbox,
            from_name: config.from_name.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: String,
        text_body: String,
    ) -> Result<(), EmailError> {
        let to_mailbox: Mailbox = to_email
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("Invalid recipient address: {}", e)))?;

        let email = Message::builder()
            .from(self.from_email.clone())
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| EmailError::MessageBuild(e.to_string()))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        tracing::info!("Email sent successfully to {}", to_email);
        Ok(())
    }
}

#[async_trait::async_trait]
impl UsageNotifier for EmailService {
    async fn usage_threshold_reached(&self, alert: &UsageAlert) -> Result<(), EmailError> {
        let to_email = alert
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| EmailError::InvalidAddress(format!("no email on file for {}", alert.user_id)))?;

        self.send_email(
            to_email,
            &usage_alert_subject(alert),
            build_usage_alert_html(alert, &self.from_name),
            build_usage_alert_text(alert, &self.from_name),
        )
        .await
    }
}

fn usage_alert_subject(alert: &UsageAlert) -> String {
    if alert.threshold >= 100 {
        "You've used all of your trial minutes".to_string()
    } else {
        format!("You've used {}% of your trial minutes", alert.threshold)
    }
}

fn usage_line(alert: &UsageAlert) -> String {
    format!(
        "{:.1} of {:.0} trial minutes used ({:.0}%).",
        alert.minutes_used, alert.minutes_total, alert.percentage_used
    )
}

fn build_usage_alert_html(alert: &UsageAlert, sender: &str) -> String {
    let advice = if alert.threshold >= 100 {
        "Outbound calls will stop until you upgrade your plan."
    } else {
        "Upgrade your plan to keep your campaigns calling without interruption."
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{subject}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
            line-height: 1.6;
            color: #333;
            max-width: 600px;
            margin: 0 auto;
            padding: 20px;
            background-color: #f4f4f4;
        }}
        .container {{
            background-color: #ffffff;
            padding: 40px;
            border-radius: 8px;
        }}
        .usage {{
            font-size: 18px;
            font-weight: 600;
        }}
        .footer {{
            margin-top: 30px;
            font-size: 12px;
            color: #999;
        }}
    </style>
</head>
<body>
    <div class="container">
        <h2>{subject}</h2>
        <p class="usage">{usage}</p>
        <p>{advice}</p>
        <div class="footer">{sender}</div>
    </div>
</body>
</html>"#,
        subject = usage_alert_subject(alert),
        usage = usage_line(alert),
        advice = advice,
        sender = sender,
    )
}

fn build_usage_alert_text(alert: &UsageAlert, sender: &str) -> String {
    format!(
        "{}\n\n{}\n\n---\n{}",
        usage_alert_subject(alert),
        usage_line(alert),
        sender
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // Templates are tested directly; building the transport needs a runtime.

    fn alert(threshold: u8) -> UsageAlert {
        UsageAlert {
            user_id: "user_a".to_string(),
            email: Some("a@example.com".to_string()),
            threshold,
            minutes_used: 20.0,
            minutes_total: 25.0,
            percentage_used: 80.0,
        }
    }

    #[test]
    fn test_usage_alert_contains_figures() {
        let html = build_usage_alert_html(&alert(80), "Campaign Dialer");
        assert!(html.contains("80% of your trial minutes"));
        assert!(html.contains("20.0 of 25 trial minutes used"));

        let text = build_usage_alert_text(&alert(80), "Campaign Dialer");
        assert!(text.starts_with("You've used 80%"));
        assert!(text.ends_with("Campaign Dialer"));
    }

    #[test]
    fn test_exhausted_quota_subject() {
        assert_eq!(usage_alert_subject(&alert(100)), "You've used all of your trial minutes");
        assert!(build_usage_alert_html(&alert(100), "x").contains("Outbound calls will stop"));
    }
}
