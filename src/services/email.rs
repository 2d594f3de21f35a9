use anyhow::Context;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use uuid::Uuid;

use crate::{config::Config, models::user::Role};

pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

/// Rendered welcome email for a freshly provisioned account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl WelcomeEmail {
    pub fn render(name: &str, email: &str, role: Role, temp_password: &str, reset_url: &str) -> Self {
        let role_title = role.title();
        let subject = format!("Welcome to the clinic portal - your {role_title} account");
        let text = format!(
            "Hello {name},\n\n\
            An account has been created for you as {role_title}.\n\n\
            Email: {email}\n\
            Temporary password: {temp_password}\n\n\
            You must choose a new password before your first login:\n\
            {reset_url}\n"
        );
        let html = format!(
            r#"<p>Hello <strong>{name}</strong>,</p>
<p>An account has been created for you as <strong>{role_title}</strong>.</p>
<p>Email: <code>{email}</code><br>Temporary password: <code>{temp_password}</code></p>
<p>You must choose a new password before your first login:<br>
<a href="{reset_url}">{reset_url}</a></p>"#
        );
        Self { subject, text, html }
    }
}

impl EmailService {
    /// Returns None if SMTP is not fully configured.
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;
        let from_addr = config.smtp_from.as_deref()?;

        let port = config.smtp_port.unwrap_or(587);
        let creds = Credentials::new(username, password);

        let transport = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .ok()?
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .ok()?
                .port(port)
                .credentials(creds)
                .build()
        };

        let from: Mailbox = from_addr.parse().ok()?;

        Some(Self { transport, from })
    }

    fn new_message_id(&self) -> String {
        format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
    }

    async fn send_email(&self, to: Mailbox, subject: &str, text: &str, html: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .message_id(Some(self.new_message_id()))
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            )
            .context("Failed to build email message")?;

        self.transport
            .send(email)
            .await
            .context("Failed to send email")?;

        Ok(())
    }

    pub async fn send_welcome(&self, to_email: &str, to_name: &str, message: &WelcomeEmail) -> anyhow::Result<()> {
        let to: Mailbox = match format!("{to_name} <{to_email}>").parse() {
            Ok(mailbox) => mailbox,
            Err(_) => to_email
                .parse()
                .with_context(|| format!("Invalid recipient address: {to_email}"))?,
        };
        self.send_email(to, &message.subject, &message.text, &message.html)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_email_carries_credentials_and_link() {
        let mail = WelcomeEmail::render(
            "Tom Hart",
            "t@x.io",
            Role::Therapist,
            "Ab3!xyz12345",
            "http://localhost:8080/auth/reset-password?email=t@x.io",
        );
        assert!(mail.subject.contains("Therapist"));
        assert!(mail.text.contains("Ab3!xyz12345"));
        assert!(mail.text.contains("t@x.io"));
        assert!(mail.html.contains("href=\"http://localhost:8080/auth/reset-password?email=t@x.io\""));
    }
}
