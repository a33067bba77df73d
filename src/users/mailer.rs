use anyhow::Context;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

/// Outbound email used by the password-reset flow.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_reset_code(&self, to: &str, code: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(cfg.username.clone(), cfg.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .with_context(|| format!("smtp relay {}", cfg.host))?
            .port(cfg.port)
            .credentials(creds)
            .build();
        let from = format!("{} <{}>", cfg.from_name, cfg.from_email)
            .parse::<Mailbox>()
            .context("smtp from address")?;
        Ok(Self { transport, from })
    }
}

fn reset_code_text(code: &str) -> String {
    format!(
        "Your password reset code is {code}.\n\nIt expires in 10 minutes. \
         If you did not ask to reset your password, ignore this message."
    )
}

fn reset_code_html(code: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <body style="font-family: Arial, sans-serif; color: #333;">
    <p>Your password reset code is:</p>
    <p style="font-size: 24px; font-weight: bold; letter-spacing: 4px;">{code}</p>
    <p>It expires in 10 minutes. If you did not ask to reset your password, ignore this message.</p>
  </body>
</html>"#
    )
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_reset_code(&self, to: &str, code: &str) -> anyhow::Result<()> {
        let to_mailbox = to.parse::<Mailbox>().context("recipient address")?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to_mailbox)
            .subject("Your verification code")
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(reset_code_text(code)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(reset_code_html(code)),
                    ),
            )
            .context("build reset email")?;
        self.transport.send(email).await.context("smtp send")?;
        Ok(())
    }
}
