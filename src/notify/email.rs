use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Mailer, OutgoingEmail};

/// SMTP transport for subscriber notifications, configured from
/// `SMTP_HOST` / `SMTP_USER` / `SMTP_PASS` / `NOTIFY_EMAIL_FROM`.
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// `Ok(None)` when SMTP is simply not configured (no `SMTP_HOST`); the
    /// service then runs with notifications disabled. A present-but-broken
    /// configuration is an error.
    pub fn from_env() -> Result<Option<Self>> {
        let host = match std::env::var("SMTP_HOST") {
            Ok(h) if !h.is_empty() => h,
            _ => return Ok(None),
        };
        let user = std::env::var("SMTP_USER").context("SMTP_USER missing")?;
        let pass = std::env::var("SMTP_PASS").context("SMTP_PASS missing")?;
        let from_addr = std::env::var("NOTIFY_EMAIL_FROM").context("NOTIFY_EMAIL_FROM missing")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();
        let from: Mailbox = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;

        Ok(Some(Self { mailer, from }))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingEmail) -> Result<()> {
        let to: Mailbox = mail.to.parse().context("invalid recipient address")?;
        let msg = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                mail.text.clone(),
                mail.html.clone(),
            ))
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}
