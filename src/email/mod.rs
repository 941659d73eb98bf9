//! Outbound email — welcome and news-summary messages.
//!
//! The SMTP transport is an external collaborator behind the [`Mailer`] seam;
//! this module owns the templates, the sender identity, and the policy for
//! what happens when a send fails.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

/// Fallback intro line used when no personalized intro is available.
pub const DEFAULT_WELCOME_INTRO: &str =
    "Thanks for joining MarketPulse. You now have the tools to track markets and make smarter moves.";

const WELCOME_TEMPLATE: &str = "\
<html>
  <body>
    <h1>Welcome aboard, {{name}}!</h1>
    <p>{{intro}}</p>
    <p>Head to your dashboard to build a watchlist and follow the markets you care about.</p>
  </body>
</html>";

const NEWS_SUMMARY_TEMPLATE: &str = "\
<html>
  <body>
    <h1>Market news for {{date}}</h1>
    {{newsContent}}
  </body>
</html>";

/// Errors produced by an outbound mail transport.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),

    #[error("recipient rejected: {0}")]
    Rejected(String),
}

/// A fully composed outbound message.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Outbound mail transport seam.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Hands the message to the transport.
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError>;
}

/// Transport that logs messages instead of delivering them. Default for local
/// runs and environments without SMTP credentials.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, "outbound email (log transport)");
        Ok(())
    }
}

/// Composes and sends the site's transactional email.
#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
    sender: String,
    site_name: String,
}

impl EmailService {
    pub fn new(mailer: Arc<dyn Mailer>, sender: impl Into<String>, site_name: impl Into<String>) -> Self {
        Self {
            mailer,
            sender: sender.into(),
            site_name: site_name.into(),
        }
    }

    /// Sends the welcome email for a fresh sign-up.
    ///
    /// Returns `false` on transport failure; the failure is logged and never
    /// propagated, since a missing welcome email must not fail the sign-up it
    /// decorates.
    pub async fn send_welcome_email(&self, to: &str, name: &str, intro: &str) -> bool {
        let html = render(WELCOME_TEMPLATE, &[("name", name), ("intro", intro)]);
        let email = OutboundEmail {
            from: self.sender.clone(),
            to: to.to_owned(),
            subject: format!("Welcome to {}! Your market tracker is ready", self.site_name),
            text: DEFAULT_WELCOME_INTRO.to_owned(),
            html,
        };

        match self.mailer.send(&email).await {
            Ok(()) => true,
            Err(err) => {
                error!(to, error = %err, "failed to send welcome email");
                false
            }
        }
    }

    /// Sends the daily market news summary.
    ///
    /// # Errors
    ///
    /// Propagates the transport error; the news pipeline decides how to retry.
    pub async fn send_news_summary(
        &self,
        to: &str,
        date: &str,
        news_content: &str,
    ) -> Result<(), MailError> {
        let html = render(
            NEWS_SUMMARY_TEMPLATE,
            &[("date", date), ("newsContent", news_content)],
        );
        let email = OutboundEmail {
            from: self.sender.clone(),
            to: to.to_owned(),
            subject: format!("Market News Summary Today - {date}"),
            text: format!("Today's market news summary from {}", self.site_name),
            html,
        };

        self.mailer.send(&email).await
    }
}

/// Substitutes `{{key}}` placeholders in a template.
fn render(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = template.to_owned();
    for (key, value) in pairs {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Captures sent messages; fails every send when `fail` is set.
    #[derive(Default)]
    struct CaptureMailer {
        sent: Mutex<Vec<OutboundEmail>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for CaptureMailer {
        async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError::Transport("smtp unreachable".to_owned()));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    fn service(mailer: &Arc<CaptureMailer>) -> EmailService {
        EmailService::new(
            Arc::clone(mailer) as _,
            "MarketPulse <noreply@marketpulse.dev>",
            "MarketPulse",
        )
    }

    #[test]
    fn render_substitutes_all_placeholders() {
        let out = render("Hi {{name}}, {{name}}: {{intro}}", &[("name", "Ada"), ("intro", "welcome")]);
        assert_eq!(out, "Hi Ada, Ada: welcome");
    }

    #[tokio::test]
    async fn welcome_email_carries_name_and_intro() {
        let mailer = Arc::new(CaptureMailer::default());
        let ok = service(&mailer)
            .send_welcome_email("ada@example.com", "Ada", "Markets move fast.")
            .await;

        assert!(ok);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");
        assert!(sent[0].subject.contains("Welcome to MarketPulse"));
        assert!(sent[0].html.contains("Welcome aboard, Ada!"));
        assert!(sent[0].html.contains("Markets move fast."));
    }

    #[tokio::test]
    async fn welcome_email_failure_is_swallowed() {
        let mailer = Arc::new(CaptureMailer {
            fail: true,
            ..CaptureMailer::default()
        });
        let ok = service(&mailer)
            .send_welcome_email("ada@example.com", "Ada", DEFAULT_WELCOME_INTRO)
            .await;

        assert!(!ok);
    }

    #[tokio::test]
    async fn news_summary_failure_propagates() {
        let mailer = Arc::new(CaptureMailer {
            fail: true,
            ..CaptureMailer::default()
        });
        let err = service(&mailer)
            .send_news_summary("ada@example.com", "2025-11-03", "<p>Flat day.</p>")
            .await
            .unwrap_err();

        assert!(matches!(err, MailError::Transport(_)));
    }

    #[tokio::test]
    async fn news_summary_renders_date_and_content() {
        let mailer = Arc::new(CaptureMailer::default());
        service(&mailer)
            .send_news_summary("ada@example.com", "2025-11-03", "<p>Flat day.</p>")
            .await
            .unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert!(sent[0].subject.ends_with("2025-11-03"));
        assert!(sent[0].html.contains("<p>Flat day.</p>"));
    }
}
