//! Background jobs — in-process async event queue and its handlers.
//!
//! Events are published fire-and-forget over a tokio mpsc channel and drained
//! by a single worker task. Handler failures are logged and never crash the
//! worker; a lost welcome email must not take the service down with it.
//!
//! The personalized intro line is produced by an external generation service
//! behind the [`IntroWriter`] seam; [`StaticIntroWriter`] is the built-in
//! fallback implementation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::email::{DEFAULT_WELCOME_INTRO, EmailService};

/// Profile captured at sign-up, carried on [`Event::UserCreated`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    pub name: String,
    pub country: String,
    pub investment_goals: String,
    pub risk_tolerance: String,
    pub preferred_industry: String,
}

impl UserProfile {
    /// Renders the profile as bullet lines for intro-generation prompts.
    pub fn summary(&self) -> String {
        format!(
            "- Country: {}\n- Investment goals: {}\n- Risk tolerance: {}\n- Preferred industry: {}",
            self.country, self.investment_goals, self.risk_tolerance, self.preferred_industry
        )
    }
}

/// Events the background worker reacts to.
#[derive(Debug, Clone)]
pub enum Event {
    UserCreated(UserProfile),
}

/// Errors from publishing onto the queue.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("background worker is no longer running")]
    WorkerGone,
}

/// Errors from the intro-generation collaborator.
#[derive(Debug, Error)]
pub enum IntroError {
    #[error("intro generation unavailable: {0}")]
    Unavailable(String),
}

/// Produces the personalized opening line of the welcome email.
#[async_trait]
pub trait IntroWriter: Send + Sync {
    async fn welcome_intro(&self, profile: &UserProfile) -> Result<String, IntroError>;
}

/// Intro writer that always returns the stock line. Used when no generation
/// service is configured.
#[derive(Debug, Default)]
pub struct StaticIntroWriter;

#[async_trait]
impl IntroWriter for StaticIntroWriter {
    async fn welcome_intro(&self, _profile: &UserProfile) -> Result<String, IntroError> {
        Ok(DEFAULT_WELCOME_INTRO.to_owned())
    }
}

/// Handle for publishing events to the background worker.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Event>,
}

impl JobQueue {
    /// Spawns the worker task and returns the publishing handle alongside the
    /// worker's join handle. The worker runs until every [`JobQueue`] clone is
    /// dropped, then drains what is left and stops.
    pub fn start(email: EmailService, intro: Arc<dyn IntroWriter>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handle_event(&email, intro.as_ref(), event).await;
            }
            debug!("job queue closed, worker stopping");
        });

        (Self { tx }, worker)
    }

    /// Enqueues an event for the background worker.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::WorkerGone`] when the worker has stopped.
    pub fn publish(&self, event: Event) -> Result<(), JobError> {
        self.tx.send(event).map_err(|_| JobError::WorkerGone)
    }
}

async fn handle_event(email: &EmailService, intro: &dyn IntroWriter, event: Event) {
    match event {
        Event::UserCreated(profile) => send_sign_up_email(email, intro, profile).await,
    }
}

/// Welcome-email job: generate the intro line, then render and send.
async fn send_sign_up_email(email: &EmailService, intro: &dyn IntroWriter, profile: UserProfile) {
    let intro_text = match intro.welcome_intro(&profile).await {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "intro generation failed, using the stock line");
            DEFAULT_WELCOME_INTRO.to_owned()
        }
    };

    if email
        .send_welcome_email(&profile.email, &profile.name, &intro_text)
        .await
    {
        info!(to = %profile.email, "welcome email sent");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::email::{MailError, Mailer, OutboundEmail};

    use super::*;

    #[derive(Default)]
    struct CaptureMailer {
        sent: Mutex<Vec<OutboundEmail>>,
    }

    #[async_trait]
    impl Mailer for CaptureMailer {
        async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    struct BrokenIntroWriter;

    #[async_trait]
    impl IntroWriter for BrokenIntroWriter {
        async fn welcome_intro(&self, _profile: &UserProfile) -> Result<String, IntroError> {
            Err(IntroError::Unavailable("model endpoint down".to_owned()))
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            email: "ada@example.com".to_owned(),
            name: "Ada".to_owned(),
            country: "UK".to_owned(),
            investment_goals: "Growth".to_owned(),
            risk_tolerance: "Medium".to_owned(),
            preferred_industry: "Technology".to_owned(),
        }
    }

    fn email_over(mailer: &Arc<CaptureMailer>) -> EmailService {
        EmailService::new(
            Arc::clone(mailer) as _,
            "MarketPulse <noreply@marketpulse.dev>",
            "MarketPulse",
        )
    }

    #[test]
    fn profile_summary_lists_every_field() {
        let summary = profile().summary();
        assert!(summary.contains("- Country: UK"));
        assert!(summary.contains("- Risk tolerance: Medium"));
        assert!(summary.contains("- Preferred industry: Technology"));
    }

    #[tokio::test]
    async fn user_created_event_sends_the_welcome_email() {
        let mailer = Arc::new(CaptureMailer::default());
        let (queue, worker) = JobQueue::start(email_over(&mailer), Arc::new(StaticIntroWriter));

        queue.publish(Event::UserCreated(profile())).unwrap();
        drop(queue);
        worker.await.unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");
        assert!(sent[0].html.contains("Welcome aboard, Ada!"));
    }

    #[tokio::test]
    async fn broken_intro_writer_falls_back_to_the_stock_line() {
        let mailer = Arc::new(CaptureMailer::default());
        let (queue, worker) = JobQueue::start(email_over(&mailer), Arc::new(BrokenIntroWriter));

        queue.publish(Event::UserCreated(profile())).unwrap();
        drop(queue);
        worker.await.unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert!(sent[0].html.contains(DEFAULT_WELCOME_INTRO));
    }

    #[tokio::test]
    async fn publish_after_worker_stopped_reports_worker_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let queue = JobQueue { tx };

        let err = queue.publish(Event::UserCreated(profile())).unwrap_err();
        assert!(matches!(err, JobError::WorkerGone));
    }
}
