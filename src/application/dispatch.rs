use crate::domain::notification::{Mail, Notification};
use crate::domain::ports::{MailSenderRef, NotificationSinkRef};
use crate::error::{MarketError, Result};

/// Messages produced by a committed state change, delivered after the commit.
#[derive(Debug, Default)]
pub struct Outbox {
    pub notifications: Vec<Notification>,
    pub mails: Vec<Mail>,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty() && self.mails.is_empty()
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    sink: NotificationSinkRef,
    mailer: MailSenderRef,
}

impl Dispatcher {
    pub fn new(sink: NotificationSinkRef, mailer: MailSenderRef) -> Self {
        Self { sink, mailer }
    }

    /// Attempts every delivery in the outbox.
    ///
    /// Failures never touch persisted state. If any delivery failed the
    /// caller gets a `ServiceUnavailable` naming how many were lost.
    pub async fn deliver(&self, outbox: Outbox) -> Result<()> {
        let mut failures = 0usize;

        for notification in &outbox.notifications {
            if let Err(e) = self.sink.notify(notification).await {
                tracing::warn!(
                    recipient = %notification.recipient,
                    kind = ?notification.kind,
                    "notification delivery failed: {e}"
                );
                failures += 1;
            }
        }

        for mail in outbox.mails {
            let template = mail.template;
            if !self.mailer.send(&mail.to, template, mail.context).await {
                tracing::warn!(to = %mail.to, ?template, "mail delivery failed");
                failures += 1;
            }
        }

        if failures > 0 {
            return Err(MarketError::unavailable(format!(
                "{failures} notification(s) could not be delivered"
            )));
        }
        Ok(())
    }
}
