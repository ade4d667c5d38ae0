//! In-process stand-ins for the payment provider, notification sink and mail
//! sender. They record every call so replays and tests can inspect what the
//! engine asked of its collaborators, and can be switched into failure modes.

use crate::domain::money::Money;
use crate::domain::notification::{Mail, MailTemplate, Notification};
use crate::domain::party::UserId;
use crate::domain::ports::{CheckoutSession, MailSender, NotificationSink, PaymentGateway};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentCall {
    Authorize {
        payment_ref: String,
        amount: Money,
    },
    Capture {
        payment_ref: String,
        amount: Money,
    },
    Release {
        payment_ref: String,
    },
    Transfer {
        idempotency_key: String,
        vendor_account: String,
        payment_ref: String,
        amount: Money,
        platform_fee: Money,
    },
    OverdueCharge {
        idempotency_key: String,
        buyer: UserId,
        vendor_account: String,
        order_id: Uuid,
        amount: Money,
        session: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentOp {
    Authorize,
    Capture,
    Release,
    Transfer,
    OverdueCharge,
}

#[derive(Default)]
struct GatewayState {
    calls: Vec<PaymentCall>,
    failing: HashSet<PaymentOp>,
    transfers: HashSet<String>,
    sessions: HashMap<String, CheckoutSession>,
}

/// Payment gateway that approves everything unless told otherwise.
#[derive(Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<GatewayState>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call of `op` fail until [`Self::recover`].
    pub fn fail_on(&self, op: PaymentOp) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: PaymentOp) {
        self.lock().failing.remove(&op);
    }

    pub fn calls(&self) -> Vec<PaymentCall> {
        self.lock().calls.clone()
    }

    /// Captures and releases, the calls that settle an authorization.
    pub fn settlement_calls(&self) -> Vec<PaymentCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, PaymentCall::Capture { .. } | PaymentCall::Release { .. }))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, op: PaymentOp, call: PaymentCall) -> Result<()> {
        let mut state = self.lock();
        if state.failing.contains(&op) {
            tracing::warn!(?op, "payment provider rejected call");
            return Err(MarketError::unavailable(format!(
                "payment provider unavailable for {op:?}"
            )));
        }
        tracing::debug!(?call, "payment call");
        state.calls.push(call);
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}_{n:06}")
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn authorize(&self, amount: Money) -> Result<String> {
        let payment_ref = self.next_id("pi");
        self.record(
            PaymentOp::Authorize,
            PaymentCall::Authorize {
                payment_ref: payment_ref.clone(),
                amount,
            },
        )?;
        Ok(payment_ref)
    }

    async fn capture(&self, payment_ref: &str, amount: Money) -> Result<()> {
        self.record(
            PaymentOp::Capture,
            PaymentCall::Capture {
                payment_ref: payment_ref.to_string(),
                amount,
            },
        )
    }

    async fn release(&self, payment_ref: &str) -> Result<()> {
        self.record(
            PaymentOp::Release,
            PaymentCall::Release {
                payment_ref: payment_ref.to_string(),
            },
        )
    }

    async fn transfer_to_vendor(
        &self,
        idempotency_key: &str,
        vendor_account: &str,
        payment_ref: &str,
        amount: Money,
        platform_fee: Money,
    ) -> Result<()> {
        if self.lock().transfers.contains(idempotency_key) {
            tracing::debug!(idempotency_key, "transfer already made");
            return Ok(());
        }
        self.record(
            PaymentOp::Transfer,
            PaymentCall::Transfer {
                idempotency_key: idempotency_key.to_string(),
                vendor_account: vendor_account.to_string(),
                payment_ref: payment_ref.to_string(),
                amount,
                platform_fee,
            },
        )?;
        self.lock().transfers.insert(idempotency_key.to_string());
        Ok(())
    }

    async fn create_overdue_charge(
        &self,
        idempotency_key: &str,
        buyer: &UserId,
        vendor_account: &str,
        order_id: Uuid,
        amount: Money,
    ) -> Result<CheckoutSession> {
        if let Some(session) = self.lock().sessions.get(idempotency_key) {
            tracing::debug!(idempotency_key, "overdue charge already created");
            return Ok(session.clone());
        }
        let id = self.next_id("cs");
        self.record(
            PaymentOp::OverdueCharge,
            PaymentCall::OverdueCharge {
                idempotency_key: idempotency_key.to_string(),
                buyer: buyer.clone(),
                vendor_account: vendor_account.to_string(),
                order_id,
                amount,
                session: id.clone(),
            },
        )?;
        let session = CheckoutSession {
            url: Some(format!("https://pay.invalid/checkout/{id}")),
            id,
        };
        self.lock()
            .sessions
            .insert(idempotency_key.to_string(), session.clone());
        Ok(session)
    }
}

/// Notification sink that keeps delivered notifications in memory.
#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    delivered: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(MarketError::unavailable("notification sink unreachable"));
        }
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
        Ok(())
    }
}

/// Mail sender that keeps sent mails in memory.
#[derive(Clone, Default)]
pub struct InMemoryMailer {
    sent: Arc<Mutex<Vec<Mail>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl MailSender for InMemoryMailer {
    async fn send(&self, to: &str, template: MailTemplate, context: serde_json::Value) -> bool {
        if self.failing.load(Ordering::Relaxed) {
            return false;
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Mail {
                to: to.to_string(),
                template,
                context,
            });
        true
    }
}
