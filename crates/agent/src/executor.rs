//! Email execution: turns a complete intent into mailbox operations.
//!
//! Credentials are a shared read-mostly resource keyed per caller. Each
//! execution holds a [`SessionLease`] for exactly as long as it runs; the
//! lease is released on drop, whatever the outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use mailvoice_core::conversation::{CallId, CallerId};
use mailvoice_core::domain::email::{split_recipients, Email, EmailParts, ExecutionOutput, MessageId};
use mailvoice_core::domain::intent::{Intent, IntentKind, SlotName, SlotValue};
use mailvoice_core::errors::ExecutionError;
use secrecy::SecretString;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

/// Messages read out when the caller did not say how many.
pub const DEFAULT_READ_COUNT: u32 = 3;
/// Upper bound on a spoken read or search, whatever count was asked for.
pub const MAX_FETCH_COUNT: u32 = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionContext {
    pub call_id: CallId,
    pub caller: CallerId,
    pub correlation_id: String,
}

#[async_trait]
pub trait EmailExecutor: Send + Sync {
    async fn execute(
        &self,
        intent: &Intent,
        context: &ExecutionContext,
    ) -> Result<ExecutionOutput, ExecutionError>;
}

#[derive(Clone, Debug)]
pub struct AccountCredentials {
    pub account: String,
    pub token: SecretString,
}

impl AccountCredentials {
    pub fn new(account: impl Into<String>, token: impl Into<String>) -> Self {
        Self { account: account.into(), token: SecretString::from(token.into()) }
    }
}

/// Per-caller mailbox credentials with one session slot per caller.
#[derive(Default)]
pub struct CredentialVault {
    accounts: RwLock<HashMap<CallerId, AccountCredentials>>,
    fallback: Option<AccountCredentials>,
    slots: Mutex<HashMap<CallerId, Arc<Semaphore>>>,
    active: Arc<AtomicUsize>,
}

impl CredentialVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credentials used for callers without an entry of their own.
    pub fn with_fallback(mut self, credentials: AccountCredentials) -> Self {
        self.fallback = Some(credentials);
        self
    }

    pub fn insert(&self, caller: CallerId, credentials: AccountCredentials) {
        match self.accounts.write() {
            Ok(mut accounts) => accounts.insert(caller, credentials),
            Err(poisoned) => poisoned.into_inner().insert(caller, credentials),
        };
    }

    /// Leases currently held across all callers.
    pub fn active_leases(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Takes the caller's session slot. Fails with `Busy` while an earlier
    /// execution for the same caller is still running.
    pub fn acquire(&self, caller: &CallerId) -> Result<SessionLease, ExecutionError> {
        let credentials = self.credentials_for(caller).ok_or_else(|| {
            ExecutionError::AuthFailed(format!("no mailbox credentials for caller `{caller}`"))
        })?;

        let slot = {
            let mut slots = match self.slots.lock() {
                Ok(slots) => slots,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(slots.entry(caller.clone()).or_insert_with(|| Arc::new(Semaphore::new(1))))
        };
        let permit = slot.try_acquire_owned().map_err(|_| ExecutionError::Busy)?;

        self.active.fetch_add(1, Ordering::SeqCst);
        debug!(event_name = "executor.lease.acquired", caller = %caller, "session lease acquired");
        Ok(SessionLease {
            caller: caller.clone(),
            credentials,
            active: Arc::clone(&self.active),
            _permit: permit,
        })
    }

    fn credentials_for(&self, caller: &CallerId) -> Option<AccountCredentials> {
        let accounts = match self.accounts.read() {
            Ok(accounts) => accounts,
            Err(poisoned) => poisoned.into_inner(),
        };
        accounts.get(caller).cloned().or_else(|| self.fallback.clone())
    }
}

/// Scoped mailbox session for one execution.
pub struct SessionLease {
    caller: CallerId,
    credentials: AccountCredentials,
    active: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl SessionLease {
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    pub fn credentials(&self) -> &AccountCredentials {
        &self.credentials
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        debug!(event_name = "executor.lease.released", caller = %self.caller, "session lease released");
    }
}

/// Provider-facing mailbox operations. Recipients handed to `send` may be
/// spoken names; the backend resolves them to addresses or rejects them.
#[async_trait]
pub trait MailBackend: Send + Sync {
    async fn send(&self, session: &SessionLease, draft: Email) -> Result<Email, ExecutionError>;
    async fn recent(&self, session: &SessionLease, count: usize) -> Result<Vec<Email>, ExecutionError>;
    async fn search(
        &self,
        session: &SessionLease,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Email>, ExecutionError>;
    async fn fetch(&self, session: &SessionLease, id: &MessageId) -> Result<Email, ExecutionError>;
    async fn delete(&self, session: &SessionLease, id: &MessageId) -> Result<Email, ExecutionError>;
}

pub struct MailboxExecutor {
    backend: Arc<dyn MailBackend>,
    vault: Arc<CredentialVault>,
    sender_address: String,
}

impl MailboxExecutor {
    pub fn new(
        backend: Arc<dyn MailBackend>,
        vault: Arc<CredentialVault>,
        sender_address: impl Into<String>,
    ) -> Self {
        Self { backend, vault, sender_address: sender_address.into() }
    }

    async fn dispatch(
        &self,
        intent: &Intent,
        session: &SessionLease,
    ) -> Result<ExecutionOutput, ExecutionError> {
        match intent.kind() {
            IntentKind::Send => {
                let draft = Email::from_send_intent(intent, &self.sender_address)
                    .map_err(|error| ExecutionError::Backend(error.to_string()))?;
                self.backend.send(session, draft).await.map(ExecutionOutput::Message)
            }
            IntentKind::Read => {
                let count = fetch_count(intent);
                self.backend.recent(session, count).await.map(ExecutionOutput::Messages)
            }
            IntentKind::Search => {
                let query = required_text(intent, SlotName::Query)?;
                let limit = fetch_count(intent);
                self.backend.search(session, &query, limit).await.map(ExecutionOutput::Messages)
            }
            IntentKind::Reply => {
                let original = self.backend.fetch(session, &message_ref(intent)?).await?;
                let draft = Email::outbound(EmailParts {
                    sender: self.sender_address.clone(),
                    recipients: vec![original.sender().to_owned()],
                    subject: prefixed("Re:", original.subject()),
                    body: required_text(intent, SlotName::Body)?,
                    thread_id: original.thread_id().cloned(),
                    ..EmailParts::default()
                })
                .map_err(|error| ExecutionError::Backend(error.to_string()))?;
                self.backend.send(session, draft).await.map(ExecutionOutput::Message)
            }
            IntentKind::Forward => {
                let original = self.backend.fetch(session, &message_ref(intent)?).await?;
                let note = intent.slot_text(SlotName::Body).unwrap_or_default();
                let body = if note.is_empty() {
                    original.body().to_owned()
                } else {
                    format!("{note}\n\n{}", original.body())
                };
                let draft = Email::outbound(EmailParts {
                    sender: self.sender_address.clone(),
                    recipients: split_recipients(&required_text(intent, SlotName::Recipient)?),
                    subject: prefixed("Fwd:", original.subject()),
                    body,
                    thread_id: original.thread_id().cloned(),
                    ..EmailParts::default()
                })
                .map_err(|error| ExecutionError::InvalidRecipient(error.to_string()))?;
                self.backend.send(session, draft).await.map(ExecutionOutput::Message)
            }
            IntentKind::Delete => {
                self.backend.delete(session, &message_ref(intent)?).await.map(ExecutionOutput::Message)
            }
            IntentKind::Unknown => Err(ExecutionError::NotExecutable { kind: IntentKind::Unknown }),
        }
    }
}

#[async_trait]
impl EmailExecutor for MailboxExecutor {
    async fn execute(
        &self,
        intent: &Intent,
        context: &ExecutionContext,
    ) -> Result<ExecutionOutput, ExecutionError> {
        if !intent.is_executable() {
            return Err(ExecutionError::NotExecutable { kind: intent.kind() });
        }

        let session = self.vault.acquire(&context.caller)?;
        let result = self.dispatch(intent, &session).await;
        drop(session);

        info!(
            event_name = "executor.execute.finished",
            call_id = %context.call_id,
            correlation_id = %context.correlation_id,
            kind = intent.kind().label(),
            ok = result.is_ok(),
            "email operation finished"
        );
        result
    }
}

fn fetch_count(intent: &Intent) -> usize {
    let count = intent
        .slot(SlotName::Count)
        .and_then(SlotValue::as_number)
        .unwrap_or(DEFAULT_READ_COUNT)
        .clamp(1, MAX_FETCH_COUNT);
    count as usize
}

fn required_text(intent: &Intent, slot: SlotName) -> Result<String, ExecutionError> {
    intent
        .slot(slot)
        .map(ToString::to_string)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ExecutionError::NotExecutable { kind: intent.kind() })
}

/// Message references must have been resolved against short-term memory
/// before execution; a bare phrase at this point names nothing we know.
fn message_ref(intent: &Intent) -> Result<MessageId, ExecutionError> {
    match intent.slot(SlotName::MessageRef) {
        Some(SlotValue::Reference(id)) => Ok(id.clone()),
        Some(other) => Err(ExecutionError::MessageNotFound(other.to_string())),
        None => Err(ExecutionError::NotExecutable { kind: intent.kind() }),
    }
}

fn prefixed(prefix: &str, subject: &str) -> String {
    if subject.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase()) {
        subject.to_owned()
    } else {
        format!("{prefix} {subject}")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mailvoice_core::conversation::{CallId, CallerId};
    use mailvoice_core::domain::email::{ExecutionOutput, MessageId};
    use mailvoice_core::domain::intent::{Intent, IntentKind, SlotName, SlotValue};
    use mailvoice_core::errors::ExecutionError;

    use super::{
        AccountCredentials, CredentialVault, EmailExecutor, ExecutionContext, MailboxExecutor,
    };
    use crate::mailbox::InMemoryMailbox;

    fn context(caller: &str) -> ExecutionContext {
        ExecutionContext {
            call_id: CallId("call-1".to_owned()),
            caller: CallerId(caller.to_owned()),
            correlation_id: "corr-1".to_owned(),
        }
    }

    fn intent(kind: IntentKind) -> Intent {
        Intent::new(kind, 0.9).expect("valid confidence")
    }

    fn setup() -> (Arc<InMemoryMailbox>, Arc<CredentialVault>, MailboxExecutor) {
        let mailbox = Arc::new(InMemoryMailbox::with_sample_inbox());
        let vault = Arc::new(
            CredentialVault::new().with_fallback(AccountCredentials::new("me@example.com", "token")),
        );
        let executor = MailboxExecutor::new(mailbox.clone(), vault.clone(), "me@example.com");
        (mailbox, vault, executor)
    }

    #[tokio::test]
    async fn send_resolves_contacts_and_releases_the_lease() {
        let (mailbox, vault, executor) = setup();
        let send = intent(IntentKind::Send)
            .with_slot(SlotName::Recipient, SlotValue::text("jane"))
            .with_slot(SlotName::Subject, SlotValue::text("meeting"))
            .with_slot(SlotName::Body, SlotValue::text("it's moved to 3pm"));

        let output = executor.execute(&send, &context("caller-1")).await.expect("send succeeds");

        let ExecutionOutput::Message(email) = output else {
            panic!("send should return the sent message");
        };
        assert_eq!(email.recipients(), &["jane@example.com".to_owned()]);
        assert!(email.id().is_some());
        assert_eq!(mailbox.sent().len(), 1);
        assert_eq!(vault.active_leases(), 0);
    }

    #[tokio::test]
    async fn read_defaults_to_three_messages() {
        let (_, _, executor) = setup();
        let output =
            executor.execute(&intent(IntentKind::Read), &context("caller-1")).await.expect("read");
        assert_eq!(output.emails().len(), 3);
    }

    #[tokio::test]
    async fn reply_goes_to_the_original_sender_in_thread() {
        let (mailbox, _, executor) = setup();
        let original = mailbox.inbox()[0].clone();
        let reply = intent(IntentKind::Reply)
            .with_slot(
                SlotName::MessageRef,
                SlotValue::Reference(original.id().cloned().expect("inbox ids")),
            )
            .with_slot(SlotName::Body, SlotValue::text("sounds good"));

        let output = executor.execute(&reply, &context("caller-1")).await.expect("reply");

        let email = &output.emails()[0];
        assert_eq!(email.recipients(), &[original.sender().to_owned()]);
        assert!(email.subject().starts_with("Re: "));
        assert_eq!(email.thread_id(), original.thread_id());
    }

    #[tokio::test]
    async fn unresolved_reference_is_reported_as_not_found() {
        let (_, vault, executor) = setup();
        let delete = intent(IntentKind::Delete)
            .with_slot(SlotName::MessageRef, SlotValue::Reference(MessageId("msg-404".to_owned())));

        let error = executor.execute(&delete, &context("caller-1")).await.expect_err("missing");
        assert_eq!(error, ExecutionError::MessageNotFound("msg-404".to_owned()));
        assert_eq!(vault.active_leases(), 0);
    }

    #[tokio::test]
    async fn incomplete_or_unknown_intents_never_reach_the_backend() {
        let (mailbox, _, executor) = setup();
        let incomplete =
            intent(IntentKind::Send).with_slot(SlotName::Recipient, SlotValue::text("jane"));

        assert!(matches!(
            executor.execute(&incomplete, &context("caller-1")).await,
            Err(ExecutionError::NotExecutable { kind: IntentKind::Send })
        ));
        assert!(matches!(
            executor.execute(&Intent::unknown(), &context("caller-1")).await,
            Err(ExecutionError::NotExecutable { kind: IntentKind::Unknown })
        ));
        assert!(mailbox.sent().is_empty());
    }

    #[test]
    fn a_second_lease_for_the_same_caller_is_refused() {
        let vault = CredentialVault::new();
        vault.insert(CallerId("alice".to_owned()), AccountCredentials::new("alice@example.com", "t"));

        let first = vault.acquire(&CallerId("alice".to_owned())).expect("first lease");
        assert_eq!(first.credentials().account, "alice@example.com");
        assert!(matches!(vault.acquire(&CallerId("alice".to_owned())), Err(ExecutionError::Busy)));
        assert!(matches!(
            vault.acquire(&CallerId("bob".to_owned())),
            Err(ExecutionError::AuthFailed(_))
        ));

        drop(first);
        assert_eq!(vault.active_leases(), 0);
        assert!(vault.acquire(&CallerId("alice".to_owned())).is_ok());
    }
}
