//! In-memory mailbox backend. Backs the simulator and the tests, and doubles
//! as the reference behavior for real provider adapters.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mailvoice_core::domain::email::{Email, EmailParts, MessageId, ThreadId};
use mailvoice_core::errors::ExecutionError;
use secrecy::ExposeSecret;

use crate::executor::{MailBackend, SessionLease};

#[derive(Default)]
pub struct InMemoryMailbox {
    contacts: HashMap<String, String>,
    inbox: Mutex<Vec<Email>>,
    sent: Mutex<Vec<Email>>,
    faults: Mutex<VecDeque<ExecutionError>>,
    delay: Mutex<Option<Duration>>,
    next_id: AtomicU64,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1), ..Self::default() }
    }

    /// A handful of contacts and five inbox messages, newest first.
    pub fn with_sample_inbox() -> Self {
        let samples = [
            ("jane@example.com", "Quarterly budget", "Can we review the numbers on Thursday?"),
            ("john@example.com", "Lunch on Friday", "Are you free for lunch this Friday?"),
            ("alerts@bank.example", "Your statement is ready", "Your monthly statement is available."),
            ("bob@example.com", "Project kickoff", "Slides for Monday's kickoff are attached."),
            ("jane@example.com", "Team offsite", "The offsite venue is confirmed for next month."),
        ];

        let mut mailbox = Self::new()
            .with_contact("jane", "jane@example.com")
            .with_contact("john", "john@example.com")
            .with_contact("bob", "bob@example.com")
            .with_contact("alice", "alice@example.com");
        let now = Utc::now();
        for (index, (sender, subject, body)) in samples.into_iter().enumerate() {
            let number = index + 1;
            mailbox = mailbox.with_message(Email::received(EmailParts {
                id: Some(MessageId(format!("msg-{number}"))),
                sender: sender.to_owned(),
                recipients: vec!["me@example.com".to_owned()],
                subject: subject.to_owned(),
                body: body.to_owned(),
                thread_id: Some(ThreadId(format!("thread-{number}"))),
                timestamp: Some(now - chrono::Duration::minutes(15 * number as i64)),
            }));
        }
        mailbox
    }

    pub fn with_contact(mut self, name: &str, address: &str) -> Self {
        self.contacts.insert(name.trim().to_lowercase(), address.to_owned());
        self
    }

    pub fn with_message(self, email: Email) -> Self {
        {
            let mut inbox = lock(&self.inbox);
            inbox.push(email);
            inbox.sort_by_key(|email| std::cmp::Reverse(email.timestamp()));
        }
        self
    }

    /// The next operation fails with `error` instead of touching the mailbox.
    pub fn fail_next(&self, error: ExecutionError) {
        lock(&self.faults).push_back(error);
    }

    /// Every subsequent operation waits this long before doing anything.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    pub fn inbox(&self) -> Vec<Email> {
        lock(&self.inbox).clone()
    }

    pub fn sent(&self) -> Vec<Email> {
        lock(&self.sent).clone()
    }

    async fn begin(&self, session: &SessionLease) -> Result<(), ExecutionError> {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if session.credentials().token.expose_secret().is_empty() {
            return Err(ExecutionError::AuthFailed(format!(
                "empty token for account `{}`",
                session.credentials().account
            )));
        }
        match lock(&self.faults).pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn resolve_recipient(&self, recipient: &str) -> Result<String, ExecutionError> {
        let recipient = recipient.trim();
        if recipient.contains('@') {
            return Ok(recipient.to_owned());
        }
        self.contacts
            .get(&recipient.to_lowercase())
            .cloned()
            .ok_or_else(|| ExecutionError::InvalidRecipient(recipient.to_owned()))
    }
}

#[async_trait]
impl MailBackend for InMemoryMailbox {
    async fn send(&self, session: &SessionLease, draft: Email) -> Result<Email, ExecutionError> {
        self.begin(session).await?;

        let recipients = draft
            .recipients()
            .iter()
            .map(|recipient| self.resolve_recipient(recipient))
            .collect::<Result<Vec<_>, _>>()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let sent = Email::outbound(EmailParts {
            id: Some(MessageId(format!("sent-{id}"))),
            sender: draft.sender().to_owned(),
            recipients,
            subject: draft.subject().to_owned(),
            body: draft.body().to_owned(),
            thread_id: draft.thread_id().cloned().or_else(|| Some(ThreadId(format!("thread-sent-{id}")))),
            timestamp: Some(Utc::now()),
        })
        .map_err(|error| ExecutionError::InvalidRecipient(error.to_string()))?;

        lock(&self.sent).push(sent.clone());
        Ok(sent)
    }

    async fn recent(&self, session: &SessionLease, count: usize) -> Result<Vec<Email>, ExecutionError> {
        self.begin(session).await?;
        Ok(lock(&self.inbox).iter().take(count).cloned().collect())
    }

    async fn search(
        &self,
        session: &SessionLease,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Email>, ExecutionError> {
        self.begin(session).await?;

        let query = query.trim().to_lowercase();
        let matches = |email: &Email| match query.strip_prefix("from ") {
            Some(sender) => email.sender().to_lowercase().contains(sender.trim()),
            None => {
                email.subject().to_lowercase().contains(&query)
                    || email.body().to_lowercase().contains(&query)
                    || email.sender().to_lowercase().contains(&query)
            }
        };
        Ok(lock(&self.inbox).iter().filter(|email| matches(email)).take(limit).cloned().collect())
    }

    async fn fetch(&self, session: &SessionLease, id: &MessageId) -> Result<Email, ExecutionError> {
        self.begin(session).await?;

        let inbox = lock(&self.inbox);
        let sent = lock(&self.sent);
        inbox
            .iter()
            .chain(sent.iter())
            .find(|email| email.id() == Some(id))
            .cloned()
            .ok_or_else(|| ExecutionError::MessageNotFound(id.0.clone()))
    }

    async fn delete(&self, session: &SessionLease, id: &MessageId) -> Result<Email, ExecutionError> {
        self.begin(session).await?;

        let mut inbox = lock(&self.inbox);
        let position = inbox
            .iter()
            .position(|email| email.id() == Some(id))
            .ok_or_else(|| ExecutionError::MessageNotFound(id.0.clone()))?;
        Ok(inbox.remove(position))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use mailvoice_core::conversation::CallerId;
    use mailvoice_core::domain::email::{Email, EmailParts, MessageId};
    use mailvoice_core::errors::ExecutionError;

    use super::InMemoryMailbox;
    use crate::executor::{AccountCredentials, CredentialVault, MailBackend};

    fn vault() -> CredentialVault {
        CredentialVault::new().with_fallback(AccountCredentials::new("me@example.com", "token"))
    }

    fn draft(to: &str) -> Email {
        Email::outbound(EmailParts {
            sender: "me@example.com".to_owned(),
            recipients: vec![to.to_owned()],
            subject: "hello".to_owned(),
            body: "hi there".to_owned(),
            ..EmailParts::default()
        })
        .expect("draft has a recipient")
    }

    #[tokio::test]
    async fn unknown_contacts_are_rejected() {
        let mailbox = InMemoryMailbox::with_sample_inbox();
        let session = vault().acquire(&CallerId("c".to_owned())).expect("lease");

        let error = mailbox.send(&session, draft("zed")).await.expect_err("zed is unknown");
        assert_eq!(error, ExecutionError::InvalidRecipient("zed".to_owned()));
        assert!(mailbox.sent().is_empty());
    }

    #[tokio::test]
    async fn search_by_sender_and_by_topic() {
        let mailbox = InMemoryMailbox::with_sample_inbox();
        let session = vault().acquire(&CallerId("c".to_owned())).expect("lease");

        let from_jane = mailbox.search(&session, "from jane", 10).await.expect("search");
        assert_eq!(from_jane.len(), 2);
        let budget = mailbox.search(&session, "Budget", 10).await.expect("search");
        assert_eq!(budget.len(), 1);
        assert_eq!(budget[0].subject(), "Quarterly budget");
    }

    #[tokio::test]
    async fn injected_faults_fire_once() {
        let mailbox = InMemoryMailbox::with_sample_inbox();
        let session = vault().acquire(&CallerId("c".to_owned())).expect("lease");
        mailbox.fail_next(ExecutionError::Backend("smtp 451".to_owned()));

        assert!(mailbox.recent(&session, 3).await.is_err());
        assert_eq!(mailbox.recent(&session, 3).await.expect("second call works").len(), 3);
    }

    #[tokio::test]
    async fn delete_removes_the_message() {
        let mailbox = InMemoryMailbox::with_sample_inbox();
        let session = vault().acquire(&CallerId("c".to_owned())).expect("lease");
        let id = MessageId("msg-2".to_owned());

        let deleted = mailbox.delete(&session, &id).await.expect("msg-2 exists");
        assert_eq!(deleted.subject(), "Lunch on Friday");
        assert_eq!(mailbox.inbox().len(), 4);
        assert!(matches!(
            mailbox.fetch(&session, &id).await,
            Err(ExecutionError::MessageNotFound(_))
        ));
    }
}
