//! Credential prompt broker.
//!
//! Decouples a flow that needs a secret from whoever supplies it. The flow
//! calls [`PromptBroker::ask`], hands the token to the outside world (the
//! broker also publishes a [`CredentialPrompt`] to its listeners) and then
//! [`PromptBroker::wait`]s. The outside world answers with
//! [`PromptBroker::resolve`].
//!
//! A token is answered at most once. `wait` invalidates the token whatever
//! the outcome, so a reply arriving after a timeout is rejected with
//! [`ConnectionError::UnknownToken`] instead of reaching anybody.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::{FutureExt, select};
use futures_timer::Delay;
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::Result;
use crate::api::models::{ConnectionError, CredentialPrompt, PromptReply, PromptRequest};

#[derive(Debug)]
struct Pending {
    request: PromptRequest,
    reply_tx: Option<oneshot::Sender<PromptReply>>,
    reply_rx: Option<oneshot::Receiver<PromptReply>>,
}

#[derive(Debug, Default)]
struct Inner {
    pending: HashMap<String, Pending>,
    listeners: Vec<mpsc::Sender<CredentialPrompt>>,
}

/// Token-based ask/wait/resolve protocol for secrets.
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use std::time::Duration;
/// use nmctl::{PromptBroker, PromptReply, PromptRequest};
///
/// # async fn example() -> nmctl::Result<()> {
/// let broker = PromptBroker::new(8);
/// let token = broker.ask(PromptRequest {
///     name: "Work VPN".into(),
///     fields: vec!["password".into()],
///     ..Default::default()
/// })?;
///
/// let mut secrets = HashMap::new();
/// secrets.insert("password".to_string(), "hunter2".to_string());
/// broker.resolve(&token, PromptReply::secrets(secrets, false))?;
///
/// let reply = broker.wait(&token, Duration::from_secs(60)).await?;
/// assert!(!reply.cancel);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PromptBroker {
    inner: Mutex<Inner>,
    closed: CancellationToken,
    listener_capacity: usize,
}

impl PromptBroker {
    pub fn new(listener_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            closed: CancellationToken::new(),
            listener_capacity: listener_capacity.max(1),
        }
    }

    /// Receives every prompt issued from now on.
    pub fn subscribe(&self) -> mpsc::Receiver<CredentialPrompt> {
        let (tx, rx) = mpsc::channel(self.listener_capacity);
        self.lock().listeners.push(tx);
        rx
    }

    /// Registers a prompt and returns its token. Does not block.
    pub fn ask(&self, request: PromptRequest) -> Result<String> {
        if self.closed.is_cancelled() {
            return Err(ConnectionError::BrokerClosed);
        }

        let token = Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        let prompt = CredentialPrompt {
            token: token.clone(),
            request: request.clone(),
        };

        let mut inner = self.lock();
        inner.pending.insert(
            token.clone(),
            Pending {
                request,
                reply_tx: Some(reply_tx),
                reply_rx: Some(reply_rx),
            },
        );
        inner.listeners.retain(|tx| match tx.try_send(prompt.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Prompt listener is full, it will miss prompt {}", prompt.token);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        debug!("Issued credential prompt {token}");
        Ok(token)
    }

    /// Waits for the reply to `token`, at most `timeout`.
    ///
    /// Only one caller can wait on a token. The token is gone when this
    /// returns.
    pub async fn wait(&self, token: &str, timeout: Duration) -> Result<PromptReply> {
        let reply_rx = self
            .lock()
            .pending
            .get_mut(token)
            .and_then(|p| p.reply_rx.take())
            .ok_or_else(|| {
                if self.closed.is_cancelled() {
                    ConnectionError::BrokerClosed
                } else {
                    ConnectionError::UnknownToken(token.to_string())
                }
            })?;

        // Dropping this future before it completes must still retire the token.
        let _retire = RetireToken { broker: self, token };

        let mut reply_rx = pin!(reply_rx.fuse());
        let mut timer = pin!(Delay::new(timeout).fuse());
        let mut closed = pin!(self.closed.cancelled().fuse());

        let outcome = select! {
            reply = reply_rx => reply.map_err(|_| ConnectionError::BrokerClosed),
            _ = timer => {
                warn!("Credential prompt {token} timed out after {timeout:?}");
                Err(ConnectionError::PromptTimeout)
            }
            _ = closed => Err(ConnectionError::BrokerClosed),
        };
        outcome
    }

    /// Delivers the reply for `token`.
    pub fn resolve(&self, token: &str, reply: PromptReply) -> Result<()> {
        let reply_tx = self
            .lock()
            .pending
            .get_mut(token)
            .and_then(|p| p.reply_tx.take())
            .ok_or_else(|| ConnectionError::UnknownToken(token.to_string()))?;

        reply_tx
            .send(reply)
            .map_err(|_| ConnectionError::UnknownToken(token.to_string()))?;
        debug!("Resolved credential prompt {token}");
        Ok(())
    }

    /// Prompts that were asked and not yet answered or abandoned.
    pub fn pending(&self) -> Vec<CredentialPrompt> {
        self.lock()
            .pending
            .iter()
            .filter(|(_, p)| p.reply_tx.is_some())
            .map(|(token, p)| CredentialPrompt {
                token: token.clone(),
                request: p.request.clone(),
            })
            .collect()
    }

    /// Fails every waiter with [`ConnectionError::BrokerClosed`] and refuses
    /// new prompts.
    pub fn shutdown(&self) {
        self.closed.cancel();
        let mut inner = self.lock();
        inner.pending.clear();
        inner.listeners.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a token from the pending table when dropped.
struct RetireToken<'a> {
    broker: &'a PromptBroker,
    token: &'a str,
}

impl Drop for RetireToken<'_> {
    fn drop(&mut self) {
        self.broker.lock().pending.remove(self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn request() -> PromptRequest {
        PromptRequest {
            name: "Work".into(),
            conn_type: "vpn".into(),
            setting: "vpn".into(),
            fields: vec!["password".into()],
            reason: "required".into(),
            ..Default::default()
        }
    }

    fn password(value: &str) -> PromptReply {
        let mut secrets = HashMap::new();
        secrets.insert("password".to_string(), value.to_string());
        PromptReply::secrets(secrets, false)
    }

    #[tokio::test]
    async fn resolve_before_wait_is_delivered() {
        let broker = PromptBroker::new(4);
        let token = broker.ask(request()).unwrap();
        broker.resolve(&token, password("a")).unwrap();

        let reply = broker.wait(&token, Duration::from_secs(5)).await.unwrap();
        assert_eq!(reply.secrets["password"], "a");
    }

    #[tokio::test]
    async fn second_resolve_is_rejected() {
        let broker = Arc::new(PromptBroker::new(4));
        let token = broker.ask(request()).unwrap();

        let waiter = {
            let broker = Arc::clone(&broker);
            let token = token.clone();
            tokio::spawn(async move { broker.wait(&token, Duration::from_secs(5)).await })
        };

        broker.resolve(&token, password("first")).unwrap();
        assert!(matches!(
            broker.resolve(&token, password("second")),
            Err(ConnectionError::UnknownToken(_))
        ));

        let reply = waiter.await.unwrap().unwrap();
        assert_eq!(reply.secrets["password"], "first");
    }

    #[tokio::test]
    async fn late_resolve_after_timeout_is_rejected() {
        let broker = PromptBroker::new(4);
        let token = broker.ask(request()).unwrap();

        let result = broker.wait(&token, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(ConnectionError::PromptTimeout)));
        assert!(matches!(
            broker.resolve(&token, password("late")),
            Err(ConnectionError::UnknownToken(_))
        ));
        assert!(broker.pending().is_empty());
    }

    #[tokio::test]
    async fn dropped_wait_retires_its_token() {
        let broker = PromptBroker::new(4);
        let token = broker.ask(request()).unwrap();

        let waited = tokio::time::timeout(
            Duration::from_millis(20),
            broker.wait(&token, Duration::from_secs(30)),
        )
        .await;
        assert!(waited.is_err());
        assert!(broker.pending().is_empty());
        assert!(matches!(
            broker.resolve(&token, password("late")),
            Err(ConnectionError::UnknownToken(_))
        ));
    }

    #[tokio::test]
    async fn cancel_reply_is_terminal() {
        let broker = PromptBroker::new(4);
        let token = broker.ask(request()).unwrap();
        broker.resolve(&token, PromptReply::cancelled()).unwrap();

        let reply = broker.wait(&token, Duration::from_secs(5)).await.unwrap();
        assert!(reply.cancel);
        assert!(reply.secrets.is_empty());
    }

    #[tokio::test]
    async fn unknown_token_cannot_be_waited_on() {
        let broker = PromptBroker::new(4);
        assert!(matches!(
            broker.wait("nope", Duration::from_secs(1)).await,
            Err(ConnectionError::UnknownToken(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_releases_waiters_and_refuses_new_prompts() {
        let broker = Arc::new(PromptBroker::new(4));
        let token = broker.ask(request()).unwrap();

        let waiter = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.wait(&token, Duration::from_secs(30)).await })
        };
        tokio::task::yield_now().await;
        broker.shutdown();

        assert!(matches!(
            waiter.await.unwrap(),
            Err(ConnectionError::BrokerClosed)
        ));
        assert!(matches!(
            broker.ask(request()),
            Err(ConnectionError::BrokerClosed)
        ));
    }

    #[tokio::test]
    async fn listeners_see_issued_prompts() {
        let broker = PromptBroker::new(4);
        let mut prompts = broker.subscribe();
        let token = broker.ask(request()).unwrap();

        let prompt = prompts.recv().await.unwrap();
        assert_eq!(prompt.token, token);
        assert_eq!(prompt.request.name, "Work");
        assert_eq!(broker.pending().len(), 1);
    }
}
