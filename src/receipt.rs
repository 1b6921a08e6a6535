use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::dispatch::ReceiptOutcome;
use crate::error::ConnError;
use crate::frame::Frame;

enum State {
    /// No receipt was requested; resolves at once with the queued frame.
    Ready(Option<Frame>),
    Pending {
        id: String,
        rx: oneshot::Receiver<ReceiptOutcome>,
    },
}

/// Completion of a frame sent to the broker.
///
/// When the frame carried a `receipt` header this resolves with the
/// matching RECEIPT frame, or fails with [`ConnError::Server`] if the broker
/// answered with an ERROR for that receipt, or with
/// [`ConnError::ConnectionClosed`] if the connection ended first. Without a
/// receipt header it resolves immediately with the frame that was queued.
///
/// Dropping a `Receipt` does not cancel anything: the broker is not told,
/// and the correlation entry stays until the broker answers or the
/// connection ends.
pub struct Receipt {
    state: State,
}

impl Receipt {
    pub(crate) fn ready(frame: Frame) -> Self {
        Self {
            state: State::Ready(Some(frame)),
        }
    }

    pub(crate) fn pending(id: String, rx: oneshot::Receiver<ReceiptOutcome>) -> Self {
        Self {
            state: State::Pending { id, rx },
        }
    }

    /// The receipt id, if one was requested.
    pub fn id(&self) -> Option<&str> {
        match &self.state {
            State::Ready(_) => None,
            State::Pending { id, .. } => Some(id),
        }
    }

    /// Whether resolution waits for the broker.
    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, State::Pending { .. })
    }

    /// Wait for the outcome, giving up after `timeout`.
    ///
    /// # Example
    /// ```ignore
    /// let receipt = conn.send_with_receipt("/queue/orders", vec![], b"order").await?;
    /// receipt.wait(Duration::from_secs(5)).await?;
    /// ```
    pub async fn wait(self, timeout: Duration) -> Result<Frame, ConnError> {
        let id = self.id().unwrap_or_default().to_string();
        match tokio::time::timeout(timeout, self).await {
            Ok(result) => result,
            Err(_) => Err(ConnError::ReceiptTimeout(id)),
        }
    }
}

impl Future for Receipt {
    type Output = Result<Frame, ConnError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            State::Ready(frame) => Poll::Ready(
                frame
                    .take()
                    .ok_or_else(|| ConnError::Protocol("receipt polled after completion".into())),
            ),
            State::Pending { rx, .. } => Pin::new(rx).poll(cx).map(|res| match res {
                Ok(Ok(frame)) => Ok(frame),
                Ok(Err(server)) => Err(ConnError::Server(server)),
                Err(_) => Err(ConnError::ConnectionClosed),
            }),
        }
    }
}

impl std::fmt::Debug for Receipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receipt")
            .field("id", &self.id())
            .finish()
    }
}
