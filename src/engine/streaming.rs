//! Async fragment stream for incremental responses.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::output::GenerationResult;
use crate::session::SessionError;

/// Fragments buffered before the generating thread blocks.
const STREAM_BUFFER: usize = 64;

type GenerationTask = JoinHandle<Result<GenerationResult, SessionError>>;

/// Stream of decoded fragments from a generation running on a blocking
/// thread. Once the stream ends, `result` yields the final outcome.
pub struct FragmentStream {
    receiver: mpsc::Receiver<String>,
    cancel: CancellationToken,
    task: Option<GenerationTask>,
}

impl FragmentStream {
    pub(crate) fn channel(cancel: CancellationToken) -> (mpsc::Sender<String>, Self) {
        let (sender, receiver) = mpsc::channel(STREAM_BUFFER);
        (sender, Self { receiver, cancel, task: None })
    }

    pub(crate) fn with_task(mut self, task: GenerationTask) -> Self {
        self.task = Some(task);
        self
    }

    /// Receive the next fragment, if any.
    pub async fn next_fragment(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Request cancellation. Fragments already sent remain readable.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the generation to finish and return its result.
    ///
    /// Unread fragments are dropped; they are also present in the result.
    pub async fn result(mut self) -> Result<GenerationResult, SessionError> {
        let Some(mut task) = self.task.take() else {
            return Err(SessionError::Cancelled);
        };
        // Keep draining so the generating thread never blocks on a full buffer.
        let joined = loop {
            tokio::select! {
                joined = &mut task => break joined,
                Some(_) = self.receiver.recv() => {}
            }
        };
        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(SessionError::Cancelled),
        }
    }

    /// Drain every remaining fragment, then return the result.
    pub async fn collect_text(mut self) -> Result<(String, GenerationResult), SessionError> {
        let mut text = String::new();
        while let Some(fragment) = self.receiver.recv().await {
            text.push_str(&fragment);
        }
        let result = self.result().await?;
        Ok((text, result))
    }
}

impl Stream for FragmentStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.receiver.poll_recv(cx)
    }
}
