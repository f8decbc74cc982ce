//! # Preview Sync Channel
//!
//! One-way push of section state into the preview context.
//!
//! ```text
//!            send()                 ready + port
//! editor ──────────► [ buffer ] ──────────────────► preview
//!                        │  on ready: FULL_REPLACE, then buffer in order
//! ```
//!
//! - Until the preview signals ready, messages queue in FIFO order
//! - The first message a newly ready preview sees is always a full replace
//! - A failed post never reaches the caller: the port is dropped, the channel
//!   goes back to waiting and the message stays buffered
//! - After [`SyncChannel::dispose`] every send is silently dropped

use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::protocol::{OutboundMessage, SyncUpdate};
use storefront_common::Section;

/// The preview handle is gone
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Preview port is closed")]
pub struct PortClosed;

/// Transport into the preview context
pub trait PreviewPort: Send {
    fn post(&mut self, message: &OutboundMessage) -> Result<(), PortClosed>;
}

impl<F> PreviewPort for F
where
    F: FnMut(&OutboundMessage) -> Result<(), PortClosed> + Send,
{
    fn post(&mut self, message: &OutboundMessage) -> Result<(), PortClosed> {
        self(message)
    }
}

/// Port backed by an in-process tokio channel
#[derive(Debug, Clone)]
pub struct MpscPort {
    sender: mpsc::UnboundedSender<OutboundMessage>,
}

impl PreviewPort for MpscPort {
    fn post(&mut self, message: &OutboundMessage) -> Result<(), PortClosed> {
        self.sender.send(message.clone()).map_err(|_| PortClosed)
    }
}

/// Receiving end of an [`MpscPort`], held by the preview side
#[derive(Debug)]
pub struct PreviewEndpoint {
    messages: UnboundedReceiverStream<OutboundMessage>,
}

impl PreviewEndpoint {
    /// Wait for the next message; `None` once the port is dropped
    pub async fn next(&mut self) -> Option<OutboundMessage> {
        self.messages.next().await
    }

    /// Everything already delivered, without waiting
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        let mut received = Vec::new();
        while let Ok(message) = self.messages.as_mut().try_recv() {
            received.push(message);
        }
        received
    }
}

/// Connected port/endpoint pair
pub fn preview_link() -> (MpscPort, PreviewEndpoint) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        MpscPort { sender },
        PreviewEndpoint {
            messages: UnboundedReceiverStream::new(receiver),
        },
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No ready signal yet (or the port went away); sends are buffered
    Waiting,
    /// Sends go straight to the port
    Ready,
    /// Torn down; sends are dropped
    Disposed,
}

pub struct SyncChannel {
    port: Option<Box<dyn PreviewPort>>,
    buffer: VecDeque<OutboundMessage>,
    state: ChannelState,
    delivered: u64,
}

impl std::fmt::Debug for SyncChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncChannel")
            .field("attached", &self.port.is_some())
            .field("buffered", &self.buffer.len())
            .field("state", &self.state)
            .field("delivered", &self.delivered)
            .finish()
    }
}

impl SyncChannel {
    pub fn new() -> Self {
        Self {
            port: None,
            buffer: VecDeque::new(),
            state: ChannelState::Waiting,
            delivered: 0,
        }
    }

    /// Establish the handle to the preview. Sends keep buffering until ready.
    pub fn attach(&mut self, port: impl PreviewPort + 'static) {
        if self.state == ChannelState::Disposed {
            tracing::debug!("[SyncChannel] attach ignored, channel disposed");
            return;
        }
        self.port = Some(Box::new(port));
        self.state = ChannelState::Waiting;
    }

    /// Forget the current handle, e.g. when the preview reloads
    pub fn detach(&mut self) {
        self.port = None;
        if self.state == ChannelState::Ready {
            self.state = ChannelState::Waiting;
        }
    }

    /// Handle the preview's ready signal.
    ///
    /// Sends a full replace of `current` followed by every buffered message.
    /// Without an attached port the channel stays in waiting.
    pub fn mark_ready(&mut self, current: &[Section]) {
        match self.state {
            ChannelState::Disposed => return,
            ChannelState::Ready | ChannelState::Waiting if self.port.is_none() => {
                tracing::warn!("[SyncChannel] ready signal without an attached port");
                return;
            }
            _ => {}
        }

        self.state = ChannelState::Ready;
        let baseline = OutboundMessage::sync(SyncUpdate::full_replace(current));
        if !self.deliver(baseline.clone()) {
            self.buffer.push_front(baseline);
            return;
        }

        let buffered = self.buffer.len();
        while let Some(message) = self.buffer.pop_front() {
            if !self.deliver(message.clone()) {
                self.buffer.push_front(message);
                return;
            }
        }
        if buffered > 0 {
            tracing::debug!("[SyncChannel] flushed {} buffered message(s)", buffered);
        }
    }

    /// Push an update to the preview, buffering while it is not ready
    pub fn send(&mut self, update: SyncUpdate) {
        let message = OutboundMessage::sync(update);
        match self.state {
            ChannelState::Disposed => {
                tracing::trace!("[SyncChannel] dropped {:?}, channel disposed", message.kind());
            }
            ChannelState::Waiting => self.buffer.push_back(message),
            ChannelState::Ready => {
                if !self.deliver(message.clone()) {
                    self.buffer.push_back(message);
                }
            }
        }
    }

    /// Post one message; on failure drop the port and fall back to waiting
    fn deliver(&mut self, message: OutboundMessage) -> bool {
        let Some(port) = self.port.as_mut() else {
            self.state = ChannelState::Waiting;
            return false;
        };
        match port.post(&message) {
            Ok(()) => {
                self.delivered += 1;
                true
            }
            Err(PortClosed) => {
                tracing::warn!("[SyncChannel] preview port closed, buffering until ready");
                self.port = None;
                self.state = ChannelState::Waiting;
                false
            }
        }
    }

    /// Stop for good; pending and future messages are dropped
    pub fn dispose(&mut self) {
        self.port = None;
        self.buffer.clear();
        self.state = ChannelState::Disposed;
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ChannelState::Ready
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Messages successfully posted so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl Default for SyncChannel {
    fn default() -> Self {
        Self::new()
    }
}
