//! The single writer of a bridge stream.
//!
//! Every producer sends whole commands through a channel to one task that owns
//! the write half, so lines never interleave.

use super::{Command, LineCodec};
use crate::errors::{ProtocolError, ProtocolResult};
use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tracing::{error, trace};

enum Outgoing {
    Line(Command),
    Close,
}

#[derive(Clone)]
pub struct CommandWriter {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl CommandWriter {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn<W>(writer: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();
        let handle = tokio::spawn(async move {
            let mut sink = FramedWrite::new(writer, LineCodec::new());
            while let Some(outgoing) = rx.recv().await {
                match outgoing {
                    Outgoing::Line(command) => {
                        trace!("-> {}", command);
                        // send() flushes after every line
                        if let Err(e) = sink.send(command).await {
                            error!("Bridge write failed: {}", e);
                            break;
                        }
                    }
                    Outgoing::Close => break,
                }
            }
            if let Err(e) = sink.close().await {
                trace!("Closing bridge output: {}", e);
            }
        });
        (Self { tx }, handle)
    }

    pub fn send(&self, command: Command) -> ProtocolResult<()> {
        self.tx
            .send(Outgoing::Line(command))
            .map_err(|_| ProtocolError::Disconnected)
    }

    /// Flush what is queued, then close the output stream.
    pub fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
