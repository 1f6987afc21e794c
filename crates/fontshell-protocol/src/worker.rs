// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker-side helpers for hosting a compiler behind a framed stream.
//!
//! A worker process announces itself with [`serve`], which writes the
//! `{ready: true}` frame before reading any job. Workers that cannot start
//! report an id-less failure with [`announce_boot_failure`] and exit.

use std::future::Future;
use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument, warn};

use crate::frame::{Frame, FrameError, MessageType, read_frame, write_frame};
use crate::message::{JobEnvelope, WorkerMessage, peek_request_id};

/// Write a single worker message as a `Message` frame.
pub async fn write_message<W, R>(writer: &mut W, message: &WorkerMessage<R>) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    R: Serialize,
{
    let payload = message
        .encode()
        .map_err(|e| FrameError::Io(std::io::Error::other(e.to_string())))?;
    write_frame(writer, &Frame::new(MessageType::Message, payload)?).await
}

/// Report that the worker failed to initialize.
pub async fn announce_boot_failure<W: AsyncWrite + Unpin>(
    writer: &mut W,
    error: &str,
) -> Result<(), FrameError> {
    let message: WorkerMessage<()> = WorkerMessage::failure(None, error);
    write_message(writer, &message).await
}

/// Serve jobs until the host sends `Shutdown` or closes the stream.
///
/// Jobs are handled one at a time in arrival order. A job that cannot be
/// decoded is answered with a failure for its id; only a job with no
/// readable id is skipped.
#[instrument(skip_all)]
pub async fn serve<Rd, Wr, P, R, H, Fut>(
    mut reader: Rd,
    mut writer: Wr,
    mut handler: H,
) -> Result<(), FrameError>
where
    Rd: AsyncRead + Unpin,
    Wr: AsyncWrite + Unpin,
    P: DeserializeOwned,
    R: Serialize,
    H: FnMut(P) -> Fut,
    Fut: Future<Output = Result<R, String>>,
{
    write_message::<_, R>(&mut writer, &WorkerMessage::Ready).await?;
    info!("worker ready");

    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(FrameError::ConnectionClosed) => {
                info!("host closed the stream");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match frame.message_type {
            MessageType::Shutdown => {
                info!("shutdown requested");
                return Ok(());
            }
            MessageType::Message => {
                warn!("ignoring worker message sent to the worker");
            }
            MessageType::Job => {
                let envelope: JobEnvelope<P> = match frame.decode_json() {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        match peek_request_id(&frame.payload) {
                            Some(id) => {
                                warn!(%id, error = %e, "rejecting undecodable job");
                                let reply: WorkerMessage<R> =
                                    WorkerMessage::failure(Some(id), format!("undecodable job: {}", e));
                                write_message(&mut writer, &reply).await?;
                            }
                            None => warn!(error = %e, "dropping job without an id"),
                        }
                        continue;
                    }
                };

                let id = envelope.id;
                debug!(%id, "job received");
                let started = Instant::now();
                let reply = match handler(envelope.payload).await {
                    Ok(result) => WorkerMessage::Success {
                        id,
                        result,
                        time_taken_ms: started.elapsed().as_millis() as u64,
                    },
                    Err(error) => WorkerMessage::failure(Some(id), error),
                };
                write_message(&mut writer, &reply).await?;
            }
        }
    }
}
