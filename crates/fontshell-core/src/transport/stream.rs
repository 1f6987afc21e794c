// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Framed-stream worker transport.
//!
//! [`attach_stream`] turns a reader/writer pair into a [`WorkerLink`] by
//! running two tasks: one encodes commands into frames, the other decodes
//! worker frames into [`WorkerEvent`]s. End of stream on the reader side is
//! reported as [`WorkerEvent::Exited`].

use std::io;

use async_trait::async_trait;
use fontshell_protocol::{
    CompiledFont, Frame, FrameError, FramedStream, MessageType, WorkerMessage, peek_request_id,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{WorkerCommand, WorkerEndpoint, WorkerEvent, WorkerLink, WorkerSpawner};
use crate::error::{Result, ShellError};

type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;
type Connector = Box<dyn Fn() -> io::Result<(BoxedReader, BoxedWriter)> + Send + Sync>;

/// Wrap a byte stream speaking the framed worker protocol.
///
/// Must be called from within a Tokio runtime.
pub fn attach_stream<R, W>(reader: R, writer: W) -> WorkerLink
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (link, endpoint) = WorkerLink::pair();
    let WorkerEndpoint { commands, events } = endpoint;
    let stop = CancellationToken::new();

    tokio::spawn(write_loop(
        FramedStream::new(writer),
        commands,
        events.clone(),
        stop.clone(),
    ));
    tokio::spawn(read_loop(FramedStream::new(reader), events, stop));

    link
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut framed: FramedStream<W>,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    stop: CancellationToken,
) {
    loop {
        let command = tokio::select! {
            _ = stop.cancelled() => break,
            command = commands.recv() => command,
        };

        let frame = match command {
            Some(WorkerCommand::Job(envelope)) => match Frame::json(MessageType::Job, &envelope) {
                Ok(frame) => frame,
                Err(e) => {
                    // The job never left the host; fail it like the worker would.
                    warn!(id = %envelope.id, error = %e, "failed to encode job");
                    let failure = WorkerMessage::failure(Some(envelope.id), format!("failed to encode job: {}", e));
                    let _ = events.send(WorkerEvent::Message(failure));
                    continue;
                }
            },
            Some(WorkerCommand::Shutdown) | None => {
                if let Err(e) = framed.write_frame(&Frame::shutdown()).await {
                    debug!(error = %e, "worker gone before shutdown frame");
                }
                break;
            }
        };

        if let Err(e) = framed.write_frame(&frame).await {
            warn!(error = %e, "failed to write to worker");
            let _ = events.send(WorkerEvent::Exited(ShellError::from(e).to_string()));
            stop.cancel();
            break;
        }
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut framed: FramedStream<R>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    stop: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = stop.cancelled() => break,
            frame = framed.read_frame() => frame,
        };

        match frame {
            Ok(frame) if frame.message_type == MessageType::Message => {
                match WorkerMessage::<CompiledFont>::decode(&frame.payload) {
                    Ok(message) => {
                        if events.send(WorkerEvent::Message(message)).is_err() {
                            break;
                        }
                    }
                    Err(e) => match peek_request_id(&frame.payload) {
                        // Fail just this request rather than leave its caller waiting.
                        Some(id) => {
                            warn!(%id, error = %e, "malformed worker response");
                            let failure =
                                WorkerMessage::failure(Some(id), ShellError::from(e).to_string());
                            if events.send(WorkerEvent::Message(failure)).is_err() {
                                break;
                            }
                        }
                        None => warn!(error = %e, "dropping malformed worker message"),
                    },
                }
            }
            Ok(frame) => {
                warn!(message_type = ?frame.message_type, "unexpected frame from worker");
            }
            Err(FrameError::ConnectionClosed) => {
                let _ = events.send(WorkerEvent::Exited(
                    "worker closed its output stream".to_string(),
                ));
                break;
            }
            Err(e) => {
                let _ = events.send(WorkerEvent::Exited(ShellError::from(e).to_string()));
                break;
            }
        }
    }

    stop.cancel();
}

/// Spawner that opens a new byte stream per worker session.
pub struct StreamSpawner {
    name: String,
    connect: Connector,
}

impl StreamSpawner {
    /// `connect` is called once per boot and must return a stream to a
    /// freshly started worker.
    pub fn new<F, R, W>(name: impl Into<String>, connect: F) -> Self
    where
        F: Fn() -> io::Result<(R, W)> + Send + Sync + 'static,
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            name: name.into(),
            connect: Box::new(move || {
                let (reader, writer) = connect()?;
                Ok((Box::new(reader) as BoxedReader, Box::new(writer) as BoxedWriter))
            }),
        }
    }
}

#[async_trait]
impl WorkerSpawner for StreamSpawner {
    async fn spawn(&self) -> Result<WorkerLink> {
        let (reader, writer) = (self.connect)()
            .map_err(|e| ShellError::BootError(format!("failed to connect to {}: {}", self.name, e)))?;
        Ok(attach_stream(reader, writer))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(feature = "process")]
pub use process::ProcessSpawner;

#[cfg(feature = "process")]
mod process {
    use std::process::Stdio;

    use async_trait::async_trait;
    use tokio::process::Command;
    use tracing::{info, warn};

    use super::attach_stream;
    use crate::error::{Result, ShellError};
    use crate::transport::{WorkerLink, WorkerSpawner};

    /// Runs the worker as a child process talking frames over stdin/stdout.
    ///
    /// The child's stderr is inherited so its own logs stay visible.
    #[derive(Debug, Clone)]
    pub struct ProcessSpawner {
        program: String,
        args: Vec<String>,
    }

    impl ProcessSpawner {
        pub fn new(program: impl Into<String>) -> Self {
            Self {
                program: program.into(),
                args: Vec::new(),
            }
        }

        pub fn arg(mut self, arg: impl Into<String>) -> Self {
            self.args.push(arg.into());
            self
        }

        /// Parse a whitespace-separated command line such as
        /// `fontc-worker --stdio`.
        pub fn from_command_line(line: &str) -> Result<Self> {
            let mut parts = line.split_whitespace();
            let program = parts
                .next()
                .ok_or_else(|| ShellError::Config("worker command is empty".to_string()))?;
            Ok(Self {
                program: program.to_string(),
                args: parts.map(str::to_string).collect(),
            })
        }

        pub fn program(&self) -> &str {
            &self.program
        }

        pub fn args(&self) -> &[String] {
            &self.args
        }
    }

    #[async_trait]
    impl WorkerSpawner for ProcessSpawner {
        async fn spawn(&self) -> Result<WorkerLink> {
            let mut child = Command::new(&self.program)
                .args(&self.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| {
                    ShellError::BootError(format!("failed to start {}: {}", self.program, e))
                })?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| ShellError::BootError("worker stdin unavailable".to_string()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| ShellError::BootError("worker stdout unavailable".to_string()))?;

            info!(program = %self.program, pid = ?child.id(), "worker process started");

            tokio::spawn(async move {
                match child.wait().await {
                    Ok(status) => info!(%status, "worker process exited"),
                    Err(e) => warn!(error = %e, "failed to wait for worker process"),
                }
            });

            Ok(attach_stream(stdout, stdin))
        }

        fn name(&self) -> &str {
            &self.program
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_from_command_line() {
            let spawner = ProcessSpawner::from_command_line("  fontc-worker --stdio  -v ").unwrap();
            assert_eq!(spawner.program(), "fontc-worker");
            assert_eq!(spawner.args(), ["--stdio".to_string(), "-v".to_string()]);
        }

        #[test]
        fn test_from_empty_command_line() {
            assert!(matches!(
                ProcessSpawner::from_command_line("   "),
                Err(ShellError::Config(_))
            ));
        }

        #[tokio::test]
        async fn test_missing_program_is_boot_error() {
            let spawner = ProcessSpawner::new("/nonexistent/fontshell-worker-binary");
            assert!(matches!(spawner.spawn().await, Err(ShellError::BootError(_))));
        }
    }
}
