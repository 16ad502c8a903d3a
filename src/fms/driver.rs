//! Async driver that owns a [`Session`] on a tokio task.
//!
//! BLE callbacks, UI actions and the caller all talk to the task through a
//! [`SessionHandle`]. Inputs are processed one at a time to completion, so the
//! session itself needs no locking.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use super::command::{CaptureOptions, Command};
use super::error::{Failure, FmsError};
use super::events::{CaptureResult, CommandResult, DeviceInfo, TemplateResult};
use super::session::{Responder, Session};
use super::transport::Transport;

/// Work item for the session task.
#[derive(Debug)]
pub(crate) enum Input {
    Frame(Vec<u8>),
    Connected(DeviceInfo),
    Disconnected,
    Submit(Command, Responder),
}

/// Move `session` onto a new task.
///
/// The task runs until every [`SessionHandle`] is dropped, then tears the
/// session down and hands it back through the join handle.
pub fn spawn<T>(mut session: Session<T>) -> (SessionHandle, JoinHandle<Session<T>>)
where
    T: Transport + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        while let Some(input) = rx.recv().await {
            match input {
                Input::Frame(frame) => session.handle_frame(&frame),
                Input::Connected(device) => session.connected(device),
                Input::Disconnected => session.disconnect(),
                Input::Submit(command, responder) => {
                    if let Err((error, responder)) = session.submit(command, responder) {
                        responder.fail(Failure::new(error).with_user(command.user_id()));
                    }
                }
            }
        }
        debug!("All session handles dropped");
        session.disconnect();
        session
    });

    (SessionHandle { tx }, task)
}

/// Cloneable handle to a running session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Input>,
}

impl SessionHandle {
    /// Queue one inbound notification frame.
    pub fn push_frame(&self, frame: impl Into<Vec<u8>>) -> Result<(), FmsError> {
        self.send(Input::Frame(frame.into()))
    }

    pub fn connected(&self, device: DeviceInfo) -> Result<(), FmsError> {
        self.send(Input::Connected(device))
    }

    pub fn disconnected(&self) -> Result<(), FmsError> {
        self.send(Input::Disconnected)
    }

    pub async fn get_version(&self) -> CommandResult {
        self.command(Command::GetVersion).await
    }

    pub async fn register_start(&self, user_id: u16, is_admin: bool) -> CommandResult {
        self.command(Command::RegisterStart { user_id, is_admin }).await
    }

    pub async fn register_end(&self) -> CommandResult {
        self.command(Command::RegisterEnd).await
    }

    pub async fn verify(&self, user_id: u16) -> CommandResult {
        self.command(Command::Verify { user_id }).await
    }

    pub async fn match_user(&self, user_id: u16) -> CommandResult {
        self.command(Command::Match { user_id }).await
    }

    pub async fn identify(&self) -> CommandResult {
        self.command(Command::Identify).await
    }

    pub async fn delete_user(&self, user_id: u16) -> CommandResult {
        self.command(Command::Delete { user_id }).await
    }

    pub async fn delete_all(&self) -> CommandResult {
        self.command(Command::DeleteAll).await
    }

    pub async fn set_power_off_time(&self, minutes: u16) -> CommandResult {
        self.command(Command::SetPowerOffTime { minutes }).await
    }

    pub async fn capture(&self, options: CaptureOptions) -> CaptureResult {
        let (tx, rx) = oneshot::channel();
        self.request(Command::Capture(options), Responder::Capture(tx), rx).await
    }

    pub async fn get_template(&self, user_id: u16) -> TemplateResult {
        let (tx, rx) = oneshot::channel();
        self.request(Command::GetTemplate { user_id }, Responder::Template(tx), rx)
            .await
    }

    async fn command(&self, command: Command) -> CommandResult {
        let (tx, rx) = oneshot::channel();
        self.request(command, Responder::Command(tx), rx).await
    }

    async fn request<R>(
        &self,
        command: Command,
        responder: Responder,
        rx: oneshot::Receiver<Result<R, Failure>>,
    ) -> Result<R, Failure> {
        let closed = || Failure::new(FmsError::Disconnected).with_user(command.user_id());
        if self.tx.send(Input::Submit(command, responder)).is_err() {
            return Err(closed());
        }
        // Sender dropped: the session was disconnected before a reply
        rx.await.unwrap_or_else(|_| Err(closed()))
    }

    fn send(&self, input: Input) -> Result<(), FmsError> {
        self.tx.send(input).map_err(|_| FmsError::Disconnected)
    }
}
