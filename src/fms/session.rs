//! Session state and the command/response correlator.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::codec::{WsqDecoder, finalize_image};
use super::command::{CaptureOptions, Command, ResultFields};
use super::error::{Failure, FmsError, ProtocolError, Result};
use super::events::{
    CaptureComplete, CaptureResult, CommandReply, CommandResult, DeviceEvent, DeviceInfo, Progress, TemplateReply,
    TemplateResult,
};
use super::header::Header;
use super::transfer::{Phase, Transfer, TransferKind};
use super::transport::Transport;
use super::trigger::{FrameKind, classify};
use super::types::{CMD_GET_IMAGE, CMD_GET_TEMPLATE, HEADER_SIZE, command_name};
use crate::config::ProtocolConfig;
use crate::image::{ImageSize, scale_nearest};

/// Caller handle for an issued command. Resolves exactly once, or errors
/// with `RecvError` if the connection is torn down first.
pub type Pending<T> = oneshot::Receiver<T>;

/// Where the result of the outstanding command goes.
#[derive(Debug)]
pub(crate) enum Responder {
    Command(oneshot::Sender<CommandResult>),
    Capture(oneshot::Sender<CaptureResult>),
    Template(oneshot::Sender<TemplateResult>),
}

impl Responder {
    pub(crate) fn fail(self, failure: Failure) {
        // A dropped receiver means the caller stopped waiting
        let _ = match self {
            Self::Command(tx) => tx.send(Err(failure)).map_err(drop),
            Self::Capture(tx) => tx.send(Err(failure)).map_err(drop),
            Self::Template(tx) => tx.send(Err(failure)).map_err(drop),
        };
    }
}

/// The single in-flight command.
#[derive(Debug)]
struct PendingCommand {
    command: Command,
    responder: Responder,
}

/// One connection to a reader and all protocol state that belongs to it.
pub struct Session<T: Transport> {
    transport: T,
    decoder: Box<dyn WsqDecoder + Send>,
    events: mpsc::UnboundedSender<DeviceEvent>,
    pending: Option<PendingCommand>,
    image: Transfer,
    template: Transfer,
    capture_size: ImageSize,
    strict_checksum: bool,
    device: Option<DeviceInfo>,
}

impl<T: Transport> Session<T> {
    pub fn new(
        transport: T,
        decoder: Box<dyn WsqDecoder + Send>,
        events: mpsc::UnboundedSender<DeviceEvent>,
        config: &ProtocolConfig,
    ) -> Self {
        Self {
            transport,
            decoder,
            events,
            pending: None,
            image: Transfer::new(TransferKind::Image, config.max_image_size),
            template: Transfer::new(TransferKind::Template, config.max_template_size),
            capture_size: ImageSize::Full,
            strict_checksum: config.strict_checksum,
            device: None,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    /// Whether a command is outstanding.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Code of the outstanding command.
    pub fn pending_command(&self) -> Option<u8> {
        self.pending.as_ref().map(|p| p.command.code())
    }

    pub fn transfer(&self, kind: TransferKind) -> &Transfer {
        match kind {
            TransferKind::Image => &self.image,
            TransferKind::Template => &self.template,
        }
    }

    fn transfer_mut(&mut self, kind: TransferKind) -> &mut Transfer {
        match kind {
            TransferKind::Image => &mut self.image,
            TransferKind::Template => &mut self.template,
        }
    }

    pub fn image_phase(&self) -> Phase {
        self.image.phase()
    }

    pub fn template_phase(&self) -> Phase {
        self.template.phase()
    }

    // ---- connection lifecycle ----

    /// Link is up and the notify channel is configured.
    pub fn connected(&mut self, device: DeviceInfo) {
        info!("Connected to {} ({})", device.name.as_deref().unwrap_or("unknown"), device.address);
        self.device = Some(device.clone());
        self.emit(DeviceEvent::ConnectionStateChange {
            connected: true,
            device: Some(device),
        });
    }

    /// Tear down all protocol state.
    ///
    /// The pending caller is dropped without a result and both transfers go
    /// back to idle without emitting anything.
    pub fn disconnect(&mut self) {
        if let Some(pending) = self.pending.take() {
            warn!("Dropping pending {} on disconnect", pending.command.name());
        }
        self.image.reset();
        self.template.reset();
        self.capture_size = ImageSize::Full;
        if self.device.take().is_some() {
            info!("Disconnected");
        }
        self.emit(DeviceEvent::ConnectionStateChange {
            connected: false,
            device: None,
        });
    }

    // ---- commands ----

    pub fn get_version(&mut self) -> Result<Pending<CommandResult>> {
        self.single(Command::GetVersion)
    }

    pub fn register_start(&mut self, user_id: u16, is_admin: bool) -> Result<Pending<CommandResult>> {
        self.single(Command::RegisterStart { user_id, is_admin })
    }

    pub fn register_end(&mut self) -> Result<Pending<CommandResult>> {
        self.single(Command::RegisterEnd)
    }

    pub fn verify(&mut self, user_id: u16) -> Result<Pending<CommandResult>> {
        self.single(Command::Verify { user_id })
    }

    /// Match score of the finger on the sensor against `user_id`.
    pub fn match_user(&mut self, user_id: u16) -> Result<Pending<CommandResult>> {
        self.single(Command::Match { user_id })
    }

    pub fn identify(&mut self) -> Result<Pending<CommandResult>> {
        self.single(Command::Identify)
    }

    pub fn delete_user(&mut self, user_id: u16) -> Result<Pending<CommandResult>> {
        self.single(Command::Delete { user_id })
    }

    pub fn delete_all(&mut self) -> Result<Pending<CommandResult>> {
        self.single(Command::DeleteAll)
    }

    pub fn set_power_off_time(&mut self, minutes: u16) -> Result<Pending<CommandResult>> {
        self.single(Command::SetPowerOffTime { minutes })
    }

    /// Start an image capture. Progress and completion are also emitted as events.
    pub fn capture(&mut self, options: CaptureOptions) -> Result<Pending<CaptureResult>> {
        let (tx, rx) = oneshot::channel();
        self.submit(Command::Capture(options), Responder::Capture(tx))
            .map_err(|(e, _)| e)?;
        Ok(rx)
    }

    /// Download the enrolled template of `user_id`.
    pub fn get_template(&mut self, user_id: u16) -> Result<Pending<TemplateResult>> {
        let (tx, rx) = oneshot::channel();
        self.submit(Command::GetTemplate { user_id }, Responder::Template(tx))
            .map_err(|(e, _)| e)?;
        Ok(rx)
    }

    fn single(&mut self, command: Command) -> Result<Pending<CommandResult>> {
        let (tx, rx) = oneshot::channel();
        self.submit(command, Responder::Command(tx)).map_err(|(e, _)| e)?;
        Ok(rx)
    }

    /// Send `command` and record it as the pending command.
    ///
    /// On rejection the responder is handed back untouched.
    pub(crate) fn submit(
        &mut self,
        command: Command,
        responder: Responder,
    ) -> std::result::Result<(), (FmsError, Responder)> {
        if let Some(pending) = &self.pending {
            warn!(
                "{} rejected: {} still pending",
                command.name(),
                pending.command.name()
            );
            return Err((FmsError::CommandBusy, responder));
        }

        if let Err(e) = command.validate() {
            return Err((e, responder));
        }

        let packet = command.to_header().encode();
        if let Err(e) = self.transport.write(&packet) {
            error!("{} write failed: {e}", command.name());
            return Err((e.into(), responder));
        }

        if let Some(kind) = command.transfer_kind() {
            if let Command::Capture(options) = command {
                self.capture_size = options.size;
            }
            self.transfer_mut(kind).begin();
        }

        info!("Sent {} ({:#04x})", command.name(), command.code());
        self.pending = Some(PendingCommand { command, responder });
        Ok(())
    }

    // ---- inbound ----

    /// Process one inbound frame to completion.
    pub fn handle_frame(&mut self, frame: &[u8]) {
        match classify(frame, self.transport.notify_active()) {
            FrameKind::PullTrigger => {
                debug!("[FMS] RX pull trigger");
                if let Err(e) = self.transport.read_next() {
                    error!("Read request failed: {e}");
                    if let Some(kind) = self.active_transfer() {
                        self.fail_transfer(kind, e.into());
                    }
                }
            }
            FrameKind::Header => self.handle_header(frame),
            FrameKind::Chunk => self.handle_chunk(frame),
            FrameKind::Empty => warn!("{}", ProtocolError::UnexpectedFrame { len: 0 }),
        }
    }

    fn handle_header(&mut self, frame: &[u8]) {
        let Ok(raw) = <&[u8; HEADER_SIZE]>::try_from(frame) else {
            warn!("{}", ProtocolError::UnexpectedFrame { len: frame.len() });
            return;
        };
        let header = Header::decode(raw);
        debug!("[FMS] RX header: {:02X?}", raw);

        if let Err(e) = header.validate() {
            if self.strict_checksum {
                warn!("Dropping header: {e}");
                self.reject_header(&header, e.into());
                return;
            }
            warn!("{e} (ignored)");
        }

        for kind in [TransferKind::Image, TransferKind::Template] {
            if header.command == pipeline_command(kind) && self.transfer(kind).phase() == Phase::AwaitingHeader {
                self.start_stream(kind, &header, raw);
                return;
            }
        }

        let matches_pending = self
            .pending
            .as_ref()
            .is_some_and(|p| p.command.code() == header.command && p.command.transfer_kind().is_none());
        if matches_pending {
            self.resolve_command(&header);
            return;
        }

        debug!(
            "Unsolicited header for {} ({:#04x})",
            command_name(header.command).unwrap_or("unknown command"),
            header.command
        );
        self.emit(DeviceEvent::DataReceived {
            command: header.command,
            data: raw.to_vec(),
        });
    }

    /// Fail whatever was waiting for a header that could not be trusted.
    fn reject_header(&mut self, header: &Header, error: FmsError) {
        for kind in [TransferKind::Image, TransferKind::Template] {
            if header.command == pipeline_command(kind) && self.transfer(kind).phase() == Phase::AwaitingHeader {
                self.fail_transfer(kind, error);
                return;
            }
        }
        if self.pending_command() == Some(header.command) {
            if let Some(pending) = self.pending.take() {
                let user_id = pending.command.user_id();
                pending.responder.fail(Failure::new(error).with_user(user_id));
            }
        }
    }

    fn resolve_command(&mut self, header: &Header) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let name = pending.command.name();
        let requested_user = pending.command.user_id();
        let reported_user = match header.param1 as u16 {
            0 => requested_user,
            id => Some(id),
        };

        let mut reply = CommandReply {
            command: header.command,
            message: format!("{name} succeeded"),
            user_id: requested_user,
            score: None,
            version: None,
            firmware: None,
        };
        match ResultFields::for_command(header.command) {
            ResultFields::UserAndScore => {
                reply.user_id = reported_user;
                reply.score = Some(header.param2 as u16);
            }
            ResultFields::User => reply.user_id = reported_user,
            ResultFields::Version => {
                let [minor, major] = header.param1.to_le_bytes();
                reply.version = Some(format!("{major}.{minor}"));
                reply.firmware = Some((header.param2 as u16).to_string());
            }
            ResultFields::None => {}
        }

        match header.device_error() {
            Some(e) => {
                warn!("{name} failed: {e} (code {:#04x})", e.code());
                let failure = Failure::new(e.into())
                    .with_user(reply.user_id)
                    .with_message(format!("{name} failed: {e}"));
                pending.responder.fail(failure);
            }
            None => {
                info!("{}", reply.message);
                match pending.responder {
                    Responder::Command(tx) => {
                        let _ = tx.send(Ok(reply));
                    }
                    other => other.fail(Failure::new(ProtocolError::UnexpectedFrame { len: HEADER_SIZE }.into())),
                }
            }
        }
    }

    // ---- streaming ----

    fn active_transfer(&self) -> Option<TransferKind> {
        [TransferKind::Image, TransferKind::Template]
            .into_iter()
            .find(|kind| self.transfer(*kind).phase() == Phase::Streaming)
    }

    fn start_stream(&mut self, kind: TransferKind, header: &Header, raw: &[u8; HEADER_SIZE]) {
        let declared = kind.declared_size(raw);
        let compressed = kind == TransferKind::Image && header.is_compressed();

        match self.transfer_mut(kind).accept_header(declared, header.error, compressed) {
            Ok(total) => {
                info!("{kind:?} download starting: {total} bytes");
                self.emit(DeviceEvent::progress(
                    kind,
                    Progress::downloading(0, format!("Downloading {total} bytes")),
                ));
                self.pull_next(kind);
            }
            Err(e) => self.fail_transfer(kind, e),
        }
    }

    fn handle_chunk(&mut self, chunk: &[u8]) {
        let Some(kind) = self.active_transfer() else {
            warn!("{} with no transfer streaming", ProtocolError::UnexpectedFrame { len: chunk.len() });
            return;
        };

        let progress = self.transfer_mut(kind).accept_chunk(chunk);
        let transfer = self.transfer(kind);
        let message = format!("Received {}/{} bytes", transfer.received(), transfer.total());
        self.emit(DeviceEvent::progress(kind, Progress::downloading(progress.percent, message)));

        if progress.complete {
            self.finish_transfer(kind);
        } else {
            self.pull_next(kind);
        }
    }

    fn pull_next(&mut self, kind: TransferKind) {
        if let Err(e) = self.transport.read_next() {
            error!("Chunk request failed: {e}");
            self.fail_transfer(kind, e.into());
        }
    }

    /// Pending command waiting on pipeline `kind`.
    fn take_pending_for(&mut self, kind: TransferKind) -> Option<PendingCommand> {
        if self.pending.as_ref()?.command.transfer_kind() == Some(kind) {
            return self.pending.take();
        }
        None
    }

    fn fail_transfer(&mut self, kind: TransferKind, error: FmsError) {
        self.transfer_mut(kind).reset();
        error!("{kind:?} transfer failed: {error}");
        self.emit(DeviceEvent::progress(kind, Progress::error(0, error.to_string())));
        if let Some(pending) = self.take_pending_for(kind) {
            let user_id = pending.command.user_id();
            pending.responder.fail(Failure::new(error).with_user(user_id));
        }
    }

    fn finish_transfer(&mut self, kind: TransferKind) {
        let pending = self.take_pending_for(kind);
        let transfer = self.transfer(kind);
        let size = transfer.received();
        let elapsed_ms = transfer.elapsed_ms();

        match kind {
            TransferKind::Image => {
                let device_dims = self.capture_size.device_size().dimensions();
                let mut image = finalize_image(
                    self.decoder.as_ref(),
                    transfer.payload(),
                    transfer.is_compressed(),
                    device_dims,
                );
                if !image.is_wsq && self.capture_size.needs_scaling() {
                    let (width, height) = self.capture_size.dimensions();
                    image.data = scale_nearest(&image.data, image.width, image.height, width, height);
                    image.width = width;
                    image.height = height;
                }

                let complete = CaptureComplete {
                    success: true,
                    image_data: image.data,
                    width: image.width,
                    height: image.height,
                    is_wsq: image.is_wsq,
                    size,
                    message: "Capture complete".to_string(),
                    elapsed_ms,
                };
                info!(
                    "Capture complete: {size} bytes, {}x{} (wsq={}) in {elapsed_ms}ms",
                    complete.width, complete.height, complete.is_wsq
                );
                self.emit(DeviceEvent::CaptureComplete(complete.clone()));
                if let Some(PendingCommand {
                    responder: Responder::Capture(tx),
                    ..
                }) = pending
                {
                    let _ = tx.send(Ok(complete));
                }
            }
            TransferKind::Template => {
                let user_id = pending.as_ref().and_then(|p| p.command.user_id()).unwrap_or_default();
                let reply = TemplateReply {
                    user_id,
                    template: transfer.payload().to_vec(),
                    size,
                    message: "Template received".to_string(),
                };
                info!("Template for user {user_id} received: {size} bytes in {elapsed_ms}ms");
                self.emit(DeviceEvent::TemplateReceived(reply.clone()));
                if let Some(PendingCommand {
                    responder: Responder::Template(tx),
                    ..
                }) = pending
                {
                    let _ = tx.send(Ok(reply));
                }
            }
        }

        self.transfer_mut(kind).reset();
        let message = match kind {
            TransferKind::Image => "Capture complete",
            TransferKind::Template => "Template complete",
        };
        self.emit(DeviceEvent::progress(kind, Progress::complete(message)));
    }

    fn emit(&self, event: DeviceEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

fn pipeline_command(kind: TransferKind) -> u8 {
    match kind {
        TransferKind::Image => CMD_GET_IMAGE,
        TransferKind::Template => CMD_GET_TEMPLATE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fms::codec::NoWsqDecoder;
    use crate::fms::error::{DeviceError, TransportError};
    use crate::fms::transport::RecordingTransport;
    use crate::fms::types::CMD_FP_VERIFY;

    fn session() -> (Session<RecordingTransport>, mpsc::UnboundedReceiver<DeviceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(
            RecordingTransport::new(),
            Box::new(NoWsqDecoder),
            tx,
            &ProtocolConfig::default(),
        );
        (session, rx)
    }

    #[test]
    fn test_submit_writes_encoded_header() {
        let (mut session, _events) = session();
        let _rx = session.verify(5).unwrap();
        let written = session.transport().last_write().unwrap();
        assert_eq!(written, &Command::Verify { user_id: 5 }.to_header().encode()[..]);
        assert_eq!(session.pending_command(), Some(CMD_FP_VERIFY));
    }

    #[test]
    fn test_invalid_user_id_not_sent() {
        let (mut session, _events) = session();
        assert_eq!(session.verify(0).unwrap_err(), FmsError::InvalidUserId(0));
        assert!(session.transport().writes.is_empty());
        assert!(!session.is_busy());
    }

    #[test]
    fn test_write_failure_clears_state() {
        let (mut session, _events) = session();
        session.transport_mut().fail_write = Some(TransportError::WriteFailed("gatt busy".to_string()));
        let err = session.get_template(3).unwrap_err();
        assert!(matches!(err, FmsError::Transport(TransportError::WriteFailed(_))));
        assert!(!session.is_busy());
        assert_eq!(session.template_phase(), Phase::Idle);
    }

    #[test]
    fn test_delete_reports_affected_user() {
        let (mut session, _events) = session();
        let mut rx = session.delete_user(42).unwrap();
        let header = Header::request(Command::Delete { user_id: 42 }.code(), 42, 0);
        session.handle_frame(&header.encode());

        let reply = rx.try_recv().unwrap().unwrap();
        assert_eq!(reply.user_id, Some(42));
        assert!(!session.is_busy());
    }

    #[test]
    fn test_identify_reports_match() {
        let (mut session, _events) = session();
        let mut rx = session.identify().unwrap();
        let header = Header::request(Command::Identify.code(), 17, 93);
        session.handle_frame(&header.encode());

        let reply = rx.try_recv().unwrap().unwrap();
        assert_eq!(reply.user_id, Some(17));
        assert_eq!(reply.score, Some(93));
    }

    #[test]
    fn test_identify_failure() {
        let (mut session, _events) = session();
        let mut rx = session.identify().unwrap();
        let mut header = Header::request(Command::Identify.code(), 0, 0);
        header.error = 0x1B;
        session.handle_frame(&header.encode());

        let failure = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(failure.error, FmsError::Device(DeviceError::IdentifyFailed));
        assert_eq!(failure.user_id, None);
    }

    #[test]
    fn test_match_reports_score() {
        let (mut session, _events) = session();
        let mut rx = session.match_user(12).unwrap();
        let header = Header::request(Command::Match { user_id: 12 }.code(), 0, 145);
        session.handle_frame(&header.encode());

        let reply = rx.try_recv().unwrap().unwrap();
        assert_eq!(reply.user_id, Some(12));
        assert_eq!(reply.score, Some(145));
        assert!(!session.is_busy());
    }

    #[test]
    fn test_version_fields() {
        let (mut session, _events) = session();
        let mut rx = session.get_version().unwrap();
        let header = Header::request(Command::GetVersion.code(), 0x0203, 117);
        session.handle_frame(&header.encode());

        let reply = rx.try_recv().unwrap().unwrap();
        assert_eq!(reply.version.as_deref(), Some("2.3"));
        assert_eq!(reply.firmware.as_deref(), Some("117"));
    }

    #[test]
    fn test_unsolicited_header_is_diagnostic() {
        let (mut session, mut events) = session();
        let header = Header::request(0xA3, 1, 2);
        session.handle_frame(&header.encode());

        match events.try_recv().unwrap() {
            DeviceEvent::DataReceived { command, data } => {
                assert_eq!(command, 0xA3);
                assert_eq!(data, header.encode().to_vec());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_response_keeps_pending() {
        let (mut session, mut events) = session();
        let mut rx = session.verify(5).unwrap();
        session.handle_frame(&Header::request(Command::Identify.code(), 0, 0).encode());

        assert!(session.is_busy());
        assert!(rx.try_recv().is_err());
        assert!(matches!(events.try_recv(), Ok(DeviceEvent::DataReceived { .. })));
    }

    #[test]
    fn test_bad_checksum_is_advisory_by_default() {
        let (mut session, _events) = session();
        let mut rx = session.verify(5).unwrap();
        let mut frame = Header::request(CMD_FP_VERIFY, 5, 60).encode();
        frame[11] ^= 0xFF;
        session.handle_frame(&frame);

        assert!(rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_bad_checksum_rejected_when_strict() {
        let (tx, _events) = mpsc::unbounded_channel();
        let config = ProtocolConfig {
            strict_checksum: true,
            ..Default::default()
        };
        let mut session = Session::new(RecordingTransport::new(), Box::new(NoWsqDecoder), tx, &config);
        let mut rx = session.verify(5).unwrap();
        let mut frame = Header::request(CMD_FP_VERIFY, 5, 60).encode();
        frame[11] ^= 0xFF;
        session.handle_frame(&frame);

        let failure = rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(
            failure.error,
            FmsError::Protocol(ProtocolError::InvalidChecksum { .. })
        ));
        assert_eq!(failure.user_id, Some(5));
        assert!(!session.is_busy());
    }

    #[test]
    fn test_bad_stream_header_checksum_resets_transfer() {
        let (tx, mut events) = mpsc::unbounded_channel();
        let config = ProtocolConfig {
            strict_checksum: true,
            ..Default::default()
        };
        let mut session = Session::new(RecordingTransport::new(), Box::new(NoWsqDecoder), tx, &config);
        let mut rx = session.get_template(7).unwrap();
        let mut header = Header::request(CMD_GET_TEMPLATE, 7, 0);
        header.set_extended_size(3);
        let mut frame = header.encode();
        frame[11] = frame[11].wrapping_add(1);
        session.handle_frame(&frame);

        let failure = rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(
            failure.error,
            FmsError::Protocol(ProtocolError::InvalidChecksum { .. })
        ));
        assert_eq!(failure.user_id, Some(7));
        assert_eq!(session.template_phase(), Phase::Idle);
        assert!(!session.is_busy());
        assert_eq!(session.transport().read_requests, 0);
        assert!(matches!(
            events.try_recv(),
            Ok(DeviceEvent::TemplateProgress(p)) if p.status == crate::fms::events::ProgressStatus::Error
        ));
    }

    #[test]
    fn test_pull_trigger_requests_read_only() {
        let (mut session, mut events) = session();
        let mut trigger = [0u8; HEADER_SIZE];
        trigger[0] = b'N';
        session.handle_frame(&trigger);

        assert_eq!(session.transport().read_requests, 1);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_stray_chunk_ignored() {
        let (mut session, mut events) = session();
        session.handle_frame(&[1, 2, 3]);
        assert_eq!(session.transport().read_requests, 0);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_read_failure_aborts_transfer() {
        let (mut session, _events) = session();
        let mut rx = session.get_template(7).unwrap();
        session.transport_mut().fail_read = Some(TransportError::ReadFailed("link lost".to_string()));
        let mut header = Header::request(CMD_GET_TEMPLATE, 7, 0);
        header.set_extended_size(10);
        session.handle_frame(&header.encode());

        let failure = rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(failure.error, FmsError::Transport(TransportError::ReadFailed(_))));
        assert_eq!(session.template_phase(), Phase::Idle);
        assert!(!session.is_busy());
    }
}
