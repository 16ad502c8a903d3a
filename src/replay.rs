//! Replay of recorded BLE traces against a session.
//!
//! A trace is a text file with one step per line:
//!
//! ```text
//! # comment
//! > verify 5            issue a command
//! < 00 55 05 00 ...     inbound notification frame (hex)
//! ! connect AA:BB Unity  link up (address, optional advertised name)
//! ! disconnect          drop the connection
//! ```
//!
//! Every write, event and command resolution is reported as one JSON value.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::Path;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, DeviceConfig};
use crate::error::{AppError, Result};
use crate::fms::events::{CaptureResult, CommandResult, DeviceEvent, DeviceInfo, TemplateResult, report};
use crate::fms::types::command_name;
use crate::fms::{
    CaptureOptions, Command, Failure, Header, NoWsqDecoder, Pending, RecordingTransport, Session,
    WsqBitrate,
};
use crate::image::{ImageSize, ImageStats};

/// One parsed trace step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Issue(Command),
    Frame(Vec<u8>),
    Connect(DeviceInfo),
    Disconnect,
}

/// Parse a whole trace. Blank lines and comments are skipped.
pub fn parse_trace(text: &str, defaults: CaptureOptions) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        steps.push(parse_step(index + 1, line, defaults)?);
    }
    Ok(steps)
}

fn parse_step(line_no: usize, line: &str, defaults: CaptureOptions) -> Result<Step> {
    let mut chars = line.chars();
    let marker = chars.next();
    let rest = chars.as_str().trim();
    match marker {
        Some('>') => parse_command(rest, defaults)
            .map(Step::Issue)
            .map_err(|e| AppError::parse(line_no, e)),
        Some('<') => parse_hex(rest).map(Step::Frame).map_err(|e| AppError::parse(line_no, e)),
        Some('!') if rest == "disconnect" => Ok(Step::Disconnect),
        Some('!') if rest.starts_with("connect") => parse_connect(rest)
            .map(Step::Connect)
            .map_err(|e| AppError::parse(line_no, e)),
        _ => Err(AppError::parse(line_no, format!("unrecognized step '{line}'"))),
    }
}

fn parse_connect(text: &str) -> std::result::Result<DeviceInfo, String> {
    let mut words = text.split_whitespace().skip(1);
    let address = words.next().ok_or("missing device address")?;
    let name = words.collect::<Vec<_>>().join(" ");
    Ok(DeviceInfo {
        id: address.to_string(),
        name: (!name.is_empty()).then_some(name),
        address: address.to_string(),
        rssi: None,
    })
}

/// Parse hex bytes, with or without separating whitespace.
pub fn parse_hex(text: &str) -> std::result::Result<Vec<u8>, String> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.is_ascii() {
        return Err(format!("non-hex characters in '{text}'"));
    }
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{text}'"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| format!("invalid hex byte '{}'", &digits[i..i + 2]))
        })
        .collect()
}

fn format_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ")
}

fn parse_id(arg: Option<&str>, what: &str) -> std::result::Result<u16, String> {
    let arg = arg.ok_or_else(|| format!("missing {what}"))?;
    arg.parse().map_err(|_| format!("invalid {what} '{arg}'"))
}

fn parse_command(text: &str, defaults: CaptureOptions) -> std::result::Result<Command, String> {
    let mut words = text.split_whitespace();
    let name = words.next().ok_or("missing command")?;
    let command = match name {
        "version" => Command::GetVersion,
        "capture" => {
            let mut options = defaults;
            for word in words.by_ref() {
                match word {
                    "raw" => options.wsq = None,
                    "wsq" => options.wsq = Some(options.wsq.unwrap_or_default()),
                    "wsq15" => options.wsq = Some(WsqBitrate::FifteenToOne),
                    size => options.size = size.parse::<ImageSize>()?,
                }
            }
            Command::Capture(options)
        }
        "register" => {
            let user_id = parse_id(words.next(), "user id")?;
            let is_admin = words.next() == Some("admin");
            Command::RegisterStart { user_id, is_admin }
        }
        "register-end" => Command::RegisterEnd,
        "verify" => Command::Verify {
            user_id: parse_id(words.next(), "user id")?,
        },
        "match" => Command::Match {
            user_id: parse_id(words.next(), "user id")?,
        },
        "identify" => Command::Identify,
        "delete" => Command::Delete {
            user_id: parse_id(words.next(), "user id")?,
        },
        "delete-all" => Command::DeleteAll,
        "template" => Command::GetTemplate {
            user_id: parse_id(words.next(), "user id")?,
        },
        "power-off" => Command::SetPowerOffTime {
            minutes: parse_id(words.next(), "minutes")?,
        },
        other => return Err(format!("unknown command '{other}'")),
    };
    if let Some(extra) = words.next() {
        return Err(format!("unexpected argument '{extra}'"));
    }
    Ok(command)
}

/// Caller handle kept until its command resolves.
enum Waiting {
    Command(&'static str, Pending<CommandResult>),
    Capture(Pending<CaptureResult>),
    Template(Pending<TemplateResult>),
}

/// Drives a session on a [`RecordingTransport`] from trace steps.
pub struct Replay {
    session: Session<RecordingTransport>,
    events: mpsc::UnboundedReceiver<DeviceEvent>,
    waiting: Vec<Waiting>,
    written: usize,
    device: DeviceConfig,
}

impl Replay {
    pub fn new(config: &AppConfig) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let session = Session::new(RecordingTransport::new(), Box::new(NoWsqDecoder), tx, &config.protocol);
        Self {
            session,
            events,
            waiting: Vec::new(),
            written: 0,
            device: config.device.clone(),
        }
    }

    pub fn session(&self) -> &Session<RecordingTransport> {
        &self.session
    }

    /// Apply one step and return everything it produced.
    pub fn step(&mut self, step: Step) -> Vec<Value> {
        let mut out = Vec::new();
        match step {
            Step::Issue(command) => {
                debug!("Replay issuing {}", command.name());
                if let Err(error) = self.issue(command) {
                    let failure: CommandResult = Err(Failure::new(error).with_user(command.user_id()));
                    out.push(json!({ "command": command.name(), "result": report(&failure) }));
                }
            }
            Step::Frame(frame) => self.session.handle_frame(&frame),
            Step::Connect(device) => {
                if let Some(name) = device.name.as_deref().filter(|name| !self.device.accepts(name)) {
                    warn!("'{name}' does not match any device name filter");
                }
                self.session.connected(device);
            }
            Step::Disconnect => self.session.disconnect(),
        }

        let writes = &self.session.transport().writes;
        for packet in &writes[self.written..] {
            out.push(json!({ "tx": format_hex(packet) }));
        }
        self.written = writes.len();

        while let Ok(event) = self.events.try_recv() {
            out.push(event_json(&event));
        }
        out.extend(self.poll_waiting());
        out
    }

    fn issue(&mut self, command: Command) -> crate::fms::error::Result<()> {
        let waiting = match command {
            Command::Capture(options) => Waiting::Capture(self.session.capture(options)?),
            Command::GetTemplate { user_id } => Waiting::Template(self.session.get_template(user_id)?),
            Command::GetVersion => Waiting::Command(command.name(), self.session.get_version()?),
            Command::RegisterStart { user_id, is_admin } => {
                Waiting::Command(command.name(), self.session.register_start(user_id, is_admin)?)
            }
            Command::RegisterEnd => Waiting::Command(command.name(), self.session.register_end()?),
            Command::Verify { user_id } => Waiting::Command(command.name(), self.session.verify(user_id)?),
            Command::Match { user_id } => Waiting::Command(command.name(), self.session.match_user(user_id)?),
            Command::Identify => Waiting::Command(command.name(), self.session.identify()?),
            Command::Delete { user_id } => Waiting::Command(command.name(), self.session.delete_user(user_id)?),
            Command::DeleteAll => Waiting::Command(command.name(), self.session.delete_all()?),
            Command::SetPowerOffTime { minutes } => {
                Waiting::Command(command.name(), self.session.set_power_off_time(minutes)?)
            }
        };
        self.waiting.push(waiting);
        Ok(())
    }

    fn poll_waiting(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        self.waiting.retain_mut(|waiting| {
            let (name, polled) = match waiting {
                Waiting::Command(name, rx) => (*name, poll(rx)),
                Waiting::Capture(rx) => ("Capture", poll(rx).map(|r| r.map(capture_json))),
                Waiting::Template(rx) => ("Get template", poll(rx)),
            };
            match polled {
                None => true,
                Some(Some(result)) => {
                    out.push(json!({ "command": name, "result": result }));
                    false
                }
                Some(None) => {
                    out.push(json!({ "command": name, "dropped": true }));
                    false
                }
            }
        });
        out
    }
}

/// `None` while waiting, `Some(None)` when dropped unresolved.
fn poll<T: serde::Serialize>(rx: &mut Pending<std::result::Result<T, Failure>>) -> Option<Option<Value>> {
    match rx.try_recv() {
        Ok(result) => Some(Some(report(&result))),
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Closed) => Some(None),
    }
}

/// Raw capture results also carry image statistics.
fn capture_json(mut value: Value) -> Value {
    let raw = value.get("isWSQ") == Some(&Value::Bool(false));
    let pixels = value
        .get("imageData")
        .and_then(Value::as_str)
        .and_then(|data| STANDARD.decode(data).ok());
    if let (true, Some(pixels)) = (raw, pixels) {
        if let (Some(map), Some(stats)) = (value.as_object_mut(), ImageStats::from_pixels(&pixels)) {
            map.insert("stats".to_string(), serde_json::to_value(stats).unwrap_or(Value::Null));
        }
    }
    value
}

fn event_json(event: &DeviceEvent) -> Value {
    let mut value = serde_json::to_value(event).unwrap_or(Value::Null);
    if let DeviceEvent::CaptureComplete(_) = event {
        if let Some(data) = value.get_mut("data") {
            *data = capture_json(data.take());
        }
    }
    value
}

/// Replay a whole trace, returning the produced lines.
pub fn run(text: &str, config: &AppConfig) -> Result<Vec<Value>> {
    let steps = parse_trace(text, config.capture.options())?;
    info!("Replaying {} steps", steps.len());

    let mut replay = Replay::new(config);
    let mut out = Vec::new();
    for step in steps {
        out.extend(replay.step(step));
    }
    Ok(out)
}

/// Replay a trace file.
pub fn run_file(path: &Path, config: &AppConfig) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)?;
    run(&text, config)
}

/// One compact JSON document per line.
pub fn to_json_lines(values: &[Value]) -> Result<String> {
    let mut out = String::new();
    for value in values {
        out.push_str(&serde_json::to_string(value)?);
        out.push('\n');
    }
    Ok(out)
}

/// Decode one hex-encoded header into a readable description.
pub fn describe_header(hex: &str) -> Result<Value> {
    let bytes = parse_hex(hex).map_err(|e| AppError::parse(1, e))?;
    let header = Header::parse(&bytes).map_err(|e| AppError::Fms(e.into()))?;
    let checksum = header.validate();
    if let Err(e) = &checksum {
        warn!("{e}");
    }

    Ok(json!({
        "class": header.class,
        "command": format!("{:#04x}", header.command),
        "name": command_name(header.command),
        "param1": header.param1,
        "param2": header.param2,
        "size": header.extended_size(),
        "compressed": header.is_compressed(),
        "error": header.device_error().map(|e| e.to_string()),
        "checksumValid": checksum.is_ok(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fms::FmsError;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("00 55 0a").unwrap(), vec![0x00, 0x55, 0x0A]);
        assert_eq!(parse_hex("0055").unwrap(), vec![0x00, 0x55]);
        assert!(parse_hex("0").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_parse_commands() {
        let defaults = CaptureOptions::default();
        assert_eq!(parse_command("verify 5", defaults), Ok(Command::Verify { user_id: 5 }));
        assert_eq!(parse_command("match 9", defaults), Ok(Command::Match { user_id: 9 }));
        assert_eq!(
            parse_command("capture small wsq15", defaults),
            Ok(Command::Capture(CaptureOptions {
                size: ImageSize::Small,
                wsq: Some(WsqBitrate::FifteenToOne),
            }))
        );
        assert_eq!(
            parse_command("register 3 admin", defaults),
            Ok(Command::RegisterStart { user_id: 3, is_admin: true })
        );
        assert!(parse_command("verify", defaults).is_err());
        assert!(parse_command("identify 4", defaults).is_err());
        assert!(parse_command("reboot", defaults).is_err());
    }

    #[test]
    fn test_parse_trace_reports_line() {
        let err = parse_trace("# header\n> verify 5\n? nope\n", CaptureOptions::default()).unwrap_err();
        assert!(matches!(err, AppError::Parse { line: 3, .. }));
    }

    #[test]
    fn test_replay_template_trace() {
        let trace = "\
> template 7
< 00 40 00 00 00 00 03 00 00 00 00 43
< 61 62 63
";
        let out = run(trace, &AppConfig::default()).unwrap();

        assert_eq!(out[0], json!({ "tx": "00 40 07 00 00 00 00 00 00 00 00 47" }));
        let result = out.iter().find(|v| v.get("result").is_some()).unwrap();
        assert_eq!(result["command"], json!("Get template"));
        assert_eq!(result["result"]["template"], json!("YWJj"));
        assert_eq!(result["result"]["success"], json!(true));
    }

    #[test]
    fn test_replay_connect_step() {
        let out = run("! connect C4:7F:51:00:12:34 Unity 20\n", &AppConfig::default()).unwrap();
        assert_eq!(out[0]["event"], json!("connectionStateChange"));
        assert_eq!(out[0]["data"]["connected"], json!(true));
        assert_eq!(out[0]["data"]["device"]["name"], json!("Unity 20"));
        assert!(parse_trace("! connect\n", CaptureOptions::default()).is_err());
    }

    #[test]
    fn test_describe_header() {
        let value = describe_header("00 55 05 00 3C 00 00 00 00 00 00 96").unwrap();
        assert_eq!(value["name"], json!("FP_VERIFY"));
        assert_eq!(value["param1"], json!(5));
        assert_eq!(value["param2"], json!(60));
        assert_eq!(value["checksumValid"], json!(true));

        let err = describe_header("00 55 05").unwrap_err();
        assert!(matches!(err, AppError::Fms(FmsError::Protocol(_))));
    }

    #[test]
    fn test_run_file_missing() {
        let path = std::env::temp_dir().join("secugen-ble-missing-trace.txt");
        assert!(matches!(run_file(&path, &AppConfig::default()), Err(AppError::Io(_))));
    }

    #[test]
    fn test_json_lines() {
        let text = to_json_lines(&[json!({ "tx": "00" }), json!({ "a": 1 })]).unwrap();
        assert_eq!(text, "{\"tx\":\"00\"}\n{\"a\":1}\n");
    }

    #[test]
    fn test_replay_busy_and_disconnect() {
        let trace = "\
> verify 5
> identify
! disconnect
";
        let out = run(trace, &AppConfig::default()).unwrap();

        let busy = out
            .iter()
            .find(|v| v["command"] == json!("Identify"))
            .unwrap();
        assert_eq!(busy["result"]["success"], json!(false));
        assert!(out.iter().any(|v| v["command"] == json!("Verify") && v["dropped"] == json!(true)));
    }
}
