//! Prompt-driven CLI session over a transport stream

use async_trait::async_trait;
use cmdfleet_shared::codec::{encode_line, Challenge, Frame, FrameDecoder, Prompt};
use cmdfleet_shared::state_machine::{CliEvent, CliMode, CliStateMachine, TransitionResult};
use cmdfleet_shared::{
    append_output, Credentials, DeviceDescriptor, OutputFormat, PlatformProfile, SessionError,
};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::Session;
use crate::transport::TransportStream;

/// Credential challenges answered before a login is considered stuck
const MAX_LOGIN_ROUNDS: usize = 4;

/// Identification string an SSH server sends first
const SSH_BANNER: &[u8] = b"SSH-";

/// Line prefixes a device uses to reject a command
const DEVICE_ERROR_MARKERS: &[&str] = &[
    "% Invalid input",
    "% Incomplete command",
    "% Ambiguous command",
    "% Unknown command",
    "syntax error",
    "Error:",
];

/// Authenticated CLI session to one device
pub struct CliSession<S: TransportStream> {
    stream: S,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
    /// Device name, used in diagnostics
    device: String,
    profile: PlatformProfile,
    credentials: Credentials,
    mode: CliStateMachine,
    read_timeout: Duration,
    /// Set until the first prompt after the credentials arrives
    logging_in: bool,
}

impl<S: TransportStream> CliSession<S> {
    /// Log in over an established stream and prepare the terminal.
    ///
    /// Every read waits at most `read_timeout` for the device to finish
    /// answering with a prompt.
    pub async fn login(
        stream: S,
        device: &DeviceDescriptor,
        read_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let mut session = Self {
            stream,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 4096],
            device: device.name.clone(),
            profile: device.platform.profile(),
            credentials: device.credentials.clone(),
            mode: CliStateMachine::new(),
            read_timeout,
            logging_in: true,
        };

        session.authenticate().await?;

        if let Some(command) = session.profile.disable_paging {
            let (output, _) = session.exchange(command).await?;
            if let Some(error) = device_error(&output) {
                warn!(
                    "[SESSION] {} did not accept '{}': {}",
                    session.device, command, error
                );
            }
        }

        Ok(session)
    }

    /// Mode the device last reported
    pub fn mode(&self) -> CliMode {
        self.mode.mode()
    }

    async fn authenticate(&mut self) -> Result<(), SessionError> {
        let mut password_sent = false;

        for _ in 0..MAX_LOGIN_ROUNDS {
            let frame = match self.next_frame("waiting for login prompt").await? {
                Some(frame) => frame,
                None if password_sent => {
                    return Err(self.rejected("connection closed after password"))
                }
                None => {
                    return Err(SessionError::Protocol(format!(
                        "{} closed the connection during login",
                        self.device
                    )))
                }
            };

            match frame {
                Frame::Challenge {
                    challenge: Challenge::Username,
                    preamble,
                } => {
                    if password_sent {
                        return Err(self.rejected(&preamble));
                    }
                    let username = self.credentials.username.clone();
                    self.write_line(&username).await?;
                }
                Frame::Challenge {
                    challenge: Challenge::Password,
                    preamble,
                } => {
                    if password_sent {
                        return Err(self.rejected(&preamble));
                    }
                    let password = self.credentials.password.clone();
                    self.write_line(&password).await?;
                    password_sent = true;
                }
                Frame::Response { prompt, .. } => {
                    self.mode.observe(prompt.mode);
                    self.decoder.set_base_prompt(prompt.hostname.clone());
                    self.logging_in = false;
                    debug!(
                        "[SESSION] {} logged in as {} ({:?} mode, prompt '{}')",
                        self.device, self.credentials.username, prompt.mode, prompt.hostname
                    );
                    return Ok(());
                }
            }
        }

        Err(self.rejected("too many credential prompts"))
    }

    fn rejected(&self, detail: &str) -> SessionError {
        let mut message = format!(
            "invalid credentials for user '{}'",
            self.credentials.username
        );
        let detail = detail.trim();
        if !detail.is_empty() {
            message.push_str(": ");
            message.push_str(detail);
        }
        SessionError::Auth(message)
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SessionError> {
        let encoded = encode_line(line)?;
        self.stream
            .write_all(&encoded)
            .await
            .map_err(|e| SessionError::Protocol(format!("write to {} failed: {}", self.device, e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| SessionError::Protocol(format!("write to {} failed: {}", self.device, e)))
    }

    /// Next complete frame, or `None` once the device closed the connection
    async fn next_frame(&mut self, stage: &str) -> Result<Option<Frame>, SessionError> {
        loop {
            if let Some(frame) = self.decoder.decode_next()? {
                return Ok(Some(frame));
            }

            match timeout(self.read_timeout, self.stream.read(&mut self.read_buf)).await {
                Ok(Ok(0)) => return Ok(None),
                Ok(Ok(n)) => {
                    self.decoder.extend(&self.read_buf[..n]);
                    if self.logging_in && self.decoder.pending().starts_with(SSH_BANNER) {
                        return Err(SessionError::Protocol(format!(
                            "{} speaks SSH; the CLI-over-TCP session cannot log in",
                            self.device
                        )));
                    }
                }
                Ok(Err(e)) => {
                    return Err(SessionError::Protocol(format!(
                        "read from {} failed: {}",
                        self.device, e
                    )))
                }
                Err(_) => {
                    return Err(SessionError::Timeout {
                        stage: stage.to_string(),
                        after_ms: self.read_timeout.as_millis() as u64,
                    })
                }
            }
        }
    }

    async fn read_frame(&mut self, stage: &str) -> Result<Frame, SessionError> {
        self.next_frame(stage).await?.ok_or_else(|| {
            SessionError::Protocol(format!(
                "{} closed the connection while {}",
                self.device, stage
            ))
        })
    }

    /// Send one line and read the answer up to the next prompt
    async fn exchange(&mut self, line: &str) -> Result<(String, Prompt), SessionError> {
        self.write_line(line).await?;

        let stage = format!("waiting for output of '{}'", line);
        match self.read_frame(&stage).await? {
            Frame::Response { output, prompt } => {
                self.mode.observe(prompt.mode);
                Ok((strip_echo(&output, line), prompt))
            }
            Frame::Challenge { challenge, .. } => Err(SessionError::Protocol(format!(
                "{} asked for {:?} after '{}'",
                self.device, challenge, line
            ))),
        }
    }

    /// Like `exchange`, but device-reported errors fail the call
    async fn run(&mut self, line: &str) -> Result<(String, Prompt), SessionError> {
        let (output, prompt) = self.exchange(line).await?;
        if let Some(error) = device_error(&output) {
            return Err(SessionError::Protocol(format!(
                "{} rejected '{}': {}",
                self.device, line, error
            )));
        }
        Ok((output, prompt))
    }

    async fn enter_config(&mut self) -> Result<(), SessionError> {
        let Some(enter) = self.profile.config_enter else {
            return Ok(());
        };

        if self.profile.uses_enable {
            if let TransitionResult::Invalid { from, .. } =
                self.mode.peek(CliEvent::ConfigureTerminal)
            {
                return Err(SessionError::Protocol(format!(
                    "cannot enter configuration mode on {} from {:?} mode",
                    self.device, from
                )));
            }
        }

        let (_, prompt) = self.run(enter).await?;
        if self.profile.marks_config_prompt && prompt.mode != CliMode::Config {
            return Err(SessionError::Protocol(format!(
                "{} did not enter configuration mode",
                self.device
            )));
        }
        self.mode.observe(CliMode::Config);
        Ok(())
    }

    async fn exit_config(&mut self) -> Result<(), SessionError> {
        let Some(exit) = self.profile.config_exit else {
            return Ok(());
        };

        self.run(exit).await?;
        if self.profile.marks_config_prompt && self.mode.mode() == CliMode::Config {
            return Err(SessionError::Protocol(format!(
                "{} is still in configuration mode after '{}'",
                self.device, exit
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: TransportStream> Session for CliSession<S> {
    async fn send_command(
        &mut self,
        command: &str,
        format: OutputFormat,
    ) -> Result<String, SessionError> {
        let line = match (format, self.profile.json_suffix) {
            (OutputFormat::Json, Some(suffix)) => format!("{}{}", command.trim(), suffix),
            _ => command.trim().to_string(),
        };
        let (output, _) = self.run(&line).await?;
        Ok(output)
    }

    async fn enter_privileged_mode(&mut self) -> Result<(), SessionError> {
        if !self.profile.uses_enable || self.mode.is_privileged() {
            return Ok(());
        }

        self.write_line("enable").await?;
        let mut frame = self.read_frame("waiting for enable").await?;
        if let Frame::Challenge {
            challenge: Challenge::Password,
            ..
        } = frame
        {
            let secret = self
                .credentials
                .secret
                .clone()
                .unwrap_or_else(|| self.credentials.password.clone());
            self.write_line(&secret).await?;
            frame = self.read_frame("waiting for privileged prompt").await?;
        }

        match frame {
            Frame::Response { prompt, .. } if prompt.mode != CliMode::User => {
                self.mode.observe(prompt.mode);
                debug!("[SESSION] {} entered privileged mode", self.device);
                Ok(())
            }
            Frame::Response { output, prompt } => {
                self.mode.observe(prompt.mode);
                let detail = match output.trim() {
                    "" => "invalid credentials",
                    text => text,
                };
                Err(SessionError::Auth(format!(
                    "enable rejected by {}: {}",
                    self.device, detail
                )))
            }
            Frame::Challenge { .. } => Err(SessionError::Auth(format!(
                "enable rejected by {}: invalid credentials",
                self.device
            ))),
        }
    }

    async fn send_config_lines(&mut self, lines: &[String]) -> Result<String, SessionError> {
        let lines: Vec<&str> = lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .collect();

        self.enter_privileged_mode().await?;
        self.enter_config().await?;

        let mut output = String::new();
        for (applied, line) in lines.iter().enumerate() {
            let (reply, _) = self.exchange(line).await?;
            if let Some(error) = device_error(&reply) {
                return Err(SessionError::Protocol(format!(
                    "{} rejected '{}': {} ({} of {} lines applied before the failure)",
                    self.device,
                    line,
                    error,
                    applied,
                    lines.len()
                )));
            }
            append_output(&mut output, &reply);
        }

        self.exit_config().await?;
        Ok(output)
    }

    async fn save_config(&mut self) -> Result<String, SessionError> {
        let save = self.profile.save;
        if save.is_empty() {
            debug!("[SESSION] {} has no save command, skipping", self.device);
            return Ok(String::new());
        }

        if self.profile.save_in_config {
            self.enter_config().await?;
        }

        let mut output = String::new();
        for command in save {
            let (reply, _) = self.run(command).await?;
            append_output(&mut output, &reply);
        }

        if self.profile.save_in_config {
            self.exit_config().await?;
        }
        Ok(output)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        TransportStream::shutdown(&mut self.stream)
            .await
            .map_err(|e| {
                SessionError::Protocol(format!("closing session to {} failed: {}", self.device, e))
            })
    }
}

/// Drop the device's echo of the command, if present
fn strip_echo(output: &str, line: &str) -> String {
    match output.split_once('\n') {
        Some((first, rest)) if first.trim() == line.trim() => rest.to_string(),
        None if output.trim() == line.trim() => String::new(),
        _ => output.to_string(),
    }
}

/// First output line that reports a rejected command
fn device_error(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| DEVICE_ERROR_MARKERS.iter().any(|m| line.starts_with(m)))
}
