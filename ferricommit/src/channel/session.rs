//! SSH-backed command channel.

use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use super::buffer::PatternBuffer;
use super::response::Response;
use super::CommandChannel;
use crate::error::{ChannelError, Result};
use crate::platform::DeviceProfile;
use crate::transport::{SshConfig, SshTransport};

/// An interactive CLI shell on one device, driven over SSH.
///
/// Each [`send`](CommandChannel::send) writes one line and reads until the
/// profile's prompt pattern appears in the tail of the receive buffer.
///
/// If a send is abandoned before its prompt arrived (the caller dropped the
/// future, e.g. on timeout or cancellation), the session remembers it and
/// drains output up to the next prompt before the following operation, so
/// the next response is never attributed to the wrong command.
pub struct CliSession {
    transport: Option<SshTransport>,
    channel: Option<Channel<Msg>>,
    profile: DeviceProfile,
    buffer: PatternBuffer,
    timeout: Duration,
    in_flight: bool,
    last_prompt: String,
}

impl CliSession {
    /// Connect, open a shell, wait for the first prompt, and run the
    /// profile's on-open commands.
    pub async fn open(config: SshConfig, profile: DeviceProfile) -> Result<Self> {
        let timeout = config.connect_timeout;
        let transport = SshTransport::connect(config).await?;
        let channel = transport
            .open_shell(profile.terminal_width, profile.terminal_height)
            .await?;

        let mut session = Self {
            transport: Some(transport),
            channel: Some(channel),
            profile,
            buffer: PatternBuffer::default(),
            timeout,
            in_flight: false,
            last_prompt: String::new(),
        };

        let (_, _, prompt) = session.read_until_prompt().await?;
        if let Some(transport) = &session.transport {
            debug!(
                "session open on {}, initial prompt {:?}",
                transport.address(),
                prompt
            );
        }
        session.last_prompt = prompt;

        for command in session.profile.on_open_commands.clone() {
            let response = session.send(&command).await?;
            if let Some(message) = response.failure_message {
                debug!("on-open command {:?} ignored failure: {}", command, message);
            }
        }

        Ok(session)
    }

    /// Get the device profile this session uses.
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Prompt seen at the end of the most recent operation.
    pub fn last_prompt(&self) -> &str {
        &self.last_prompt
    }

    /// Set the per-read prompt timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Check if the SSH session is still connected.
    pub fn is_alive(&self) -> bool {
        self.channel.is_some()
            && self
                .transport
                .as_ref()
                .is_some_and(|transport| transport.is_alive())
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let channel = self.channel.as_mut().ok_or(ChannelError::NotOpen)?;
        let payload = format!("{}\n", line);
        channel
            .data(payload.as_bytes())
            .await
            .map_err(ChannelError::Ssh)?;
        Ok(())
    }

    /// Read until the prompt matches.
    ///
    /// Returns the consumed bytes, the offset where the prompt starts, and
    /// the trimmed prompt text.
    async fn read_until_prompt(&mut self) -> Result<(Vec<u8>, usize, String)> {
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            if let Some((start, end)) = self.buffer.find_tail(&self.profile.prompt_pattern) {
                let data = self.buffer.split_to(end);
                let prompt = String::from_utf8_lossy(&data[start..]).trim().to_string();
                return Ok((data, start, prompt));
            }

            let channel = self.channel.as_mut().ok_or(ChannelError::NotOpen)?;
            let msg = tokio::time::timeout_at(deadline, channel.wait())
                .await
                .map_err(|_| ChannelError::PatternTimeout(self.timeout))?;

            match msg {
                Some(ChannelMsg::Data { ref data }) => {
                    trace!("received {} bytes", data.len());
                    self.buffer.extend(data);
                }
                Some(ChannelMsg::ExtendedData { ref data, .. }) => self.buffer.extend(data),
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Err(ChannelError::Closed.into());
                }
                Some(_) => {}
            }
        }
    }

    /// Drain the output of an abandoned send.
    async fn resync(&mut self) -> Result<()> {
        if self.in_flight {
            debug!("draining output of an interrupted command");
            self.read_until_prompt().await?;
            self.in_flight = false;
        }
        Ok(())
    }
}

impl CommandChannel for CliSession {
    async fn send(&mut self, command: &str) -> Result<Response> {
        self.resync().await?;

        let start = Instant::now();
        self.write_line(command).await?;
        self.in_flight = true;
        let (data, prompt_start, prompt) = self.read_until_prompt().await?;
        self.in_flight = false;

        let raw_result = String::from_utf8_lossy(&data).to_string();
        let result = normalize_output(&data[..prompt_start], command);
        self.last_prompt = prompt.clone();

        let response = Response::new(command, result, raw_result, prompt, start.elapsed());
        match self.profile.detect_failure(&response.result) {
            Some(message) => Ok(response.with_failure(message)),
            None => Ok(response),
        }
    }

    async fn read_prompt(&mut self) -> Result<String> {
        self.resync().await?;
        self.write_line("").await?;
        self.in_flight = true;
        let (_, _, prompt) = self.read_until_prompt().await?;
        self.in_flight = false;
        self.last_prompt = prompt.clone();
        Ok(prompt)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!("channel close: {}", e);
            }
        }
        if let Some(transport) = self.transport.take() {
            transport.close().await?;
        }
        Ok(())
    }
}

impl Drop for CliSession {
    fn drop(&mut self) {
        if let Some(transport) = &self.transport {
            warn!("session to {} dropped without close()", transport.address());
        }
    }
}

/// Strip the command echo (first line) and surrounding line breaks.
fn normalize_output(before_prompt: &[u8], command: &str) -> String {
    let body = match memchr::memchr(b'\n', before_prompt) {
        Some(pos) if before_prompt[..pos].trim_ascii().ends_with(command.as_bytes()) => {
            &before_prompt[pos + 1..]
        }
        _ => before_prompt,
    };
    String::from_utf8_lossy(body)
        .trim_matches(['\r', '\n'])
        .to_string()
}
