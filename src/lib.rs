#![cfg_attr(not(test), no_std)]

use core::fmt::Write as _;

use embedded_io_async::{Read, Write};
use heapless::{String, Vec};
use log::debug;

mod constants;
pub use constants::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

mod frame;
pub use frame::*;

mod acquisition;
pub use acquisition::*;

#[cfg(test)]
mod mock_serial;

/// Selects how a single reading is requested from the transducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingKind {
    /// `P` command, value returned as ASCII text.
    Ascii,
    /// `B` command, value returned as one binary frame.
    Binary,
    /// One frame taken from continuous-streaming mode, which is stopped again afterwards.
    Streamed,
}

/// Represents a PX409 pressure transducer.
///
/// This struct provides methods to configure the transducer, take single
/// readings and stream timestamped samples.
///
/// # Type Parameters
///
/// * `Serial`: The type of the serial interface used to communicate with the transducer.
///   It must implement `embedded_io_async::Read` and `embedded_io_async::Write`.
///   The port is expected to run at 115200 baud, 8N1, with reads that return
///   whatever arrived within a fixed timeout (possibly nothing).
pub struct Px409<Serial> {
    serial: Serial,
    config: Config,
}

impl<S> Px409<S>
where
    S: Read + Write,
{
    /// Creates a new `Px409` instance.
    ///
    /// No command is sent until [`Px409::init`] or another method is called.
    pub fn new(serial: S, config: Config) -> Self {
        Self { serial, config }
    }

    /// Returns the configuration as last acknowledged by the transducer.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gives the serial interface back.
    pub fn release(self) -> S {
        self.serial
    }

    /// Initializes the transducer according to the provided configuration.
    ///
    /// This involves:
    /// - Stopping any continuous stream left running and discarding its bytes.
    /// - Setting the update rate.
    /// - Setting the IIR filter period and boxcar averaging, when configured.
    pub async fn init(&mut self) -> Result<(), Error> {
        self.stop_stream().await?;
        self.drain().await?;

        let config = self.config;
        self.set_rate(config.rate).await.map_err(|e| {
            log::error!("Failed to set rate to {:?} during init: {:?}", config.rate, e);
            e
        })?;

        if let Some(period) = config.filter {
            self.set_filter(period).await.map_err(|e| {
                log::error!("Failed to set IIR filter to {} during init: {:?}", period, e);
                e
            })?;
        }

        if let Some(averaging) = config.averaging {
            self.set_averaging(averaging).await.map_err(|e| {
                log::error!(
                    "Failed to set averaging to {:?} during init: {:?}",
                    averaging,
                    e
                );
                e
            })?;
        }

        debug!("PX409 init sequence complete.");
        Ok(())
    }

    /// Sets the update rate used by continuous-streaming mode.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the transducer replied; the configuration is updated.
    /// * `Err(Error::NoReply)` if nothing came back; the configuration is left unchanged.
    /// * `Err(Error::WriteFailure)` or `Err(Error::ReadFailure)` for serial communication issues.
    pub async fn set_rate(&mut self, rate: Rate) -> Result<(), Error> {
        debug!("Setting rate to {:?} ({} sps)", rate, rate.samples_per_second());
        self.configure(RATE_CMD, rate.code()).await?;
        self.config.rate = rate;
        Ok(())
    }

    /// Sets the IIR filter period (time constant).
    ///
    /// `0` or `1` disables the filter, `2` to `255` sets the period.
    pub async fn set_filter(&mut self, period: u8) -> Result<(), Error> {
        debug!("Setting IIR filter period to {}", period);
        self.configure(FILTER_CMD, period).await?;
        self.config.filter = Some(period);
        Ok(())
    }

    /// Sets the number of readings averaged by the boxcar filter.
    ///
    /// The streaming output rate becomes the configured rate divided by the count.
    pub async fn set_averaging(&mut self, averaging: Averaging) -> Result<(), Error> {
        debug!("Setting boxcar averaging to {}", averaging.count());
        self.configure(AVERAGING_CMD, averaging.count()).await?;
        self.config.averaging = Some(averaging);
        Ok(())
    }

    /// Puts the transducer in continuous-streaming mode.
    ///
    /// Prefer [`Px409::acquire`], which also stops the stream again.
    pub async fn start_stream(&mut self) -> Result<(), Error> {
        debug!("Starting continuous stream");
        self.write(START_STREAM).await
    }

    /// Ends continuous-streaming mode.
    pub async fn stop_stream(&mut self) -> Result<(), Error> {
        debug!("Stopping continuous stream");
        self.write(STOP_STREAM).await
    }

    /// Takes a single reading in the transducer's engineering unit.
    ///
    /// # Returns
    ///
    /// * `Ok(f32)` with the pressure value.
    /// * `Err(Error::UnexpectedReply)` if an ASCII reply is not a number.
    /// * `Err(Error::InvalidFrame)` if a binary reply holds no complete frame.
    /// * `Err(Error)` for serial communication issues.
    pub async fn read_sample(&mut self, kind: ReadingKind) -> Result<f32, Error> {
        match kind {
            ReadingKind::Ascii => self.read_ascii().await,
            ReadingKind::Binary => self.read_binary().await,
            ReadingKind::Streamed => {
                let session: AcquisitionSession<1> = self.acquire(1, || 0.0).await?;
                session
                    .samples()
                    .first()
                    .map(|sample| sample.value)
                    .ok_or(Error::NoFrame)
            }
        }
    }

    async fn read_ascii(&mut self) -> Result<f32, Error> {
        self.write(READ_ASCII).await?;
        let reply = self.read_reply().await?;
        parse_ascii_reading(&reply).ok_or_else(|| {
            log::error!("Unparsable ASCII reading: {:02X?}", reply);
            Error::UnexpectedReply
        })
    }

    async fn read_binary(&mut self) -> Result<f32, Error> {
        self.write(READ_BINARY).await?;

        let mut scanner = StreamScanner::new();
        let mut chunk = [0u8; CHUNK_SIZE];
        for _ in 0..MAX_REPLY_READS {
            let bytes_read = self.read_chunk(&mut chunk).await?;
            if bytes_read == 0 {
                break;
            }
            scanner.extend(&chunk[..bytes_read]);
            if let FrameResult::Decoded(payload) = scanner.next_frame() {
                return Ok(decode(payload));
            }
        }

        log::error!("No complete frame in binary reply");
        Err(Error::InvalidFrame)
    }

    // Sends "<command> <value>\r" and waits for the transducer to answer.
    async fn configure(&mut self, command: &str, value: u8) -> Result<(), Error> {
        let mut line: String<16> = String::new();
        write!(line, "{} {}\r", command, value).map_err(|_| Error::CommandTooLong)?;
        self.write(line.as_bytes()).await?;

        let reply = self.read_reply().await?;
        if reply.is_empty() {
            log::error!("No reply to {} {}", command, value);
            return Err(Error::NoReply);
        }
        debug!(
            "{} {} acknowledged: {:?}",
            command,
            value,
            core::str::from_utf8(&reply).unwrap_or_default()
        );
        Ok(())
    }

    // Writes a command to the serial port.
    async fn write(&mut self, command: &[u8]) -> Result<(), Error> {
        debug!("Executing command: {:02X?}", command);
        self.serial.flush().await.map_err(|_| Error::WriteFailure)?;
        self.serial
            .write_all(command)
            .await
            .map_err(|_| Error::WriteFailure)?;
        self.serial.flush().await.map_err(|_| Error::WriteFailure)?; // Ensure data is sent
        Ok(())
    }

    async fn read_chunk(&mut self, chunk: &mut [u8]) -> Result<usize, Error> {
        self.serial.read(chunk).await.map_err(|e| {
            log::debug!("Serial read error: {:?}", e);
            Error::ReadFailure
        })
    }

    // Reads until a line terminator, an empty read or MAX_REPLY_READS reads.
    async fn read_reply(&mut self) -> Result<Vec<u8, REPLY_CAPACITY>, Error> {
        let mut reply = Vec::new();
        let mut chunk = [0u8; CHUNK_SIZE];

        for _ in 0..MAX_REPLY_READS {
            let bytes_read = self.read_chunk(&mut chunk).await?;
            if bytes_read == 0 {
                break;
            }
            for &byte in &chunk[..bytes_read] {
                if reply.push(byte).is_err() {
                    log::warn!("Reply longer than {} bytes, truncated", REPLY_CAPACITY);
                    return Ok(reply);
                }
            }
            if chunk[..bytes_read].iter().any(|&b| b == b'\r' || b == b'\n') {
                break;
            }
        }

        debug!("Reply: {:02X?}", reply);
        Ok(reply)
    }

    // Discards bytes still arriving from a stream that was just stopped.
    async fn drain(&mut self) -> Result<(), Error> {
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut discarded = 0;
        for _ in 0..MAX_DRAIN_READS {
            let bytes_read = self.read_chunk(&mut chunk).await?;
            if bytes_read == 0 {
                break;
            }
            discarded += bytes_read;
        }
        if discarded > 0 {
            debug!("Discarded {} stale bytes", discarded);
        }
        Ok(())
    }
}

// Takes the leading number of a reply such as "1013.25 hPa\r\n".
fn parse_ascii_reading(reply: &[u8]) -> Option<f32> {
    core::str::from_utf8(reply)
        .ok()?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}
