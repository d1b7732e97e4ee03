use core::sync::atomic::{AtomicBool, Ordering};

use embedded_io_async::{Read, Write};
use heapless::Vec;
use log::debug;

use crate::{decode, Error, FrameResult, Px409, ReadingKind, StreamScanner, CHUNK_SIZE};

/// A single timestamped pressure reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds elapsed since the acquisition started.
    pub timestamp: f64,
    /// Pressure in the transducer's native engineering unit (hPa by default).
    pub value: f32,
}

/// Source of the time used to stamp samples, in seconds.
///
/// Only differences between readings matter, so any monotonic origin works.
/// Implemented for every `FnMut() -> f64`.
pub trait Clock {
    /// Returns the current time in seconds.
    fn now(&mut self) -> f64;
}

impl<F> Clock for F
where
    F: FnMut() -> f64,
{
    fn now(&mut self) -> f64 {
        self()
    }
}

/// The samples gathered by one acquisition call.
///
/// `N` is the capacity of the sample buffer; the requested count may be lower.
#[derive(Debug, Clone)]
pub struct AcquisitionSession<const N: usize> {
    target_count: usize,
    collected: Vec<Sample, N>,
    start_time: f64,
}

impl<const N: usize> AcquisitionSession<N> {
    fn new(target_count: usize, start_time: f64) -> Self {
        Self {
            target_count,
            collected: Vec::new(),
            start_time,
        }
    }

    /// Number of samples the acquisition was asked for.
    pub fn target_count(&self) -> usize {
        self.target_count
    }

    /// Clock reading taken when the acquisition started.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// The samples collected, oldest first.
    pub fn samples(&self) -> &[Sample] {
        &self.collected
    }

    /// `false` when the acquisition was cancelled before reaching its target.
    pub fn is_complete(&self) -> bool {
        self.collected.len() >= self.target_count
    }

    /// Consumes the session and returns its sample buffer.
    pub fn into_samples(self) -> Vec<Sample, N> {
        self.collected
    }
}

impl<S> Px409<S>
where
    S: Read + Write,
{
    /// Streams `target_count` samples from the transducer.
    ///
    /// Starts continuous mode, decodes frames until the target is reached and
    /// stops the stream again before returning, whatever the outcome.
    ///
    /// This waits for as long as it takes unless
    /// [`Config::max_idle_reads`](crate::Config::max_idle_reads) is set.
    ///
    /// # Returns
    ///
    /// * `Ok(AcquisitionSession)` holding exactly `target_count` samples.
    /// * `Err(Error::InvalidArg)` if `target_count` exceeds the buffer capacity `N`.
    /// * `Err(Error::NoFrame)` if the idle read limit was hit.
    /// * `Err(Error::ReadFailure)` or `Err(Error::WriteFailure)` for serial communication issues.
    pub async fn acquire<const N: usize, C: Clock>(
        &mut self,
        target_count: usize,
        clock: C,
    ) -> Result<AcquisitionSession<N>, Error> {
        let never = AtomicBool::new(false);
        self.acquire_until(target_count, clock, &never).await
    }

    /// Same as [`Px409::acquire`], but gives up early once `cancel` is set.
    ///
    /// The flag is checked before each serial read. A cancelled acquisition
    /// still stops the stream and returns the samples gathered so far.
    pub async fn acquire_until<const N: usize, C: Clock>(
        &mut self,
        target_count: usize,
        mut clock: C,
        cancel: &AtomicBool,
    ) -> Result<AcquisitionSession<N>, Error> {
        if target_count > N {
            log::error!(
                "Requested {} samples but the buffer holds only {}",
                target_count,
                N
            );
            return Err(Error::InvalidArg);
        }
        if target_count == 0 {
            return Ok(AcquisitionSession::new(0, clock.now()));
        }

        let outcome = self.stream_into(target_count, &mut clock, cancel).await;

        // The device keeps streaming until told otherwise, even after a failure.
        if let Err(e) = self.stop_stream().await {
            log::error!("Failed to stop continuous stream: {:?}", e);
        }

        outcome
    }

    async fn stream_into<const N: usize, C: Clock>(
        &mut self,
        target_count: usize,
        clock: &mut C,
        cancel: &AtomicBool,
    ) -> Result<AcquisitionSession<N>, Error> {
        self.start_stream().await?;
        let start_time = clock.now();
        let mut session = AcquisitionSession::new(target_count, start_time);

        let mut scanner = StreamScanner::new();
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut idle_reads: u32 = 0;

        while !session.is_complete() {
            if cancel.load(Ordering::Relaxed) {
                debug!(
                    "Acquisition cancelled after {}/{} samples",
                    session.collected.len(),
                    target_count
                );
                break;
            }

            let bytes_read = self.serial.read(&mut chunk).await.map_err(|e| {
                log::error!(
                    "Serial read error after {} samples: {:?}",
                    session.collected.len(),
                    e
                );
                Error::ReadFailure
            })?;
            scanner.extend(&chunk[..bytes_read]);

            let before = session.collected.len();
            while !session.is_complete() {
                let FrameResult::Decoded(payload) = scanner.next_frame() else {
                    break;
                };
                let sample = Sample {
                    timestamp: clock.now() - start_time,
                    value: decode(payload),
                };
                session
                    .collected
                    .push(sample)
                    .map_err(|_| Error::InvalidArg)?;
            }

            if session.collected.len() > before {
                idle_reads = 0;
                continue;
            }

            idle_reads = idle_reads.saturating_add(1);
            if let Some(limit) = self.config.max_idle_reads {
                if idle_reads > limit {
                    log::error!(
                        "No frame in {} consecutive reads, last chunk: {:02X?}",
                        idle_reads,
                        &chunk[..bytes_read]
                    );
                    return Err(Error::NoFrame);
                }
            }
        }

        debug!(
            "Acquired {} samples in {} s",
            session.collected.len(),
            clock.now() - start_time
        );
        Ok(session)
    }

    /// Builds a timestamped series from repeated single readings.
    ///
    /// Each sample is one [`Px409::read_sample`] call, stamped when its reply
    /// has been decoded. The rate is set by the host rather than the
    /// transducer; ASCII readings top out around 50 per second.
    ///
    /// # Arguments
    ///
    /// * `kind`: How each reading is requested.
    /// * `target_count`: Number of readings to take. Must not exceed `N`.
    /// * `clock`: Time source for the timestamps.
    ///
    /// # Returns
    ///
    /// * `Ok(AcquisitionSession)` holding exactly `target_count` samples.
    /// * `Err(Error::InvalidArg)` if `target_count` exceeds the buffer capacity `N`.
    /// * `Err(Error)` from the first reading that fails; earlier samples are discarded.
    pub async fn acquire_polled<const N: usize, C: Clock>(
        &mut self,
        kind: ReadingKind,
        target_count: usize,
        mut clock: C,
    ) -> Result<AcquisitionSession<N>, Error> {
        if target_count > N {
            log::error!(
                "Requested {} samples but the buffer holds only {}",
                target_count,
                N
            );
            return Err(Error::InvalidArg);
        }

        let start_time = clock.now();
        let mut session = AcquisitionSession::new(target_count, start_time);

        while !session.is_complete() {
            let value = self.read_sample(kind).await.map_err(|e| {
                log::error!(
                    "{:?} reading failed after {} samples: {:?}",
                    kind,
                    session.collected.len(),
                    e
                );
                e
            })?;
            let sample = Sample {
                timestamp: clock.now() - start_time,
                value,
            };
            session
                .collected
                .push(sample)
                .map_err(|_| Error::InvalidArg)?;
        }

        debug!(
            "Polled {} {:?} readings in {} s",
            session.collected.len(),
            kind,
            clock.now() - start_time
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_serial::{encode_frame, MockSerial};
    use crate::Config;
    use embassy_futures::block_on;

    fn ticking_clock() -> impl FnMut() -> f64 {
        let mut now = 0.0;
        move || {
            now += 0.001;
            now
        }
    }

    #[test]
    fn collects_target_count_across_incomplete_chunks() {
        let values = [1.0f32, 1013.25, -3.5, 0.0, 42.0];
        let serial = MockSerial::new()
            .reply(&encode_frame(0x01, values[0]))
            .silence()
            .reply(&encode_frame(0x01, values[1]))
            .reply(&[0x00, 0x12, 0x34])
            .reply(&encode_frame(0x01, values[2]))
            .reply(&encode_frame(0x01, values[3]))
            .reply(&[0xAA, 0x01, 0x00])
            .reply(&encode_frame(0x01, values[4]));
        let mut px409 = Px409::new(serial, Config::default());

        let session: AcquisitionSession<8> =
            block_on(px409.acquire(5, ticking_clock())).unwrap();

        assert!(session.is_complete());
        let got: std::vec::Vec<f32> = session.samples().iter().map(|s| s.value).collect();
        assert_eq!(got, values);
        assert!(session
            .samples()
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp));
        assert!(session.samples()[0].timestamp > 0.0);
        assert_eq!(px409.release().written_text(), "PC\rPS\r");
    }

    #[test]
    fn decodes_single_plain_frame() {
        let serial = MockSerial::new().reply(&[0xAA, 0x42, 0x00, 0x00, 0x80, 0x3F]);
        let mut px409 = Px409::new(serial, Config::default());

        let session: AcquisitionSession<1> = block_on(px409.acquire(1, || 0.0)).unwrap();

        assert_eq!(session.samples()[0].value, 1.0);
    }

    #[test]
    fn empty_reads_do_not_count() {
        let serial = MockSerial::new()
            .silence()
            .silence()
            .reply(&encode_frame(0x01, 7.0));
        let mut px409 = Px409::new(serial, Config::default());

        let session: AcquisitionSession<4> = block_on(px409.acquire(1, || 0.0)).unwrap();

        assert_eq!(session.samples().len(), 1);
        assert_eq!(px409.release().reads, 3);
    }

    #[test]
    fn frame_split_across_reads_is_kept() {
        let frame = encode_frame(0x01, 2.5);
        let serial = MockSerial::new().reply(&frame[..4]).reply(&frame[4..]);
        let mut px409 = Px409::new(serial, Config::default());

        let session: AcquisitionSession<1> = block_on(px409.acquire(1, || 0.0)).unwrap();

        assert_eq!(session.samples()[0].value, 2.5);
    }

    #[test]
    fn trailing_payload_sync_does_not_swallow_next_frame() {
        let serial = MockSerial::new()
            .reply(&[0xAA, 0x01, 0x00, 0x00, 0x00])
            .reply(&[0xAA])
            .reply(&[0x01, 0x00, 0x00, 0x80, 0x3F])
            .reply(&[0xAA, 0x01, 0x00, 0x00, 0x00, 0x40]);
        let mut px409 = Px409::new(serial, Config::default());

        let session: AcquisitionSession<2> = block_on(px409.acquire(2, || 0.0)).unwrap();

        let got: std::vec::Vec<f32> = session.samples().iter().map(|s| s.value).collect();
        assert_eq!(got, [1.0, 2.0]);
    }

    #[test]
    fn polled_ascii_readings_are_timestamped() {
        let serial = MockSerial::new()
            .reply(b"1013.25 hPa\r\n")
            .reply(b"1013.5 hPa\r\n")
            .reply(b"1012.75 hPa\r\n");
        let mut px409 = Px409::new(serial, Config::default());

        let session: AcquisitionSession<4> =
            block_on(px409.acquire_polled(ReadingKind::Ascii, 3, ticking_clock())).unwrap();

        assert!(session.is_complete());
        let got: std::vec::Vec<f32> = session.samples().iter().map(|s| s.value).collect();
        assert_eq!(got, [1013.25, 1013.5, 1012.75]);
        assert!(session
            .samples()
            .windows(2)
            .all(|pair| pair[0].timestamp < pair[1].timestamp));
        assert_eq!(px409.release().written_text(), "P\r\nP\r\nP\r\n");
    }

    #[test]
    fn polled_acquisition_fails_on_bad_reading() {
        let serial = MockSerial::new()
            .reply(b"1013.25\r\n")
            .reply(b"OVER\r\n");
        let mut px409 = Px409::new(serial, Config::default());

        let result: Result<AcquisitionSession<4>, _> =
            block_on(px409.acquire_polled(ReadingKind::Ascii, 3, || 0.0));

        assert_eq!(result.unwrap_err(), Error::UnexpectedReply);
    }

    #[test]
    fn polled_binary_readings_use_frames() {
        let serial = MockSerial::new()
            .reply(&encode_frame(0x02, 5.0))
            .reply(&encode_frame(0x02, 6.0));
        let mut px409 = Px409::new(serial, Config::default());

        let session: AcquisitionSession<2> =
            block_on(px409.acquire_polled(ReadingKind::Binary, 2, || 0.0)).unwrap();

        assert_eq!(session.samples()[1].value, 6.0);
        assert_eq!(px409.release().written_text(), "B\r\nB\r\n");
    }

    #[test]
    fn stops_at_target_even_with_frames_left() {
        let mut chunk = std::vec::Vec::new();
        chunk.extend_from_slice(&encode_frame(0x01, 1.0));
        chunk.extend_from_slice(&encode_frame(0x01, 2.0));
        let serial = MockSerial::new().reply(&chunk);
        let mut px409 = Px409::new(serial, Config::default());

        let session: AcquisitionSession<4> = block_on(px409.acquire(1, || 0.0)).unwrap();

        assert_eq!(session.samples().len(), 1);
        assert_eq!(session.samples()[0].value, 1.0);
    }

    #[test]
    fn cancellation_returns_partial_session_and_stops() {
        let cancel = AtomicBool::new(false);
        let serial = MockSerial::new()
            .reply(&encode_frame(0x01, 1.0))
            .reply(&encode_frame(0x01, 2.0))
            .reply(&encode_frame(0x01, 3.0));
        let mut px409 = Px409::new(serial, Config::default());

        // Cancel from the clock once the second sample has been stamped.
        let mut ticks = 0;
        let clock = || {
            ticks += 1;
            if ticks == 3 {
                cancel.store(true, Ordering::Relaxed);
            }
            f64::from(ticks)
        };

        let session: AcquisitionSession<4> =
            block_on(px409.acquire_until(3, clock, &cancel)).unwrap();

        assert!(!session.is_complete());
        assert_eq!(session.samples().len(), 2);
        assert_eq!(px409.release().written_text(), "PC\rPS\r");
    }

    #[test]
    fn read_failure_is_fatal_but_stream_is_stopped() {
        let serial = MockSerial::new()
            .reply(&encode_frame(0x01, 1.0))
            .fail_read();
        let mut px409 = Px409::new(serial, Config::default());

        let result: Result<AcquisitionSession<4>, _> = block_on(px409.acquire(2, || 0.0));

        assert_eq!(result.unwrap_err(), Error::ReadFailure);
        assert_eq!(px409.release().written_text(), "PC\rPS\r");
    }

    #[test]
    fn idle_limit_turns_garbage_into_error() {
        let serial = MockSerial::new()
            .reply(&[0x01, 0x02, 0x03])
            .reply(&[0xAA, 0xAA, 0xAA])
            .silence()
            .reply(&encode_frame(0x01, 1.0));
        let mut px409 = Px409::new(serial, Config::default().max_idle_reads(2));

        let result: Result<AcquisitionSession<1>, _> = block_on(px409.acquire(1, || 0.0));

        assert_eq!(result.unwrap_err(), Error::NoFrame);
        let serial = px409.release();
        assert_eq!(serial.reads, 3);
        assert_eq!(serial.written_text(), "PC\rPS\r");
    }

    #[test]
    fn widest_idle_limit_keeps_waiting_for_frames() {
        let serial = MockSerial::new()
            .reply(&[0x01, 0x02])
            .silence()
            .silence()
            .reply(&encode_frame(0x01, 4.0));
        let mut px409 = Px409::new(serial, Config::default().max_idle_reads(u32::MAX));

        let session: AcquisitionSession<1> = block_on(px409.acquire(1, || 0.0)).unwrap();

        assert_eq!(session.samples()[0].value, 4.0);
        assert_eq!(px409.release().reads, 4);
    }

    #[test]
    fn rejects_target_beyond_capacity_without_io() {
        let mut px409 = Px409::new(MockSerial::new(), Config::default());

        let result: Result<AcquisitionSession<2>, _> = block_on(px409.acquire(3, || 0.0));

        assert_eq!(result.unwrap_err(), Error::InvalidArg);
        assert!(px409.release().written.is_empty());
    }

    #[test]
    fn zero_target_is_an_empty_complete_session() {
        let mut px409 = Px409::new(MockSerial::new(), Config::default());

        let session: AcquisitionSession<2> = block_on(px409.acquire(0, || 5.0)).unwrap();

        assert!(session.is_complete());
        assert!(session.samples().is_empty());
        assert_eq!(session.start_time(), 5.0);
        assert!(px409.release().written.is_empty());
    }
}
