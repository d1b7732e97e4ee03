use crate::Error;

/// Represents the update rate class of the PX409 transducer.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Rate {
    /// Class 0, 5 samples per second.
    Sps5,
    /// Class 1, 10 samples per second.
    Sps10,
    /// Class 2, 20 samples per second.
    Sps20,
    /// Class 3, 40 samples per second.
    Sps40,
    /// Class 4, 80 samples per second.
    Sps80,
    /// Class 5, 160 samples per second.
    Sps160,
    /// Class 6, 320 samples per second.
    Sps320,
    /// Class 7, 640 samples per second.
    Sps640,
    /// Class 8, 1000 samples per second.
    Sps1000,
}

impl Rate {
    /// Returns the class number sent with the `RATE` command (0-8).
    pub fn code(self) -> u8 {
        match self {
            Rate::Sps5 => 0,
            Rate::Sps10 => 1,
            Rate::Sps20 => 2,
            Rate::Sps40 => 3,
            Rate::Sps80 => 4,
            Rate::Sps160 => 5,
            Rate::Sps320 => 6,
            Rate::Sps640 => 7,
            Rate::Sps1000 => 8,
        }
    }

    /// Returns the nominal number of samples per second for this class.
    pub fn samples_per_second(self) -> u16 {
        match self {
            Rate::Sps5 => 5,
            Rate::Sps10 => 10,
            Rate::Sps20 => 20,
            Rate::Sps40 => 40,
            Rate::Sps80 => 80,
            Rate::Sps160 => 160,
            Rate::Sps320 => 320,
            Rate::Sps640 => 640,
            Rate::Sps1000 => 1000,
        }
    }
}

impl TryFrom<u8> for Rate {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Rate::Sps5,
            1 => Rate::Sps10,
            2 => Rate::Sps20,
            3 => Rate::Sps40,
            4 => Rate::Sps80,
            5 => Rate::Sps160,
            6 => Rate::Sps320,
            7 => Rate::Sps640,
            8 => Rate::Sps1000,
            _ => return Err(Error::InvalidArg),
        })
    }
}

/// Number of readings averaged by the boxcar filter.
///
/// The streaming output rate is the configured [`Rate`] divided by this value.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Averaging {
    /// Boxcar filter disabled, every reading is reported.
    Off,
    /// One reading reported per 2 taken.
    X2,
    /// One reading reported per 4 taken.
    X4,
    /// One reading reported per 8 taken.
    X8,
    /// One reading reported per 16 taken.
    X16,
}

impl Averaging {
    /// Returns the value sent with the `AVG` command.
    pub fn count(self) -> u8 {
        match self {
            Averaging::Off => 0,
            Averaging::X2 => 2,
            Averaging::X4 => 4,
            Averaging::X8 => 8,
            Averaging::X16 => 16,
        }
    }
}

impl TryFrom<u8> for Averaging {
    type Error = Error;

    fn try_from(count: u8) -> Result<Self, Self::Error> {
        Ok(match count {
            0 => Averaging::Off,
            2 => Averaging::X2,
            4 => Averaging::X4,
            8 => Averaging::X8,
            16 => Averaging::X16,
            _ => return Err(Error::InvalidArg),
        })
    }
}

/// Configuration settings for the PX409 transducer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Config {
    /// The update rate class.
    pub rate: Rate,
    /// The IIR filter period. `0` or `1` disables the filter, `None` leaves the device untouched.
    pub filter: Option<u8>,
    /// The boxcar averaging count. `None` leaves the device untouched.
    pub averaging: Option<Averaging>,
    /// Consecutive frameless reads tolerated while streaming. `None` waits forever.
    pub max_idle_reads: Option<u32>,
}

impl Config {
    /// Creates a new `Config` instance.
    ///
    /// # Arguments
    ///
    /// * `rate` - The update rate class to apply on init.
    ///
    /// # Returns
    ///
    /// A new `Config` with the given rate that leaves filtering and averaging untouched.
    pub fn new(rate: Rate) -> Config {
        Config {
            rate,
            ..Config::default()
        }
    }
    /// Sets the update rate class.
    pub fn rate(mut self, rate: Rate) -> Self {
        self.rate = rate;
        self
    }
    /// Sets the IIR filter period to apply on init.
    pub fn filter(mut self, period: u8) -> Self {
        self.filter = Some(period);
        self
    }
    /// Sets the boxcar averaging to apply on init.
    pub fn averaging(mut self, averaging: Averaging) -> Self {
        self.averaging = Some(averaging);
        self
    }
    /// Bounds the number of consecutive reads without a frame during acquisition.
    pub fn max_idle_reads(mut self, reads: u32) -> Self {
        self.max_idle_reads = Some(reads);
        self
    }
}

/// Provides default configuration values for the PX409 transducer.
impl Default for Config {
    /// The default configuration streams at 1000 sps, leaves filtering and
    /// averaging as the device has them, and never gives up on a silent stream.
    fn default() -> Config {
        Config {
            rate: Rate::Sps1000,
            filter: None,
            averaging: None,
            max_idle_reads: None,
        }
    }
}
