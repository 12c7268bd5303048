//! Output actions applied when a state is entered.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::events::split_indexed;

/// Where an output action goes.
///
/// Hardware lines are forwarded to the [`OutputPort`](crate::app::ports::OutputPort);
/// the timer and soft-code channels are handled by the runner itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputChannel {
    Valve(u8),
    Bnc(u8),
    Wire(u8),
    Pwm(u8),
    /// Message byte to a serial module (e.g. rotary encoder).
    Serial(u8),
    /// Arm the global timer whose id is the action value.
    GlobalTimerTrig,
    /// Cancel the global timer whose id is the action value.
    GlobalTimerCancel,
    /// Send the action value to the stimulus controller.
    SoftCode,
}

impl OutputChannel {
    /// `true` for channels that drive a physical line.
    pub const fn is_hardware(self) -> bool {
        !matches!(
            self,
            Self::GlobalTimerTrig | Self::GlobalTimerCancel | Self::SoftCode
        )
    }
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valve(n) => write!(f, "Valve{n}"),
            Self::Bnc(n) => write!(f, "BNC{n}"),
            Self::Wire(n) => write!(f, "Wire{n}"),
            Self::Pwm(n) => write!(f, "PWM{n}"),
            Self::Serial(n) => write!(f, "Serial{n}"),
            Self::GlobalTimerTrig => write!(f, "GlobalTimerTrig"),
            Self::GlobalTimerCancel => write!(f, "GlobalTimerCancel"),
            Self::SoftCode => write!(f, "SoftCode"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChannelError(pub String);

impl fmt::Display for ParseChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised output channel '{}'", self.0)
    }
}

impl std::error::Error for ParseChannelError {}

impl FromStr for OutputChannel {
    type Err = ParseChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GlobalTimerTrig" => return Ok(Self::GlobalTimerTrig),
            "GlobalTimerCancel" => return Ok(Self::GlobalTimerCancel),
            "SoftCode" => return Ok(Self::SoftCode),
            _ => {}
        }
        let lines: [(&str, fn(u8) -> Self); 5] = [
            ("Valve", Self::Valve),
            ("BNC", Self::Bnc),
            ("Wire", Self::Wire),
            ("PWM", Self::Pwm),
            ("Serial", Self::Serial),
        ];
        lines
            .iter()
            .find_map(|(prefix, make)| match split_indexed(s, prefix) {
                Some((n, "")) if n > 0 => Some(make(n)),
                _ => None,
            })
            .ok_or_else(|| ParseChannelError(s.to_owned()))
    }
}

impl Serialize for OutputChannel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OutputChannel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// One `(channel, value)` pair from a state's output list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputAction {
    pub channel: OutputChannel,
    pub value: u8,
}

impl OutputAction {
    pub const fn new(channel: OutputChannel, value: u8) -> Self {
        Self { channel, value }
    }

    pub const fn soft_code(code: u8) -> Self {
        Self::new(OutputChannel::SoftCode, code)
    }

    pub const fn trigger_timer(id: u8) -> Self {
        Self::new(OutputChannel::GlobalTimerTrig, id)
    }

    pub const fn cancel_timer(id: u8) -> Self {
        Self::new(OutputChannel::GlobalTimerCancel, id)
    }
}
