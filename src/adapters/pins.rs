//! GPIO / PWM output board.
//!
//! Maps [`OutputChannel`]s onto `embedded-hal` output pins and PWM
//! channels.  Digital lines go high for any non-zero value; PWM lines take
//! the value as a 0–255 duty fraction.

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use log::debug;

use crate::app::ports::OutputPort;
use crate::error::OutputError;
use crate::fsm::OutputChannel;

pub struct PinBoard<D, W> {
    digital: Vec<(OutputChannel, D)>,
    pwm: Vec<(OutputChannel, W)>,
}

impl<D: OutputPin, W: SetDutyCycle> PinBoard<D, W> {
    pub fn new() -> Self {
        Self {
            digital: Vec::new(),
            pwm: Vec::new(),
        }
    }

    /// Route `channel` to a digital pin.
    #[must_use]
    pub fn with_digital(mut self, channel: OutputChannel, pin: D) -> Self {
        self.digital.push((channel, pin));
        self
    }

    /// Route `channel` to a PWM output.
    #[must_use]
    pub fn with_pwm(mut self, channel: OutputChannel, pwm: W) -> Self {
        self.pwm.push((channel, pwm));
        self
    }
}

impl<D: OutputPin, W: SetDutyCycle> Default for PinBoard<D, W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: OutputPin, W: SetDutyCycle> OutputPort for PinBoard<D, W> {
    fn set(&mut self, channel: OutputChannel, value: u8) -> Result<(), OutputError> {
        if let Some((_, pin)) = self.digital.iter_mut().find(|(c, _)| *c == channel) {
            let result = if value > 0 { pin.set_high() } else { pin.set_low() };
            debug!("{} <- {}", channel, value > 0);
            return result.map_err(|_| OutputError::new(channel, "GPIO write failed"));
        }
        if let Some((_, pwm)) = self.pwm.iter_mut().find(|(c, _)| *c == channel) {
            debug!("{} <- {}/255", channel, value);
            return pwm
                .set_duty_cycle_fraction(u16::from(value), u16::from(u8::MAX))
                .map_err(|_| OutputError::new(channel, "PWM write failed"));
        }
        Err(OutputError::unmapped(channel))
    }
}
