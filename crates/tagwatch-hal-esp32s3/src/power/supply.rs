use embedded_hal::digital::OutputPin;
use log::debug;

use tagwatch_core::io::PowerController;

/// High-side switch feeding the RFID reader module.
#[derive(Debug)]
pub struct SupplyLine<P> {
    pin: P,
    active_high: bool,
    energized: bool,
}

impl<P> SupplyLine<P>
where
    P: OutputPin,
{
    /// Drives the line to its off level before returning.
    pub fn new(pin: P, active_high: bool) -> Result<Self, P::Error> {
        let mut line = Self {
            pin,
            active_high,
            energized: true,
        };
        line.drive(false)?;
        Ok(line)
    }

    fn drive(&mut self, on: bool) -> Result<(), P::Error> {
        if on == self.active_high {
            self.pin.set_high()?;
        } else {
            self.pin.set_low()?;
        }
        if on != self.energized {
            debug!("supply: reader {}", if on { "on" } else { "off" });
        }
        self.energized = on;
        Ok(())
    }
}

impl<P> PowerController for SupplyLine<P>
where
    P: OutputPin,
{
    type Error = P::Error;

    fn energize(&mut self) -> Result<(), Self::Error> {
        self.drive(true)
    }

    fn deenergize(&mut self) -> Result<(), Self::Error> {
        self.drive(false)
    }
}
