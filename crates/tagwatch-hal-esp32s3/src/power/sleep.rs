//! Light sleep gated on the presence switch.

use core::convert::Infallible;

use esp_hal::{
    gpio::{Input, RtcPin},
    rtc_cntl::{
        Rtc,
        sleep::{RtcioWakeupSource, WakeupLevel},
    },
};
use log::debug;

use tagwatch_core::io::WakeController;

pub struct LightSleepWake<'d, W> {
    presence: Input<'d>,
    wake_pin: W,
    rtc: Rtc<'d>,
    active_low: bool,
}

impl<'d, W> LightSleepWake<'d, W>
where
    W: RtcPin,
{
    /// `presence` and `wake_pin` name the same pad: one reads the level, the
    /// other is handed to the RTC IO wake logic.
    pub fn new(presence: Input<'d>, wake_pin: W, rtc: Rtc<'d>, active_low: bool) -> Self {
        Self {
            presence,
            wake_pin,
            rtc,
            active_low,
        }
    }

    fn level_active(&self) -> bool {
        self.presence.is_low() == self.active_low
    }
}

impl<W> WakeController for LightSleepWake<'_, W>
where
    W: RtcPin,
{
    type Error = Infallible;

    fn presence_active(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level_active())
    }

    fn suspend(&mut self) -> Result<(), Self::Error> {
        let level = if self.active_low {
            WakeupLevel::Low
        } else {
            WakeupLevel::High
        };

        // Level wake: a switch that closes after the check still holds the
        // pad asserted, so the sleep request returns at once.
        critical_section::with(|_| {
            if self.level_active() {
                return;
            }
            let mut wake_pins: [(&mut dyn RtcPin, WakeupLevel); 1] =
                [(&mut self.wake_pin, level)];
            let wake_source = RtcioWakeupSource::new(&mut wake_pins);
            self.rtc.sleep_light(&[&wake_source]);
        });

        debug!("sleep: woke, presence={}", self.level_active());
        Ok(())
    }
}
