use embedded_hal::{delay::DelayNs, digital::OutputPin};

use tagwatch_core::io::{StatusIndicator, StatusPattern};

#[derive(Clone, Copy, Debug)]
struct Blink {
    count: u8,
    on_ms: u32,
    off_ms: u32,
}

const fn blink_for(pattern: StatusPattern) -> Blink {
    match pattern {
        StatusPattern::Error => Blink {
            count: 1,
            on_ms: 1_000,
            off_ms: 1_000,
        },
        StatusPattern::Heartbeat => Blink {
            count: 1,
            on_ms: 20,
            off_ms: 0,
        },
        StatusPattern::Event => Blink {
            count: 6,
            on_ms: 60,
            off_ms: 60,
        },
    }
}

/// Single indicator LED. Patterns block for their full duration.
#[derive(Debug)]
pub struct StatusLed<P, D> {
    pin: P,
    delay: D,
    active_high: bool,
}

impl<P, D> StatusLed<P, D>
where
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(pin: P, delay: D, active_high: bool) -> Self {
        let mut led = Self {
            pin,
            delay,
            active_high,
        };
        led.set(false);
        led
    }

    fn set(&mut self, on: bool) {
        // A stuck LED pin is not worth failing a record over.
        let _ = if on == self.active_high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
    }
}

impl<P, D> StatusIndicator for StatusLed<P, D>
where
    P: OutputPin,
    D: DelayNs,
{
    fn show(&mut self, pattern: StatusPattern) {
        let blink = blink_for(pattern);
        for _ in 0..blink.count {
            self.set(true);
            self.delay.delay_ms(blink.on_ms);
            self.set(false);
            if blink.off_ms > 0 {
                self.delay.delay_ms(blink.off_ms);
            }
        }
    }
}
