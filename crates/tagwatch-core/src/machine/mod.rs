//! Activation/read state machine.
//!
//! Idle: wait (suspended) for the presence switch. Window open: reader
//! powered, bytes decoded into frames until the window length has elapsed.
//! Every transition appends exactly one record before the next one starts.

use core::fmt::Debug;

use log::{debug, info, warn};

use crate::{
    clock::ClockSource,
    config::WindowConfig,
    frame::{TagFrame, TagFrameDecoder},
    io::{ByteSource, PowerController, StatusIndicator, StatusPattern, WakeController},
    record::{EventCode, EventLog, LogRecord},
    session::SessionIdentity,
};


/// Everything the state machine drives. Owned exclusively by it.
pub struct Peripherals<RX, WAKE, PWR, CLK, LOG, LED> {
    pub reader: RX,
    pub wake: WAKE,
    pub power: PWR,
    pub clock: CLK,
    pub log: LOG,
    pub status: LED,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MachineState {
    Idle,
    WindowOpen,
}

/// What one call to [`FieldLogger::step`] did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// Slept until the presence switch became active.
    Suspended,
    WindowOpened,
    TagAccepted { event: EventCode, confirmed: bool },
    /// Window timed out with the switch still active; a fresh one started.
    WindowReopened,
    WindowClosed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fault {
    Serial,
    Wake,
    Power,
    Clock,
    Log,
}

#[derive(Clone, Copy, Debug)]
struct Window {
    started_ms: u64,
    /// Highest code emitted in this window; only ever promoted.
    event: EventCode,
    /// Start of a suppression pause that has not run out yet.
    pause_from_ms: Option<u64>,
}

impl Window {
    const fn opened_at(started_ms: u64) -> Self {
        Self {
            started_ms,
            event: EventCode::WindowOpen,
            pause_from_ms: None,
        }
    }
}

pub struct FieldLogger<RX, WAKE, PWR, CLK, LOG, LED>
where
    RX: ByteSource,
    WAKE: WakeController,
    PWR: PowerController,
    CLK: ClockSource,
    LOG: EventLog,
    LED: StatusIndicator,
{
    hw: Peripherals<RX, WAKE, PWR, CLK, LOG, LED>,
    identity: SessionIdentity,
    config: WindowConfig,
    decoder: TagFrameDecoder,
    window: Option<Window>,
}

impl<RX, WAKE, PWR, CLK, LOG, LED> FieldLogger<RX, WAKE, PWR, CLK, LOG, LED>
where
    RX: ByteSource,
    WAKE: WakeController,
    PWR: PowerController,
    CLK: ClockSource,
    LOG: EventLog,
    LED: StatusIndicator,
{
    pub fn new(
        hw: Peripherals<RX, WAKE, PWR, CLK, LOG, LED>,
        identity: SessionIdentity,
        config: WindowConfig,
    ) -> Self {
        Self {
            hw,
            identity,
            config,
            decoder: TagFrameDecoder::new(),
            window: None,
        }
    }

    pub fn state(&self) -> MachineState {
        match self.window {
            Some(_) => MachineState::WindowOpen,
            None => MachineState::Idle,
        }
    }

    /// Appends the once-per-boot session record.
    pub fn log_session_start(&mut self) -> Result<(), Fault> {
        self.append(EventCode::SessionStart, "")
    }

    /// Steps forever. Faults are logged, then the loop carries on.
    pub fn run(&mut self) -> ! {
        loop {
            match self.step() {
                Ok(step) => debug!("machine: {:?} state={:?}", step, self.state()),
                Err(fault) => self.on_fault(fault),
            }
        }
    }

    /// The error flash blocks without reading the reader, so it is only
    /// shown while idle.
    fn on_fault(&mut self, fault: Fault) {
        warn!("machine: {:?} fault, continuing", fault);
        if self.window.is_none() {
            self.hw.status.show(StatusPattern::Error);
        }
    }

    /// Runs until the next transition and returns it.
    pub fn step(&mut self) -> Result<Step, Fault> {
        match self.window {
            None => {
                if self.hw.wake.presence_active().map_err(fault(Fault::Wake))? {
                    self.open_window()?;
                    return Ok(Step::WindowOpened);
                }
                self.hw.status.show(StatusPattern::Heartbeat);
                self.hw.wake.suspend().map_err(fault(Fault::Wake))?;
                Ok(Step::Suspended)
            }
            Some(window) => self.poll_window(window),
        }
    }

    fn open_window(&mut self) -> Result<(), Fault> {
        self.hw.power.energize().map_err(fault(Fault::Power))?;
        let started_ms = self.hw.clock.uptime_ms();
        self.hw.status.show(StatusPattern::Event);

        self.decoder.reset();
        self.window = Some(Window::opened_at(started_ms));
        info!("window: open at {}ms", started_ms);
        self.append(EventCode::WindowOpen, "")
    }

    fn poll_window(&mut self, window: Window) -> Result<Step, Fault> {
        // A pause cut short by a fault is finished before anything is parsed.
        let window = self.drain_pause(window)?;
        let window_ms = u64::from(self.config.window_ms());
        loop {
            let now_ms = self.hw.clock.uptime_ms();
            if now_ms.saturating_sub(window.started_ms) >= window_ms {
                return self.on_timeout(now_ms);
            }

            let Some(byte) = self.hw.reader.read_byte().map_err(fault(Fault::Serial))? else {
                continue;
            };
            if let Some(frame) = self.decoder.feed(byte) {
                return self.accept(window, frame);
            }
        }
    }

    fn accept(&mut self, mut window: Window, frame: TagFrame) -> Result<Step, Fault> {
        window.pause_from_ms = Some(self.hw.clock.uptime_ms());
        window.event = match window.event {
            EventCode::WindowOpen => EventCode::FirstRead,
            _ => EventCode::RepeatRead,
        };
        self.window = Some(window);

        if !frame.confirmed {
            debug!("frame: end marker mismatch, logging anyway");
        }
        self.append(window.event, &frame.text())?;
        self.hw.status.show(StatusPattern::Event);
        self.drain_pause(window)?;

        Ok(Step::TagAccepted {
            event: window.event,
            confirmed: frame.confirmed,
        })
    }

    /// Reads and discards bytes until the pending suppression pause runs
    /// out. Blocking, but the receive buffer keeps being emptied. On a fault
    /// the pause stays pending and the next call resumes it.
    fn drain_pause(&mut self, mut window: Window) -> Result<Window, Fault> {
        let Some(pause_from_ms) = window.pause_from_ms else {
            return Ok(window);
        };
        let pause_ms = u64::from(self.config.pause_ms());
        let mut drained = 0u32;
        while self.hw.clock.uptime_ms().saturating_sub(pause_from_ms) < pause_ms {
            if self
                .hw
                .reader
                .read_byte()
                .map_err(fault(Fault::Serial))?
                .is_some()
            {
                drained = drained.saturating_add(1);
            }
        }
        window.pause_from_ms = None;
        self.window = Some(window);
        debug!("pause: drained {} bytes", drained);
        Ok(window)
    }

    fn on_timeout(&mut self, now_ms: u64) -> Result<Step, Fault> {
        if self.hw.wake.presence_active().map_err(fault(Fault::Wake))? {
            self.decoder.reset();
            self.window = Some(Window::opened_at(now_ms));
            self.hw.status.show(StatusPattern::Event);
            info!("window: switch still active, reopening at {}ms", now_ms);
            self.append(EventCode::WindowOpen, "")?;
            return Ok(Step::WindowReopened);
        }

        self.hw.power.deenergize().map_err(fault(Fault::Power))?;
        self.window = None;
        info!("window: closed at {}ms", now_ms);
        // Whatever the decoder still holds goes into the closing record.
        let residue = self.decoder.residue();
        self.append(EventCode::WindowClose, &residue)?;
        Ok(Step::WindowClosed)
    }

    fn append(&mut self, event: EventCode, tag_id: &str) -> Result<(), Fault> {
        let at = self.hw.clock.now().map_err(fault(Fault::Clock))?;
        let record = LogRecord::new(&at, &self.identity, event, tag_id);
        self.hw.log.append(&record).map_err(fault(Fault::Log))?;
        debug!(
            "record: {} {} event={} tag={}",
            record.date,
            record.time,
            event.as_u8(),
            record.tag_id
        );
        Ok(())
    }
}

fn fault<E: Debug>(kind: Fault) -> impl FnOnce(E) -> Fault {
    move |err| {
        warn!("{:?}: {:?}", kind, err);
        kind
    }
}
