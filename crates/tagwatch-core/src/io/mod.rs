//! Hardware seams owned by the state machine.

#[cfg(test)]
pub mod mock;

/// Non-blocking byte source fed by the reader's serial output.
pub trait ByteSource {
    type Error: core::fmt::Debug;

    /// `Ok(None)` when no byte is ready.
    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error>;
}

/// Switched supply line of the RFID reader. Both operations are idempotent.
pub trait PowerController {
    type Error: core::fmt::Debug;

    fn energize(&mut self) -> Result<(), Self::Error>;
    fn deenergize(&mut self) -> Result<(), Self::Error>;
}

/// Owns the presence-switch line and the low-power halt that waits on it.
pub trait WakeController {
    type Error: core::fmt::Debug;

    fn presence_active(&mut self) -> Result<bool, Self::Error>;

    /// Halts until the presence line is active.
    ///
    /// Implementations must arm the wake condition with interrupts masked and
    /// only unmask once the halt is committed, so an edge arriving between the
    /// level check and the halt cannot be lost. Returns immediately if the line
    /// is already active.
    fn suspend(&mut self) -> Result<(), Self::Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusPattern {
    /// One slow blink; repeated forever while a startup precondition fails.
    Error,
    /// Short blip while idle and healthy.
    Heartbeat,
    /// Six quick flashes on an activation or an accepted tag.
    Event,
}

pub trait StatusIndicator {
    fn show(&mut self, pattern: StatusPattern);
}
