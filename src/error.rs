//! definition of the general canopen driving error type

use core::fmt;
use crate::cia402::{OperationMode, PowerState};

/**
    general object reporting an unexpected result while driving a node

    Its variants are meant to help finding the cause responsible for the problem and how to deal
    with it. Every variant names the node and the exact condition involved: the sequences in this
    crate are multi-step handshakes, a failure without its step is not actionable.

    The type is generic over the transport error of the underlying stack ([crate::bus::Bus::Error]),
    so the stack's own diagnostics reach the caller unchanged.
*/
#[derive(Clone, Debug)]
pub enum CanopenError<E=()> {
    /// error reported by the underlying stack
    ///
    /// these errors are exterior to this library and are never retried by it
    Bus(E),

    /// a confirmation the driver polled for was not observed in time
    ///
    /// the dominant failure kind on a drive: the command was written but the device never reported
    /// the expected condition. The operation may be retried once the cause (wiring, drive fault,
    /// too short a timeout) is understood
    Timeout {
        node: u8,
        waited: Waited,
    },

    /// an LSS selective target reported a different active node id than expected
    ///
    /// deliberately never auto-corrected: with colliding ids on the bus, going on would reassign
    /// the id of the wrong physical unit. No configuration was changed
    SafetyAbort {
        expected: u8,
        reported: u8,
    },

    /// a store-configuration / store-parameters request failed, the value holds in RAM only
    Store {
        node: u8,
    },

    /// a register required by the driver is absent from the device's dictionary
    MissingRegister {
        node: u8,
        index: u16,
        sub: u8,
    },

    /// error reported by the master side
    ///
    /// these errors can generally be fixed by using the driver differently when the issue is in
    /// the user code
    Master(&'static str),

    /// a homing sequence failed at the wrapped step, the start trigger was de-asserted before reporting
    Homing {
        node: u8,
        cause: Box<CanopenError<E>>,
    },

    /// a profile-position command failed at the wrapped step
    Motion {
        node: u8,
        /// target position of the failing set-point, in increments
        target: i32,
        cause: Box<CanopenError<E>>,
    },
}

/// the exact condition a timed-out poll loop was waiting for
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Waited {
    /// statusword-derived power state
    State(PowerState),
    /// echo of the operation mode select register
    Mode(OperationMode),
    /// statusword bits, to be all set or all cleared
    StatusFlags {
        mask: u16,
        set: bool,
    },
}

/// convenient alias to simplify return annotations
pub type CanopenResult<T=(), E=()> = core::result::Result<T, CanopenError<E>>;

impl<E: fmt::Debug> fmt::Display for CanopenError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(cause) =>
                write!(f, "transport error: {:?}", cause),
            Self::Timeout {node, waited} => match waited {
                Waited::State(state) =>
                    write!(f, "node {}: timeout while changing 402 state to '{}'", node, state),
                Waited::Mode(mode) =>
                    write!(f, "node {}: failed to confirm control mode {:?}", node, mode),
                Waited::StatusFlags {mask, set} =>
                    write!(f, "node {}: timeout waiting for flags {:#06x} to be {} in statusword",
                        node, mask, if *set {"set"} else {"cleared"}),
            },
            Self::SafetyAbort {expected, reported} =>
                write!(f, "safety stop: expected current node id {}, but device reports {}, no changes applied",
                    expected, reported),
            Self::Store {node} =>
                write!(f, "node {}: store configuration request failed", node),
            Self::MissingRegister {node, index, sub} =>
                write!(f, "node {}: required register {:#06x}:{} absent from the device dictionary",
                    node, index, sub),
            Self::Master(message) =>
                write!(f, "master: {}", message),
            Self::Homing {node, cause} =>
                write!(f, "node {}: homing failed: {}", node, cause),
            Self::Motion {node, target, cause} =>
                write!(f, "node {}: motion toward {} failed: {}", node, target, cause),
        }
    }
}

impl<E: fmt::Debug> std::error::Error for CanopenError<E> {}

impl<E> CanopenError<E> {
    /// convert the error with a callback handling the transport payload
    pub fn map<F, T>(self, callback: F) -> CanopenError<T>
    where F: Fn(E) -> T + Copy
    {
        match self {
            Self::Bus(value) => CanopenError::Bus(callback(value)),
            Self::Timeout {node, waited} => CanopenError::Timeout {node, waited},
            Self::SafetyAbort {expected, reported} => CanopenError::SafetyAbort {expected, reported},
            Self::Store {node} => CanopenError::Store {node},
            Self::MissingRegister {node, index, sub} => CanopenError::MissingRegister {node, index, sub},
            Self::Master(message) => CanopenError::Master(message),
            Self::Homing {node, cause} => CanopenError::Homing {node, cause: Box::new(cause.map(callback))},
            Self::Motion {node, target, cause} => CanopenError::Motion {node, target, cause: Box::new(cause.map(callback))},
        }
    }

    /// the root failure of a sequencer error, the error itself otherwise
    pub fn root(&self) -> &Self {
        match self {
            Self::Homing {cause, ..} | Self::Motion {cause, ..} => cause.root(),
            other => other,
        }
    }
}
