/*!
    vocabulary of the CiA 402 drive profile: controlword, statusword, power states and operation modes

    The drive profile does not expose its power state as a settable register: the state is *commanded*
    through bit patterns in the controlword (0x6040) and *reported* as bit patterns in the statusword
    (0x6041). The types here hold both sides of that contract, the driving logic lives in [crate::node].
*/

use core::fmt;
use bilge::prelude::*;
use crate::bits::bit;
use crate::registers::RegValue;


/**
    bit structure of the controlword (0x6040)

    | Bit   | Meaning |
    |-------|---------|
    | 0     | Switch on |
    | 1     | Enable voltage |
    | 2     | Quick stop |
    | 3     | Enable operation |
    | 4     | New set-point (profile position) / start homing (homing mode), edge-triggered |
    | 5 – 6 | Operation mode specific |
    | 7     | Fault reset |
    | 8     | Halt |
    | 9     | Change set immediately |
    | 10 – 15 | Reserved / manufacturer specific |
*/
#[bitsize(16)]
#[derive(FromBits, DebugBits, Copy, Clone, Eq, PartialEq, Default)]
pub struct ControlWord {
    pub switch_on: bool,
    pub enable_voltage: bool,
    pub quick_stop: bool,
    pub enable_operation: bool,
    /// edge-triggered: the drive acts on the 0 -> 1 transition and must see 1 -> 0 before the next one
    pub new_set_point: bool,
    reserved: u2,
    pub fault_reset: bool,
    pub halt: bool,
    pub change_set_immediately: bool,
    reserved: u6,
}

impl ControlWord {
    /// transition command toward READY TO SWITCH ON
    pub fn command_shutdown() -> Self          {Self::from(0x0006)}
    /// transition command toward SWITCHED ON
    pub fn command_switch_on() -> Self         {Self::from(0x0007)}
    /// transition command toward OPERATION ENABLED, also the base pattern of every motion handshake
    pub fn command_enable_operation() -> Self  {Self::from(0x000f)}
    /// transition command toward SWITCH ON DISABLED
    pub fn command_disable_voltage() -> Self   {Self::from(0x0000)}
    /// transition command toward QUICK STOP ACTIVE
    pub fn command_quick_stop() -> Self        {Self::from(0x0002)}
    /// edge command acknowledging a FAULT, leads back to SWITCH ON DISABLED
    pub fn command_fault_reset() -> Self       {Self::from(0x0080)}

    /// this word with bit 4 set or cleared
    pub fn with_new_set_point(mut self, on: bool) -> Self {
        self.set_new_set_point(on);
        self
    }
    /// this word with bit 9 set or cleared
    pub fn with_change_set(mut self, on: bool) -> Self {
        self.set_change_set_immediately(on);
        self
    }
}

impl RegValue for ControlWord {
    const BITS: u8 = 16;
    fn from_raw(raw: u32) -> Self  {Self::from(raw as u16)}
    fn to_raw(self) -> u32  {u16::from(self) as u32}
}

impl fmt::Display for ControlWord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ControlWord{{")?;
        for (active, mark) in [ (self.switch_on(), "so"),
                                (self.enable_voltage(), "ev"),
                                (self.quick_stop(), "qs"),
                                (self.enable_operation(), "eo"),
                                (self.new_set_point(), "nsp"),
                                (self.fault_reset(), "rf"),
                                (self.halt(), "h"),
                                (self.change_set_immediately(), "csi"),
                                ] {
            write!(f, " ")?;
            if active {
                write!(f, "{}", mark)?;
            } else {
                for _ in 0 .. mark.len() {write!(f, " ")?;}
            }
        }
        write!(f, "}}")?;
        Ok(())
    }
}


/**
    bit structure of the statusword (0x6041)

    | Bit   | Meaning |
    |-------|---------|
    | 0     | Ready to switch on |
    | 1     | Switched on |
    | 2     | Operation enabled |
    | 3     | Fault |
    | 4     | Voltage enabled |
    | 5     | Quick stop |
    | 6     | Switch on disabled |
    | 7     | Warning |
    | 9     | Remote |
    | 10    | Target reached |
    | 11    | Internal limit active |
    | 12    | Set-point acknowledge (profile position) / homing attained (homing mode) |
    | 13 – 15 | Operation mode / manufacturer specific |
*/
#[bitsize(16)]
#[derive(FromBits, DebugBits, Copy, Clone, Eq, PartialEq, Default)]
pub struct StatusWord {
    pub ready_to_switch_on: bool,
    pub switched_on: bool,
    pub operation_enabled: bool,
    pub fault: bool,
    pub voltage_enabled: bool,
    pub quick_stop: bool,
    pub switch_on_disabled: bool,
    pub warning: bool,
    reserved: u1,
    pub remote: bool,
    pub target_reached: bool,
    pub internal_limit: bool,
    pub acknowledge: bool,
    reserved: u3,
}

impl RegValue for StatusWord {
    const BITS: u8 = 16;
    fn from_raw(raw: u32) -> Self  {Self::from(raw as u16)}
    fn to_raw(self) -> u32  {u16::from(self) as u32}
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "StatusWord{{")?;
        for (active, mark) in [ (self.ready_to_switch_on(), "rtso"),
                                (self.switched_on(), "so"),
                                (self.operation_enabled(), "oe"),
                                (self.fault(), "f"),
                                (self.voltage_enabled(), "ve"),
                                (self.quick_stop(), "qs"),
                                (self.switch_on_disabled(), "sod"),
                                (self.warning(), "w"),
                                (self.remote(), "r"),
                                (self.target_reached(), "tr"),
                                (self.internal_limit(), "la"),
                                (self.acknowledge(), "ack"),
                                ] {
            write!(f, " ")?;
            if active {
                write!(f, "{}", mark)?;
            } else {
                for _ in 0 .. mark.len() {write!(f, " ")?;}
            }
        }
        write!(f, "}}")?;
        Ok(())
    }
}

/// statusword masks awaited by the sequencers
pub mod status {
    use super::bit;

    /// bit 10, set once the motion profile settled on the last accepted target
    pub const TARGET_REACHED: u16 = bit(10);
    /// bit 12 in profile position mode, mirrors controlword bit 4 during the set-point handshake
    pub const SET_POINT_ACKNOWLEDGE: u16 = bit(12);
    /// bit 12 in homing mode, set once the reference position is attained
    pub const HOMING_ATTAINED: u16 = bit(12);
}


/**
    power states of the CiA 402 state machine

    A state is never stored: it is re-derived from a fresh statusword read every time it is needed,
    since only the drive knows its own state. [PowerState::NotReadyToSwitchOn] and
    [PowerState::FaultReactionActive] are observation-only, the drive traverses them on its own and
    they cannot be requested. [PowerState::DisableVoltage] is the opposite: it is a command that the
    drive confirms by reporting SWITCH ON DISABLED.
*/
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PowerState {
    NotReadyToSwitchOn,
    SwitchOnDisabled,
    ReadyToSwitchOn,
    SwitchedOn,
    OperationEnabled,
    QuickStopActive,
    FaultReactionActive,
    Fault,
    DisableVoltage,
}

/// fixed (mask, pattern) table deriving the power state from statusword bits 0-6
const STATE_PATTERNS: [(u16, u16, PowerState); 8] = [
    (0x4f, 0x00, PowerState::NotReadyToSwitchOn),
    (0x4f, 0x40, PowerState::SwitchOnDisabled),
    (0x6f, 0x21, PowerState::ReadyToSwitchOn),
    (0x6f, 0x23, PowerState::SwitchedOn),
    (0x6f, 0x27, PowerState::OperationEnabled),
    (0x6f, 0x07, PowerState::QuickStopActive),
    (0x4f, 0x0f, PowerState::FaultReactionActive),
    (0x4f, 0x08, PowerState::Fault),
];

impl PowerState {
    /// derive the state from a statusword, `None` when the pattern matches no profile state
    pub fn from_statusword(status: StatusWord) -> Option<Self> {
        let raw = u16::from(status);
        STATE_PATTERNS.iter()
            .find(|(mask, pattern, _)|  raw & mask == *pattern)
            .map(|(_, _, state)|  *state)
    }

    /// controlword commanding a transition toward this state, `None` for observation-only states
    pub fn command(self) -> Option<ControlWord> {
        match self {
            Self::SwitchOnDisabled | Self::DisableVoltage => Some(ControlWord::command_disable_voltage()),
            Self::ReadyToSwitchOn => Some(ControlWord::command_shutdown()),
            Self::SwitchedOn => Some(ControlWord::command_switch_on()),
            Self::OperationEnabled => Some(ControlWord::command_enable_operation()),
            Self::QuickStopActive => Some(ControlWord::command_quick_stop()),
            _ => None,
        }
    }

    /// state the drive reports once the transition toward `self` is complete
    pub fn confirmed(self) -> Self {
        match self {
            Self::DisableVoltage => Self::SwitchOnDisabled,
            other => other,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::NotReadyToSwitchOn => "NOT READY TO SWITCH ON",
            Self::SwitchOnDisabled => "SWITCH ON DISABLED",
            Self::ReadyToSwitchOn => "READY TO SWITCH ON",
            Self::SwitchedOn => "SWITCHED ON",
            Self::OperationEnabled => "OPERATION ENABLED",
            Self::QuickStopActive => "QUICK STOP ACTIVE",
            Self::FaultReactionActive => "FAULT REACTION ACTIVE",
            Self::Fault => "FAULT",
            Self::DisableVoltage => "DISABLE VOLTAGE",
        })
    }
}


/**
    drive control mode, written to 0x6060 and reported by 0x6061

    Negative values are manufacturer specific modes of the stage controllers this crate was
    written against.
*/
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(i8)]
pub enum OperationMode {
    Off = 0,
    ProfilePosition = 1,
    Homing = 6,
    Hybrid = -1,
    OpenLoop = -2,
    Velocity = -3,
    Bus = -5,
}

impl OperationMode {
    /// wire value for 0x6060
    pub const fn code(self) -> i8  {self as i8}

    pub const fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::ProfilePosition),
            6 => Some(Self::Homing),
            -1 => Some(Self::Hybrid),
            -2 => Some(Self::OpenLoop),
            -3 => Some(Self::Velocity),
            -5 => Some(Self::Bus),
            _ => None,
        }
    }
}

/// homing method selector, written to 0x6098
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(i8)]
pub enum HomingMethod {
    /// search the encoder index pulse moving in negative direction
    NegIndex = 33,
    /// search the encoder index pulse moving in positive direction
    PosIndex = 34,
    /// declare the current position as home, no motion
    CurrentPosition = 37,
}

impl HomingMethod {
    pub const fn code(self) -> i8  {self as i8}
}

/// travel direction of the homing search
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HomingDirection {
    Positive,
    Negative,
}

impl HomingDirection {
    /// index-pulse homing method matching this direction
    pub const fn method(self) -> HomingMethod {
        match self {
            Self::Positive => HomingMethod::PosIndex,
            Self::Negative => HomingMethod::NegIndex,
        }
    }
}
