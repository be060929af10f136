/*!
    This module provides the trait [Bus], the seam toward the underlying CANopen stack.

    The driver in this crate owns the *protocol sequences* (CiA 402 state machine, motion
    handshakes, LSS discovery) and deliberately not the wire: frame scheduling, SDO/PDO encoding
    and the object dictionary are the stack's business. Any stack exposing the primitives below can
    sit behind this trait, which also makes the whole driver testable against a scripted fake.

    All primitives are request/confirm operations on a shared bus, so implementations are expected
    to be used from one logical session at a time (see [crate::network::Network]).
*/

use core::fmt;


/// network management commands, broadcast or addressed to one node
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NmtCommand {
    Operational,
    Stopped,
    PreOperational,
    Reset,
    ResetCommunication,
}

impl NmtCommand {
    /// NMT command specifier on the wire
    pub const fn code(self) -> u8 {
        match self {
            Self::Operational => 0x01,
            Self::Stopped => 0x02,
            Self::PreOperational => 0x80,
            Self::Reset => 0x81,
            Self::ResetCommunication => 0x82,
        }
    }
}

/// network-wide LSS mode, switched globally or selectively (CiA 305)
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LssState {
    /// nodes answer no LSS configuration service
    Waiting,
    /// nodes accept inquire/configure services
    Configuration,
}

impl LssState {
    pub const fn code(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Configuration => 1,
        }
    }
}

/// node id reported by unconfigured devices (CiA 305)
pub const UNCONFIGURED_NODE_ID: u8 = 0xff;

/**
    immutable identity of a physical device: the content of object 0x1018, also the key the LSS
    selective and fast-scan services address devices by when node ids are absent or colliding
*/
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Identity {
    pub vendor_id: u32,
    pub product_code: u32,
    pub revision: u32,
    pub serial_number: u32,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "vendor={:#010x} product={:#010x} revision={:#010x} serial={:#010x}",
            self.vendor_id, self.product_code, self.revision, self.serial_number)
    }
}

/// record emitted by the discovery engine for each device it assigned an id to
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConfiguredDevice {
    pub identity: Identity,
    pub node_id: u8,
}


/**
    primitives expected from the underlying CANopen stack

    - SDO transfers are confirmed and blocking until the device answered
    - PDO accessors address mapped process variables by their dictionary entry; a PDO write
      transmits the owning frame, a PDO read returns the last received value
    - the LSS services follow CiA 305; [Bus::lss_fast_scan] runs the whole bisection and returns
      the isolated identity, if any device was still unidentified

    Raw values are exchanged as little-endian words right-aligned in an `u32`, the typed layer
    above is [crate::registers::RegValue].
*/
#[allow(async_fn_in_trait)]
pub trait Bus {
    /// transport-level error, surfaced unchanged through [crate::CanopenError::Bus]
    type Error: fmt::Debug;

    async fn sdo_read(&self, node: u8, index: u16, sub: u8) -> Result<u32, Self::Error>;
    async fn sdo_write(&self, node: u8, index: u16, sub: u8, value: u32) -> Result<(), Self::Error>;
    async fn pdo_read(&self, node: u8, index: u16, sub: u8) -> Result<u32, Self::Error>;
    async fn pdo_write(&self, node: u8, index: u16, sub: u8, value: u32) -> Result<(), Self::Error>;

    /// whether the device advertises the given dictionary entry
    async fn dictionary_contains(&self, node: u8, index: u16, sub: u8) -> Result<bool, Self::Error>;

    async fn nmt_node(&self, node: u8, command: NmtCommand) -> Result<(), Self::Error>;
    async fn nmt_broadcast(&self, command: NmtCommand) -> Result<(), Self::Error>;
    /// block until the node emitted its boot-up message, or the stack's boot timeout elapsed
    async fn wait_bootup(&self, node: u8, timeout: core::time::Duration) -> Result<(), Self::Error>;

    async fn lss_switch_global(&self, state: LssState) -> Result<(), Self::Error>;
    async fn lss_switch_selective(&self, identity: Identity) -> Result<(), Self::Error>;
    async fn lss_inquire_node_id(&self) -> Result<u8, Self::Error>;
    async fn lss_configure_node_id(&self, id: u8) -> Result<(), Self::Error>;
    async fn lss_store_configuration(&self) -> Result<(), Self::Error>;
    async fn lss_fast_scan(&self) -> Result<Option<Identity>, Self::Error>;

    /// release the interface, called once when the owning session drops
    fn disconnect(&self);
}
