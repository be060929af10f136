/*!
    the bus session owning the stack handle and the per-node bookkeeping
*/

use std::collections::HashSet;
use core::time::Duration;
use crate::{
    bus::Bus,
    error::{CanopenError, CanopenResult},
    lss::Lss,
    node::Node,
    };


/**
    every delay and deadline of the driver, passed in at session construction

    There is deliberately no module-level default to override: a component only sees the values the
    session was built with.
*/
#[derive(Clone, Debug)]
pub struct Timing {
    /// deadline of every state, mode and flag confirmation
    pub timeout: Duration,
    /// deadline of the boot-up message after a node reset
    pub bootup_timeout: Duration,
    /// period of the state and mode confirmation polls
    pub poll_interval: Duration,
    /// period of the statusword flag polls, much shorter since these pace the motion handshakes
    pub status_poll_interval: Duration,
    /// settle time between raising the homing start bit and trusting the statusword
    pub homing_settle: Duration,
    /// idle time before each fast-scan attempt
    pub lss_scan_delay: Duration,
    /// settle time after a network-wide NMT reset
    pub lss_reset_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            bootup_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(100),
            status_poll_interval: Duration::from_millis(1),
            homing_settle: Duration::from_millis(500),
            lss_scan_delay: Duration::from_millis(100),
            lss_reset_delay: Duration::from_secs(1),
        }
    }
}


/**
    This struct exposes one logical session over a CANopen bus.

    Functions addressing a specific drive are exposed in [Node], the network-wide LSS services in
    [Lss]. The session enforces the two usage rules a shared bus imposes:

    - one [Node] instance per physical node: creating a second driver for a node already in use is
      refused, and dropping a node frees its id
    - LSS global-state windows are exclusive: the whole network leaves its normal addressing mode
      during discovery, so the [Lss] operations serialize on one lock and no node traffic should
      run concurrently with them

    The underlying interface is released when the session drops, whatever the exit path.
*/
pub struct Network<B: Bus> {
    bus: B,
    timing: Timing,
    pub(crate) nodes: std::sync::Mutex<HashSet<u8>>,
    pub(crate) lss_window: tokio::sync::Mutex<()>,
}

impl<B: Bus> Network<B> {
    /// start a session over a connected stack, with [Timing::default]
    pub fn new(bus: B) -> Self {
        Self::with_timing(bus, Timing::default())
    }

    pub fn with_timing(bus: B, timing: Timing) -> Self {
        Self {
            bus,
            timing,
            nodes: HashSet::new().into(),
            lss_window: tokio::sync::Mutex::new(()),
        }
    }

    pub fn timing(&self) -> &Timing  {&self.timing}

    pub(crate) fn bus(&self) -> &B  {&self.bus}

    /// build the driver for one node, refused when the id is out of 1-127 or already driven
    pub fn node(&self, id: u8) -> CanopenResult<Node<'_, B>, B::Error> {
        Node::new(self, id)
    }

    /// the network-wide LSS discovery and assignment services
    pub fn lss(&self) -> Lss<'_, B> {
        Lss::new(self)
    }

    pub(crate) fn register_node(&self, id: u8) -> CanopenResult<(), B::Error> {
        let mut book = self.nodes.lock().unwrap();
        if ! book.insert(id)
            {return Err(CanopenError::Master("node already in use by an other instance"))}
        Ok(())
    }

    pub(crate) fn release_node(&self, id: u8) {
        let mut book = self.nodes.lock().unwrap();
        book.remove(&id);
    }
}

impl<B: Bus> Drop for Network<B> {
    fn drop(&mut self) {
        self.bus.disconnect();
        log::debug!("canopen session released");
    }
}
