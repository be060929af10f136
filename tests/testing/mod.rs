//! scripted stand-in for the underlying CANopen stack
//!
//! Behaves like a bus of well-behaved drives: controlword commands move a small per-node model
//! through the 402 states, the set-point/homing triggers are edge sensitive, and every primitive
//! call is recorded so the tests can assert on exact wire-visible sequences.

// not every test crate exercises every knob
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use core::time::Duration;
use canstage::{Bus, Identity, LssState, NmtCommand, Timing};

pub type SharedState = Arc<Mutex<State>>;

/// LSS / NMT primitive calls, in invocation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LssOp {
    SwitchGlobal(LssState),
    SwitchSelective(Identity),
    Inquire,
    ConfigureId(u8),
    Store,
    FastScan,
    NmtBroadcast(NmtCommand),
}

#[derive(Default)]
pub struct DriveModel {
    /// raw statusword pattern of the current 402 state
    pub state: u16,
    pub prev_trigger: bool,
    pub acknowledge: bool,
    pub target_reached: bool,
    pub pending_set_point: bool,
}

#[derive(Default)]
pub struct State {
    pub registers: HashMap<(u8, u16, u8), u32>,
    /// dictionary entries reported absent
    pub missing: HashSet<(u16, u8)>,
    pub models: HashMap<u8, DriveModel>,
    /// when set, every statusword read reports this raw value instead of the model
    pub status_override: Option<u16>,
    /// whether a homing cycle attains its reference once triggered
    pub homing_attains: bool,
    /// when set, the drive silently drops mode-select writes and keeps echoing the old mode
    pub mode_write_ignored: bool,
    /// every controlword value written, in order
    pub controlwords: Vec<u16>,
    /// every register write (node, index, sub, raw), in order
    pub writes: Vec<(u8, u16, u8, u32)>,
    pub nmt: Vec<(Option<u8>, NmtCommand)>,
    pub lss: Vec<LssOp>,
    pub fast_scan_script: VecDeque<Option<Identity>>,
    pub inquire_script: VecDeque<Result<u8, &'static str>>,
    pub lss_configure_fails: bool,
    pub lss_store_fails: bool,
    pub sdo_fail: HashSet<(u8, u16, u8)>,
    pub disconnected: bool,
}

impl State {
    fn model(&mut self, node: u8) -> &mut DriveModel {
        self.models.entry(node).or_insert_with(|| DriveModel {
            // drives boot into SWITCH ON DISABLED
            state: 0x0040,
            ..DriveModel::default()
        })
    }

    fn mode(&self, node: u8) -> i8 {
        self.registers.get(&(node, 0x6060, 0)).copied().unwrap_or(0) as i8
    }

    fn statusword(&mut self, node: u8) -> u16 {
        if let Some(raw) = self.status_override {
            return raw
        }
        let model = self.model(node);
        let mut raw = model.state;
        if model.acknowledge {raw |= 1 << 12}
        if model.target_reached {raw |= 1 << 10}
        raw
    }

    fn apply_controlword(&mut self, node: u8, word: u16) {
        self.controlwords.push(word);
        let mode = self.mode(node);
        let homing_attains = self.homing_attains;
        let model = self.model(node);

        // fault acknowledge
        if word & 0x80 != 0 {
            if model.state & 0x4f == 0x08 || model.state & 0x4f == 0x0f {
                model.state = 0x0040;
            }
            return
        }

        // power state commands, this fake drive accepts them from anywhere
        model.state = match word & 0x0f {
            0x00 => 0x0040,
            0x06 => 0x0021,
            0x07 => 0x0023,
            0x0f => 0x0027,
            0x02 => if model.state == 0x0027 {0x0007} else {0x0040},
            _ => model.state,
        };

        // edge-sensitive trigger (bit 4): set-point handover or homing start
        let trigger = word & 0x10 != 0;
        if trigger && ! model.prev_trigger {
            if mode == 6 {
                if homing_attains {model.acknowledge = true}
            } else {
                model.acknowledge = true;
                model.pending_set_point = true;
            }
        }
        if ! trigger && model.prev_trigger && mode != 6 {
            model.acknowledge = false;
            if model.pending_set_point {
                // this fake stage reaches every accepted target instantly
                model.target_reached = true;
                model.pending_set_point = false;
            }
        }
        model.prev_trigger = trigger;
    }

    fn write(&mut self, node: u8, index: u16, sub: u8, value: u32) {
        self.writes.push((node, index, sub, value));
        if index == 0x6060 && self.mode_write_ignored {
            return
        }
        self.registers.insert((node, index, sub), value);
        if index == 0x6040 {
            self.apply_controlword(node, value as u16);
        }
    }

    fn read(&mut self, node: u8, index: u16, sub: u8) -> u32 {
        if index == 0x6041 {
            return self.statusword(node) as u32
        }
        self.registers.get(&(node, index, sub)).copied().unwrap_or(0)
    }
}

pub struct MockBus {
    pub state: SharedState,
}

/// a fresh bus and a handle on its state for scripting and asserting
pub fn mock() -> (MockBus, SharedState) {
    let state = Arc::new(Mutex::new(State {
        homing_attains: true,
        ..State::default()
    }));
    (MockBus {state: state.clone()}, state)
}

/// timing tuned down so the auto-advancing test clock iterates little
pub fn timing() -> Timing {
    Timing {
        timeout: Duration::from_millis(500),
        bootup_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(20),
        status_poll_interval: Duration::from_millis(1),
        homing_settle: Duration::from_millis(50),
        lss_scan_delay: Duration::from_millis(10),
        lss_reset_delay: Duration::from_millis(20),
    }
}

/// distinct identity tuples for the discovery scenarios
pub fn identity(n: u32) -> Identity {
    Identity {
        vendor_id: 0x0000_0cae,
        product_code: 0x0002_0000 + n,
        revision: 1,
        serial_number: 0x0005_0000 + n,
    }
}

/// preset the identity object of a node in the register map
pub fn preset_identity(state: &SharedState, node: u8, identity: Identity) {
    let mut state = state.lock().unwrap();
    state.registers.insert((node, 0x1018, 1), identity.vendor_id);
    state.registers.insert((node, 0x1018, 2), identity.product_code);
    state.registers.insert((node, 0x1018, 3), identity.revision);
    state.registers.insert((node, 0x1018, 4), identity.serial_number);
}

impl Bus for MockBus {
    type Error = &'static str;

    async fn sdo_read(&self, node: u8, index: u16, sub: u8) -> Result<u32, Self::Error> {
        let mut state = self.state.lock().unwrap();
        if state.sdo_fail.contains(&(node, index, sub)) {
            return Err("sdo timed out")
        }
        Ok(state.read(node, index, sub))
    }

    async fn sdo_write(&self, node: u8, index: u16, sub: u8, value: u32) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        if state.sdo_fail.contains(&(node, index, sub)) {
            return Err("sdo timed out")
        }
        state.write(node, index, sub, value);
        Ok(())
    }

    async fn pdo_read(&self, node: u8, index: u16, sub: u8) -> Result<u32, Self::Error> {
        Ok(self.state.lock().unwrap().read(node, index, sub))
    }

    async fn pdo_write(&self, node: u8, index: u16, sub: u8, value: u32) -> Result<(), Self::Error> {
        self.state.lock().unwrap().write(node, index, sub, value);
        Ok(())
    }

    async fn dictionary_contains(&self, _node: u8, index: u16, sub: u8) -> Result<bool, Self::Error> {
        Ok(! self.state.lock().unwrap().missing.contains(&(index, sub)))
    }

    async fn nmt_node(&self, node: u8, command: NmtCommand) -> Result<(), Self::Error> {
        self.state.lock().unwrap().nmt.push((Some(node), command));
        Ok(())
    }

    async fn nmt_broadcast(&self, command: NmtCommand) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        state.nmt.push((None, command));
        state.lss.push(LssOp::NmtBroadcast(command));
        Ok(())
    }

    async fn wait_bootup(&self, _node: u8, _timeout: Duration) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn lss_switch_global(&self, lss_state: LssState) -> Result<(), Self::Error> {
        self.state.lock().unwrap().lss.push(LssOp::SwitchGlobal(lss_state));
        Ok(())
    }

    async fn lss_switch_selective(&self, identity: Identity) -> Result<(), Self::Error> {
        self.state.lock().unwrap().lss.push(LssOp::SwitchSelective(identity));
        Ok(())
    }

    async fn lss_inquire_node_id(&self) -> Result<u8, Self::Error> {
        let mut state = self.state.lock().unwrap();
        state.lss.push(LssOp::Inquire);
        state.inquire_script.pop_front().unwrap_or(Err("no lss answer"))
    }

    async fn lss_configure_node_id(&self, id: u8) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        state.lss.push(LssOp::ConfigureId(id));
        if state.lss_configure_fails {
            return Err("lss configure collided")
        }
        Ok(())
    }

    async fn lss_store_configuration(&self) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        state.lss.push(LssOp::Store);
        if state.lss_store_fails {
            return Err("store rejected")
        }
        Ok(())
    }

    async fn lss_fast_scan(&self) -> Result<Option<Identity>, Self::Error> {
        let mut state = self.state.lock().unwrap();
        state.lss.push(LssOp::FastScan);
        Ok(state.fast_scan_script.pop_front().unwrap_or(None))
    }

    fn disconnect(&self) {
        self.state.lock().unwrap().disconnected = true;
    }
}
