/*!
    driver of one CiA 402 node
*/

use core::time::Duration;
use tokio::time::{Instant, sleep};
use crate::{
    bus::{Bus, Identity, NmtCommand},
    cia402::{ControlWord, OperationMode, PowerState, StatusWord},
    error::{CanopenError, CanopenResult, Waited},
    network::Network,
    registers::{self, Access, Register, RegValue},
    watch,
    };


/**
    This struct exposes the driver functions addressing one drive.

    Its lifetime refers to the [Network] session the node answers on.

    ## Note

    The drive profile defines the power state as a *statusword pattern*, not a settable register, so
    no primitive of the stack confirms a transition synchronously. Every state or mode change here
    closes the loop itself: command, then poll the device until it reports the request, or fail with
    the exact condition that never came. A transition is only considered committed once a
    subsequent read confirmed it.

    ## Example

    The following is a typical motion sequence on a freshly powered node

    ```ignore
    let node = network.node(32)?;
    node.setup().await?;
    node.home(HomingDirection::Positive, None).await?;
    node.enter_profile_position(&ProfileSettings::default()).await?;
    node.move_to(SetPoint::at(10_000)).await?;
    node.leave_profile_position().await?;
    ```
*/
pub struct Node<'a, B: Bus> {
    network: &'a Network<B>,
    id: u8,
}

impl<'a, B: Bus> Node<'a, B> {
    /**
        build the driver for the node with the given id, registering it in the session

        Nothing is sent on the bus yet: use [Self::setup] to boot the node, or the accessors
        directly when the node is already running.
    */
    pub fn new(network: &'a Network<B>, id: u8) -> CanopenResult<Self, B::Error> {
        if ! (1 ..= 127).contains(&id)
            {return Err(CanopenError::Master("node id out of the 1-127 range"))}
        network.register_node(id)?;
        Ok(Self {network, id})
    }

    pub fn id(&self) -> u8  {self.id}

    pub(crate) fn timing(&self) -> &crate::network::Timing  {self.network.timing()}

    /// read a register's current value, through the access path its table entry declares
    pub async fn read<T: RegValue>(&self, reg: Register<T>) -> CanopenResult<T, B::Error> {
        let bus = self.network.bus();
        let raw = match reg.access {
            Access::Sdo(_) => bus.sdo_read(self.id, reg.index, reg.sub).await,
            Access::Rpdo | Access::Tpdo => bus.pdo_read(self.id, reg.index, reg.sub).await,
        }.map_err(CanopenError::Bus)?;
        Ok(T::from_raw(raw))
    }

    /// write a register, through the access path its table entry declares
    pub async fn write<T: RegValue>(&self, reg: Register<T>, value: T) -> CanopenResult<(), B::Error> {
        let bus = self.network.bus();
        match reg.access {
            Access::Sdo(_) => bus.sdo_write(self.id, reg.index, reg.sub, value.to_raw()).await,
            Access::Rpdo | Access::Tpdo => bus.pdo_write(self.id, reg.index, reg.sub, value.to_raw()).await,
        }.map_err(CanopenError::Bus)
    }

    pub async fn statusword(&self) -> CanopenResult<StatusWord, B::Error> {
        self.read(registers::statusword).await
    }

    pub async fn set_controlword(&self, word: ControlWord) -> CanopenResult<(), B::Error> {
        log::debug!("node {}: controlword = {}", self.id, word);
        self.write(registers::controlword, word).await
    }

    /**
        power state currently reported by the drive, from a fresh statusword read

        `None` when the pattern matches no profile state, which happens transiently while the drive
        traverses a transition on its own.
    */
    pub async fn state(&self) -> CanopenResult<Option<PowerState>, B::Error> {
        Ok(PowerState::from_statusword(self.statusword().await?))
    }

    /**
        send a state change command to the drive, and return once the drive reports the target state

        Fails with [CanopenError::Timeout] naming the target when the confirmation never comes, and
        with [CanopenError::Master] when the target is one of the observation-only states. A FAULT
        is acknowledged first when the drive sits in it.
    */
    pub async fn switch(&self, target: PowerState) -> CanopenResult<(), B::Error> {
        let command = target.command()
            .ok_or(CanopenError::Master("state is not a reachable transition target"))?;

        // a faulted drive ignores transition commands until the fault is acknowledged
        if matches!(self.state().await?, Some(PowerState::Fault | PowerState::FaultReactionActive)) {
            self.set_controlword(ControlWord::command_fault_reset()).await?;
        }
        self.set_controlword(command).await?;

        let confirmed = target.confirmed();
        let deadline = Instant::now() + self.timing().timeout;
        loop {
            if self.state().await? == Some(confirmed) {
                log::info!("node {}: 402 state = {}", self.id, confirmed);
                return Ok(())
            }
            if Instant::now() >= deadline
                {return Err(CanopenError::Timeout {node: self.id, waited: Waited::State(target)})}
            sleep(self.timing().poll_interval).await;
        }
    }

    /**
        select the operation mode and return once the drive accepted it

        The confirmation polls the mode-select register back rather than the mode display: the
        drives echo the accepted mode there first, and some never refresh the display outside of
        OPERATION ENABLED.
    */
    pub async fn set_mode(&self, mode: OperationMode) -> CanopenResult<(), B::Error> {
        self.write(registers::mode_select, mode.code()).await?;

        let deadline = Instant::now() + self.timing().timeout;
        loop {
            if self.read(registers::mode_select).await? == mode.code() {
                log::info!("node {}: control mode confirmed: {:?}", self.id, mode);
                return Ok(())
            }
            if Instant::now() >= deadline
                {return Err(CanopenError::Timeout {node: self.id, waited: Waited::Mode(mode)})}
            sleep(self.timing().poll_interval).await;
        }
    }

    /// mode currently active on the drive, as reported by the mode display register
    pub async fn mode_display(&self) -> CanopenResult<i8, B::Error> {
        self.read(registers::mode_display).await
    }

    /// wait until the masked statusword bits are all `set` or all cleared, within `timeout`
    pub async fn wait_status_flags(&self, mask: u16, set: bool, timeout: Duration) -> CanopenResult<(), B::Error> {
        let read = || async move {
            self.statusword().await.map(u16::from)
        };
        match watch::wait_for_flags(read, mask, set, self.timing().status_poll_interval, timeout).await {
            Ok(()) => Ok(()),
            Err(watch::WatchError::Source(error)) => Err(error),
            Err(watch::WatchError::Expired {mask, set}) =>
                Err(CanopenError::Timeout {node: self.id, waited: Waited::StatusFlags {mask, set}}),
        }
    }

    /**
        boot the node into its operational state

        Resets the node, waits for its boot-up message, checks every register of
        [registers::REQUIRED] against the device's advertised dictionary (failing fast on the first
        absent one rather than at its first use deep inside a sequence), then switches the node NMT
        state to OPERATIONAL.
    */
    pub async fn setup(&self) -> CanopenResult<(), B::Error> {
        let bus = self.network.bus();
        bus.nmt_node(self.id, NmtCommand::Reset).await.map_err(CanopenError::Bus)?;
        bus.wait_bootup(self.id, self.timing().bootup_timeout).await.map_err(CanopenError::Bus)?;
        log::info!("node {}: booted", self.id);

        self.resolve().await?;

        bus.nmt_node(self.id, NmtCommand::Operational).await.map_err(CanopenError::Bus)?;
        log::info!("node {}: switched to OPERATIONAL state", self.id);
        Ok(())
    }

    /// reset the node and wait for it to boot again, needed for stored parameters to apply
    pub async fn reset(&self) -> CanopenResult<(), B::Error> {
        log::info!("node {}: resetting the device to apply changes", self.id);
        let bus = self.network.bus();
        bus.nmt_node(self.id, NmtCommand::Reset).await.map_err(CanopenError::Bus)?;
        bus.wait_bootup(self.id, self.timing().bootup_timeout).await.map_err(CanopenError::Bus)
    }

    /// check the required register table against the device's dictionary
    pub async fn resolve(&self) -> CanopenResult<(), B::Error> {
        let bus = self.network.bus();
        for &(index, sub) in registers::REQUIRED {
            if ! bus.dictionary_contains(self.id, index, sub).await.map_err(CanopenError::Bus)?
                {return Err(CanopenError::MissingRegister {node: self.id, index, sub})}
        }
        log::debug!("node {}: register table resolved", self.id);
        Ok(())
    }

    /// identity tuple of the device, from object 0x1018
    pub async fn identity(&self) -> CanopenResult<Identity, B::Error> {
        Ok(Identity {
            vendor_id: self.read(registers::identity::vendor).await?,
            product_code: self.read(registers::identity::product).await?,
            revision: self.read(registers::identity::revision).await?,
            serial_number: self.read(registers::identity::serial).await?,
        })
    }

    /// actual position of the stage, in increments
    pub async fn position(&self) -> CanopenResult<i32, B::Error> {
        self.read(registers::position_actual).await
    }

    /// persist the whole parameter set to the device's non-volatile memory
    pub async fn store_parameters(&self) -> CanopenResult<(), B::Error> {
        log::info!("node {}: saving configuration to flash", self.id);
        self.write(registers::store_parameters, registers::SAVE_MAGIC).await
            .map_err(|_| CanopenError::Store {node: self.id})
    }

    /// factory-reset the parameter set, effective after the next [Self::reset]
    pub async fn restore_defaults(&self) -> CanopenResult<(), B::Error> {
        log::info!("node {}: restoring factory parameters", self.id);
        self.write(registers::restore_defaults, registers::LOAD_MAGIC).await
    }
}

impl<B: Bus> Drop for Node<'_, B> {
    fn drop(&mut self) {
        self.network.release_node(self.id);
    }
}
