/*!
    LSS (Layer Setting Services, CiA 305) node discovery and id assignment

    SDO addressing needs a unique node id, which is exactly what a factory-fresh or miswired bus
    does not have. LSS services address devices by their identity tuple instead, and fast-scan
    isolates one still-unidentified device by bisecting the identity ranges - it works even with
    several devices sharing one id, or none. This module drives those services to bootstrap a bus:
    wipe all assignments, enumerate and assign sequential ids, or re-address one known device.

    Every operation here swings the *whole network* through the LSS configuration mode, so they
    serialize on the session's exclusive window and must not run concurrently with node traffic.
*/

use tokio::time::sleep;
use crate::{
    bus::{Bus, ConfiguredDevice, Identity, LssState, NmtCommand, UNCONFIGURED_NODE_ID},
    error::{CanopenError, CanopenResult},
    network::Network,
    };


/**
    This struct exposes the network-wide LSS services of a session.

    Obtained from [Network::lss]. All operations run under the session's exclusive LSS window.
*/
pub struct Lss<'a, B: Bus> {
    network: &'a Network<B>,
}

impl<'a, B: Bus> Lss<'a, B> {
    pub(crate) fn new(network: &'a Network<B>) -> Self {
        Self {network}
    }

    fn bus(&self) -> &B  {self.network.bus()}

    /**
        check for a configured node answering on the network

        Returns the reported node id, or `None` when no device answers the inquiry (which is also
        what a bus of only-unconfigured devices looks like). The network is always returned to the
        LSS waiting state.
    */
    pub async fn check_configured(&self) -> CanopenResult<Option<u8>, B::Error> {
        let _window = self.network.lss_window.lock().await;
        let bus = self.bus();

        bus.lss_switch_global(LssState::Configuration).await.map_err(CanopenError::Bus)?;

        let found = bus.lss_inquire_node_id().await.ok();
        match found {
            Some(id) => log::info!("found configured node {}", id),
            None => log::info!("no configured nodes found on the network"),
        }

        bus.lss_switch_global(LssState::Waiting).await.map_err(CanopenError::Bus)?;
        Ok(found)
    }

    /**
        wipe the node id of every device on the bus, back to the unconfigured sentinel

        The assignments are persisted when the devices accept it (a refused store is only a
        warning: the wipe still holds for the session). Whatever happens mid-way - several devices
        sharing one id typically make the configure service itself fail - the network is switched
        back to the LSS waiting state and a network-wide RESET COMMUNICATION is issued before this
        function returns, so a failed wipe never leaves the bus stuck in configuration mode.
    */
    pub async fn unconfigure_all(&self) -> CanopenResult<(), B::Error> {
        let _window = self.network.lss_window.lock().await;
        let bus = self.bus();
        log::info!("unconfiguring all nodes");

        bus.lss_switch_global(LssState::Configuration).await.map_err(CanopenError::Bus)?;

        let outcome = self.unconfigure_inner().await;

        // cleanup runs on every path from here
        let restored = bus.lss_switch_global(LssState::Waiting).await.map_err(CanopenError::Bus);
        log::info!("sending nmt command: RESET COMMUNICATION");
        let reset = bus.nmt_broadcast(NmtCommand::ResetCommunication).await.map_err(CanopenError::Bus);
        sleep(self.network.timing().lss_reset_delay).await;

        outcome?;
        restored?;
        reset
    }

    async fn unconfigure_inner(&self) -> CanopenResult<(), B::Error> {
        let bus = self.bus();
        bus.lss_configure_node_id(UNCONFIGURED_NODE_ID).await
            .map_err(|error| {
                log::warn!("error during unconfiguration (expected when multiple devices share an id): {:?}", error);
                CanopenError::Bus(error)
            })?;
        log::debug!("set all node ids to {:#04x}", UNCONFIGURED_NODE_ID);

        if let Err(error) = bus.lss_store_configuration().await {
            log::warn!("could not store configuration: {:?}", error);
        } else {
            log::debug!("configuration stored");
        }
        Ok(())
    }

    /**
        enumerate every unconfigured device with fast-scan and assign sequential node ids

        Ids are assigned starting at `first_node_id`, each assignment is persisted, and one
        [ConfiguredDevice] record is emitted per device in discovery order. The loop terminates
        when fast-scan isolates no further device.
    */
    pub async fn scan_and_configure(&self, first_node_id: u8) -> CanopenResult<Vec<ConfiguredDevice>, B::Error> {
        if ! (1 ..= 127).contains(&first_node_id)
            {return Err(CanopenError::Master("node id out of the 1-127 range"))}

        let _window = self.network.lss_window.lock().await;
        let bus = self.bus();
        log::info!("starting LSS fast scan for unconfigured nodes");

        let mut configured = Vec::new();
        let mut next_id = first_node_id;
        loop {
            bus.lss_switch_global(LssState::Waiting).await.map_err(CanopenError::Bus)?;
            sleep(self.network.timing().lss_scan_delay).await;

            let Some(identity) = bus.lss_fast_scan().await.map_err(CanopenError::Bus)? else {
                log::info!("no more unconfigured nodes found");
                break
            };
            log::info!("found device: {}", identity);

            if next_id > 127
                {return Err(CanopenError::Master("node id space exhausted"))}

            log::info!("assigning node id {}", next_id);
            bus.lss_configure_node_id(next_id).await.map_err(CanopenError::Bus)?;
            bus.lss_store_configuration().await.map_err(|error| {
                log::error!("could not store the assignment of node id {}: {:?}", next_id, error);
                CanopenError::Store {node: next_id}
            })?;

            configured.push(ConfiguredDevice {identity, node_id: next_id});
            next_id += 1;
        }
        Ok(configured)
    }

    /**
        re-address one known device, with an identity safety gate

        The device's identity is read over SDO from `node_id` first, then used for LSS selective
        addressing, so exactly that physical unit is targeted. Before anything is changed, the
        selected device is asked for its active node id: when it differs from `node_id` the
        operation aborts with [CanopenError::SafetyAbort] and **no** configuration call is made -
        with colliding ids on the bus, the selected unit may not be the one the caller believes.

        On the happy path the new id is configured and persisted, the network returned to the LSS
        waiting state and a network-wide NMT RESET issued so the device comes back under its new
        id. Each failing sub-step keeps its own error: transport ([CanopenError::Bus]), safety gate
        ([CanopenError::SafetyAbort]) and persistence ([CanopenError::Store]) are distinguishable.
    */
    pub async fn configure_single(&self, node_id: u8, new_node_id: u8) -> CanopenResult<(), B::Error> {
        if ! (1 ..= 127).contains(&new_node_id)
            {return Err(CanopenError::Master("node id out of the 1-127 range"))}

        log::info!("node {}: reading identity (0x1018) via SDO", node_id);
        let identity = self.read_identity(node_id).await?;
        log::info!("node {}: identity: {}", node_id, identity);

        let _window = self.network.lss_window.lock().await;
        let bus = self.bus();

        log::info!("switching all nodes to LSS waiting state");
        bus.lss_switch_global(LssState::Waiting).await.map_err(CanopenError::Bus)?;

        let outcome = self.configure_selected(identity, node_id, new_node_id).await;

        // leave the network-wide state clean on every path
        if let Err(error) = bus.lss_switch_global(LssState::Waiting).await {
            log::warn!("could not switch nodes back to waiting state: {:?}", error);
        }
        outcome?;

        log::info!("NMT RESET to apply the new node id");
        if let Err(error) = bus.nmt_broadcast(NmtCommand::Reset).await {
            log::warn!("NMT reset failed (device may still apply the change): {:?}", error);
        }
        sleep(self.network.timing().lss_reset_delay).await;

        log::info!("done, the device should now answer on node id {}", new_node_id);
        Ok(())
    }

    async fn configure_selected(&self, identity: Identity, node_id: u8, new_node_id: u8) -> CanopenResult<(), B::Error> {
        let bus = self.bus();

        log::info!("selecting target via LSS selective using the SDO-read identity");
        bus.lss_switch_selective(identity).await.map_err(CanopenError::Bus)?;

        let reported = bus.lss_inquire_node_id().await.map_err(CanopenError::Bus)?;
        log::info!("device reports current node id {}", reported);

        if reported != node_id {
            log::error!("safety stop: expected current node id {}, but device reports {}, no changes applied",
                node_id, reported);
            return Err(CanopenError::SafetyAbort {expected: node_id, reported})
        }

        log::info!("configuring node id: {} -> {}", node_id, new_node_id);
        bus.lss_configure_node_id(new_node_id).await.map_err(CanopenError::Bus)?;
        bus.lss_store_configuration().await.map_err(|error| {
            log::error!("failed to store the new node id: {:?}", error);
            CanopenError::Store {node: new_node_id}
        })?;
        log::info!("stored configuration successfully");
        Ok(())
    }

    /// identity tuple of a reachable node, over plain SDO
    async fn read_identity(&self, node_id: u8) -> CanopenResult<Identity, B::Error> {
        let bus = self.bus();
        let read = |sub| async move {
            bus.sdo_read(node_id, 0x1018, sub).await.map_err(CanopenError::Bus)
        };
        Ok(Identity {
            vendor_id: read(1).await?,
            product_code: read(2).await?,
            revision: read(3).await?,
            serial_number: read(4).await?,
        })
    }
}
