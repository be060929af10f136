/*!
    homing sequence of the CiA 402 homing mode

    The whole sequence is driven from the master: power-state ramp up, mode and method selection,
    then the start trigger on controlword bit 4. The bit is edge sensitive - the drive starts on its
    0 -> 1 transition and must see 1 -> 0 before another cycle can be triggered - so the sequencer
    de-asserts it on every exit path, success or not.
*/

use tokio::time::sleep;
use crate::{
    bus::Bus,
    cia402::{status, ControlWord, HomingDirection, OperationMode, PowerState},
    error::{CanopenError, CanopenResult},
    node::Node,
    registers,
    };


impl<B: Bus> Node<'_, B> {
    /**
        run a full homing cycle and leave the drive idle in SWITCHED ON

        `offset` writes the home offset register first when given, otherwise the value stored on
        the drive is used. The search runs toward the index pulse in `direction`.

        Any failing step surfaces as [CanopenError::Homing] wrapping the step's error; the homing
        start bit is cleared before the error propagates.
    */
    pub async fn home(&self, direction: HomingDirection, offset: Option<i32>) -> CanopenResult<(), B::Error> {
        self.home_sequence(direction, offset).await
            .map_err(|cause| CanopenError::Homing {node: self.id(), cause: Box::new(cause)})
    }

    async fn home_sequence(&self, direction: HomingDirection, offset: Option<i32>) -> CanopenResult<(), B::Error> {
        log::info!("node {}: start homing", self.id());

        self.switch(PowerState::SwitchOnDisabled).await?;
        self.switch(PowerState::ReadyToSwitchOn).await?;
        self.switch(PowerState::SwitchedOn).await?;

        self.set_mode(OperationMode::Homing).await?;

        if let Some(offset) = offset {
            self.write(registers::home_offset, offset).await?;
        }
        let method = direction.method();
        self.write(registers::homing_method, method.code()).await?;

        self.switch(PowerState::OperationEnabled).await?;

        log::info!("node {}: starting homing with method {:?}", self.id(), method);
        let base = ControlWord::command_enable_operation();
        self.set_controlword(base.with_new_set_point(true)).await?;

        // do not trust the statusword right after the trigger edge
        sleep(self.timing().homing_settle).await;

        log::info!("node {}: waiting for homing attained", self.id());
        let attained = self.wait_status_flags(status::HOMING_ATTAINED, true, self.timing().timeout).await;

        // de-assert the start bit whatever happened, the next cycle needs the falling edge
        let rearmed = self.set_controlword(base).await;
        attained?;
        rearmed?;

        log::info!("node {}: homing completed", self.id());
        self.switch(PowerState::SwitchedOn).await
    }
}
