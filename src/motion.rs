/*!
    set-point handshake of the CiA 402 profile position mode

    A set-point is handed over with a four-way handshake: raise controlword bit 4, wait for the
    acknowledge on statusword bit 12, drop bit 4, wait for the acknowledge to drop. The last wait
    is not optional - the drive only re-arms its acknowledge once it latched the cleared bit, and
    skipping it races the next set-point's edge. Bit 10 (target reached) is awaited only after the
    last point of a sequence, which is what allows queuing a trajectory without decelerating
    between points (controlword bit 9, change set immediately).
*/

use crate::{
    bus::Bus,
    cia402::{status, ControlWord, OperationMode, PowerState},
    error::{CanopenError, CanopenResult},
    node::Node,
    registers,
    };


/// one motion command of the profile position mode
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SetPoint {
    /// absolute target, in increments
    pub position: i32,
    /// cruise velocity toward this target in increments/s, the drive's current setting when `None`
    pub velocity: Option<u32>,
}

impl SetPoint {
    pub const fn at(position: i32) -> Self {
        Self {position, velocity: None}
    }
    pub const fn with_velocity(mut self, velocity: u32) -> Self {
        self.velocity = Some(velocity);
        self
    }
}

/// tuning of the profile position mode, applied while entering it
#[derive(Debug, Default, Clone)]
pub struct ProfileSettings {
    /// position band accepted as "target reached", in increments, device setting when `None`
    pub position_window: Option<u32>,
    /// time the position must stay in the window before bit 10 raises, in ms
    pub position_window_time: Option<u16>,
}

impl<B: Bus> Node<'_, B> {
    /**
        ramp the drive up into profile position mode

        Walks the power state machine to SWITCHED ON, selects the mode, applies `settings`, then
        enables operation. The drive holds position from here on until a set-point arrives.
    */
    pub async fn enter_profile_position(&self, settings: &ProfileSettings) -> CanopenResult<(), B::Error> {
        self.switch(PowerState::SwitchOnDisabled).await?;
        self.switch(PowerState::ReadyToSwitchOn).await?;
        self.switch(PowerState::SwitchedOn).await?;

        self.set_mode(OperationMode::ProfilePosition).await?;

        if let Some(window) = settings.position_window {
            self.write(registers::position_window, window).await?;
        }
        if let Some(time) = settings.position_window_time {
            self.write(registers::position_window_time, time).await?;
        }

        self.switch(PowerState::OperationEnabled).await
    }

    /// turn the motion off, leaving the drive in READY TO SWITCH ON
    pub async fn leave_profile_position(&self) -> CanopenResult<(), B::Error> {
        self.switch(PowerState::SwitchedOn).await?;
        self.switch(PowerState::ReadyToSwitchOn).await
    }

    /**
        execute one motion command, returning once the target is reached

        The drive must be in profile position mode with operation enabled
        ([Self::enter_profile_position]).
    */
    pub async fn move_to(&self, point: SetPoint) -> CanopenResult<(), B::Error> {
        self.run_set_points(&[point], false).await
    }

    /**
        execute a sequence of motion commands as a set of set-points

        Each intermediate point is handed over with the full handshake but without waiting for the
        motion to settle (change set immediately); the target-reached confirmation is awaited on the
        last point only.
    */
    pub async fn move_through(&self, points: &[SetPoint]) -> CanopenResult<(), B::Error> {
        self.run_set_points(points, true).await
    }

    async fn run_set_points(&self, points: &[SetPoint], immediate: bool) -> CanopenResult<(), B::Error> {
        let Some(last) = points.last() else {return Ok(())};
        let base = ControlWord::command_enable_operation().with_change_set(immediate);

        self.set_controlword(base).await
            .map_err(|cause| self.motion_error(points[0].position, cause))?;

        for point in points {
            self.issue_set_point(base, point).await
                .map_err(|cause| self.motion_error(point.position, cause))?;
        }

        log::info!("node {}: waiting for target reached", self.id());
        self.wait_status_flags(status::TARGET_REACHED, true, self.timing().timeout).await
            .map_err(|cause| self.motion_error(last.position, cause))?;

        if let Ok(position) = self.position().await {
            log::info!("node {}: reached position {}", self.id(), position);
        }
        Ok(())
    }

    /// hand one set-point over: target, rising edge, acknowledge, falling edge, acknowledge drop
    async fn issue_set_point(&self, base: ControlWord, point: &SetPoint) -> CanopenResult<(), B::Error> {
        log::info!("node {}: sending target position {}", self.id(), point.position);
        self.write(registers::target_position, point.position).await?;
        if let Some(velocity) = point.velocity {
            self.write(registers::profile_velocity, velocity).await?;
        }

        self.set_controlword(base.with_new_set_point(true)).await?;

        let acknowledged = self.wait_status_flags(status::SET_POINT_ACKNOWLEDGE, true, self.timing().timeout).await;
        // the new-set-point bit drops whatever happened, it is edge sensitive
        let rearmed = self.set_controlword(base).await;
        acknowledged?;
        rearmed?;

        self.wait_status_flags(status::SET_POINT_ACKNOWLEDGE, false, self.timing().timeout).await
    }

    fn motion_error(&self, target: i32, cause: CanopenError<B::Error>) -> CanopenError<B::Error> {
        CanopenError::Motion {node: self.id(), target, cause: Box::new(cause)}
    }
}
