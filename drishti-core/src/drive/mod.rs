//! Drive controller adapter.
//!
//! Feeds planned legs to the simulator's path-following agent and ticks the
//! world until the last waypoint is reached or the tick budget runs out. The
//! native recorder runs for the whole drive and is always stopped, including
//! when driving fails.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{ActorId, Transform};
use crate::error::{DrishtiError, Result, WorkUnit};
use crate::route::{Route, RouteLeg};
use crate::sim::{SimError, Simulator};

/// Drive settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Maximum simulation ticks for the whole route (default: 200000)
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,

    /// Height added to spawn and respawn poses, meters (default: 0.5)
    #[serde(default = "default_spawn_z_offset")]
    pub spawn_z_offset: f64,

    /// Log progress every this many ticks, 0 disables (default: 1000)
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

fn default_max_ticks() -> u64 {
    200_000
}
fn default_spawn_z_offset() -> f64 {
    0.5
}
fn default_progress_interval() -> u64 {
    1_000
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            max_ticks: default_max_ticks(),
            spawn_z_offset: default_spawn_z_offset(),
            progress_interval: default_progress_interval(),
        }
    }
}

/// Outcome of one drive.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DriveSummary {
    pub ticks: u64,
    pub legs_completed: usize,
    pub respawns: usize,
    /// Index of the last waypoint reached in the flattened route.
    pub last_waypoint: Option<u64>,
    /// Every leg reached its final waypoint within the budget.
    pub completed: bool,
}

/// Spawn pose for a waypoint transform, lifted to avoid ground collisions.
pub fn lifted(transform: &Transform, z_offset: f64) -> Transform {
    Transform::new(transform.location.offset(0.0, 0.0, z_offset), transform.rotation)
}

/// Drives one vehicle along a route.
pub struct DriveController<'a> {
    sim: &'a mut dyn Simulator,
    config: DriveConfig,
    summary: DriveSummary,
}

impl<'a> DriveController<'a> {
    pub fn new(sim: &'a mut dyn Simulator, config: DriveConfig) -> Self {
        Self {
            sim,
            config,
            summary: DriveSummary::default(),
        }
    }

    /// Record the drive of `vehicle` along `route` into `log_path`.
    pub fn drive(mut self, vehicle: ActorId, route: &Route, log_path: &Path) -> Result<DriveSummary> {
        self.sim
            .start_recorder(log_path)
            .map_err(|e| DrishtiError::from_sim(e, WorkUnit::Waypoint, None))?;
        tracing::info!(path = %log_path.display(), legs = route.legs.len(), "Recorder started");

        let driven = self.drive_legs(vehicle, route);

        let stopped = self.sim.stop_recorder();
        match (driven, stopped) {
            (Ok(()), Ok(())) => {
                tracing::info!(
                    ticks = self.summary.ticks,
                    legs = self.summary.legs_completed,
                    completed = self.summary.completed,
                    "Drive finished"
                );
                Ok(self.summary)
            }
            (Ok(()), Err(e)) => Err(DrishtiError::from_sim(
                e,
                WorkUnit::Waypoint,
                self.summary.last_waypoint,
            )),
            (Err(e), stopped) => {
                if let Err(stop_err) = stopped {
                    tracing::warn!("Failed to stop recorder after drive error: {}", stop_err);
                }
                Err(e)
            }
        }
    }

    fn drive_legs(&mut self, vehicle: ActorId, route: &Route) -> Result<()> {
        let mut offset = 0u64;
        for (index, leg) in route.legs.iter().enumerate() {
            if !self.drive_leg(vehicle, index, leg, offset)? {
                tracing::warn!(
                    leg = index,
                    max_ticks = self.config.max_ticks,
                    "Tick budget exhausted, stopping drive"
                );
                return Ok(());
            }
            self.summary.legs_completed += 1;
            offset += leg.waypoints.len() as u64;
        }
        self.summary.completed = true;
        Ok(())
    }

    fn lost(&self, err: SimError) -> DrishtiError {
        DrishtiError::from_sim(err, WorkUnit::Waypoint, self.summary.last_waypoint)
    }

    /// Returns `false` when the tick budget ran out before the leg ended.
    fn drive_leg(&mut self, vehicle: ActorId, index: usize, leg: &RouteLeg, offset: u64) -> Result<bool> {
        let Some(first) = leg.waypoints.first() else {
            return Ok(true);
        };

        if leg.respawn {
            let pose = lifted(&first.waypoint.transform, self.config.spawn_z_offset);
            self.sim.set_transform(vehicle, &pose).map_err(|e| self.lost(e))?;
            self.summary.respawns += 1;
            tracing::info!(leg = index, x = pose.location.x, y = pose.location.y, "Respawned vehicle");
        }
        self.sim
            .set_autopilot_plan(vehicle, &leg.waypoints)
            .map_err(|e| self.lost(e))?;
        tracing::debug!(leg = index, waypoints = leg.waypoints.len(), "Leg started");

        loop {
            let step = self.sim.autopilot_step(vehicle).map_err(|e| self.lost(e))?;
            if let Some(reached) = step.waypoint_index {
                self.summary.last_waypoint = Some(offset + reached as u64);
            }
            if step.done {
                self.summary.last_waypoint = Some(offset + leg.waypoints.len() as u64 - 1);
                return Ok(true);
            }
            if self.summary.ticks >= self.config.max_ticks {
                return Ok(false);
            }

            self.sim
                .apply_control(vehicle, &step.control)
                .map_err(|e| self.lost(e))?;
            self.sim.tick().map_err(|e| self.lost(e))?;
            self.summary.ticks += 1;

            let interval = self.config.progress_interval;
            if interval > 0 && self.summary.ticks % interval == 0 {
                tracing::debug!(
                    ticks = self.summary.ticks,
                    waypoint = self.summary.last_waypoint,
                    "Driving"
                );
            }
        }
    }
}
