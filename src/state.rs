//! Execution states and spawn descriptors.

use std::fmt;

/// Lifecycle stage of an emitter or system instance.
///
/// Governs whether ticking, spawning and rendering happen. `Disabled` is
/// sticky once set by a policy check and only an explicit reset clears it;
/// `Complete` is terminal until a full reset or re-init.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    /// Ticking, spawning and rendering.
    Active,
    /// Ticking existing particles, no new spawns.
    #[default]
    Inactive,
    /// Like `Inactive`, but existing particle data is cleared first.
    InactiveClear,
    /// Winding down; no spawns, waiting for particles to die off.
    Dying,
    /// Finished. Buffers are cleared and ticking stops.
    Complete,
    /// Turned off by policy (detail level, structural error). Sticky.
    Disabled,
}

impl ExecutionState {
    /// Decode from an int column value; out-of-range decodes to `Disabled`,
    /// matching the "unknown means off" convention of the scatter pass.
    pub fn from_i32(v: i32) -> Self {
        match v {
            0 => ExecutionState::Active,
            1 => ExecutionState::Inactive,
            2 => ExecutionState::InactiveClear,
            3 => ExecutionState::Dying,
            4 => ExecutionState::Complete,
            _ => ExecutionState::Disabled,
        }
    }

    /// Encode for an int column.
    pub fn to_i32(self) -> i32 {
        match self {
            ExecutionState::Active => 0,
            ExecutionState::Inactive => 1,
            ExecutionState::InactiveClear => 2,
            ExecutionState::Dying => 3,
            ExecutionState::Complete => 4,
            ExecutionState::Disabled => 5,
        }
    }

    /// Complete or disabled: no further work until an explicit reset.
    pub fn is_complete(self) -> bool {
        matches!(self, ExecutionState::Complete | ExecutionState::Disabled)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionState::Active => "active",
            ExecutionState::Inactive => "inactive",
            ExecutionState::InactiveClear => "inactive_clear",
            ExecutionState::Dying => "dying",
            ExecutionState::Complete => "complete",
            ExecutionState::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Per-tick spawn descriptor produced by the system spawn script or by
/// event handling.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpawnInfo {
    /// New particles to create this tick.
    pub count: i32,
    /// Sub-frame interval between consecutive spawns.
    pub interval_dt: f32,
    /// Simulated sub-frame time of the first spawn.
    pub interp_start_dt: f32,
    /// Spawn group tag, forwarded to the spawn script untouched.
    pub spawn_group: i32,
}

impl SpawnInfo {
    /// A plain "spawn n at frame start" descriptor.
    pub fn with_count(count: i32) -> Self {
        Self { count, ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_state_round_trip() {
        for s in [
            ExecutionState::Active,
            ExecutionState::Inactive,
            ExecutionState::InactiveClear,
            ExecutionState::Dying,
            ExecutionState::Complete,
            ExecutionState::Disabled,
        ] {
            assert_eq!(ExecutionState::from_i32(s.to_i32()), s);
        }
        assert_eq!(ExecutionState::from_i32(42), ExecutionState::Disabled);
    }

    #[test]
    fn test_completion_predicate() {
        assert!(ExecutionState::Complete.is_complete());
        assert!(ExecutionState::Disabled.is_complete());
        assert!(!ExecutionState::Dying.is_complete());
    }
}
