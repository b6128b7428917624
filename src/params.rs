//! Well-known parameter and attribute names.
//!
//! Scripts opt into engine-provided values by declaring parameters with
//! these names; the simulation pushes fresh values in every tick through
//! precomputed bindings. A script that does not declare a name simply never
//! sees it.

/// Frame delta time, seconds.
pub const ENGINE_DELTA_TIME: &str = "engine.delta_time";
/// Reciprocal of the frame delta time.
pub const ENGINE_INV_DELTA_TIME: &str = "engine.inv_delta_time";
/// Number of instances the current dispatch covers.
pub const ENGINE_EXEC_COUNT: &str = "engine.exec_count";

/// Seconds since the emitter was last reset.
pub const EMITTER_AGE: &str = "emitter.age";
/// Whether the emitter simulates in local space.
pub const EMITTER_LOCAL_SPACE: &str = "emitter.local_space";
/// Sub-frame interval between consecutive spawns of the current batch.
pub const EMITTER_SPAWN_INTERVAL: &str = "emitter.spawn_interval";
/// Sub-frame time of the first spawn of the current batch.
pub const EMITTER_INTERP_SPAWN_START_DT: &str = "emitter.interp_spawn_start_dt";

/// System-level execution state column in the system data set.
pub const SYSTEM_EXECUTION_STATE: &str = "system.execution_state";

/// Particle position attribute used for dynamic bounds.
pub const ATTR_POSITION: &str = "position";
/// Sprite size attribute (vec2) used to pad dynamic bounds.
pub const ATTR_SPRITE_SIZE: &str = "sprite_size";
/// Mesh scale attribute (vec3) used to pad dynamic bounds.
pub const ATTR_SCALE: &str = "scale";
/// Per-event particle index consumed by single-particle event handlers.
pub const ATTR_PARTICLE_INDEX: &str = "particle_index";

/// The execution-state column name for an emitter in the system data set.
pub fn emitter_execution_state(emitter_name: &str) -> String {
    format!("{emitter_name}.execution_state")
}
