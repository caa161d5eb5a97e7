//! Observers: positioned entities the streamer follows, with per-tick kinematics.

use bevy_math::{DVec2, DVec3};
use vx_schemas::coordinates::AbsBlockPos;
use vx_schemas::physics::Aabb;

use crate::config::GameConfigHandle;
use crate::prelude::*;
use crate::scheduler::RegularReadTask;
use crate::service::ChunkService;

/// Downward acceleration applied per tick while not flying, in blocks/tick².
const GRAVITY_PER_TICK: f64 = 0.1;
/// Per-tick velocity damping factor.
const VELOCITY_DAMPING: f64 = 0.8;
/// Rotation damping factor used when rotation inertia is enabled.
const ROTATION_INERTIA_DAMPING: f64 = 0.6;
/// Number of ticks a jump keeps accelerating upwards.
const JUMP_IMPULSE_TICKS: u32 = 4;
/// Upward acceleration applied during each jump impulse tick.
const JUMP_ACCELERATION: f64 = 0.15;

/// The mutable kinematic state of an observer.
#[derive(Clone, Debug)]
pub struct ObserverState {
    /// Feet-center position in world block units.
    pub position: DVec3,
    /// Pitch (x) and yaw (y) in degrees, roll (z) unused.
    pub rotation: DVec3,
    /// Velocity in blocks per tick.
    pub velocity: DVec3,
    /// Rotation velocity in degrees per tick.
    pub rotation_velocity: DVec3,
    /// Whether the observer stands on solid ground.
    pub on_ground: bool,
    /// Whether gravity is disabled.
    pub flying: bool,
    pending_look: DVec2,
    jump_ticks: u32,
}

/// A positioned entity owned outside the core; the streamer and kinematics tasks hold
/// shared references to it. All access goes through the internal lock, so position
/// reads are safe from any phase.
pub struct Observer {
    state: Mutex<ObserverState>,
    half_width: f64,
    height: f64,
}

impl Observer {
    /// Constructs a standing observer with the default player-sized hitbox.
    pub fn new(position: DVec3) -> Self {
        Self::with_size(position, 0.3, 1.8)
    }

    /// Constructs an observer with the given hitbox half-width and height.
    pub fn with_size(position: DVec3, half_width: f64, height: f64) -> Self {
        Self {
            state: Mutex::new(ObserverState {
                position,
                rotation: DVec3::ZERO,
                velocity: DVec3::ZERO,
                rotation_velocity: DVec3::ZERO,
                on_ground: false,
                flying: false,
                pending_look: DVec2::ZERO,
                jump_ticks: 0,
            }),
            half_width,
            height,
        }
    }

    /// Snapshot of the full kinematic state.
    pub fn state(&self) -> ObserverState {
        self.state.lock().unwrap().clone()
    }

    /// Current position in world block units.
    pub fn position(&self) -> DVec3 {
        self.state.lock().unwrap().position
    }

    /// Current position rounded down to the containing block.
    pub fn block_position(&self) -> AbsBlockPos {
        let p = self.position().floor().as_ivec3();
        AbsBlockPos::from_ivec3(p)
    }

    /// Teleports the observer.
    pub fn set_position(&self, position: DVec3) {
        self.state.lock().unwrap().position = position;
    }

    /// Adds to the velocity; the input layer's movement keys end up here.
    pub fn accelerate(&self, delta: DVec3) {
        self.state.lock().unwrap().velocity += delta;
    }

    /// Queues raw look input (yaw, pitch deltas); sensitivity is applied by the
    /// kinematics task from the live configuration.
    pub fn push_look(&self, delta: DVec2) {
        self.state.lock().unwrap().pending_look += delta;
    }

    /// Starts a jump impulse if the observer is grounded and not flying.
    pub fn jump(&self) {
        let mut state = self.state.lock().unwrap();
        if state.on_ground && !state.flying {
            state.jump_ticks = JUMP_IMPULSE_TICKS;
        }
    }

    /// Toggles flight; flying observers ignore gravity.
    pub fn set_flying(&self, flying: bool) {
        self.state.lock().unwrap().flying = flying;
    }

    /// The observer's current absolute hitbox.
    pub fn hitbox(&self) -> Aabb {
        self.hitbox_at(self.position())
    }

    fn hitbox_at(&self, position: DVec3) -> Aabb {
        Aabb::new(
            position - DVec3::new(self.half_width, 0.0, self.half_width),
            position + DVec3::new(self.half_width, self.height, self.half_width),
        )
    }
}

/// The per-tick kinematics regular task: consumes queued input, applies gravity, jump
/// impulses and damping, and clips the motion against the world's hitboxes axis by
/// axis. Position updates stay inside the observer (observers are external to the
/// world); the streamer simply sees the new position on its next pass.
pub struct ObserverUpdateTask {
    world_id: u32,
    observer: Arc<Observer>,
    config: GameConfigHandle,
}

impl ObserverUpdateTask {
    /// Constructs the kinematics task for one world/observer pair.
    pub fn new(world_id: u32, observer: Arc<Observer>, config: GameConfigHandle) -> Self {
        Self {
            world_id,
            observer,
            config,
        }
    }
}

impl RegularReadTask for ObserverUpdateTask {
    fn run(&self, service: &ChunkService) {
        let worlds = service.worlds();
        let Some(world) = worlds.get(self.world_id) else { return };
        let config = self.config.peek();

        let observer = &*self.observer;
        let mut state = observer.state.lock().unwrap();

        // Rotation: apply sensitivity-scaled look input, clamp pitch, decay or stop.
        let look = std::mem::take(&mut state.pending_look) * config.gui.mouse_sensitivity;
        state.rotation_velocity += DVec3::new(look.y, look.x, 0.0);
        if state.rotation.x + state.rotation_velocity.x > 90.0 {
            state.rotation_velocity.x = 90.0 - state.rotation.x;
        }
        if state.rotation.x + state.rotation_velocity.x < -90.0 {
            state.rotation_velocity.x = -90.0 - state.rotation.x;
        }
        let rotation_velocity = state.rotation_velocity;
        state.rotation += rotation_velocity;
        if config.gui.rotation_inertia {
            state.rotation_velocity *= ROTATION_INERTIA_DAMPING;
        } else {
            state.rotation_velocity = DVec3::ZERO;
        }

        // Vertical impulses.
        if state.jump_ticks > 0 {
            state.jump_ticks -= 1;
            state.velocity.y += JUMP_ACCELERATION;
        }
        if !state.flying {
            state.velocity.y -= GRAVITY_PER_TICK;
        }

        // Collision: clip the motion axis by axis against nearby hitboxes.
        let mut motion = state.velocity;
        let mut hitbox = observer.hitbox_at(state.position);
        let obstacles = world.hitboxes_in(&hitbox.expand(motion));
        let intended = motion;

        for obstacle in &obstacles {
            motion.x = hitbox.clip_move_x(obstacle, motion.x);
        }
        hitbox.translate(DVec3::new(motion.x, 0.0, 0.0));
        for obstacle in &obstacles {
            motion.z = hitbox.clip_move_z(obstacle, motion.z);
        }
        hitbox.translate(DVec3::new(0.0, 0.0, motion.z));
        for obstacle in &obstacles {
            motion.y = hitbox.clip_move_y(obstacle, motion.y);
        }
        hitbox.translate(DVec3::new(0.0, motion.y, 0.0));

        if motion.x != intended.x {
            state.velocity.x = 0.0;
        }
        if motion.z != intended.z {
            state.velocity.z = 0.0;
        }
        state.on_ground = motion.y != intended.y && intended.y < 0.0;
        if motion.y != intended.y {
            state.velocity.y = 0.0;
        }

        state.position += motion;
        state.velocity *= VELOCITY_DAMPING;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vx_schemas::coordinates::AbsChunkPos;
    use vx_schemas::voxel::{BlockData, Chunk};

    use super::*;
    use crate::config::GameConfig;

    /// A service with a solid floor plane at y = 0 in chunk (0, 0, 0).
    fn floored_service() -> Arc<ChunkService> {
        let service = ChunkService::new(true, 1, Duration::from_millis(33));
        let mut worlds = service.worlds_mut();
        let world = worlds.create_world("kinematics");
        let id = world.id();
        world.insert_chunk_and_update(Chunk::new_built(AbsChunkPos::ZERO, id, 0));
        for x in 0..32 {
            for z in 0..32 {
                world
                    .set_block(AbsBlockPos::new(x, 0, z), BlockData::new(1, 0, 0))
                    .unwrap();
            }
        }
        drop(worlds);
        service
    }

    fn run_ticks(task: &ObserverUpdateTask, service: &ChunkService, ticks: usize) {
        for _ in 0..ticks {
            task.run(service);
        }
    }

    #[test]
    fn gravity_lands_observer_on_floor() {
        let service = floored_service();
        let observer = Arc::new(Observer::new(DVec3::new(16.0, 5.0, 16.0)));
        let task = ObserverUpdateTask::new(0, Arc::clone(&observer), GameConfig::default().new_handle());

        run_ticks(&task, &service, 60);
        let state = observer.state();
        // Feet rest on top of the floor layer (blocks occupy y in [0, 1)).
        assert!((state.position.y - 1.0).abs() < 1e-9, "y = {}", state.position.y);
        assert!(state.on_ground);
        assert_eq!(state.velocity.y, 0.0);
    }

    #[test]
    fn flying_ignores_gravity() {
        let service = floored_service();
        let observer = Arc::new(Observer::new(DVec3::new(16.0, 5.0, 16.0)));
        observer.set_flying(true);
        let task = ObserverUpdateTask::new(0, Arc::clone(&observer), GameConfig::default().new_handle());

        run_ticks(&task, &service, 20);
        assert_eq!(observer.position().y, 5.0);
    }

    #[test]
    fn jump_lifts_then_returns_to_ground() {
        let service = floored_service();
        let observer = Arc::new(Observer::new(DVec3::new(16.0, 1.5, 16.0)));
        let task = ObserverUpdateTask::new(0, Arc::clone(&observer), GameConfig::default().new_handle());

        run_ticks(&task, &service, 30);
        assert!(observer.state().on_ground);

        observer.jump();
        run_ticks(&task, &service, 3);
        let airborne = observer.position().y;
        assert!(airborne > 1.0, "jump did not lift off, y = {airborne}");

        run_ticks(&task, &service, 60);
        let state = observer.state();
        assert!(state.on_ground);
        assert!((state.position.y - 1.0).abs() < 1e-9);
    }

    #[test]
    fn horizontal_motion_damps_out() {
        let service = floored_service();
        let observer = Arc::new(Observer::new(DVec3::new(10.0, 1.0, 10.0)));
        let task = ObserverUpdateTask::new(0, Arc::clone(&observer), GameConfig::default().new_handle());
        run_ticks(&task, &service, 10);

        observer.accelerate(DVec3::new(0.5, 0.0, 0.0));
        run_ticks(&task, &service, 50);
        let state = observer.state();
        assert!(state.position.x > 10.0);
        assert!(state.velocity.x.abs() < 1e-4);
    }

    #[test]
    fn pitch_clamps_at_ninety_degrees() {
        let service = floored_service();
        let observer = Arc::new(Observer::new(DVec3::new(16.0, 1.0, 16.0)));
        let task = ObserverUpdateTask::new(0, Arc::clone(&observer), GameConfig::default().new_handle());

        observer.push_look(DVec2::new(0.0, 500.0));
        run_ticks(&task, &service, 5);
        assert_eq!(observer.state().rotation.x, 90.0);

        observer.push_look(DVec2::new(0.0, -2000.0));
        run_ticks(&task, &service, 5);
        assert_eq!(observer.state().rotation.x, -90.0);
    }
}
