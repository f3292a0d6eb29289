//! Activation gate.
//!
//! Frames are culled on one thread and drawn on another, so a node
//! registered into the scheduler may still be pending when the application
//! wants to mutate the client's data. The gate counts in-flight
//! registrations; deactivating blocks until every pending frame has drawn,
//! after which no new registration succeeds until the gate is reactivated.

use parking_lot::{Condvar, Mutex};

struct GateState {
    active: bool,
    in_flight: usize,
}

pub struct ActivationGate {
    state: Mutex<GateState>,
    drained: Condvar,
}

impl ActivationGate {
    pub fn new(active: bool) -> Self {
        Self {
            state: Mutex::new(GateState {
                active,
                in_flight: 0,
            }),
            drained: Condvar::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Allow registrations again.
    pub fn activate(&self) {
        self.state.lock().active = true;
    }

    /// Stop new registrations and block until all in-flight frames have
    /// drawn. After this returns the client's data can be mutated freely.
    pub fn deactivate(&self) {
        let mut state = self.state.lock();
        state.active = false;
        while state.in_flight > 0 {
            self.drained.wait(&mut state);
        }
    }

    /// Register one in-flight frame. Fails without side effect when the
    /// gate is inactive.
    pub fn try_enter(&self) -> bool {
        let mut state = self.state.lock();
        if !state.active {
            return false;
        }
        state.in_flight += 1;
        true
    }

    /// Retire one in-flight frame.
    pub fn leave(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.in_flight > 0, "gate leave without enter");
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            self.drained.notify_all();
        }
    }

    /// Frames currently registered but not yet drawn.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }
}

impl Default for ActivationGate {
    fn default() -> Self {
        Self::new(true)
    }
}
