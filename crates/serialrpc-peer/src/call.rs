//! Call coordination: a fair admission gate and the single pending-call slot.
//!
//! There are no call ids on the wire, so a reply can only be matched to the
//! one call in flight. The gate admits callers one at a time in arrival
//! order; the slot carries the reply from the receive thread to the caller.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serialrpc_frame::{RemoteError, Value};

/// What the receive thread hands to a waiting caller.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    Value(Value),
    Remote(RemoteError),
    Closed(String),
}

/// FIFO ticket lock.
#[derive(Default)]
pub(crate) struct AdmissionGate {
    state: Mutex<GateState>,
    turn: Condvar,
}

#[derive(Default)]
struct GateState {
    next_ticket: u64,
    serving: u64,
    waiting: usize,
}

impl AdmissionGate {
    /// Block until every earlier caller has been served.
    pub(crate) fn acquire(&self) -> GateGuard<'_> {
        let mut state = lock(&self.state);
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiting += 1;
        while state.serving != ticket {
            state = self
                .turn
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        state.waiting -= 1;
        GateGuard { gate: self }
    }

    /// Callers queued behind the current holder.
    pub(crate) fn waiting(&self) -> usize {
        lock(&self.state).waiting
    }
}

/// Releases the gate to the next ticket on drop.
pub(crate) struct GateGuard<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        lock(&self.gate.state).serving += 1;
        self.gate.turn.notify_all();
    }
}

#[derive(Debug)]
enum SlotState {
    Idle,
    Waiting { action: String },
    Filled(Reply),
}

/// The one pending call of a connection.
pub(crate) struct PendingSlot {
    state: Mutex<SlotState>,
    filled: Condvar,
}

impl Default for PendingSlot {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState::Idle),
            filled: Condvar::new(),
        }
    }
}

impl PendingSlot {
    /// Expect a reply for `action`. Must happen before the call is written
    /// so a fast reply cannot be missed.
    pub(crate) fn arm(&self, action: &str) {
        *lock(&self.state) = SlotState::Waiting {
            action: action.to_string(),
        };
    }

    /// Forget the pending call (the write failed).
    pub(crate) fn disarm(&self) {
        *lock(&self.state) = SlotState::Idle;
    }

    /// Hand a reply to the waiting caller. Gives the reply back if no call
    /// is waiting.
    pub(crate) fn deliver(&self, reply: Reply) -> std::result::Result<(), Reply> {
        let mut state = lock(&self.state);
        if !matches!(*state, SlotState::Waiting { .. }) {
            return Err(reply);
        }
        *state = SlotState::Filled(reply);
        drop(state);
        self.filled.notify_all();
        Ok(())
    }

    /// Complete a waiting call with [`Reply::Closed`]. Returns the action
    /// that was waiting, if any.
    pub(crate) fn fail_pending(&self, reason: &str) -> Option<String> {
        let mut state = lock(&self.state);
        let action = match &*state {
            SlotState::Waiting { action } => action.clone(),
            _ => return None,
        };
        *state = SlotState::Filled(Reply::Closed(reason.to_string()));
        drop(state);
        self.filled.notify_all();
        Some(action)
    }

    /// Wait for the reply and reset the slot. `None` on timeout; a reply
    /// arriving after that finds the slot idle.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Option<Reply> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = lock(&self.state);
        loop {
            if matches!(*state, SlotState::Filled(_)) {
                return match std::mem::replace(&mut *state, SlotState::Idle) {
                    SlotState::Filled(reply) => Some(reply),
                    _ => None,
                };
            }
            state = match deadline {
                None => self
                    .filled
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        *state = SlotState::Idle;
                        return None;
                    }
                    self.filled
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
        }
    }

    #[cfg(test)]
    pub(crate) fn is_waiting(&self) -> bool {
        matches!(*lock(&self.state), SlotState::Waiting { .. })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn gate_admits_in_arrival_order() {
        let gate = Arc::new(AdmissionGate::default());
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = gate.acquire();
        let mut handles = Vec::new();
        for i in 0..5 {
            let turn_gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                let _turn = turn_gate.acquire();
                order.lock().unwrap().push(i);
            }));
            wait_until(|| gate.waiting() == i + 1);
        }

        drop(first);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(gate.waiting(), 0);
    }

    #[test]
    fn gate_is_released_on_panic() {
        let gate = Arc::new(AdmissionGate::default());
        let worker = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let _turn = gate.acquire();
                panic!("caller failed");
            })
        };
        assert!(worker.join().is_err());

        let _turn = gate.acquire();
    }

    #[test]
    fn reply_before_wait_is_not_lost() {
        let slot = PendingSlot::default();
        slot.arm("Add");
        slot.deliver(Reply::Value(Value::Int(5))).unwrap();
        assert_eq!(slot.wait(None), Some(Reply::Value(Value::Int(5))));
        assert!(!slot.is_waiting());
    }

    #[test]
    fn reply_without_pending_call_is_returned() {
        let slot = PendingSlot::default();
        let reply = Reply::Value(Value::Int(1));
        assert_eq!(slot.deliver(reply.clone()), Err(reply));
    }

    #[test]
    fn second_reply_is_unsolicited() {
        let slot = PendingSlot::default();
        slot.arm("Ping");
        slot.deliver(Reply::Value(Value::Void)).unwrap();
        assert!(slot.deliver(Reply::Value(Value::Void)).is_err());
    }

    #[test]
    fn wait_times_out_and_late_reply_is_rejected() {
        let slot = PendingSlot::default();
        slot.arm("Slow");
        assert_eq!(slot.wait(Some(Duration::from_millis(10))), None);
        assert!(slot.deliver(Reply::Value(Value::Int(1))).is_err());
    }

    #[test]
    fn fail_pending_wakes_waiter() {
        let slot = Arc::new(PendingSlot::default());
        slot.arm("Ping");

        let waiter = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.wait(None))
        };
        wait_until(|| slot.is_waiting());
        assert_eq!(slot.fail_pending("link closed"), Some("Ping".to_string()));

        assert_eq!(
            waiter.join().unwrap(),
            Some(Reply::Closed("link closed".into()))
        );
        assert_eq!(slot.fail_pending("again"), None);
    }
}
