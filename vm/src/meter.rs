//! Per-invocation resource accounting: disk, network and compute quotas,
//! each optionally backed by an rc-session that converts consumed units to
//! rc at a configured per-unit price and charges the session's remaining rc.

use chain_shared::chain_error;
use chain_shared::error::Result;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Per-unit rc prices and absolute quota ceilings for one invocation.
#[derive(Clone, Copy, Debug)]
pub struct ResourceLimitData {
    pub disk_storage_limit: u64,
    pub disk_storage_cost: u64,
    pub network_bandwidth_limit: u64,
    pub network_bandwidth_cost: u64,
    pub compute_bandwidth_limit: u64,
    pub compute_bandwidth_cost: u64,
}

impl Default for ResourceLimitData {
    fn default() -> Self {
        ResourceLimitData {
            disk_storage_limit: u64::MAX,
            disk_storage_cost: 0,
            network_bandwidth_limit: u64::MAX,
            network_bandwidth_cost: 0,
            compute_bandwidth_limit: u64::MAX,
            compute_bandwidth_cost: 0,
        }
    }
}

/// A bounded allocation of rc opened before a transaction and closed after.
/// Exceeding the session's rc fails the active call with `InsufficientRc`.
pub struct RcSession {
    begin_rc: u64,
    end_rc: RefCell<u64>,
}

impl RcSession {
    fn new(begin_rc: u64) -> Rc<Self> {
        Rc::new(RcSession {
            begin_rc,
            end_rc: RefCell::new(begin_rc),
        })
    }

    pub fn use_rc(&self, rc: u64) -> Result<()> {
        let mut end = self.end_rc.borrow_mut();
        if rc > *end {
            return Err(chain_error!(InsufficientRc; "insufficient rc"));
        }
        *end -= rc;
        Ok(())
    }

    pub fn remaining_rc(&self) -> u64 {
        *self.end_rc.borrow()
    }

    /// Total rc consumed over the session's lifetime so far.
    pub fn used_rc(&self) -> u64 {
        self.begin_rc - self.remaining_rc()
    }
}

pub struct ResourceMeter {
    limits: RefCell<ResourceLimitData>,
    disk_storage_remaining: RefCell<u64>,
    network_bandwidth_remaining: RefCell<u64>,
    compute_bandwidth_remaining: RefCell<u64>,
    session: RefCell<Weak<RcSession>>,
}

impl Default for ResourceMeter {
    fn default() -> Self {
        ResourceMeter::new(ResourceLimitData::default())
    }
}

impl ResourceMeter {
    pub fn new(limits: ResourceLimitData) -> Self {
        ResourceMeter {
            disk_storage_remaining: RefCell::new(limits.disk_storage_limit),
            network_bandwidth_remaining: RefCell::new(limits.network_bandwidth_limit),
            compute_bandwidth_remaining: RefCell::new(limits.compute_bandwidth_limit),
            limits: RefCell::new(limits),
            session: RefCell::new(Weak::new()),
        }
    }

    pub fn set_resource_limit_data(&self, limits: ResourceLimitData) {
        *self.disk_storage_remaining.borrow_mut() = limits.disk_storage_limit;
        *self.network_bandwidth_remaining.borrow_mut() = limits.network_bandwidth_limit;
        *self.compute_bandwidth_remaining.borrow_mut() = limits.compute_bandwidth_limit;
        *self.limits.borrow_mut() = limits;
    }

    /// Opens a session for `rc` units; attaching a new session replaces any
    /// previous one (the previous session's `Rc` keeps it alive for the
    /// caller that's still holding it, but the meter stops crediting it).
    pub fn make_session(&self, rc: u64) -> Rc<RcSession> {
        let session = RcSession::new(rc);
        *self.session.borrow_mut() = Rc::downgrade(&session);
        session
    }

    fn charge(
        &self,
        amount: u64,
        remaining: &RefCell<u64>,
        cost: u64,
        error_message: &'static str,
    ) -> Result<()> {
        {
            let current = *remaining.borrow();
            if amount > current {
                return Err(chain_error!(InsufficientRc; "{}", error_message));
            }
        }
        if let Some(session) = self.session.borrow().upgrade() {
            let rc_cost = (amount as u128) * (cost as u128);
            if rc_cost > u64::MAX as u128 {
                return Err(chain_error!(InsufficientRc; "rc cost overflow"));
            }
            session.use_rc(rc_cost as u64)?;
        }
        *remaining.borrow_mut() -= amount;
        Ok(())
    }

    pub fn use_disk_storage(&self, bytes: u64) -> Result<()> {
        let cost = self.limits.borrow().disk_storage_cost;
        self.charge(bytes, &self.disk_storage_remaining, cost, "disk storage limit exceeded")
    }

    pub fn use_network_bandwidth(&self, bytes: u64) -> Result<()> {
        let cost = self.limits.borrow().network_bandwidth_cost;
        self.charge(
            bytes,
            &self.network_bandwidth_remaining,
            cost,
            "network bandwidth limit exceeded",
        )
    }

    pub fn use_compute_bandwidth(&self, ticks: u64) -> Result<()> {
        let cost = self.limits.borrow().compute_bandwidth_cost;
        self.charge(
            ticks,
            &self.compute_bandwidth_remaining,
            cost,
            "compute bandwidth limit exceeded",
        )
    }

    pub fn disk_storage_used(&self) -> u64 {
        self.limits.borrow().disk_storage_limit - *self.disk_storage_remaining.borrow()
    }

    pub fn network_bandwidth_used(&self) -> u64 {
        self.limits.borrow().network_bandwidth_limit - *self.network_bandwidth_remaining.borrow()
    }

    pub fn compute_bandwidth_used(&self) -> u64 {
        self.limits.borrow().compute_bandwidth_limit - *self.compute_bandwidth_remaining.borrow()
    }

    /// Remaining compute ticks, saturated against the attached session's
    /// remaining rc when a compute cost is configured -- this is what the
    /// VM adapter reads to derive a tick budget for one contract call.
    pub fn compute_bandwidth_remaining(&self) -> u64 {
        let cost = self.limits.borrow().compute_bandwidth_cost;
        if let Some(session) = self.session.borrow().upgrade() {
            if cost > 0 {
                return (session.remaining_rc() / cost).min(*self.compute_bandwidth_remaining.borrow());
            }
        }
        *self.compute_bandwidth_remaining.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charges_deduct_from_local_quota() {
        let meter = ResourceMeter::new(ResourceLimitData {
            disk_storage_limit: 100,
            ..Default::default()
        });
        meter.use_disk_storage(40).unwrap();
        assert_eq!(meter.disk_storage_used(), 40);
        assert!(meter.use_disk_storage(100).is_err());
    }

    #[test]
    fn session_charges_are_converted_by_cost_and_exhaust_independently() {
        let meter = ResourceMeter::new(ResourceLimitData {
            compute_bandwidth_limit: 1_000_000,
            compute_bandwidth_cost: 10,
            ..Default::default()
        });
        let session = meter.make_session(50);
        meter.use_compute_bandwidth(4).unwrap();
        assert_eq!(session.used_rc(), 40);
        assert!(meter.use_compute_bandwidth(2).is_err());
    }

    #[test]
    fn compute_remaining_saturates_against_session_rc() {
        let meter = ResourceMeter::new(ResourceLimitData {
            compute_bandwidth_limit: 1_000_000,
            compute_bandwidth_cost: 100,
            ..Default::default()
        });
        let _session = meter.make_session(250);
        assert_eq!(meter.compute_bandwidth_remaining(), 2);
    }

    #[test]
    fn dropping_the_session_stops_rc_accounting() {
        let meter = ResourceMeter::new(ResourceLimitData {
            compute_bandwidth_limit: 1_000_000,
            compute_bandwidth_cost: 10,
            ..Default::default()
        });
        {
            let _session = meter.make_session(50);
        }
        meter.use_compute_bandwidth(1_000).unwrap();
    }
}
