//! Port Allocator — reserves unique ports from three bounded ranges.
//!
//! One free-set per range, selection is always lowest-available for
//! testability. Host-port liveness is probed with a non-blocking bind
//! run off the async reactor via `spawn_blocking`, the same way the
//! teacher keeps syscall-bound setup work (Docker socket connect) out
//! of the executor.

use std::collections::BTreeSet;
use std::net::{SocketAddr, TcpListener};
use std::sync::Mutex;

use crate::config::PortRange;
use crate::error::OrchestratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeKind {
    Host,
    ContainerHttp,
    ContainerHttps,
}

impl RangeKind {
    fn label(self) -> &'static str {
        match self {
            RangeKind::Host => "PORT_RANGE_HOST",
            RangeKind::ContainerHttp => "ACE_HTTP_RANGE",
            RangeKind::ContainerHttps => "ACE_HTTPS_RANGE",
        }
    }
}

struct RangeState {
    free: BTreeSet<u16>,
}

impl RangeState {
    fn new(range: PortRange) -> Self {
        Self {
            free: (range.lo..=range.hi).collect(),
        }
    }
}

pub struct PortAllocator {
    host: Mutex<RangeState>,
    container_http: Mutex<RangeState>,
    container_https: Mutex<RangeState>,
}

impl PortAllocator {
    pub fn new(host: PortRange, container_http: PortRange, container_https: PortRange) -> Self {
        Self {
            host: Mutex::new(RangeState::new(host)),
            container_http: Mutex::new(RangeState::new(container_http)),
            container_https: Mutex::new(RangeState::new(container_https)),
        }
    }

    fn state(&self, kind: RangeKind) -> &Mutex<RangeState> {
        match kind {
            RangeKind::Host => &self.host,
            RangeKind::ContainerHttp => &self.container_http,
            RangeKind::ContainerHttps => &self.container_https,
        }
    }

    /// Reserve the lowest free port in `kind`'s range, without a liveness probe.
    fn take_lowest(&self, kind: RangeKind) -> Result<u16, OrchestratorError> {
        let mut state = self.state(kind).lock().unwrap();
        let port = *state
            .free
            .iter()
            .next()
            .ok_or(OrchestratorError::PortExhausted(kind.label()))?;
        state.free.remove(&port);
        Ok(port)
    }

    pub fn release(&self, port: u16, kind: RangeKind) {
        let mut state = self.state(kind).lock().unwrap();
        state.free.insert(port);
    }

    pub fn mark_used(&self, port: u16, kind: RangeKind) {
        let mut state = self.state(kind).lock().unwrap();
        state.free.remove(&port);
    }

    /// Host ports additionally need a liveness probe: the range may contain
    /// ports genuinely bound by something outside our management, observed
    /// only at allocation time. At most one full pass over the range is
    /// attempted before surrendering with `PortExhausted`.
    pub async fn allocate_host(&self) -> Result<u16, OrchestratorError> {
        let attempts = {
            let state = self.host.lock().unwrap();
            state.free.len()
        };

        for _ in 0..attempts.max(1) {
            let candidate = self.take_lowest(RangeKind::Host)?;
            if is_port_free(candidate).await {
                return Ok(candidate);
            }
            // bound externally; keep it out of the free-set and try the next one
        }

        Err(OrchestratorError::PortExhausted(RangeKind::Host.label()))
    }

    /// Reserve distinct container http/https ports. On failure to reserve
    /// the https port, the http reservation is released before returning.
    pub fn allocate_container_pair(&self) -> Result<(u16, u16), OrchestratorError> {
        let http_port = self.take_lowest(RangeKind::ContainerHttp)?;
        match self.take_lowest(RangeKind::ContainerHttps) {
            Ok(https_port) => Ok((http_port, https_port)),
            Err(err) => {
                self.release(http_port, RangeKind::ContainerHttp);
                Err(err)
            }
        }
    }
}

async fn is_port_free(port: u16) -> bool {
    tokio::task::spawn_blocking(move || {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        TcpListener::bind(addr).is_ok()
    })
    .await
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(lo: u16, hi: u16) -> PortAllocator {
        let r = PortRange { lo, hi };
        PortAllocator::new(r, r, r)
    }

    #[tokio::test]
    async fn allocate_host_picks_lowest_available() {
        let alloc = allocator(20000, 20010);
        let first = alloc.allocate_host().await.unwrap();
        assert_eq!(first, 20000);
    }

    #[tokio::test]
    async fn no_two_outstanding_allocations_collide() {
        let alloc = allocator(20020, 20022);
        let a = alloc.allocate_host().await.unwrap();
        let b = alloc.allocate_host().await.unwrap();
        let c = alloc.allocate_host().await.unwrap();
        let mut seen = vec![a, b, c];
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn exhausted_range_raises_port_exhausted() {
        let alloc = allocator(20030, 20030);
        let _ = alloc.allocate_host().await.unwrap();
        let err = alloc.allocate_host().await;
        assert!(matches!(err, Err(OrchestratorError::PortExhausted(_))));
    }

    #[tokio::test]
    async fn release_returns_port_to_pool() {
        let alloc = allocator(20040, 20040);
        let p = alloc.allocate_host().await.unwrap();
        alloc.release(p, RangeKind::Host);
        let p2 = alloc.allocate_host().await.unwrap();
        assert_eq!(p, p2);
    }

    #[test]
    fn mark_used_excludes_port_from_future_allocation() {
        let alloc = allocator(20050, 20052);
        alloc.mark_used(20050, RangeKind::Host);
        let remaining = alloc.host.lock().unwrap().free.clone();
        assert!(!remaining.contains(&20050));
    }

    #[test]
    fn container_pair_returns_distinct_ports() {
        let alloc = allocator(20060, 20070);
        let (http, https) = alloc.allocate_container_pair().unwrap();
        assert_ne!(http, https);
    }

    #[test]
    fn container_pair_releases_http_on_https_exhaustion() {
        let r_http = PortRange { lo: 20080, hi: 20081 };
        let r_https = PortRange { lo: 20090, hi: 20090 };
        let alloc = PortAllocator::new(r_http, r_http, r_https);
        let _ = alloc.take_lowest(RangeKind::ContainerHttps).unwrap();
        let err = alloc.allocate_container_pair();
        assert!(err.is_err());
        // the http port should have been released back
        let remaining = alloc.container_http.lock().unwrap().free.clone();
        assert_eq!(remaining.len(), 2);
    }
}
