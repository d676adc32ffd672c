//! Execution strategy selection and the collective seam
//!
//! Two strategies exist: single-host mirrored replication, and pod execution
//! against an accelerator cluster. Pod execution performs a one-time
//! bootstrap handshake with the cluster coordinator, and model construction
//! must happen inside [`Strategy::scope`] so weights are created after the
//! cluster is reachable. An unreachable coordinator fails fast; there is no
//! silent fallback to single-host mode.

use crate::autograd::Tensor;
use crate::error::{Error, Result};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10);

/// Selected parallel-execution strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Synchronous replication across accelerators on one host
    Mirrored {
        /// Number of replicas sharing each batch
        replicas: usize,
    },
    /// Accelerator-cluster execution behind a coordinator
    Pod {
        /// Resolved coordinator endpoint
        coordinator: SocketAddr,
        /// Number of replicas sharing each batch
        replicas: usize,
    },
}

impl Strategy {
    /// Choose a strategy: pod execution when a coordinator address is
    /// configured, mirrored replication otherwise.
    ///
    /// The coordinator address is resolved here, so a malformed or
    /// unresolvable address surfaces before any training state exists.
    pub fn select(coordinator: Option<&str>, replicas: usize) -> Result<Self> {
        if replicas == 0 {
            return Err(Error::Config("replica count must be positive".into()));
        }
        match coordinator {
            Some(address) => {
                let resolved = address
                    .to_socket_addrs()
                    .map_err(|e| {
                        Error::Config(format!("cannot resolve cluster coordinator {address}: {e}"))
                    })?
                    .next()
                    .ok_or_else(|| {
                        Error::Config(format!("cluster coordinator {address} resolved to nothing"))
                    })?;
                Ok(Strategy::Pod { coordinator: resolved, replicas })
            }
            None => Ok(Strategy::Mirrored { replicas }),
        }
    }

    /// Replica count
    pub fn replicas(&self) -> usize {
        match self {
            Strategy::Mirrored { replicas } | Strategy::Pod { replicas, .. } => *replicas,
        }
    }

    /// Run model construction inside this strategy's execution scope.
    ///
    /// Pod execution bootstraps the cluster first; a failed bootstrap aborts
    /// before `build` runs.
    pub fn scope<T>(&self, build: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Strategy::Pod { coordinator, .. } = self {
            bootstrap(coordinator)?;
        }
        build()
    }
}

/// One-time cluster bootstrap: connect to the coordinator and close the
/// handshake socket. Connection failure is fatal.
fn bootstrap(coordinator: &SocketAddr) -> Result<()> {
    let stream = TcpStream::connect_timeout(coordinator, BOOTSTRAP_TIMEOUT).map_err(|e| {
        Error::Config(format!("cluster coordinator {coordinator} unreachable: {e}"))
    })?;
    stream.shutdown(Shutdown::Both).ok();
    Ok(())
}

/// Cross-replica gradient reduction.
///
/// The driver accumulates each replica's shard gradients into the shared
/// parameter handles; `sync_gradients` turns those sums into the mean every
/// replica applies. A multi-host transport plugs in here; a failed reduction
/// is fatal and training halts.
pub trait Collective {
    /// Reduce the accumulated gradients across `replicas` participants
    fn sync_gradients(&self, params: &[(String, Tensor)], replicas: usize) -> Result<()>;
}

/// In-process reduction for mirrored execution
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCollective;

impl Collective for LocalCollective {
    fn sync_gradients(&self, params: &[(String, Tensor)], replicas: usize) -> Result<()> {
        if replicas <= 1 {
            return Ok(());
        }
        let inverse = 1.0 / replicas as f32;
        for (_, tensor) in params {
            let cell = tensor.grad_cell();
            let mut grad = cell.borrow_mut();
            if let Some(g) = grad.as_mut() {
                g.mapv_inplace(|x| x * inverse);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn test_select_mirrored_without_coordinator() {
        let strategy = Strategy::select(None, 4).unwrap();
        assert_eq!(strategy, Strategy::Mirrored { replicas: 4 });
        assert_eq!(strategy.replicas(), 4);
    }

    #[test]
    fn test_select_pod_resolves_address() {
        let strategy = Strategy::select(Some("127.0.0.1:8470"), 8).unwrap();
        match strategy {
            Strategy::Pod { coordinator, replicas } => {
                assert_eq!(coordinator.port(), 8470);
                assert_eq!(replicas, 8);
            }
            other => panic!("expected pod strategy, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_replicas_rejected() {
        assert!(Strategy::select(None, 0).is_err());
    }

    #[test]
    fn test_malformed_coordinator_rejected() {
        assert!(Strategy::select(Some("not an address"), 1).is_err());
    }

    #[test]
    fn test_mirrored_scope_runs_build() {
        let strategy = Strategy::select(None, 2).unwrap();
        let value = strategy.scope(|| Ok(21 * 2)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_pod_scope_fails_fast_on_unreachable_coordinator() {
        // Nothing listens on the chosen port; bootstrap must fail before the
        // build closure runs.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let strategy = Strategy::select(Some(&format!("127.0.0.1:{port}")), 1).unwrap();
        let mut built = false;
        let result = strategy.scope(|| {
            built = true;
            Ok(())
        });
        assert!(result.is_err());
        assert!(!built);
    }

    #[test]
    fn test_pod_scope_bootstraps_against_live_coordinator() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            // Accept the single handshake connection.
            let _ = listener.accept();
        });

        let strategy = Strategy::select(Some(&address.to_string()), 2).unwrap();
        let value = strategy.scope(|| Ok(7)).unwrap();
        assert_eq!(value, 7);
        handle.join().unwrap();
    }

    #[test]
    fn test_local_collective_averages() {
        let params = vec![("w".to_string(), Tensor::from_vec(vec![0.0, 0.0], true))];
        params[0].1.set_grad(Array1::from(vec![4.0, 8.0]));

        LocalCollective.sync_gradients(&params, 4).unwrap();
        let grad = params[0].1.grad().unwrap();
        assert_eq!(grad[0], 1.0);
        assert_eq!(grad[1], 2.0);
    }

    #[test]
    fn test_local_collective_single_replica_noop() {
        let params = vec![("w".to_string(), Tensor::from_vec(vec![0.0], true))];
        params[0].1.set_grad(Array1::from(vec![3.0]));
        LocalCollective.sync_gradients(&params, 1).unwrap();
        assert_eq!(params[0].1.grad().unwrap()[0], 3.0);
    }

    #[test]
    fn test_local_collective_skips_missing_gradients() {
        let params = vec![("w".to_string(), Tensor::from_vec(vec![0.0], true))];
        LocalCollective.sync_gradients(&params, 2).unwrap();
        assert!(params[0].1.grad().is_none());
    }
}
