//! Cluster driver: starts the replicas, runs the sessions, stops the replicas.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use branchmesh_client::{CustomerSession, check_session};
use branchmesh_config::BranchmeshConfig;
use branchmesh_replica::{
    ConnectionPool, LedgerReplica, ReplicaHandle, ReplicaRegistry, ReplicaServer,
};
use branchmesh_types::RunMode;
use futures::future::try_join_all;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{ClusterError, ClusterResult};
use crate::report::{ReplicaBalance, RunReport, SessionOutput, SessionViolation};
use crate::scenario::{CustomerPlan, Scenario};

/// How the driver starts replicas and schedules sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    /// Interface every replica binds to.
    pub host: IpAddr,
    /// Replica `id` listens on `base_port + id`; `0` picks ephemeral ports.
    pub base_port: u16,
    /// Pause after binding each replica.
    pub settle_delay: Duration,
    pub mode: RunMode,
}

impl DriverOptions {
    pub fn from_config(config: &BranchmeshConfig) -> Self {
        Self {
            host: config.cluster.host,
            base_port: config.cluster.base_port,
            settle_delay: config.cluster.settle_delay(),
            mode: config.run.mode,
        }
    }

    /// Loopback, ephemeral ports, no settling delay.
    pub fn ephemeral(mode: RunMode) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 0,
            settle_delay: Duration::ZERO,
            mode,
        }
    }
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self::from_config(&BranchmeshConfig::default())
    }
}

/// A running replica set.
///
/// Owns every replica handle and the connection pool the sessions use.
/// Call [`shutdown`](Self::shutdown) when done; dropping the driver only
/// signals the replicas to stop.
pub struct ClusterDriver {
    options: DriverOptions,
    registry: Arc<ReplicaRegistry>,
    replicas: Vec<ReplicaHandle<ConnectionPool>>,
    client: ConnectionPool,
}

impl ClusterDriver {
    /// Binds and starts one replica per branch of `scenario`.
    pub async fn start(scenario: &Scenario, options: DriverOptions) -> ClusterResult<Self> {
        let branches = scenario.branches();

        // With fixed ports the registry is known up front and decides where
        // each replica binds. With ephemeral ports it is built from the
        // addresses actually bound.
        let planned = if options.base_port == 0 {
            None
        } else {
            Some(ReplicaRegistry::from_base_port(
                options.host,
                options.base_port,
                branches.iter().map(|branch| branch.id),
            )?)
        };

        let mut servers = Vec::with_capacity(branches.len());
        for branch in branches {
            let addr = match &planned {
                Some(registry) => registry.resolve(branch.id)?,
                None => SocketAddr::new(options.host, 0),
            };

            let server = ReplicaServer::bind(addr).await?;
            info!(replica_id = %branch.id, addr = %server.local_addr(), balance = branch.balance, "replica bound");
            servers.push((*branch, server));

            if !options.settle_delay.is_zero() {
                sleep(options.settle_delay).await;
            }
        }

        let registry = Arc::new(match planned {
            Some(registry) => registry,
            None => ReplicaRegistry::from_addresses(
                servers
                    .iter()
                    .map(|(branch, server)| (branch.id, server.local_addr())),
            )?,
        });

        let replicas = servers
            .into_iter()
            .map(|(branch, server)| {
                let replica = LedgerReplica::new(
                    branch.id,
                    branch.balance,
                    registry.peers_of(branch.id),
                    ConnectionPool::new(Arc::clone(&registry)),
                );
                server.serve(Arc::new(replica))
            })
            .collect();

        info!(replicas = registry.len(), mode = %options.mode, "cluster started");

        Ok(Self {
            options,
            client: ConnectionPool::new(Arc::clone(&registry)),
            registry,
            replicas,
        })
    }

    /// Starts the cluster, runs every session, and shuts the cluster down.
    pub async fn run(scenario: &Scenario, options: DriverOptions) -> ClusterResult<RunReport> {
        let mut driver = Self::start(scenario, options).await?;

        let sessions = driver.run_sessions(scenario).await;
        let replica_balances = driver.replica_balances();
        driver.shutdown().await?;

        let sessions = sessions?;
        let violations = match options.mode {
            RunMode::Sequential => sessions
                .iter()
                .flat_map(|session| {
                    check_session(session.records())
                        .into_iter()
                        .map(|result| SessionViolation {
                            customer: session.id(),
                            result,
                        })
                })
                .collect(),
            RunMode::Concurrent => Vec::new(),
        };
        for violation in &violations {
            warn!(customer_id = %violation.customer, "{}", violation.result);
        }

        let outputs = sessions
            .iter()
            .map(|session| match options.mode {
                RunMode::Sequential => SessionOutput::Trace {
                    id: session.id(),
                    recv: session.trace().to_vec(),
                },
                RunMode::Concurrent => SessionOutput::Balance {
                    id: session.id(),
                    balance: session.balance(),
                },
            })
            .collect();

        Ok(RunReport {
            mode: options.mode,
            outputs,
            replica_balances,
            violations,
        })
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub fn registry(&self) -> &ReplicaRegistry {
        &self.registry
    }

    /// Connection pool for talking to the replicas as a client.
    pub fn client(&self) -> &ConnectionPool {
        &self.client
    }

    /// Runs every customer of `scenario` according to the run mode.
    ///
    /// Sessions are returned in declaration order.
    pub async fn run_sessions(&self, scenario: &Scenario) -> ClusterResult<Vec<CustomerSession>> {
        match self.options.mode {
            RunMode::Sequential => {
                let mut sessions = Vec::with_capacity(scenario.customers().len());
                for plan in scenario.customers() {
                    sessions.push(run_session(plan.clone(), self.client.clone()).await);
                }
                Ok(sessions)
            }
            RunMode::Concurrent => {
                let tasks = scenario
                    .customers()
                    .iter()
                    .map(|plan| tokio::spawn(run_session(plan.clone(), self.client.clone())));

                try_join_all(tasks)
                    .await
                    .map_err(|err| ClusterError::SessionTask(err.to_string()))
            }
        }
    }

    /// Current balance of every replica, in branch declaration order.
    pub fn replica_balances(&self) -> Vec<ReplicaBalance> {
        self.replicas
            .iter()
            .map(|replica| ReplicaBalance {
                id: replica.id(),
                balance: replica.balance(),
            })
            .collect()
    }

    /// Stops every replica, waiting for in-flight requests to drain.
    ///
    /// Every replica is stopped even if an earlier one fails; the first
    /// failure is returned.
    pub async fn shutdown(&mut self) -> ClusterResult<()> {
        let mut first_error = None;
        for replica in &mut self.replicas {
            if let Err(e) = replica.stop().await {
                warn!(replica_id = %replica.id(), "failed to stop replica: {e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        info!("cluster stopped");
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

async fn run_session(plan: CustomerPlan, client: ConnectionPool) -> CustomerSession {
    debug!(customer_id = %plan.id, events = plan.events.len(), "starting session");
    let mut session = CustomerSession::new(plan.id, client);
    session.run_events(&plan.events).await;
    session
}
