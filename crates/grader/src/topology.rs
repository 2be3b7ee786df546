//! The queuing network: shared state every process operates on.

use crate::backup::BackupDrain;
use crate::config::NetworkConfig;
use crate::error::GraderError;
use crate::lifecycle::CommitLifecycle;
use crate::metrics::{MetricsRecorder, MetricsSnapshot, Sample};
use crate::policy::{Admission, Policy};
use crate::regulator::Regulator;
use crate::sampler::MetricsSampler;
use crate::user::{BackupRecord, SubmissionHistory, User, UserId};
use gradesim::{
    KernelError, ProcessId, Resource, ResourceId, Simulation, SimulationSystem, Store, StoreId, World,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

pub const TEST_SERVERS: ResourceId = ResourceId(0);
pub const RESULT_SERVER: ResourceId = ResourceId(1);
pub const TEST_OCCUPANCY: StoreId = StoreId(0);
pub const RESULT_OCCUPANCY: StoreId = StoreId(1);

/// Network parameters plus the registered user population.
#[derive(Clone, Debug, PartialEq)]
pub struct GradingSetup {
    pub network: NetworkConfig,
    pub users: Vec<User>,
}

/// Two-stage grading network.
///
/// Owns the test servers, the single result server, the occupancy stores
/// used for capacity checks, backup storage, the users, the metrics and the
/// run's random generator.
pub struct Topology {
    network: NetworkConfig,
    policy: Policy,
    test_servers: Resource,
    result_server: Resource,
    test_occupancy: Store<UserId>,
    result_occupancy: Store<UserId>,
    backup: Store<BackupRecord>,
    users: Vec<User>,
    metrics: MetricsRecorder,
    rng: ChaCha8Rng,
    dam_closed: bool,
}

fn occupancy(id: StoreId, admission: Admission) -> Store<UserId> {
    match admission {
        Admission::Open => Store::unbounded(id),
        Admission::Bounded(limit) => Store::bounded(id, limit),
    }
}

impl Topology {
    pub fn new(network: NetworkConfig, users: Vec<User>, seed: u64) -> Result<Self, GraderError> {
        network.validate()?;
        let policy = Policy::for_topology(&network.topology);

        let users = users
            .into_iter()
            .map(|mut user| {
                user.current_exo = 1;
                user.history = SubmissionHistory::new(network.tag_limit);
                user
            })
            .collect();

        Ok(Self {
            test_servers: Resource::new(TEST_SERVERS, network.servers),
            result_server: Resource::new(RESULT_SERVER, 1),
            test_occupancy: occupancy(TEST_OCCUPANCY, policy.test),
            result_occupancy: occupancy(RESULT_OCCUPANCY, policy.result),
            backup: Store::unbounded(StoreId(2)),
            users,
            metrics: MetricsRecorder::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            dam_closed: false,
            network,
            policy,
        })
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(id)
    }

    pub fn user_mut(&mut self, id: UserId) -> Option<&mut User> {
        self.users.get_mut(id)
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut MetricsRecorder {
        &mut self.metrics
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    pub fn test_servers(&self) -> &Resource {
        &self.test_servers
    }

    pub fn result_server(&self) -> &Resource {
        &self.result_server
    }

    pub fn backup_len(&self) -> usize {
        self.backup.len()
    }

    pub fn all_finished(&self) -> bool {
        let nb_exos = self.network.nb_exos;
        self.users.iter().all(|user| user.is_finished(nb_exos))
    }

    /// Condition under which the background loops stop.
    pub fn drained(&self) -> bool {
        self.all_finished() && self.backup.is_empty()
    }

    /// `drained` with both stages idle as well.
    pub fn quiescent(&self) -> bool {
        self.drained() && self.test_servers.is_idle() && self.result_server.is_idle()
    }

    /// Whether the test stage refuses a new commit right now.
    pub fn test_stage_full(&self) -> bool {
        self.policy.test.is_bounded() && self.test_occupancy.is_full()
    }

    /// Whether the result stage refuses a new commit right now.
    pub fn result_stage_full(&self) -> bool {
        self.policy.result.is_bounded() && self.result_occupancy.is_full()
    }

    pub fn dam_closed(&self) -> bool {
        self.dam_closed
    }

    pub fn set_dam_closed(&mut self, closed: bool) {
        self.dam_closed = closed;
    }

    /// Whether `user` is currently held back by the dam.
    pub fn dammed(&self, user: &User) -> bool {
        self.dam_closed && self.policy.gates(user.population)
    }

    /// Park a refused result on behalf of `process`.
    ///
    /// Backup storage is unbounded and nothing ever suspends on it, so a
    /// refusal means the store was built wrong.
    pub fn park_in_backup(
        &mut self,
        process: ProcessId,
        record: BackupRecord,
    ) -> Result<(), KernelError> {
        self.backup
            .try_put(record)
            .map_err(|_| KernelError::Inconsistent {
                process,
                detail: "backup storage refused a record",
            })?;
        self.metrics.record_backup();
        Ok(())
    }

    pub fn take_from_backup(&mut self) -> Option<BackupRecord> {
        self.backup.try_take(&gradesim::Matcher::Any)
    }

    /// Users currently inside a stage, queued or in service.
    fn stage_length(&self, resource: &Resource, store: &Store<UserId>, admission: Admission) -> usize {
        match admission {
            Admission::Open => resource.count() + resource.queue_len(),
            Admission::Bounded(_) => store.len(),
        }
    }

    pub fn sample(&self, at: gradesim::SimTime) -> Sample {
        Sample {
            at,
            test_busy: self.test_servers.count(),
            test_length: self.stage_length(&self.test_servers, &self.test_occupancy, self.policy.test),
            backup_length: self.backup.len(),
            result_busy: self.result_server.count(),
            result_length: self.stage_length(
                &self.result_server,
                &self.result_occupancy,
                self.policy.result,
            ),
            test_utilization: self.test_servers.utilization(),
            result_utilization: self.result_server.utilization(),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl World for Topology {
    type Item = UserId;

    fn resource_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        match id {
            TEST_SERVERS => Some(&mut self.test_servers),
            RESULT_SERVER => Some(&mut self.result_server),
            _ => None,
        }
    }

    fn store_mut(&mut self, id: StoreId) -> Option<&mut Store<UserId>> {
        match id {
            TEST_OCCUPANCY => Some(&mut self.test_occupancy),
            RESULT_OCCUPANCY => Some(&mut self.result_occupancy),
            _ => None,
        }
    }
}

impl SimulationSystem for Topology {
    type Config = GradingSetup;
    type Error = GraderError;
    type Snapshot = MetricsSnapshot;

    fn init(config: Self::Config, seed: u64) -> Result<Self, Self::Error> {
        Topology::new(config.network, config.users, seed)
    }

    fn launch(simulation: &mut Simulation<Self>) {
        let policy = *simulation.world().policy();
        let users = simulation.world().users().len();
        info!(
            topology = simulation.world().network().topology.label(),
            users,
            "launching network"
        );

        if policy.has_regulator() {
            simulation.spawn(Box::new(Regulator::new()));
        }
        if policy.uses_backup() {
            simulation.spawn(Box::new(BackupDrain::new()));
        }
        simulation.spawn(Box::new(MetricsSampler::new()));
        for user in 0..users {
            simulation.spawn(Box::new(CommitLifecycle::new(user)));
        }
    }

    fn observe(&self) -> Self::Snapshot {
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopologyKind;
    use crate::error::ConfigError;
    use crate::user::{Commit, CommitKey, Population};

    fn network(topology: TopologyKind) -> NetworkConfig {
        NetworkConfig {
            servers: 2,
            process_time: 2,
            result_time: 1,
            tag_limit: 3,
            nb_exos: 2,
            topology,
        }
    }

    #[test]
    fn invalid_network_never_builds() {
        let config = NetworkConfig {
            servers: 0,
            ..network(TopologyKind::Unbounded)
        };
        let built = Topology::new(config, Vec::new(), 1);
        assert!(matches!(
            built,
            Err(GraderError::Config(ConfigError::NoServers))
        ));
    }

    #[test]
    fn registration_resets_progress_and_applies_tag_limit() {
        let mut user = User::new("USER0", Population::Fast, 0.5);
        user.current_exo = 4;
        let topology = Topology::new(network(TopologyKind::Unbounded), vec![user], 1).unwrap();

        let registered = topology.user(0).unwrap();
        assert_eq!(registered.current_exo, 1);
        assert_eq!(registered.history, SubmissionHistory::new(3));
        assert!(!topology.all_finished());
    }

    #[test]
    fn open_stages_are_never_full() {
        let topology = Topology::new(network(TopologyKind::Unbounded), Vec::new(), 1).unwrap();
        assert!(!topology.test_stage_full());
        assert!(!topology.result_stage_full());
        assert!(topology.quiescent());
    }

    #[test]
    fn zero_capacity_stage_is_full_from_the_start() {
        let topology =
            Topology::new(network(TopologyKind::Bounded { ks: 0, kf: 3 }), Vec::new(), 1).unwrap();
        assert!(topology.test_stage_full());
        assert!(!topology.result_stage_full());
    }

    #[test]
    fn backup_keeps_parked_records_in_arrival_order() {
        let mut topology =
            Topology::new(network(TopologyKind::Backup { ks: 2, kf: 1 }), Vec::new(), 1).unwrap();
        for (sequence, at) in [(0, 10), (1, 12)] {
            let record = BackupRecord {
                commit: Commit {
                    key: CommitKey { user: 0, sequence },
                    submitted_at: at,
                    exercise: 1,
                    chance: 0.5,
                },
                backed_up_at: at,
            };
            topology.park_in_backup(3, record).unwrap();
        }

        assert_eq!(topology.backup_len(), 2);
        assert_eq!(topology.snapshot().backup.stored, 2);
        let first = topology.take_from_backup().unwrap();
        assert_eq!(first.commit.key.sequence, 0);
        assert_eq!(topology.backup_len(), 1);
    }

    #[test]
    fn dam_only_holds_back_gated_population_when_enforced() {
        let kind = |block_option| TopologyKind::Regulated {
            ks: 4,
            kf: 2,
            tb: 10,
            block_option,
        };
        let fast = User::new("f", Population::Fast, 0.5);
        let slow = User::new("s", Population::Slow, 0.5);

        let mut enforced = Topology::new(network(kind(true)), Vec::new(), 1).unwrap();
        enforced.set_dam_closed(true);
        assert!(enforced.dammed(&fast));
        assert!(!enforced.dammed(&slow));

        let mut relaxed = Topology::new(network(kind(false)), Vec::new(), 1).unwrap();
        relaxed.set_dam_closed(true);
        assert!(!relaxed.dammed(&fast));
    }
}
