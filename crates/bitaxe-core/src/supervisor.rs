//! Top-level task supervision (spec §4.4/§4.5): owns the shared state every
//! loop reads or writes and spawns the stratum session, job-builder,
//! result, and power-controller tasks around it, mirroring the way the
//! teacher's `hub::Core` concentrates the handles its worker tasks share.

use crate::config::AppConfig;
use crate::job_builder::JobBuilderTask;
use crate::result_task::{NullClock, ResultOutcome, ResultTask, SystemClock};
use bitaxe_asic::job::ActiveJobs;
use bitaxe_asic::{AsicDriver, ChipFamily, SerialPort};
use bitaxe_config::{ConfigStore, MemConfigStore};
use bitaxe_logging::{Category, LogSink, Level, StdLogSink};
use bitaxe_stats::{HashrateMonitor, StatisticsRing};
use bitaxe_stratum::v1::StratumV1Client;
use bitaxe_stratum::v2::StratumV2Client;
use bitaxe_stratum::{ProtocolFlag, StratumEvent, StratumProtocol, WorkQueue};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;

/// Minimum consecutive V2 session failures before the orchestration layer
/// honors the stratum crate's recommendation to fail over to V1 -- and
/// only then if a fallback pool is actually configured (spec §4.6 point 8;
/// `V2FailoverTracker` itself has no notion of whether a fallback exists).
const V2_FAILOVER_REQUIRES_FALLBACK: &str = "a V2 pool with no configured V1 fallback never flips ProtocolFlag";

/// Shared handles every supervised task reads from or writes to. Built
/// once at startup and cloned (as `Arc`s) into each spawned task.
pub struct Shared {
    pub active_jobs: Arc<ActiveJobs>,
    pub queue: Arc<WorkQueue<StratumEvent>>,
    pub protocol_flag: Arc<ProtocolFlag>,
    pub config_store: Arc<dyn ConfigStore>,
    pub log: Arc<dyn LogSink>,
    pub hashrate: Arc<HashrateMonitor>,
    pub stats: Arc<StatisticsRing>,
    pub clock: Arc<dyn SystemClock>,
}

impl Shared {
    pub fn new(initial_protocol: StratumProtocol) -> Self {
        Self {
            active_jobs: Arc::new(ActiveJobs::new()),
            queue: Arc::new(WorkQueue::new()),
            protocol_flag: Arc::new(ProtocolFlag::new(initial_protocol)),
            config_store: Arc::new(MemConfigStore::new()),
            log: Arc::new(StdLogSink::default()),
            hashrate: Arc::new(HashrateMonitor::new()),
            stats: Arc::new(StatisticsRing::new()),
            clock: Arc::new(NullClock),
        }
    }
}

/// Drives the stratum session for whichever protocol `protocol_flag`
/// currently selects, reconnecting on error and escalating V1 failures per
/// spec §4.6 point 7. Runs until cancelled.
pub async fn stratum_loop(
    shared: Arc<Shared>,
    v1_client: Arc<StratumV1Client>,
    v2_client: Option<Arc<StratumV2Client>>,
    asic_family_name: &'static str,
    v2_device_id: String,
    v2_ephemeral_secret: [u8; 32],
    has_fallback_pool: bool,
) {
    if has_fallback_pool {
        let heartbeat_client = v1_client.clone();
        let heartbeat_log = shared.log.clone();
        tokio::spawn(async move {
            heartbeat_client.run_heartbeat(heartbeat_log.as_ref(), asic_family_name).await;
        });
    }

    loop {
        match shared.protocol_flag.get() {
            StratumProtocol::V2 => {
                let Some(v2) = v2_client.as_ref() else {
                    shared.protocol_flag.set(StratumProtocol::V1);
                    continue;
                };
                let result = v2.run_session(&shared.queue, shared.log.as_ref(), v2_ephemeral_secret, &v2_device_id).await;
                match result {
                    Ok(()) => {}
                    Err(_) => {
                        let should_fail_over = v2.failover.record_failure(&shared.protocol_flag);
                        if should_fail_over && !has_fallback_pool {
                            // No fallback configured: undo the tracker's flip and keep retrying V2.
                            // (documented at V2_FAILOVER_REQUIRES_FALLBACK above)
                            shared.protocol_flag.set(StratumProtocol::V2);
                        }
                        shared.log.log_message(Category::Network, Level::Warn, "sv2 session ended, retrying");
                    }
                }
            }
            StratumProtocol::V1 => {
                let result = v1_client.run_session(&shared.queue, shared.log.as_ref(), asic_family_name).await;
                if let Err(_err) = result {
                    let should_reboot = v1_client.record_failure(true);
                    if should_reboot {
                        shared.log.log_message(Category::Network, Level::Error, "pool retry budget exhausted, requesting reboot");
                        return;
                    }
                    shared.log.log_message(Category::Network, Level::Warn, "v1 session ended, retrying");
                }
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Drives the job-builder loop (spec §4.4 point 1): on every tick, build a
/// job from whatever the queue has most recently delivered and send it to
/// the ASIC driver.
pub async fn job_builder_loop<P: SerialPort>(
    shared: Arc<Shared>,
    builder: Arc<JobBuilderTask>,
    driver: Arc<AsyncMutex<AsicDriver>>,
    port: Arc<AsyncMutex<P>>,
    extranonce: Arc<bitaxe_stratum::v1::ExtranonceState>,
    version_mask: Arc<AtomicU32>,
    pool_difficulty: f64,
) {
    loop {
        let mask = version_mask.load(Ordering::SeqCst);
        let built = builder.tick(&shared.queue, &extranonce, mask, pool_difficulty, &shared.active_jobs).await;
        match built {
            Ok(Some(job)) => {
                let mut driver = driver.lock().await;
                let mut port = port.lock().await;
                if let Err(err) = driver.send_work(&mut *port, job) {
                    shared.log.log_message(Category::Asic, Level::Warn, &format!("send_work failed: {err:?}"));
                }
            }
            Ok(None) => {}
            Err(err) => {
                shared.log.log_message(Category::Mining, Level::Warn, &format!("job build failed: {err:?}"));
            }
        }
    }
}

/// Drives the result-polling loop (spec §4.4 point 2): pull completed work
/// from the ASIC driver and score it.
pub async fn result_loop<P: SerialPort>(
    shared: Arc<Shared>,
    result_task: Arc<ResultTask>,
    driver: Arc<AsyncMutex<AsicDriver>>,
    port: Arc<AsyncMutex<P>>,
    poll_interval: Duration,
) {
    loop {
        let outcome = {
            let mut driver = driver.lock().await;
            let mut port = port.lock().await;
            driver.process_work(&mut *port)
        };
        match outcome {
            Ok(Some(result)) => {
                let now = Instant::now();
                let outcome = result_task.handle_result(result, &shared.active_jobs, shared.config_store.as_ref(), shared.clock.as_ref(), now, shared.log.as_ref());
                if let ResultOutcome::ShareFound { block_solved, .. } = outcome {
                    if block_solved {
                        shared.log.log_message(Category::Mining, Level::Info, "block solution ready for submission");
                    }
                }
            }
            Ok(None) => {}
            Err(err) => {
                shared.log.log_message(Category::Asic, Level::Warn, &format!("process_work failed: {err:?}"));
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Builds the shared job-builder/result-task pair and wires them to a
/// chip family, matching the fixed two-task split the spec describes
/// (build work forward, score work backward) rather than one combined
/// loop.
pub fn build_core_tasks(chip_family: ChipFamily, version_rolling_enabled: bool) -> (Arc<JobBuilderTask>, Arc<ResultTask>) {
    (Arc::new(JobBuilderTask::new(chip_family, version_rolling_enabled)), Arc::new(ResultTask::new()))
}

/// Resolve the initial `ProtocolFlag` value from the device's configured
/// pool protocol, used at startup before any failure has been recorded.
pub fn initial_protocol(app_config: &AppConfig) -> StratumProtocol {
    match app_config.primary_pool.protocol {
        bitaxe_config::Protocol::StratumV2 => StratumProtocol::V2,
        bitaxe_config::Protocol::StratumV1 => StratumProtocol::V1,
    }
}
