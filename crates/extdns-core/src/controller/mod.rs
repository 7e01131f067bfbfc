//! Reconciliation controller
//!
//! The Controller is responsible for:
//! - Gathering desired endpoints from every source
//! - Reading current records through the registry
//! - Computing a plan and applying it (or logging it in dry-run mode)
//! - Scheduling cycles on a timer and on source change notifications
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  desired   ┌──────────────┐  current  ┌──────────┐
//! │ Sources  │──────────▶ │  Controller  │◀──────────│ Registry │
//! └──────────┘            └──────────────┘           └──────────┘
//!       │ notify                 │ Plan::compute          ▲
//!       └──────────▶ trigger ────┘────── Changes ─────────┘
//! ```
//!
//! ## Scheduling
//!
//! 1. A cycle runs at startup and then every `interval` after the previous one
//! 2. Source notifications set a single-slot pending flag; the event-triggered
//!    cycle starts no earlier than `min_event_sync_interval` after the start of
//!    the previous cycle, so a burst yields one cycle
//! 3. Cycles never overlap; each has a deadline and is cancelled on shutdown

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::changes::Changes;
use crate::config::{ControllerConfig, ExtDnsConfig, FilterConfig};
use crate::endpoint::{DomainFilter, Endpoint, ZoneIdFilter};
use crate::error::{Error, Result};
use crate::factory::Factories;
use crate::plan::{Plan, PlanResult};
use crate::registry::{self, Registry};
use crate::traits::{EventHandler, Provider, Source};

/// Observable controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running,
    ShuttingDown,
}

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First cycle after start
    Startup,
    /// Periodic timer
    Interval,
    /// Source change notification
    Event,
    /// Direct call to [`Controller::run_once`]
    Manual,
}

/// Events emitted by the Controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Controller started
    Started { sources: usize },

    /// A reconciliation cycle started
    CycleStarted { trigger: Trigger },

    /// A source failed and was skipped for this cycle
    SourceFailed { source: String, error: String },

    /// Changes were handed to the registry
    ChangesApplied {
        creates: usize,
        updates: usize,
        deletes: usize,
    },

    /// Dry run: changes computed but not applied
    DryRun {
        creates: usize,
        updates: usize,
        deletes: usize,
    },

    /// The cycle found nothing to change
    NoChanges,

    /// The cycle failed
    CycleFailed { error: String },

    /// Controller stopped
    Stopped { reason: String },
}

/// Summary of one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Plan outcome, including rejected endpoints and resolved conflicts
    pub plan: PlanResult,
    /// Sources skipped because they failed
    pub failed_sources: Vec<String>,
    /// Whether the changes were handed to the registry
    pub applied: bool,
}

/// Reconciliation controller
///
/// ## Lifecycle
///
/// 1. Create with [`Controller::new()`] or [`Controller::build()`]
/// 2. Start with [`Controller::run()`] or [`Controller::run_with_shutdown()`]
/// 3. The loop runs until shutdown (or after one cycle in run-once mode)
///
/// ## Load Resistance
///
/// - **Bounded event channel**: events are dropped with a warning when full
/// - **Single-slot trigger**: any number of notifications collapse into one
///   pending cycle
/// - **Debounce**: event-triggered cycles respect `min_event_sync_interval`
pub struct Controller {
    sources: Vec<Box<dyn Source>>,
    registry: Box<dyn Registry>,
    config: ControllerConfig,
    domain_filter: DomainFilter,
    zone_id_filter: ZoneIdFilter,
    event_tx: mpsc::Sender<ControllerEvent>,
    state_tx: watch::Sender<ControllerState>,
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: Mutex<mpsc::Receiver<()>>,
    cycle_lock: Mutex<()>,
}

impl Controller {
    /// Create a new controller
    ///
    /// # Parameters
    ///
    /// - `sources`: Sources of desired endpoints
    /// - `registry`: Registry wrapping the provider
    /// - `filters`: Domain and zone scoping
    /// - `config`: Controller configuration
    ///
    /// # Returns
    ///
    /// A tuple of (controller, event_receiver) where event_receiver yields
    /// controller events
    pub fn new(
        sources: Vec<Box<dyn Source>>,
        registry: Box<dyn Registry>,
        filters: &FilterConfig,
        config: ControllerConfig,
    ) -> Result<(Self, mpsc::Receiver<ControllerEvent>)> {
        config.validate()?;
        if sources.is_empty() {
            return Err(Error::config("No sources configured"));
        }

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let (state_tx, _) = watch::channel(ControllerState::Idle);
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        let controller = Self {
            sources,
            registry,
            domain_filter: filters.domain_filter()?,
            zone_id_filter: filters.zone_id_filter(),
            config,
            event_tx: tx,
            state_tx,
            trigger_tx,
            trigger_rx: Mutex::new(trigger_rx),
            cycle_lock: Mutex::new(()),
        };

        Ok((controller, rx))
    }

    /// Build a controller from configuration using the given factories
    ///
    /// Unknown provider or source names are configuration errors.
    pub fn build(
        config: ExtDnsConfig,
        factories: &Factories,
    ) -> Result<(Self, mpsc::Receiver<ControllerEvent>)> {
        config.validate()?;

        let provider: Arc<dyn Provider> = Arc::from(factories.create_provider(&config.provider)?);
        let sources = config
            .sources
            .iter()
            .map(|source| factories.create_source(source))
            .collect::<Result<Vec<_>>>()?;
        let registry = registry::build(&config.registry, provider)?;

        info!(
            "Built controller: provider={}, registry={}, sources={}",
            config.provider.type_name(),
            config.registry.type_name(),
            sources.len()
        );
        Self::new(sources, registry, &config.filters, config.controller)
    }

    /// Current state
    pub fn state(&self) -> ControllerState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state_tx.subscribe()
    }

    /// Handler requesting an event-triggered cycle
    ///
    /// Calls beyond the first one before the cycle starts are coalesced.
    pub fn trigger_handle(&self) -> EventHandler {
        let tx = self.trigger_tx.clone();
        Arc::new(move || {
            let _ = tx.try_send(());
        })
    }

    /// Run the control loop until SIGINT
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error (any cycle error in run-once mode)
    pub async fn run(&self) -> Result<()> {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                signal.cancel();
            }
        });
        self.run_with_shutdown(shutdown).await
    }

    /// Run the control loop until `shutdown` is cancelled
    pub async fn run_with_shutdown(&self, shutdown: CancellationToken) -> Result<()> {
        self.emit_event(ControllerEvent::Started {
            sources: self.sources.len(),
        });

        if self.config.once {
            let result = self.run_cycle(&shutdown, Trigger::Startup).await;
            self.stop("Run-once cycle finished");
            return result.map(|_| ());
        }

        if self.config.events {
            for source in &self.sources {
                debug!("Subscribing to change notifications from {}", source.name());
                source.add_event_handler(shutdown.child_token(), self.trigger_handle());
            }
        }

        let mut trigger_rx = self.trigger_rx.lock().await;
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut first = true;
        let mut pending = false;
        let mut last_start: Option<Instant> = None;

        loop {
            let debounce_until = last_start
                .map(|start| start + self.config.min_event_sync_interval)
                .unwrap_or_else(Instant::now);

            let trigger = tokio::select! {
                _ = shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    if first {
                        first = false;
                        Trigger::Startup
                    } else {
                        Trigger::Interval
                    }
                }

                Some(()) = trigger_rx.recv(), if !pending => {
                    debug!("Change notification received, cycle pending");
                    pending = true;
                    continue;
                }

                _ = tokio::time::sleep_until(debounce_until), if pending => Trigger::Event,
            };

            // Anything queued so far is covered by the cycle about to start.
            pending = false;
            while trigger_rx.try_recv().is_ok() {}

            last_start = Some(Instant::now());
            // Errors are reported through logs and events; the loop keeps going.
            let _ = self.run_cycle(&shutdown, trigger).await;
            ticker.reset();
        }

        self.stop("Shutdown signal");
        Ok(())
    }

    /// Run a single cycle now
    pub async fn run_once(&self) -> Result<CycleReport> {
        self.run_cycle(&CancellationToken::new(), Trigger::Manual).await
    }

    async fn run_cycle(&self, shutdown: &CancellationToken, trigger: Trigger) -> Result<CycleReport> {
        let _guard = self.cycle_lock.lock().await;
        self.state_tx.send_replace(ControllerState::Running);
        self.emit_event(ControllerEvent::CycleStarted { trigger });
        debug!("Cycle started ({:?})", trigger);

        let timeout = self.config.cycle_timeout;
        let result = tokio::select! {
            _ = shutdown.cancelled() => Err(Error::Cancelled),
            outcome = tokio::time::timeout(timeout, self.reconcile()) => {
                outcome.unwrap_or(Err(Error::Timeout(timeout)))
            }
        };

        if let Err(e) = &result {
            error!("Reconciliation cycle failed: {}", e);
            self.emit_event(ControllerEvent::CycleFailed {
                error: e.to_string(),
            });
        }
        self.state_tx.send_if_modified(|state| {
            if *state == ControllerState::Running {
                *state = ControllerState::Idle;
                true
            } else {
                false
            }
        });
        result
    }

    async fn reconcile(&self) -> Result<CycleReport> {
        let (desired, failed_sources) = self.gather_desired().await?;
        let desired = self.registry.adjust_endpoints(desired).await?;
        let current = self.registry.records().await?;

        let mut plan = Plan::new(self.registry.ownership())
            .with_policy(self.config.policy)
            .with_domain_filter(self.domain_filter.clone())
            .with_domain_filter(self.registry.domain_filter().await?)
            .with_managed_types(self.config.managed_record_types.clone())
            .with_provider_specific_ordered(self.registry.provider_specific_ordered())
            .with_tie_break(self.config.tie_break);
        if self.zone_id_filter.is_configured() {
            plan = plan.with_zone_id_filter(self.zone_id_filter.clone(), self.registry.zones().await?);
        }

        let result = plan.compute(&current, &desired);
        let changes = &result.changes;
        let counts = (
            changes.create.len(),
            changes.update_new.len(),
            changes.delete.len(),
        );

        if self.config.dry_run {
            log_changes(changes);
            self.emit_event(ControllerEvent::DryRun {
                creates: counts.0,
                updates: counts.1,
                deletes: counts.2,
            });
            return Ok(CycleReport {
                plan: result,
                failed_sources,
                applied: false,
            });
        }

        // The registry may have bookkeeping to write even for an empty plan.
        self.registry.apply_changes(changes).await?;

        if changes.is_empty() {
            debug!("All records are already up to date");
            self.emit_event(ControllerEvent::NoChanges);
        } else {
            info!(
                "Applied {} create(s), {} update(s), {} delete(s)",
                counts.0, counts.1, counts.2
            );
            self.emit_event(ControllerEvent::ChangesApplied {
                creates: counts.0,
                updates: counts.1,
                deletes: counts.2,
            });
        }

        Ok(CycleReport {
            plan: result,
            failed_sources,
            applied: true,
        })
    }

    /// Query every source concurrently
    async fn gather_desired(&self) -> Result<(Vec<Endpoint>, Vec<String>)> {
        let results = join_all(self.sources.iter().map(|source| async move {
            (source.name().to_string(), source.endpoints().await)
        }))
        .await;

        let mut desired = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in results {
            match result {
                Ok(endpoints) => {
                    debug!("Source {} returned {} endpoint(s)", name, endpoints.len());
                    desired.extend(endpoints);
                }
                Err(e) if self.config.fail_on_source_error => {
                    return Err(Error::source(name, e.to_string()));
                }
                Err(e) => {
                    warn!("Source {} failed, skipping it this cycle: {}", name, e);
                    self.emit_event(ControllerEvent::SourceFailed {
                        source: name.clone(),
                        error: e.to_string(),
                    });
                    failed.push(name);
                }
            }
        }
        Ok((desired, failed))
    }

    fn stop(&self, reason: &str) {
        self.state_tx.send_replace(ControllerState::ShuttingDown);
        info!("Controller stopped: {}", reason);
        self.emit_event(ControllerEvent::Stopped {
            reason: reason.to_string(),
        });
    }

    /// Emit a controller event
    fn emit_event(&self, event: ControllerEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

fn log_changes(changes: &Changes) {
    if changes.is_empty() {
        info!("Dry run: no changes");
        return;
    }
    for ep in &changes.create {
        info!("Dry run: would create {}", ep);
    }
    for (old, new) in changes.update_old.iter().zip(&changes.update_new) {
        info!("Dry run: would update {} -> {}", old, new);
    }
    for ep in &changes.delete {
        info!("Dry run: would delete {}", ep);
    }
}
