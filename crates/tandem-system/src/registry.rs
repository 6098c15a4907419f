//! [`SystemRegistry`]: runs registered systems phase by phase.

use std::time::{Duration, Instant};

use tandem_core::{Entity, UpdateInfo};
use tandem_ecm::EntityComponentManager;

use crate::error::{RegistryError, SystemError};
use crate::record::SystemRecord;
use crate::system::Phase;

/// Wall-clock time one system spent in each phase of the last step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    /// Time in pre-update.
    pub pre_update: Duration,
    /// Time in update.
    pub update: Duration,
    /// Time in post-update.
    pub post_update: Duration,
}

/// Per-system timing snapshot returned by [`SystemRegistry::timings`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemTiming {
    /// System name.
    pub name: String,
    /// Phase timings from the most recent step.
    pub last: PhaseTimings,
    /// Phase failures since registration.
    pub failures: u64,
}

struct Entry {
    record: SystemRecord,
    entity: Entity,
    last: PhaseTimings,
    failures: u64,
}

/// Ordered collection of registered systems.
#[derive(Default)]
pub struct SystemRegistry {
    entries: Vec<Entry>,
}

impl SystemRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure `record` against `entity` and append it.
    ///
    /// A system whose configure phase fails is not registered.
    pub fn add(
        &mut self,
        record: SystemRecord,
        entity: Entity,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), RegistryError> {
        if let Some(handle) = &record.configure {
            if let Err(source) = handle.lock().configure(entity, ecm) {
                tracing::error!(
                    system = record.name(),
                    %entity,
                    error = %source,
                    "system configure failed"
                );
                return Err(RegistryError::ConfigureFailed {
                    name: record.name().to_owned(),
                    phase: Phase::Configure,
                    source,
                });
            }
        }
        tracing::debug!(system = record.name(), %entity, "system registered");
        self.entries.push(Entry {
            record,
            entity,
            last: PhaseTimings::default(),
            failures: 0,
        });
        Ok(())
    }

    /// Run every pre-update handle in registration order.
    ///
    /// Returns the number of systems that reported failure.
    pub fn run_pre_update(&mut self, info: &UpdateInfo, ecm: &mut EntityComponentManager) -> usize {
        let mut failed = 0;
        for entry in &mut self.entries {
            let Some(handle) = &entry.record.pre_update else {
                continue;
            };
            let start = Instant::now();
            let result = handle.lock().pre_update(info, ecm);
            entry.last.pre_update = start.elapsed();
            failed += usize::from(record_outcome(entry, Phase::PreUpdate, info, result));
        }
        failed
    }

    /// Run every update handle in registration order.
    ///
    /// Returns the number of systems that reported failure.
    pub fn run_update(&mut self, info: &UpdateInfo, ecm: &mut EntityComponentManager) -> usize {
        let mut failed = 0;
        for entry in &mut self.entries {
            let Some(handle) = &entry.record.update else {
                continue;
            };
            let start = Instant::now();
            let result = handle.lock().update(info, ecm);
            entry.last.update = start.elapsed();
            failed += usize::from(record_outcome(entry, Phase::Update, info, result));
        }
        failed
    }

    /// Run every post-update handle in registration order.
    ///
    /// Returns the number of systems that reported failure.
    pub fn run_post_update(&mut self, info: &UpdateInfo, ecm: &EntityComponentManager) -> usize {
        let mut failed = 0;
        for entry in &mut self.entries {
            let Some(handle) = &entry.record.post_update else {
                continue;
            };
            let start = Instant::now();
            let result = handle.lock().post_update(info, ecm);
            entry.last.post_update = start.elapsed();
            failed += usize::from(record_outcome(entry, Phase::PostUpdate, info, result));
        }
        failed
    }

    /// Number of registered systems.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no system is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of systems with a pre-update handle.
    pub fn pre_update_count(&self) -> usize {
        self.entries.iter().filter(|e| e.record.has_pre_update()).count()
    }

    /// Number of systems with an update handle.
    pub fn update_count(&self) -> usize {
        self.entries.iter().filter(|e| e.record.has_update()).count()
    }

    /// Number of systems with a post-update handle.
    pub fn post_update_count(&self) -> usize {
        self.entries.iter().filter(|e| e.record.has_post_update()).count()
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.record.name()).collect()
    }

    /// Entity each system was configured against, in registration order.
    pub fn entities(&self) -> Vec<Entity> {
        self.entries.iter().map(|e| e.entity).collect()
    }

    /// Timing and failure snapshot for every system.
    pub fn timings(&self) -> Vec<SystemTiming> {
        self.entries
            .iter()
            .map(|e| SystemTiming {
                name: e.record.name().to_owned(),
                last: e.last,
                failures: e.failures,
            })
            .collect()
    }
}

impl std::fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemRegistry")
            .field("systems", &self.names())
            .finish()
    }
}

/// Log and count a failed phase. Returns `true` on failure.
fn record_outcome(
    entry: &mut Entry,
    phase: Phase,
    info: &UpdateInfo,
    result: Result<(), SystemError>,
) -> bool {
    match result {
        Ok(()) => false,
        Err(err) => {
            entry.failures += 1;
            tracing::error!(
                system = entry.record.name(),
                %phase,
                iteration = info.iterations,
                error = %err,
                "system phase failed"
            );
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::system::{Configure, PostUpdate, PreUpdate, System, Update};

    /// Appends "<name>:<phase>" to a shared log.
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_update: bool,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                log: Arc::clone(log),
                fail_update: false,
            }
        }

        fn push(&self, phase: &str) {
            self.log.lock().push(format!("{}:{phase}", self.name));
        }
    }

    impl System for Recorder {
        fn name(&self) -> &str {
            self.name
        }
    }

    impl Configure for Recorder {
        fn configure(
            &mut self,
            _entity: Entity,
            _ecm: &mut EntityComponentManager,
        ) -> Result<(), SystemError> {
            self.push("configure");
            if self.name == "broken" {
                return Err(SystemError::failed("no config"));
            }
            Ok(())
        }
    }

    impl PreUpdate for Recorder {
        fn pre_update(
            &mut self,
            _info: &UpdateInfo,
            _ecm: &mut EntityComponentManager,
        ) -> Result<(), SystemError> {
            self.push("pre");
            Ok(())
        }
    }

    impl Update for Recorder {
        fn update(
            &mut self,
            _info: &UpdateInfo,
            _ecm: &mut EntityComponentManager,
        ) -> Result<(), SystemError> {
            self.push("update");
            if self.fail_update {
                return Err(SystemError::failed("boom"));
            }
            Ok(())
        }
    }

    impl PostUpdate for Recorder {
        fn post_update(
            &mut self,
            _info: &UpdateInfo,
            _ecm: &EntityComponentManager,
        ) -> Result<(), SystemError> {
            self.push("post");
            Ok(())
        }
    }

    fn run_step(reg: &mut SystemRegistry, ecm: &mut EntityComponentManager) -> usize {
        let info = UpdateInfo::default();
        reg.run_pre_update(&info, ecm) + reg.run_update(&info, ecm) + reg.run_post_update(&info, ecm)
    }

    #[test]
    fn phases_run_in_registration_order_and_skip_missing_handles() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ecm = EntityComponentManager::new();
        let mut reg = SystemRegistry::new();
        reg.add(
            SystemRecord::new(Recorder::new("a", &log))
                .with_configure()
                .with_pre_update()
                .with_update()
                .with_post_update()
                .build(),
            Entity(0),
            &mut ecm,
        )
        .unwrap();
        reg.add(
            SystemRecord::new(Recorder::new("b", &log)).with_update().build(),
            Entity(0),
            &mut ecm,
        )
        .unwrap();

        assert_eq!(run_step(&mut reg, &mut ecm), 0);
        assert_eq!(
            *log.lock(),
            vec!["a:configure", "a:pre", "a:update", "b:update", "a:post"]
        );
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.pre_update_count(), 1);
        assert_eq!(reg.update_count(), 2);
        assert_eq!(reg.post_update_count(), 1);
        assert_eq!(reg.names(), vec!["a", "b"]);
    }

    #[test]
    fn failed_configure_rejects_system() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ecm = EntityComponentManager::new();
        let mut reg = SystemRegistry::new();
        let err = reg
            .add(
                SystemRecord::new(Recorder::new("broken", &log))
                    .with_configure()
                    .with_update()
                    .build(),
                Entity(3),
                &mut ecm,
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::ConfigureFailed { ref name, .. } if name == "broken"));
        assert!(reg.is_empty());
    }

    #[test]
    fn phase_failures_are_counted_not_fatal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ecm = EntityComponentManager::new();
        let mut reg = SystemRegistry::new();
        let mut failing = Recorder::new("flaky", &log);
        failing.fail_update = true;
        reg.add(SystemRecord::new(failing).with_update().build(), Entity(0), &mut ecm)
            .unwrap();
        reg.add(
            SystemRecord::new(Recorder::new("after", &log)).with_update().build(),
            Entity(0),
            &mut ecm,
        )
        .unwrap();

        assert_eq!(run_step(&mut reg, &mut ecm), 1);
        assert_eq!(run_step(&mut reg, &mut ecm), 1);
        // The system after the failing one still ran both times.
        assert_eq!(log.lock().iter().filter(|l| *l == "after:update").count(), 2);
        let timings = reg.timings();
        assert_eq!(timings[0].failures, 2);
        assert_eq!(timings[1].failures, 0);
    }
}
