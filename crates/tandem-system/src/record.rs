//! [`SystemRecord`]: optional phase handles over one shared instance.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::system::{Configure, PostUpdate, PreUpdate, System, Update};

/// Registration record for one system.
///
/// Each phase handle is `None` unless the builder opted into it, and the
/// registry skips absent phases. All present handles point at the same
/// instance, so state set in `configure` is visible in `update`.
pub struct SystemRecord {
    name: String,
    pub(crate) configure: Option<Arc<Mutex<dyn Configure>>>,
    pub(crate) pre_update: Option<Arc<Mutex<dyn PreUpdate>>>,
    pub(crate) update: Option<Arc<Mutex<dyn Update>>>,
    pub(crate) post_update: Option<Arc<Mutex<dyn PostUpdate>>>,
}

impl SystemRecord {
    /// Start building a record that takes ownership of `system`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new<S: System>(system: S) -> SystemBuilder<S> {
        Self::from_shared(Arc::new(Mutex::new(system)))
    }

    /// Start building a record over an instance the caller keeps a handle to.
    pub fn from_shared<S: System>(shared: Arc<Mutex<S>>) -> SystemBuilder<S> {
        let name = shared.lock().name().to_owned();
        SystemBuilder {
            shared,
            record: SystemRecord {
                name,
                configure: None,
                pre_update: None,
                update: None,
                post_update: None,
            },
        }
    }

    /// The system's name, captured at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the record carries a configure handle.
    pub fn has_configure(&self) -> bool {
        self.configure.is_some()
    }

    /// Whether the record carries a pre-update handle.
    pub fn has_pre_update(&self) -> bool {
        self.pre_update.is_some()
    }

    /// Whether the record carries an update handle.
    pub fn has_update(&self) -> bool {
        self.update.is_some()
    }

    /// Whether the record carries a post-update handle.
    pub fn has_post_update(&self) -> bool {
        self.post_update.is_some()
    }
}

impl fmt::Debug for SystemRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemRecord")
            .field("name", &self.name)
            .field("configure", &self.has_configure())
            .field("pre_update", &self.has_pre_update())
            .field("update", &self.has_update())
            .field("post_update", &self.has_post_update())
            .finish()
    }
}

/// Builder returned by [`SystemRecord::new`].
///
/// Each `with_*` method is only available when `S` implements that phase.
pub struct SystemBuilder<S> {
    shared: Arc<Mutex<S>>,
    record: SystemRecord,
}

impl<S: System> SystemBuilder<S> {
    /// Enable the configure phase.
    pub fn with_configure(mut self) -> Self
    where
        S: Configure,
    {
        let handle: Arc<Mutex<dyn Configure>> = self.shared.clone();
        self.record.configure = Some(handle);
        self
    }

    /// Enable the pre-update phase.
    pub fn with_pre_update(mut self) -> Self
    where
        S: PreUpdate,
    {
        let handle: Arc<Mutex<dyn PreUpdate>> = self.shared.clone();
        self.record.pre_update = Some(handle);
        self
    }

    /// Enable the update phase.
    pub fn with_update(mut self) -> Self
    where
        S: Update,
    {
        let handle: Arc<Mutex<dyn Update>> = self.shared.clone();
        self.record.update = Some(handle);
        self
    }

    /// Enable the post-update phase.
    pub fn with_post_update(mut self) -> Self
    where
        S: PostUpdate,
    {
        let handle: Arc<Mutex<dyn PostUpdate>> = self.shared.clone();
        self.record.post_update = Some(handle);
        self
    }

    /// Finish the record.
    pub fn build(self) -> SystemRecord {
        self.record
    }
}

impl<S: System> From<SystemBuilder<S>> for SystemRecord {
    fn from(builder: SystemBuilder<S>) -> Self {
        builder.build()
    }
}
