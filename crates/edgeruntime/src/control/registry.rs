use super::interface::{ControlArgs, ControlInterface, ParamType};
use edgecore::{Result, RuntimeError};
use futures::future::BoxFuture;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Type-erased view of a registered control, used by the dispatcher.
pub(crate) trait RegisteredControl: Send + Sync {
    /// Parameter types of the operation matching `name` and `arity`.
    fn signature(&self, name: &str, arity: usize) -> Option<Vec<ParamType>>;

    fn invoke(&self, name: &str, args: ControlArgs) -> Option<BoxFuture<'static, Result<()>>>;

    fn as_any(&self) -> &dyn Any;
}

struct ControlEntry<T: ?Sized> {
    interface: ControlInterface<T>,
    control: Arc<T>,
}

impl<T: ?Sized + Send + Sync + 'static> RegisteredControl for ControlEntry<T> {
    fn signature(&self, name: &str, arity: usize) -> Option<Vec<ParamType>> {
        self.interface
            .find(name, arity)
            .map(|op| op.params().to_vec())
    }

    fn invoke(&self, name: &str, args: ControlArgs) -> Option<BoxFuture<'static, Result<()>>> {
        let op = self.interface.find(name, args.len())?;
        Some((op.invoke)(self.control.clone(), args))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Directory of control objects addressed by `type:alias` (or `type:id`
/// when registered without an alias).
///
/// All operations share one lock; control traffic is low volume.
pub struct ControlRegistry {
    controls: Mutex<HashMap<String, Arc<dyn RegisteredControl>>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self {
            controls: Mutex::new(HashMap::new()),
        }
    }

    /// Key a control is stored under.
    pub fn control_id(control_type: &str, id: &str, alias: Option<&str>) -> String {
        format!("{}:{}", control_type, alias.unwrap_or(id))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn RegisteredControl>>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.controls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `control` and return its control id.
    pub fn register_control<T>(
        &self,
        control_type: &str,
        id: &str,
        alias: Option<&str>,
        interface: ControlInterface<T>,
        control: Arc<T>,
    ) -> Result<String>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        interface.validate()?;

        let control_id = Self::control_id(control_type, id, alias);
        let mut controls = self.lock();
        if controls.contains_key(&control_id) {
            return Err(RuntimeError::DuplicateControl(control_id));
        }

        tracing::info!("Registering control: {} ({})", control_id, interface.name());
        controls.insert(
            control_id.clone(),
            Arc::new(ControlEntry { interface, control }),
        );
        Ok(control_id)
    }

    /// Remove a control; removing an unknown id does nothing.
    pub fn unregister(&self, control_id: &str) {
        if self.lock().remove(control_id).is_some() {
            tracing::info!("Unregistered control: {}", control_id);
        }
    }

    /// Control registered under `type:alias` with exactly `expected` as its
    /// interface: same name and same operation signatures.
    pub fn get_control<T>(
        &self,
        control_type: &str,
        alias: &str,
        expected: &ControlInterface<T>,
    ) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let entry = self.resolve(control_type, alias)?;
        let entry = entry.as_any().downcast_ref::<ControlEntry<T>>()?;
        entry
            .interface
            .same_signatures(expected)
            .then(|| entry.control.clone())
    }

    pub fn contains(&self, control_id: &str) -> bool {
        self.lock().contains_key(control_id)
    }

    pub fn control_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Entry addressed by alias. The lock is released before returning so
    /// invoking the control cannot deadlock against registration.
    pub(crate) fn resolve(&self, control_type: &str, alias: &str) -> Option<Arc<dyn RegisteredControl>> {
        let control_id = Self::control_id(control_type, "", Some(alias));
        self.lock().get(&control_id).cloned()
    }
}

impl Default for ControlRegistry {
    fn default() -> Self {
        Self::new()
    }
}
