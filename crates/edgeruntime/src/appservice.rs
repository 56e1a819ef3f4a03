use crate::control::{ControlInterface, ControlRegistry, ParamType};
use crate::runtime::DirectProvider;
use crate::topology::{Submitter, Topology, TopologyProvider};
use edgecore::{configs, JsonObject, Result, RuntimeError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Control type the application service registers under.
pub const APPLICATION_SERVICE_TYPE: &str = "appService";

/// Fills in a fresh topology for an application, given its submission
/// configuration. The builder may amend the configuration, e.g. to name the
/// job.
pub type TopologyBuilder = Arc<dyn Fn(&mut Topology, &mut JsonObject) + Send + Sync>;

/// Registry of named applications that can be submitted remotely.
///
/// Registered applications are submitted through the `submit` control
/// operation, e.g.
/// `{"type": "appService", "alias": <alias>, "op": "submit", "args": [<name>, <config>]}`.
/// Without a control registry the service is effectively inactive.
pub struct ApplicationService {
    applications: Mutex<HashMap<String, TopologyBuilder>>,
    provider: Arc<dyn TopologyProvider>,
    submitter: Arc<dyn Submitter>,
    control_id: Option<String>,
}

impl ApplicationService {
    pub fn new(
        provider: Arc<dyn TopologyProvider>,
        submitter: Arc<dyn Submitter>,
        controls: Option<&Arc<ControlRegistry>>,
        alias: &str,
    ) -> Result<Arc<Self>> {
        let id = format!("{}_{}", alias, Uuid::new_v4());
        let control_id = controls
            .map(|_| ControlRegistry::control_id(APPLICATION_SERVICE_TYPE, &id, Some(alias)));

        let service = Arc::new(Self {
            applications: Mutex::new(HashMap::new()),
            provider,
            submitter,
            control_id,
        });

        if let Some(controls) = controls {
            controls.register_control(
                APPLICATION_SERVICE_TYPE,
                &id,
                Some(alias),
                Self::control_interface(),
                service.clone(),
            )?;
        }
        Ok(service)
    }

    /// Create the application service for `provider` under the alias from
    /// its configuration.
    pub fn create_and_register(provider: &Arc<DirectProvider>) -> Result<Arc<Self>> {
        let alias = provider.config().application_alias.clone();
        let controls = provider.services().controls.clone();
        Self::new(
            provider.clone(),
            provider.clone(),
            controls.as_ref(),
            &alias,
        )
    }

    /// Operations remote callers may invoke on the service.
    pub fn control_interface() -> ControlInterface<ApplicationService> {
        ControlInterface::new("ApplicationServiceControl").operation(
            "submit",
            [ParamType::String, ParamType::String],
            |service: Arc<ApplicationService>, args| async move {
                service.submit(args.string(0)?, args.string(1)?).await
            },
        )
    }

    pub fn control_id(&self) -> Option<&str> {
        self.control_id.as_deref()
    }

    /// Register `builder` under `name`, replacing any previous builder.
    pub fn register_topology<F>(&self, name: impl Into<String>, builder: F)
    where
        F: Fn(&mut Topology, &mut JsonObject) + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::info!("Registering application: {}", name);
        self.lock().insert(name, Arc::new(builder));
    }

    pub fn application_names(&self) -> HashSet<String> {
        self.lock().keys().cloned().collect()
    }

    /// Build and submit a new instance of application `name`.
    ///
    /// An unknown application is ignored. `json_config` may be empty; unless
    /// it or the builder sets one, the job name is the application name.
    pub async fn submit(&self, name: &str, json_config: &str) -> Result<()> {
        let Some(builder) = self.lock().get(name).cloned() else {
            tracing::debug!("No application registered as {}", name);
            return Ok(());
        };

        let mut config = parse_config(json_config)?;

        let mut topology = self.provider.new_topology(name);
        builder(&mut topology, &mut config);

        if !config.contains_key(configs::JOB_NAME) {
            config.insert(configs::JOB_NAME.to_string(), Value::String(name.to_string()));
        }

        tracing::info!("Submitting application {} ({} stages)", name, topology.stage_count());
        let job = self.submitter.submit(topology, config).await?;
        tracing::info!("Application {} running as job {}", name, job.id());
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TopologyBuilder>> {
        self.applications.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_config(json_config: &str) -> Result<JsonObject> {
    if json_config.trim().is_empty() {
        return Ok(JsonObject::new());
    }
    match serde_json::from_str(json_config)? {
        Value::Object(config) => Ok(config),
        other => Err(RuntimeError::InvalidArgument(format!(
            "application config must be a JSON object, got {}",
            other
        ))),
    }
}
