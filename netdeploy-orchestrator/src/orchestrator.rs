//! Deployment orchestration: inventory + renderer + sessions.
//!
//! ```text
//! load_inventory → validate_templates → deploy
//!                                        │
//!          for each device, ascending priority:
//!            render ──fail──▶ failed(render)
//!              │ dry run ──▶ succeeded, no session
//!            connect ──fail──▶ failed(connect)
//!            deploy_config ──fail──▶ failed(apply)
//!            disconnect
//! ```
//!
//! Only structural problems (nothing loaded, templates never validated,
//! unknown `--device`) are `Err`. Per-device trouble lands in the
//! [`DeploymentResult`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use netdeploy_core::{ConnectionOverrides, Device, DeviceName, Inventory};
use netdeploy_renderer::{Renderer, TemplateValidation};
use netdeploy_session::{Connector, SessionManager};

use crate::error::DeployError;
use crate::result::{DeploymentResult, DeviceResult, FailureStage};
use crate::writer;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Operator-supplied settings, layered between inventory defaults and
/// per-device settings.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub connection: ConnectionOverrides,
}

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub dry_run: bool,
    /// Deploy only this device.
    pub only: Option<String>,
    /// Stop at the first failed device and mark the rest as skipped.
    pub halt_on_failure: bool,
}

/// What `validate_templates` found.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub templates: BTreeMap<String, TemplateValidation>,
    /// Devices whose binding lacks variables their template requires.
    pub missing_variables: BTreeMap<DeviceName, Vec<String>>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.templates.values().all(|t| t.valid) && self.missing_variables.is_empty()
    }
}

/// Result of a connect + disconnect probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reachability {
    pub device: DeviceName,
    pub address: String,
    pub reachable: bool,
    pub error: Option<String>,
    /// Connected, but the session did not close cleanly.
    pub disconnect_error: Option<String>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<C: Connector> {
    renderer: Renderer,
    sessions: SessionManager<C>,
    config: OrchestratorConfig,
    inventory: Option<Inventory>,
    validation: Option<ValidationReport>,
    history: Vec<DeploymentResult>,
}

impl<C: Connector> Orchestrator<C> {
    pub fn new(renderer: Renderer, sessions: SessionManager<C>, config: OrchestratorConfig) -> Self {
        Orchestrator {
            renderer,
            sessions,
            config,
            inventory: None,
            validation: None,
            history: Vec::new(),
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn sessions(&self) -> &SessionManager<C> {
        &self.sessions
    }

    pub fn inventory(&self) -> Option<&Inventory> {
        self.inventory.as_ref()
    }

    /// Load and check the inventory at `path`. Returns the device count.
    pub fn load_inventory(&mut self, path: &Path) -> Result<usize, DeployError> {
        let inventory = Inventory::load_at(path)?;
        self.set_inventory(inventory)
    }

    /// Use an already parsed inventory. Devices must reference templates
    /// that exist in the renderer's directory.
    pub fn set_inventory(&mut self, inventory: Inventory) -> Result<usize, DeployError> {
        let known = self.renderer.list_templates()?;
        inventory.check_templates(&known)?;
        let count = inventory.devices.len();
        tracing::info!(path = %inventory.path.display(), devices = count, "inventory loaded");
        self.inventory = Some(inventory);
        self.validation = None;
        Ok(count)
    }

    /// Parse every template and check each device's binding against its
    /// template's required variables. `Ok(false)` when anything is wrong;
    /// details are in [`Orchestrator::validation_report`].
    pub fn validate_templates(&mut self) -> Result<bool, DeployError> {
        let inventory = self.inventory.as_ref().ok_or(DeployError::InventoryNotLoaded)?;

        let mut report = ValidationReport {
            templates: self.renderer.validate_all()?,
            ..ValidationReport::default()
        };
        for (name, validation) in &report.templates {
            if !validation.valid {
                tracing::warn!(template = %name, errors = ?validation.errors, "template invalid");
            }
        }

        for device in &inventory.devices {
            let template = self.renderer.template(&device.template)?;
            let missing = template.variables.missing(&inventory.binding(device));
            if !missing.is_empty() {
                tracing::warn!(device = %device.name, template = %device.template, ?missing, "missing variables");
                report.missing_variables.insert(device.name.clone(), missing);
            }
        }

        let ok = report.is_ok();
        tracing::info!(ok, templates = report.templates.len(), "templates validated");
        self.validation = Some(report);
        Ok(ok)
    }

    pub fn validation_report(&self) -> Option<&ValidationReport> {
        self.validation.as_ref()
    }

    /// Devices in deployment order.
    pub fn get_devices(&self) -> Result<Vec<Device>, DeployError> {
        Ok(self.loaded()?.deployment_order())
    }

    /// Render one device's configuration.
    pub fn render_device(&self, name: &str) -> Result<String, DeployError> {
        let inventory = self.loaded()?;
        let device = inventory
            .device(name)
            .ok_or_else(|| DeployError::UnknownDevice(name.to_string()))?;
        Ok(self.renderer.render(&device.template, &inventory.binding(device))?)
    }

    /// Deploy every device, continuing past failures.
    pub fn deploy_all_devices(&mut self, dry_run: bool) -> Result<DeploymentResult, DeployError> {
        self.deploy(&DeployOptions {
            dry_run,
            ..DeployOptions::default()
        })
    }

    pub fn deploy(&mut self, options: &DeployOptions) -> Result<DeploymentResult, DeployError> {
        let inventory = self.loaded()?.clone();
        if self.validation.is_none() {
            return Err(DeployError::TemplatesNotValidated);
        }
        let devices = select(&inventory, options.only.as_deref())?;

        let started = Instant::now();
        let mut run = DeploymentResult::new(options.dry_run);
        tracing::info!(
            devices = devices.len(),
            dry_run = options.dry_run,
            halt_on_failure = options.halt_on_failure,
            "deployment started"
        );

        let mut halted = false;
        for device in &devices {
            if halted {
                tracing::info!(device = %device.name, "skipped after earlier failure");
                run.skipped.push(device.name.clone());
                continue;
            }
            let result = self.deploy_device(&inventory, device, options.dry_run);
            if !result.success && options.halt_on_failure {
                halted = true;
            }
            run.record(result);
        }

        run.finish(started.elapsed());
        tracing::info!(
            success = run.success,
            elapsed = ?run.elapsed,
            "{}",
            run.summary()
        );
        self.history.push(run.clone());
        Ok(run)
    }

    /// Connect to and disconnect from each device without changing anything.
    pub fn test_connectivity(&mut self, only: Option<&str>) -> Result<Vec<Reachability>, DeployError> {
        let inventory = self.loaded()?.clone();
        let devices = select(&inventory, only)?;

        let mut out = Vec::with_capacity(devices.len());
        for device in devices {
            let started = Instant::now();
            let name = device.name.as_str();
            let config = inventory.connection_config(&device, &self.config.connection);
            let reachable = self.sessions.connect(name, &device.address, &config);
            let (error, disconnect_error) = if reachable {
                (None, self.close_session(name))
            } else {
                (self.sessions.last_error(name).map(str::to_string), None)
            };
            out.push(Reachability {
                device: device.name.clone(),
                address: device.address.clone(),
                reachable,
                error,
                disconnect_error,
                elapsed: started.elapsed(),
            });
        }
        Ok(out)
    }

    /// Every run made through this orchestrator, oldest first.
    pub fn history(&self) -> &[DeploymentResult] {
        &self.history
    }

    /// Disconnect `name`; the close failure, if there was one.
    fn close_session(&mut self, name: &str) -> Option<String> {
        if self.sessions.disconnect(name) {
            return None;
        }
        Some(
            self.sessions
                .last_error(name)
                .unwrap_or("session did not close cleanly")
                .to_string(),
        )
    }

    fn loaded(&self) -> Result<&Inventory, DeployError> {
        self.inventory.as_ref().ok_or(DeployError::InventoryNotLoaded)
    }

    fn deploy_device(&mut self, inventory: &Inventory, device: &Device, dry_run: bool) -> DeviceResult {
        let started = Instant::now();
        let name = device.name.as_str();
        tracing::info!(device = name, priority = device.priority, template = %device.template, dry_run, "deploying");

        let config = match self.renderer.render(&device.template, &inventory.binding(device)) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(device = name, error = %err, "render failed");
                return DeviceResult::failed(device, FailureStage::Render, err.to_string(), started.elapsed());
            }
        };
        let digest = writer::digest(&config);

        if dry_run {
            return DeviceResult::succeeded(device, &config, digest, started.elapsed());
        }

        let connection = inventory.connection_config(device, &self.config.connection);
        if !self.sessions.connect(name, &device.address, &connection) {
            let reason = self
                .sessions
                .last_error(name)
                .unwrap_or("connection failed")
                .to_string();
            return DeviceResult::failed(device, FailureStage::Connect, reason, started.elapsed())
                .with_rendered(&config, digest);
        }

        let applied = match self.sessions.deploy_config(name, &config) {
            Ok(true) => Ok(()),
            Ok(false) => Err(self
                .sessions
                .last_error(name)
                .unwrap_or("configuration was not applied")
                .to_string()),
            Err(err) => Err(err.to_string()),
        };
        let disconnect_error = self.close_session(name);

        let result = match applied {
            Ok(()) => DeviceResult::succeeded(device, &config, digest, started.elapsed()),
            Err(reason) => {
                tracing::warn!(device = name, error = %reason, "apply failed");
                DeviceResult::failed(device, FailureStage::Apply, reason, started.elapsed())
                    .with_rendered(&config, digest)
            }
        };
        result.with_disconnect_error(disconnect_error)
    }
}

/// Devices in deployment order, optionally narrowed to one.
fn select(inventory: &Inventory, only: Option<&str>) -> Result<Vec<Device>, DeployError> {
    let ordered = inventory.deployment_order();
    match only {
        None => Ok(ordered),
        Some(name) => {
            let picked: Vec<Device> = ordered.into_iter().filter(|d| d.name.as_str() == name).collect();
            if picked.is_empty() {
                Err(DeployError::UnknownDevice(name.to_string()))
            } else {
                Ok(picked)
            }
        }
    }
}
