//! Disk copy - copies compute disks from a source project to a destination
//! project, one disk per worker.
//!
//! The cloud API sits behind [`ComputeProvider`]; this module only decides
//! what to copy, fans the copies out and judges the result.

use crate::config::ModuleConfig;
use crate::context::ModuleContext;
use crate::registry::Module;
use std::sync::Arc;
use thiserror::Error;
use timewolf_core::{
    AttributeContainer, ContainerHandle, ContainerKind, GceDisk, ModuleError, ModuleResult,
    TransportError,
};
use tracing::{debug, info};

const STOP_KEY: &str = "instances_to_stop";

/// Failures reported by a compute provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Creation(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<ProviderError> for ModuleError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => ModuleError::not_found(msg),
            ProviderError::Creation(msg) => ModuleError::creation(msg),
            ProviderError::Transport(t) => t.classify(),
        }
    }
}

/// Compute API used by [`DiskCopy`].
#[async_trait::async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Fails with `NotFound` when the instance does not exist.
    async fn get_instance(&self, project: &str, zone: &str, name: &str) -> Result<(), ProviderError>;

    async fn boot_disk(&self, project: &str, zone: &str, instance: &str) -> Result<String, ProviderError>;

    /// Every disk attached to the instance, boot disk included.
    async fn list_disks(
        &self,
        project: &str,
        zone: &str,
        instance: &str,
    ) -> Result<Vec<String>, ProviderError>;

    /// Copies `disk` and returns the name of the copy.
    async fn copy_disk(
        &self,
        source_project: &str,
        destination_project: &str,
        zone: &str,
        disk: &str,
    ) -> Result<String, ProviderError>;

    async fn stop_instance(&self, project: &str, zone: &str, instance: &str) -> Result<(), ProviderError>;
}

pub struct DiskCopy {
    provider: Arc<dyn ComputeProvider>,
    source_project: String,
    destination_project: String,
    zone: String,
    instance_names: Vec<String>,
    disk_names: Vec<String>,
    all_disks: bool,
    stop_instances: bool,
}

impl DiskCopy {
    pub fn new(provider: Arc<dyn ComputeProvider>) -> Self {
        Self {
            provider,
            source_project: String::new(),
            destination_project: String::new(),
            zone: String::new(),
            instance_names: Vec::new(),
            disk_names: Vec::new(),
            all_disks: false,
            stop_instances: false,
        }
    }

    pub fn source_project(&self) -> &str {
        &self.source_project
    }

    pub fn destination_project(&self) -> &str {
        &self.destination_project
    }

    pub fn instance_names(&self) -> &[String] {
        &self.instance_names
    }

    pub fn disk_names(&self) -> &[String] {
        &self.disk_names
    }

    pub fn all_disks(&self) -> bool {
        self.all_disks
    }

    pub fn stop_instances(&self) -> bool {
        self.stop_instances
    }

    /// Disks to copy from an instance already known to exist.
    async fn disks_from_instance(&self, instance: &str) -> Result<Vec<String>, ProviderError> {
        if self.all_disks {
            self.provider
                .list_disks(&self.source_project, &self.zone, instance)
                .await
        } else {
            let boot = self
                .provider
                .boot_disk(&self.source_project, &self.zone, instance)
                .await?;
            Ok(vec![boot])
        }
    }
}

#[async_trait::async_trait]
impl Module for DiskCopy {
    fn name(&self) -> &str {
        "DiskCopy"
    }

    fn description(&self) -> &str {
        "Copy compute disks into an analysis project."
    }

    fn set_up(&mut self, config: &ModuleConfig) -> ModuleResult<()> {
        let instance_names = config.list("remote_instance_names");
        let disk_names = config.list("disk_names");
        let stop_instances = config.bool_or("stop_instances", false);

        if instance_names.is_empty() && disk_names.is_empty() {
            return Err(ModuleError::configuration(
                "You need to specify at least an instance name or disks to copy",
            ));
        }
        if stop_instances && instance_names.is_empty() {
            return Err(ModuleError::configuration(
                "You need to specify an instance name to stop the instance",
            ));
        }

        let source_project = config.required_str("source_project")?;
        self.destination_project = config
            .optional_str("destination_project")
            .unwrap_or_else(|| source_project.clone());
        self.source_project = source_project;
        self.zone = config.optional_str("zone").unwrap_or_default();
        self.instance_names = instance_names;
        self.disk_names = disk_names;
        self.all_disks = config.bool_or("all_disks", false);
        self.stop_instances = stop_instances;
        Ok(())
    }

    async fn pre_process(&self, ctx: &ModuleContext) -> ModuleResult<()> {
        let mut to_copy: Vec<String> = self.disk_names.clone();
        let mut found_instances: Vec<String> = Vec::new();

        for instance in &self.instance_names {
            match self
                .provider
                .get_instance(&self.source_project, &self.zone, instance)
                .await
            {
                Ok(()) => {}
                Err(ProviderError::NotFound(_)) => {
                    ctx.publish_message(
                        &format!(
                            "Instance \"{}\" in {} not found or insufficient permissions",
                            instance, self.source_project
                        ),
                        true,
                    );
                    continue;
                }
                Err(err) => return Err(ModuleError::from(err).fatal()),
            }

            let disks = self
                .disks_from_instance(instance)
                .await
                .map_err(|e| ModuleError::from(e).fatal())?;
            debug!(instance = %instance, disks = disks.len(), "instance disks found");
            found_instances.push(instance.clone());
            to_copy.extend(disks);
        }

        if !self.instance_names.is_empty() && found_instances.is_empty() && self.disk_names.is_empty() {
            return Err(ModuleError::not_found("No instances found with disks to copy.").fatal());
        }

        let mut seen = std::collections::HashSet::new();
        for disk in to_copy.into_iter().filter(|d| seen.insert(d.clone())) {
            ctx.add_container(AttributeContainer::new(GceDisk::new(disk, self.source_project.clone())));
        }
        ctx.remember(STOP_KEY, &found_instances);
        Ok(())
    }

    fn thread_on(&self) -> Option<&str> {
        Some(GceDisk::TYPE_TAG)
    }

    async fn process(&self, ctx: &ModuleContext, item: Option<ContainerHandle>) -> ModuleResult<()> {
        let disk = item
            .and_then(|h| h.with::<GceDisk, _>(Clone::clone))
            .ok_or_else(|| ModuleError::internal("DiskCopy expects a gcedisk container"))?;

        let copy_name = self
            .provider
            .copy_disk(&disk.project, &self.destination_project, &self.zone, &disk.name)
            .await?;

        ctx.add_container(AttributeContainer::new(GceDisk::new(
            copy_name.clone(),
            self.destination_project.clone(),
        )));
        ctx.publish_message(
            &format!("Disk {} successfully copied to {}", disk.name, copy_name),
            false,
        );
        Ok(())
    }

    async fn post_process(&self, ctx: &ModuleContext) -> ModuleResult<()> {
        if !ctx.outcome().any_succeeded() {
            return Err(ModuleError::aggregate("No successful disk copy operations completed."));
        }

        if self.stop_instances {
            let instances: Vec<String> = ctx.recall(STOP_KEY).unwrap_or_default();
            for instance in instances {
                self.provider
                    .stop_instance(&self.source_project, &self.zone, &instance)
                    .await
                    .map_err(|e| ModuleError::from(e).fatal())?;
                info!(instance = %instance, "instance stopped");
                ctx.publish_message(&format!("Stopped instance {}", instance), false);
            }
        }
        Ok(())
    }
}
