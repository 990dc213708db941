//! Filesystem collector - turns local paths into `fspath` containers

use crate::config::ModuleConfig;
use crate::context::ModuleContext;
use crate::registry::Module;
use timewolf_core::{AttributeContainer, ContainerHandle, FsPath, ModuleError, ModuleResult};
use tokio::fs;
use tracing::debug;

#[derive(Default)]
pub struct FilesystemCollector {
    paths: Vec<String>,
}

impl FilesystemCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

#[async_trait::async_trait]
impl Module for FilesystemCollector {
    fn name(&self) -> &str {
        "FilesystemCollector"
    }

    fn description(&self) -> &str {
        "Collect local paths that exist and hand them to later modules."
    }

    fn set_up(&mut self, config: &ModuleConfig) -> ModuleResult<()> {
        let paths = config.list("paths");
        if paths.is_empty() {
            return Err(ModuleError::configuration("You need to specify at least one path"));
        }
        self.paths = paths;
        Ok(())
    }

    async fn process(&self, ctx: &ModuleContext, _item: Option<ContainerHandle>) -> ModuleResult<()> {
        let mut collected = 0;
        for path in &self.paths {
            match fs::try_exists(path).await {
                Ok(true) => {
                    debug!(path = %path, "collected");
                    ctx.add_container(AttributeContainer::new(FsPath::new(path.clone())));
                    collected += 1;
                }
                _ => ctx.publish_message(&format!("Path {} does not exist", path), true),
            }
        }
        if collected == 0 {
            return Err(ModuleError::aggregate("No valid paths collected, bailing"));
        }
        Ok(())
    }
}
