//! Report exporter - writes every `report` container to a local directory

use crate::config::ModuleConfig;
use crate::context::ModuleContext;
use crate::registry::Module;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use timewolf_core::{
    AttributeContainer, ContainerHandle, ContainerKind, File, ModuleError, ModuleResult, Report,
};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const MAX_COLLISIONS: usize = 1000;

#[derive(Default)]
pub struct LocalReportExporter {
    output_dir: PathBuf,
}

impl LocalReportExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// `module_name` reduced to characters safe in a file name.
fn file_stem(module_name: &str) -> String {
    let stem: String = module_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "report".to_string()
    } else {
        stem
    }
}

/// Creates `<dir>/<stem>.<ext>`, or `<stem>-N.<ext>` when taken.
async fn create_unique(dir: &Path, stem: &str, ext: &str) -> std::io::Result<(PathBuf, fs::File)> {
    for n in 0..MAX_COLLISIONS {
        let name = if n == 0 {
            format!("{}.{}", stem, ext)
        } else {
            format!("{}-{}.{}", stem, n, ext)
        };
        let path = dir.join(name);
        match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(std::io::Error::new(
        IoErrorKind::AlreadyExists,
        format!("no free file name for {} in {}", stem, dir.display()),
    ))
}

#[async_trait::async_trait]
impl Module for LocalReportExporter {
    fn name(&self) -> &str {
        "LocalReportExporter"
    }

    fn description(&self) -> &str {
        "Write report containers to files in a local directory."
    }

    fn set_up(&mut self, config: &ModuleConfig) -> ModuleResult<()> {
        self.output_dir = PathBuf::from(config.required_str("output_dir")?);
        Ok(())
    }

    async fn pre_process(&self, _ctx: &ModuleContext) -> ModuleResult<()> {
        fs::create_dir_all(&self.output_dir).await.map_err(|e| {
            ModuleError::creation(format!(
                "Failed to create {}: {}",
                self.output_dir.display(),
                e
            ))
            .fatal()
        })
    }

    fn thread_on(&self) -> Option<&str> {
        Some(Report::TYPE_TAG)
    }

    async fn process(&self, ctx: &ModuleContext, item: Option<ContainerHandle>) -> ModuleResult<()> {
        let report = item
            .and_then(|h| h.with::<Report, _>(Clone::clone))
            .ok_or_else(|| ModuleError::internal("LocalReportExporter expects a report container"))?;

        let stem = file_stem(&report.module_name);
        let (path, mut file) = create_unique(&self.output_dir, &stem, report.text_format.extension())
            .await
            .map_err(|e| ModuleError::creation(format!("Failed to create report file: {}", e)))?;
        file.write_all(report.text.as_bytes())
            .await
            .map_err(|e| ModuleError::creation(format!("Failed to write {}: {}", path.display(), e)))?;
        file.flush()
            .await
            .map_err(|e| ModuleError::creation(format!("Failed to write {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), bytes = report.text.len(), "report written");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ctx.add_container(AttributeContainer::new(
            File::new(name, path.display().to_string())
                .with_description(format!("{} report", report.module_name)),
        ));
        ctx.publish_message(&format!("Wrote report to {}", path.display()), false);
        Ok(())
    }

    async fn post_process(&self, ctx: &ModuleContext) -> ModuleResult<()> {
        if ctx.outcome().all_failed() {
            return Err(ModuleError::aggregate("No reports could be written."));
        }
        Ok(())
    }
}
