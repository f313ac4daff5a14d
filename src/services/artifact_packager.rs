//! Flashable archive packaging.
//!
//! A flashable zip is the template skeleton (for example an AnyKernel3 checkout)
//! with the freshly built kernel image dropped in under a fixed name. The skeleton
//! is populated in a temporary directory so the template itself is never touched.

use anyhow::{bail, Context};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::{Artifact, ArtifactsConfig};

const ARCHIVE_PREFIX: &str = "kernel-flashable-";
const ARCHIVE_EXTENSION: &str = ".zip";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M";
/// `_` + `YYYYMMDD_HHMM`
const STAMP_SUFFIX_LEN: usize = 14;
const UNKNOWN_KERNEL: &str = "unknown";

/// Builds flashable archives and looks them up afterwards.
#[derive(Debug, Clone)]
pub struct ArtifactPackager {
    config: ArtifactsConfig,
    base_dir: PathBuf,
}

impl ArtifactPackager {
    /// `base_dir` is the build's working directory; relative image paths announced
    /// by the build (and the fallback image) are resolved against it.
    pub fn new(config: ArtifactsConfig, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            base_dir: base_dir.into(),
        }
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.config.dir
    }

    /// Package the kernel image into `kernel-flashable-{name}_{YYYYMMDD_HHMM}.zip`.
    ///
    /// Uses `image_path` when it names an existing file and the configured fallback
    /// image otherwise. Every failure comes back as [`BuildError::Packaging`].
    pub async fn pack(
        &self,
        kernel_name: Option<&str>,
        image_path: Option<&str>,
    ) -> BuildResult<Artifact> {
        let packager = self.clone();
        let kernel_name = sanitize_kernel_name(kernel_name);
        let image_path = image_path.map(PathBuf::from);
        let now = Local::now();

        tokio::task::spawn_blocking(move || {
            packager.pack_blocking(&kernel_name, image_path.as_deref(), now)
        })
        .await
        .map_err(|e| BuildError::Packaging(format!("packaging task failed: {e}")))?
        .map_err(|e| BuildError::Packaging(format!("{e:#}")))
    }

    fn pack_blocking(
        &self,
        kernel_name: &str,
        image_path: Option<&Path>,
        now: DateTime<Local>,
    ) -> anyhow::Result<Artifact> {
        let image = self.resolve_image(image_path)?;

        let template = &self.config.template_dir;
        if !template.is_dir() {
            bail!("template directory {} not found", template.display());
        }

        let work = tempfile::tempdir().context("failed to create temporary directory")?;
        let skeleton = work.path().join("skeleton");
        copy_tree(template, &skeleton)
            .with_context(|| format!("failed to copy template {}", template.display()))?;

        let target = skeleton.join(&self.config.image_file_name);
        fs::copy(&image, &target).with_context(|| {
            format!(
                "failed to copy kernel image {} into the template",
                image.display()
            )
        })?;

        fs::create_dir_all(&self.config.dir).with_context(|| {
            format!(
                "failed to create artifacts directory {}",
                self.config.dir.display()
            )
        })?;

        let (name, archive_path, file) = self.create_archive(kernel_name, now)?;
        if let Err(e) = write_zip(&skeleton, file) {
            let _ = fs::remove_file(&archive_path);
            return Err(e.context(format!("failed to write archive {}", archive_path.display())));
        }

        let size_bytes = fs::metadata(&archive_path)
            .with_context(|| format!("archive {} missing after write", archive_path.display()))?
            .len();

        info!(
            archive = %archive_path.display(),
            size_bytes,
            image = %image.display(),
            "packaged flashable archive"
        );

        Ok(Artifact {
            name,
            path: archive_path,
            size_bytes,
            kernel_name: kernel_name.to_string(),
            created_at: now,
        })
    }

    /// Claim a fresh archive file. Names carry minute resolution, so while one is
    /// taken the stamp moves forward a minute; existing archives are never overwritten.
    fn create_archive(
        &self,
        kernel_name: &str,
        now: DateTime<Local>,
    ) -> anyhow::Result<(String, PathBuf, File)> {
        let mut stamp = now;
        loop {
            let name = format!(
                "{ARCHIVE_PREFIX}{kernel_name}_{}{ARCHIVE_EXTENSION}",
                stamp.format(STAMP_FORMAT)
            );
            let path = self.config.dir.join(&name);
            match File::create_new(&path) {
                Ok(file) => return Ok((name, path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    stamp += chrono::Duration::minutes(1);
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to create archive {}", path.display()))
                }
            }
        }
    }

    fn resolve_image(&self, announced: Option<&Path>) -> anyhow::Result<PathBuf> {
        if let Some(path) = announced {
            let candidate = self.base_dir.join(path);
            if candidate.is_file() {
                return Ok(candidate);
            }
            warn!(
                image = %candidate.display(),
                "announced kernel image not found, using fallback"
            );
        }

        let fallback = self.base_dir.join(&self.config.fallback_image);
        if fallback.is_file() {
            Ok(fallback)
        } else {
            bail!(
                "kernel image not found (fallback {} does not exist)",
                fallback.display()
            )
        }
    }

    /// Archives whose file name contains `filter`, newest first.
    pub async fn list_archives(&self, filter: Option<&str>) -> BuildResult<Vec<Artifact>> {
        let dir = self.config.dir.clone();
        let filter = filter.map(str::to_string);

        tokio::task::spawn_blocking(move || list_archives_blocking(&dir, filter.as_deref()))
            .await
            .map_err(|e| BuildError::Packaging(format!("archive listing task failed: {e}")))?
            .map_err(BuildError::LogIo)
    }
}

/// Restrict a kernel name to characters that are safe in a file name.
fn sanitize_kernel_name(name: Option<&str>) -> String {
    let cleaned: String = name
        .unwrap_or_default()
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        UNKNOWN_KERNEL.to_string()
    } else {
        cleaned
    }
}

fn copy_tree(src: &Path, dst: &Path) -> anyhow::Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src)?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Zip everything under `root`, with entry names relative to `root`.
fn write_zip(root: &Path, file: File) -> anyhow::Result<()> {
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let base_options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(root)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), base_options)?;
        } else {
            #[allow(unused_mut)]
            let mut options = base_options;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = entry.metadata()?.permissions().mode();
                options = options.unix_permissions(mode);
            }
            zip.start_file(name, options)?;
            let mut source = File::open(entry.path())?;
            io::copy(&mut source, &mut zip)?;
        }
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    Ok(())
}

fn list_archives_blocking(dir: &Path, filter: Option<&str>) -> io::Result<Vec<Artifact>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }

    let mut archives = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let Some(stem) = name
            .strip_prefix(ARCHIVE_PREFIX)
            .and_then(|rest| rest.strip_suffix(ARCHIVE_EXTENSION))
        else {
            continue;
        };
        if filter.is_some_and(|f| !name.contains(f)) {
            continue;
        }

        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        let (kernel_name, stamped) = split_stamp(stem);
        let created_at = stamped
            .or_else(|| metadata.modified().ok().map(DateTime::<Local>::from))
            .unwrap_or_else(Local::now);

        archives.push(Artifact {
            kernel_name: kernel_name.to_string(),
            name,
            path: entry.path(),
            size_bytes: metadata.len(),
            created_at,
        });
    }

    archives.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.name.cmp(&a.name))
    });
    Ok(archives)
}

/// Split `{kernel}_{YYYYMMDD_HHMM}` into the kernel name and its timestamp.
fn split_stamp(stem: &str) -> (&str, Option<DateTime<Local>>) {
    if stem.len() > STAMP_SUFFIX_LEN && stem.is_char_boundary(stem.len() - STAMP_SUFFIX_LEN) {
        let (kernel, suffix) = stem.split_at(stem.len() - STAMP_SUFFIX_LEN);
        if let Some(stamp) = suffix.strip_prefix('_') {
            if let Ok(naive) = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT) {
                return (kernel, Local.from_local_datetime(&naive).single());
            }
        }
    }
    (stem, None)
}
