//! Batch processing of class files and directory trees

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::classfile::{ClassFile, ClassReport};
use crate::config::Config;
use crate::error::{Error, Result};

const CLASS_EXTENSION: &str = "class";

/// Totals for one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Class files written with at least one rewritten method
    pub files_optimized: usize,
    /// Class files copied as read: unchanged, excluded or not optimizable
    pub files_copied: usize,
    /// Class files that could not be read or parsed; copied as read
    pub files_failed: usize,
    pub methods_changed: usize,
}

/// Optimize one class held in memory.
///
/// Returns the rewritten bytes, or the input bytes unchanged when no method
/// body changed.
pub fn optimize_class_bytes(bytes: &[u8], config: &Config) -> Result<(Vec<u8>, ClassReport)> {
    config.validate()?;
    let mut class = ClassFile::parse(bytes)?;
    let report = class.optimize(config);
    if report.changed() {
        Ok((class.to_bytes(), report))
    } else {
        Ok((bytes.to_vec(), report))
    }
}

/// Optimize `input` and write the result to `output`, creating parent directories
pub fn optimize_class_file(input: &Path, output: &Path, config: &Config) -> Result<ClassReport> {
    config.validate()?;
    let run = || -> Result<ClassReport> {
        let bytes = fs::read(input)?;
        let (optimized, report) = optimize_class_bytes(&bytes, config)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, optimized)?;
        Ok(report)
    };
    run().map_err(|err| err.in_file(input))
}

/// Optimize every class file under `input_root`, mirroring the tree into
/// `output_root`. Non-class files are copied as they are.
///
/// A class file that fails to parse is logged, counted and copied unchanged;
/// only IO failures on the trees themselves abort the run.
pub fn optimize_tree(input_root: &Path, output_root: &Path, config: &Config) -> Result<BatchReport> {
    config.validate()?;
    if !input_root.is_dir() {
        return Err(Error::config_error(format!("{} is not a directory", input_root.display())));
    }
    if output_root.starts_with(input_root) {
        return Err(Error::config_error("output directory must not be inside the input directory"));
    }
    let mut report = BatchReport::default();

    for entry in WalkDir::new(input_root).sort_by_file_name() {
        let entry = entry?;
        let relative = entry.path().strip_prefix(input_root).unwrap_or(entry.path());
        let target = output_root.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        let is_class = entry.path().extension().map_or(false, |ext| ext == CLASS_EXTENSION);
        if !is_class || config.is_excluded(&file_name) {
            debug!("copying {}", relative.display());
            copy(entry.path(), &target)?;
            if is_class {
                report.files_copied += 1;
            }
            continue;
        }

        match optimize_class_file(entry.path(), &target, config) {
            Ok(class) if class.changed() => {
                report.files_optimized += 1;
                report.methods_changed += class.methods_changed;
            }
            Ok(_) => report.files_copied += 1,
            Err(err) => {
                warn!("{}", err);
                report.files_failed += 1;
                copy(entry.path(), &target)?;
            }
        }
    }

    info!(
        "{} class file(s) optimized, {} copied, {} failed, {} method(s) changed",
        report.files_optimized, report.files_copied, report.files_failed, report.methods_changed
    );
    Ok(report)
}

fn copy(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to).map_err(|err| Error::from(err).in_file(PathBuf::from(from)))?;
    Ok(())
}
