//! Flat-directory artifact storage.
//!
//! Every derived file is named `<role>_<base>.<ext>` inside the export
//! directory. Concurrent writers of the same base identifier race; the last
//! writer wins.

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::StorageConfig;
use crate::error::{Result, SimplexError};
use crate::metrics::triplets::SimplexPoint;
use crate::signal::{Events, RRSeries};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    Rpeaks,
    RrIntervals,
    Normalized,
    SimplexPlot,
}

impl ArtifactRole {
    pub fn prefix(self) -> &'static str {
        match self {
            ArtifactRole::Rpeaks => "rpeaks",
            ArtifactRole::RrIntervals => "rr_intervals",
            ArtifactRole::Normalized => "normalized",
            ArtifactRole::SimplexPlot => "simplex_plot",
        }
    }

    pub fn file_name(self, base: &str, ext: &str) -> String {
        format!("{}_{}.{}", self.prefix(), base, ext)
    }

    pub fn table_name(self, base: &str) -> String {
        self.file_name(base, "csv")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Svg => "svg",
        }
    }

    pub fn other(self) -> Self {
        match self {
            ImageFormat::Png => ImageFormat::Svg,
            ImageFormat::Svg => ImageFormat::Png,
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("png") {
            Some(ImageFormat::Png)
        } else if ext.eq_ignore_ascii_case("svg") {
            Some(ImageFormat::Svg)
        } else {
            None
        }
    }
}

/// Filename stem shared by every artifact derived from `input`.
pub fn base_identifier(input: &Path) -> Result<String> {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SimplexError::InvalidArtifactName {
            name: input.display().to_string(),
        })
}

/// Reject anything that is not a bare file name.
fn plain_name(name: &str) -> Result<&str> {
    let plain = !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != "..";
    if plain {
        Ok(name)
    } else {
        Err(SimplexError::InvalidArtifactName {
            name: name.to_string(),
        })
    }
}

/// Which artifacts an export request asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSelection {
    pub rpeaks: bool,
    pub rr: bool,
    pub image: bool,
    pub normalized: bool,
}

impl ExportSelection {
    pub fn all() -> Self {
        Self {
            rpeaks: true,
            rr: true,
            image: true,
            normalized: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.rpeaks || self.rr || self.image || self.normalized)
    }
}

/// A zip archive assembled on a best-effort basis.
#[derive(Debug, Clone)]
pub struct ExportBundle {
    pub archive_name: String,
    pub bytes: Vec<u8>,
    pub included: Vec<String>,
    /// Requested members that could not be found and were left out.
    pub skipped: Vec<String>,
}

impl ExportBundle {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.bytes).map_err(|e| SimplexError::io(path, e))
    }
}

/// Paths of the three tables written for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableArtifacts {
    pub rpeaks: PathBuf,
    pub rr_intervals: PathBuf,
    pub normalized: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub path: PathBuf,
    pub format: ImageFormat,
    /// Stale image of the other format that was deleted, if any.
    pub removed: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    config: StorageConfig,
}

impl ArtifactStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn export_path(&self, name: &str) -> PathBuf {
        self.config.export_dir.join(name)
    }

    fn ensure_dir(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| SimplexError::io(dir, e))
    }

    /// Copy an incoming recording into the upload directory under its own
    /// file name. Only `.csv` files are accepted.
    pub fn save_upload(&self, source: &Path) -> Result<PathBuf> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SimplexError::InvalidArtifactName {
                name: source.display().to_string(),
            })?;
        let is_csv = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err(SimplexError::UnsupportedFormat {
                name: name.to_string(),
            });
        }
        Self::ensure_dir(&self.config.upload_dir)?;
        let source_real = fs::canonicalize(source).map_err(|e| SimplexError::io(source, e))?;
        let dest = self.config.upload_dir.join(name);
        if fs::canonicalize(&dest).ok().as_ref() != Some(&source_real) {
            fs::copy(source, &dest).map_err(|e| SimplexError::io(&dest, e))?;
        }
        Ok(dest)
    }

    pub fn write_tables(
        &self,
        base: &str,
        peaks: &Events,
        rr: &RRSeries,
        normalized: &[SimplexPoint],
    ) -> Result<TableArtifacts> {
        let base = plain_name(base)?;
        Self::ensure_dir(&self.config.export_dir)?;
        let rpeaks = self.export_path(&ArtifactRole::Rpeaks.table_name(base));
        write_table(&rpeaks, &["rpeaks"], &peaks.indices)?;
        let rr_intervals = self.export_path(&ArtifactRole::RrIntervals.table_name(base));
        write_table(&rr_intervals, &["rr_intervals"], &rr.rr)?;
        let normalized_path = self.export_path(&ArtifactRole::Normalized.table_name(base));
        write_table(&normalized_path, &["c1", "c2", "c3"], normalized)?;
        log::info!(
            "wrote {}, {}, {}",
            rpeaks.display(),
            rr_intervals.display(),
            normalized_path.display()
        );
        Ok(TableArtifacts {
            rpeaks,
            rr_intervals,
            normalized: normalized_path,
        })
    }

    /// Load a previously written `normalized_<base>.csv`.
    pub fn read_normalized(&self, base: &str) -> Result<Vec<SimplexPoint>> {
        let path = self.export_path(&ArtifactRole::Normalized.table_name(plain_name(base)?));
        let file = File::open(&path).map_err(|e| SimplexError::io(&path, e))?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        reader
            .deserialize::<[f64; 3]>()
            .map(|row| Ok(SimplexPoint(row?)))
            .collect()
    }

    /// Store an externally rendered plot and delete the other format's file
    /// for the same name so a stale image is never exported.
    pub fn store_image(&self, filename: &str, bytes: &[u8]) -> Result<StoredImage> {
        let filename = plain_name(filename)?;
        let format = ImageFormat::from_file_name(filename).ok_or_else(|| {
            SimplexError::UnsupportedImageFormat {
                name: filename.to_string(),
            }
        })?;
        Self::ensure_dir(&self.config.export_dir)?;
        // Stored under the lowercase extension that export looks up.
        let path = self
            .export_path(filename)
            .with_extension(format.extension());
        fs::write(&path, bytes).map_err(|e| SimplexError::io(&path, e))?;

        let stale = path.with_extension(format.other().extension());
        let removed = match fs::remove_file(&stale) {
            Ok(()) => {
                log::warn!("removed stale image {}", stale.display());
                Some(stale)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(SimplexError::io(&stale, e)),
        };
        Ok(StoredImage {
            path,
            format,
            removed,
        })
    }

    /// Bundle the requested artifacts of `base` into one zip archive.
    ///
    /// Missing members are skipped with a warning; the request only fails when
    /// nothing was selected or nothing selected exists.
    pub fn export(&self, base: &str, selection: ExportSelection) -> Result<ExportBundle> {
        if selection.is_empty() {
            return Err(SimplexError::NoExportSelection);
        }
        let base = plain_name(base)?;

        let mut wanted: Vec<Vec<String>> = Vec::new();
        if selection.rpeaks {
            wanted.push(vec![ArtifactRole::Rpeaks.table_name(base)]);
        }
        if selection.rr {
            wanted.push(vec![ArtifactRole::RrIntervals.table_name(base)]);
        }
        if selection.image {
            wanted.push(
                [ImageFormat::Png, ImageFormat::Svg]
                    .iter()
                    .map(|f| ArtifactRole::SimplexPlot.file_name(base, f.extension()))
                    .collect(),
            );
        }
        if selection.normalized {
            wanted.push(vec![ArtifactRole::Normalized.table_name(base)]);
        }

        let mut opened = Vec::new();
        let mut skipped = Vec::new();
        for alternatives in wanted {
            match self.open_first(&alternatives)? {
                Some(found) => opened.push(found),
                None => {
                    let name = alternatives.join("|");
                    log::warn!(
                        "missing export file {} in {}",
                        name,
                        self.config.export_dir.display()
                    );
                    skipped.push(name);
                }
            }
        }
        if opened.is_empty() {
            return Err(SimplexError::NoExportableArtifacts {
                basename: base.to_string(),
            });
        }

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut included = Vec::with_capacity(opened.len());
        for (name, mut file) in opened {
            zip.start_file(name.as_str(), options)?;
            io::copy(&mut file, &mut zip)
                .map_err(|e| SimplexError::io(self.export_path(&name), e))?;
            included.push(name);
        }
        let bytes = zip.finish()?.into_inner();

        Ok(ExportBundle {
            archive_name: format!("ecg_export_{base}.zip"),
            bytes,
            included,
            skipped,
        })
    }

    fn open_first(&self, names: &[String]) -> Result<Option<(String, File)>> {
        for name in names {
            let path = self.export_path(name);
            match File::open(&path) {
                Ok(file) => return Ok(Some((name.clone(), file))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(SimplexError::io(path, e)),
            }
        }
        Ok(None)
    }
}

fn write_table<R: Serialize>(path: &Path, header: &[&str], rows: &[R]) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|e| SimplexError::io(path, e))
}
