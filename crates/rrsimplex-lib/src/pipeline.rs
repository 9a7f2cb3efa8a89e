//! End-to-end orchestration: recording → sampling rate → conditioned signal →
//! R-peaks → RR intervals → simplex triplets → table artifacts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

use crate::config::SimplexConfig;
use crate::detectors::ecg::{detect_peak_indices, BeatDetector, PanTompkinsDetector};
use crate::error::{Failure, Result};
use crate::io::tabular::TabularLoader;
use crate::metrics::triplets::{normalize_triplets, SimplexPoint, TripletNormalization};
use crate::signal::{condition_signal, estimate_sampling_rate, Events, RRSeries, SamplingRate};
use crate::storage::{base_identifier, ArtifactStore, TableArtifacts};

/// Every value derived from one recording, before anything is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Derivation {
    pub sampling_rate: SamplingRate,
    pub sample_count: usize,
    pub peaks: Events,
    pub rr: RRSeries,
    pub triplets: TripletNormalization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub basename: String,
    #[serde(flatten)]
    pub derivation: Derivation,
    pub artifacts: TableArtifacts,
}

/// What a caller gets back from one processing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessResponse {
    Ok {
        basename: String,
        normalized: Vec<SimplexPoint>,
        sampling_rate: SamplingRate,
        peak_count: usize,
        discarded: usize,
    },
    Error(Failure),
}

impl From<&Result<ProcessOutcome>> for ProcessResponse {
    fn from(result: &Result<ProcessOutcome>) -> Self {
        match result {
            Ok(outcome) => ProcessResponse::Ok {
                basename: outcome.basename.clone(),
                normalized: outcome.derivation.triplets.points.clone(),
                sampling_rate: outcome.derivation.sampling_rate,
                peak_count: outcome.derivation.peaks.len(),
                discarded: outcome.derivation.triplets.discarded,
            },
            Err(err) => ProcessResponse::Error(Failure::from(err)),
        }
    }
}

pub struct Pipeline<D> {
    loader: TabularLoader,
    store: ArtifactStore,
    detector: D,
}

impl Pipeline<PanTompkinsDetector> {
    pub fn from_config(config: &SimplexConfig) -> Result<Self> {
        Ok(Self::new(
            TabularLoader::new(&config.loader)?,
            ArtifactStore::new(config.storage.clone()),
            PanTompkinsDetector::new(config.detector),
        ))
    }
}

impl<D: BeatDetector> Pipeline<D> {
    pub fn new(loader: TabularLoader, store: ArtifactStore, detector: D) -> Self {
        Self {
            loader,
            store,
            detector,
        }
    }

    pub fn loader(&self) -> &TabularLoader {
        &self.loader
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Run every numeric stage without touching storage.
    pub fn derive(&self, path: &Path, lead: &str) -> Result<Derivation> {
        let raw = self.loader.load(path, lead)?;
        let sampling_rate = estimate_sampling_rate(&raw.timestamps)?;
        let signal = condition_signal(&raw.amplitude)?;
        let peaks = detect_peak_indices(&self.detector, &signal, sampling_rate);
        let rr = RRSeries::from_events(&peaks, sampling_rate);
        let triplets = normalize_triplets(&rr)?;
        Ok(Derivation {
            sampling_rate,
            sample_count: signal.len(),
            peaks,
            rr,
            triplets,
        })
    }

    /// Derive and persist the three tables under the file's base identifier.
    /// Nothing is written unless every stage succeeds.
    pub fn process(&self, path: &Path, lead: &str) -> Result<ProcessOutcome> {
        let started = Instant::now();
        let basename = base_identifier(path)?;
        let derivation = self.derive(path, lead)?;
        let artifacts = self.store.write_tables(
            &basename,
            &derivation.peaks,
            &derivation.rr,
            &derivation.triplets.points,
        )?;
        log::info!(
            "processed {} in {:.3} s",
            path.display(),
            started.elapsed().as_secs_f64()
        );
        Ok(ProcessOutcome {
            basename,
            derivation,
            artifacts,
        })
    }

    /// Materialize `source` into the upload directory, then process the copy.
    pub fn process_upload(&self, source: &Path, lead: &str) -> Result<ProcessOutcome> {
        let saved = self.store.save_upload(source)?;
        self.process(&saved, lead)
    }
}
