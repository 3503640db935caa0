//! The per-job pipeline shared by every backend.
//!
//! Stage order: probe the header, resolve the montage, consult the
//! result cache, admit memory, load, quality-gate, clean and resample,
//! obtain the inverse operator (cached), apply it, then write and
//! publish. The result cache is consulted *before* admission on
//! purpose: a warm re-run only hashes the input pair and copies the
//! cached time-courses, without competing for budget against cold jobs.
//!
//! Chunked mode runs the same stages with the payload split into epoch
//! sub-batches. The quality scan streams over every chunk first, so
//! chunked and full runs agree on what counts as bad data, and each
//! chunk's working set is capped at half the budget so one degraded job
//! cannot monopolize admission.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::cache::{
    content_digest, operator_key, result_key, ArtifactCache, ArtifactKey, CacheOutcome,
    ComputeClaim,
};
use crate::io::npy;
use crate::io::quality::{self, ChannelScan, QualityReport};
use crate::io::reader::{ReadError, Recording, RecordingMeta, RecordingReader};
use crate::io::tensor::{EpochTensor, RegionTimeSeries};
use crate::io::writer::{OutputPaths, ResultMetadata, ResultWriter, WriteError};
use crate::kernel::gpu::DeviceQueue;
use crate::kernel::{
    check_montage, montage_for_channels, InverseOperator, KernelError, LocalizationKernel,
    MontageSpec, REGION_COUNT,
};
use crate::memory::{
    estimate_region_bytes, estimate_working_set, plan_epoch_chunks, MemoryError, MemoryManager,
    PERMIT_BYTES,
};

use super::error::ProcessError;
use super::job::{CacheUse, Job, JobConfig, JobResult, JobStatus};
use super::VariantKind;

/// Shared services a backend processes jobs against.
///
/// Cheap to clone; every field is a handle. The same context can back
/// several backends at once, which is how fallback keeps cache and
/// budget state across a backend switch.
#[derive(Clone)]
pub struct StageContext {
    pub memory: Arc<MemoryManager>,
    /// Artifact cache; `None` disables caching entirely.
    pub cache: Option<ArtifactCache>,
    pub kernel: Arc<dyn LocalizationKernel>,
    pub reader: Arc<dyn RecordingReader>,
    pub writer: Arc<ResultWriter>,
    /// Montage assumed when neither the job nor the header names one.
    pub default_montage: String,
    pub admission_timeout: Duration,
    /// How long to wait on another worker's compute claim.
    pub claim_wait: Duration,
}

/// How a backend runs the pipeline: identity, display label, and the
/// device queue for GPU kernel launches.
#[derive(Clone)]
pub(crate) struct ExecParams {
    pub kind: VariantKind,
    pub label: String,
    pub device: Option<Arc<DeviceQueue>>,
}

/// What a successful pipeline run produced.
#[derive(Debug)]
pub struct StageOutput {
    pub output: OutputPaths,
    pub estimated_bytes: u64,
    pub chunked: bool,
    pub cache: CacheUse,
}

/// Run one job and fold the outcome into a [`JobResult`].
pub(crate) async fn execute(ctx: &StageContext, exec: &ExecParams, job: &Job) -> JobResult {
    let started = Instant::now();
    tracing::info!(
        job = %job.id,
        input = %job.input.display(),
        backend = %exec.label,
        "processing"
    );

    match run_job(ctx, exec, job).await {
        Ok(stage) => {
            let duration = started.elapsed();
            tracing::info!(
                job = %job.id,
                backend = %exec.label,
                elapsed_ms = duration.as_millis() as u64,
                chunked = stage.chunked,
                "job succeeded"
            );
            JobResult {
                job_id: job.id,
                input: job.input.clone(),
                status: JobStatus::Succeeded,
                variant: exec.label.clone(),
                attempts: 1,
                duration,
                estimated_bytes: stage.estimated_bytes,
                chunked: stage.chunked,
                cache: stage.cache,
                output: Some(stage.output),
                error: None,
            }
        }
        Err(err) => {
            let duration = started.elapsed();
            tracing::warn!(
                job = %job.id,
                backend = %exec.label,
                category = %err.category(),
                error = %err,
                "job failed"
            );
            JobResult {
                job_id: job.id,
                input: job.input.clone(),
                status: JobStatus::Failed,
                variant: exec.label.clone(),
                attempts: 1,
                duration,
                estimated_bytes: 0,
                chunked: false,
                cache: CacheUse::default(),
                output: None,
                error: Some(err.to_record(job, &exec.label, 1)),
            }
        }
    }
}

/// Run the pipeline for one job.
pub(crate) async fn run_job(
    ctx: &StageContext,
    exec: &ExecParams,
    job: &Job,
) -> Result<StageOutput, ProcessError> {
    let meta = probe_recording(ctx, &job.input).await?;
    let spec = resolve_montage(ctx, &job.config, &meta)?;
    let dropped = normalized_drops(&job.config.dropped_channels, meta.n_channels);

    let effective_channels = meta.n_channels - dropped.len();
    let estimate = estimate_working_set(&meta, exec.kind.memory_multiplier());
    let op_key = operator_key(
        ctx.kernel.name(),
        spec.name,
        effective_channels,
        job.config.lambda2,
        ResultMetadata::ATLAS_VERSION,
    );

    let plan = Plan {
        ctx,
        exec,
        job,
        meta,
        spec,
        dropped,
        op_key,
        estimate,
    };

    let mut cache_use = CacheUse::default();
    let mut result_claim: Option<ComputeClaim> = None;
    if let Some(cache) = ctx.cache.as_ref().filter(|_| job.config.use_result_cache) {
        let digest = digest_input(&job.input).await?;
        let res_key = result_key(&plan.op_key, &digest, job.config.resample_hz, &plan.dropped);
        match cache.get_or_claim(&res_key, ctx.claim_wait).await {
            CacheOutcome::Hit(handle) => match decode_series(handle.bytes()) {
                Ok(series) => {
                    drop(handle);
                    cache_use.result_hit = Some(true);
                    tracing::info!(
                        job = %job.id,
                        key = %res_key.short(),
                        "served from result cache"
                    );
                    let metadata = plan.sidecar(&series);
                    let (output, _) =
                        write_outputs(ctx, &job.input, Arc::new(series), metadata, false).await?;
                    return Ok(StageOutput {
                        output,
                        estimated_bytes: plan.estimate,
                        chunked: false,
                        cache: cache_use,
                    });
                }
                Err(reason) => {
                    drop(handle);
                    tracing::warn!(
                        job = %job.id,
                        key = %res_key.short(),
                        %reason,
                        "cached result undecodable, recomputing"
                    );
                    cache.invalidate(&res_key).await;
                    cache_use.result_hit = Some(false);
                }
            },
            CacheOutcome::Miss(claim) => {
                cache_use.result_hit = Some(false);
                result_claim = Some(claim);
            }
        }
    }

    if job.config.chunked {
        plan.run_chunked(cache_use, result_claim).await
    } else {
        plan.run_full(cache_use, result_claim).await
    }
}

/// Everything resolved up front for one job: header, montage, channel
/// drops, cache key, and the admission estimate.
struct Plan<'a> {
    ctx: &'a StageContext,
    exec: &'a ExecParams,
    job: &'a Job,
    meta: RecordingMeta,
    spec: &'static MontageSpec,
    dropped: Vec<usize>,
    op_key: ArtifactKey,
    estimate: u64,
}

impl Plan<'_> {
    fn effective_channels(&self) -> usize {
        self.meta.n_channels - self.dropped.len()
    }

    /// Whole-recording path: admit the full working set, then process in
    /// one piece.
    async fn run_full(
        &self,
        mut cache_use: CacheUse,
        result_claim: Option<ComputeClaim>,
    ) -> Result<StageOutput, ProcessError> {
        let ctx = self.ctx;
        let _grant = ctx.memory.reserve(self.estimate, ctx.admission_timeout).await?;
        tracing::debug!(job = %self.job.id, bytes = self.estimate, "memory admitted");

        let recording = load_recording(ctx, &self.job.input).await?;
        self.quality_gate(&quality::scan(&recording.tensor))?;

        let mut tensor = recording.tensor;
        if !self.dropped.is_empty() {
            tensor = tensor.without_channels(&self.dropped);
        }
        let tensor = tensor.resampled(self.job.config.resample_hz);

        let (operator, op_hit) = self.obtain_operator().await?;
        cache_use.operator_hit = op_hit;

        let series = self.apply(operator, tensor).await?;
        self.finish(series, cache_use, false, result_claim).await
    }

    /// Degraded path: split the epochs so each chunk's working set fits
    /// half the budget, scan everything, then localize chunk by chunk.
    async fn run_chunked(
        &self,
        mut cache_use: CacheUse,
        result_claim: Option<ComputeClaim>,
    ) -> Result<StageOutput, ProcessError> {
        let ctx = self.ctx;
        let config = &self.job.config;
        let multiplier = self.exec.kind.memory_multiplier();

        // Fixed overhead lives for the whole job: the stitched output
        // buffer and the operator weights.
        let out_samples =
            resampled_len(self.meta.n_samples, self.meta.sfreq_hz, config.resample_hz);
        let fixed = estimate_region_bytes(out_samples, self.meta.n_epochs)
            + (REGION_COUNT * self.effective_channels() * 4) as u64;
        let per_epoch = (self.meta.epoch_bytes() as f64 * multiplier).ceil() as u64;
        let limit = (ctx.memory.budget() / 2).max(PERMIT_BYTES);

        let chunk_plan = plan_epoch_chunks(self.meta.n_epochs, per_epoch, fixed, limit).ok_or(
            MemoryError::ExceedsBudget {
                requested: fixed + per_epoch,
                budget: limit,
            },
        )?;
        let chunk_estimate = fixed + per_epoch * chunk_plan.epochs_per_chunk as u64;

        tracing::info!(
            job = %self.job.id,
            chunks = chunk_plan.n_chunks(),
            epochs_per_chunk = chunk_plan.epochs_per_chunk,
            chunk_bytes = chunk_estimate,
            "degraded chunked processing"
        );

        let _grant = ctx.memory.reserve(chunk_estimate, ctx.admission_timeout).await?;

        // Scan pass first: the gate must see the whole recording before
        // any chunk is localized, or a chunked run could emit output for
        // data the full path would reject.
        let mut scan = ChannelScan::new(self.meta.n_channels);
        for range in chunk_plan.ranges() {
            let chunk = load_chunk(ctx, &self.meta, range.start, range.len()).await?;
            scan.update(&chunk);
        }
        self.quality_gate(&scan.finish())?;

        let (operator, op_hit) = self.obtain_operator().await?;
        cache_use.operator_hit = op_hit;

        let mut full: Option<RegionTimeSeries> = None;
        for range in chunk_plan.ranges() {
            let mut chunk = load_chunk(ctx, &self.meta, range.start, range.len()).await?;
            if !self.dropped.is_empty() {
                chunk = chunk.without_channels(&self.dropped);
            }
            let chunk = chunk.resampled(config.resample_hz);
            let localized = self.apply(Arc::clone(&operator), chunk).await?;

            let series = full.get_or_insert_with(|| {
                RegionTimeSeries::zeroed(
                    localized.n_regions,
                    localized.n_samples,
                    self.meta.n_epochs,
                )
            });
            series.merge_epochs(&localized, range.start);
        }

        let series = full.expect("chunk plan yields at least one range");
        self.finish(series, cache_use, true, result_claim).await
    }

    /// Fail unless the recording is clean or every flagged channel is
    /// already on the drop list.
    fn quality_gate(&self, report: &QualityReport) -> Result<(), ProcessError> {
        if report.is_clean() {
            return Ok(());
        }
        let offending = report.offending_channels();
        if offending.iter().all(|c| self.dropped.binary_search(c).is_ok()) {
            tracing::debug!(
                job = %self.job.id,
                channels = ?offending,
                "flagged channels already excluded"
            );
            return Ok(());
        }
        Err(ProcessError::Quality {
            report: report.clone(),
        })
    }

    /// Fetch the inverse operator from the cache or build and publish
    /// it. A corrupt cached operator is invalidated and the lookup
    /// retried once; a second bad round builds uncached.
    async fn obtain_operator(&self) -> Result<(Arc<InverseOperator>, Option<bool>), ProcessError> {
        let lambda2 = self.job.config.lambda2;
        let n_channels = self.effective_channels();

        let Some(cache) = self.ctx.cache.as_ref() else {
            let op = self.ctx.kernel.build_operator(self.spec, n_channels, lambda2)?;
            return Ok((Arc::new(op), None));
        };

        for _ in 0..2 {
            match cache.get_or_claim(&self.op_key, self.ctx.claim_wait).await {
                CacheOutcome::Hit(handle) => match InverseOperator::from_bytes(handle.bytes()) {
                    Ok(op) => return Ok((Arc::new(op), Some(true))),
                    Err(reason) => {
                        drop(handle);
                        tracing::warn!(
                            key = %self.op_key.short(),
                            %reason,
                            "cached operator undecodable, rebuilding"
                        );
                        cache.invalidate(&self.op_key).await;
                    }
                },
                CacheOutcome::Miss(claim) => {
                    let op = self.ctx.kernel.build_operator(self.spec, n_channels, lambda2)?;
                    if let Err(e) = claim.publish(op.to_bytes()).await {
                        tracing::warn!(
                            key = %self.op_key.short(),
                            error = %e,
                            "operator publish failed, continuing uncached"
                        );
                    }
                    return Ok((Arc::new(op), Some(false)));
                }
            }
        }
        let op = self.ctx.kernel.build_operator(self.spec, n_channels, lambda2)?;
        Ok((Arc::new(op), Some(false)))
    }

    /// Project the tensor through the operator on this backend's compute
    /// lane: the device queue for GPU, the blocking pool otherwise. The
    /// device wait is bounded by the admission timeout, the same patience
    /// a job extends to the memory budget.
    async fn apply(
        &self,
        operator: Arc<InverseOperator>,
        tensor: EpochTensor,
    ) -> Result<RegionTimeSeries, ProcessError> {
        let kernel = Arc::clone(&self.ctx.kernel);
        let work = move || kernel.apply(&operator, &tensor);
        let series = match self.exec.device.as_ref() {
            Some(queue) => queue.submit(self.ctx.admission_timeout, work).await??,
            None => tokio::task::spawn_blocking(work)
                .await
                .expect("localization task panicked")?,
        };
        Ok(series)
    }

    /// Write the outputs and, when a claim is held, publish the result
    /// artifact. Publish failure degrades to a warning: the outputs are
    /// already on disk and correctness never depends on the cache.
    async fn finish(
        &self,
        series: RegionTimeSeries,
        cache_use: CacheUse,
        chunked: bool,
        result_claim: Option<ComputeClaim>,
    ) -> Result<StageOutput, ProcessError> {
        let metadata = self.sidecar(&series);
        let series = Arc::new(series);
        let (output, payload) = write_outputs(
            self.ctx,
            &self.job.input,
            Arc::clone(&series),
            metadata,
            result_claim.is_some(),
        )
        .await?;

        if let (Some(claim), Some(payload)) = (result_claim, payload) {
            if let Err(e) = claim.publish(payload).await {
                tracing::warn!(job = %self.job.id, error = %e, "result publish failed, continuing");
            }
        }

        Ok(StageOutput {
            output,
            estimated_bytes: self.estimate,
            chunked,
            cache: cache_use,
        })
    }

    fn sidecar(&self, series: &RegionTimeSeries) -> ResultMetadata {
        ResultMetadata {
            input: self.job.input.clone(),
            montage: self.spec.name.to_string(),
            n_regions: series.n_regions,
            n_epochs: series.n_epochs,
            n_samples: series.n_samples,
            sfreq_hz: self.job.config.resample_hz,
            lambda2: self.job.config.lambda2,
            backend: self.exec.label.clone(),
            units: ResultMetadata::UNITS.to_string(),
            atlas_version: ResultMetadata::ATLAS_VERSION.to_string(),
            operator_key: self.op_key.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Montage precedence: explicit job override, then the recording
/// header, then the configured default. Relaxed mode ignores all three
/// and re-guesses from the channel count.
fn resolve_montage(
    ctx: &StageContext,
    config: &JobConfig,
    meta: &RecordingMeta,
) -> Result<&'static MontageSpec, ProcessError> {
    if config.relaxed_montage {
        let spec = montage_for_channels(meta.n_channels).ok_or_else(|| {
            KernelError::UnknownMontage {
                montage: format!("{}-channel (inferred)", meta.n_channels),
            }
        })?;
        tracing::debug!(
            montage = spec.name,
            n_channels = meta.n_channels,
            "montage inferred from channel count"
        );
        return Ok(spec);
    }

    let name = config
        .montage
        .as_deref()
        .or(meta.montage.as_deref())
        .unwrap_or(&ctx.default_montage);
    Ok(check_montage(name, meta.n_channels)?)
}

/// Sorted, deduplicated drop list restricted to channels that exist.
fn normalized_drops(requested: &[usize], n_channels: usize) -> Vec<usize> {
    let mut drops: Vec<usize> = requested
        .iter()
        .copied()
        .filter(|c| *c < n_channels)
        .collect();
    drops.sort_unstable();
    drops.dedup();
    drops
}

/// Sample count `resampled` will produce; used only for sizing
/// estimates.
fn resampled_len(n_samples: usize, sfreq_hz: f64, target_hz: f64) -> usize {
    if (target_hz - sfreq_hz).abs() < f64::EPSILON {
        return n_samples;
    }
    ((n_samples as f64) * (target_hz / sfreq_hz)).round().max(1.0) as usize
}

fn decode_series(bytes: &[u8]) -> Result<RegionTimeSeries, String> {
    let (shape, data) = npy::parse_bytes(bytes).map_err(|e| e.to_string())?;
    if shape.len() != 3 {
        return Err(format!("expected a 3-d result shape, got {shape:?}"));
    }
    RegionTimeSeries::from_vec(shape[0], shape[1], shape[2], data).map_err(|e| e.to_string())
}

async fn probe_recording(ctx: &StageContext, path: &Path) -> Result<RecordingMeta, ProcessError> {
    let reader = Arc::clone(&ctx.reader);
    let path = path.to_path_buf();
    let meta = tokio::task::spawn_blocking(move || reader.probe(&path))
        .await
        .expect("recording probe task panicked")?;
    Ok(meta)
}

async fn load_recording(ctx: &StageContext, path: &Path) -> Result<Recording, ProcessError> {
    let reader = Arc::clone(&ctx.reader);
    let path = path.to_path_buf();
    let recording = tokio::task::spawn_blocking(move || reader.load(&path))
        .await
        .expect("recording load task panicked")?;
    Ok(recording)
}

async fn load_chunk(
    ctx: &StageContext,
    meta: &RecordingMeta,
    start_epoch: usize,
    count: usize,
) -> Result<EpochTensor, ProcessError> {
    let reader = Arc::clone(&ctx.reader);
    let meta = meta.clone();
    let tensor = tokio::task::spawn_blocking(move || reader.load_epoch_range(&meta, start_epoch, count))
        .await
        .expect("chunk load task panicked")?;
    Ok(tensor)
}

async fn digest_input(path: &Path) -> Result<String, ProcessError> {
    let path = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || content_digest(&path))
        .await
        .expect("digest task panicked")
        .map_err(ReadError::from)?;
    Ok(digest)
}

/// Write the result pair on the blocking pool; optionally encode the
/// cacheable payload in the same pass.
async fn write_outputs(
    ctx: &StageContext,
    input: &Path,
    series: Arc<RegionTimeSeries>,
    metadata: ResultMetadata,
    encode_payload: bool,
) -> Result<(OutputPaths, Option<Vec<u8>>), ProcessError> {
    let writer = Arc::clone(&ctx.writer);
    let input = input.to_path_buf();
    let written = tokio::task::spawn_blocking(move || -> Result<_, WriteError> {
        let paths = writer.write(&input, &series, &metadata)?;
        let payload = encode_payload.then(|| {
            let shape = [series.n_regions, series.n_samples, series.n_epochs];
            npy::to_bytes(&shape, series.samples())
        });
        Ok((paths, payload))
    })
    .await
    .expect("result write task panicked")?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ArtifactCache;
    use crate::errors::ErrorCategory;
    use crate::io::reader::FdtPairReader;
    use crate::io::synth;
    use crate::kernel::MinimumNormKernel;
    use std::path::PathBuf;

    const MIB: u64 = 1024 * 1024;

    fn context(dir: &Path, budget: u64, cache: Option<ArtifactCache>) -> StageContext {
        StageContext {
            memory: Arc::new(MemoryManager::new(budget)),
            cache,
            kernel: Arc::new(MinimumNormKernel::new()),
            reader: Arc::new(FdtPairReader::new()),
            writer: Arc::new(ResultWriter::new(dir.join("out")).unwrap()),
            default_montage: "GSN-HydroCel-129".to_string(),
            admission_timeout: Duration::from_secs(5),
            claim_wait: Duration::from_secs(5),
        }
    }

    fn exec_params(kind: VariantKind) -> ExecParams {
        ExecParams {
            kind,
            label: kind.to_string(),
            device: None,
        }
    }

    fn write_recording(
        dir: &Path,
        name: &str,
        n_channels: usize,
        n_epochs: usize,
        n_samples: usize,
        sfreq_hz: f64,
        montage: Option<&str>,
        seed: u64,
    ) -> PathBuf {
        let set = dir.join(name);
        let recording = synth::generate(n_channels, n_epochs, n_samples, sfreq_hz, montage, seed);
        synth::write_pair(&set, &recording).unwrap();
        set
    }

    fn flatten_channel(set: &Path, channel: usize) {
        let reader = FdtPairReader::new();
        let mut recording = reader.load(set).unwrap();
        let mut data = recording.tensor.samples().to_vec();
        for epoch in 0..recording.tensor.n_epochs {
            let base = (epoch * recording.tensor.n_channels + channel) * recording.tensor.n_samples;
            for s in 0..recording.tensor.n_samples {
                data[base + s] = 0.0;
            }
        }
        recording.tensor = EpochTensor::from_vec(
            recording.tensor.n_channels,
            recording.tensor.n_epochs,
            recording.tensor.n_samples,
            recording.tensor.sfreq_hz,
            data,
        )
        .unwrap();
        synth::write_pair(set, &recording).unwrap();
    }

    #[tokio::test]
    async fn full_pipeline_produces_atlas_outputs() {
        let dir = tempfile::TempDir::new().unwrap();
        let set = write_recording(dir.path(), "sub-01.set", 64, 3, 100, 500.0, Some("biosemi64"), 4);
        let ctx = context(dir.path(), 256 * MIB, None);

        let job = Job::new(&set, JobConfig::new(ctx.writer.output_dir()));
        let stage = run_job(&ctx, &exec_params(VariantKind::Sequential), &job)
            .await
            .unwrap();

        assert!(!stage.chunked);
        assert_eq!(stage.cache, CacheUse::default());
        assert!(stage.estimated_bytes > 0);

        // 500 Hz resampled to the 250 Hz default halves the samples.
        let (shape, values) = npy::read_file(&stage.output.timecourses).unwrap();
        assert_eq!(shape, vec![68, 50, 3]);
        assert!(values.iter().all(|v| v.is_finite()));

        let sidecar: ResultMetadata =
            serde_json::from_slice(&std::fs::read(&stage.output.metadata).unwrap()).unwrap();
        assert_eq!(sidecar.montage, "biosemi64");
        assert_eq!(sidecar.backend, "sequential");
        assert_eq!(sidecar.sfreq_hz, 250.0);
    }

    #[tokio::test]
    async fn config_montage_overrides_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let set = write_recording(dir.path(), "sub-02.set", 64, 2, 64, 250.0, Some("biosemi64"), 5);
        let ctx = context(dir.path(), 256 * MIB, None);

        let config = JobConfig::new(ctx.writer.output_dir()).with_montage("GSN-HydroCel-129");
        let err = run_job(&ctx, &exec_params(VariantKind::Sequential), &Job::new(&set, config))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MontageMismatch);

        let config = JobConfig::new(ctx.writer.output_dir()).with_montage("neuroscan32");
        let err = run_job(&ctx, &exec_params(VariantKind::Sequential), &Job::new(&set, config))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MontageMismatch);
    }

    #[tokio::test]
    async fn relaxed_montage_reguesses_from_channel_count() {
        let dir = tempfile::TempDir::new().unwrap();
        // Header names no montage; the configured default expects 129
        // channels but the data has 64.
        let set = write_recording(dir.path(), "sub-03.set", 64, 2, 64, 250.0, None, 6);
        let ctx = context(dir.path(), 256 * MIB, None);

        let strict = JobConfig::new(ctx.writer.output_dir());
        let err = run_job(&ctx, &exec_params(VariantKind::Sequential), &Job::new(&set, strict))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MontageMismatch);

        let mut relaxed = JobConfig::new(ctx.writer.output_dir());
        relaxed.relaxed_montage = true;
        let stage = run_job(&ctx, &exec_params(VariantKind::Sequential), &Job::new(&set, relaxed))
            .await
            .unwrap();

        let sidecar: ResultMetadata =
            serde_json::from_slice(&std::fs::read(&stage.output.metadata).unwrap()).unwrap();
        assert_eq!(sidecar.montage, "biosemi64");
    }

    #[tokio::test]
    async fn flat_channel_fails_then_passes_when_dropped() {
        let dir = tempfile::TempDir::new().unwrap();
        let set = write_recording(dir.path(), "sub-04.set", 64, 2, 64, 250.0, Some("biosemi64"), 7);
        flatten_channel(&set, 5);
        let ctx = context(dir.path(), 256 * MIB, None);

        let config = JobConfig::new(ctx.writer.output_dir());
        let err = run_job(&ctx, &exec_params(VariantKind::Sequential), &Job::new(&set, config))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::DataQuality);
        assert_eq!(
            err.quality_report().map(|r| r.offending_channels()),
            Some(vec![5])
        );

        let mut cleaned = JobConfig::new(ctx.writer.output_dir());
        cleaned.dropped_channels = vec![5];
        let stage = run_job(&ctx, &exec_params(VariantKind::Sequential), &Job::new(&set, cleaned))
            .await
            .unwrap();
        assert!(stage.output.timecourses.exists());
    }

    #[tokio::test]
    async fn result_cache_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let set = write_recording(dir.path(), "sub-05.set", 64, 2, 80, 250.0, Some("biosemi64"), 8);
        let cache = ArtifactCache::open(dir.path().join("cache"), 64 * MIB)
            .await
            .unwrap();
        let ctx = context(dir.path(), 256 * MIB, Some(cache));
        let exec = exec_params(VariantKind::Sequential);

        let cold = run_job(&ctx, &exec, &Job::new(&set, JobConfig::new(ctx.writer.output_dir())))
            .await
            .unwrap();
        assert_eq!(cold.cache.operator_hit, Some(false));
        assert_eq!(cold.cache.result_hit, Some(false));
        let cold_bytes = std::fs::read(&cold.output.timecourses).unwrap();

        let warm = run_job(&ctx, &exec, &Job::new(&set, JobConfig::new(ctx.writer.output_dir())))
            .await
            .unwrap();
        assert_eq!(warm.cache.result_hit, Some(true));
        // A result hit never consults the operator cache.
        assert_eq!(warm.cache.operator_hit, None);
        assert_eq!(std::fs::read(&warm.output.timecourses).unwrap(), cold_bytes);
    }

    #[tokio::test]
    async fn operator_cache_shared_across_recordings() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = write_recording(dir.path(), "a.set", 64, 2, 60, 250.0, Some("biosemi64"), 9);
        let second = write_recording(dir.path(), "b.set", 64, 2, 60, 250.0, Some("biosemi64"), 10);
        let cache = ArtifactCache::open(dir.path().join("cache"), 64 * MIB)
            .await
            .unwrap();
        let ctx = context(dir.path(), 256 * MIB, Some(cache));
        let exec = exec_params(VariantKind::Parallel);

        let one = run_job(&ctx, &exec, &Job::new(&first, JobConfig::new(ctx.writer.output_dir())))
            .await
            .unwrap();
        assert_eq!(one.cache.operator_hit, Some(false));

        let two = run_job(&ctx, &exec, &Job::new(&second, JobConfig::new(ctx.writer.output_dir())))
            .await
            .unwrap();
        // Different input, same montage and regularization: the operator
        // is reused, the result is not.
        assert_eq!(two.cache.operator_hit, Some(true));
        assert_eq!(two.cache.result_hit, Some(false));
    }

    #[tokio::test]
    async fn chunked_processing_matches_full() {
        let dir = tempfile::TempDir::new().unwrap();
        // 64ch x 6ep x 600sa @500 Hz: the full 3x working set is ~2.8 MiB.
        let set = write_recording(dir.path(), "big.set", 64, 6, 600, 500.0, Some("biosemi64"), 11);

        let full_dir = tempfile::TempDir::new().unwrap();
        let full_ctx = context(full_dir.path(), 256 * MIB, None);
        let full = run_job(
            &full_ctx,
            &exec_params(VariantKind::Sequential),
            &Job::new(&set, JobConfig::new(full_ctx.writer.output_dir())),
        )
        .await
        .unwrap();

        // A 2 MiB budget rejects the whole recording outright...
        let small_dir = tempfile::TempDir::new().unwrap();
        let small_ctx = context(small_dir.path(), 2 * MIB, None);
        let err = run_job(
            &small_ctx,
            &exec_params(VariantKind::Sequential),
            &Job::new(&set, JobConfig::new(small_ctx.writer.output_dir())),
        )
        .await
        .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MemoryExceeded);

        // ...but admits it in epoch chunks, with identical output.
        let chunked = run_job(
            &small_ctx,
            &exec_params(VariantKind::Sequential),
            &Job::new(
                &set,
                JobConfig::new(small_ctx.writer.output_dir()).with_chunked(true),
            ),
        )
        .await
        .unwrap();
        assert!(chunked.chunked);

        let (full_shape, full_values) = npy::read_file(&full.output.timecourses).unwrap();
        let (chunk_shape, chunk_values) = npy::read_file(&chunked.output.timecourses).unwrap();
        assert_eq!(full_shape, chunk_shape);
        assert_eq!(full_values, chunk_values);
    }

    #[tokio::test]
    async fn oversized_job_is_rejected_even_chunked() {
        let dir = tempfile::TempDir::new().unwrap();
        // One epoch alone (129ch x 2500sa x 4B x 3) overflows half of a
        // 2 MiB budget, so even the degraded path must refuse.
        let set = write_recording(
            dir.path(),
            "huge.set",
            129,
            4,
            2500,
            1000.0,
            Some("GSN-HydroCel-129"),
            12,
        );
        let ctx = context(dir.path(), 2 * MIB, None);

        let config = JobConfig::new(ctx.writer.output_dir()).with_chunked(true);
        let err = run_job(&ctx, &exec_params(VariantKind::Sequential), &Job::new(&set, config))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MemoryExceeded);
    }
}
