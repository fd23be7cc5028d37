use super::events::ResizeJob;
use super::renderer::Renderer;
use super::size;
use super::uploader::StorageUploader;
use crate::common::reporter::FailureReporter;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Per-rendition lifecycle. `RenderFailed`, `UploadFailed` and `Uploaded`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenditionState {
    Pending,
    Rendering,
    RenderFailed,
    Rendered,
    Uploading,
    UploadFailed,
    Uploaded,
}

impl fmt::Display for RenditionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenditionState::Pending => "pending",
            RenditionState::Rendering => "rendering",
            RenditionState::RenderFailed => "render_failed",
            RenditionState::Rendered => "rendered",
            RenditionState::Uploading => "uploading",
            RenditionState::UploadFailed => "upload_failed",
            RenditionState::Uploaded => "uploaded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionOutcome {
    pub size: String,
    pub path: String,
    pub state: RenditionState,
    pub key: Option<String>,
}

/// Every task spawned for one job.
pub struct DispatchHandle {
    pub job_id: Uuid,
    tasks: Vec<JoinHandle<RenditionOutcome>>,
}

impl DispatchHandle {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every task. A task that panicked is logged and left out.
    pub async fn join(self) -> Vec<RenditionOutcome> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            match task.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(job_id = %self.job_id, error = %e, "Rendition task aborted"),
            }
        }
        outcomes
    }
}

/// Fans a job out into one render-then-upload task per requested size.
///
/// At most `concurrency` tasks run at once. Dispatch waits for a free slot
/// before spawning each task, so a saturated dispatcher stalls its caller
/// instead of queueing work in memory.
#[derive(Clone)]
pub struct JobDispatcher {
    renderer: Arc<dyn Renderer>,
    uploader: StorageUploader,
    reporter: FailureReporter,
    permits: Arc<Semaphore>,
}

impl JobDispatcher {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        uploader: StorageUploader,
        reporter: FailureReporter,
        concurrency: usize,
    ) -> Self {
        Self {
            renderer,
            uploader,
            reporter,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub async fn dispatch(&self, job: ResizeJob) -> DispatchHandle {
        let job_id = Uuid::new_v4();
        info!(
            %job_id,
            src = %job.source,
            dst = %job.destination_prefix,
            sizes = ?job.sizes,
            "📦 Dispatching resize job"
        );

        let job = Arc::new(job);
        let mut tasks = Vec::with_capacity(job.sizes.len());

        for size in job.sizes.iter().cloned() {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(%job_id, %size, "Dispatcher closed; rendition skipped");
                    continue;
                }
            };

            let this = self.clone();
            let job = Arc::clone(&job);
            let span = info_span!("rendition", %job_id, %size, width = size::resolve(&size));

            tasks.push(tokio::spawn(
                async move {
                    let outcome = this.run(&job, size).await;
                    drop(permit);
                    outcome
                }
                .instrument(span),
            ));
        }

        DispatchHandle { job_id, tasks }
    }

    async fn run(&self, job: &ResizeJob, size: String) -> RenditionOutcome {
        let path = job.rendition_path(&size);
        let mut outcome = RenditionOutcome {
            size,
            path,
            state: RenditionState::Pending,
            key: None,
        };

        outcome.state = RenditionState::Rendering;
        debug!(state = %outcome.state, src = %job.source, dst = %outcome.path);
        let width = size::resolve(&outcome.size);
        if let Err(e) = self.renderer.render(&job.source, &outcome.path, width).await {
            outcome.state = RenditionState::RenderFailed;
            self.reporter
                .report(&e, &format!("Failed resize to {}", outcome.size))
                .await;
            return outcome;
        }
        outcome.state = RenditionState::Rendered;
        debug!(state = %outcome.state, path = %outcome.path);

        outcome.state = RenditionState::Uploading;
        match self.uploader.upload(&outcome.path).await {
            Ok(receipt) => {
                outcome.state = RenditionState::Uploaded;
                debug!(
                    state = %outcome.state,
                    key = %receipt.key,
                    content_type = %receipt.content_type,
                    bytes = receipt.content_length
                );
                outcome.key = Some(receipt.key);
            }
            Err(e) => {
                outcome.state = RenditionState::UploadFailed;
                self.reporter
                    .report(&e, &format!("Failed upload of {}", outcome.path))
                    .await;
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::reporter::fakes::{MemoryNotifier, MemorySink};
    use crate::modules::resize::error::RenderError;
    use crate::modules::resize::renderer::ImageRenderer;
    use crate::modules::resize::uploader::fakes::RecordingStore;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Writes a placeholder JPEG header; fails for one width.
    struct StubRenderer {
        fail_width: Option<u32>,
        calls: Mutex<Vec<(String, u32)>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StubRenderer {
        fn new(fail_width: Option<u32>) -> Self {
            Self {
                fail_width,
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Renderer for StubRenderer {
        async fn render(&self, source: &str, dest: &str, width: u32) -> Result<(), RenderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.calls.lock().unwrap().push((dest.to_string(), width));
            if Some(width) == self.fail_width {
                return Err(RenderError::SourceUnreadable {
                    path: source.to_string(),
                    reason: "stub failure".to_string(),
                });
            }
            std::fs::write(dest, [0xFF, 0xD8, 0xFF, 0xE0]).map_err(|e| {
                RenderError::DestUnwritable {
                    path: dest.to_string(),
                    reason: e.to_string(),
                    identity: String::new(),
                }
            })
        }
    }

    struct Harness {
        _temp_dir: TempDir,
        prefix: String,
        store: Arc<RecordingStore>,
        sink: Arc<MemorySink>,
        notifier: Arc<MemoryNotifier>,
    }

    impl Harness {
        fn new(store: RecordingStore) -> Self {
            let temp_dir = TempDir::new().unwrap();
            let media = temp_dir.path().join("data").join("media");
            std::fs::create_dir_all(&media).unwrap();
            let prefix = format!("{}/out_", media.to_str().unwrap());
            Self {
                _temp_dir: temp_dir,
                prefix,
                store: Arc::new(store),
                sink: Arc::new(MemorySink::default()),
                notifier: Arc::new(MemoryNotifier::default()),
            }
        }

        fn dispatcher(&self, renderer: Arc<dyn Renderer>, concurrency: usize) -> JobDispatcher {
            JobDispatcher::new(
                renderer,
                StorageUploader::new(self.store.clone()),
                FailureReporter::new(self.sink.clone(), self.notifier.clone()),
                concurrency,
            )
        }

        fn job(&self, source: &str, sizes: &[&str]) -> ResizeJob {
            ResizeJob {
                source: source.to_string(),
                destination_prefix: self.prefix.clone(),
                sizes: sizes.iter().map(|s| s.to_string()).collect(),
            }
        }

        fn reports(&self) -> Vec<String> {
            self.sink.lines.lock().unwrap().clone()
        }
    }

    fn state_of<'a>(outcomes: &'a [RenditionOutcome], size: &str) -> Vec<&'a RenditionOutcome> {
        outcomes.iter().filter(|o| o.size == size).collect()
    }

    #[tokio::test]
    async fn one_task_per_size_including_duplicates() {
        let harness = Harness::new(RecordingStore::default());
        let renderer = Arc::new(StubRenderer::new(None));
        let dispatcher = harness.dispatcher(renderer.clone(), 4);

        let handle = dispatcher
            .dispatch(harness.job("/src.png", &["xl", "lg", "md", "sm", "xs", "sm"]))
            .await;
        assert_eq!(handle.task_count(), 6);

        let outcomes = handle.join().await;
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| o.state == RenditionState::Uploaded));
        assert_eq!(renderer.calls.lock().unwrap().len(), 6);
        assert_eq!(harness.store.puts.lock().unwrap().len(), 6);
        assert!(harness.reports().is_empty());
    }

    #[tokio::test]
    async fn empty_job_spawns_nothing() {
        let harness = Harness::new(RecordingStore::default());
        let dispatcher = harness.dispatcher(Arc::new(StubRenderer::new(None)), 4);

        let handle = dispatcher.dispatch(ResizeJob::decode(b"{oops")).await;

        assert_eq!(handle.task_count(), 0);
        assert!(handle.join().await.is_empty());
        assert!(harness.reports().is_empty());
        assert!(harness.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn render_failure_does_not_touch_siblings() {
        let harness = Harness::new(RecordingStore::default());
        let dispatcher = harness.dispatcher(Arc::new(StubRenderer::new(Some(460))), 4);

        let outcomes = dispatcher
            .dispatch(harness.job("/src.png", &["lg", "md", "sm"]))
            .await
            .join()
            .await;

        assert_eq!(state_of(&outcomes, "md")[0].state, RenditionState::RenderFailed);
        assert_eq!(state_of(&outcomes, "lg")[0].state, RenditionState::Uploaded);
        assert_eq!(state_of(&outcomes, "sm")[0].state, RenditionState::Uploaded);
        assert_eq!(
            harness.store.keys(),
            vec!["/media/out_lg.jpg", "/media/out_sm.jpg"]
        );
        assert_eq!(harness.reports().len(), 1);
    }

    #[tokio::test]
    async fn upload_failure_does_not_touch_siblings() {
        let harness = Harness::new(RecordingStore::rejecting("out_xs"));
        let dispatcher = harness.dispatcher(Arc::new(StubRenderer::new(None)), 4);

        let outcomes = dispatcher
            .dispatch(harness.job("/src.png", &["xs", "xl"]))
            .await
            .join()
            .await;

        assert_eq!(state_of(&outcomes, "xs")[0].state, RenditionState::UploadFailed);
        assert_eq!(state_of(&outcomes, "xl")[0].state, RenditionState::Uploaded);
        assert_eq!(
            state_of(&outcomes, "xl")[0].key.as_deref(),
            Some("/media/out_xl.jpg")
        );
        assert_eq!(harness.reports().len(), 1);
        assert_eq!(harness.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_size_fails_only_its_own_task() {
        let harness = Harness::new(RecordingStore::default());
        let dispatcher = harness.dispatcher(Arc::new(ImageRenderer::default()), 4);

        let outcomes = dispatcher
            .dispatch(harness.job("/src.png", &["huge"]))
            .await
            .join()
            .await;

        assert_eq!(outcomes[0].state, RenditionState::RenderFailed);
        assert!(harness.reports()[0].contains("zero width"));
        assert!(harness.store.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let harness = Harness::new(RecordingStore::default());
        let renderer = Arc::new(StubRenderer::new(None));
        let dispatcher = harness.dispatcher(renderer.clone(), 2);

        let sizes = ["xl", "lg", "md", "sm", "xs", "xl", "lg", "md"];
        let outcomes = dispatcher
            .dispatch(harness.job("/src.png", &sizes))
            .await
            .join()
            .await;

        assert_eq!(outcomes.len(), sizes.len());
        assert!(renderer.peak.load(Ordering::SeqCst) <= 2);
    }

    fn write_source(path: &std::path::Path, width: u32, height: u32) {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        DynamicImage::ImageRgb8(img).save(path).unwrap();
    }

    #[tokio::test]
    async fn sm_and_xs_end_to_end() {
        let harness = Harness::new(RecordingStore::default());
        let source = harness._temp_dir.path().join("a.png");
        write_source(&source, 760, 500);
        let dispatcher = harness.dispatcher(Arc::new(ImageRenderer::default()), 4);

        let outcomes = dispatcher
            .dispatch(harness.job(source.to_str().unwrap(), &["sm", "xs"]))
            .await
            .join()
            .await;

        assert!(outcomes.iter().all(|o| o.state == RenditionState::Uploaded));
        let sm = format!("{}sm.jpg", harness.prefix);
        let xs = format!("{}xs.jpg", harness.prefix);
        assert_eq!(image::image_dimensions(&sm).unwrap().0, 380);
        assert_eq!(image::image_dimensions(&xs).unwrap().0, 160);
        assert_eq!(
            harness.store.keys(),
            vec!["/media/out_sm.jpg", "/media/out_xs.jpg"]
        );
        for put in harness.store.puts.lock().unwrap().iter() {
            assert_eq!(put.content_type, "image/jpeg");
        }
    }

    #[tokio::test]
    async fn unreadable_source_reports_once_per_task_and_uploads_nothing() {
        let harness = Harness::new(RecordingStore::default());
        let dispatcher = harness.dispatcher(Arc::new(ImageRenderer::default()), 4);

        let outcomes = dispatcher
            .dispatch(harness.job("/no/such/source.png", &["sm"]))
            .await
            .join()
            .await;

        assert_eq!(outcomes[0].state, RenditionState::RenderFailed);
        let reports = harness.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].contains("failed to load original image"));
        assert!(harness.store.puts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rerun_uploads_same_bytes_under_same_key() {
        let harness = Harness::new(RecordingStore::default());
        let source = harness._temp_dir.path().join("a.png");
        write_source(&source, 400, 300);
        let dispatcher = harness.dispatcher(Arc::new(ImageRenderer::default()), 4);

        for _ in 0..2 {
            dispatcher
                .dispatch(harness.job(source.to_str().unwrap(), &["xs"]))
                .await
                .join()
                .await;
        }

        let puts = harness.store.puts.lock().unwrap();
        assert_eq!(puts.len(), 2);
        assert_eq!(puts[0].key, "/media/out_xs.jpg");
        assert_eq!(puts[0].key, puts[1].key);
        assert_eq!(puts[0].body, puts[1].body);
    }
}
