//! Compression, encryption, verification and upload of WAL files, streams
//! and archive parts.

mod parts;
mod tracker;
mod verify;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};
use walpush_storage::retry::retry_storage;
use walpush_storage::{ObjectStore, RetryConfig, UploadOptions, UploadOutput};
use walpush_types::{is_wal_filename, WalSegmentName};

use crate::compress::{CompressingPipe, Compressor};
use crate::config::PushConfig;
use crate::crypto::Crypter;
use crate::delta::{DeltaFileManager, DeltaRecordingReader, PageTap, ParserFactory};
use crate::error::{Result, WalpushError};
use crate::sentinel::{CompletionMarker, StorageSentinel};
use crate::tarball::{CompletedPart, PartLocation};

pub use parts::PartUploader;
pub use tracker::{InFlight, UploadFailure, UploadSummary, UploadTracker};
pub use verify::{tag_matches, Md5Reader};

/// Subpath for archived WAL segments.
pub const WAL_PATH: &str = "wal_005/";
/// Subpath for base backups and their completion markers.
pub const BASEBACKUP_PATH: &str = "basebackups_005/";

/// A byte source together with the name it is uploaded under.
pub struct NamedReader {
    name: String,
    reader: Box<dyn Read + Send>,
}

impl NamedReader {
    pub fn new(name: impl Into<String>, reader: Box<dyn Read + Send>) -> Self {
        Self {
            name: name.into(),
            reader,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| WalpushError::Walk {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(path.to_string_lossy(), Box::new(file)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Final path component of the name.
    pub fn base_name(&self) -> String {
        Path::new(&self.name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }
}

/// Delta tracking hooked into WAL uploads.
#[derive(Clone)]
pub struct DeltaTap {
    manager: Arc<DeltaFileManager>,
    parsers: Arc<dyn ParserFactory>,
}

impl DeltaTap {
    pub fn new(manager: Arc<DeltaFileManager>, parsers: Arc<dyn ParserFactory>) -> Self {
        Self { manager, parsers }
    }

    pub fn manager(&self) -> &Arc<DeltaFileManager> {
        &self.manager
    }

    fn tap(&self, segment: &WalSegmentName) -> Result<PageTap> {
        let sender = self.manager.location_sender(segment)?;
        PageTap::spawn(self.parsers.new_parser(), sender)
    }
}

/// Uploads through one object store.
///
/// Clones share the store, destination, options, capabilities and delta
/// manager, but each clone tracks only the uploads it performed itself.
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    options: UploadOptions,
    compressor: Arc<dyn Compressor>,
    crypter: Option<Arc<dyn Crypter>>,
    delta: Option<DeltaTap>,
    marker: Arc<dyn CompletionMarker>,
    verify: bool,
    retry: RetryConfig,
    tracker: Arc<UploadTracker>,
}

impl Clone for Uploader {
    fn clone(&self) -> Self {
        self.with_tracker(UploadTracker::new())
    }
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, compressor: Arc<dyn Compressor>) -> Self {
        Self {
            store,
            prefix: String::new(),
            options: UploadOptions {
                storage_class: "STANDARD".into(),
                ..UploadOptions::default()
            },
            compressor,
            crypter: None,
            delta: None,
            marker: Arc::new(StorageSentinel),
            verify: false,
            retry: RetryConfig::default(),
            tracker: UploadTracker::new(),
        }
    }

    /// Build from validated configuration. A parser factory is required when
    /// delta tracking is enabled.
    pub fn from_config(
        store: Arc<dyn ObjectStore>,
        config: &PushConfig,
        crypter: Option<Arc<dyn Crypter>>,
        parsers: Option<Arc<dyn ParserFactory>>,
    ) -> Result<Self> {
        config.validate()?;
        let mut uploader = Self::new(store, Arc::new(config.compression()?))
            .with_prefix(&config.upload.prefix)
            .with_options(config.upload.upload_options())
            .with_verify(config.upload.verify)
            .with_retry(config.retry.clone());
        if let Some(crypter) = crypter {
            uploader = uploader.with_crypter(crypter);
        }
        if let Some(manager) = DeltaFileManager::from_config(&config.delta)? {
            let parsers = parsers.ok_or_else(|| {
                WalpushError::Config("delta tracking enabled without a WAL parser".into())
            })?;
            uploader = uploader.with_delta(DeltaTap::new(Arc::new(manager), parsers));
        }
        Ok(uploader)
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = normalize_prefix(prefix);
        self
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_crypter(mut self, crypter: Arc<dyn Crypter>) -> Self {
        self.crypter = Some(crypter);
        self
    }

    pub fn with_delta(mut self, delta: DeltaTap) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Replace the default stop-sentinel marker.
    pub fn with_marker(mut self, marker: Arc<dyn CompletionMarker>) -> Self {
        self.marker = marker;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn compressor(&self) -> &Arc<dyn Compressor> {
        &self.compressor
    }

    pub fn delta(&self) -> Option<&DeltaTap> {
        self.delta.as_ref()
    }

    pub fn tracker(&self) -> &Arc<UploadTracker> {
        &self.tracker
    }

    fn with_tracker(&self, tracker: Arc<UploadTracker>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: self.prefix.clone(),
            options: self.options.clone(),
            compressor: Arc::clone(&self.compressor),
            crypter: self.crypter.clone(),
            delta: self.delta.clone(),
            marker: Arc::clone(&self.marker),
            verify: self.verify,
            retry: self.retry.clone(),
            tracker,
        }
    }

    /// Full object key for a path relative to the destination prefix.
    pub fn object_key(&self, rel: &str) -> String {
        format!("{}{}", self.prefix, rel.trim_start_matches('/'))
    }

    pub fn wal_key(&self, base_name: &str) -> String {
        self.object_key(&format!(
            "{WAL_PATH}{base_name}.{}",
            self.compressor.file_extension()
        ))
    }

    pub fn stream_key(&self, backup_name: &str) -> String {
        self.object_key(&format!(
            "{BASEBACKUP_PATH}{backup_name}/stream.{}",
            self.compressor.file_extension()
        ))
    }

    pub fn part_key(&self, backup_name: &str, part_name: &str) -> String {
        self.object_key(&format!(
            "{BASEBACKUP_PATH}{backup_name}/tar_partitions/{part_name}"
        ))
    }

    /// Upload a WAL file, recording its block deltas when delta tracking is
    /// on and the name is a WAL segment. Failing to attach the recorder only
    /// costs the delta file for this segment. A failed upload discards the
    /// segment's pending locations so a retry records them once.
    pub fn upload_wal_file(&self, file: NamedReader) -> Result<UploadOutput> {
        let base = file.base_name();
        let tracked = match &self.delta {
            Some(delta) if is_wal_filename(&base) => WalSegmentName::parse(&base)
                .ok()
                .map(|segment| (delta, segment)),
            _ => None,
        };

        let Some((delta, segment)) = tracked else {
            return self.upload_file(file);
        };

        let NamedReader { name, reader } = file;
        let reader: Box<dyn Read + Send> = match delta.tap(&segment) {
            Ok(tap) => Box::new(DeltaRecordingReader::new(reader, tap)),
            Err(e) => {
                warn!(segment = %segment, error = %e, "delta recording unavailable, uploading without it");
                reader
            }
        };

        let output = match self.upload_file(NamedReader::new(name, reader)) {
            Ok(output) => output,
            Err(e) => {
                if let Err(discard) = delta.manager.discard_segment(&segment) {
                    warn!(segment = %segment, error = %discard, "failed to discard delta writer");
                }
                return Err(e);
            }
        };
        if let Err(e) = delta.manager.flush_segment(&segment) {
            warn!(segment = %segment, error = %e, "failed to flush delta file");
        }
        Ok(output)
    }

    /// Compress (and encrypt, when configured) a file and upload it under
    /// the WAL subpath.
    pub fn upload_file(&self, file: NamedReader) -> Result<UploadOutput> {
        let key = self.wal_key(&file.base_name());
        let output = self.upload_compressed(&key, file.reader)?;
        info!(key = %key, "uploaded file");
        Ok(output)
    }

    /// Upload standard input as the backup named `backup_name`.
    pub fn upload_stream(&self, backup_name: &str) -> Result<UploadOutput> {
        self.upload_stream_from(backup_name, Box::new(io::stdin()))
    }

    /// Upload `input` as the stream backup `backup_name`, then write the
    /// completion marker. No marker is written when the upload fails.
    pub fn upload_stream_from(
        &self,
        backup_name: &str,
        input: Box<dyn Read + Send>,
    ) -> Result<UploadOutput> {
        let key = self.stream_key(backup_name);
        let output = self.upload_compressed(&key, input)?;
        info!(key = %key, "uploaded stream");
        self.marker.mark_complete(self, backup_name)?;
        Ok(output)
    }

    /// Store bytes as-is (no compression or encryption) under a path
    /// relative to the destination prefix.
    pub fn upload_raw(&self, rel: &str, body: &mut dyn Read) -> Result<UploadOutput> {
        let key = self.object_key(rel);
        self.upload_verified(&key, body)
    }

    fn upload_compressed(&self, key: &str, input: Box<dyn Read + Send>) -> Result<UploadOutput> {
        let pipe = CompressingPipe::new(Arc::clone(&self.compressor), self.crypter.clone());
        let mut compressed = match pipe.spawn(input) {
            Ok(reader) => reader,
            Err(e) => {
                self.tracker.record_failure(key, &e, e.is_fatal());
                return Err(e);
            }
        };
        self.upload_verified(key, &mut compressed)
    }

    fn upload_verified(&self, key: &str, body: &mut dyn Read) -> Result<UploadOutput> {
        if !self.verify {
            let output = self.upload(key, body)?;
            self.tracker.record_success(key);
            return Ok(output);
        }

        let mut hashed = Md5Reader::new(body);
        let output = self.upload(key, &mut hashed)?;
        if let Err(e) = self.verify_upload(key, &hashed.hex_digest()) {
            self.tracker.record_failure(key, &e, e.is_fatal());
            return Err(e);
        }
        self.tracker.record_success(key);
        Ok(output)
    }

    /// Exactly one store call. Failures are logged by kind and reported as
    /// [`WalpushError::Upload`].
    fn upload(&self, key: &str, body: &mut dyn Read) -> Result<UploadOutput> {
        match self.store.upload(key, body, &self.options) {
            Ok(output) => Ok(output),
            Err(source) => {
                match source.upload_id() {
                    Some(upload_id) => {
                        error!(key = %key, upload_id = %upload_id, "multipart upload failed")
                    }
                    None => error!(key = %key, error = %source, "upload failed"),
                }
                let err = WalpushError::Upload {
                    key: key.to_string(),
                    source,
                };
                self.tracker.record_failure(key, &err, false);
                Err(err)
            }
        }
    }

    fn verify_upload(&self, key: &str, digest: &str) -> Result<()> {
        let mismatch = |actual: String| WalpushError::VerificationFailed {
            key: key.to_string(),
            expected: digest.to_string(),
            actual,
        };
        let tag = retry_storage(&self.retry, "object_tag", || self.store.object_tag(key))
            .map_err(|e| mismatch(format!("unavailable ({e})")))?
            .ok_or_else(|| mismatch("missing".into()))?;

        if !tag_matches(&tag, digest) {
            error!(key = %key, md5 = %digest, etag = %tag, "upload verification failed");
            return Err(mismatch(tag));
        }
        info!(key = %key, etag = %tag, "upload verified");
        Ok(())
    }

    /// Upload a closed archive part in the background. The part's bytes are
    /// already compressed and encrypted. Completion is observed through
    /// [`finish`](Self::finish).
    pub fn spawn_part_upload(&self, part: CompletedPart, backup_name: &str) -> Result<()> {
        let key = self.part_key(backup_name, &part.name);
        let guard = self.tracker.begin();
        let worker = self.with_tracker(Arc::clone(&self.tracker));
        std::thread::Builder::new()
            .name(format!("part-upload-{:03}", part.number))
            .spawn(move || {
                let _guard = guard;
                let mut body: Box<dyn Read> = match &part.location {
                    PartLocation::File(path) => match File::open(path) {
                        Ok(file) => Box::new(file),
                        Err(e) => {
                            error!(key = %key, path = %path.display(), error = %e, "cannot open part");
                            worker.tracker.record_failure(&key, e, false);
                            return;
                        }
                    },
                    PartLocation::Memory(buffer) => Box::new(io::Cursor::new(buffer.contents())),
                };
                if worker.upload_verified(&key, &mut body).is_ok() {
                    info!(key = %key, part = part.number, "uploaded part");
                }
            })
            .map_err(|e| WalpushError::Other(format!("spawn part upload: {e}")))?;
        Ok(())
    }

    /// Wait for this clone's background uploads and report the outcome.
    pub fn finish(&self) -> UploadSummary {
        let summary = self.tracker.wait();
        if !summary.succeeded() {
            error!(
                failures = summary.failures.len(),
                fatal = summary.has_fatal(),
                "could not complete upload"
            );
        }
        summary
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}
