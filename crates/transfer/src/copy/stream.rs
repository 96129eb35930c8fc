use crate::commit::CommitBuffer;
use crate::copy::{TransferEvent, TransferOptions, TransferSummary};
use crate::error::{ErrorKind, Result};
use crate::registry::Endpoint;
use async_stream::stream;
use exn::ResultExt;
use futures::Stream;
use mediashift_catalog::{Batch, Candidate, Database, PlacementRepository, Representation};
use std::time::Instant;

enum Outcome {
    Copied(u64),
    Skipped,
}

/// Streams [`TransferEvent`]s while copying every candidate of `batch` from
/// `source` to `target`.
///
/// Both endpoints must already be validated (see
/// [`prepare`](crate::copy::prepare)). Objects are copied one at a time in
/// batch order. Cancellation is checked before each object: the object in
/// flight always finishes, then the pending placements are committed and the
/// stream completes with an interrupted summary.
///
/// Per-object failures are reported as [`TransferEvent::Failed`] without
/// ending the stream; only a catalog failure is fatal.
pub fn transfer<'a>(
    catalog: &'a Database,
    source: &'a Endpoint,
    target: &'a Endpoint,
    batch: &'a Batch,
    options: &'a TransferOptions,
) -> impl Stream<Item = Result<TransferEvent>> + 'a {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        yield Ok(TransferEvent::Started);
        if source.storage_id == target.storage_id {
            yield Err(exn::Exn::from(ErrorKind::InvalidRequest("source and target must be different backends")));
            return;
        }

        let candidates = match batch
            .candidates(catalog, source.storage_id, target.storage_id)
            .await
            .or_raise(|| ErrorKind::Catalog)
        {
            Ok(c) => c,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        let mut summary = TransferSummary { discovered: candidates.len() as u64, ..TransferSummary::default() };
        let bytes = candidates.iter().map(|c| c.byte_size).sum();
        yield Ok(TransferEvent::DiscoveryComplete { objects: summary.discovered, bytes });

        if options.dry_run {
            for candidate in candidates {
                yield Ok(TransferEvent::Planned(candidate));
            }
            yield Ok(TransferEvent::Complete(summary));
            return;
        }

        let placements = PlacementRepository::from(catalog);
        let mut buffer = CommitBuffer::new(options.commit_threshold, options.commit_interval);
        for candidate in candidates {
            if options.cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }
            match copy_object(source, target, &candidate, options.skip_existing).await {
                Ok(Outcome::Copied(bytes)) => {
                    buffer.push(candidate.file_id);
                    summary.transferred += 1;
                    summary.bytes += bytes;
                    yield Ok(TransferEvent::Transferred {
                        file_id: candidate.file_id,
                        object_name: candidate.object_name,
                        bytes,
                    });
                },
                Ok(Outcome::Skipped) => {
                    buffer.push(candidate.file_id);
                    summary.skipped += 1;
                    yield Ok(TransferEvent::Skipped { file_id: candidate.file_id, object_name: candidate.object_name });
                },
                Err(error) => {
                    tracing::warn!(
                        file_id = candidate.file_id,
                        object = %candidate.object_name,
                        source = source.storage_id,
                        target = target.storage_id,
                        error = ?error,
                        "object transfer failed"
                    );
                    summary.failed += 1;
                    yield Ok(TransferEvent::Failed { file_id: candidate.file_id, object_name: candidate.object_name, error });
                },
            }
            if buffer.is_due(Instant::now()) {
                match flush(&placements, batch, target, &mut buffer).await {
                    Ok(count) => {
                        summary.committed += count;
                        yield Ok(TransferEvent::Committed(count));
                    },
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                }
            }
        }

        if summary.interrupted {
            yield Ok(TransferEvent::Interrupted);
        }
        if !buffer.is_empty() {
            match flush(&placements, batch, target, &mut buffer).await {
                Ok(count) => {
                    summary.committed += count;
                    yield Ok(TransferEvent::Committed(count));
                },
                Err(e) => {
                    yield Err(e);
                    return;
                },
            }
        }
        yield Ok(TransferEvent::Complete(summary));
    })
}

async fn copy_object(source: &Endpoint, target: &Endpoint, candidate: &Candidate, skip_existing: bool) -> Result<Outcome> {
    let name = candidate.object_name.as_str();
    if skip_existing && target.backend.exists(name).await.or_raise(|| ErrorKind::Storage)? {
        return Ok(Outcome::Skipped);
    }
    let data = source.backend.read_stream(name).await.or_raise(|| ErrorKind::Storage)?;
    let written = target
        .backend
        .write_stream(name, data, Some(candidate.byte_size))
        .await
        .or_raise(|| ErrorKind::Storage)?;
    if written != candidate.byte_size {
        tracing::warn!(file_id = candidate.file_id, object = name, catalog = candidate.byte_size, written, "object size differs from catalog");
    }
    Ok(Outcome::Copied(written))
}

/// Record every buffered object as an original on the target.
async fn flush(
    placements: &PlacementRepository,
    batch: &Batch,
    target: &Endpoint,
    buffer: &mut CommitBuffer<i64>,
) -> Result<u64> {
    let file_ids = buffer.take(Instant::now());
    placements
        .insert(batch.media_type, target.storage_id, Representation::Original, &file_ids)
        .await
        .or_raise(|| ErrorKind::CatalogCommit)?;
    tracing::debug!(target = target.storage_id, count = file_ids.len(), "placements committed");
    Ok(file_ids.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copy::run_transfer;
    use futures::StreamExt;
    use mediashift_catalog::fixtures::Fixtures;
    use mediashift_catalog::{MediaType, batch};
    use mediashift_storage::StorageBackend;
    use mediashift_storage::backend::MockBackend;
    use std::sync::Arc;

    const NAMES: [&str; 3] = ["2019/a.jpg", "2019/b.jpg", "2019/c.jpg"];

    struct Setup {
        db: Database,
        files: Vec<i64>,
        source: Arc<MockBackend>,
        target: Arc<MockBackend>,
        source_endpoint: Endpoint,
        target_endpoint: Endpoint,
    }
    impl Setup {
        /// Three images placed on the source; `on_target` are already present
        /// on the target backend (but not in the catalog).
        async fn new(on_target: &[&str]) -> Self {
            let db = Database::connect_in_memory().await.unwrap();
            let fx = Fixtures::new(&db);
            let source_id = fx.backend("/mnt/source").await;
            let target_id = fx.backend("/mnt/target").await;
            let deployment = fx.deployment("d1", None).await;
            let mut files = Vec::new();
            for name in NAMES {
                let file = fx.file(MediaType::Image, deployment, name, name.len() as u64).await;
                fx.place(MediaType::Image, file, source_id, Representation::Original).await;
                files.push(file);
            }
            let source = Arc::new(MockBackend::with_files(NAMES.map(|name| (name, name.as_bytes()))).with_name("source"));
            let target =
                Arc::new(MockBackend::with_files(on_target.iter().map(|name| (*name, name.as_bytes()))).with_name("target"));
            Self {
                source_endpoint: Endpoint::new(source_id, source.clone()),
                target_endpoint: Endpoint::new(target_id, target.clone()),
                db,
                files,
                source,
                target,
            }
        }

        async fn run(&self, options: &TransferOptions) -> TransferSummary {
            let batch = batch::find(1).unwrap();
            run_transfer(&self.db, &self.source_endpoint, &self.target_endpoint, batch, options).await.unwrap()
        }

        async fn events(&self, options: &TransferOptions) -> Vec<TransferEvent> {
            let batch = batch::find(1).unwrap();
            let stream = transfer(&self.db, &self.source_endpoint, &self.target_endpoint, batch, options);
            stream.map(|event| event.unwrap()).collect().await
        }

        async fn committed_on_target(&self) -> u64 {
            PlacementRepository::from(&self.db)
                .count(MediaType::Image, self.target_endpoint.storage_id, Representation::Original)
                .await
                .unwrap()
        }
    }

    fn commits(events: &[TransferEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::Committed(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_copies_batch_with_one_row_per_object() {
        let setup = Setup::new(&[]).await;
        let summary = setup.run(&TransferOptions::default()).await;
        assert_eq!(
            summary,
            TransferSummary { discovered: 3, transferred: 3, bytes: 30, committed: 3, ..TransferSummary::default() }
        );
        assert_eq!(setup.target.object_names().await, NAMES);
        assert_eq!(setup.target.read("2019/b.jpg").await.unwrap(), b"2019/b.jpg");
        let placements = PlacementRepository::from(&setup.db);
        for file in &setup.files {
            let on_target: Vec<_> = placements
                .for_file(MediaType::Image, *file)
                .await
                .unwrap()
                .into_iter()
                .filter(|p| p.storage_id == setup.target_endpoint.storage_id)
                .collect();
            assert_eq!(on_target.len(), 1);
            assert_eq!(on_target[0].representation, Representation::Original);
        }
    }

    #[tokio::test]
    async fn test_second_run_transfers_nothing() {
        let setup = Setup::new(&[]).await;
        setup.run(&TransferOptions::default()).await;
        let second = setup.run(&TransferOptions::default()).await;
        assert_eq!(second.discovered, 0);
        assert_eq!(second.transferred, 0);
        assert_eq!(setup.target.writes(), 3);
        assert_eq!(setup.committed_on_target().await, 3);
    }

    #[tokio::test]
    async fn test_commits_at_threshold() {
        let setup = Setup::new(&[]).await;
        let options = TransferOptions { commit_threshold: 2, ..TransferOptions::default() };
        let events = setup.events(&options).await;
        assert_eq!(commits(&events), vec![2, 1]);
        assert!(matches!(events.first(), Some(TransferEvent::Started)));
        assert!(matches!(events.get(1), Some(TransferEvent::DiscoveryComplete { objects: 3, bytes: 30 })));
        assert!(matches!(events.last(), Some(TransferEvent::Complete(s)) if s.committed == 3));
        assert_eq!(setup.committed_on_target().await, 3);
    }

    #[tokio::test]
    async fn test_interrupted_run_commits_completed_objects_only() {
        let setup = Setup::new(&[]).await;
        let options = TransferOptions::default();
        let batch = batch::find(1).unwrap();
        let stream = transfer(&setup.db, &setup.source_endpoint, &setup.target_endpoint, batch, &options);
        futures::pin_mut!(stream);
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            let event = event.unwrap();
            // Signal arrives while the first object is being reported.
            if matches!(event, TransferEvent::Transferred { .. }) {
                options.cancel.cancel();
            }
            events.push(event);
        }
        assert!(events.iter().any(|e| matches!(e, TransferEvent::Interrupted)));
        let Some(TransferEvent::Complete(summary)) = events.last() else {
            panic!("stream did not complete");
        };
        assert!(summary.interrupted);
        assert_eq!((summary.transferred, summary.committed), (1, 1));
        assert_eq!(setup.target.object_names().await, vec!["2019/a.jpg"]);
        assert_eq!(setup.committed_on_target().await, 1);

        // The next run picks up the rest.
        let resumed = setup.run(&TransferOptions::default()).await;
        assert_eq!(resumed.transferred, 2);
        assert_eq!(setup.committed_on_target().await, 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_commits_nothing() {
        let setup = Setup::new(&[]).await;
        let options = TransferOptions::default();
        options.cancel.cancel();
        let summary = setup.run(&options).await;
        assert!(summary.interrupted);
        assert_eq!((summary.discovered, summary.transferred, summary.committed), (3, 0, 0));
        assert_eq!(setup.target.writes(), 0);
    }

    #[tokio::test]
    async fn test_failed_object_stays_eligible() {
        let setup = Setup::new(&[]).await;
        setup.target.set_failing("2019/b.jpg", true);
        let summary = setup.run(&TransferOptions::default()).await;
        assert_eq!((summary.transferred, summary.failed, summary.committed), (2, 1, 2));
        assert_eq!(setup.committed_on_target().await, 2);

        setup.target.set_failing("2019/b.jpg", false);
        let retry = setup.run(&TransferOptions::default()).await;
        assert_eq!((retry.discovered, retry.transferred, retry.failed), (1, 1, 0));
        assert_eq!(setup.committed_on_target().await, 3);
    }

    #[tokio::test]
    async fn test_missing_source_object_is_reported() {
        let setup = Setup::new(&[]).await;
        setup.source.remove("2019/c.jpg").await.unwrap();
        let events = setup.events(&TransferOptions::default()).await;
        let failed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::Failed { object_name, error, .. } => Some((object_name.as_str(), error)),
                _ => None,
            })
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "2019/c.jpg");
        assert!(matches!(&**failed[0].1, ErrorKind::Storage));
    }

    #[tokio::test]
    async fn test_skip_existing() {
        let setup = Setup::new(&["2019/a.jpg"]).await;
        let options = TransferOptions { skip_existing: true, ..TransferOptions::default() };
        let summary = setup.run(&options).await;
        assert_eq!((summary.transferred, summary.skipped, summary.committed), (2, 1, 3));
        assert_eq!(setup.source.reads(), 2);
        assert_eq!(setup.target.writes(), 2);
        assert_eq!(setup.committed_on_target().await, 3);
    }

    #[tokio::test]
    async fn test_without_skip_existing_overwrites() {
        let setup = Setup::new(&["2019/a.jpg"]).await;
        let summary = setup.run(&TransferOptions::default()).await;
        assert_eq!((summary.transferred, summary.skipped), (3, 0));
        assert_eq!(setup.target.writes(), 3);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let setup = Setup::new(&[]).await;
        let options = TransferOptions { dry_run: true, ..TransferOptions::default() };
        let events = setup.events(&options).await;
        let planned = events.iter().filter(|e| matches!(e, TransferEvent::Planned(_))).count();
        assert_eq!(planned, 3);
        assert_eq!(setup.source.reads(), 0);
        assert_eq!(setup.target.writes(), 0);
        assert_eq!(setup.committed_on_target().await, 0);
    }

    #[tokio::test]
    async fn test_same_source_and_target_rejected() {
        let setup = Setup::new(&[]).await;
        let batch = batch::find(1).unwrap();
        let options = TransferOptions::default();
        let result = run_transfer(&setup.db, &setup.source_endpoint, &setup.source_endpoint, batch, &options).await;
        let err = result.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidRequest(_)));
    }
}
