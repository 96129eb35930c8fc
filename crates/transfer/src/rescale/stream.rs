use crate::commit::CommitBuffer;
use crate::error::{ErrorKind, Result};
use crate::registry::Endpoint;
use crate::rescale::{RescaleEvent, RescaleOptions, RescaleProfile, RescaleSummary};
use async_stream::stream;
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use mediashift_catalog::{Candidate, Database, PlacementRepository, RescaleUpdate, Representation, batch};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

struct Scaled {
    derived_name: String,
    bytes_in: u64,
    bytes_out: u64,
}

/// Streams [`RescaleEvent`]s while producing the scaled representation of
/// every original image of `deployment_id` on `source` that `target` does
/// not hold a scaled copy of yet.
///
/// `source` and `target` may be the same endpoint (in-place rescale). Images
/// are processed concurrently, up to `options.workers` at a time, and events
/// arrive in completion order. On cancellation no further images are
/// started; those in flight finish and are committed.
///
/// Images whose scaled object name would be shared with another image are
/// reported as failed before any worker starts and stay eligible.
pub fn rescale<'a>(
    catalog: &'a Database,
    source: &'a Endpoint,
    target: &'a Endpoint,
    deployment_id: i64,
    options: &'a RescaleOptions,
) -> impl Stream<Item = Result<RescaleEvent>> + 'a {
    stream!({
        yield Ok(RescaleEvent::Started);

        let candidates =
            match batch::rescale_candidates(catalog, source.storage_id, target.storage_id, deployment_id)
                .await
                .or_raise(|| ErrorKind::Catalog)
            {
                Ok(c) => c,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
        let mut summary = RescaleSummary { discovered: candidates.len() as u64, ..RescaleSummary::default() };
        let bytes = candidates.iter().map(|c| c.byte_size).sum();
        yield Ok(RescaleEvent::DiscoveryComplete { objects: summary.discovered, bytes });

        let in_place = source.storage_id == target.storage_id;
        let (candidates, conflicts) = split_conflicts(candidates, in_place);
        for (candidate, derived_name) in conflicts {
            tracing::warn!(
                file_id = candidate.file_id,
                object = %candidate.object_name,
                derived = %derived_name,
                "scaled object name is shared with another image, skipping"
            );
            summary.failed += 1;
            yield Ok(RescaleEvent::Failed {
                file_id: candidate.file_id,
                object_name: candidate.object_name,
                error: exn::Exn::from(ErrorKind::DerivedNameConflict(derived_name)),
            });
        }

        let placements = PlacementRepository::from(catalog);
        let mut buffer = CommitBuffer::new(options.commit_threshold, options.commit_interval);
        let mut deletions = Vec::new();
        let mut queue = candidates.into_iter();
        let mut processing = FuturesUnordered::new();
        loop {
            while processing.len() < options.workers.max(1) && !summary.interrupted {
                if options.cancel.is_cancelled() {
                    summary.interrupted = true;
                    break;
                }
                let Some(candidate) = queue.next() else {
                    break;
                };
                processing.push(process(source, target, candidate, options.profile));
            }
            let Some((candidate, result)) = processing.next().await else {
                break;
            };

            match result {
                Ok(scaled) => {
                    buffer.push(match (in_place, options.remove_original) {
                        (true, _) => RescaleUpdate::Promote { file_id: candidate.file_id, storage_id: source.storage_id },
                        (false, false) => RescaleUpdate::Add { file_id: candidate.file_id, storage_id: target.storage_id },
                        (false, true) => RescaleUpdate::Move {
                            file_id: candidate.file_id,
                            from: source.storage_id,
                            to: target.storage_id,
                        },
                    });
                    // An in-place rescale that kept the name has already
                    // replaced the original.
                    if options.remove_original && !(in_place && scaled.derived_name == candidate.object_name) {
                        match source.backend.locate(&candidate.object_name) {
                            Ok(location) => deletions.push(location),
                            Err(error) => {
                                tracing::warn!(file_id = candidate.file_id, object = %candidate.object_name, error = ?error, "cannot locate original for deletion list");
                            },
                        }
                    }
                    summary.rescaled += 1;
                    summary.bytes_in += scaled.bytes_in;
                    summary.bytes_out += scaled.bytes_out;
                    yield Ok(RescaleEvent::Rescaled {
                        file_id: candidate.file_id,
                        object_name: candidate.object_name,
                        derived_name: scaled.derived_name,
                        bytes_in: scaled.bytes_in,
                        bytes_out: scaled.bytes_out,
                    });
                },
                Err(error) => {
                    tracing::warn!(
                        file_id = candidate.file_id,
                        object = %candidate.object_name,
                        source = source.storage_id,
                        error = ?error,
                        "image rescale failed"
                    );
                    summary.failed += 1;
                    yield Ok(RescaleEvent::Failed { file_id: candidate.file_id, object_name: candidate.object_name, error });
                },
            }

            if buffer.is_due(Instant::now()) {
                match flush(&placements, &mut buffer).await {
                    Ok(count) => {
                        summary.committed += count;
                        yield Ok(RescaleEvent::Committed(count));
                    },
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                }
            }
        }

        if summary.interrupted {
            yield Ok(RescaleEvent::Interrupted);
        }
        if !buffer.is_empty() {
            match flush(&placements, &mut buffer).await {
                Ok(count) => {
                    summary.committed += count;
                    yield Ok(RescaleEvent::Committed(count));
                },
                Err(e) => {
                    yield Err(e);
                    return;
                },
            }
        }
        summary.deletions = deletions;
        yield Ok(RescaleEvent::Complete(summary));
    })
}

/// Separate candidates whose scaled object would be written under the same
/// name as another candidate's scaled object or, in place, over another
/// candidate's original. Conflicts keep candidate order.
fn split_conflicts(candidates: Vec<Candidate>, in_place: bool) -> (Vec<Candidate>, Vec<(Candidate, String)>) {
    let derived: Vec<String> =
        candidates.iter().map(|c| Representation::Scaled.object_name(&c.object_name)).collect();
    let conflicted: Vec<bool> = {
        let mut claims: HashMap<&str, usize> = HashMap::new();
        for name in &derived {
            *claims.entry(name.as_str()).or_default() += 1;
        }
        let originals: HashSet<&str> = candidates.iter().map(|c| c.object_name.as_str()).collect();
        candidates
            .iter()
            .zip(&derived)
            .map(|(candidate, name)| {
                claims.get(name.as_str()).is_some_and(|&count| count > 1)
                    || (in_place && *name != candidate.object_name && originals.contains(name.as_str()))
            })
            .collect()
    };

    let mut clear = Vec::with_capacity(candidates.len());
    let mut conflicts = Vec::new();
    for ((candidate, name), conflict) in candidates.into_iter().zip(derived).zip(conflicted) {
        match conflict {
            true => conflicts.push((candidate, name)),
            false => clear.push(candidate),
        }
    }
    (clear, conflicts)
}

async fn process(
    source: &Endpoint,
    target: &Endpoint,
    candidate: Candidate,
    profile: RescaleProfile,
) -> (Candidate, Result<Scaled>) {
    let result = scale_object(source, target, &candidate.object_name, profile).await;
    (candidate, result)
}

async fn scale_object(source: &Endpoint, target: &Endpoint, object_name: &str, profile: RescaleProfile) -> Result<Scaled> {
    let data = source.backend.read(object_name).await.or_raise(|| ErrorKind::Storage)?;
    let bytes_in = data.len() as u64;
    let encoded = tokio::task::spawn_blocking(move || profile.scale(&data)).await.or_raise(|| ErrorKind::Task)??;
    let derived_name = Representation::Scaled.object_name(object_name);
    target.backend.write(&derived_name, &encoded).await.or_raise(|| ErrorKind::Storage)?;
    Ok(Scaled { derived_name, bytes_in, bytes_out: encoded.len() as u64 })
}

async fn flush(placements: &PlacementRepository, buffer: &mut CommitBuffer<RescaleUpdate>) -> Result<u64> {
    let updates = buffer.take(Instant::now());
    placements.apply_rescale(&updates).await.or_raise(|| ErrorKind::CatalogCommit)?;
    Ok(updates.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rescale::run_rescale;
    use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
    use mediashift_catalog::MediaType;
    use mediashift_catalog::Representation::{Original, Scaled as ScaledRep};
    use mediashift_catalog::fixtures::Fixtures;
    use mediashift_storage::StorageBackend;
    use mediashift_storage::backend::MockBackend;
    use std::io::Cursor;
    use std::sync::Arc;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 160, 30])))
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn options() -> RescaleOptions {
        RescaleOptions {
            profile: RescaleProfile { max_width: 64, max_height: 64, quality: 80 },
            workers: 2,
            ..RescaleOptions::default()
        }
    }

    struct Setup {
        db: Database,
        deployment: i64,
        source: Arc<MockBackend>,
        target: Arc<MockBackend>,
        source_endpoint: Endpoint,
        target_endpoint: Endpoint,
        /// file ids keyed by object name
        files: Vec<(String, i64)>,
    }
    impl Setup {
        async fn new(objects: Vec<(&str, Vec<u8>)>) -> Self {
            let db = Database::connect_in_memory().await.unwrap();
            let fx = Fixtures::new(&db);
            let source_id = fx.backend("/mnt/source").await;
            let target_id = fx.backend("/mnt/target").await;
            let deployment = fx.deployment("d1", None).await;
            let other = fx.deployment("d2", None).await;
            let mut files = Vec::new();
            for (name, _) in &objects {
                let file = fx.image(deployment, name).await;
                fx.place(MediaType::Image, file, source_id, Original).await;
                files.push((name.to_string(), file));
            }
            // Belongs to another deployment; never touched.
            let unrelated = fx.image(other, "d2/x.png").await;
            fx.place(MediaType::Image, unrelated, source_id, Original).await;

            let source = Arc::new(MockBackend::with_files(objects).with_name("source"));
            let target = Arc::new(MockBackend::default().with_name("target"));
            Self {
                source_endpoint: Endpoint::new(source_id, source.clone()),
                target_endpoint: Endpoint::new(target_id, target.clone()),
                db,
                deployment,
                source,
                target,
                files,
            }
        }

        fn file(&self, name: &str) -> i64 {
            self.files.iter().find(|(n, _)| n == name).map(|(_, id)| *id).unwrap()
        }

        async fn placements(&self, name: &str) -> Vec<(i64, Representation)> {
            PlacementRepository::from(&self.db)
                .for_file(MediaType::Image, self.file(name))
                .await
                .unwrap()
                .into_iter()
                .map(|p| (p.storage_id, p.representation))
                .collect()
        }
    }

    async fn dimensions(backend: &MockBackend, name: &str) -> (u32, u32) {
        image::load_from_memory(&backend.read(name).await.unwrap()).unwrap().dimensions()
    }

    #[tokio::test]
    async fn test_cross_backend_adds_scaled_placement() {
        let setup = Setup::new(vec![("d1/a.png", png(200, 100)), ("d1/b.png", png(32, 32))]).await;
        let (source, target) = (setup.source_endpoint.storage_id, setup.target_endpoint.storage_id);
        let summary =
            run_rescale(&setup.db, &setup.source_endpoint, &setup.target_endpoint, setup.deployment, &options())
                .await
                .unwrap();
        assert_eq!((summary.discovered, summary.rescaled, summary.failed, summary.committed), (2, 2, 0, 2));
        assert!(summary.deletions.is_empty());
        assert_eq!(setup.target.object_names().await, vec!["d1/a.jpg", "d1/b.jpg"]);
        assert_eq!(dimensions(&setup.target, "d1/a.jpg").await, (64, 32));
        // Within bounds: re-encoded, not resized.
        assert_eq!(dimensions(&setup.target, "d1/b.jpg").await, (32, 32));
        assert_eq!(setup.placements("d1/a.png").await, vec![(source, Original), (target, ScaledRep)]);
        // Originals untouched.
        assert!(setup.source.exists("d1/a.png").await.unwrap());

        let again =
            run_rescale(&setup.db, &setup.source_endpoint, &setup.target_endpoint, setup.deployment, &options())
                .await
                .unwrap();
        assert_eq!(again.discovered, 0);
    }

    #[tokio::test]
    async fn test_in_place_promotes_original() {
        let setup = Setup::new(vec![("d1/a.png", png(200, 100))]).await;
        let source = setup.source_endpoint.storage_id;
        let summary =
            run_rescale(&setup.db, &setup.source_endpoint, &setup.source_endpoint, setup.deployment, &options())
                .await
                .unwrap();
        assert_eq!(summary.rescaled, 1);
        assert_eq!(setup.placements("d1/a.png").await, vec![(source, ScaledRep)]);
        assert_eq!(dimensions(&setup.source, "d1/a.jpg").await, (64, 32));
        assert_eq!(setup.target.writes(), 0);
    }

    #[tokio::test]
    async fn test_cross_backend_remove_moves_placement_and_lists_originals() {
        let setup = Setup::new(vec![("d1/a.png", png(200, 100)), ("d1/b.png", png(10, 10))]).await;
        let target = setup.target_endpoint.storage_id;
        let options = RescaleOptions { remove_original: true, ..options() };
        let mut summary =
            run_rescale(&setup.db, &setup.source_endpoint, &setup.target_endpoint, setup.deployment, &options)
                .await
                .unwrap();
        assert_eq!(setup.placements("d1/a.png").await, vec![(target, ScaledRep)]);
        assert_eq!(setup.placements("d1/b.png").await, vec![(target, ScaledRep)]);
        summary.deletions.sort();
        assert_eq!(summary.deletions, vec!["mock://source/d1/a.png", "mock://source/d1/b.png"]);
        // Listed, never executed.
        assert!(setup.source.exists("d1/a.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_in_place_remove_skips_overwritten_originals() {
        let setup = Setup::new(vec![("d1/a.png", png(200, 100)), ("d1/c.jpg", png(100, 100))]).await;
        let options = RescaleOptions { remove_original: true, ..options() };
        let summary =
            run_rescale(&setup.db, &setup.source_endpoint, &setup.source_endpoint, setup.deployment, &options)
                .await
                .unwrap();
        assert_eq!(summary.rescaled, 2);
        // `d1/c.jpg` was rewritten under its own name.
        assert_eq!(summary.deletions, vec!["mock://source/d1/a.png"]);
        assert_eq!(dimensions(&setup.source, "d1/c.jpg").await, (64, 64));
    }

    #[tokio::test]
    async fn test_failures_stay_eligible() {
        let setup =
            Setup::new(vec![("d1/a.png", png(200, 100)), ("d1/broken.png", b"not an image".to_vec())]).await;
        let source = setup.source_endpoint.storage_id;
        let events: Vec<RescaleEvent> =
            rescale(&setup.db, &setup.source_endpoint, &setup.target_endpoint, setup.deployment, &options())
                .map(|event| event.unwrap())
                .collect()
                .await;
        let failed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                RescaleEvent::Failed { object_name, error, .. } => Some((object_name.as_str(), error)),
                _ => None,
            })
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "d1/broken.png");
        assert!(matches!(&**failed[0].1, ErrorKind::Image));
        assert_eq!(setup.placements("d1/broken.png").await, vec![(source, Original)]);

        let remaining = batch::rescale_candidates(&setup.db, source, setup.target_endpoint.storage_id, setup.deployment)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].object_name, "d1/broken.png");
    }

    fn candidate(file_id: i64, object_name: &str) -> Candidate {
        Candidate { file_id, object_name: object_name.to_string(), byte_size: 1024 }
    }

    #[test]
    fn test_split_conflicts() {
        let candidates = vec![
            candidate(1, "d1/a.png"),
            candidate(2, "d1/b.jpg"),
            candidate(3, "d1/a.jpeg"),
            candidate(4, "d1/c.png"),
            candidate(5, "d2/a.png"),
        ];
        let (clear, conflicts) = split_conflicts(candidates, false);
        assert_eq!(clear.iter().map(|c| c.file_id).collect::<Vec<_>>(), vec![2, 4, 5]);
        assert_eq!(
            conflicts.iter().map(|(c, name)| (c.file_id, name.as_str())).collect::<Vec<_>>(),
            vec![(1, "d1/a.jpg"), (3, "d1/a.jpg")]
        );
    }

    #[test]
    fn test_split_conflicts_in_place_protects_originals() {
        // `d1/b.tiff` would be written over the original `d1/b.jpg`, which
        // is not a candidate here.
        let candidates = vec![candidate(1, "d1/b.tiff"), candidate(2, "d1/b.jpg.jpg")];
        let (clear, conflicts) = split_conflicts(candidates.clone(), true);
        assert_eq!((clear.len(), conflicts.len()), (2, 0));

        let candidates = vec![candidate(1, "d1/b.tiff"), candidate(2, "d1/b.jpg"), candidate(3, "d1/c.jpg")];
        let (clear, conflicts) = split_conflicts(candidates, true);
        assert_eq!(clear.iter().map(|c| c.file_id).collect::<Vec<_>>(), vec![3]);
        assert_eq!(conflicts.len(), 2);
    }

    fn failures(events: &[RescaleEvent]) -> Vec<(&str, &crate::error::Error)> {
        events
            .iter()
            .filter_map(|e| match e {
                RescaleEvent::Failed { object_name, error, .. } => Some((object_name.as_str(), error)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_shared_derived_name_is_not_written() {
        let setup = Setup::new(vec![
            ("d1/a.png", png(200, 100)),
            ("d1/a.jpg", png(100, 100)),
            ("d1/b.png", png(80, 80)),
        ])
        .await;
        let source = setup.source_endpoint.storage_id;
        let events: Vec<RescaleEvent> =
            rescale(&setup.db, &setup.source_endpoint, &setup.target_endpoint, setup.deployment, &options())
                .map(|event| event.unwrap())
                .collect()
                .await;
        let failed = failures(&events);
        assert_eq!(failed.iter().map(|(name, _)| *name).collect::<Vec<_>>(), vec!["d1/a.png", "d1/a.jpg"]);
        assert!(failed.iter().all(|(_, error)| matches!(&***error, ErrorKind::DerivedNameConflict(name) if name == "d1/a.jpg")));
        assert_eq!(setup.target.object_names().await, vec!["d1/b.jpg"]);
        assert_eq!(setup.placements("d1/a.png").await, vec![(source, Original)]);
        assert_eq!(setup.placements("d1/a.jpg").await, vec![(source, Original)]);

        let remaining = batch::rescale_candidates(&setup.db, source, setup.target_endpoint.storage_id, setup.deployment)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_in_place_never_overwrites_another_original() {
        let setup = Setup::new(vec![("d1/a.png", png(200, 100)), ("d1/a.jpg", png(100, 100))]).await;
        let source = setup.source_endpoint.storage_id;
        let options = RescaleOptions { workers: 1, ..options() };
        let summary =
            run_rescale(&setup.db, &setup.source_endpoint, &setup.source_endpoint, setup.deployment, &options)
                .await
                .unwrap();
        assert_eq!((summary.rescaled, summary.failed, summary.committed), (0, 2, 0));
        assert_eq!(dimensions(&setup.source, "d1/a.jpg").await, (100, 100));
        assert_eq!(setup.source.writes(), 0);
        assert_eq!(setup.placements("d1/a.jpg").await, vec![(source, Original)]);
    }

    #[tokio::test]
    async fn test_commits_per_threshold() {
        let setup = Setup::new(vec![
            ("d1/a.png", png(80, 80)),
            ("d1/b.png", png(80, 80)),
            ("d1/c.png", png(80, 80)),
        ])
        .await;
        let options = RescaleOptions { workers: 1, commit_threshold: 2, ..options() };
        let events: Vec<RescaleEvent> =
            rescale(&setup.db, &setup.source_endpoint, &setup.target_endpoint, setup.deployment, &options)
                .map(|event| event.unwrap())
                .collect()
                .await;
        let commits: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                RescaleEvent::Committed(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(commits, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_cancelled_starts_nothing() {
        let setup = Setup::new(vec![("d1/a.png", png(80, 80))]).await;
        let options = options();
        options.cancel.cancel();
        let summary =
            run_rescale(&setup.db, &setup.source_endpoint, &setup.target_endpoint, setup.deployment, &options)
                .await
                .unwrap();
        assert!(summary.interrupted);
        assert_eq!((summary.rescaled, summary.committed), (0, 0));
        assert_eq!(setup.source.reads(), 0);
    }
}
