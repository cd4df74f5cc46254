// FILE: src/service.rs
//! The service object wired up once at startup and shared by handle with
//! the HTTP handlers, the watch pipeline and the query engine.

use crate::config::Config;
use crate::error::{CloudError, Result};
use crate::gateway::{ClientMessage, Gateway};
use crate::identity::FileId;
use crate::indexer::{event_channel, EventSource, Indexer, IndexerEvent, IndexerHandle};
use crate::record::{FileRecord, Position};
use crate::spatial::SpatialAssigner;
use crate::store::{IndexStore, Page};
use crate::thumbnail::{FileThumbnailer, Thumbnail, ThumbnailGenerator};
use crate::visibility::{LodBuckets, LodThresholds, SpatialGrid};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

pub type SharedService = Arc<CloudService>;

/// Positioned records of one store generation, with a grid over them.
struct Scene {
    generation: u64,
    records: Vec<FileRecord>,
    grid: SpatialGrid,
}

pub struct CloudService {
    store: IndexStore,
    indexer: Indexer,
    assigner: SpatialAssigner,
    thumbnails: Arc<dyn ThumbnailGenerator>,
    scene: RwLock<Option<Arc<Scene>>>,
    grid_cell: f64,
    lod: LodThresholds,
    view_distance: f64,
    page_size: usize,
}

impl CloudService {
    /// Build the service and the receiving end of its event sink. Nothing
    /// reaches the store until `run_events` drains that receiver.
    pub fn new(config: &Config) -> (SharedService, EventSource) {
        Self::with_thumbnails(config, Arc::new(FileThumbnailer::new()))
    }

    pub fn with_thumbnails(config: &Config, thumbnails: Arc<dyn ThumbnailGenerator>) -> (SharedService, EventSource) {
        let (sink, source) = event_channel();
        let spatial = config.spatial();
        let service = Arc::new(Self {
            store: IndexStore::new(Gateway::new(config.broadcast_capacity)),
            indexer: Indexer::new(sink, config.include_hidden),
            grid_cell: (spatial.outer_radius / 8.0).max(1.0),
            assigner: SpatialAssigner::new(spatial),
            thumbnails,
            scene: RwLock::new(None),
            lod: config.lod(),
            view_distance: config.view_distance,
            page_size: config.page_size.max(1),
        });
        (service, source)
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn gateway(&self) -> &Gateway {
        self.store.gateway()
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn lod(&self) -> LodThresholds {
        self.lod
    }

    pub fn default_view_distance(&self) -> f64 {
        self.view_distance
    }

    pub fn start_indexing(&self, root: &Path) -> Result<IndexerHandle> {
        tracing::info!("[Service] Indexing {}", root.display());
        self.indexer.start(root)
    }

    /// The single writer: every store mutation goes through here.
    pub fn apply(&self, event: IndexerEvent) {
        match event {
            IndexerEvent::Discovered(record) => {
                self.store.add_or_replace(record);
            }
            IndexerEvent::Removed { id, path } => {
                if self.store.remove(&id).is_some() {
                    self.assigner.forget(&id);
                    return;
                }
                // Not a file we know, so possibly a directory that took files with it
                let removed = self.store.remove_under(&path);
                for record in &removed {
                    self.assigner.forget(&record.id);
                }
                if removed.is_empty() {
                    tracing::debug!("[Service] Removal of unindexed path {}", path.display());
                } else {
                    tracing::info!("[Service] {} files left with {}", removed.len(), path.display());
                }
            }
            IndexerEvent::ScanComplete(finished_at) => {
                self.store.set_last_scan_time(finished_at);
                let total_files = self.store.count();
                tracing::info!("[Service] Scan complete, {} files indexed", total_files);
                self.gateway().publish(ClientMessage::ScanComplete { total_files });
            }
        }
    }

    /// Apply events until every sender is gone.
    pub async fn run_events(self: Arc<Self>, mut source: EventSource) {
        while let Some(event) = source.recv().await {
            self.apply(event);
        }
        tracing::debug!("[Service] Event sink closed");
    }

    pub fn page(&self, cursor: usize) -> Page {
        self.store.page(cursor, self.page_size)
    }

    pub fn get(&self, id: &FileId) -> Option<FileRecord> {
        self.store.get(id)
    }

    pub async fn thumbnail(&self, id: &FileId) -> Result<Thumbnail> {
        let record = self
            .get(id)
            .ok_or_else(|| CloudError::NotFound(format!("file not found: {}", id)))?;
        self.thumbnails
            .generate(Path::new(&record.absolute_path), record.file_type)
            .await
    }

    /// The positioned scene for the store's current generation. Rebuilt only
    /// after the store has changed.
    fn scene(&self) -> Arc<Scene> {
        let generation = self.store.generation();
        if let Some(scene) = self.scene.read().as_ref() {
            if scene.generation == generation {
                return Arc::clone(scene);
            }
        }

        let snapshot = self.store.snapshot();
        let mut records = snapshot.records;
        self.assigner.place(&mut records);
        let grid = SpatialGrid::build(&records, self.grid_cell);
        tracing::debug!(
            "[Service] Scene rebuilt at generation {}: {} records in {} cells",
            snapshot.generation,
            records.len(),
            grid.cell_count()
        );

        let scene = Arc::new(Scene { generation: snapshot.generation, records, grid });
        *self.scene.write() = Some(Arc::clone(&scene));
        scene
    }

    /// Records in range of `viewpoint`, bucketed by level of detail.
    pub fn visible(&self, viewpoint: Position, view_distance: f64) -> LodBuckets {
        let scene = self.scene();
        scene.grid.query(&scene.records, viewpoint, view_distance, &self.lod).buckets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::identify;
    use crate::record::test_record;
    use chrono::Utc;
    use std::path::PathBuf;

    fn service() -> SharedService {
        CloudService::new(&Config::default()).0
    }

    #[test]
    fn test_apply_discovered_and_removed() {
        let service = service();
        let record = test_record("/data/a.txt", 500);

        service.apply(IndexerEvent::Discovered(record.clone()));
        assert_eq!(service.store().count(), 1);

        service.apply(IndexerEvent::Removed { id: record.id.clone(), path: PathBuf::from("/data/a.txt") });
        assert_eq!(service.store().count(), 0);

        // Unknown removal is harmless
        service.apply(IndexerEvent::Removed { id: record.id.clone(), path: PathBuf::from("/data/a.txt") });
        assert_eq!(service.store().count(), 0);
    }

    #[tokio::test]
    async fn test_scan_complete_records_time_and_broadcasts() {
        let service = service();
        let mut sub = service.gateway().subscribe();
        service.apply(IndexerEvent::Discovered(test_record("/data/a.txt", 1)));

        let now = Utc::now();
        service.apply(IndexerEvent::ScanComplete(now));
        assert_eq!(service.store().last_scan_time(), Some(now));

        assert!(matches!(sub.recv().await, Some(ClientMessage::FileAdded { .. })));
        assert_eq!(sub.recv().await, Some(ClientMessage::ScanComplete { total_files: 1 }));
    }

    #[test]
    fn test_positions_survive_rediscovery() {
        let service = service();
        service.apply(IndexerEvent::Discovered(test_record("/data/a.txt", 10)));
        service.apply(IndexerEvent::Discovered(test_record("/data/b.txt", 99_999)));
        let first = service.scene().records.clone();

        // A size change re-emits the record without a position
        service.apply(IndexerEvent::Discovered(test_record("/data/a.txt", 50_000)));
        let second = service.scene().records.clone();

        let pos = |records: &[FileRecord], name: &str| {
            records.iter().find(|r| r.name == name).and_then(|r| r.position)
        };
        assert!(pos(&first, "a.txt").is_some());
        assert_eq!(pos(&first, "a.txt"), pos(&second, "a.txt"));
        assert_eq!(pos(&first, "b.txt"), pos(&second, "b.txt"));
    }

    #[test]
    fn test_visible_uses_configured_tiers() {
        let service = service();
        for i in 0..50 {
            service.apply(IndexerEvent::Discovered(test_record(&format!("/data/{}.bin", i), i * 1000)));
        }
        let everything = service.visible(Position::ORIGIN, service.default_view_distance());
        assert_eq!(everything.len(), 50);

        let nothing = service.visible(Position::new(10_000.0, 0.0, 0.0), 10.0);
        assert!(nothing.is_empty());
    }

    #[tokio::test]
    async fn test_removed_directory_takes_its_files() {
        let service = service();
        let mut sub = service.gateway().subscribe();
        for path in ["/data/album/one.png", "/data/album/two.png", "/data/keep.txt"] {
            service.apply(IndexerEvent::Discovered(test_record(path, 10)));
        }
        assert_eq!(service.scene().records.len(), 3);

        let dir = PathBuf::from("/data/album");
        service.apply(IndexerEvent::Removed { id: identify(&dir), path: dir });
        assert_eq!(service.store().count(), 1);

        let mut removed = 0;
        for _ in 0..5 {
            if let Some(ClientMessage::FileRemoved { .. }) = sub.recv().await {
                removed += 1;
            }
        }
        assert_eq!(removed, 2);
        assert_eq!(service.visible(Position::ORIGIN, 1000.0).len(), 1);
    }

    #[test]
    fn test_scene_is_reused_until_the_store_changes() {
        let service = service();
        service.apply(IndexerEvent::Discovered(test_record("/data/a.txt", 1)));

        let first = service.scene();
        assert!(Arc::ptr_eq(&first, &service.scene()));

        // Rediscovering an unchanged file is not a mutation
        let stored = service.get(&first.records[0].id).unwrap();
        service.apply(IndexerEvent::Discovered(stored));
        let after_noop = service.scene();
        assert!(Arc::ptr_eq(&first, &after_noop));

        service.apply(IndexerEvent::Discovered(test_record("/data/b.txt", 2)));
        let rebuilt = service.scene();
        assert!(!Arc::ptr_eq(&after_noop, &rebuilt));
        assert_eq!(rebuilt.records.len(), 2);
    }

    #[tokio::test]
    async fn test_thumbnail_of_unknown_id_is_not_found() {
        let service = service();
        let err = service.thumbnail(&FileId::from("0000000000000000")).await.unwrap_err();
        assert!(matches!(err, CloudError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_run_events_drains_until_closed() {
        let (sink, source) = event_channel();
        let service = service();
        sink.send(IndexerEvent::Discovered(test_record("/data/a.txt", 1))).unwrap();
        sink.send(IndexerEvent::Discovered(test_record("/data/b.txt", 2))).unwrap();
        drop(sink);

        Arc::clone(&service).run_events(source).await;
        assert_eq!(service.store().count(), 2);
    }
}
