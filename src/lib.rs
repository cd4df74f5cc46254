//! FileCloud: a live spatial index of a directory tree
//!
//! A single-process service built from a few cooperating parts:
//! - Indexer (initial scan plus filesystem watch, emits events)
//! - Index Store (authoritative in-memory map, single writer)
//! - Gateway (fans store mutations out to push clients)
//! - Spatial Assigner and Visibility queries (where each file sits, and what the camera can see)

pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod indexer;
pub mod record;
pub mod server;
pub mod service;
pub mod spatial;
pub mod store;
pub mod thumbnail;
pub mod visibility;

pub use config::Config;
pub use error::{CloudError, Result};
pub use gateway::{ClientMessage, Gateway, Subscription};
pub use identity::{classify, identify, FileId, FileType};
pub use indexer::{event_channel, Indexer, IndexerEvent, IndexerHandle, ScanReport};
pub use record::{FileRecord, Position};
pub use server::Server;
pub use service::{CloudService, SharedService};
pub use spatial::{SpatialAssigner, SpatialConfig};
pub use store::{IndexStore, Page, Snapshot};
pub use thumbnail::{FileThumbnailer, Thumbnail, ThumbnailGenerator};
pub use visibility::{query, Lod, LodBuckets, LodThresholds, SpatialGrid, VisibleSet};
