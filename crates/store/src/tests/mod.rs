
use config::StoreConfig;
use std::path::Path;

/// Small segments and an odd prefetch chunk so tests cross both boundaries.
pub(crate) fn test_config(dir: &Path) -> StoreConfig {
    StoreConfig {
        segment_capacity: 256,
        prefetch_chunk: 7,
        sync_writes: false,
        ..StoreConfig::default().with_data_dir(dir)
    }
}
