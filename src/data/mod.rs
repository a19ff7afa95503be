pub mod history;
pub mod snapshot;
pub mod table;

pub use history::History;
pub use snapshot::{load_snapshot, snapshot_from_table, SnapshotTraining};
pub use table::Table;
