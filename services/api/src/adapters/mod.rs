pub mod blob;
pub mod db;

pub use blob::LocalBlobStore;
pub use db::DbAdapter;
