//! Everything the crawler writes to, or reads back from, the data directory.
//!
//! # Submodules
//!
//! - [`json`]: atomic writes of article records and the category file
//! - [`indexes`]: rebuilds the finished-URL set and the comment report from
//!   persisted records
//! - [`ledger`]: the append-only failed-URL log
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! ├── categories.json
//! ├── {postId}.json
//! ├── images/{postId}/{basename}
//! ├── audio/{postId}/{postId}_{n}.{ext}
//! └── logs/failed_urls.txt
//! ```

pub mod indexes;
pub mod json;
pub mod ledger;
