// ABOUTME: Shared utility modules for run identity, directory layout, and log access
// ABOUTME: Exports run-id generation, run-dir helpers, tail reads, and time formatting

pub mod ids;
pub mod path_guard;
pub mod paths;
pub mod tail;
pub mod time;

pub use ids::new_run_id;
pub use path_guard::{create_regular_file, has_symlink_ancestor, is_symlink_path};
pub use paths::{ensure_run_layout, run_dir};
pub use tail::tail_lines;
pub use time::{duration_sec, now_iso};
