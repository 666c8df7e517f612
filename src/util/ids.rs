// ABOUTME: Run identifier generation
// ABOUTME: Produces timestamped run ids with a short random hex suffix

use chrono::{DateTime, Local};
use uuid::Uuid;

/// Create a run id of the form `YYYYMMDD_HHMMSS_<6-hex>` in local time.
pub fn new_run_id(now: DateTime<Local>) -> String {
    let ts = now.format("%Y%m%d_%H%M%S");
    let entropy = Uuid::new_v4().simple().to_string();
    format!("{}_{}", ts, &entropy[..6])
}
