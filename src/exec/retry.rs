// ABOUTME: Retry backoff schedule lookup
// ABOUTME: Element i delays attempt i+2; the last entry repeats, an empty list means no delay

/// Backoff seconds before retry `attempt_idx` (zero-based: 0 is the wait
/// before the first retry). Out-of-range indexes repeat the last entry;
/// an empty schedule retries immediately.
pub fn backoff_for_attempt(attempt_idx: usize, backoff: &[f64]) -> f64 {
    match backoff.last() {
        Some(last) => *backoff.get(attempt_idx).unwrap_or(last),
        None => 0.0,
    }
}
