use chrono::{DateTime, Duration, Utc};

use dropdeploy_common::store::RemoteEntry;

/// Compute the remote paths to delete under a count bound and an age bound.
///
/// Only file entries participate; folder entries are discarded up front.
/// The count pass runs first: when `max_files` is nonzero and more files
/// than that exist, the oldest `len - max_files` are marked. The age pass
/// then marks every remaining file modified before `now - max_days` days.
/// A bound of zero disables its pass; with both bounds zero nothing is
/// marked. The returned order is the deletion order: count marks first,
/// oldest first, then age marks. Ties on modification time order by path
/// so the result is deterministic.
pub fn compute_deletions(
    entries: &[RemoteEntry],
    max_files: usize,
    max_days: u32,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut files: Vec<&RemoteEntry> = entries.iter().filter(|e| e.is_file()).collect();
    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

    let survivors_from = if max_files > 0 && files.len() > max_files {
        files.len() - max_files
    } else {
        0
    };

    let mut deletions: Vec<String> = files[..survivors_from]
        .iter()
        .map(|e| e.path.clone())
        .collect();

    if max_days > 0 {
        let cutoff = now - Duration::days(i64::from(max_days));
        deletions.extend(
            files[survivors_from..]
                .iter()
                .filter(|e| e.modified < cutoff)
                .map(|e| e.path.clone()),
        );
    }

    deletions
}
