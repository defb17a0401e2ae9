// Leaderboard text rendering for the notification sink.

use crate::counter::BucketKind;

/// Render a publication message: a header line, then one ranked section
/// per requested bucket. Lines are `"{rank}. {user} - {count}"` with a
/// 1-indexed rank; an empty table renders a single "no entries" line.
pub fn render_leaderboard(header: &str, sections: &[(BucketKind, Vec<(String, u64)>)]) -> String {
    let mut out = String::from(header);

    for (kind, rows) in sections {
        out.push_str("\n\n");
        out.push_str(kind.title());
        out.push(':');

        if rows.is_empty() {
            out.push_str("\nno entries");
        } else {
            for (idx, (user, count)) in rows.iter().enumerate() {
                out.push_str(&format!("\n{}. {} - {}", idx + 1, user, count));
            }
        }
    }

    out
}
