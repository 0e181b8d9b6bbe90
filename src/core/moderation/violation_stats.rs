// Per-user violation counters and the ranking report built from them.
//
// In-memory only; counts live for the lifetime of the process.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::HashMap;

const BAR_CELLS: u64 = 10;

#[derive(Default)]
pub struct ViolationStats {
    counts: Mutex<HashMap<u64, u64>>,
}

impl ViolationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment and return the user's new total.
    pub fn record(&self, user_id: u64) -> u64 {
        let mut counts = self.counts.lock();
        let count = counts.entry(user_id).or_insert(0);
        *count += 1;
        *count
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> HashMap<u64, u64> {
        self.counts.lock().clone()
    }

    #[cfg(test)]
    pub fn count(&self, user_id: u64) -> u64 {
        self.counts.lock().get(&user_id).copied().unwrap_or(0)
    }

    /// The `n` highest counts, highest first; ties ordered by user id.
    pub fn top(&self, n: usize) -> Vec<(u64, u64)> {
        let mut entries: Vec<(u64, u64)> = self.snapshot().into_iter().collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }
}

/// Human-readable leaderboard for operators.
pub fn render_ranking(top: &[(u64, u64)], generated_at: DateTime<Local>) -> String {
    let timestamp = generated_at.format("%Y-%m-%d %H:%M:%S");
    if top.is_empty() {
        return format!(
            "📊 Violation Leaderboard\n\n❌ No violations recorded\n\n🕐 Generated: {}",
            timestamp
        );
    }

    let total: u64 = top.iter().map(|(_, count)| count).sum();
    let highest = top[0].1.max(1);
    let rule = "=".repeat(30);

    let mut text = format!("📊 Violation Leaderboard\n{}\n\n", rule);
    for (index, (user_id, count)) in top.iter().enumerate() {
        let rank = index + 1;
        let icon = match rank {
            1 => "🥇".to_string(),
            2 => "🥈".to_string(),
            3 => "🥉".to_string(),
            n => format!("#{}", n),
        };
        let share = *count as f64 / total as f64 * 100.0;
        let filled = (BAR_CELLS * count / highest).min(BAR_CELLS) as usize;
        let bar = format!(
            "{}{}",
            "█".repeat(filled),
            "░".repeat(BAR_CELLS as usize - filled)
        );

        text.push_str(&format!("{} Rank {}\n", icon, rank));
        text.push_str(&format!("👤 User: {}\n", user_id));
        text.push_str(&format!("⚠️ Violations: {}\n", count));
        text.push_str(&format!("📈 Share: {:.1}%\n", share));
        text.push_str(&format!("📊 {}\n\n", bar));
    }

    text.push_str(&format!("{}\n", rule));
    text.push_str(&format!("📊 Total violations: {}\n", total));
    text.push_str(&format!("👥 Users listed: {}\n", top.len()));
    text.push_str(&format!("🕐 Generated: {}", timestamp));
    text
}
