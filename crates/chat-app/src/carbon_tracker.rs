use contextlink_api::CarbonStats;

const GAUGE_WIDTH: usize = 20;

/// Fixed figures shown until the backend exposes real carbon accounting.
pub const PLACEHOLDER_STATS: CarbonStats = CarbonStats {
    total_carbon: 247.5,
    monthly_budget: 1000.0,
    daily_average: 8.25,
};

/// Static carbon gauge. It does not read conversation aggregates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarbonTracker {
    stats: CarbonStats,
}

impl Default for CarbonTracker {
    fn default() -> Self {
        Self {
            stats: PLACEHOLDER_STATS,
        }
    }
}

impl CarbonTracker {
    pub fn stats(&self) -> CarbonStats {
        self.stats
    }

    /// Share of the monthly budget used, clamped to `0.0..=1.0`.
    pub fn budget_ratio(&self) -> f64 {
        if self.stats.monthly_budget <= 0.0 {
            return 0.0;
        }
        (self.stats.total_carbon / self.stats.monthly_budget).clamp(0.0, 1.0)
    }

    /// Totals plus a text gauge of the monthly budget.
    pub fn render(&self) -> String {
        let filled = (self.budget_ratio() * GAUGE_WIDTH as f64).round() as usize;
        format!(
            "Carbon footprint (placeholder)\n[{}{}] {:.1}g / {:.0}g this month ({:.0}%)\ndaily average {:.2}g",
            "#".repeat(filled),
            "-".repeat(GAUGE_WIDTH - filled),
            self.stats.total_carbon,
            self.stats.monthly_budget,
            self.budget_ratio() * 100.0,
            self.stats.daily_average,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_placeholder_gauge() {
        let tracker = CarbonTracker::default();
        assert_eq!(tracker.stats(), PLACEHOLDER_STATS);

        let rendered = tracker.render();
        assert!(rendered.starts_with("Carbon footprint (placeholder)"));
        assert!(rendered.contains("[#####---------------] 247.5g / 1000g"));
        assert!(rendered.contains("(25%)"));
    }
}
