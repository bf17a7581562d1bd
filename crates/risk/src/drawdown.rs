use serde::Serialize;

/// Running peak-to-trough tracker over an equity sequence.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DrawdownTracker {
    peak: f64,
    /// Largest decline from a prior peak, as a fraction of that peak.
    pub max_drawdown_pct: f64,
    /// Same decline in currency units.
    pub max_drawdown: f64,
}

impl DrawdownTracker {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            peak: initial_equity,
            max_drawdown_pct: 0.0,
            max_drawdown: 0.0,
        }
    }

    pub fn update(&mut self, equity: f64) {
        if equity > self.peak {
            self.peak = equity;
            return;
        }
        let decline = self.peak - equity;
        if decline > self.max_drawdown {
            self.max_drawdown = decline;
        }
        if self.peak > 0.0 {
            let pct = decline / self.peak;
            if pct > self.max_drawdown_pct {
                self.max_drawdown_pct = pct;
            }
        }
    }

    pub fn peak(&self) -> f64 {
        self.peak
    }

    /// Current decline from the peak as a fraction.
    pub fn current(&self, equity: f64) -> f64 {
        if self.peak <= 0.0 {
            return 0.0;
        }
        ((self.peak - equity) / self.peak).max(0.0)
    }
}
