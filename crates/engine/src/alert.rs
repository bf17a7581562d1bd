use common::{AlertPayload, Direction, RiskProfile, Signal};

use crate::manager::ManagerStatus;

/// Build the payload handed to the delivery collaborator.
pub fn build_alert(profile: RiskProfile, signal: Signal) -> AlertPayload {
    let message = format_alert(profile, &signal);
    AlertPayload::new(profile, signal, message)
}

/// Human-readable alert text.
pub fn format_alert(profile: RiskProfile, signal: &Signal) -> String {
    let action = match signal.direction {
        Direction::Long => "🟢 LONG",
        Direction::Short => "🔴 SHORT",
    };
    format!(
        "{emoji} {risk} SIGNAL\n\
         \n\
         Action: {action}\n\
         Asset: {symbol}\n\
         Strategy: {strategy} ({id})\n\
         Timeframe: {tf}\n\
         \n\
         Entry: {entry}\n\
         Stop Loss: {sl}\n\
         Take Profit: {tp}\n\
         Leverage: {lev}x\n\
         \n\
         Time: {time} UTC",
        emoji = profile.emoji(),
        risk = profile.risk_label(),
        symbol = signal.symbol,
        strategy = profile.display_name(),
        id = signal.strategy_id,
        tf = signal.timeframe,
        entry = fmt_price(signal.price),
        sl = fmt_price(signal.stop_loss),
        tp = fmt_price(signal.take_profit),
        lev = signal.leverage,
        time = signal.timestamp.format("%Y-%m-%d %H:%M"),
    )
}

/// Periodic status report text.
pub fn format_status(status: &ManagerStatus) -> String {
    let mut out = format!(
        "📊 Status ({})\nTotal signals: {}\n",
        status.engine_state, status.total_signals
    );
    for s in &status.strategies {
        let flag = if s.enabled { "✅" } else { "⏸" };
        out.push_str(&format!(
            "\n{flag} {} [{} {}]\n  signals: {}  errors: {}  delivery failures: {}  skipped: {}\n",
            s.id,
            s.profile,
            s.timeframe,
            s.stats.signals_generated,
            s.errors,
            s.delivery_failures,
            s.skipped,
        ));
        if !s.phases.is_empty() {
            let phases: Vec<String> = s.phases.iter().map(|(p, n)| format!("{p}={n}")).collect();
            out.push_str(&format!("  phases: {}\n", phases.join(" ")));
        }
        if let Some(t) = s.stats.last_signal_time {
            out.push_str(&format!("  last signal: {} UTC\n", t.format("%Y-%m-%d %H:%M")));
        }
        if let Some(e) = &s.last_error {
            out.push_str(&format!("  last error: {e}\n"));
        }
    }
    out
}

fn fmt_price(p: f64) -> String {
    if p >= 100.0 {
        format!("{p:.2}")
    } else if p >= 1.0 {
        format!("{p:.4}")
    } else {
        format!("{p:.6}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::Timeframe;

    fn signal() -> Signal {
        Signal {
            strategy_id: "cons-4h".into(),
            symbol: "BTCUSDT".into(),
            direction: Direction::Long,
            timeframe: Timeframe::H4,
            price: 43_250.5,
            timestamp: Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap(),
            stop_loss: 42_000.0,
            take_profit: 45_413.0,
            leverage: 1.0,
            max_hold_bars: Some(18),
            metadata: Default::default(),
        }
    }

    #[test]
    fn alert_text_carries_trade_plan() {
        let text = format_alert(RiskProfile::Conservative, &signal());
        assert!(text.starts_with("🛡️ LOW RISK SIGNAL"));
        assert!(text.contains("Action: 🟢 LONG"));
        assert!(text.contains("Asset: BTCUSDT"));
        assert!(text.contains("Strategy: Conservative Trend Rider (cons-4h)"));
        assert!(text.contains("Timeframe: 4h"));
        assert!(text.contains("Entry: 43250.50"));
        assert!(text.contains("Take Profit: 45413.00"));
        assert!(text.contains("Time: 2024-02-01 08:00 UTC"));
    }

    #[test]
    fn payload_keeps_signal_and_profile() {
        let alert = build_alert(RiskProfile::Aggressive, signal());
        assert_eq!(alert.profile, RiskProfile::Aggressive);
        assert_eq!(alert.signal.symbol, "BTCUSDT");
        assert!(alert.message.contains("HIGH RISK"));
        assert!(!alert.id.is_empty());
    }

    #[test]
    fn small_prices_keep_precision() {
        assert_eq!(fmt_price(0.0001234), "0.000123");
        assert_eq!(fmt_price(2.5), "2.5000");
    }
}
