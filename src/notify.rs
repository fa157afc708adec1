//! Alert rendering and delivery
//!
//! Delivery sits behind the [`Notifier`] trait. Two implementations ship with
//! the crate: [`LogNotifier`] writes alerts through `tracing`, and
//! [`WebhookNotifier`] POSTs them as JSON.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::NotifyError;
use crate::frame::{Indicator, IndicatorParams};
use crate::rules::MessageLine;
use crate::tracker::AlertEvent;
use crate::types::TradeLevels;

/// Delivers a rendered alert
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// `"<BUY|SELL> Alert for <symbol>"`
pub fn render_subject(event: &AlertEvent) -> String {
    format!("{} Alert for {}", event.signal, event.symbol)
}

fn fmt_value(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

/// Render the alert body.
///
/// The first five lines are fixed; `lines` appends indicator lines for the
/// active rule set, and stop/target lines follow when levels exist.
pub fn render_body(
    event: &AlertEvent,
    levels: Option<&TradeLevels>,
    params: &IndicatorParams,
    lines: &[MessageLine],
) -> String {
    let snap = &event.snapshot;
    let mut body = vec![
        format!("Signal: {}", event.signal),
        format!("Price: ${:.2}", snap.close),
        format!("RSI: {}", fmt_value(snap.get(Indicator::Rsi))),
        format!(
            "MACD: {}, Signal Line: {}",
            fmt_value(snap.get(Indicator::Macd)),
            fmt_value(snap.get(Indicator::MacdSignal))
        ),
        format!(
            "SMA{}: {}, SMA{}: {}",
            params.sma_fast,
            fmt_value(snap.get(Indicator::SmaFast)),
            params.sma_slow,
            fmt_value(snap.get(Indicator::SmaSlow))
        ),
    ];

    for line in lines {
        body.push(match line {
            MessageLine::Bollinger => format!(
                "Bollinger Upper: {}, Lower: {}",
                fmt_value(snap.get(Indicator::BollingerUpper)),
                fmt_value(snap.get(Indicator::BollingerLower))
            ),
            MessageLine::Stochastic => format!(
                "Stochastic %K: {}, %D: {}",
                fmt_value(snap.get(Indicator::StochK)),
                fmt_value(snap.get(Indicator::StochD))
            ),
            MessageLine::Fibonacci => format!(
                "Swing High: {}, Swing Low: {}",
                fmt_value(snap.get(Indicator::SwingHigh)),
                fmt_value(snap.get(Indicator::SwingLow))
            ),
            MessageLine::Vwap => format!("VWAP: {}", fmt_value(snap.get(Indicator::Vwap))),
        });
    }

    if let Some(levels) = levels {
        body.push(format!("Stop Loss: ${:.2}", levels.stop_loss));
        body.push(format!("Take Profit: ${:.2}", levels.take_profit));
    }

    body.join("\n")
}

// =============================================================================
// Notifiers
// =============================================================================

/// Writes alerts to the log instead of delivering them anywhere
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(subject, "{}", body.replace('\n', " | "));
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
}

/// POSTs `{"subject": .., "body": ..}` to a webhook endpoint
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(NotifyError::Config("webhook url is empty".to_string()));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;

        Ok(Self { client, url })
    }
}

impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { subject, body })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }

        debug!(url = %self.url, status = status.as_u16(), "Webhook delivered");
        Ok(())
    }
}
