// Alert Formatter + Sink, spec §4.9 / §6(e). Delivery is best-effort: a
// non-200 is logged and counted as an error but never retried.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use ww_common::error::SinkError;

use crate::state::{AlertKind, AlertRecord, ChainDescriptor};

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, record: &AlertRecord, chain: &ChainDescriptor) -> Result<(), SinkError>;
    async fn send_system_notice(&self, text: &str) -> Result<(), SinkError>;
}

fn glyph_and_verb(kind: &AlertKind) -> (&'static str, &'static str) {
    match kind {
        AlertKind::Buy => ("\u{1F7E2}", "BUY"),
        AlertKind::Sell => ("\u{1F534}", "SELL"),
        AlertKind::Mint => ("\u{1FA99}", "MINT"),
        AlertKind::Burn => ("\u{1F525}", "BURN"),
    }
}

/// Renders a decimal with a K/M/B unit suffix at 10^3/10^6/10^9.
pub fn format_amount(amount: Decimal) -> String {
    let billion = Decimal::from(1_000_000_000u64);
    let million = Decimal::from(1_000_000u64);
    let thousand = Decimal::from(1_000u64);

    if amount.abs() >= billion {
        format!("{:.2}B", amount / billion)
    } else if amount.abs() >= million {
        format!("{:.2}M", amount / million)
    } else if amount.abs() >= thousand {
        format!("{:.2}K", amount / thousand)
    } else {
        format!("{amount:.2}")
    }
}

/// Price precision adapts to magnitude: >=1 -> 4dp; >=1e-4 -> 6dp; else 10dp.
pub fn format_price(price: f64) -> String {
    let magnitude = price.abs();
    if magnitude >= 1.0 {
        format!("{price:.4}")
    } else if magnitude >= 1e-4 {
        format!("{price:.6}")
    } else {
        format!("{price:.10}")
    }
}

fn short_address(addr: &alloy_primitives::Address) -> String {
    let full = format!("{addr:#x}");
    format!("{}...{}", &full[0..6], &full[full.len() - 4..])
}

/// Renders a compact alert message with chain display name, short whale
/// address, and explorer deep-links for both tx and address.
pub fn format_alert_message(record: &AlertRecord, chain: &ChainDescriptor, price: f64) -> String {
    let (glyph, verb) = glyph_and_verb(&record.kind);
    let tx_link = format!("{}/tx/0x{}", chain.explorer_base_url, record.tx_hash.trim_start_matches("0x"));
    let addr_link = format!("{}/address/{:#x}", chain.explorer_base_url, record.whale);

    format!(
        "{glyph} *{verb}* on {chain_name}\nRank #{rank} whale [{whale}]({addr_link})\nAmount: {amount} (${usd})\nPrice: ${price}\n[View tx]({tx_link})",
        chain_name = chain.display_name,
        rank = record.rank,
        whale = short_address(&record.whale),
        amount = format_amount(record.amount),
        usd = format_amount(record.usd_value),
        price = format_price(price),
    )
}

#[derive(Debug, Serialize)]
struct SinkPayload<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Concrete messaging sink: POST to a chat-style webhook (spec §6(e)).
pub struct MessagingSink {
    http: reqwest::Client,
    webhook_url: String,
    chat_id: String,
    token: String,
}

impl MessagingSink {
    pub fn new(http: reqwest::Client, webhook_url: String, chat_id: String, token: String) -> Self {
        Self {
            http,
            webhook_url,
            chat_id,
            token,
        }
    }

    async fn post(&self, text: String) -> Result<(), SinkError> {
        let payload = SinkPayload {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };

        let response = self
            .http
            .post(&self.webhook_url)
            .query(&[("token", &self.token)])
            .json(&payload)
            .send()
            .await
            .map_err(|e| SinkError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::NonSuccess(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertSink for MessagingSink {
    async fn send_alert(&self, record: &AlertRecord, chain: &ChainDescriptor) -> Result<(), SinkError> {
        let price = if record.amount.is_zero() {
            0.0
        } else {
            (record.usd_value / record.amount).to_f64().unwrap_or(0.0)
        };
        self.post(format_alert_message(record, chain, price)).await
    }

    async fn send_system_notice(&self, text: &str) -> Result<(), SinkError> {
        self.post(format!("\u{2139}\u{FE0F} {text}")).await
    }
}

/// Discards everything; used in tests and anywhere a sink is required but
/// delivery is not under test.
#[derive(Default)]
pub struct NullSink;

#[async_trait]
impl AlertSink for NullSink {
    async fn send_alert(&self, _record: &AlertRecord, _chain: &ChainDescriptor) -> Result<(), SinkError> {
        Ok(())
    }

    async fn send_system_notice(&self, _text: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_amount_applies_k_m_b_suffixes() {
        assert_eq!(format_amount(Decimal::from(500)), "500.00");
        assert_eq!(format_amount(Decimal::from(5_000)), "5.00K");
        assert_eq!(format_amount(Decimal::from(5_000_000)), "5.00M");
        assert_eq!(format_amount(Decimal::from(5_000_000_000u64)), "5.00B");
    }

    #[test]
    fn format_price_picks_precision_by_magnitude() {
        assert_eq!(format_price(2.0), "2.0000");
        assert_eq!(format_price(0.001), "0.001000");
        assert_eq!(format_price(0.00000001), "0.0000000100");
    }

    #[test]
    fn short_address_keeps_head_and_tail() {
        let addr = alloy_primitives::address!("000000000000000000000000000000000000aa");
        let s = short_address(&addr);
        assert!(s.starts_with("0x0000"));
        assert!(s.ends_with("00aa"));
    }
}
