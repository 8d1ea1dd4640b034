// Wire-format decoding for the upstream feed's JSON envelopes.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::types::{LiqSide, LiquidationEvent, TradeEvent, TradeSide};

pub enum Frame {
    Pong,
    Ping,
    SubscribeAck,
    Error(String),
    Liquidations(Vec<LiquidationEvent>),
    Trades(Vec<TradeEvent>),
    Unroutable,
}

/// Classify and decode one raw text frame from the feed.
pub fn decode_frame(text: &str) -> Result<Frame> {
    if text == "pong" {
        return Ok(Frame::Pong);
    }

    let root: Value = serde_json::from_str(text).context("frame is not valid JSON")?;

    if root.get("event").and_then(Value::as_str) == Some("ping") {
        return Ok(Frame::Ping);
    }
    if let Some(success) = root.get("success").and_then(Value::as_bool) {
        if success {
            return Ok(Frame::SubscribeAck);
        }
    }
    if let Some(err) = root.get("error") {
        return Ok(Frame::Error(err.to_string()));
    }

    let Some(channel) = root.get("channel").and_then(Value::as_str) else {
        return Ok(Frame::Unroutable);
    };
    let Some(data) = root.get("data").and_then(Value::as_array) else {
        return Ok(Frame::Unroutable);
    };

    if channel == "liquidationOrders" {
        let events = data.iter().filter_map(decode_liquidation).collect();
        Ok(Frame::Liquidations(events))
    } else if channel.starts_with("futures_trades@") {
        let events = data.iter().filter_map(decode_trade).collect();
        Ok(Frame::Trades(events))
    } else {
        Ok(Frame::Unroutable)
    }
}

fn decode_liquidation(item: &Value) -> Option<LiquidationEvent> {
    let symbol = item.get("symbol")?.as_str()?.to_uppercase();
    let raw_side = item.get("side")?.as_i64()?;
    let side = LiqSide::from_raw(raw_side)?;
    let price = parse_numeric(item.get("price")?)?;
    let volume_usd = parse_numeric(item.get("volUsd")?)?;
    let exchange = item
        .get("exName")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let event_time_ms = item.get("time")?.as_i64()?;

    Some(LiquidationEvent {
        symbol,
        side,
        price,
        volume_usd,
        exchange,
        event_time_ms,
        ingest_time_ms: 0,
    })
}

fn decode_trade(item: &Value) -> Option<TradeEvent> {
    let symbol = item.get("symbol")?.as_str()?.to_uppercase();
    let raw_side = item.get("side")?.as_i64()?;
    let side = TradeSide::from_raw(raw_side)?;
    let price = parse_numeric(item.get("price")?)?;
    let volume_usd = parse_numeric(item.get("volUsd")?)?;
    let exchange = item
        .get("exName")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let event_time_ms = item.get("time")?.as_i64()?;

    Some(TradeEvent {
        symbol,
        side,
        price,
        volume_usd,
        exchange,
        event_time_ms,
        ingest_time_ms: 0,
    })
}

fn parse_numeric(val: &Value) -> Option<f64> {
    match val {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_liquidation_envelope() {
        let text = r#"{"channel":"liquidationOrders","data":[
            {"symbol":"BTCUSDT","side":1,"price":"65000.0","volUsd":"250000","exName":"Binance","time":1700000000000}
        ]}"#;
        match decode_frame(text).unwrap() {
            Frame::Liquidations(events) => {
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].symbol, "BTCUSDT");
                assert_eq!(events[0].side, LiqSide::LongLiq);
                assert!((events[0].volume_usd - 250_000.0).abs() < f64::EPSILON);
            }
            _ => panic!("expected liquidations frame"),
        }
    }

    #[test]
    fn decodes_trade_envelope_with_opposite_side_convention() {
        let text = r#"{"channel":"futures_trades@binance@ETHUSDT@100000","data":[
            {"symbol":"ETHUSDT","side":2,"price":"3200.5","volUsd":"500000","exName":"Binance","time":1700000000000}
        ]}"#;
        match decode_frame(text).unwrap() {
            Frame::Trades(events) => {
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].side, TradeSide::Buy);
            }
            _ => panic!("expected trades frame"),
        }
    }

    #[test]
    fn plain_pong_is_recognised() {
        assert!(matches!(decode_frame("pong").unwrap(), Frame::Pong));
    }

    #[test]
    fn unknown_channel_is_unroutable() {
        let text = r#"{"channel":"mystery","data":[]}"#;
        assert!(matches!(decode_frame(text).unwrap(), Frame::Unroutable));
    }

    #[test]
    fn malformed_item_is_skipped_not_fatal() {
        let text = r#"{"channel":"liquidationOrders","data":[{"symbol":"BTCUSDT"}]}"#;
        match decode_frame(text).unwrap() {
            Frame::Liquidations(events) => assert!(events.is_empty()),
            _ => panic!("expected liquidations frame"),
        }
    }
}
