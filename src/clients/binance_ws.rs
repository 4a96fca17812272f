// Binance WebSocket streams: trade prints and user-data events

use crate::clients::binance_rest::de_f64;
use crate::clients::gateway::{TickStream, UserEventStream};
use crate::core::types::{BalanceEntry, ExecutionReport, OrderStatus, Side, Tick, UserEvent};
use crate::error::{TradingError, TradingResult};
use futures_util::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct TradeRaw {
    #[serde(rename = "e")]
    event: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p", deserialize_with = "de_f64")]
    price: f64,
}

#[derive(Debug, Deserialize)]
struct PositionRaw {
    #[serde(rename = "a")]
    asset: String,
    #[serde(rename = "f", deserialize_with = "de_f64")]
    free: f64,
    #[serde(rename = "l", deserialize_with = "de_f64")]
    locked: f64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "e")]
enum UserMessage {
    #[serde(rename = "outboundAccountPosition")]
    AccountPosition {
        #[serde(rename = "B")]
        balances: Vec<PositionRaw>,
    },
    #[serde(rename = "balanceUpdate")]
    BalanceUpdate {
        #[serde(rename = "a")]
        asset: String,
        #[serde(rename = "d", deserialize_with = "de_f64")]
        delta: f64,
    },
    #[serde(rename = "executionReport")]
    Execution {
        #[serde(rename = "s")]
        symbol: String,
        #[serde(rename = "i")]
        order_id: u64,
        #[serde(rename = "S")]
        side: String,
        #[serde(rename = "p", deserialize_with = "de_f64")]
        price: f64,
        #[serde(rename = "q", deserialize_with = "de_f64")]
        quantity: f64,
        #[serde(rename = "X")]
        status: String,
    },
    #[serde(rename = "listenKeyExpired")]
    ListenKeyExpired {},
    #[serde(other)]
    Other,
}

/// Parse a `<symbol>@trade` frame; other frames yield `None`.
pub fn parse_trade(text: &str) -> TradingResult<Option<Tick>> {
    let raw: TradeRaw = serde_json::from_str(text)?;
    if raw.event != "trade" {
        return Ok(None);
    }
    Ok(Some(Tick {
        symbol: raw.symbol,
        price: raw.price,
    }))
}

/// Parse a user-data frame; event types the engine ignores yield `None`.
pub fn parse_user_event(text: &str) -> TradingResult<Option<UserEvent>> {
    let event = match serde_json::from_str::<UserMessage>(text)? {
        UserMessage::AccountPosition { balances } => UserEvent::AccountPosition(
            balances
                .into_iter()
                .map(|b| BalanceEntry { asset: b.asset, free: b.free, locked: b.locked })
                .collect(),
        ),
        UserMessage::BalanceUpdate { asset, delta } => UserEvent::BalanceDelta { asset, delta },
        UserMessage::Execution { symbol, order_id, side, price, quantity, status } => {
            let side = Side::parse(&side)
                .ok_or_else(|| TradingError::Parse(format!("unknown side {} in execution report", side)))?;
            UserEvent::Execution(ExecutionReport {
                symbol,
                order_id,
                side,
                price,
                orig_qty: quantity,
                status: OrderStatus::parse(&status),
            })
        }
        UserMessage::ListenKeyExpired {} => UserEvent::SessionExpired,
        UserMessage::Other => return Ok(None),
    };
    Ok(Some(event))
}

async fn open(url: &str) -> TradingResult<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
> {
    let (ws, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| TradingError::Timeout(format!("connecting to {}", url)))??;
    Ok(ws)
}

/// Frames to items: text is parsed (bad frames logged and skipped), a close
/// frame or socket error surfaces as a stream error.
fn frame_to_item<T>(
    frame: Result<Message, tokio_tungstenite::tungstenite::Error>,
    parse: fn(&str) -> TradingResult<Option<T>>,
    label: &str,
) -> Option<TradingResult<T>> {
    match frame {
        Ok(Message::Text(text)) => match parse(&text) {
            Ok(item) => item.map(Ok),
            Err(e) => {
                warn!("⚠️  {}: skipping unreadable frame: {}", label, e);
                None
            }
        },
        Ok(Message::Close(frame)) => Some(Err(TradingError::Stream(format!(
            "{} closed by server: {:?}",
            label, frame
        )))),
        Ok(_) => None,
        Err(e) => Some(Err(e.into())),
    }
}

pub async fn trade_stream(ws_url: &str, symbol: &str) -> TradingResult<TickStream> {
    let url = format!("{}/ws/{}@trade", ws_url.trim_end_matches('/'), symbol.to_lowercase());
    let ws = open(&url).await?;
    info!("✅ Connected to {} trade stream", symbol);

    let label = format!("{} trades", symbol);
    let stream = ws.filter_map(move |frame| {
        let item = frame_to_item(frame, parse_trade, &label);
        async move { item }
    });
    Ok(stream.boxed())
}

pub async fn user_stream(ws_url: &str, listen_key: &str) -> TradingResult<UserEventStream> {
    let url = format!("{}/ws/{}", ws_url.trim_end_matches('/'), listen_key);
    let ws = open(&url).await?;
    info!("✅ Connected to user data stream");

    let stream = ws.filter_map(|frame| {
        let item = frame_to_item(frame, parse_user_event, "user data");
        async move { item }
    });
    Ok(stream.boxed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trade() {
        let text = r#"{"e":"trade","E":1672515782136,"s":"BTCUSDT","t":12345,"p":"50123.45","q":"0.01","T":1672515782136,"m":true,"M":true}"#;
        let tick = parse_trade(text).unwrap().unwrap();
        assert_eq!(tick.symbol, "BTCUSDT");
        assert_eq!(tick.price, 50123.45);
    }

    #[test]
    fn test_parse_trade_rejects_garbage() {
        assert!(parse_trade("not json").is_err());
        assert!(parse_trade(r#"{"e":"aggTrade","s":"BTCUSDT","p":"1.0"}"#).unwrap().is_none());
    }

    #[test]
    fn test_parse_account_position() {
        let text = r#"{"e":"outboundAccountPosition","E":1564034571105,"u":1564034571073,
            "B":[{"a":"ETH","f":"10000.000000","l":"0.000000"},{"a":"USDT","f":"42.5","l":"10"}]}"#;
        match parse_user_event(text).unwrap() {
            Some(UserEvent::AccountPosition(entries)) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[1], BalanceEntry { asset: "USDT".into(), free: 42.5, locked: 10.0 });
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_balance_update() {
        let text = r#"{"e":"balanceUpdate","E":1573200697110,"a":"BTC","d":"-0.00001000","T":1573200697068}"#;
        assert_eq!(
            parse_user_event(text).unwrap(),
            Some(UserEvent::BalanceDelta { asset: "BTC".into(), delta: -0.00001 })
        );
    }

    #[test]
    fn test_parse_execution_report() {
        let text = r#"{"e":"executionReport","E":1499405658658,"s":"ETHBTC","c":"mUvoqJxFIILMdfAW5iGSOW","S":"BUY",
            "o":"LIMIT","f":"GTC","q":"1.00000000","p":"0.10264410","P":"0.00000000","F":"0.00000000","g":-1,"C":"",
            "x":"NEW","X":"NEW","r":"NONE","i":4293153,"l":"0.00000000","z":"0.00000000","L":"0.00000000","n":"0",
            "N":null,"T":1499405658657,"t":-1,"I":8641984,"w":true,"m":false,"M":false,"O":1499405658657,
            "Z":"0.00000000","Y":"0.00000000","Q":"0.00000000"}"#;
        match parse_user_event(text).unwrap() {
            Some(UserEvent::Execution(report)) => {
                assert_eq!(report.symbol, "ETHBTC");
                assert_eq!(report.order_id, 4293153);
                assert_eq!(report.side, Side::Buy);
                assert_eq!(report.price, 0.1026441);
                assert_eq!(report.orig_qty, 1.0);
                assert_eq!(report.status, OrderStatus::New);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_listen_key_expired_and_unknown() {
        let expired = r#"{"e":"listenKeyExpired","E":1576653824250,"listenKey":"abc"}"#;
        assert_eq!(parse_user_event(expired).unwrap(), Some(UserEvent::SessionExpired));

        let other = r#"{"e":"listStatus","E":1564035303637,"s":"ETHBTC"}"#;
        assert_eq!(parse_user_event(other).unwrap(), None);
    }
}
