//! Integration test: HyperliquidTransport <-> local websocket server
//!
//! The server accepts one client, waits for its subscribe request, pushes the
//! scripted frames, then closes the socket.

use crossbeam_channel::bounded;
use futures_util::{SinkExt, StreamExt};
use helm_gateway::{FeedConfig, FeedMessage, HyperliquidTransport, PushTransport, Topic};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

const BOOK_FRAME: &str = r#"{"channel":"l2Book","data":{"coin":"BTC","time":1700000000000,"levels":[[{"px":"99","sz":"1.5","n":2}],[{"px":"101","sz":"2","n":1}]]}}"#;

fn spawn_server(frames: Vec<String>) -> (String, thread::JoinHandle<Vec<String>>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            let mut received = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    let text = text.to_string();
                    let is_subscribe = text.contains(r#""method":"subscribe""#);
                    received.push(text);
                    if is_subscribe {
                        for frame in &frames {
                            ws.send(Message::Text(frame.clone().into())).await.unwrap();
                        }
                        let _ = ws.close(None).await;
                    }
                }
            }
            received
        })
    });

    (url, handle)
}

#[test]
fn test_session_routes_book_and_reports_server_close() {
    let _ = env_logger::try_init();

    let (url, server) = spawn_server(vec![
        r#"{"channel":"subscriptionResponse","data":{"method":"subscribe"}}"#.to_string(),
        BOOK_FRAME.to_string(),
    ]);
    let transport = HyperliquidTransport::new(FeedConfig {
        ws_url: url,
        ..Default::default()
    });

    let (lost_tx, lost_rx) = bounded(1);
    let mut session = transport
        .connect(Arc::new(move |reason: &str| {
            let _ = lost_tx.try_send(reason.to_string());
        }))
        .expect("connect to local server");

    let (book_tx, book_rx) = bounded(4);
    session
        .subscribe(
            Topic::OrderBook {
                coin: "BTC".to_string(),
            },
            Arc::new(move |msg: &FeedMessage| {
                let _ = book_tx.try_send(msg.clone());
            }),
        )
        .unwrap();
    assert_eq!(session.subscription_count(), 1);

    match book_rx.recv_timeout(Duration::from_secs(5)).unwrap() {
        FeedMessage::OrderBook(book) => {
            assert_eq!(book.coin, "BTC");
            assert_eq!(book.bids[0].price, dec!(99));
            assert_eq!(book.bids[0].size, dec!(1.5));
            assert_eq!(book.asks[0].price, dec!(101));
        }
        other => panic!("unexpected message: {:?}", other),
    }

    let reason = lost_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(reason.contains("closed"), "reason: {}", reason);

    session.close();
    let received = server.join().unwrap();
    assert!(received[0].contains("l2Book"));
    assert!(received[0].contains("BTC"));
}
