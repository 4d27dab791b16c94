//! Live end-to-end checks for the canvas server.
//!
//! Drives the full client-visible contract against a running instance:
//! snapshot on connect, write-through placement, broadcast to every client
//! including the originator, malformed-input isolation, and idempotent
//! re-placement. Start the server with an empty `pixels` table and run:
//!
//! ```text
//! cargo run --bin test_place_server_e2e -- --url ws://127.0.0.1:9003/ws --expect-empty
//! ```
//!
//! Without `--expect-empty` the emptiness check on the first snapshot is
//! skipped; everything else still holds on a dirty table.

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

#[derive(Parser, Debug)]
#[clap(author, version, about = "End-to-end checks for the canvas server", long_about = None)]
struct Args {
    /// WebSocket endpoint of a running canvas server
    #[clap(long, default_value = "ws://127.0.0.1:9003/ws")]
    url: String,

    /// Assert that the first snapshot is empty (server started on a fresh table)
    #[clap(long)]
    expect_empty: bool,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
struct PixelMsg {
    x: i32,
    y: i32,
    color: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ServerMessage {
    Init { pixels: Vec<PixelMsg> },
    Pixel { x: i32, y: i32, color: String },
}

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
// Long enough for a wrongly broadcast frame to arrive, short enough to keep
// the run snappy.
const SILENCE_WINDOW: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // --- Client 1: snapshot on connect ---
    let mut client1 = connect(&args.url).await?;
    let init1 = expect_init(&mut client1).await?;
    if args.expect_empty {
        if !init1.is_empty() {
            bail!("expected an empty first snapshot, got {} pixels", init1.len());
        }
        println!("PASS: first client received an empty snapshot");
    } else {
        println!("PASS: first client received a snapshot ({} pixels)", init1.len());
    }

    // --- Placement is confirmed back to the originator ---
    send_place(&mut client1, 3, 4, "#fff").await?;
    expect_pixel(&mut client1, 3, 4, "#fff").await?;
    println!("PASS: originator received its own placement confirmation");

    // --- A later client sees the placement in its snapshot ---
    let mut client2 = connect(&args.url).await?;
    let init2 = expect_init(&mut client2).await?;
    if !init2.contains(&PixelMsg { x: 3, y: 4, color: "#fff".to_string() }) {
        bail!("second client's snapshot is missing (3, 4, #fff): {:?}", init2);
    }
    println!("PASS: second client's snapshot contains the placement");

    // Another client connecting must not produce frames on existing clients.
    assert_silent(&mut client1, "client1 after client2 connected").await?;

    // --- Malformed input is isolated ---
    client1
        .send(Message::Text(
            r#"{"type":"place","x":"a","y":1,"color":"red"}"#.into(),
        ))
        .await?;
    send_place(&mut client1, 5, 5, "green").await?;

    // The very next frame on both clients is the (5, 5) confirmation; a
    // broadcast for the malformed frame would show up first.
    expect_pixel(&mut client1, 5, 5, "green").await?;
    expect_pixel(&mut client2, 5, 5, "green").await?;
    println!("PASS: malformed frame was ignored, valid placement broadcast to all");

    // --- Repeating a placement stays idempotent in storage ---
    send_place(&mut client1, 5, 5, "green").await?;
    expect_pixel(&mut client1, 5, 5, "green").await?;
    expect_pixel(&mut client2, 5, 5, "green").await?;

    let mut client3 = connect(&args.url).await?;
    let init3 = expect_init(&mut client3).await?;
    let at_5_5: Vec<_> = init3.iter().filter(|p| p.x == 5 && p.y == 5).collect();
    if at_5_5.len() != 1 || at_5_5[0].color != "green" {
        bail!("expected exactly one (5, 5, green) record, got {:?}", at_5_5);
    }
    if !init3.contains(&PixelMsg { x: 3, y: 4, color: "#fff".to_string() }) {
        bail!("third client's snapshot is missing (3, 4, #fff)");
    }
    println!("PASS: repeated placement left a single stored record");

    // No stray frames anywhere before we leave.
    assert_silent(&mut client1, "client1 at end").await?;
    assert_silent(&mut client2, "client2 at end").await?;
    assert_silent(&mut client3, "client3 at end").await?;

    client1.close(None).await.ok();
    client2.close(None).await.ok();
    client3.close(None).await.ok();

    println!("All end-to-end checks passed.");
    Ok(())
}

async fn connect(url: &str) -> Result<WsClient> {
    let (ws, _) = connect_async(url)
        .await
        .with_context(|| format!("failed to connect to {}", url))?;
    Ok(ws)
}

async fn send_place(ws: &mut WsClient, x: i32, y: i32, color: &str) -> Result<()> {
    let frame = json!({"type": "place", "x": x, "y": y, "color": color}).to_string();
    ws.send(Message::Text(frame.into())).await?;
    Ok(())
}

async fn recv_message(ws: &mut WsClient) -> Result<ServerMessage> {
    loop {
        let msg = timeout(RECV_TIMEOUT, ws.next())
            .await
            .context("timed out waiting for a server message")?
            .context("connection closed by server")??;
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str())
                    .with_context(|| format!("unrecognized server frame: {}", text));
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => bail!("unexpected non-text frame: {:?}", other),
        }
    }
}

async fn expect_init(ws: &mut WsClient) -> Result<Vec<PixelMsg>> {
    match recv_message(ws).await? {
        ServerMessage::Init { pixels } => Ok(pixels),
        other => bail!("expected init as the first message, got {:?}", other),
    }
}

async fn expect_pixel(ws: &mut WsClient, x: i32, y: i32, color: &str) -> Result<()> {
    match recv_message(ws).await? {
        ServerMessage::Pixel {
            x: gx,
            y: gy,
            color: gcolor,
        } if gx == x && gy == y && gcolor == color => Ok(()),
        other => bail!("expected pixel ({}, {}, {}), got {:?}", x, y, color, other),
    }
}

async fn assert_silent(ws: &mut WsClient, who: &str) -> Result<()> {
    match timeout(SILENCE_WINDOW, ws.next()).await {
        Err(_) => Ok(()), // nothing arrived, as required
        Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => Ok(()),
        Ok(frame) => bail!("{} received an unexpected frame: {:?}", who, frame),
    }
}
