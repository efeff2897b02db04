//! A small relay server used to exercise the client session during manual
//! testing: accepts any number of connections, frames each the same way the
//! client does, and rebroadcasts inbound records to every other peer.

use dashmap::DashMap;
use log::{debug, error, info, warn};
use pulsenet_core::framer::Framer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

const MAX_RECORD_SIZE: usize = pulsenet_core::framer::DEFAULT_MAX_RECORD_SIZE;

type PeerMap = Arc<DashMap<SocketAddr, mpsc::UnboundedSender<Vec<u8>>>>;

pub async fn run(address: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!("relay server listening on {address}");
    let peers: PeerMap = Arc::new(DashMap::new());

    loop {
        let (socket, addr) = listener.accept().await?;
        info!("accepted connection from {addr}");
        let peers = peers.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_peer(socket, addr, peers.clone()).await {
                warn!("connection {addr} ended with error: {e}");
            }
            peers.remove(&addr);
            info!("connection {addr} closed, {} peers remain", peers.len());
        });
    }
}

async fn handle_peer(socket: TcpStream, addr: SocketAddr, peers: PeerMap) -> std::io::Result<()> {
    let (mut read_half, mut write_half) = socket.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    peers.insert(addr, tx);

    let writer = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = write_half.write_all(&bytes).await {
                warn!("write to {addr} failed: {e}");
                break;
            }
        }
    });

    let mut framer = Framer::new(MAX_RECORD_SIZE);
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        framer.feed(&buf[..n]);
        loop {
            match framer.next_record() {
                Ok(Some(record)) => {
                    debug!("relaying {} bytes from {addr}", record.len());
                    broadcast_except(&peers, addr, &record);
                }
                Ok(None) => break,
                Err(e) => {
                    error!("framing error from {addr}: {e}");
                    writer.abort();
                    return Ok(());
                }
            }
        }
    }

    writer.abort();
    Ok(())
}

fn broadcast_except(peers: &PeerMap, sender: SocketAddr, record: &[u8]) {
    let framed = Framer::frame(record);
    for entry in peers.iter() {
        if *entry.key() == sender {
            continue;
        }
        let _ = entry.value().send(framed.clone());
    }
}
