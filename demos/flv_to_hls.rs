//! FLV to HLS - Segments a recorded FLV file through the relay core
//!
//! Run with: cargo run --example flv_to_hls -- <input.flv> [output_dir] [speed]
//!
//! Tags are replayed at `speed` times real time (default 8), like
//! `ffmpeg -re` against a live server.
//!
//! This example demonstrates:
//! - Publishing frames into a `StreamRegistry`
//! - Attaching an `HlsSink` as an ordinary subscriber
//! - Writing finished segments and the live playlist to disk
//!
//! # Architecture
//!
//! ```text
//!   input.flv ──> FlvTag::decode ──> from_flv ──> PublisherHandle::send
//!                                                        │
//!                                                        ▼
//!                                                 StreamRegistry
//!                                                        │ OutputFormat::Sample
//!                                                        ▼
//!                                   HlsSink ──> SegmentMuxer ──> HlsOutput
//!                                                                   │
//!                                                                   ▼
//!                                             output_dir/live/demo/demo-N.ts
//!                                             output_dir/live/demo/playlist.m3u8
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rtmp_relay::hls::{DefaultNaming, HlsOutput, NamingStrategy};
use rtmp_relay::media::flv::FlvTag;
use rtmp_relay::media::FLV_HEADER;
use rtmp_relay::remux::from_flv;
use rtmp_relay::{
    HlsConfig, HlsSink, OutputFormat, RegistryConfig, SegmentMuxer, StreamKey, StreamRegistry,
    TokioClock,
};

/// Write segments and the playlist as they arrive
async fn write_output(mut output: HlsOutput, dir: PathBuf, playlist_path: PathBuf) -> std::io::Result<usize> {
    let mut written = 0;
    while let Some(segment) = output.segments.recv().await {
        let path = dir.join(&segment.uri);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &segment.payload).await?;
        println!(
            "segment #{} {:.3}s {} bytes{}",
            segment.sequence,
            segment.duration_ms as f64 / 1000.0,
            segment.payload.len(),
            if segment.discontinuity { " (discontinuity)" } else { "" },
        );
        written += 1;

        let m3u8 = output.playlist.borrow().clone();
        tokio::fs::write(&playlist_path, m3u8).await?;
    }

    // Final playlist carries the end marker
    let m3u8 = output.playlist.borrow().clone();
    tokio::fs::write(&playlist_path, m3u8).await?;
    Ok(written)
}

fn read_flv(path: &Path) -> Result<Vec<FlvTag>, Box<dyn std::error::Error>> {
    let data = std::fs::read(path)?;
    if data.len() < FLV_HEADER.len() || &data[..3] != b"FLV" {
        return Err("not an FLV file".into());
    }

    // Header length is stored in the header itself, followed by PrevTagSize0
    let header_len = u32::from_be_bytes([data[5], data[6], data[7], data[8]]) as usize;
    let mut offset = header_len + 4;

    let mut tags = Vec::new();
    while offset < data.len() {
        match FlvTag::decode(&data[offset..]) {
            Ok((tag, consumed)) => {
                tags.push(tag);
                offset += consumed;
            }
            Err(e) => {
                eprintln!("Stopping at byte {}: {}", offset, e);
                break;
            }
        }
    }
    Ok(tags)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtmp_relay=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let input = args.next().map(PathBuf::from).ok_or("usage: flv_to_hls <input.flv> [output_dir]")?;
    let output_dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let speed: f64 = match args.next() {
        Some(s) => s.parse()?,
        None => 8.0,
    };

    let tags = read_flv(&input)?;
    println!("Read {} tags from {}", tags.len(), input.display());

    let registry = Arc::new(StreamRegistry::with_config(RegistryConfig::default()));
    let key = StreamKey::new("live", "demo");

    let naming = Arc::new(DefaultNaming);
    let playlist_path = output_dir.join(naming.playlist(&key));
    let muxer = SegmentMuxer::new(key.clone(), HlsConfig::default(), naming, Arc::new(TokioClock));
    let (sink, output) = HlsSink::new(muxer, 16);

    let publisher = registry.publish(&key).await?;
    let viewer = registry.attach(&key, OutputFormat::Sample, sink).await;
    let writer = tokio::spawn(write_output(output, output_dir.clone(), playlist_path.clone()));

    let start = tokio::time::Instant::now();
    let first_ts = tags.first().map_or(0, |t| t.timestamp);
    for tag in &tags {
        let offset_ms = tag.timestamp.wrapping_sub(first_ts) as f64 / speed.max(0.01);
        tokio::time::sleep_until(start + Duration::from_millis(offset_ms as u64)).await;

        let report = publisher.send(from_flv(key.clone(), tag)).await?;
        if report.detached > 0 {
            eprintln!("HLS subscriber detached: {:?}", viewer.detach_reason());
            break;
        }
    }

    // Detach drops anything still queued, so let the consumer catch up first
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Detaching flushes the last segment and ends the playlist
    registry.detach(viewer).await;
    registry.unpublish(publisher).await;

    let written = writer.await??;
    println!();
    println!("Wrote {} segments", written);
    println!("Playlist: {}", playlist_path.display());
    Ok(())
}
