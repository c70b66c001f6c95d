//! rql-reader CLI entry point.
//!
//! A small demo client: one-shot inventory or a timed continuous read
//! against a networked reader.

use std::time::Duration;

use clap::{Parser, Subcommand};

use rql_reader::prelude::*;

/// RQL RFID reader client
#[derive(Parser, Debug)]
#[command(name = "rql-reader", version, about, long_about = None)]
struct Cli {
    /// Reader address, host:port
    #[arg(short, long)]
    address: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// One-shot tag inventory
    Inventory {
        /// Read duration in milliseconds
        #[arg(short, long, default_value_t = 500)]
        timeout: u64,

        /// Antennas to search (default: reader's automatic selection)
        #[arg(short = 'n', long, value_delimiter = ',')]
        antennas: Vec<u16>,
    },

    /// Continuous read for a fixed duration
    Stream {
        /// How long to stream, in seconds
        #[arg(short, long, default_value_t = 5)]
        seconds: u64,

        /// Antennas to search
        #[arg(short = 'n', long, value_delimiter = ',')]
        antennas: Vec<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut reader = RqlReader::tcp(cli.address);
    reader.connect().await?;

    match cli.command {
        Commands::Inventory { timeout, antennas } => {
            let plan = ReadPlan::Simple(SimpleReadPlan::new(antennas, TagProtocol::Gen2));
            let records = reader.read(&plan, timeout).await?;
            println!("{} tag(s):", records.len());
            for record in records {
                print_record(&record);
            }
        }
        Commands::Stream { seconds, antennas } => {
            let plan = ReadPlan::Simple(SimpleReadPlan::new(antennas, TagProtocol::Gen2));
            let mut events = reader.subscribe();
            reader.start_reading(&plan).await?;

            let deadline = tokio::time::sleep(Duration::from_secs(seconds));
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    event = events.recv() => match event {
                        Ok(ReadEvent::TagRead(record)) => print_record(&record),
                        Ok(ReadEvent::Error(e)) => {
                            eprintln!("stream error: {}", e);
                            break;
                        }
                        Ok(ReadEvent::Stopped) | Err(_) => break,
                    },
                }
            }
            reader.stop_reading().await;
        }
    }

    reader.disconnect().await?;
    Ok(())
}

fn print_record(record: &TagReadRecord) {
    let rssi = record
        .rssi
        .map(|r| format!(" rssi={}", r))
        .unwrap_or_default();
    println!(
        "  {} antenna={} reads={}{}",
        record.tag, record.antenna, record.read_count, rssi
    );
}
