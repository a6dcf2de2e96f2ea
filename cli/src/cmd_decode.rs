//! `psstream decode`: run both decoder passes over a captured message.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, SecondsFormat};
use psstream_core::{RowsetDecoder, TransactionEventBuilder};

pub fn run(
    file: &Path,
    transaction_id: Option<&str>,
    orig_timestamp: Option<&str>,
    header_only: bool,
) -> Result<()> {
    let source = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let mut decoder = RowsetDecoder::new(BufReader::new(source));

    let header = decoder.read_header().context("reading message header")?;
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    writeln!(out, "{}", serde_json::to_string(&header)?)?;
    if header_only {
        return Ok(out.flush()?);
    }

    let transaction_id = match transaction_id {
        Some(id) => id.to_owned(),
        None => file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| header.message_name.clone()),
    };
    let orig_timestamp = orig_timestamp.map(str::to_owned).unwrap_or_else(|| {
        Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
    });
    let builder = TransactionEventBuilder::new(transaction_id, orig_timestamp);

    let mut transactions = decoder.transactions()?;
    for fragment in transactions.by_ref() {
        let fragment = fragment.context("decoding transaction")?;
        let (_, wire) = builder.encode(fragment, Local::now().fixed_offset())?;
        writeln!(out, "{wire}")?;
    }
    out.flush()?;

    eprintln!(
        "{} transactions, peak retained {} bytes",
        transactions.emitted(),
        transactions.peak_retained_bytes()
    );
    Ok(())
}
