use std::path::PathBuf;

use anyhow::Context;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

use crate::dedup::UrlRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// One URL per line.
    Plain,
    /// One `{"source":..,"url":..}` object per line.
    Json,
}

pub fn format_record(record: &UrlRecord, format: Format) -> anyhow::Result<String> {
    Ok(match format {
        Format::Plain => record.url.clone(),
        Format::Json => serde_json::to_string(record)?,
    })
}

/// Spawn a background task that writes every received record to stdout and, if given, appends it to `path`.
/// Resolves to the number of records written.
pub fn spawn_url_writer(
    path: Option<PathBuf>,
    format: Format,
    mut rx: mpsc::Receiver<UrlRecord>,
) -> tokio::task::JoinHandle<anyhow::Result<usize>> {
    tokio::spawn(async move {
        let mut file = match &path {
            Some(p) => {
                let f = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(p)
                    .await
                    .with_context(|| format!("failed to open output file {}", p.display()))?;
                Some(BufWriter::new(f))
            }
            None => None,
        };
        let mut stdout = BufWriter::new(tokio::io::stdout());

        let mut written = 0usize;
        while let Some(record) = rx.recv().await {
            let mut line = format_record(&record, format)?;
            line.push('\n');
            write_line(&mut stdout, &line).await?;
            if let Some(f) = file.as_mut() {
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    tracing::error!(error=%e, "failed to write output line");
                }
            }
            written += 1;
        }

        stdout.flush().await?;
        if let Some(f) = file.as_mut() {
            if let Err(e) = f.flush().await {
                tracing::error!(error=%e, "failed to flush output file");
            }
        }
        Ok(written)
    })
}

async fn write_line<W: AsyncWrite + Unpin>(w: &mut W, line: &str) -> anyhow::Result<()> {
    w.write_all(line.as_bytes()).await?;
    // Keep output flowing to pipes as it is found.
    w.flush().await?;
    Ok(())
}
