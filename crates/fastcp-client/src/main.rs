//! fastcp client binary entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use fastcp_client::{Cli, TransferOutcome, collect_files, transfer_file, walk};
use fastcp_core::error::{Error, Result};
use fastcp_core::file::BufferedIo;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_format = cli.log_format.into();
    if let Err(e) = fastcp_core::init_logging(cli.verbose.saturating_add(2), None, log_format) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        error!(error = %e, "transfer failed");
        std::process::exit(exit_code(&e));
    }
}

/// Exit codes: 0 success, 1 configuration/connection error, 2 checksum
/// mismatch, 3 lost connection.
fn exit_code(err: &Error) -> i32 {
    match err {
        Error::ChecksumMismatch => 2,
        Error::ConnectionLost => 3,
        _ => 1,
    }
}

async fn run(cli: Cli) -> Result<()> {
    cli.validate()?;

    let files = enumerate_files(&cli)?;
    if files.is_empty() {
        info!("no files to send");
        return Ok(());
    }

    let addr = tokio::net::lookup_host((cli.address.as_str(), cli.port))
        .await
        .map_err(|e| Error::config(format!("cannot resolve {}: {e}", cli.address)))?
        .next()
        .ok_or_else(|| Error::config(format!("no addresses for {}", cli.address)))?;

    let (mut conn, cipher) =
        fastcp_client::connection::establish(addr, cli.dscp, cli.mptcp, cli.key.as_deref()).await?;

    let chunk_size = cli.effective_chunk_size();
    let kind = cli.checksum_kind();
    let factory = BufferedIo;

    let mut sent = 0usize;
    let mut skipped = 0usize;
    for (path, name) in &files {
        let outcome = transfer_file(
            &mut conn,
            &factory,
            Arc::clone(&cipher),
            path,
            name,
            chunk_size,
            cli.workers,
            kind,
        )
        .await?;

        match outcome {
            TransferOutcome::Sent(_) => sent += 1,
            TransferOutcome::Skipped => skipped += 1,
        }
    }

    info!(sent, skipped, "processed all files");
    conn.close().await;
    Ok(())
}

/// Resolve the CLI source arguments into `(path, wire name)` pairs.
fn enumerate_files(cli: &Cli) -> Result<Vec<(PathBuf, String)>> {
    if let Some(file) = &cli.file {
        if !file.is_file() {
            return Err(Error::config(format!(
                "{} is not a regular file (use -r for folders)",
                file.display()
            )));
        }
        let name = file
            .file_name()
            .ok_or_else(|| Error::config(format!("{} names no file", file.display())))?
            .to_string_lossy()
            .into_owned();
        return Ok(vec![(file.clone(), name)]);
    }

    let root = cli.recursive.as_ref().expect("validated by Cli::validate");
    if !root.is_dir() {
        return Err(Error::config(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    Ok(collect_files(root)
        .into_iter()
        .map(|path| {
            let name = walk::relative_name(root, &path);
            (path, name)
        })
        .collect())
}
