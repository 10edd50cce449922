//! ferry - send one file to a ferry daemon

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::Color;

use ferry::cli::ClientOpts;
use ferry::client::send_file;
use ferry::progress::TransferProgress;

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        std::process::exit(0);
    })
    .context("Error setting Ctrl-C handler")?;

    let opts = ClientOpts::parse();
    let size = std::fs::metadata(&opts.file_path)
        .with_context(|| format!("stat {}", opts.file_path.display()))?
        .len();
    let name = opts
        .file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let progress = TransferProgress::new(size, &name);
    progress.println(
        &format!("Connecting to {}:{}", opts.host, opts.port),
        Color::Cyan,
    );

    let result = rt.block_on(send_file(
        &opts.file_path,
        &opts.host,
        opts.port,
        Some(progress.bar()),
    ));
    match result {
        Ok(report) => {
            let note = if report.copy { " (renamed)" } else { "" };
            progress.println(
                &format!("File name on server: {}{}", report.server_file_name, note),
                Color::Green,
            );
            progress.finish_success(report.bytes_sent);
            Ok(())
        }
        Err(e) => {
            progress.finish_error(&e.to_string());
            std::process::exit(1);
        }
    }
}
