//! press – command-line gazette → print-ready PDF.
//!
//! Usage:
//!   press <manifest.json> <gazette-id> [output.pdf] [--config engine.json] [--timeout-ms N]
//!
//! If `output.pdf` is omitted the PDF is written to `<gazette-id>.pdf` in the
//! current directory.

use std::{env, fs, path::PathBuf, process, sync::Arc};

use gazette_press::codec::RasterCodec;
use gazette_press::render::PdfWriterFactory;
use gazette_press::store::JsonFileStore;
use gazette_press::{EngineConfig, GazetteId, LayoutService};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut manifest_path: Option<PathBuf> = None;
    let mut gazette_id: Option<String> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut timeout_ms: Option<u64> = None;
    let mut positional = 0usize;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => match iter.next() {
                Some(v) => config_path = Some(PathBuf::from(v)),
                None => {
                    eprintln!("Error: --config needs a path.");
                    process::exit(1);
                }
            },
            "--timeout-ms" => match iter.next().map(|v| v.parse::<u64>()) {
                Some(Ok(ms)) => timeout_ms = Some(ms),
                _ => {
                    eprintln!("Error: --timeout-ms needs a number of milliseconds.");
                    process::exit(1);
                }
            },
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            value => {
                match positional {
                    0 => manifest_path = Some(PathBuf::from(value)),
                    1 => gazette_id = Some(value.to_string()),
                    2 => output_path = Some(PathBuf::from(value)),
                    _ => {
                        eprintln!("Unexpected argument: {value}");
                        print_usage(&args[0]);
                        process::exit(1);
                    }
                }
                positional += 1;
            }
        }
    }

    let (manifest, id) = match (manifest_path, gazette_id) {
        (Some(m), Some(id)) => (m, GazetteId::new(id)),
        _ => {
            eprintln!("Error: a manifest and a gazette id are required.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    let output = output_path.unwrap_or_else(|| PathBuf::from(format!("{id}.pdf")));

    let mut config = match &config_path {
        Some(path) => match EngineConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error reading config '{}': {e}", path.display());
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    if let Some(ms) = timeout_ms {
        // 0 disables the deadline.
        config.fetch_timeout_ms = (ms > 0).then_some(ms);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            process::exit(1);
        }
    };

    let service = LayoutService::new(
        JsonFileStore::new(&manifest),
        Arc::new(RasterCodec::default()),
        PdfWriterFactory,
        &config,
    );
    log::debug!(
        "rendering {id} from '{}' (fetch timeout {:?})",
        manifest.display(),
        config.fetch_timeout()
    );

    match runtime.block_on(service.render(&id, &service.context())) {
        Ok(doc) => {
            // Create output directory if necessary.
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        eprintln!("Error creating output directory: {e}");
                        process::exit(1);
                    }
                }
            }
            if let Err(e) = fs::write(&output, &doc.bytes) {
                eprintln!("Error writing '{}': {e}", output.display());
                process::exit(1);
            }
            eprintln!(
                "Wrote '{}' ({} bytes, {} page{})",
                output.display(),
                doc.bytes.len(),
                doc.pages,
                if doc.pages == 1 { "" } else { "s" }
            );
        }
        Err(e) => {
            eprintln!("Error generating layout: {e}");
            process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    eprintln!("press – print-ready gazette PDFs (gazette-press)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <manifest.json> <gazette-id> [output.pdf] [--config engine.json] [--timeout-ms N]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <manifest.json>  Gazettes and base64 content images");
    eprintln!("  <gazette-id>     Gazette to render");
    eprintln!("  [output.pdf]     Output path  (default: <gazette-id>.pdf)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --config, -c     Engine config JSON (missing fields use defaults)");
    eprintln!("  --timeout-ms     Store read deadline; 0 waits forever (default: 10000)");
    eprintln!("  --help           Print this message");
    eprintln!();
    eprintln!("Set RUST_LOG=debug for per-stage logging.");
}
