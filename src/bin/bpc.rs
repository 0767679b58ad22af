//! Compile `.bp` schemas: parse, resolve and hash every type, then write the
//! API manifest.
//!
//! Usage:
//!   bpc [--output_dir DIR] [--namespace NS] [--debug] FILE.bp ...
//!
//! Without `--output_dir` the manifest goes to stdout. Schema errors print as
//! `file:line: message: what` and exit with status 1.

use bluepacket::emit::{emit, hex64, ManifestEmitter};
use bluepacket::resolve::TypeEntry;
use bluepacket::{parse_files, ResolvedSchema, SchemaError};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "bpc", version, about = "BluePacket schema compiler")]
struct Args {
    /// Directory receiving the generated manifest
    #[arg(long = "output_dir", alias = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Namespace recorded in the manifest
    #[arg(long, alias = "package")]
    namespace: Option<String>,

    /// Print each type's version string and hash
    #[arg(long)]
    debug: bool,

    /// Schema files, compiled together
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn compile(args: &Args) -> anyhow::Result<Result<(), SchemaError>> {
    let schema = match parse_files(&args.files).and_then(ResolvedSchema::resolve) {
        Ok(s) => s,
        Err(e) => return Ok(Err(e)),
    };
    info!("{} types, apiVersion {}", schema.len(), hex64(schema.api_version()));

    if args.debug {
        for id in schema.ids() {
            if let Some(TypeEntry::Packet(p)) = schema.entry(id) {
                if p.is_abstract {
                    continue;
                }
                let text = match schema.version_string(id) {
                    Ok(t) => t,
                    Err(e) => return Ok(Err(e)),
                };
                println!("{} {} {}", p.name, hex64(p.packet_hash()), text);
            }
        }
    }

    let mut manifest = ManifestEmitter::new(args.namespace.as_deref());
    emit(&schema, &mut manifest)?;
    match &args.output_dir {
        Some(dir) => {
            let path = manifest.write_to(dir)?;
            info!("Wrote {}", path.display());
        }
        None => print!("{}", manifest.text()),
    }
    Ok(Ok(()))
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    match compile(&args)? {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("{}", e);
            Ok(ExitCode::from(1))
        }
    }
}
