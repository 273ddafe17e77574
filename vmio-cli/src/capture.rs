//! Package capture files: a sequence of length-prefixed frames.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde_json::json;
use tracing::{debug, info};
use vmio::SecurityLevel;
use vmio_proto::Package;

use crate::OutputFormat;
use crate::inspect::{parse_command, pick};

/// Arguments for `vmio frames`.
#[derive(clap::Args)]
pub struct FramesArgs {
    /// Capture file to decode.
    pub path: PathBuf,

    /// Security level of the table used to resolve routes.
    #[arg(short, long, default_value = "normal")]
    pub level: SecurityLevel,

    /// Use the server-side table instead of the client one.
    #[arg(long)]
    pub server: bool,

    /// Output format.
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for `vmio pack`.
#[derive(clap::Args)]
pub struct PackArgs {
    /// Command number or name of the package.
    pub command: String,

    /// UTF-8 payload. Without it the package is raw and empty.
    #[arg(long)]
    pub text: Option<String>,

    /// Capture file to append to, created if missing.
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Decodes frames until the stream ends on a frame boundary.
fn read_frames(r: &mut impl BufRead) -> Result<Vec<Package>> {
    let mut packages = Vec::new();
    while !r.fill_buf()?.is_empty() {
        let package: Package = vmio_proto::decode(&mut *r)
            .with_context(|| format!("decoding frame {}", packages.len()))?;
        packages.push(package);
    }
    Ok(packages)
}

fn package_for(command: &str, text: Option<&str>) -> Result<Package> {
    let kind = parse_command(command)?;
    let package = match text {
        Some(text) => Package::text(kind, text),
        None => Package::raw(kind, Vec::new()),
    };
    if !package.is_valid() {
        bail!("refusing to pack a malformed {kind} package");
    }
    Ok(package)
}

pub fn frames(args: &FramesArgs) -> Result<()> {
    let file =
        File::open(&args.path).with_context(|| format!("opening {}", args.path.display()))?;
    let packages = read_frames(&mut BufReader::new(file))
        .with_context(|| format!("reading {}", args.path.display()))?;
    debug!(count = packages.len(), "decoded capture");
    let table = pick(args.level, args.server);

    if matches!(args.format, OutputFormat::Json) {
        let rows: Vec<_> = packages
            .iter()
            .map(|p| {
                json!({
                    "id": p.numeric_id(),
                    "command": p.kind().0,
                    "name": p.kind().name(),
                    "encoding": p.encoding(),
                    "size": p.payload().len(),
                    "route": table.resolve(p.kind()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<8} {:<48} {:<6} {:>8} {:<20}", "ID", "COMMAND", "ENC", "BYTES", "ROUTE");
    for p in &packages {
        println!(
            "{:<8} {:<48} {:<6} {:>8} {:<20}",
            p.numeric_id(),
            p.kind().to_string(),
            format!("{:?}", p.encoding()),
            p.payload().len(),
            table.resolve(p.kind()).to_string(),
        );
    }
    Ok(())
}

pub fn pack(args: &PackArgs) -> Result<()> {
    let package = package_for(&args.command, args.text.as_deref())?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.output)
        .with_context(|| format!("opening {}", args.output.display()))?;
    vmio_proto::encode(&mut BufWriter::new(file), &package)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(kind = %package.kind(), id = package.numeric_id(), "appended package");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use vmio_proto::{CommandId, Encoding};

    use super::*;

    #[test]
    fn capture_decodes_every_frame() {
        let mut buf = Vec::new();
        let first = package_for("VM_GET_STATE", None).unwrap();
        let second = package_for("io_stdin_portion", Some("uname\n")).unwrap();
        vmio_proto::encode(&mut buf, &first).unwrap();
        vmio_proto::encode(&mut buf, &second).unwrap();

        let packages = read_frames(&mut Cursor::new(buf)).unwrap();
        assert_eq!(packages, [first, second]);
        assert_eq!(packages[1].kind(), CommandId::IO_STDIN_PORTION);
        assert_eq!(packages[1].encoding(), Encoding::Utf8);
    }

    #[test]
    fn empty_capture_has_no_frames() {
        assert!(read_frames(&mut Cursor::new(Vec::new())).unwrap().is_empty());
    }

    #[test]
    fn truncated_capture_names_the_frame() {
        let mut buf = Vec::new();
        vmio_proto::encode(&mut buf, &package_for("VM_START", None).unwrap()).unwrap();
        vmio_proto::encode(&mut buf, &package_for("VM_STOP", Some("now")).unwrap()).unwrap();
        buf.truncate(buf.len() - 2);

        let err = read_frames(&mut Cursor::new(buf)).unwrap_err();
        assert!(format!("{err:#}").contains("decoding frame 1"));
    }

    #[test]
    fn illegal_packages_are_not_packed() {
        assert!(package_for("0", None).is_err());
        assert!(package_for("NOT_A_COMMAND", None).is_err());
    }
}
