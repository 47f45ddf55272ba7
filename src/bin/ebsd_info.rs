//! `ebsd_info`: inspect EBSD scans and convert between `.ang` text and
//! containers.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flate2::write::GzEncoder;
use flate2::Compression;

use ebsd_conv::adapters::{AngReader, FormatReader, H5AngReader};
use ebsd_conv::ang::dataset_to_ang;
use ebsd_conv::container::{dataset_to_container, MemContainer};
use ebsd_conv::ops::frame_rotations;
use ebsd_conv::types::{Dataset, HeaderKey};

#[derive(Parser)]
#[command(
    name = "ebsd_info",
    about = "Inspect EBSD orientation maps in .ang text or MessagePack containers",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print header, phases, columns and coordinate convention of a scan
    Info {
        /// `.ang` file (optionally gzipped) or container file
        file: PathBuf,

        /// Scan index inside a container
        #[arg(long, default_value = "1")]
        index: String,

        /// Only read these columns (comma separated)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Stop after the header
        #[arg(long)]
        header_only: bool,
    },

    /// Convert a scan; an `.ang` output is written as text, anything else
    /// as a MessagePack container
    Convert {
        input: PathBuf,
        output: PathBuf,

        /// Scan index to read from or store the dataset under
        #[arg(long, default_value = "1")]
        index: String,

        /// Gzip the output (implied by a `.gz` output name)
        #[arg(long)]
        gzip: bool,
    },
}

fn is_ang(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".ang") || name.ends_with(".ang.gz")
}

fn read_scan(
    reader: &mut dyn FormatReader,
    columns: Vec<String>,
    header_only: bool,
) -> Result<()> {
    if !columns.is_empty() {
        reader.read_all_arrays(false);
        reader.set_arrays_to_read(columns.into_iter().collect::<BTreeSet<_>>());
    }
    if header_only {
        reader.read_header_only()?;
    } else {
        reader.read_file()?;
    }
    Ok(())
}

fn print_summary(path: &Path, ds: &Dataset) {
    let h = &ds.header;
    println!("{}", path.display());
    println!(
        "  grid         {} {} x {} (even {})",
        h.grid().name(),
        h.int(HeaderKey::NColsOdd),
        h.int(HeaderKey::NRows),
        h.int(HeaderKey::NColsEven)
    );
    println!(
        "  step         {} x {}",
        h.float(HeaderKey::XStep),
        h.float(HeaderKey::YStep)
    );
    println!(
        "  pattern ctr  {} {} {}",
        h.float(HeaderKey::XStar),
        h.float(HeaderKey::YStar),
        h.float(HeaderKey::ZStar)
    );
    println!("  operator     {}", h.text(HeaderKey::Operator));
    println!("  convention   {}", ds.convention.name());
    if let Some((sample, euler)) = frame_rotations(ds) {
        let q = |q: glam::Quat| format!("[{:.4} {:.4} {:.4} {:.4}]", q.x, q.y, q.z, q.w);
        println!("  sample rot   {}", q(sample));
        println!("  euler rot    {}", q(euler));
    }
    println!("  points       {}", ds.point_count);

    println!("  phases       {}", ds.phases.len());
    for p in ds.phases.iter() {
        let lc = &p.lattice_constants;
        println!(
            "    {:>3} {:<20} {:<8} sym {:<3} a={} b={} c={} families {}",
            p.id,
            p.material_name,
            p.formula,
            p.symmetry.code(),
            lc.a,
            lc.b,
            lc.c,
            p.number_families()
        );
    }

    if !ds.data.is_empty() {
        println!("  columns");
        for (name, col) in &ds.data {
            println!("    {:<20} {}", name, col.len());
        }
    }
}

fn open_scan(
    file: &Path,
    index: &str,
    columns: Vec<String>,
    header_only: bool,
) -> Result<Dataset> {
    if is_ang(file) {
        let mut reader = AngReader::new(file);
        read_scan(&mut reader, columns, header_only)
            .with_context(|| format!("reading {}", file.display()))?;
        Ok(reader.into_dataset())
    } else {
        let container = MemContainer::open(file)
            .with_context(|| format!("opening container {}", file.display()))?;
        let mut reader = H5AngReader::new(container, index);
        read_scan(&mut reader, columns, header_only)
            .with_context(|| format!("reading scan {index} of {}", file.display()))?;
        Ok(reader.into_dataset())
    }
}

fn info(file: PathBuf, index: String, columns: Vec<String>, header_only: bool) -> Result<()> {
    let ds = open_scan(&file, &index, columns, header_only)?;
    print_summary(&file, &ds);
    Ok(())
}

fn convert(input: PathBuf, output: PathBuf, index: String, gzip: bool) -> Result<()> {
    let ds = open_scan(&input, &index, Vec::new(), false)?;

    let bytes = if is_ang(&output) {
        dataset_to_ang(&ds)?.into_bytes()
    } else {
        dataset_to_container(&index, &ds).to_msgpack()?
    };
    let gzip = gzip || output.extension().is_some_and(|e| e.eq_ignore_ascii_case("gz"));
    let bytes = if gzip {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&bytes)?;
        enc.finish()?
    } else {
        bytes
    };
    std::fs::write(&output, &bytes)
        .with_context(|| format!("writing {}", output.display()))?;

    log::info!(
        "wrote {} ({} bytes, {} points, {} phases)",
        output.display(),
        bytes.len(),
        ds.point_count,
        ds.phases.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info {
            file,
            index,
            columns,
            header_only,
        } => info(file, index, columns, header_only),
        Commands::Convert {
            input,
            output,
            index,
            gzip,
        } => convert(input, output, index, gzip),
    }
}
