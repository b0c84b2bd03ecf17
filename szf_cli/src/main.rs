use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use szf_core::{SeekTable, SeekableReader, SeekableWriter, DEFAULT_MAX_FRAME_SIZE};
use szf_engines::{compression_level_range, CompressOptions, ZstdDecompressEngine};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "szf",
    about = "Seekable zstd streams — compress, inspect, and randomly access",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a seekable stream of independent frames
    Compress {
        /// Source file to compress ("-" reads stdin)
        input: PathBuf,
        /// Destination seekable file
        output: PathBuf,
        /// Zstd compression level
        #[arg(short, long, default_value_t = 3)]
        level: i32,
        /// Max decompressed bytes per frame; smaller frames seek faster
        /// and compress worse
        #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
        max_frame_size: u32,
        /// Engine worker threads (0 = single-threaded)
        #[arg(long, default_value_t = 0)]
        workers: u32,
        /// Skip per-frame content checksums
        #[arg(long)]
        no_checksum: bool,
        /// Append after the frames already in the destination instead of
        /// overwriting it
        #[arg(long)]
        append: bool,
    },
    /// Fully decompress a seekable file back to raw bytes
    Decompress {
        /// Source seekable file
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
        /// Ceiling on the window size frames may demand (log2)
        #[arg(long)]
        window_log_max: Option<u32>,
    },
    /// Print seek-table statistics
    Inspect {
        /// Seekable file to inspect
        file: PathBuf,
        /// Print per-frame details
        #[arg(long)]
        frames: bool,
    },
    /// Decompress a byte range without touching the rest of the stream
    ///
    /// Only the frames covering the range are read and decoded; this is
    /// the random-access path.
    Read {
        /// Seekable file
        file: PathBuf,
        /// Decompressed byte offset to start at
        #[arg(short, long)]
        start: u64,
        /// Number of decompressed bytes to read
        #[arg(short = 'n', long)]
        len: usize,
        /// Write raw bytes to a file instead of printing a hex dump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn hex_dump(bytes: &[u8]) {
    for (i, chunk) in bytes.chunks(16).enumerate() {
        print!("  {:04x}  ", i * 16);
        for b in chunk {
            print!("{:02x} ", b);
        }
        for _ in chunk.len()..16 {
            print!("   ");
        }
        print!("  |");
        for b in chunk {
            if b.is_ascii_graphic() || *b == b' ' {
                print!("{}", *b as char);
            } else {
                print!(".");
            }
        }
        println!("|");
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    input: PathBuf,
    output: PathBuf,
    level: i32,
    max_frame_size: u32,
    workers: u32,
    no_checksum: bool,
    append: bool,
) -> anyhow::Result<()> {
    if !compression_level_range().contains(&level) {
        anyhow::bail!(
            "level {} outside the supported range {:?}",
            level,
            compression_level_range()
        );
    }
    let engine = CompressOptions::new(level)
        .workers(workers)
        .into_engine()
        .context("building compression engine")?;

    let mut writer = if append {
        let file = File::options()
            .read(true)
            .write(true)
            .open(&output)
            .with_context(|| format!("opening {:?} for append", output))?;
        SeekableWriter::append(file, engine, max_frame_size)?
    } else {
        let file = File::create(&output)
            .with_context(|| format!("creating output file {:?}", output))?;
        SeekableWriter::new(file, engine, max_frame_size, !no_checksum)?
    };

    let t0 = Instant::now();
    let mut total = 0u64;
    let mut buf = vec![0u8; 128 * 1024];
    let mut src: Box<dyn Read> = if input.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(File::open(&input).with_context(|| {
            format!("opening input file {:?}", input)
        })?))
    };
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write(&buf[..n])?;
        total += n as u64;
    }

    writer.finish()?;
    let elapsed = t0.elapsed();

    let frame_count = {
        let mut f = File::open(&output)?;
        SeekTable::load(&mut f, true)?.num_frames()
    };
    let compressed_size = std::fs::metadata(&output)?.len();
    eprintln!("  level       : {}", level);
    eprintln!("  frame cap   : {}", human_bytes(max_frame_size as u64));
    eprintln!("  frames      : {}", frame_count);
    eprintln!("  raw size    : {}", human_bytes(total));
    eprintln!("  compressed  : {}", human_bytes(compressed_size));
    eprintln!(
        "  ratio       : {:.2}x",
        total as f64 / compressed_size as f64
    );
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((total as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_decompress(
    input: PathBuf,
    output: PathBuf,
    window_log_max: Option<u32>,
) -> anyhow::Result<()> {
    let mut options = szf_engines::DecompressOptions::new();
    if let Some(log) = window_log_max {
        options = options.window_log_max(log);
    }
    let engine = options.into_engine().context("building decompression engine")?;

    let file = File::open(&input).with_context(|| format!("opening input file {:?}", input))?;
    let mut reader = SeekableReader::new(file, engine)?;

    let is_stdout = output.to_str() == Some("-");
    let mut dst: Box<dyn Write> = if is_stdout {
        Box::new(io::stdout())
    } else {
        Box::new(
            File::create(&output).with_context(|| format!("creating output file {:?}", output))?,
        )
    };

    let t0 = Instant::now();
    let total = io::copy(&mut reader, &mut dst)?;
    let elapsed = t0.elapsed();

    eprintln!("  frames      : {}", reader.seek_table().num_frames());
    eprintln!("  raw size    : {}", human_bytes(total));
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((total as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf, show_frames: bool) -> anyhow::Result<()> {
    let mut f = File::open(&file).with_context(|| format!("opening {:?}", file))?;
    let table = SeekTable::load(&mut f, true)?;
    let file_size = f.seek(SeekFrom::End(0))?;

    let compressed = table.total_compressed_size();
    let raw = table.total_decompressed_size();

    println!("=== Seekable stream: {:?} ===", file);
    println!();
    println!("  frames         : {}", table.num_frames());
    println!("  checksums      : {}", table.has_checksum());
    println!("  raw size       : {}", human_bytes(raw));
    println!("  compressed     : {}", human_bytes(compressed));
    println!(
        "  seek table     : {}",
        human_bytes(table.on_disk_size())
    );
    println!("  file on disk   : {}", human_bytes(file_size));
    if compressed > 0 {
        println!("  ratio          : {:.2}x", raw as f64 / compressed as f64);
    }

    if show_frames {
        println!();
        println!(
            "  {:>8}  {:>14}  {:>12}  {:>12}  {:>10}",
            "frame", "comp offset", "compressed", "raw", "checksum"
        );
        println!("  {}", "-".repeat(64));
        for (i, e) in table.entries().iter().enumerate() {
            let (start, _) = table.frame_start_sizes(i);
            println!(
                "  {:>8}  {:>14}  {:>12}  {:>12}  {:08x}",
                i,
                start,
                human_bytes(e.compressed_size as u64),
                human_bytes(e.decompressed_size as u64),
                e.checksum
            );
        }
    }

    Ok(())
}

fn run_read(
    file: PathBuf,
    start: u64,
    len: usize,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let engine = ZstdDecompressEngine::new()?;
    let f = File::open(&file).with_context(|| format!("opening {:?}", file))?;
    let mut reader = SeekableReader::new(f, engine)?;

    let t0 = Instant::now();
    let raw = reader.read_range(start, len)?;
    let elapsed = t0.elapsed();

    eprintln!(
        "  decoded {} from offset {} in {:.3}ms",
        human_bytes(raw.len() as u64),
        start,
        elapsed.as_secs_f64() * 1000.0
    );

    match output {
        Some(path) => {
            std::fs::write(&path, &raw)?;
            eprintln!("  written to {:?}", path);
        }
        None => {
            let preview = &raw[..raw.len().min(256)];
            println!(
                "--- range [{}, {}) ({} bytes, first {} shown) ---",
                start,
                start + raw.len() as u64,
                raw.len(),
                preview.len()
            );
            hex_dump(preview);
            if raw.len() > 256 {
                println!("  ... ({} bytes remaining not shown)", raw.len() - 256);
            }
        }
    }

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Compress {
            input,
            output,
            level,
            max_frame_size,
            workers,
            no_checksum,
            append,
        } => run_compress(
            input,
            output,
            level,
            max_frame_size,
            workers,
            no_checksum,
            append,
        ),
        Commands::Decompress {
            input,
            output,
            window_log_max,
        } => run_decompress(input, output, window_log_max),
        Commands::Inspect { file, frames } => run_inspect(file, frames),
        Commands::Read {
            file,
            start,
            len,
            output,
        } => run_read(file, start, len, output),
    }
}
