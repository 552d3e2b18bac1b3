use clap::Parser;
use tracing_subscriber::EnvFilter;

use scratchfs::{ScratchFs, StorageKind};

/// Stage a small tree in a scratch filesystem and print what it cost.
#[derive(Parser)]
struct Args {
    /// Byte budget of the namespace.
    #[arg(long, default_value_t = 1024 * 1024)]
    quota: u64,
    /// Number of staged files.
    #[arg(long, default_value_t = 8)]
    files: u32,
    /// Use the contiguous backend for every file.
    #[arg(long)]
    random_access: bool,
}

fn main() -> scratchfs::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let fs = ScratchFs::with_options(scratchfs::FsOptions {
        max_quota: args.quota,
        default_storage: if args.random_access {
            StorageKind::RandomAccess
        } else {
            StorageKind::Auto
        },
        ..Default::default()
    });

    fs.mkdir("/stage/raw", false)?;
    for index in 0..args.files {
        let mut handle = fs.open(&format!("/stage/raw/part-{index:03}.bin"), "wb")?;
        handle.write(format!("record {index}\n").as_bytes())?;
        handle.close();
    }

    fs.copy_tree("/stage/raw", "/stage/cooked")?;

    for path in fs.glob("/stage/**/*.bin")? {
        let size = fs.get_size(&path)?;
        println!("{path}  {size} bytes");
    }

    let stats = fs.stats();
    println!(
        "{} files, {} directories, {} of {} bytes used ({} chunks, {} bytes overhead each)",
        stats.file_count,
        stats.dir_count,
        stats.used_bytes,
        stats.quota_bytes,
        stats.chunk_count,
        stats.overhead_per_chunk,
    );
    Ok(())
}
