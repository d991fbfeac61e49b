use clap::{Parser, Subcommand};
use gcdisc::image::RebuildOptions;
use gcdisc::iso::IsoFile;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gcdisc", about = "GameCube disc image tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show image metadata
    Info {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List the filesystem
    List {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Extract files into a directory
    Extract {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Also dump boot.bin, bi2.bin, appldr.bin, start.dol and fst.bin
        #[arg(long)]
        system: bool,
        /// Specific image paths; extracts everything when omitted
        paths: Vec<String>,
    },
    /// Insert (or replace) a file, rebuilding the image
    Insert {
        input: PathBuf,
        /// Destination path inside the image, e.g. audio/extra.hps
        iso_path: String,
        /// Local file providing the content
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// File data alignment (decimal or 0x-hex)
        #[arg(long, default_value = "0x8000", value_parser = parse_num)]
        alignment: u64,
        /// Pad the output image up to this size
        #[arg(long, value_parser = parse_num)]
        pad_to: Option<u64>,
    },
    /// Remove a file or directory, rebuilding the image
    Remove {
        input: PathBuf,
        iso_path: String,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value = "0x8000", value_parser = parse_num)]
        alignment: u64,
        #[arg(long, value_parser = parse_num)]
        pad_to: Option<u64>,
    },
    /// Rename a file or directory, rebuilding the image
    Rename {
        input: PathBuf,
        iso_path: String,
        new_name: String,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value = "0x8000", value_parser = parse_num)]
        alignment: u64,
        #[arg(long, value_parser = parse_num)]
        pad_to: Option<u64>,
    },
    /// Show banner metadata
    Banner {
        input: PathBuf,
        /// Banner path inside the image
        #[arg(long, default_value = "opening.bnr")]
        path: String,
        #[arg(long)]
        json: bool,
        /// Write the decoded 96x32 image as raw RGBA bytes
        #[arg(long)]
        pixels: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let iso = IsoFile::open(&input)?;
            let h = &iso.header;
            if json {
                let doc = serde_json::json!({
                    "game_code": h.game_code_str(),
                    "maker_code": h.maker_code_str(),
                    "disc_id": h.disc_id,
                    "version": h.version,
                    "game_name": h.game_name,
                    "dol_offset": h.dol_offset,
                    "fst_offset": h.fst_offset,
                    "fst_size": h.fst_size,
                    "max_fst_size": h.max_fst_size,
                    "apploader_date": iso.apploader.date_str(),
                    "entries": iso.tree.entry_count(),
                    "files": iso.tree.file_count(),
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                println!("── GameCube image ───────────────────────────────────────");
                println!("  Path           {}", input.display());
                println!("  Game code      {}{}", h.game_code_str(), h.maker_code_str());
                println!("  Disc / version {} / {}", h.disc_id, h.version);
                println!("  Game name      {}", h.game_name);
                println!("  Apploader      {}", iso.apploader.date_str());
                println!("  DOL offset     {:#x}", h.dol_offset);
                println!("  FST offset     {:#x}", h.fst_offset);
                println!("  FST size       {:#x} (max {:#x})", h.fst_size, h.max_fst_size);
                println!("  Entries        {}", iso.tree.entry_count());
                println!("  Files          {}", iso.tree.file_count());
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let iso = IsoFile::open(&input)?;
            let files = iso.list();
            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                println!("{:<48} {:>12} {:>12}", "Path", "Size", "Offset");
                for info in &files {
                    let offset = info
                        .offset
                        .map(|o| format!("{o:#x}"))
                        .unwrap_or_else(|| "—".into());
                    let path = if info.is_dir { format!("{}/", info.path) } else { info.path.clone() };
                    println!("{:<48} {:>12} {:>12}", path, info.size, offset);
                }
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output_dir, system, paths } => {
            let iso = IsoFile::open(&input)?;
            if paths.is_empty() {
                let report = iso.extract_all(&output_dir)?;
                for (path, err) in &report.failed {
                    eprintln!("  skipped {path}: {err}");
                }
                println!("Extracted {} file(s) to {}", report.written, output_dir.display());
            } else {
                std::fs::create_dir_all(&output_dir)?;
                for path in &paths {
                    let data = iso.read_file(path)?;
                    let target = output_dir.join(path);
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&target, data)?;
                    println!("  extracted {path}");
                }
            }
            if system {
                std::fs::create_dir_all(&output_dir)?;
                for sys in iso.system_files()? {
                    let data = iso.read_system_file(sys.name)?;
                    std::fs::write(output_dir.join(sys.name), data)?;
                    println!("  extracted {}", sys.name);
                }
            }
        }

        // ── Insert ───────────────────────────────────────────────────────────
        Commands::Insert { input, iso_path, file, output, alignment, pad_to } => {
            let mut iso = IsoFile::open(&input)?;
            let content = std::fs::read(&file)?;
            let (dir, name) = split_path(&iso_path);
            if iso.tree.find(&iso_path).is_ok() {
                iso.replace_file_content(&iso_path, content)?;
                println!("  replaced {iso_path}");
            } else {
                iso.insert_file(dir, name, content)?;
                println!("  inserted {iso_path}");
            }
            iso.rebuild_to(&output, &rebuild_opts(alignment, pad_to))?;
            println!("Rebuilt: {}", output.display());
        }

        // ── Remove ───────────────────────────────────────────────────────────
        Commands::Remove { input, iso_path, output, alignment, pad_to } => {
            let mut iso = IsoFile::open(&input)?;
            iso.remove(&iso_path)?;
            println!("  removed {iso_path}");
            iso.rebuild_to(&output, &rebuild_opts(alignment, pad_to))?;
            println!("Rebuilt: {}", output.display());
        }

        // ── Rename ───────────────────────────────────────────────────────────
        Commands::Rename { input, iso_path, new_name, output, alignment, pad_to } => {
            let mut iso = IsoFile::open(&input)?;
            iso.rename(&iso_path, &new_name)?;
            println!("  renamed {iso_path} -> {new_name}");
            iso.rebuild_to(&output, &rebuild_opts(alignment, pad_to))?;
            println!("Rebuilt: {}", output.display());
        }

        // ── Banner ───────────────────────────────────────────────────────────
        Commands::Banner { input, path, json, pixels } => {
            let iso = IsoFile::open(&input)?;
            let banner = iso.banner(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&banner.meta)?);
            } else {
                for (i, meta) in banner.meta.iter().enumerate() {
                    if banner.meta.len() > 1 {
                        println!("── Metadata {i} ──");
                    }
                    println!("  Game       {}", meta.game_name);
                    println!("  Developer  {}", meta.developer);
                    println!("  Full title {}", meta.full_game_title);
                    println!("  Full dev   {}", meta.full_developer);
                    println!("  About      {}", meta.description);
                }
            }
            if let Some(out) = pixels {
                std::fs::write(&out, banner.decode_pixels())?;
                println!("Wrote 96x32 RGBA pixels to {}", out.display());
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn rebuild_opts(alignment: u64, pad_to: Option<u64>) -> RebuildOptions {
    RebuildOptions {
        alignment: alignment as u32,
        fst_offset: None,
        min_image_size: pad_to,
    }
}

fn split_path(path: &str) -> (&str, &str) {
    let trimmed = path.trim_matches('/');
    match trimmed.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", trimmed),
    }
}

fn parse_num(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}
