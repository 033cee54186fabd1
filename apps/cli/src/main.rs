use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use fwedit_core::{
    BlockType, BulkOperationKind, BulkOutcome, EditorConfig, EditorSession, FirmwareDefinition,
    FirmwareImage, PatchCatalog, TracingObserver,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Firmware glyph/string editor and patcher", long_about = None)]
struct Args {
    /// Firmware image to edit
    #[arg(long, global = true)]
    firmware: Option<PathBuf>,

    /// Firmware definition (TOML)
    #[arg(long, global = true)]
    definition: Option<PathBuf>,

    /// Directory of patch files (TOML)
    #[arg(long, global = true)]
    patches: Option<PathBuf>,

    /// Editor configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where to write the edited firmware (defaults to in place)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the firmware layout and patch counts
    Info,
    /// List the strings of a block
    Strings {
        #[arg(long)]
        block: Option<u8>,
    },
    /// Render a string as text
    Preview {
        #[arg(long)]
        block: Option<u8>,
        #[arg(long)]
        string: usize,
    },
    /// Render one glyph as text
    Glyph {
        #[arg(long)]
        block: Option<u8>,
        #[arg(long, value_parser = parse_byte)]
        index: u8,
    },
    /// Write one character slot of a string
    SetChar {
        #[arg(long)]
        block: Option<u8>,
        #[arg(long)]
        string: usize,
        #[arg(long)]
        slot: usize,
        #[arg(long, value_parser = parse_byte)]
        value: u8,
    },
    /// Flip one pixel of a glyph
    TogglePixel {
        #[arg(long)]
        block: Option<u8>,
        #[arg(long, value_parser = parse_byte)]
        index: u8,
        #[arg(long)]
        col: usize,
        #[arg(long)]
        row: usize,
    },
    /// List patches for the loaded firmware
    Patches,
    /// Apply patches by name
    Apply {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Roll back patches by name
    Rollback {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => EditorConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EditorConfig::default(),
    };

    let firmware_path = args
        .firmware
        .clone()
        .ok_or_else(|| anyhow!("--firmware is required"))?;
    let definition_path = args
        .definition
        .clone()
        .or(config.definition_path.clone())
        .ok_or_else(|| anyhow!("--definition is required (or set definition_path in the config)"))?;

    let definition = FirmwareDefinition::load_from_file(&definition_path)
        .with_context(|| format!("loading definition {}", definition_path.display()))?;
    let data = std::fs::read(&firmware_path)
        .with_context(|| format!("reading firmware {}", firmware_path.display()))?;
    let image = FirmwareImage::from_definition(&definition, data)?;

    let catalog = match args.patches.clone().or(config.patches_dir.clone()) {
        Some(dir) => PatchCatalog::load_dir(&dir)
            .with_context(|| format!("loading patches from {}", dir.display()))?,
        None => PatchCatalog::new(),
    };

    let mut session = EditorSession::new(catalog);
    session.load_firmware(image);

    let pick = |block: Option<u8>| -> Result<BlockType> {
        match block {
            Some(n) => BlockType::from_number(n).ok_or_else(|| anyhow!("no such block: {}", n)),
            None => Ok(config.default_block),
        }
    };

    let dirty = match args.command {
        Command::Info => {
            print_info(&session);
            false
        }
        Command::Strings { block } => {
            print_strings(&session, pick(block)?);
            false
        }
        Command::Preview { block, string } => {
            let preview = session.string_preview(pick(block)?, string)?;
            print!("{}", preview.to_text('#', '.'));
            false
        }
        Command::Glyph { block, index } => {
            let glyph = session.glyph(pick(block)?, index)?;
            println!("0x{:02X}: {}x{}", index, glyph.width(), glyph.height());
            print!("{}", glyph.to_text('#', '.'));
            false
        }
        Command::SetChar {
            block,
            string,
            slot,
            value,
        } => {
            let block = pick(block)?;
            let mut slots = session.character_slots(block, string)?;
            let reset = session.set_char(block, string, &mut slots, slot, value)?;
            if !reset.is_empty() {
                println!("Cleared slots after terminator: {:?}", reset);
            }
            let preview = session.string_preview(block, string)?;
            print!("{}", preview.to_text('#', '.'));
            true
        }
        Command::TogglePixel {
            block,
            index,
            col,
            row,
        } => {
            let on = session.toggle_pixel(pick(block)?, index, col, row)?;
            println!(
                "Pixel ({}, {}) of glyph 0x{:02X} is now {}",
                col,
                row,
                index,
                if on { "on" } else { "off" }
            );
            true
        }
        Command::Patches => {
            print_patches(&session);
            false
        }
        Command::Apply { names } => {
            run_bulk(&mut session, BulkOperationKind::Apply, &names)?
        }
        Command::Rollback { names } => {
            run_bulk(&mut session, BulkOperationKind::Rollback, &names)?
        }
    };

    if dirty {
        let output = args.output.unwrap_or(firmware_path);
        save(&mut session, &output)?;
    }
    Ok(())
}

/// Returns whether the firmware changed.
fn run_bulk(
    session: &mut EditorSession<TracingObserver>,
    kind: BulkOperationKind,
    names: &[String],
) -> Result<bool> {
    let outcome = match kind {
        BulkOperationKind::Apply => session.apply_patches(names)?,
        BulkOperationKind::Rollback => session.rollback_patches(names)?,
    };
    match outcome {
        BulkOutcome::NothingToDo => {
            println!(
                "{}",
                match kind {
                    BulkOperationKind::Apply => "Selected patches were already installed.",
                    BulkOperationKind::Rollback => "Selected patches are not installed.",
                }
            );
            Ok(false)
        }
        BulkOutcome::Completed(result) => {
            print!("{}", result.report(kind));
            Ok(!result.proceeded.is_empty())
        }
    }
}

fn print_info(session: &EditorSession<TracingObserver>) {
    let Some(firmware) = session.firmware() else {
        return;
    };
    println!("Definition: {}", firmware.definition());
    println!(
        "Size: {} bytes ({:.2} KB)",
        firmware.len(),
        firmware.len() as f64 / 1024.0
    );
    for block_type in [BlockType::Block1, BlockType::Block2] {
        let block = firmware.block(block_type);
        println!(
            "{}: {} glyphs ({}), {} strings",
            block_type,
            block.glyphs().len(),
            block.format(),
            block.strings().len()
        );
    }
    let suitable = session.suitable_patches();
    let applied = suitable.iter().filter(|p| p.is_applied).count();
    println!(
        "Patches: {} suitable, {} applied ({} in catalog)",
        suitable.len(),
        applied,
        session.catalog().len()
    );
}

fn print_strings(session: &EditorSession<TracingObserver>, block: BlockType) {
    let Some(firmware) = session.firmware() else {
        return;
    };
    for (i, meta) in firmware.block(block).strings().iter().enumerate() {
        match session.read_string(block, i) {
            Ok(chars) => {
                let hex: Vec<String> = chars.iter().map(|c| format!("{:02X}", c)).collect();
                println!(
                    "{:4} 0x{:06X} [{:2}/{:2}] {}",
                    i,
                    meta.offset,
                    chars.len(),
                    meta.length,
                    hex.join(" ")
                );
            }
            Err(e) => println!("{:4} 0x{:06X} string data is invalid ({})", i, meta.offset, e),
        }
    }
}

fn print_patches(session: &EditorSession<TracingObserver>) {
    let yes_no = |b: bool| if b { "Yes" } else { "No" };
    println!("{:<40} {:<10} {:<9} Compatible", "Name", "Version", "Installed");
    for patch in session.suitable_patches() {
        println!(
            "{:<40} {:<10} {:<9} {}",
            patch.name,
            patch.version,
            yes_no(patch.is_applied),
            yes_no(patch.is_compatible)
        );
    }
}

fn save(session: &mut EditorSession<TracingObserver>, path: &Path) -> Result<()> {
    let image = session
        .take_firmware()
        .ok_or_else(|| anyhow!("no firmware to save"))?;
    std::fs::write(path, image.into_bytes())
        .with_context(|| format!("writing firmware {}", path.display()))?;
    info!(path = %path.display(), "Firmware saved");
    Ok(())
}

/// Parse `0x1F` or `31`.
fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid byte '{}': {}", s, e))
}
