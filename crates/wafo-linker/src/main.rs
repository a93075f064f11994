use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use wafo_linker::{
    link, preprocess, render_entry, EntrySpec, LinkMode, LinkOptions, LinkReport,
    PreprocessOptions,
};
use wafo_types::{Flags, SourceFile};

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::prelude::*;

    let App { cmd, output } = App::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .with(output.trace_filter)
        .init();

    match cmd {
        Command::Link(args) => args.run(),
        Command::Entry(args) => args.run(),
        Command::Preprocess(args) => args.run(),
    }
}

/// Lay out the Forth dictionary in the interpreter core's WAT source.
#[derive(Debug, Parser)]
#[clap(about, version)]
struct App {
    #[clap(subcommand)]
    cmd: Command,

    #[clap(flatten)]
    output: OutputOptions,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Recompute dictionary addresses, indices and annotations.
    Link(LinkArgs),
    /// Render the data and elem lines for a single new entry.
    Entry(EntryArgs),
    /// Substitute named constants and optionally lower memory helpers.
    Preprocess(PreprocessArgs),
}

#[derive(Clone, Debug, Args)]
#[command(next_help_heading = "Output Options")]
struct OutputOptions {
    /// A comma-separated list of `tracing` targets and levels to enable,
    /// e.g. `info,wafo_linker=debug`.
    #[clap(long = "trace", env = "WAFO_TRACE", default_value = "info", global = true)]
    trace_filter: tracing_subscriber::filter::Targets,
}

// ── link ─────────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
struct LinkArgs {
    /// The WAT source holding the dictionary.
    file: PathBuf,

    /// Overwrite FILE instead of writing `<stem>.out.<ext>` next to it.
    #[clap(long)]
    inplace: bool,

    /// Insert a new word in sorted position and print its source lines.
    #[clap(long = "add-dict", value_name = "NAME")]
    add_dict: Option<String>,

    /// Verify the source instead of rewriting it.
    #[clap(long, conflicts_with_all = ["inplace", "add_dict"])]
    check: bool,

    /// Print a report of the layout to stdout.
    #[clap(long, value_enum)]
    report: Option<ReportFormat>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
}

impl LinkArgs {
    fn run(self) -> anyhow::Result<()> {
        let text = fs::read_to_string(&self.file)
            .with_context(|| format!("failed to read {}", self.file.display()))?;
        let source = SourceFile::new(self.file.display().to_string(), text);
        let options = LinkOptions {
            mode: if self.check {
                LinkMode::Check
            } else {
                LinkMode::Update
            },
            add_entry: self.add_dict.clone(),
            ..LinkOptions::default()
        };

        let output = link(&source, &options)
            .with_context(|| format!("failed to link {}", self.file.display()))?;

        if !self.check {
            let target = if self.inplace {
                self.file.clone()
            } else {
                sibling_output(&self.file)
            };
            fs::write(&target, &output.text)
                .with_context(|| format!("failed to write {}", target.display()))?;
            tracing::info!(path = %target.display(), "wrote linked source");
        }

        tracing::info!(
            strings = output.strings.len(),
            entries = output.entries.len(),
            "here = 0x{:x}, latest = 0x{:x}, nextTableIndex = 0x{:x}",
            output.markers.here,
            output.markers.latest,
            output.markers.next_table_index,
        );

        if let Some(snippet) = &output.inserted {
            println!("{snippet}");
        }
        if let Some(ReportFormat::Json) = self.report {
            let json = LinkReport::from_output(&output)
                .to_json()
                .context("failed to serialize report")?;
            println!("{json}");
        }
        Ok(())
    }
}

/// `dir/waforth.wat` → `dir/waforth.out.wat`
fn sibling_output(file: &Path) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match file.extension() {
        Some(ext) => format!("{stem}.out.{}", ext.to_string_lossy()),
        None => format!("{stem}.out"),
    };
    file.with_file_name(name)
}

// ── entry ────────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
struct EntryArgs {
    /// Defining function, e.g. `$foo`.
    #[clap(long)]
    func: String,
    #[clap(long)]
    name: String,
    #[clap(long, default_value = "0", value_parser = parse_cell)]
    flags: u32,
    #[clap(long, value_parser = parse_cell)]
    latest: u32,
    #[clap(long, value_parser = parse_cell)]
    here: u32,
    #[clap(long, value_parser = parse_cell)]
    index: u32,
}

impl EntryArgs {
    fn run(self) -> anyhow::Result<()> {
        let flags = u8::try_from(self.flags).context("flags must fit in one byte")?;
        let generated = render_entry(&EntrySpec {
            func: self.func,
            name: self.name,
            flags: Flags::from_byte(flags),
            latest: self.latest,
            here: self.here,
            index: self.index,
        })?;
        println!("{generated}");
        Ok(())
    }
}

fn parse_cell(text: &str) -> Result<u32, String> {
    wafo_types::pack::parse_int(text)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| format!("`{text}` is not a 32-bit unsigned integer"))
}

// ── preprocess ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
struct PreprocessArgs {
    input: PathBuf,
    output: PathBuf,
    /// Lower `$memcopy`/`$memset` calls to bulk-memory instructions.
    #[clap(long)]
    enable_bulk_memory: bool,
}

impl PreprocessArgs {
    fn run(self) -> anyhow::Result<()> {
        let text = fs::read_to_string(&self.input)
            .with_context(|| format!("failed to read {}", self.input.display()))?;
        let out = preprocess(
            &text,
            &PreprocessOptions {
                bulk_memory: self.enable_bulk_memory,
            },
        );
        fs::write(&self.output, out)
            .with_context(|| format!("failed to write {}", self.output.display()))?;
        tracing::info!(output = %self.output.display(), "preprocessed");
        Ok(())
    }
}
