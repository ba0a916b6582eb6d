// Command line front end for rompatch.
//
// Uses explicit subcommands and long-form options:
//   apply:    apply a patch to a source file
//   info:     print a patch's header facts
//   formats:  list supported formats and build features

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use log::{LevelFilter, info};
use serde_json::json;

use crate::engine::{ApplyOptions, apply_patch_with, inspect_patch};
use crate::error::PatchError;
use crate::formats::{PatchFormat, PatchInfo};
use crate::io::{ApplyStats, apply_loaded, check_loaded, default_output_path};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Binary patch applier (IPS, BPS, UPS, APS, MOD, PPF, VCDIFF).
#[derive(Parser, Debug)]
#[command(
    name = "rompatch",
    version,
    about = "Apply IPS, BPS, UPS, APS, MOD, PPF and VCDIFF patches",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Apply a patch to a source file.
    Apply(ApplyArgs),
    /// Print header information about a patch.
    Info(InfoArgs),
    /// List supported formats and build features.
    Formats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Ips,
    Bps,
    Ups,
    Aps,
    Mod,
    Ppf,
    #[value(alias = "xdelta")]
    Vcdiff,
}

impl From<FormatArg> for PatchFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Ips => PatchFormat::Ips,
            FormatArg::Bps => PatchFormat::Bps,
            FormatArg::Ups => PatchFormat::Ups,
            FormatArg::Aps => PatchFormat::Aps,
            FormatArg::Mod => PatchFormat::Mod,
            FormatArg::Ppf => PatchFormat::Ppf,
            FormatArg::Vcdiff => PatchFormat::Vcdiff,
        }
    }
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Source file to patch.
    #[arg(long, short = 's', value_hint = ValueHint::FilePath)]
    source: Option<PathBuf>,

    /// Patch format (default: from the patch extension, then its magic).
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Skip source checksum verification.
    #[arg(long = "ignore-checksums")]
    ignore_checksums: bool,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// Check only (apply in memory, do not write output).
    #[arg(long = "check-only")]
    no_output: bool,

    /// SOURCE PATCH [OUTPUT], or PATCH [OUTPUT] when --source is given.
    #[arg(value_hint = ValueHint::FilePath, num_args = 1..=3, required = true)]
    files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Patch format (default: from the patch extension, then its magic).
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Patch file.
    #[arg(value_hint = ValueHint::FilePath)]
    patch: PathBuf,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Apply,
    Info,
    Formats,
}

#[derive(Debug)]
struct Options {
    command: Command,
    use_stdout: bool,
    force: bool,
    quiet: bool,
    verbose: u8,
    ignore_checksums: bool,
    no_output: bool,
    format: Option<PatchFormat>,
    source_file: Option<PathBuf>,
    patch_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    json_output: bool,
}

impl Options {
    fn new(command: Command, cli: &Cli) -> Self {
        Self {
            command,
            use_stdout: false,
            force: cli.force,
            quiet: cli.quiet,
            verbose: cli.verbose.min(2),
            ignore_checksums: false,
            no_output: false,
            format: None,
            source_file: None,
            patch_file: None,
            output_file: None,
            json_output: cli.json_output,
        }
    }

    fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            ignore_checksums: self.ignore_checksums,
        }
    }
}

fn resolve_options(cli: Cli) -> Result<Options, String> {
    match &cli.command {
        Cmd::Apply(args) => {
            let mut opts = Options::new(Command::Apply, &cli);
            let mut files = args.files.iter().cloned();
            let source = match &args.source {
                Some(path) => path.clone(),
                None => files
                    .next()
                    .ok_or("apply requires a source and a patch file")?,
            };
            let patch = files.next().ok_or("apply requires a patch file")?;
            let output = files.next();
            if files.next().is_some() {
                return Err("too many file arguments".into());
            }
            opts.use_stdout = args.stdout;
            opts.ignore_checksums = args.ignore_checksums;
            opts.no_output = args.no_output;
            opts.format = args.format.map(PatchFormat::from);
            opts.source_file = Some(source);
            opts.patch_file = Some(patch);
            opts.output_file = output;
            Ok(opts)
        }
        Cmd::Info(args) => {
            let mut opts = Options::new(Command::Info, &cli);
            opts.format = args.format.map(PatchFormat::from);
            opts.patch_file = Some(args.patch.clone());
            Ok(opts)
        }
        Cmd::Formats => Ok(Options::new(Command::Formats, &cli)),
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("rompatch".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

fn log_level(opts: &Options) -> LevelFilter {
    if opts.quiet {
        return LevelFilter::Error;
    }
    match opts.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

// ---------------------------------------------------------------------------
// Format resolution
// ---------------------------------------------------------------------------

/// Explicit format, else the patch extension, else its magic bytes.
fn resolve_format(
    explicit: Option<PatchFormat>,
    patch_path: &Path,
    patch: &[u8],
) -> Result<PatchFormat, String> {
    if let Some(format) = explicit {
        return Ok(format);
    }
    let by_name = match PatchFormat::from_path(patch_path) {
        Ok(format) => return Ok(format),
        Err(e) => e,
    };
    match PatchFormat::detect(patch) {
        Some(format) => {
            info!("{}: detected {format} from patch contents", patch_path.display());
            Ok(format)
        }
        None => Err(format!("{}: {by_name}", patch_path.display())),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Formats command
// ---------------------------------------------------------------------------

fn cmd_formats(opts: &Options) -> i32 {
    let adler32 = cfg!(feature = "adler32");
    let file_io = cfg!(feature = "file-io");

    if opts.json_output {
        let formats: Vec<_> = PatchFormat::ALL
            .iter()
            .map(|f| json!({ "name": f.name(), "extensions": f.extensions() }))
            .collect();
        let report = json!({
            "version": env!("CARGO_PKG_VERSION"),
            "formats": formats,
            "features": { "adler32": adler32, "file_io": file_io },
        });
        println!("{report:#}");
        return 0;
    }

    let version = env!("CARGO_PKG_VERSION");
    println!("rompatch version {version}");
    for format in PatchFormat::ALL {
        println!("{:<8}{}", format.name(), format.extensions().join(", "));
    }
    if !opts.quiet {
        println!("ADLER32={}", u8::from(adler32));
        println!("FILE_IO={}", u8::from(file_io));
    }
    0
}

// ---------------------------------------------------------------------------
// Info command
// ---------------------------------------------------------------------------

fn info_json(info: &PatchInfo) -> serde_json::Value {
    json!({
        "format": info.format.name(),
        "variant": info.variant,
        "description": info.description,
        "source_size": info.source_size,
        "target_size": info.target_size,
        "source_crc32": info.source_crc32.map(|c| format!("{c:08x}")),
        "target_crc32": info.target_crc32.map(|c| format!("{c:08x}")),
        "patch_crc32": info.patch_crc32.map(|c| format!("{c:08x}")),
        "records": info.records,
    })
}

fn print_info(info: &PatchInfo) {
    println!("format:       {}", info.format);
    if let Some(variant) = &info.variant {
        println!("variant:      {variant}");
    }
    if let Some(description) = &info.description {
        println!("description:  {description}");
    }
    if let Some(size) = info.source_size {
        println!("source size:  {size}");
    }
    if let Some(size) = info.target_size {
        println!("target size:  {size}");
    }
    if let Some(crc) = info.source_crc32 {
        println!("source crc32: {crc:08x}");
    }
    if let Some(crc) = info.target_crc32 {
        println!("target crc32: {crc:08x}");
    }
    if let Some(crc) = info.patch_crc32 {
        println!("patch crc32:  {crc:08x}");
    }
    println!("records:      {}", info.records);
}

fn cmd_info(opts: &Options) -> i32 {
    let Some(patch_path) = opts.patch_file.as_deref() else {
        eprintln!("rompatch: info requires a patch file");
        return 1;
    };
    let patch = match std::fs::read(patch_path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("rompatch: patch file: {}: {e}", patch_path.display());
            return 1;
        }
    };
    let format = match resolve_format(opts.format, patch_path, &patch) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("rompatch: {e}");
            return 1;
        }
    };
    match inspect_patch(&patch, format) {
        Ok(info) => {
            if opts.json_output {
                println!("{:#}", info_json(&info));
            } else {
                print_info(&info);
            }
            0
        }
        Err(e) => {
            eprintln!("rompatch: {}: {e}", patch_path.display());
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Apply command
// ---------------------------------------------------------------------------

fn report_apply(opts: &Options, stats: &ApplyStats, output: Option<&Path>) {
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "rompatch: {}: source size: {}, patch size: {}, output size: {}, crc32: {:08x}",
            stats.format, stats.source_size, stats.patch_size, stats.output_size, stats.output_crc32
        );
    }
    if opts.json_output {
        let report = json!({
            "command": "apply",
            "format": stats.format.name(),
            "source_size": stats.source_size,
            "patch_size": stats.patch_size,
            "output_size": stats.output_size,
            "output_crc32": format!("{:08x}", stats.output_crc32),
            "output_sha256": stats.output_sha256.as_ref().map(|d| hex(d)),
            "output": output.map(|p| p.display().to_string()),
        });
        eprintln!("{report:#}");
    }
}

fn apply_to_stdout(
    opts: &Options,
    source_path: &Path,
    patch_path: &Path,
    patch: &[u8],
    format: PatchFormat,
) -> Result<ApplyStats, String> {
    let source = std::fs::read(source_path)
        .map_err(|e| format!("source file: {}: {e}", source_path.display()))?;
    let output = apply_patch_with(&source, patch, format, &opts.apply_options())
        .map_err(|e: PatchError| format!("{}: {e}", patch_path.display()))?;

    let mut writer = BufWriter::with_capacity(BUF_SIZE, io::stdout().lock());
    writer
        .write_all(&output)
        .and_then(|()| writer.flush())
        .map_err(|e| format!("write error: {e}"))?;
    Ok(ApplyStats::describe(format, &source, patch, &output))
}

fn cmd_apply(opts: &Options) -> i32 {
    let (Some(source_path), Some(patch_path)) =
        (opts.source_file.as_deref(), opts.patch_file.as_deref())
    else {
        eprintln!("rompatch: apply requires a source and a patch file");
        return 1;
    };

    let patch = match std::fs::read(patch_path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("rompatch: patch file: {}: {e}", patch_path.display());
            return 1;
        }
    };
    let format = match resolve_format(opts.format, patch_path, &patch) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("rompatch: {e}");
            return 1;
        }
    };
    let apply_opts = opts.apply_options();

    if opts.no_output {
        return match check_loaded(source_path, &patch, format, &apply_opts) {
            Ok(stats) => {
                if !opts.quiet {
                    eprintln!("rompatch: {}: patch applies cleanly", patch_path.display());
                }
                report_apply(opts, &stats, None);
                0
            }
            Err(e) => {
                eprintln!("rompatch: {}: {e}", patch_path.display());
                1
            }
        };
    }

    if opts.use_stdout {
        return match apply_to_stdout(opts, source_path, patch_path, &patch, format) {
            Ok(stats) => {
                report_apply(opts, &stats, None);
                0
            }
            Err(e) => {
                eprintln!("rompatch: {e}");
                1
            }
        };
    }

    let output_path = opts
        .output_file
        .clone()
        .unwrap_or_else(|| default_output_path(source_path));
    if output_path.exists() && !opts.force {
        eprintln!(
            "rompatch: output file exists, use -f to overwrite: {}",
            output_path.display()
        );
        return 1;
    }

    match apply_loaded(source_path, &patch, format, &output_path, &apply_opts) {
        Ok(stats) => {
            report_apply(opts, &stats, Some(&output_path));
            0
        }
        Err(e) => {
            eprintln!("rompatch: {}: {e}", patch_path.display());
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let mut opts = match resolve_options(cli) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("rompatch: {e}");
            process::exit(1);
        }
    };

    env_logger::Builder::new()
        .filter_level(log_level(&opts))
        .parse_env("RUST_LOG")
        .format_timestamp(None)
        .format_target(false)
        .init();

    // Warn if -c overrides output filename.
    if opts.use_stdout
        && let Some(path) = opts.output_file.take()
        && !opts.quiet
    {
        eprintln!(
            "rompatch: warning: -c option overrides output filename: {}",
            path.display()
        );
    }

    let exit_code = match opts.command {
        Command::Apply => cmd_apply(&opts),
        Command::Info => cmd_info(&opts),
        Command::Formats => cmd_formats(&opts),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn try_parse(args: &[&str]) -> Result<Options, String> {
        let argv: Vec<String> = std::iter::once("rompatch".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        let cli = Cli::try_parse_from(argv).map_err(|e| e.to_string())?;
        resolve_options(cli)
    }

    fn parse_opts(args: &[&str]) -> Options {
        try_parse(args).expect("cli parse failed")
    }

    #[test]
    fn apply_positional_files() {
        let opts = parse_opts(&["apply", "game.sfc", "fix.bps", "out.sfc"]);
        assert_eq!(opts.command, Command::Apply);
        assert_eq!(opts.source_file, Some(PathBuf::from("game.sfc")));
        assert_eq!(opts.patch_file, Some(PathBuf::from("fix.bps")));
        assert_eq!(opts.output_file, Some(PathBuf::from("out.sfc")));
        assert!(opts.format.is_none());
        assert!(!opts.ignore_checksums);
    }

    #[test]
    fn apply_with_source_flag_shifts_positionals() {
        let opts = parse_opts(&["apply", "--source", "game.z64", "fix.aps"]);
        assert_eq!(opts.source_file, Some(PathBuf::from("game.z64")));
        assert_eq!(opts.patch_file, Some(PathBuf::from("fix.aps")));
        assert!(opts.output_file.is_none());
    }

    #[test]
    fn apply_rejects_missing_or_extra_files() {
        assert!(try_parse(&["apply", "game.sfc"]).is_err());
        assert!(try_parse(&["apply", "-s", "game.sfc", "a", "b", "c"]).is_err());
        assert!(try_parse(&["apply"]).is_err());
    }

    #[test]
    fn apply_flags_map() {
        let opts = parse_opts(&[
            "--force",
            "apply",
            "--format",
            "xdelta",
            "--ignore-checksums",
            "--stdout",
            "--check-only",
            "a.bin",
            "b.dat",
        ]);
        assert_eq!(opts.format, Some(PatchFormat::Vcdiff));
        assert!(opts.ignore_checksums);
        assert!(opts.apply_options().ignore_checksums);
        assert!(opts.use_stdout);
        assert!(opts.no_output);
        assert!(opts.force);
    }

    #[test]
    fn info_command_maps() {
        let opts = parse_opts(&["--json", "info", "--format", "ppf", "x.bin"]);
        assert_eq!(opts.command, Command::Info);
        assert_eq!(opts.format, Some(PatchFormat::Ppf));
        assert_eq!(opts.patch_file, Some(PathBuf::from("x.bin")));
        assert!(opts.json_output);
    }

    #[test]
    fn formats_command_maps() {
        assert_eq!(parse_opts(&["formats"]).command, Command::Formats);
    }

    #[test]
    fn verbose_is_capped() {
        let opts = parse_opts(&["-vvv", "formats"]);
        assert_eq!(opts.verbose, 2);
        assert_eq!(log_level(&opts), LevelFilter::Debug);
        assert_eq!(log_level(&parse_opts(&["-v", "formats"])), LevelFilter::Info);
        assert_eq!(log_level(&parse_opts(&["formats"])), LevelFilter::Warn);
        assert_eq!(log_level(&parse_opts(&["-q", "formats"])), LevelFilter::Error);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(try_parse(&["-q", "-v", "formats"]).is_err());
    }

    #[test]
    fn explicit_format_wins() {
        let format =
            resolve_format(Some(PatchFormat::Ups), Path::new("a.ips"), b"PATCH").unwrap();
        assert_eq!(format, PatchFormat::Ups);
    }

    #[test]
    fn extension_then_magic() {
        assert_eq!(
            resolve_format(None, Path::new("a.bps"), b"PATCH").unwrap(),
            PatchFormat::Bps
        );
        assert_eq!(
            resolve_format(None, Path::new("a.bin"), b"UPS1....").unwrap(),
            PatchFormat::Ups
        );
        assert!(resolve_format(None, Path::new("a.bin"), b"????").is_err());
    }

    #[test]
    fn info_json_fields() {
        let mut info = PatchInfo::new(PatchFormat::Bps);
        info.source_crc32 = Some(0xAB);
        info.records = 3;
        let v = info_json(&info);
        assert_eq!(v["format"], "bps");
        assert_eq!(v["source_crc32"], "000000ab");
        assert_eq!(v["records"], 3);
        assert!(v["target_size"].is_null());
    }

    #[test]
    fn hex_digest() {
        assert_eq!(hex(&[0x00, 0xAB, 0x10]), "00ab10");
    }

    #[test]
    fn fuzz_hook_never_panics() {
        fuzz_try_parse_args(&["apply".into()]);
        fuzz_try_parse_args(&["apply".into(), "-s".into(), "a".into(), "b".into()]);
        fuzz_try_parse_args(&["--bogus".into()]);
    }
}
